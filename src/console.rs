//! Line commands accepted by the `tabwarden` binary on stdin.

use crate::protocol::TransportCommand;
use crate::shortcut::ShortcutId;

/// Simulated page-side activity for headless pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    Play,
    Pause,
    Title(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    List,
    Open(ShortcutId),
    Close(ShortcutId),
    Transport(TransportCommand),
    Page { id: ShortcutId, action: PageAction },
    Quit,
}

pub const HELP: &str = "commands: list | open <id> | close <id> | play | pause | toggle | next | prev \
| seek <ms> | end | page <id> play|pause|title <text> | quit";

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let mut id = |verb: &str| {
        words
            .next()
            .map(ToString::to_string)
            .ok_or_else(|| format!("'{verb}' needs a shortcut id"))
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => ConsoleCommand::List,
        "open" => ConsoleCommand::Open(id("open")?),
        "close" => ConsoleCommand::Close(id("close")?),
        "play" => ConsoleCommand::Transport(TransportCommand::Play),
        "pause" => ConsoleCommand::Transport(TransportCommand::Pause),
        "toggle" => ConsoleCommand::Transport(TransportCommand::PlayPause),
        "next" => ConsoleCommand::Transport(TransportCommand::SkipNext),
        "prev" | "previous" => ConsoleCommand::Transport(TransportCommand::SkipPrevious),
        "end" => ConsoleCommand::Transport(TransportCommand::EndSession),
        "seek" => {
            let position_ms = words
                .next()
                .ok_or_else(|| "'seek' needs a position in milliseconds".to_string())?
                .parse::<u64>()
                .map_err(|err| format!("invalid seek position: {err}"))?;
            ConsoleCommand::Transport(TransportCommand::SeekTo { position_ms })
        }
        "page" => {
            let id = id("page")?;
            let action = match words.next() {
                Some("play") => PageAction::Play,
                Some("pause") => PageAction::Pause,
                Some("title") => {
                    let title = words.collect::<Vec<_>>().join(" ");
                    if title.is_empty() {
                        return Err("'page <id> title' needs a title".to_string());
                    }
                    PageAction::Title(title)
                }
                Some(other) => return Err(format!("unknown page action '{other}'")),
                None => return Err("'page' needs an action".to_string()),
            };
            ConsoleCommand::Page { id, action }
        }
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::{parse_command, ConsoleCommand, PageAction};
    use crate::protocol::TransportCommand;

    #[test]
    fn test_parses_registry_and_transport_commands() {
        assert_eq!(
            parse_command("open radio"),
            Ok(ConsoleCommand::Open("radio".to_string()))
        );
        assert_eq!(
            parse_command("  TOGGLE "),
            Ok(ConsoleCommand::Transport(TransportCommand::PlayPause))
        );
        assert_eq!(
            parse_command("seek 90500"),
            Ok(ConsoleCommand::Transport(TransportCommand::SeekTo {
                position_ms: 90_500
            }))
        );
    }

    #[test]
    fn test_page_title_keeps_spaces() {
        assert_eq!(
            parse_command("page radio title Morning  Show"),
            Ok(ConsoleCommand::Page {
                id: "radio".to_string(),
                action: PageAction::Title("Morning Show".to_string()),
            })
        );
    }

    #[test]
    fn test_rejects_incomplete_commands() {
        assert!(parse_command("").is_err());
        assert!(parse_command("close").is_err());
        assert!(parse_command("seek soon").is_err());
        assert!(parse_command("page radio").is_err());
        assert!(parse_command("rewind").is_err());
    }
}

//! Registry of running background content instances.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::bridge::InstanceOrigin;
use crate::page::PageContext;
use crate::session::metadata::{ActionCapabilities, MediaAction};
use crate::shortcut::{BackgroundShortcut, ShortcutId};

/// Caller-visible handle to a registered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub shortcut_id: ShortcutId,
    pub instance_token: uuid::Uuid,
}

impl From<&InstanceOrigin> for InstanceHandle {
    fn from(origin: &InstanceOrigin) -> Self {
        Self {
            shortcut_id: origin.shortcut_id.clone(),
            instance_token: origin.instance_token,
        }
    }
}

pub struct ContentInstance {
    pub origin: InstanceOrigin,
    pub shortcut: BackgroundShortcut,
    pub page: Arc<dyn PageContext>,
    /// Handlers the page registered, kept even while it does not own the session.
    pub capabilities: ActionCapabilities,
}

/// Outcome of `ContentRegistry::get_or_create`.
pub struct Registration {
    pub handle: InstanceHandle,
    /// Set only when a new page was created; the caller loads it.
    pub created_page: Option<Arc<dyn PageContext>>,
}

/// Id-to-instance map. Only the coordinator mutates it, under its state lock.
#[derive(Default)]
pub struct ContentRegistry {
    instances: HashMap<ShortcutId, ContentInstance>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ContentInstance> {
        self.instances.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// True while `origin` names the instance currently registered under its id.
    pub fn is_live(&self, origin: &InstanceOrigin) -> bool {
        self.instances
            .get(&origin.shortcut_id)
            .is_some_and(|instance| instance.origin == *origin)
    }

    /// Returns the existing instance for `shortcut.id`, or registers the page `create`
    /// builds for a fresh origin. A failed `create` leaves the registry unchanged.
    pub fn get_or_create<F>(
        &mut self,
        shortcut: &BackgroundShortcut,
        create: F,
    ) -> Result<Registration, String>
    where
        F: FnOnce(&InstanceOrigin) -> Result<Arc<dyn PageContext>, String>,
    {
        if let Some(existing) = self.instances.get(&shortcut.id) {
            return Ok(Registration {
                handle: InstanceHandle::from(&existing.origin),
                created_page: None,
            });
        }

        let origin = InstanceOrigin::new(shortcut.id.clone());
        let page = create(&origin)?;
        let handle = InstanceHandle::from(&origin);
        self.instances.insert(
            shortcut.id.clone(),
            ContentInstance {
                origin,
                shortcut: shortcut.clone(),
                page: Arc::clone(&page),
                capabilities: ActionCapabilities::default(),
            },
        );
        Ok(Registration {
            handle,
            created_page: Some(page),
        })
    }

    pub fn remove(&mut self, id: &str) -> Option<ContentInstance> {
        self.instances.remove(id)
    }

    pub fn capabilities(&self, origin: &InstanceOrigin) -> ActionCapabilities {
        self.instances
            .get(&origin.shortcut_id)
            .filter(|instance| instance.origin == *origin)
            .map(|instance| instance.capabilities)
            .unwrap_or_default()
    }

    /// Records a handler change for a live instance and returns its updated capabilities.
    pub fn set_capability(
        &mut self,
        origin: &InstanceOrigin,
        action: MediaAction,
        enabled: bool,
    ) -> ActionCapabilities {
        match self
            .instances
            .get_mut(&origin.shortcut_id)
            .filter(|instance| instance.origin == *origin)
        {
            Some(instance) => {
                instance.capabilities.set(action, enabled);
                instance.capabilities
            }
            None => ActionCapabilities::default(),
        }
    }

    pub fn running_ids(&self) -> BTreeSet<ShortcutId> {
        self.instances.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Empties the registry, returning every instance.
    pub fn drain(&mut self) -> Vec<ContentInstance> {
        self.instances.drain().map(|(_, instance)| instance).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ContentRegistry;
    use crate::instrumentation::ReverseEntry;
    use crate::page::PageContext;
    use crate::session::metadata::MediaAction;
    use crate::shortcut::BackgroundShortcut;
    use std::cell::Cell;
    use std::sync::Arc;

    struct NullPage;

    impl PageContext for NullPage {
        fn load_url(&self, _url: &str) -> Result<(), String> {
            Ok(())
        }

        fn post_script(&self, _script: String) {}

        fn invoke_reverse_entry(&self, _entry: ReverseEntry) {}

        fn destroy(&self) -> Result<(), String> {
            Ok(())
        }
    }

    fn shortcut(id: &str) -> BackgroundShortcut {
        BackgroundShortcut::new(id, id.to_uppercase(), format!("https://{id}.example.com"))
    }

    fn null_page() -> Result<Arc<dyn PageContext>, String> {
        Ok(Arc::new(NullPage))
    }

    #[test]
    fn test_get_or_create_is_idempotent_per_id() {
        let mut registry = ContentRegistry::new();
        let factory_calls = Cell::new(0);

        let first = registry
            .get_or_create(&shortcut("a"), |_| {
                factory_calls.set(factory_calls.get() + 1);
                null_page()
            })
            .expect("create");
        let second = registry
            .get_or_create(&shortcut("a"), |_| {
                factory_calls.set(factory_calls.get() + 1);
                null_page()
            })
            .expect("lookup");

        assert_eq!(factory_calls.get(), 1);
        assert_eq!(first.handle, second.handle);
        assert!(first.created_page.is_some());
        assert!(second.created_page.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_creation_registers_nothing() {
        let mut registry = ContentRegistry::new();
        let result = registry.get_or_create(&shortcut("a"), |_| Err("no engine".to_string()));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_origin_is_not_live_after_recreation() {
        let mut registry = ContentRegistry::new();
        let mut first_origin = None;
        registry
            .get_or_create(&shortcut("a"), |origin| {
                first_origin = Some(origin.clone());
                null_page()
            })
            .expect("create");
        let first_origin = first_origin.expect("origin");
        registry.set_capability(&first_origin, MediaAction::NextTrack, true);

        registry.remove("a");
        registry
            .get_or_create(&shortcut("a"), |_| null_page())
            .expect("recreate");

        assert!(registry.contains("a"));
        assert!(!registry.is_live(&first_origin));
        assert!(!registry.capabilities(&first_origin).next_track);
        assert!(
            !registry
                .set_capability(&first_origin, MediaAction::PreviousTrack, true)
                .previous_track
        );
    }

    #[test]
    fn test_running_ids_and_drain() {
        let mut registry = ContentRegistry::new();
        for id in ["b", "a"] {
            registry
                .get_or_create(&shortcut(id), |_| null_page())
                .expect("create");
        }
        assert_eq!(
            registry.running_ids().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(registry.drain().len(), 2);
        assert!(registry.running_ids().is_empty());
    }
}

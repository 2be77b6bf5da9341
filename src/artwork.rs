//! Cancellable artwork resolution for the active media session.
//!
//! Each resolution runs on its own worker thread: download, decode, then hand the result
//! to a completion callback. A request that has been cancelled in the meantime never
//! reaches the callback.

use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use log::{debug, warn};

use crate::config::ArtworkConfig;
use crate::image_pipeline;

/// Source of raw artwork bytes.
pub trait ArtworkFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Artwork fetcher backed by `ureq`.
pub struct HttpArtworkFetcher {
    http_client: ureq::Agent,
    max_download_bytes: u64,
}

impl HttpArtworkFetcher {
    pub fn new(config: &ArtworkConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(u64::from(config.connect_timeout_secs)))
            .timeout_read(Duration::from_secs(u64::from(config.read_timeout_secs)))
            .build();
        Self {
            http_client,
            max_download_bytes: config.max_download_bytes,
        }
    }
}

impl ArtworkFetcher for HttpArtworkFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .http_client
            .get(url)
            .call()
            .map_err(|err| format!("artwork request failed: {err}"))?;
        if response.status() != 200 {
            return Err(format!("artwork request returned HTTP {}", response.status()));
        }
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_download_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|err| format!("artwork body read failed: {err}"))?;
        if bytes.len() as u64 > self.max_download_bytes {
            return Err(format!(
                "artwork exceeds {} byte limit",
                self.max_download_bytes
            ));
        }
        Ok(bytes)
    }
}

/// Decoded cover image, cheap to clone.
#[derive(Clone)]
pub struct Cover {
    source_url: String,
    image: Arc<RgbaImage>,
}

impl Cover {
    pub fn new(source_url: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            source_url: source_url.into(),
            image: Arc::new(image),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl fmt::Debug for Cover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("Cover")
            .field("source_url", &self.source_url)
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

/// Handle to one in-flight resolution. Clones share the cancellation flag.
#[derive(Debug, Clone)]
pub struct ArtworkRequest {
    url: String,
    generation: u64,
    cancelled: Arc<AtomicBool>,
}

impl ArtworkRequest {
    pub fn new(url: impl Into<String>, generation: u64) -> Self {
        Self {
            url: url.into(),
            generation,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Starts artwork resolutions and numbers them so late results can be told apart.
pub struct ArtworkResolver {
    fetcher: Arc<dyn ArtworkFetcher>,
    max_edge_px: u32,
    next_generation: u64,
}

impl ArtworkResolver {
    pub fn new(fetcher: Arc<dyn ArtworkFetcher>, max_edge_px: u32) -> Self {
        Self {
            fetcher,
            max_edge_px: max_edge_px.max(1),
            next_generation: 0,
        }
    }

    /// Starts resolving `url`. Returns `None` without starting anything when `url` is
    /// absent: the caller clears the cover immediately.
    ///
    /// `on_complete` receives the request generation and the decoded cover (`None` on any
    /// fetch or decode failure). It is not called if the request is cancelled first.
    pub fn resolve<F>(&mut self, url: Option<&str>, on_complete: F) -> Option<ArtworkRequest>
    where
        F: FnOnce(u64, Option<Cover>) + Send + 'static,
    {
        let url = url?;
        self.next_generation = self.next_generation.wrapping_add(1);
        let request = ArtworkRequest::new(url, self.next_generation);
        let worker_request = request.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let max_edge_px = self.max_edge_px;

        let spawned = thread::Builder::new()
            .name(format!("artwork-{}", request.generation()))
            .spawn(move || {
                let cover = fetch_cover(fetcher.as_ref(), &worker_request, max_edge_px);
                if worker_request.is_cancelled() {
                    debug!(
                        "ArtworkResolver: discarded superseded artwork {}",
                        worker_request.url()
                    );
                    return;
                }
                on_complete(worker_request.generation(), cover);
            });
        if let Err(err) = spawned {
            warn!("ArtworkResolver: failed to spawn artwork worker: {}", err);
        }
        Some(request)
    }
}

fn fetch_cover(
    fetcher: &dyn ArtworkFetcher,
    request: &ArtworkRequest,
    max_edge_px: u32,
) -> Option<Cover> {
    let url = request.url();
    let bytes = match fetcher.fetch(url) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("ArtworkResolver: {} ({})", err, url);
            return None;
        }
    };
    // Superseded while downloading; skip the decode.
    if request.is_cancelled() {
        return None;
    }
    let Some(image) = image_pipeline::normalize_cover_bytes(&bytes, max_edge_px) else {
        warn!("ArtworkResolver: undecodable artwork ({})", url);
        return None;
    };
    Some(Cover::new(url, image))
}

#[cfg(test)]
mod tests {
    use super::{fetch_cover, ArtworkFetcher, ArtworkRequest, ArtworkResolver, Cover};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let source =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba([1, 2, 3, 255])));
        let mut cursor = Cursor::new(Vec::<u8>::new());
        source
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("png encoding should succeed");
        cursor.into_inner()
    }

    struct StaticFetcher {
        body: Result<Vec<u8>, String>,
    }

    impl ArtworkFetcher for StaticFetcher {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>, String> {
            self.body.clone()
        }
    }

    /// Blocks each fetch until the test releases it.
    struct GatedFetcher {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl ArtworkFetcher for GatedFetcher {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>, String> {
            let gate = self.gate.lock().expect("gate lock");
            gate.recv_timeout(Duration::from_secs(5))
                .map_err(|_| "gate closed".to_string())?;
            Ok(png_bytes(2, 2))
        }
    }

    type Completion = (u64, Option<Cover>);

    #[test]
    fn test_absent_url_resolves_immediately_without_worker() {
        let fetcher = Arc::new(StaticFetcher {
            body: Ok(png_bytes(4, 4)),
        });
        let mut resolver = ArtworkResolver::new(fetcher, 64);
        let request = resolver.resolve(None, |_, _| panic!("must not complete"));
        assert!(request.is_none());
    }

    #[test]
    fn test_successful_fetch_is_decoded_and_downscaled() {
        let fetcher = Arc::new(StaticFetcher {
            body: Ok(png_bytes(200, 100)),
        });
        let mut resolver = ArtworkResolver::new(fetcher, 50);
        let (tx, rx) = mpsc::channel::<Completion>();
        let request = resolver
            .resolve(Some("https://img/cover.png"), move |generation, cover| {
                let _ = tx.send((generation, cover));
            })
            .expect("url present");

        let (generation, cover) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("resolution should complete");
        assert_eq!(generation, request.generation());
        let cover = cover.expect("png should decode");
        assert_eq!(cover.dimensions(), (50, 25));
        assert_eq!(cover.source_url(), "https://img/cover.png");
    }

    #[test]
    fn test_fetch_failure_completes_with_no_cover() {
        let fetcher = Arc::new(StaticFetcher {
            body: Err("connection refused".to_string()),
        });
        let mut resolver = ArtworkResolver::new(fetcher, 64);
        let (tx, rx) = mpsc::channel::<Completion>();
        resolver.resolve(Some("https://img/missing.png"), move |generation, cover| {
            let _ = tx.send((generation, cover));
        });

        let (_, cover) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("failure should still complete");
        assert!(cover.is_none());
    }

    #[test]
    fn test_cancelled_request_never_completes() {
        let (gate_tx, gate_rx) = mpsc::channel();
        let fetcher = Arc::new(GatedFetcher {
            gate: Mutex::new(gate_rx),
        });
        let mut resolver = ArtworkResolver::new(fetcher, 64);
        let (tx, rx) = mpsc::channel::<Completion>();
        let request = resolver
            .resolve(Some("https://img/slow.png"), move |generation, cover| {
                let _ = tx.send((generation, cover));
            })
            .expect("url present");

        request.cancel();
        gate_tx.send(()).expect("worker should be waiting");

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    /// Cancels `request` while "downloading", as a newer resolution would.
    struct SupersedingFetcher {
        request: ArtworkRequest,
    }

    impl ArtworkFetcher for SupersedingFetcher {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>, String> {
            self.request.cancel();
            Ok(png_bytes(64, 64))
        }
    }

    #[test]
    fn test_request_cancelled_during_download_is_not_decoded() {
        let request = ArtworkRequest::new("https://img/old.png", 3);
        let fetcher = SupersedingFetcher {
            request: request.clone(),
        };

        assert!(fetch_cover(&fetcher, &request, 32).is_none());
        assert!(request.is_cancelled());
    }

    #[test]
    fn test_generations_increase_per_resolution() {
        let fetcher = Arc::new(StaticFetcher {
            body: Err("offline".to_string()),
        });
        let mut resolver = ArtworkResolver::new(fetcher, 64);
        let first = resolver
            .resolve(Some("https://img/1.png"), |_, _| {})
            .expect("url present");
        let second = resolver
            .resolve(Some("https://img/2.png"), |_, _| {})
            .expect("url present");
        assert!(second.generation() > first.generation());
    }
}

//! Deal builders, configs and an in-process image fetcher

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use deal_harvester::{CarDeal, Config, DealId, ImageError, ImageFetcher, WeightedLimiter};

/// Any URL containing this marker fails with HTTP 404
pub const FAIL_MARKER: &str = "/broken/";

/// Image fetcher that writes the URL itself as the file body
///
/// Optionally watches a limiter and records the highest weight held while any
/// fetch was running.
pub struct MockFetcher {
    delay: Duration,
    limiter: Option<WeightedLimiter>,
    pub calls: AtomicUsize,
    pub peak_in_use: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            limiter: None,
            calls: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
        }
    }

    /// Sleep on every fetch so tasks overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record `limiter.in_use()` at the start of every fetch
    pub fn observing(mut self, limiter: WeightedLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

#[async_trait::async_trait]
impl ImageFetcher for MockFetcher {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limiter) = &self.limiter {
            self.peak_in_use.fetch_max(limiter.in_use(), Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if url.contains(FAIL_MARKER) {
            return Err(ImageError::HttpStatus { status: 404 });
        }
        tokio::fs::write(dest, url.as_bytes())
            .await
            .map_err(|source| ImageError::CreateFile {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(url.len() as u64)
    }
}

/// Config writing under `root` with the given sizes
pub fn test_config(root: &Path, deal_count: usize, window_size: usize, capacity: usize) -> Config {
    let mut config = Config::default();
    config.harvest.deal_count = deal_count;
    config.harvest.window_size = window_size;
    config.download.capacity = capacity;
    config.download.output_dir = root.to_path_buf();
    config
}

/// A deal tagged by its VIN with `images` image URLs
pub fn deal(tag: usize, images: usize) -> CarDeal {
    CarDeal {
        id: DealId(usize::MAX),
        manufacturer: "TOYOTA".to_string(),
        model: "Prius".to_string(),
        year: "2012".to_string(),
        vin: format!("VIN-{tag:05}"),
        price: 1000.0 + tag as f32,
        image_urls: (0..images)
            .map(|i| format!("https://static.example.ge/{tag}/{i}.jpg?size=large"))
            .collect(),
        ..CarDeal::default()
    }
}

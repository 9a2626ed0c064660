//! Run counters shared by the intake loop, download tasks and the writer.
//!
//! All counters are atomics so any task can update them without locking.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one harvest run
#[derive(Debug)]
pub struct HarvestStats {
    start_time: Instant,
    deals_received: AtomicUsize,
    images_saved: AtomicUsize,
    images_failed: AtomicUsize,
    image_bytes: AtomicU64,
    rows_written: AtomicUsize,
    rows_failed: AtomicUsize,
    windows_persisted: AtomicUsize,
}

/// Point-in-time copy of [`HarvestStats`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Deals taken off the producer channel
    pub deals_received: usize,
    /// Image files written
    pub images_saved: usize,
    /// Image URLs skipped after an error
    pub images_failed: usize,
    /// Bytes of image data written
    pub image_bytes: u64,
    /// CSV rows written
    pub rows_written: usize,
    /// CSV rows that failed to write
    pub rows_failed: usize,
    /// Windows flushed by the writer
    pub windows_persisted: usize,
    /// Wall time since the run started
    #[serde(skip)]
    pub elapsed: Duration,
}

impl HarvestStats {
    /// Create zeroed counters; the clock starts now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            deals_received: AtomicUsize::new(0),
            images_saved: AtomicUsize::new(0),
            images_failed: AtomicUsize::new(0),
            image_bytes: AtomicU64::new(0),
            rows_written: AtomicUsize::new(0),
            rows_failed: AtomicUsize::new(0),
            windows_persisted: AtomicUsize::new(0),
        }
    }

    pub(crate) fn increment_deals_received(&self) {
        self.deals_received.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_images(&self, saved: usize, failed: usize, bytes: u64) {
        self.images_saved.fetch_add(saved, Ordering::SeqCst);
        self.images_failed.fetch_add(failed, Ordering::SeqCst);
        self.image_bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    pub(crate) fn record_window(&self, rows_written: usize, rows_failed: usize) {
        self.rows_written.fetch_add(rows_written, Ordering::SeqCst);
        self.rows_failed.fetch_add(rows_failed, Ordering::SeqCst);
        self.windows_persisted.fetch_add(1, Ordering::SeqCst);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            deals_received: self.deals_received.load(Ordering::SeqCst),
            images_saved: self.images_saved.load(Ordering::SeqCst),
            images_failed: self.images_failed.load(Ordering::SeqCst),
            image_bytes: self.image_bytes.load(Ordering::SeqCst),
            rows_written: self.rows_written.load(Ordering::SeqCst),
            rows_failed: self.rows_failed.load(Ordering::SeqCst),
            windows_persisted: self.windows_persisted.load(Ordering::SeqCst),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for HarvestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nHarvest Statistics")?;
        writeln!(f, "------------------")?;
        writeln!(f, "  duration : {:?}", self.elapsed)?;
        writeln!(f, "  deals    : received: {}", self.deals_received)?;
        writeln!(
            f,
            "  rows     : written: {}, failed: {}, windows: {}",
            self.rows_written, self.rows_failed, self.windows_persisted
        )?;
        writeln!(
            f,
            "  images   : saved: {}, failed: {}, bytes: {}",
            self.images_saved, self.images_failed, self.image_bytes
        )
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = HarvestStats::new();
        stats.increment_deals_received();
        stats.increment_deals_received();
        stats.record_images(2, 1, 300);
        stats.record_images(0, 0, 0);
        stats.record_window(99, 1);

        let snap = stats.snapshot();
        assert_eq!(snap.deals_received, 2);
        assert_eq!(snap.images_saved, 2);
        assert_eq!(snap.images_failed, 1);
        assert_eq!(snap.image_bytes, 300);
        assert_eq!(snap.rows_written, 99);
        assert_eq!(snap.rows_failed, 1);
        assert_eq!(snap.windows_persisted, 1);
    }

    #[test]
    fn display_lists_every_section() {
        let text = HarvestStats::new().snapshot().to_string();
        for section in ["deals", "rows", "images"] {
            assert!(text.contains(section), "missing {section} in {text}");
        }
    }
}

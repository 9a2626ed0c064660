//! Record intake loop and the per-run context it threads through every task.
//!
//! The loop is the only sequential part of a run: it receives deals one at a
//! time, numbers them in arrival order, launches an image download per deal
//! and queues a persistence window every `window_size` deals. Nothing it
//! launches is awaited here; the [`CompletionBarrier`] collects all of it.

use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::barrier::CompletionBarrier;
use crate::config::Config;
use crate::fetcher::ImageFetcher;
use crate::images::ImageDownloadTask;
use crate::limiter::WeightedLimiter;
use crate::persistence::{BatchWriter, RowSink, SharedSink, WriteBatch, flush_sink};
use crate::stats::{HarvestStats, StatsSnapshot};
use crate::types::{CarDeal, DealId, Event, WriteWindow};

/// Upper bound on the record store's up-front allocation
const STORE_PREALLOC_LIMIT: usize = 1 << 20;

/// Shared state for one harvest run, constructed once and cloned into tasks
#[derive(Clone)]
pub struct HarvestContext {
    /// Run configuration
    pub config: Arc<Config>,
    /// Download admission control
    pub limiter: WeightedLimiter,
    /// Image transport
    pub fetcher: Arc<dyn ImageFetcher>,
    /// Tracks every spawned download and the writer
    pub barrier: CompletionBarrier,
    /// Run counters
    pub stats: Arc<HarvestStats>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Advanced once per deal received
    pub progress: ProgressBar,
}

impl HarvestContext {
    /// Fresh per-run state: a full limiter, an empty barrier, zeroed counters.
    ///
    /// The progress bar is hidden; replace `progress` to draw one.
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn ImageFetcher>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let limiter = WeightedLimiter::new(config.download.capacity);
        Self {
            config,
            limiter,
            fetcher,
            barrier: CompletionBarrier::new(),
            stats: Arc::new(HarvestStats::new()),
            event_tx,
            progress: ProgressBar::hidden(),
        }
    }

    /// Emit an event; absent subscribers are fine.
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// What the intake loop consumed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntakeSummary {
    /// Deals received and numbered
    pub received: usize,
    /// Deals the run asked for
    pub expected: usize,
    /// Windows handed to the writer, including the final partial one
    pub windows_queued: usize,
}

/// Result of a complete run, after every task has finished
#[derive(Clone, Debug, Serialize)]
pub struct HarvestReport {
    /// Deals received
    pub received: usize,
    /// Deals requested
    pub expected: usize,
    /// Windows queued for persistence
    pub windows_queued: usize,
    /// Final counters
    pub stats: StatsSnapshot,
}

impl HarvestReport {
    /// Whether the producer delivered every requested deal
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// Deals missing because the producer stopped early
    pub fn shortfall(&self) -> usize {
        self.expected.saturating_sub(self.received)
    }
}

/// Consume the producer channel until `deal_count` deals have arrived or the
/// channel closes.
///
/// Windows `[(k-1)W, kW)` are queued as soon as they fill; any remainder is
/// queued after the loop, so every received deal ends up in some window.
pub async fn run_intake(
    ctx: &HarvestContext,
    deals: &mut mpsc::Receiver<CarDeal>,
    writer: &BatchWriter,
) -> IntakeSummary {
    let deal_count = ctx.config.harvest.deal_count;
    let window_size = ctx.config.harvest.window_size.max(1);
    let images_root = ctx.config.images_dir();

    let mut store: Vec<Arc<CarDeal>> = Vec::with_capacity(deal_count.min(STORE_PREALLOC_LIMIT));
    let mut windows_queued = 0;

    while store.len() < deal_count {
        let Some(mut deal) = deals.recv().await else {
            tracing::warn!(
                received = store.len(),
                expected = deal_count,
                "Producer closed the channel before all deals arrived"
            );
            break;
        };

        let id = DealId(store.len());
        deal.id = id;
        let urls = deal.image_urls.clone();
        store.push(Arc::new(deal));

        ctx.stats.increment_deals_received();
        ctx.emit(Event::DealAccepted { id });
        dispatch_images(ctx, id, urls, &images_root);
        ctx.progress.inc(1);

        if store.len() % window_size == 0 {
            queue_window(ctx, writer, &store, store.len() - window_size).await;
            windows_queued += 1;
        }
    }

    let remainder = store.len() % window_size;
    if remainder != 0 {
        tracing::debug!(deals = remainder, "Queueing final partial window");
        queue_window(ctx, writer, &store, store.len() - remainder).await;
        windows_queued += 1;
    }

    IntakeSummary {
        received: store.len(),
        expected: deal_count,
        windows_queued,
    }
}

/// Run intake, then wait for every download and window write to finish.
///
/// `sink` must already hold the CSV header. The receiver is dropped as soon as
/// intake ends so the producer sees a closed channel and stops.
pub async fn harvest<S>(
    ctx: HarvestContext,
    sink: SharedSink<S>,
    mut deals: mpsc::Receiver<CarDeal>,
) -> HarvestReport
where
    S: RowSink + 'static,
{
    let writer = BatchWriter::spawn(
        Arc::clone(&sink),
        &ctx.barrier,
        Arc::clone(&ctx.stats),
        ctx.event_tx.clone(),
    );

    let intake = run_intake(&ctx, &mut deals, &writer).await;
    drop(deals);
    writer.close();
    ctx.progress.finish();

    ctx.barrier.wait().await;

    if let Err(e) = flush_sink(&sink).await {
        tracing::error!(error = %e, "Final flush of the data file failed");
    }

    let stats = ctx.stats.snapshot();
    tracing::info!(
        received = intake.received,
        expected = intake.expected,
        rows_written = stats.rows_written,
        images_saved = stats.images_saved,
        images_failed = stats.images_failed,
        "Harvest complete"
    );
    ctx.emit(Event::HarvestComplete {
        deals: intake.received,
        rows_written: stats.rows_written,
    });

    HarvestReport {
        received: intake.received,
        expected: intake.expected,
        windows_queued: intake.windows_queued,
        stats,
    }
}

fn dispatch_images(ctx: &HarvestContext, id: DealId, urls: Vec<String>, images_root: &Path) {
    let task = ImageDownloadTask {
        id,
        urls,
        images_root: images_root.to_path_buf(),
        limiter: ctx.limiter.clone(),
        fetcher: Arc::clone(&ctx.fetcher),
    };
    let stats = Arc::clone(&ctx.stats);
    let event_tx = ctx.event_tx.clone();

    ctx.barrier.spawn(async move {
        let outcome = task.run().await;
        stats.record_images(outcome.saved, outcome.failed, outcome.bytes);
        event_tx
            .send(Event::ImagesFinished {
                id,
                saved: outcome.saved,
                failed: outcome.failed,
            })
            .ok();
    });
}

async fn queue_window(
    ctx: &HarvestContext,
    writer: &BatchWriter,
    store: &[Arc<CarDeal>],
    from: usize,
) {
    let window = WriteWindow::new(from, store.len());
    let batch = WriteBatch {
        window,
        deals: store[window.from..window.to].to_vec(),
    };

    tracing::debug!(from = window.from, to = window.to, "Queueing window for persistence");
    match writer.submit(batch).await {
        Ok(()) => ctx.emit(Event::WindowQueued {
            from: window.from,
            to: window.to,
        }),
        Err(e) => tracing::error!(window = %window, error = %e, "Persistence writer is gone, window dropped"),
    }
}

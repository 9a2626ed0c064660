//! CSV persistence: fixed schema, output creation and the batched writer.
//!
//! Windows of deals are queued to a single writer task which drains them in
//! FIFO order. Each window is written inside one critical section on the
//! shared sink and flushed before the lock is released, so rows never
//! interleave and windows land in the file in the order they were queued.
//! Row writes are blocking file I/O and run on the blocking pool, never on an
//! async worker thread.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};

use crate::barrier::CompletionBarrier;
use crate::error::{Error, Result};
use crate::stats::HarvestStats;
use crate::types::{CarDeal, Event, WriteWindow};

/// Windows that may wait in the writer queue before `submit` applies backpressure
pub const WRITE_QUEUE_CAPACITY: usize = 64;

/// Column order of the persisted file
pub const CSV_HEADER: [&str; 18] = [
    "ID",
    "Manufacturer",
    "Model",
    "Year",
    "Category",
    "Mileage",
    "FuelType",
    "EngineVolume",
    "DriveWheels",
    "GearBox",
    "Doors",
    "Wheel",
    "Color",
    "InteriorColor",
    "VIN",
    "LeatherInterior",
    "Price",
    "Clearance",
];

/// Render a deal as one CSV row in [`CSV_HEADER`] order.
///
/// Price is truncated to a decimal integer; booleans become `true`/`false`.
/// Image URLs are not persisted.
pub fn deal_row(deal: &CarDeal) -> [String; 18] {
    [
        deal.id.to_string(),
        deal.manufacturer.clone(),
        deal.model.clone(),
        deal.year.clone(),
        deal.category.clone(),
        deal.mileage.clone(),
        deal.fuel_type.clone(),
        deal.engine_volume.clone(),
        deal.drive_wheels.clone(),
        deal.gear_box.clone(),
        deal.doors.clone(),
        deal.wheel.clone(),
        deal.color.clone(),
        deal.interior_color.clone(),
        deal.vin.clone(),
        deal.leather_interior.to_string(),
        (deal.price as i64).to_string(),
        deal.clearance.to_string(),
    ]
}

/// Destination for persisted rows, enabling testability.
pub trait RowSink: Send {
    /// Write one deal as a row.
    fn write_deal(&mut self, deal: &CarDeal) -> Result<()>;

    /// Push buffered rows to the underlying storage.
    fn flush(&mut self) -> Result<()>;
}

/// Production [`RowSink`] writing CSV through the `csv` crate
pub struct CsvSink<W: Write = File> {
    writer: csv::Writer<W>,
}

impl CsvSink<File> {
    /// Create (truncate) the CSV file at `path` and write the header.
    ///
    /// Failure here is the one fatal error of a run.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::OutputCreation {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_writer(file)
    }

    /// [`create`](CsvSink::create) on the blocking pool.
    pub async fn create_off_runtime(path: PathBuf) -> Result<Self> {
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || Self::create(&task_path))
            .await
            .map_err(|e| Error::OutputCreation {
                path,
                source: std::io::Error::other(format!("output creation task failed: {e}")),
            })?
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap any writer and emit the header row.
    pub fn from_writer(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    /// Flush and hand back the inner writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
    }
}

impl<W: Write + Send> RowSink for CsvSink<W> {
    fn write_deal(&mut self, deal: &CarDeal) -> Result<()> {
        self.writer.write_record(deal_row(deal))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Sink behind the persistence lock, shared between the writer and shutdown.
///
/// The lock is a blocking mutex; it is only taken on the blocking pool.
pub type SharedSink<S> = Arc<Mutex<S>>;

/// One window of deals, in identifier order
#[derive(Clone, Debug)]
pub struct WriteBatch {
    /// Identifier range covered
    pub window: WriteWindow,
    /// Deals `window.from .. window.to`
    pub deals: Vec<Arc<CarDeal>>,
}

/// Rows written and failed for one batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows written
    pub rows_written: usize,
    /// Rows that failed
    pub rows_failed: usize,
}

/// Write a batch inside one critical section, flushing before unlock.
///
/// A failing row is logged and skipped; the rest of the window is still written.
/// This blocks on file I/O; async callers go through [`persist_batch`].
pub fn write_batch<S: RowSink>(sink: &Mutex<S>, batch: &WriteBatch) -> BatchReport {
    let mut report = BatchReport::default();
    let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);

    for deal in &batch.deals {
        match guard.write_deal(deal) {
            Ok(()) => report.rows_written += 1,
            Err(e) => {
                report.rows_failed += 1;
                tracing::error!(
                    deal_id = deal.id.0,
                    window = %batch.window,
                    error = %e,
                    "Error occurred while writing deal row"
                );
            }
        }
    }

    if let Err(e) = guard.flush() {
        tracing::error!(window = %batch.window, error = %e, "Failed to flush CSV window");
    }
    report
}

/// Run [`write_batch`] on the blocking pool and wait for it.
///
/// A write task that panics counts the whole window as failed.
pub async fn persist_batch<S>(sink: &SharedSink<S>, batch: WriteBatch) -> BatchReport
where
    S: RowSink + 'static,
{
    let window = batch.window;
    let sink = Arc::clone(sink);
    match tokio::task::spawn_blocking(move || write_batch(&sink, &batch)).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(window = %window, error = %e, "CSV write task failed");
            BatchReport {
                rows_written: 0,
                rows_failed: window.len(),
            }
        }
    }
}

/// Flush the sink on the blocking pool.
pub async fn flush_sink<S>(sink: &SharedSink<S>) -> Result<()>
where
    S: RowSink + 'static,
{
    let sink = Arc::clone(sink);
    tokio::task::spawn_blocking(move || sink.lock().unwrap_or_else(PoisonError::into_inner).flush())
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("flush task failed: {e}"))))?
}

/// Handle for queueing windows to the single writer task
pub struct BatchWriter {
    tx: mpsc::Sender<WriteBatch>,
}

impl BatchWriter {
    /// Spawn the writer task on `barrier`.
    ///
    /// The task drains the queue in order until every `BatchWriter` handle has
    /// been dropped or [`closed`](BatchWriter::close), then exits.
    pub fn spawn<S>(
        sink: SharedSink<S>,
        barrier: &CompletionBarrier,
        stats: Arc<HarvestStats>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self
    where
        S: RowSink + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<WriteBatch>(WRITE_QUEUE_CAPACITY);

        barrier.spawn(async move {
            while let Some(batch) = rx.recv().await {
                let window = batch.window;
                // Awaited before the next recv, so windows stay in queue order
                let report = persist_batch(&sink, batch).await;
                stats.record_window(report.rows_written, report.rows_failed);
                tracing::debug!(
                    from = window.from,
                    to = window.to,
                    rows_written = report.rows_written,
                    rows_failed = report.rows_failed,
                    "Window persisted"
                );
                event_tx
                    .send(Event::WindowPersisted {
                        from: window.from,
                        to: window.to,
                        rows_written: report.rows_written,
                        rows_failed: report.rows_failed,
                    })
                    .ok();
            }
            tracing::trace!("Batch writer finished");
        });

        Self { tx }
    }

    /// Queue a window. Waits only if the queue is full.
    pub async fn submit(&self, batch: WriteBatch) -> Result<()> {
        self.tx.send(batch).await.map_err(|_| Error::ChannelClosed)
    }

    /// Stop accepting windows; the task exits once the queue is drained.
    pub fn close(self) {
        drop(self.tx);
    }
}

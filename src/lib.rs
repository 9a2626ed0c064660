//! # deal-harvester
//!
//! Concurrent harvester for car-deal listings.
//!
//! A producer (the bundled [`crawler`] or any task holding the channel sender)
//! delivers finished [`CarDeal`]s on a bounded channel. The intake loop numbers
//! them in arrival order, fans out one image download per deal under a global
//! weighted limit, and persists them to CSV in fixed-size windows through a
//! single ordered writer. Every spawned task is tracked, so a run returns only
//! after all rows are flushed and all images are attempted.
//!
//! ## Output
//!
//! ```text
//! <output_dir>/data.csv                       one row per deal, ordered by ID
//! <output_dir>/images/<deal-id>/<index>.<ext> one file per downloaded image
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use deal_harvester::{CarDeal, Config, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.harvest.deal_count = 2;
//!     config.download.output_dir = "out".into();
//!
//!     let harvester = Harvester::new(config)?;
//!     let (tx, rx) = harvester.deal_channel();
//!
//!     tokio::spawn(async move {
//!         for vin in ["VIN-A", "VIN-B"] {
//!             let deal = CarDeal {
//!                 vin: vin.to_string(),
//!                 ..CarDeal::default()
//!             };
//!             if tx.send(deal).await.is_err() {
//!                 break;
//!             }
//!         }
//!     });
//!
//!     let report = harvester.run_from(rx).await?;
//!     println!("{}", report.stats);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Completion barrier over spawned tasks
pub mod barrier;
/// Configuration types
pub mod config;
/// Listing and detail page crawler
pub mod crawler;
/// Error types
pub mod error;
/// HTML extraction
pub mod extract;
/// Image transport
pub mod fetcher;
/// Top-level harvester
pub mod harvester;
/// Per-deal image downloads
pub mod images;
/// Record intake loop
pub mod intake;
/// Weighted download admission control
pub mod limiter;
/// CSV persistence and the ordered batch writer
pub mod persistence;
/// Run statistics
pub mod stats;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, CrawlConfig, DownloadConfig, HarvestConfig, PersistenceConfig};
pub use crawler::{CrawlSummary, DealCrawler};
pub use error::{Error, ImageError, Result};
pub use fetcher::{HttpImageFetcher, ImageFetcher};
pub use harvester::Harvester;
pub use intake::{HarvestContext, HarvestReport};
pub use limiter::{WeightPermit, WeightedLimiter};
pub use persistence::{CsvSink, RowSink};
pub use stats::{HarvestStats, StatsSnapshot};
pub use types::{CarDeal, DealId, Event, WriteWindow};

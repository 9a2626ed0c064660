//! Core types for deal-harvester

use serde::{Deserialize, Serialize};

/// Sequential identifier assigned by the intake loop in arrival order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub usize);

impl From<usize> for DealId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discovered car deal.
///
/// Every attribute except `id` is filled in by the extractor before the deal is
/// handed to the intake loop. `id` is assigned exactly once, on arrival.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CarDeal {
    /// Arrival-order identifier (0-based)
    pub id: DealId,
    /// Manufacturer
    pub manufacturer: String,
    /// Model
    pub model: String,
    /// Production year
    pub year: String,
    /// Body category
    pub category: String,
    /// Mileage with units stripped
    pub mileage: String,
    /// Fuel type
    pub fuel_type: String,
    /// Engine volume
    pub engine_volume: String,
    /// Drive wheels
    pub drive_wheels: String,
    /// Gear box type
    pub gear_box: String,
    /// Doors
    pub doors: String,
    /// Steering wheel side
    pub wheel: String,
    /// Exterior color
    pub color: String,
    /// Interior color
    pub interior_color: String,
    /// Vehicle identification number
    pub vin: String,
    /// Leather interior present
    pub leather_interior: bool,
    /// Asking price in dollars
    pub price: f32,
    /// Customs-cleared
    pub clearance: bool,
    /// Image URLs in page order (not persisted to CSV)
    pub image_urls: Vec<String>,
}

impl CarDeal {
    /// Number of limiter units this deal's image download costs.
    pub fn download_weight(&self) -> usize {
        self.image_urls.len()
    }
}

/// Half-open range `[from, to)` of deal identifiers persisted together
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteWindow {
    /// First identifier in the window
    pub from: usize,
    /// One past the last identifier in the window
    pub to: usize,
}

impl WriteWindow {
    /// Create a window; `to` is clamped so the range is never inverted.
    pub fn new(from: usize, to: usize) -> Self {
        Self {
            from,
            to: to.max(from),
        }
    }

    /// Number of deals covered
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    /// Whether the window covers no deals
    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

impl std::fmt::Display for WriteWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Event emitted during a harvest run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A deal arrived on the channel and received its identifier
    DealAccepted {
        /// Assigned identifier
        id: DealId,
    },

    /// A deal's image download task finished
    ImagesFinished {
        /// Deal identifier
        id: DealId,
        /// Images written to disk
        saved: usize,
        /// Images skipped because of an error
        failed: usize,
    },

    /// A window was handed to the persistence writer
    WindowQueued {
        /// First identifier
        from: usize,
        /// One past the last identifier
        to: usize,
    },

    /// A window was written and flushed
    WindowPersisted {
        /// First identifier
        from: usize,
        /// One past the last identifier
        to: usize,
        /// Rows written successfully
        rows_written: usize,
        /// Rows that failed to serialize or write
        rows_failed: usize,
    },

    /// All dispatched work has finished
    HarvestComplete {
        /// Deals received from the producer
        deals: usize,
        /// Rows persisted in total
        rows_written: usize,
    },
}

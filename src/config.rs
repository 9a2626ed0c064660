//! Configuration types for deal-harvester

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Intake behavior (how many deals, window size, backpressure)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Number of deals to receive before the run ends (default: 100000)
    #[serde(default = "default_deal_count")]
    pub deal_count: usize,

    /// Deals per persisted window (default: 100)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Capacity of the producer channel (default: 100)
    ///
    /// This is the only throttle on how far extraction may run ahead of the
    /// intake loop.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            deal_count: default_deal_count(),
            window_size: default_window_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Image download settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output root; images go to `<output_dir>/images/<deal-id>/` (default: "MyAutoData")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Total limiter weight, i.e. image URLs in flight at once (default: 1000)
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            capacity: default_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// CSV persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// CSV file name, relative to the output directory (default: "data.csv")
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

/// Site crawl settings for the bundled producer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Site root used to resolve relative links (default: "https://www.myauto.ge")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Listing page path; `{page}` is replaced with the page number
    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    /// Hosts detail links may point at
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,

    /// Deals listed per page, used to derive the page count (default: 25)
    #[serde(default = "default_deals_per_page")]
    pub deals_per_page: usize,

    /// Detail pages fetched concurrently (default: 8)
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,

    /// User-Agent header for page requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            listing_path: default_listing_path(),
            allowed_domains: default_allowed_domains(),
            deals_per_page: default_deals_per_page(),
            detail_concurrency: default_detail_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for a harvest run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Intake settings
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Image download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// CSV persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Producer crawl settings
    #[serde(default)]
    pub crawl: CrawlConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.harvest.deal_count == 0 {
            return Err(Error::config("deal_count", "must be greater than zero"));
        }
        if self.harvest.window_size == 0 {
            return Err(Error::config("window_size", "must be greater than zero"));
        }
        if self.harvest.channel_capacity == 0 {
            return Err(Error::config("channel_capacity", "must be greater than zero"));
        }
        if self.download.capacity == 0 {
            return Err(Error::config("capacity", "must be greater than zero"));
        }
        if u32::try_from(self.download.capacity).is_err() {
            return Err(Error::config("capacity", "must fit in 32 bits"));
        }
        if self.crawl.deals_per_page == 0 {
            return Err(Error::config("deals_per_page", "must be greater than zero"));
        }
        Ok(())
    }

    /// Root directory for per-deal image folders
    pub fn images_dir(&self) -> PathBuf {
        self.download.output_dir.join("images")
    }

    /// Full path of the CSV file
    pub fn data_path(&self) -> PathBuf {
        self.download.output_dir.join(&self.persistence.data_file)
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.download.request_timeout_secs)
    }
}

fn default_deal_count() -> usize {
    100_000
}

fn default_window_size() -> usize {
    100
}

fn default_channel_capacity() -> usize {
    100
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("MyAutoData")
}

fn default_capacity() -> usize {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data.csv")
}

fn default_base_url() -> String {
    "https://www.myauto.ge".to_string()
}

fn default_listing_path() -> String {
    "/en/s/for-sale-cars?&currency_id=1&page={page}".to_string()
}

fn default_allowed_domains() -> Vec<String> {
    vec!["myauto.ge".to_string(), "www.myauto.ge".to_string()]
}

fn default_deals_per_page() -> usize {
    25
}

fn default_detail_concurrency() -> usize {
    8
}

fn default_user_agent() -> String {
    concat!("deal-harvester/", env!("CARGO_PKG_VERSION")).to_string()
}

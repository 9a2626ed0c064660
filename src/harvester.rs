//! Top-level entry point wiring configuration, producer and pipeline together.

use std::sync::{Arc, Mutex};

use indicatif::ProgressBar;
use tokio::sync::{broadcast, mpsc};

use crate::config::Config;
use crate::crawler::DealCrawler;
use crate::error::Result;
use crate::fetcher::{HttpImageFetcher, ImageFetcher, http_client};
use crate::intake::{HarvestContext, HarvestReport, harvest};
use crate::persistence::CsvSink;
use crate::types::{CarDeal, Event};

/// Harvests deals into `<output_dir>/data.csv` and `<output_dir>/images/`
///
/// # Examples
///
/// ```no_run
/// use deal_harvester::{Config, Harvester};
///
/// # async fn example() -> deal_harvester::Result<()> {
/// let mut config = Config::default();
/// config.harvest.deal_count = 500;
///
/// let harvester = Harvester::new(config)?;
/// let mut events = harvester.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{event:?}");
///     }
/// });
///
/// let report = harvester.run().await?;
/// println!("{}", report.stats);
/// # Ok(())
/// # }
/// ```
pub struct Harvester {
    config: Arc<Config>,
    client: reqwest::Client,
    fetcher: Arc<dyn ImageFetcher>,
    event_tx: broadcast::Sender<Event>,
    progress: ProgressBar,
}

impl Harvester {
    /// Validate `config` and build the shared HTTP client.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = http_client(config.request_timeout(), &config.crawl.user_agent)?;
        let fetcher = Arc::new(HttpImageFetcher::with_client(client.clone()));
        Ok(Self::build(config, client, fetcher))
    }

    /// Like [`new`](Harvester::new) but with a custom image transport.
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn ImageFetcher>) -> Result<Self> {
        config.validate()?;
        let client = http_client(config.request_timeout(), &config.crawl.user_agent)?;
        Ok(Self::build(config, client, fetcher))
    }

    fn build(config: Config, client: reqwest::Client, fetcher: Arc<dyn ImageFetcher>) -> Self {
        // Subscribers that fall more than 1000 events behind see a Lagged error
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            config: Arc::new(config),
            client,
            fetcher,
            event_tx,
            progress: ProgressBar::hidden(),
        }
    }

    /// Draw progress on `bar`; its length is set to `deal_count`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        bar.set_length(self.config.harvest.deal_count as u64);
        self.progress = bar;
        self
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bounded producer channel sized by `channel_capacity`.
    pub fn deal_channel(&self) -> (mpsc::Sender<CarDeal>, mpsc::Receiver<CarDeal>) {
        mpsc::channel(self.config.harvest.channel_capacity)
    }

    /// Crawl the site and harvest until `deal_count` deals have been processed.
    ///
    /// Only a failure to create the CSV file is returned as an error.
    pub async fn run(&self) -> Result<HarvestReport> {
        let sink = self.prepare_output().await?;
        let crawler = DealCrawler::new(Arc::clone(&self.config), self.client.clone())?;

        let (tx, rx) = self.deal_channel();
        let crawl = crawler.spawn(tx);

        let report = harvest(self.context(), Arc::new(Mutex::new(sink)), rx).await;

        // Intake dropped the receiver; the crawler stops at its next send
        crawl.abort();
        Ok(report)
    }

    /// Harvest deals from an external producer instead of the built-in crawler.
    pub async fn run_from(&self, deals: mpsc::Receiver<CarDeal>) -> Result<HarvestReport> {
        let sink = self.prepare_output().await?;
        Ok(harvest(self.context(), Arc::new(Mutex::new(sink)), deals).await)
    }

    fn context(&self) -> HarvestContext {
        let mut ctx = HarvestContext::new(
            Arc::clone(&self.config),
            Arc::clone(&self.fetcher),
            self.event_tx.clone(),
        );
        ctx.progress = self.progress.clone();
        ctx
    }

    async fn prepare_output(&self) -> Result<CsvSink> {
        let images_dir = self.config.images_dir();
        if let Err(e) = tokio::fs::create_dir_all(&images_dir).await {
            tracing::warn!(path = %images_dir.display(), error = %e, "Couldn't create images directory");
        }

        let data_path = self.config.data_path();
        let sink = CsvSink::create_off_runtime(data_path.clone()).await?;
        tracing::info!(
            data_file = %data_path.display(),
            images_dir = %images_dir.display(),
            deal_count = self.config.harvest.deal_count,
            window_size = self.config.harvest.window_size,
            capacity = self.config.download.capacity,
            "Output prepared"
        );
        Ok(sink)
    }
}

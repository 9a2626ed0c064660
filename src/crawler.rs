//! Listing page crawler, the producer side of the deal channel.
//!
//! Walks numbered listing pages, fetches each new detail page concurrently,
//! parses it and hands the finished deal to the intake loop. The bounded
//! channel is the only backpressure: when it is full the crawler waits, and
//! when the intake loop drops the receiver the crawler stops.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::Config;
use crate::error::Result;
use crate::extract::DealExtractor;
use crate::types::CarDeal;

/// Counters for one crawl
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    /// Listing pages fetched
    pub pages_visited: usize,
    /// Detail pages fetched
    pub detail_pages: usize,
    /// Deals delivered on the channel
    pub deals_sent: usize,
    /// Pages that failed to fetch or held no deal
    pub failures: usize,
}

/// Crawls listing pages and sends a [`CarDeal`] per detail page
pub struct DealCrawler {
    config: Arc<Config>,
    client: reqwest::Client,
    extractor: DealExtractor,
    base: Url,
}

impl DealCrawler {
    /// Create a crawler sharing `client` with the image downloads.
    pub fn new(config: Arc<Config>, client: reqwest::Client) -> Result<Self> {
        let base = Url::parse(&config.crawl.base_url)?;
        Ok(Self {
            config,
            client,
            extractor: DealExtractor::new()?,
            base,
        })
    }

    /// Listing pages needed to cover `deal_count` deals
    pub fn page_count(&self) -> usize {
        let per_page = self.config.crawl.deals_per_page.max(1);
        self.config.harvest.deal_count.div_ceil(per_page)
    }

    /// Absolute URL of listing page `page` (1-based)
    pub fn listing_url(&self, page: usize) -> Result<Url> {
        let path = self
            .config
            .crawl
            .listing_path
            .replace("{page}", &page.to_string());
        Ok(self.base.join(&path)?)
    }

    /// Run the crawl on its own task.
    pub fn spawn(self, tx: mpsc::Sender<CarDeal>) -> JoinHandle<CrawlSummary> {
        tokio::spawn(async move { self.run(tx).await })
    }

    /// Crawl until the pages run out or the receiver goes away.
    ///
    /// Fetch and parse failures are logged and skipped; nothing is retried.
    pub async fn run(&self, tx: mpsc::Sender<CarDeal>) -> CrawlSummary {
        let mut summary = CrawlSummary::default();
        let mut visited: HashSet<Url> = HashSet::new();
        let concurrency = self.config.crawl.detail_concurrency.max(1);
        let pages = self.page_count();

        tracing::info!(pages, "Starting listing crawl");

        for page in 1..=pages {
            if tx.is_closed() {
                tracing::debug!(page, "Deal channel closed, stopping crawl");
                break;
            }

            let listing = match self.listing_url(page) {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!(page, error = %e, "Couldn't build listing URL");
                    summary.failures += 1;
                    continue;
                }
            };
            let html = match self.fetch_text(&listing).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(page, url = %listing, error = %e, "Couldn't fetch listing page");
                    summary.failures += 1;
                    continue;
                }
            };
            summary.pages_visited += 1;

            let links: Vec<Url> = self
                .extractor
                .listing_links(&html, &listing)
                .into_iter()
                .filter(|link| self.is_allowed(link))
                .filter(|link| visited.insert(link.clone()))
                .collect();
            tracing::debug!(page, links = links.len(), "Listing page parsed");

            let mut details = stream::iter(links)
                .map(|link| async move {
                    let result = self.fetch_deal(&link).await;
                    (link, result)
                })
                .buffer_unordered(concurrency);

            while let Some((link, result)) = details.next().await {
                match result {
                    Ok(Some(deal)) => {
                        summary.detail_pages += 1;
                        if tx.send(deal).await.is_err() {
                            tracing::debug!("Deal channel closed, stopping crawl");
                            return summary;
                        }
                        summary.deals_sent += 1;
                    }
                    Ok(None) => {
                        summary.detail_pages += 1;
                        summary.failures += 1;
                        tracing::debug!(url = %link, "Detail page held no deal");
                    }
                    Err(e) => {
                        summary.failures += 1;
                        tracing::warn!(url = %link, error = %e, "Couldn't fetch detail page");
                    }
                }
            }
        }

        tracing::info!(
            pages_visited = summary.pages_visited,
            deals_sent = summary.deals_sent,
            failures = summary.failures,
            "Listing crawl finished"
        );
        summary
    }

    fn is_allowed(&self, link: &Url) -> bool {
        link.host_str().is_some_and(|host| {
            self.config
                .crawl
                .allowed_domains
                .iter()
                .any(|allowed| allowed == host)
        })
    }

    async fn fetch_text(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_deal(&self, url: &Url) -> Result<Option<CarDeal>> {
        let html = self.fetch_text(url).await?;
        Ok(self.extractor.parse_deal(&html, url))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn detail_html(vin: &str) -> String {
        format!(
            r#"<div class="container-main">
                 <table><tr><th class="th-left"><div class="th-key">VIN</div><div class="th-value">{vin}</div></th></tr></table>
                 <div class="thumbnail-image"><img src="/img/{vin}.jpg"></div>
               </div>"#
        )
    }

    fn crawler(server: &MockServer, deal_count: usize) -> DealCrawler {
        let mut config = Config::default();
        config.harvest.deal_count = deal_count;
        config.crawl.base_url = server.uri();
        config.crawl.listing_path = "/list?page={page}".to_string();
        config.crawl.allowed_domains = vec!["127.0.0.1".to_string()];
        DealCrawler::new(Arc::new(config), reqwest::Client::new()).unwrap()
    }

    async fn mount_listing(server: &MockServer, page: &str, body: String) {
        Mock::given(method("GET"))
            .and(path("/list"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_detail(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn listing(links: &[&str]) -> String {
        links
            .iter()
            .map(|href| format!(r#"<figure class="search-list-figure"><a href="{href}">deal</a></figure>"#))
            .collect()
    }

    #[test]
    fn page_count_covers_every_deal() {
        let mut config = Config::default();
        config.harvest.deal_count = 250;
        let c = DealCrawler::new(Arc::new(config.clone()), reqwest::Client::new()).unwrap();
        assert_eq!(c.page_count(), 10);

        config.harvest.deal_count = 251;
        let c = DealCrawler::new(Arc::new(config), reqwest::Client::new()).unwrap();
        assert_eq!(c.page_count(), 11);
    }

    #[test]
    fn listing_url_substitutes_page_number() {
        let c = DealCrawler::new(Arc::new(Config::default()), reqwest::Client::new()).unwrap();
        assert_eq!(
            c.listing_url(7).unwrap().as_str(),
            "https://www.myauto.ge/en/s/for-sale-cars?&currency_id=1&page=7"
        );
    }

    #[tokio::test]
    async fn delivers_each_allowed_detail_page_once() {
        let server = MockServer::start().await;
        mount_listing(
            &server,
            "1",
            listing(&["/pr/1", "/pr/2", "/pr/1", "https://elsewhere.example/pr/3"]),
        )
        .await;
        mount_detail(&server, "/pr/1", 200, detail_html("VIN1")).await;
        mount_detail(&server, "/pr/2", 200, detail_html("VIN2")).await;

        let (tx, mut rx) = mpsc::channel(10);
        let summary = crawler(&server, 2).run(tx).await;

        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.deals_sent, 2);
        assert_eq!(summary.failures, 0);

        let mut vins = Vec::new();
        while let Ok(deal) = rx.try_recv() {
            assert_eq!(
                deal.image_urls,
                vec![format!("{}/img/{}.jpg", server.uri(), deal.vin)],
                "thumbnail resolved against the detail page"
            );
            vins.push(deal.vin);
        }
        vins.sort();
        assert_eq!(vins, vec!["VIN1", "VIN2"]);
    }

    #[tokio::test]
    async fn failing_detail_page_is_skipped() {
        let server = MockServer::start().await;
        mount_listing(&server, "1", listing(&["/pr/ok", "/pr/broken", "/pr/empty"])).await;
        mount_detail(&server, "/pr/ok", 200, detail_html("OK")).await;
        mount_detail(&server, "/pr/broken", 500, String::new()).await;
        mount_detail(&server, "/pr/empty", 200, "<p>removed</p>".to_string()).await;

        let (tx, mut rx) = mpsc::channel(10);
        let summary = crawler(&server, 3).run(tx).await;

        assert_eq!(summary.deals_sent, 1);
        assert_eq!(summary.failures, 2);
        assert_eq!(rx.try_recv().unwrap().vin, "OK");
    }

    #[tokio::test]
    async fn closed_receiver_stops_before_any_request() {
        let server = MockServer::start().await;
        mount_listing(&server, "1", listing(&["/pr/1"])).await;

        let (tx, rx) = mpsc::channel(10);
        drop(rx);
        let summary = crawler(&server, 25).run(tx).await;

        assert_eq!(summary, CrawlSummary::default());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

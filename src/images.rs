//! Per-deal image download task.
//!
//! One task per deal: take `len(image_urls)` units from the limiter, create
//! `<images_root>/<deal-id>/`, then fetch every URL into `<index>.<ext>`.
//! Each URL succeeds or fails on its own; a partial set of files is a normal
//! outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ImageError;
use crate::fetcher::ImageFetcher;
use crate::limiter::WeightedLimiter;
use crate::types::DealId;

/// Everything a single image download task needs
pub struct ImageDownloadTask {
    /// Deal whose images are fetched
    pub id: DealId,
    /// Image URLs in page order; the index becomes the file name
    pub urls: Vec<String>,
    /// Root under which the per-deal directory is created
    pub images_root: PathBuf,
    /// Shared admission control
    pub limiter: WeightedLimiter,
    /// Transport
    pub fetcher: Arc<dyn ImageFetcher>,
}

/// What a finished task produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageOutcome {
    /// Files written
    pub saved: usize,
    /// URLs skipped because of an error
    pub failed: usize,
    /// Total bytes written
    pub bytes: u64,
}

impl ImageDownloadTask {
    /// Run the task to completion. Never fails; errors are logged per URL.
    pub async fn run(self) -> ImageOutcome {
        let ImageDownloadTask {
            id,
            urls,
            images_root,
            limiter,
            fetcher,
        } = self;

        if urls.is_empty() {
            tracing::trace!(deal_id = id.0, "No images to download");
            return ImageOutcome::default();
        }

        // Held until the end of this function, whichever way it returns
        let _permit = limiter.acquire(urls.len()).await;

        let dir = deal_image_dir(&images_root, id);
        if let Err(source) = tokio::fs::create_dir_all(&dir).await {
            let err = ImageError::CreateDir {
                path: dir.clone(),
                source,
            };
            tracing::error!(deal_id = id.0, error = %err, "Couldn't create directory for deal images");
            return ImageOutcome {
                failed: urls.len(),
                ..ImageOutcome::default()
            };
        }

        let mut outcome = ImageOutcome::default();
        for (index, url) in urls.iter().enumerate() {
            let dest = dir.join(image_file_name(index, url));
            match fetcher.fetch_to_file(url, &dest).await {
                Ok(bytes) => {
                    outcome.saved += 1;
                    outcome.bytes += bytes;
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        deal_id = id.0,
                        image_index = index,
                        url = %url,
                        error = %e,
                        "Couldn't download deal image"
                    );
                }
            }
        }

        tracing::debug!(
            deal_id = id.0,
            saved = outcome.saved,
            failed = outcome.failed,
            "Deal images finished"
        );
        outcome
    }
}

/// Directory holding one deal's images
pub fn deal_image_dir(images_root: &Path, id: DealId) -> PathBuf {
    images_root.join(id.to_string())
}

/// `<index>.<ext>`, or just `<index>` when the URL carries no extension
pub fn image_file_name(index: usize, url: &str) -> String {
    match image_extension(url) {
        Some(ext) => format!("{index}.{ext}"),
        None => index.to_string(),
    }
}

/// Extension of the URL's trailing path segment, ignoring query and fragment.
pub fn image_extension(url: &str) -> Option<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let without_query = &url[..end];

    let path = match without_query.find("://") {
        Some(scheme_end) => {
            let rest = &without_query[scheme_end + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => without_query,
    };

    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

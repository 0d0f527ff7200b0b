//! Batch assembly: pick the next identifiers to work on, and download them.

use std::sync::Arc;

use futures::{StreamExt as _, stream};

use crate::{
    errors::FetchError,
    fetch::{DownloadedImage, Fetcher, local::list_image_files},
    identifier::Identifier,
    prelude::*,
    tracker::ProgressTracker,
    ui::{ProgressConfig, Ui},
};

/// Where candidate identifiers come from, in processing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentifierSource {
    /// Zero-padded sequence numbers `start..=end`, e.g. `00001.JPG`.
    Range {
        start: u32,
        end: u32,
        width: usize,
        suffix: String,
    },

    /// An explicit list, e.g. from a file or a directory listing.
    List(Vec<Identifier>),
}

impl IdentifierSource {
    /// Read identifiers from a text file, one per line, skipping blank lines.
    pub async fn from_list_file(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read identifier list {}", path.display()))?;
        let ids = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Identifier::new)
            .collect();
        Ok(Self::List(ids))
    }

    /// Use the image files in `dir`, sorted by name.
    pub async fn from_directory(dir: &Path) -> Result<Self> {
        Ok(Self::List(list_image_files(dir).await?))
    }

    /// Iterate over all candidates in order. Ranges are generated lazily.
    pub fn candidates(&self) -> Box<dyn Iterator<Item = Identifier> + '_> {
        match self {
            IdentifierSource::Range {
                start,
                end,
                width,
                suffix,
            } => Box::new(
                (*start..=*end).map(move |n| Identifier::from_index(n, *width, suffix)),
            ),
            IdentifierSource::List(ids) => Box::new(ids.iter().cloned()),
        }
    }
}

/// The result of looking for more work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchSelection {
    /// Every candidate has already been processed.
    Exhausted,

    /// Up to `max_size` unprocessed identifiers, in source order.
    Ready(Vec<Identifier>),
}

/// Select the next batch: the first `max_size` candidates from `source`
/// which `tracker` hasn't seen. Scanning stops as soon as the batch is full.
///
/// If the source runs out first, a short batch is returned; if nothing at all
/// is left, we return [`BatchSelection::Exhausted`].
pub fn select_batch(
    source: &IdentifierSource,
    tracker: &ProgressTracker,
    max_size: usize,
) -> BatchSelection {
    let ids = source
        .candidates()
        .filter(|id| !tracker.has(id))
        .take(max_size)
        .collect::<Vec<_>>();
    if ids.is_empty() {
        BatchSelection::Exhausted
    } else {
        BatchSelection::Ready(ids)
    }
}

/// Images downloaded for one batch.
#[derive(Debug)]
pub struct FetchedBatch {
    /// Successful downloads, in the same order as the selected identifiers.
    pub images: Vec<DownloadedImage>,

    /// Identifiers we couldn't fetch. These are left for a later run.
    pub failures: Vec<FetchError>,
}

/// Download `ids` with at most `workers` requests in flight.
///
/// Failures are logged and collected, never fatal. Results are put back into
/// selection order, however the downloads happen to finish.
#[instrument(level = "debug", skip_all, fields(count = ids.len()))]
pub async fn fetch_batch(
    ui: &Ui,
    fetcher: Arc<dyn Fetcher>,
    ids: &[Identifier],
    workers: usize,
) -> FetchedBatch {
    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📥",
            msg: "Downloading images",
            done_msg: "Downloaded images",
        },
        ids.len() as u64,
    );

    let downloads = stream::iter(ids.iter().cloned().enumerate())
        .map(|(idx, id)| {
            let fetcher = fetcher.clone();
            async move { (idx, fetcher.fetch(&id).await) }
        })
        .buffer_unordered(workers.max(1));
    let mut results = pb.wrap_stream(downloads).collect::<Vec<_>>().await;
    results.sort_by_key(|(idx, _)| *idx);

    let mut images = vec![];
    let mut failures = vec![];
    for (_, result) in results {
        match result {
            Ok(image) => images.push(image),
            Err(err) => {
                warn!(id = %err.identifier(), "Skipping image: {err}");
                failures.push(err);
            }
        }
    }
    FetchedBatch { images, failures }
}

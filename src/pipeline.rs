//! The batch transcription pipeline.
//!
//! One run goes: select unprocessed identifiers → download them in parallel →
//! send them to the model in a single request → write the response → mark the
//! downloaded identifiers as done. Running again picks up where we left off.
//!
//! The only consistency guarantee is "at least once, never partially done": if
//! the completion request fails, nothing from that batch is recorded, so the
//! whole batch is retried by the next run.

use std::sync::Arc;

use crate::{
    batch::{BatchSelection, IdentifierSource, fetch_batch, select_batch},
    config::PipelineConfig,
    drivers::{Driver, TokenUsage, complete_with_timeout},
    fetch::Fetcher,
    identifier::Identifier,
    prelude::*,
    prompt::BatchPrompt,
    tracker::ProgressTracker,
    ui::{ProgressConfig, Ui},
    writer::ResponseWriter,
};

/// What happened during a single batch run.
#[derive(Debug)]
pub enum RunOutcome {
    /// There was nothing left to do.
    Exhausted,

    /// `--dry-run`: this is what we would have processed.
    DryRun { ids: Vec<Identifier> },

    /// Work remained, but every download failed. Nothing was persisted.
    NothingFetched { failed: Vec<Identifier> },

    /// A batch was transcribed and recorded.
    Completed(BatchReport),
}

/// Details of a successfully committed batch.
#[derive(Debug)]
pub struct BatchReport {
    /// The key derived from the first image in the batch, plus a `_N` suffix
    /// if an earlier batch already used it.
    pub batch_key: String,

    /// The response file we wrote.
    pub path: PathBuf,

    /// Identifiers which were transcribed and marked.
    pub ids: Vec<Identifier>,

    /// Identifiers which couldn't be downloaded and were left for later.
    pub failed: Vec<Identifier>,

    /// Token usage, if reported.
    pub token_usage: Option<TokenUsage>,
}

/// Totals over several batch runs.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Batches committed.
    pub batches: usize,

    /// Images transcribed.
    pub images: usize,

    /// Downloads which failed.
    pub failed_downloads: usize,

    /// Did we run out of work?
    pub exhausted: bool,

    /// Tokens used across all batches.
    pub token_usage: TokenUsage,
}

/// A configured pipeline, holding everything one invocation needs.
pub struct Pipeline {
    ui: Ui,
    config: PipelineConfig,
    source: IdentifierSource,
    fetcher: Arc<dyn Fetcher>,
    driver: Box<dyn Driver>,
    prompt: BatchPrompt,
    writer: ResponseWriter,
    tracker: ProgressTracker,
}

impl Pipeline {
    /// Build a pipeline, loading the progress tracker named in `config`.
    pub async fn new(
        ui: Ui,
        config: PipelineConfig,
        source: IdentifierSource,
        fetcher: Arc<dyn Fetcher>,
        driver: Box<dyn Driver>,
        prompt: BatchPrompt,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = ProgressTracker::load(&config.state_file).await?;
        let writer =
            ResponseWriter::new(&config.output_dir, config.transcript_file.clone());
        Ok(Self {
            ui,
            config,
            source,
            fetcher,
            driver,
            prompt,
            writer,
            tracker,
        })
    }

    /// Our progress tracker.
    #[cfg(test)]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Our prompt.
    pub fn prompt(&self) -> &BatchPrompt {
        &self.prompt
    }

    /// Process a single batch.
    ///
    /// Returns an error if the completion request fails; in that case the
    /// tracker is untouched and no response file is written.
    #[instrument(level = "debug", skip_all)]
    pub async fn run_once(&mut self, dry_run: bool) -> Result<RunOutcome> {
        let ids = match select_batch(&self.source, &self.tracker, self.config.batch_size) {
            BatchSelection::Exhausted => {
                info!(processed = self.tracker.len(), "No unprocessed images left");
                return Ok(RunOutcome::Exhausted);
            }
            BatchSelection::Ready(ids) => ids,
        };
        info!(
            count = ids.len(),
            first = %ids[0],
            "Selected batch"
        );
        if dry_run {
            return Ok(RunOutcome::DryRun { ids });
        }

        // Download everything we can. Failed identifiers are simply left
        // unmarked.
        let fetched = fetch_batch(
            &self.ui,
            self.fetcher.clone(),
            &ids,
            self.config.batch_size,
        )
        .await;
        let failed = fetched
            .failures
            .iter()
            .map(|err| err.identifier().clone())
            .collect::<Vec<_>>();
        if fetched.images.is_empty() {
            warn!(failed = failed.len(), "No images could be downloaded for this batch");
            return Ok(RunOutcome::NothingFetched { failed });
        }

        // One request for the whole batch.
        let request = self.prompt.build_request(&fetched.images);
        info!(
            images = fetched.images.len(),
            model = %self.config.model_id,
            "Sending batch to model"
        );
        let spinner = self.ui.new_spinner(&ProgressConfig {
            emoji: "🤖",
            msg: "Waiting for model",
            done_msg: "Model responded",
        });
        let result = complete_with_timeout(
            self.driver.as_ref(),
            &self.config.model_id,
            &request,
            self.config.api_timeout,
        )
        .await;
        let completion = match result {
            Ok(completion) => {
                spinner.finish();
                completion
            }
            Err(err) => {
                spinner.finish_and_clear();
                error!("Abandoning batch: {err}");
                return Err(anyhow::Error::from(err).context(format!(
                    "batch starting at {} was abandoned; it will be retried on the next run",
                    fetched.images[0].id
                )));
            }
        };
        if let Some(usage) = &completion.token_usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        // Write first, then mark.
        let batch_key = fetched.images[0].id.batch_key();
        let done = fetched
            .images
            .iter()
            .map(|image| image.id.clone())
            .collect::<Vec<_>>();
        let saved = self
            .writer
            .commit_batch(&mut self.tracker, &batch_key, &done, &completion.text)
            .await?;
        info!(path = %saved.path.display(), images = done.len(), "Saved batch response");

        Ok(RunOutcome::Completed(BatchReport {
            batch_key: saved.batch_key,
            path: saved.path,
            ids: done,
            failed,
            token_usage: completion.token_usage,
        }))
    }

    /// Process up to `max_batches` batches, stopping early when we run out of
    /// work or when a whole batch fails to download (retrying it immediately
    /// would just select the same identifiers again).
    pub async fn run(&mut self, max_batches: usize) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for _ in 0..max_batches {
            match self.run_once(false).await? {
                RunOutcome::Exhausted => {
                    summary.exhausted = true;
                    break;
                }
                RunOutcome::NothingFetched { failed } => {
                    summary.failed_downloads += failed.len();
                    break;
                }
                RunOutcome::DryRun { .. } => break,
                RunOutcome::Completed(report) => {
                    debug!(
                        batch_key = %report.batch_key,
                        path = %report.path.display(),
                        "Committed batch"
                    );
                    summary.batches += 1;
                    summary.images += report.ids.len();
                    summary.failed_downloads += report.failed.len();
                    if let Some(usage) = report.token_usage {
                        summary.token_usage += usage;
                    }
                }
            }
        }
        Ok(summary)
    }
}

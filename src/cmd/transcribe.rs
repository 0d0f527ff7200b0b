//! The `transcribe` subcommand.

use std::{sync::Arc, time::Duration};

use clap::Args;

use crate::{
    batch::IdentifierSource,
    config::{DEFAULT_BASE_URL, DEFAULT_MODEL_ID, PipelineConfig},
    drivers::DriverType,
    fetch::{Fetcher, archive::ArchiveFetcher, local::LocalFetcher},
    pipeline::{Pipeline, RunOutcome},
    prelude::*,
    prompt::BatchPrompt,
    ui::Ui,
};

/// Transcribe command line arguments.
#[derive(Debug, Args)]
pub struct TranscribeOpts {
    /// Transcribe the images in this local directory instead of downloading
    /// them from the archive.
    #[clap(long = "image_dir", visible_alias = "image-dir", value_name = "DIR")]
    pub image_dir: Option<PathBuf>,

    /// Download the identifiers listed in this file (one per line) instead of
    /// a numeric range.
    #[clap(
        long = "id_list",
        visible_alias = "id-list",
        value_name = "FILE",
        conflicts_with = "image_dir"
    )]
    pub id_list: Option<PathBuf>,

    /// Directory for `batch_*.txt` response files.
    #[clap(
        long = "output_dir",
        visible_alias = "output-dir",
        value_name = "DIR",
        default_value = "outputs"
    )]
    pub output_dir: PathBuf,

    /// Also append every response to this single transcript file.
    #[clap(long = "output_file", visible_alias = "output-file", value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// File recording which identifiers are done.
    #[clap(
        long = "state_file",
        visible_alias = "state-file",
        value_name = "FILE",
        default_value = "processed_files.txt"
    )]
    pub state_file: PathBuf,

    /// Archive URL prefix. Identifiers are appended to this.
    #[clap(long, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// The model to use.
    #[clap(short = 'm', long, default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    /// Maximum images per request. Also the number of parallel downloads.
    #[clap(short = 'b', long, default_value_t = 20)]
    pub batch_size: usize,

    /// First sequence number to consider.
    #[clap(long, default_value_t = 1)]
    pub start: u32,

    /// Last sequence number to consider.
    #[clap(long, default_value_t = 700)]
    pub max_identifier: u32,

    /// Zero-padded width of generated identifiers.
    #[clap(long, default_value_t = 5)]
    pub id_width: usize,

    /// Suffix appended to generated identifiers.
    #[clap(long, default_value = ".JPG")]
    pub id_suffix: String,

    /// How many batches to run before stopping.
    #[clap(long, default_value_t = 1)]
    pub batches: usize,

    /// Show the next batch and the prompt, without downloading or calling
    /// the model.
    #[clap(long)]
    pub dry_run: bool,

    /// Give up on a completion request after this many seconds.
    #[clap(long, value_name = "SECS", default_value_t = 300)]
    pub api_timeout: u64,

    /// Give up on a single image download after this many seconds.
    #[clap(long, value_name = "SECS", default_value_t = 15)]
    pub fetch_timeout: u64,

    /// Which completion backend to use.
    #[clap(long, value_enum, default_value_t = DriverType::default())]
    pub driver: DriverType,

    /// A plain-text file to use instead of the built-in instructions.
    #[clap(long, value_name = "FILE")]
    pub prompt: Option<PathBuf>,
}

impl TranscribeOpts {
    /// Collect our settings into a [`PipelineConfig`]. This does not look at
    /// the environment.
    fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            base_url: self.base_url.clone(),
            model_id: self.model.clone(),
            batch_size: self.batch_size,
            max_identifier: self.max_identifier,
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            api_timeout: Duration::from_secs(self.api_timeout),
            output_dir: self.output_dir.clone(),
            state_file: self.state_file.clone(),
            transcript_file: self.output_file.clone(),
            ..PipelineConfig::default()
        }
    }

    /// Where do our identifiers come from, and how do we fetch them?
    async fn source_and_fetcher(
        &self,
        config: &PipelineConfig,
    ) -> Result<(IdentifierSource, Arc<dyn Fetcher>)> {
        if let Some(dir) = &self.image_dir {
            let source = IdentifierSource::from_directory(dir).await?;
            return Ok((source, Arc::new(LocalFetcher::new(dir))));
        }
        let source = match &self.id_list {
            Some(path) => IdentifierSource::from_list_file(path).await?,
            None => IdentifierSource::Range {
                start: self.start,
                end: config.max_identifier,
                width: self.id_width,
                suffix: self.id_suffix.clone(),
            },
        };
        let fetcher = ArchiveFetcher::new(config.base_url.clone(), config.fetch_timeout)?;
        Ok((source, Arc::new(fetcher)))
    }
}

/// The `transcribe` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_transcribe(ui: Ui, opts: &TranscribeOpts) -> Result<()> {
    // Check our configuration before touching the network. A dry run never
    // calls the model, so it doesn't need a key.
    let require_api_key = opts.driver.needs_api_key() && !opts.dry_run;
    let config = opts.to_config().with_env(require_api_key)?;
    config.validate()?;

    let (source, fetcher) = opts.source_and_fetcher(&config).await?;
    let driver = opts.driver.create_driver(&config)?;
    let prompt = BatchPrompt::from_optional_path(opts.prompt.as_deref()).await?;
    let mut pipeline =
        Pipeline::new(ui.clone(), config, source, fetcher.clone(), driver, prompt).await?;

    if opts.dry_run {
        match pipeline.run_once(true).await? {
            RunOutcome::DryRun { ids } => {
                println!("{}\n", pipeline.prompt().instructions);
                for id in &ids {
                    println!("{id}\t{}", fetcher.source_url(id));
                }
            }
            RunOutcome::Exhausted => ui.display_message("✅", "Nothing left to transcribe"),
            other => debug!("Unexpected dry run outcome: {other:?}"),
        }
        return Ok(());
    }

    let summary = pipeline.run(opts.batches).await?;
    if !summary.token_usage.is_zero() {
        info!(
            prompt_tokens = summary.token_usage.prompt_tokens,
            completion_tokens = summary.token_usage.completion_tokens,
            "Total token usage"
        );
    }
    if summary.batches == 0 && summary.exhausted {
        ui.display_message("✅", "Nothing left to transcribe");
    } else {
        ui.display_message(
            "📝",
            &format!(
                "Transcribed {} images in {} batches ({} downloads failed)",
                summary.images, summary.batches, summary.failed_downloads
            ),
        );
    }
    Ok(())
}

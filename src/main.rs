use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod batch;
mod cmd;
mod config;
mod consolidate;
mod crop;
mod drivers;
mod errors;
mod fetch;
mod identifier;
mod pipeline;
mod prelude;
mod prompt;
mod tracker;
mod ui;
mod writer;

/// Transcribe and translate scanned archive images in resumable batches.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - GEMINI_API_KEY: The Gemini API key to use. Required by the default
    `gemini` driver.
  - GEMINI_API_BASE (optional): Override the Gemini API endpoint.
  - RUST_LOG (optional): Log filter, e.g. `debug` or
    `archive_transcriber=trace`. Defaults to `info`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Crop a scanned image down to its content.
    Crop(cmd::crop::CropOpts),
    /// Transcribe and translate the next batch of unprocessed images.
    Transcribe(cmd::transcribe::TranscribeOpts),
    /// Parse batch responses into a single CSV file.
    Consolidate(cmd::consolidate::ConsolidateOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Crop(_) | Cmd::Consolidate(_) => false,
            Cmd::Transcribe(opts) => opts.dry_run,
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Crop(opts) => {
            cmd::crop::cmd_crop(ui, opts).await?;
        }
        Cmd::Transcribe(opts) => {
            cmd::transcribe::cmd_transcribe(ui, opts).await?;
        }
        Cmd::Consolidate(opts) => {
            cmd::consolidate::cmd_consolidate(ui, opts).await?;
        }
    }
    Ok(())
}

//! The `consolidate` subcommand.

use clap::Args;

use crate::{consolidate::consolidate, prelude::*, ui::Ui};

/// Consolidate command line arguments.
#[derive(Debug, Args)]
pub struct ConsolidateOpts {
    /// Directory containing `batch_*.txt` response files.
    #[clap(
        long = "input_dir",
        visible_alias = "input-dir",
        value_name = "DIR",
        default_value = "outputs"
    )]
    pub input_dir: PathBuf,

    /// The CSV file to write.
    #[clap(
        short = 'o',
        long = "output_file",
        visible_alias = "output-file",
        value_name = "FILE",
        default_value = "consolidated_output.csv"
    )]
    pub output_file: PathBuf,
}

/// The `consolidate` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_consolidate(ui: Ui, opts: &ConsolidateOpts) -> Result<()> {
    let summary = consolidate(&ui, &opts.input_dir, &opts.output_file).await?;
    if summary.files == 0 {
        warn!(input_dir = %opts.input_dir.display(), "No batch response files found");
    }
    ui.display_message(
        "📊",
        &format!(
            "Wrote {} records from {} files to {}",
            summary.records,
            summary.files,
            opts.output_file.display()
        ),
    );
    Ok(())
}

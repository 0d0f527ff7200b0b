//! The `crop` subcommand.

use clap::Args;

use crate::{
    async_utils::spawn_blocking_propagating_panics,
    crop::{CropMethod, CropOutcome, DEFAULT_QUALITY, crop_file},
    prelude::*,
    ui::Ui,
};

/// Crop command line arguments.
#[derive(Debug, Args)]
pub struct CropOpts {
    /// The scanned image to crop.
    pub input: PathBuf,

    /// Where to write the cropped image. The format is chosen by extension.
    pub output: PathBuf,

    /// How to find the content.
    #[clap(long, value_enum, default_value_t = CropMethod::default())]
    pub method: CropMethod,

    /// JPEG quality for the output, from 1 to 100.
    #[clap(long, default_value_t = DEFAULT_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,
}

/// The `crop` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_crop(ui: Ui, opts: &CropOpts) -> Result<()> {
    let input = opts.input.clone();
    let output = opts.output.clone();
    let (method, quality) = (opts.method, opts.quality);

    // Image decoding is CPU-bound, so keep it off the executor.
    let outcome = spawn_blocking_propagating_panics(move || {
        crop_file(&input, &output, method, quality)
    })
    .await?;

    match outcome {
        CropOutcome::Written { width, height } => ui.display_message(
            "✂️",
            &format!(
                "Cropped image ({width}x{height}) saved to {}",
                opts.output.display()
            ),
        ),
        CropOutcome::NoObjectFound => {
            warn!(input = %opts.input.display(), "No object found to crop");
            ui.display_message("🔍", "No object found to crop; nothing was written");
        }
    }
    Ok(())
}

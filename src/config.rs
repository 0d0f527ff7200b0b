//! Pipeline configuration.
//!
//! Everything a run needs is collected into a [`PipelineConfig`] up front and
//! handed to each component when it is built. Command-line flags supply most of
//! it; the API credential comes from the environment (or a `.env` file).

use std::{env, time::Duration};

use crate::{drivers::gemini::DEFAULT_API_BASE, errors::ConfigError, prelude::*};

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Environment variable which may override the Gemini endpoint.
pub const API_BASE_VAR: &str = "GEMINI_API_BASE";

/// The archive our scans come from.
pub const DEFAULT_BASE_URL: &str = "https://assets.yadvashem.org/image/upload/t_f_low_image/f_auto/v1/remote_media/documentation4/16/12612299_03263622/";

/// Model used unless `--model` says otherwise.
pub const DEFAULT_MODEL_ID: &str = "gemini-3-flash-preview";

/// Settings for one invocation of the transcription pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// The API credential. Only `None` for drivers which don't need one.
    pub api_key: Option<String>,

    /// Completion API endpoint.
    pub api_base: String,

    /// Prefix for archive image URLs.
    pub base_url: String,

    /// Which model to ask.
    pub model_id: String,

    /// Maximum number of images per completion request. This is also the
    /// number of parallel downloads.
    pub batch_size: usize,

    /// Highest sequence number to consider when scanning a numeric range.
    pub max_identifier: u32,

    /// Per-image download timeout.
    pub fetch_timeout: Duration,

    /// Timeout for one completion request.
    pub api_timeout: Duration,

    /// Where batch response files go.
    pub output_dir: PathBuf,

    /// The progress tracker file.
    pub state_file: PathBuf,

    /// Optional running transcript, appended to after each batch.
    pub transcript_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            model_id: DEFAULT_MODEL_ID.to_owned(),
            batch_size: 20,
            max_identifier: 700,
            fetch_timeout: Duration::from_secs(15),
            api_timeout: Duration::from_secs(300),
            output_dir: PathBuf::from("outputs"),
            state_file: PathBuf::from("processed_files.txt"),
            transcript_file: None,
        }
    }
}

impl PipelineConfig {
    /// Fill in our credential and endpoint from the environment.
    ///
    /// If `require_api_key` is set and no key is available, this fails with
    /// [`ConfigError::MissingApiKey`] before anything else happens.
    pub fn with_env(mut self, require_api_key: bool) -> Result<Self, ConfigError> {
        self.api_key = env::var(API_KEY_VAR)
            .ok()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());
        if require_api_key && self.api_key.is_none() {
            return Err(ConfigError::MissingApiKey { var: API_KEY_VAR });
        }
        if let Ok(api_base) = env::var(API_BASE_VAR) {
            if !api_base.trim().is_empty() {
                self.api_base = api_base.trim().to_owned();
            }
        }
        Ok(self)
    }

    /// Check for settings we can't work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "batch_size",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "model_id",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.api_timeout.is_zero() || self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                name: "timeout",
                reason: "timeouts must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

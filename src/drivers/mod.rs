//! Completion drivers.
//!
//! A driver sends one [`CompletionRequest`] covering a whole batch and returns
//! the model's free-text answer. There is no streaming and no partial result:
//! a batch either gets a complete response or an [`ApiError`].

use std::{fmt, ops::AddAssign, time::Duration};

use async_trait::async_trait;
use clap::ValueEnum;
use tokio::time;

use crate::{config::PipelineConfig, errors::ApiError, prelude::*, prompt::CompletionRequest};

pub mod echo;
pub mod gemini;

/// Our different driver types.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum DriverType {
    /// Google's Gemini `generateContent` REST API.
    #[default]
    Gemini,

    /// Offline driver which answers with one well-formed block per image.
    /// Handy for rehearsing a run without spending API quota.
    Echo,
}

impl DriverType {
    /// Does this driver need an API key?
    pub fn needs_api_key(self) -> bool {
        match self {
            DriverType::Gemini => true,
            DriverType::Echo => false,
        }
    }

    /// Instantiate an appropriate driver.
    pub fn create_driver(self, config: &PipelineConfig) -> Result<Box<dyn Driver>> {
        match self {
            DriverType::Gemini => Ok(Box::new(gemini::GeminiDriver::new(
                config.api_base.clone(),
                config.api_key.clone().unwrap_or_default(),
            )?)),
            DriverType::Echo => Ok(Box::new(echo::EchoDriver::new())),
        }
    }
}

/// Interface trait for completion drivers.
#[async_trait]
pub trait Driver: fmt::Debug + Send + Sync + 'static {
    /// Run a single completion request against `model`.
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, ApiError>;
}

/// Run [`Driver::complete`], giving up after `timeout`.
///
/// Note that even if a request times out, you'll probably still be charged.
pub async fn complete_with_timeout(
    driver: &dyn Driver,
    model: &str,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<Completion, ApiError> {
    match time::timeout(timeout, driver.complete(model, request)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(ApiError::Timeout(timeout)),
    }
}

/// A completion response.
#[derive(Clone, Debug)]
pub struct Completion {
    /// The model's answer, verbatim.
    pub text: String,

    /// Token usage, if the driver reports it.
    pub token_usage: Option<TokenUsage>,
}

/// Token usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// How many tokens were used in the prompt?
    pub prompt_tokens: u64,

    /// How many tokens were used in the response?
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Was our token usage zero?
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

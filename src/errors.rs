//! Typed failures for the transcription pipeline.
//!
//! Each kind of failure has a different recovery policy, so they are kept
//! apart rather than being folded into [`anyhow::Error`] right away:
//!
//! - [`FetchError`]: the identifier is dropped from the current batch and
//!   stays unmarked, so a later run will try it again.
//! - [`ApiError`]: the whole batch is abandoned and nothing is recorded.
//! - [`ConfigError`]: fatal, reported before any work starts.

use std::{io, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

use crate::identifier::Identifier;

/// Failed to fetch one image.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The archive answered with something other than 200.
    #[error("fetching {id} returned HTTP {status}")]
    Status { id: Identifier, status: StatusCode },

    /// The request never completed (connection failure, timeout, ...).
    #[error("fetching {id} failed: {source}")]
    Request {
        id: Identifier,
        #[source]
        source: reqwest::Error,
    },

    /// A local image could not be read.
    #[error("reading {id} failed: {source}")]
    Io {
        id: Identifier,
        #[source]
        source: io::Error,
    },

    /// A local image does not exist.
    #[error("{id} not found")]
    NotFound { id: Identifier },
}

impl FetchError {
    /// The identifier which could not be fetched.
    pub fn identifier(&self) -> &Identifier {
        match self {
            FetchError::Status { id, .. }
            | FetchError::Request { id, .. }
            | FetchError::Io { id, .. }
            | FetchError::NotFound { id } => id,
        }
    }
}

/// The completion API failed for a whole batch.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure talking to the model endpoint.
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with an error status.
    #[error("completion endpoint returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// We gave up waiting.
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint answered, but without any text.
    #[error("completion response contained no text")]
    EmptyResponse,
}

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The API credential is not set.
    #[error(
        "API key not found: set the {var} environment variable (or add it to a .env file)"
    )]
    MissingApiKey { var: &'static str },

    /// A setting has a value we can't use.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

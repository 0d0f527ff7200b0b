//! Echo driver for testing.
//!
//! This driver never leaves the machine. For every image in the request, it
//! answers with a block in the same layout our default prompt asks the model
//! for, which makes it useful for smoke tests of the whole pipeline and the
//! consolidator.

use async_trait::async_trait;

use crate::{
    errors::ApiError,
    prelude::*,
    prompt::{CompletionRequest, Part, SOURCE_URL_PREFIX},
};

use super::{Completion, Driver, TokenUsage};

/// Echo driver for testing.
#[derive(Debug, Default)]
pub struct EchoDriver;

impl EchoDriver {
    /// Create a new echo driver.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for EchoDriver {
    async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, ApiError> {
        debug!(model, images = request.image_count(), "Echoing request");
        let mut text = String::new();
        let mut last_url = None;
        for part in &request.parts {
            match part {
                Part::Text(t) => {
                    if let Some(url) = t.strip_prefix(SOURCE_URL_PREFIX) {
                        last_url = Some(url.to_owned());
                    }
                }
                Part::Image { mime_type, data } => {
                    let url = last_url.take().unwrap_or_default();
                    text.push_str(&format!(
                        "Original URL: [{url}]\n\
                         Transcription: {mime_type} image, {len} bytes\n\
                         Translation: תמונה {mime_type}, {len} בתים\n\
                         ---\n",
                        len = data.len(),
                    ));
                }
            }
        }
        if text.is_empty() {
            return Err(ApiError::EmptyResponse);
        }
        Ok(Completion {
            text,
            token_usage: Some(TokenUsage::default()),
        })
    }
}

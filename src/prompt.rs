//! The instructions we send along with each batch of images.

use crate::{fetch::DownloadedImage, prelude::*};

/// The built-in instructions, used unless `--prompt` is given.
const DEFAULT_PROMPT: &str = include_str!("prompts/default_prompt.txt");

/// Text placed immediately before each image, so that the model can tell
/// which output belongs to which source.
pub const SOURCE_URL_PREFIX: &str = "Source URL for the following image: ";

/// One piece of a multimodal request.
#[derive(Clone, PartialEq, Eq)]
pub enum Part {
    /// Plain text.
    Text(String),

    /// Raw image bytes.
    Image { mime_type: String, data: Vec<u8> },
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Part::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Part::Image { mime_type, data } => f
                .debug_struct("Image")
                .field("mime_type", mime_type)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// A single completion request covering a whole batch.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    /// Ordered parts: instructions first, then annotation/image pairs.
    pub parts: Vec<Part>,
}

impl CompletionRequest {
    /// How many images are in this request?
    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, Part::Image { .. }))
            .count()
    }
}

/// The instructional prompt for a batch.
#[derive(Clone, Debug)]
pub struct BatchPrompt {
    /// Free-form instructions for the model.
    pub instructions: String,
}

impl Default for BatchPrompt {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_PROMPT.trim().to_owned(),
        }
    }
}

impl BatchPrompt {
    /// Load instructions from a plain-text file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let instructions = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read prompt file {}", path.display()))?;
        let instructions = instructions.trim().to_owned();
        if instructions.is_empty() {
            return Err(anyhow!("prompt file {} is empty", path.display()));
        }
        Ok(Self { instructions })
    }

    /// Load instructions from `path` if given, otherwise use the default.
    pub async fn from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path).await,
            None => Ok(Self::default()),
        }
    }

    /// Build a request for `images`.
    ///
    /// Annotations are interleaved: every image is directly preceded by a
    /// text part naming its source URL.
    pub fn build_request(&self, images: &[DownloadedImage]) -> CompletionRequest {
        let mut parts = Vec::with_capacity(1 + 2 * images.len());
        parts.push(Part::Text(self.instructions.clone()));
        for image in images {
            parts.push(Part::Text(format!("{SOURCE_URL_PREFIX}{}", image.url)));
            parts.push(Part::Image {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            });
        }
        CompletionRequest { parts }
    }
}

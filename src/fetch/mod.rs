//! Fetching source images, either from the remote archive or from disk.

use std::fmt;

use async_trait::async_trait;
use mime_guess::mime;

use crate::{errors::FetchError, identifier::Identifier, prelude::*};

pub mod archive;
pub mod local;

/// MIME type we assume when we can't tell what an image is.
const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// One downloaded image. Lives only for the duration of a run.
#[derive(Clone)]
pub struct DownloadedImage {
    /// Which image this is.
    pub id: Identifier,

    /// Where it came from. This is shown to the model next to the image.
    pub url: String,

    /// The MIME type to declare when sending the bytes to the model.
    pub mime_type: String,

    /// The raw image bytes.
    pub data: Vec<u8>,
}

// Don't dump megabytes of image data into our logs.
impl fmt::Debug for DownloadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadedImage")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl DownloadedImage {
    /// Build a [`DownloadedImage`], sniffing the MIME type from the data.
    pub fn new(id: Identifier, url: String, data: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&data, id.as_str());
        Self {
            id,
            url,
            mime_type,
            data,
        }
    }
}

/// Interface for anything that can turn an [`Identifier`] into image bytes.
#[async_trait]
pub trait Fetcher: fmt::Debug + Send + Sync + 'static {
    /// Where `id` lives.
    fn source_url(&self, id: &Identifier) -> String;

    /// Fetch a single image. Failures are per-identifier and never retried
    /// here.
    async fn fetch(&self, id: &Identifier) -> Result<DownloadedImage, FetchError>;
}

/// Work out an image's MIME type, looking first at the bytes and then at the
/// file name.
pub fn detect_mime_type(data: &[u8], name: &str) -> String {
    if let Some(kind) = infer::get(data) {
        if kind.matcher_type() == infer::MatcherType::Image {
            return kind.mime_type().to_owned();
        }
    }
    mime_guess::from_path(name)
        .first()
        .filter(|guess| guess.type_() == mime::IMAGE)
        .map(|guess| guess.essence_str().to_owned())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_owned())
}

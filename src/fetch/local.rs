//! Read images from a local directory instead of the archive.

use std::io;

use async_trait::async_trait;
use mime_guess::mime;
use tokio::fs;

use crate::{errors::FetchError, identifier::Identifier, prelude::*};

use super::{DownloadedImage, Fetcher};

/// Reads `{dir}/{identifier}` from disk.
#[derive(Debug)]
pub struct LocalFetcher {
    /// The directory holding our images.
    dir: PathBuf,
}

impl LocalFetcher {
    /// Create a fetcher for images in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    fn source_url(&self, id: &Identifier) -> String {
        self.dir.join(id.as_str()).display().to_string()
    }

    #[instrument(level = "debug", skip_all, fields(id = %id))]
    async fn fetch(&self, id: &Identifier) -> Result<DownloadedImage, FetchError> {
        let path = self.dir.join(id.as_str());
        match fs::read(&path).await {
            Ok(data) => Ok(DownloadedImage::new(
                id.clone(),
                path.display().to_string(),
                data,
            )),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound { id: id.clone() })
            }
            Err(source) => Err(FetchError::Io {
                id: id.clone(),
                source,
            }),
        }
    }
}

/// List the image files directly inside `dir`, sorted by name.
///
/// "Image" means anything whose extension maps to an `image/*` MIME type.
pub async fn list_image_files(dir: &Path) -> Result<Vec<Identifier>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read image directory {}", dir.display()))?;
    let mut names = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list image directory {}", dir.display()))?
    {
        let is_file = entry
            .file_type()
            .await
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let path = entry.path();
        let is_image = mime_guess::from_path(&path)
            .first()
            .is_some_and(|guess| guess.type_() == mime::IMAGE);
        if is_image {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names.into_iter().map(Identifier::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_images_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let ids = list_image_files(dir.path()).await.unwrap();
        let names = ids.iter().map(Identifier::as_str).collect::<Vec<_>>();
        assert_eq!(names, ["a.JPG", "b.png", "c.jpeg"]);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalFetcher::new(dir.path());
        let err = fetcher.fetch(&Identifier::new("gone.jpg")).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reads_file_and_reports_path_as_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.png"), b"data").unwrap();
        let fetcher = LocalFetcher::new(dir.path());

        let image = fetcher.fetch(&Identifier::new("page.png")).await.unwrap();
        assert_eq!(image.data, b"data");
        assert_eq!(image.mime_type, "image/png");
        assert!(image.url.ends_with("page.png"));
    }
}

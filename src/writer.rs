//! Persisting model responses.
//!
//! The ordering here matters: a batch's response file must be safely on disk
//! before its identifiers are recorded as done. If we crash in between, the
//! batch is simply transcribed again on the next run.

use std::io;

use tokio::{fs, io::AsyncWriteExt as _};

use crate::{identifier::Identifier, prelude::*, tracker::ProgressTracker};

/// How many `_N` suffixes we try before giving up on a batch key.
const MAX_KEY_SUFFIX: u32 = 10_000;

/// Where a batch response ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedResponse {
    /// The key actually used, which may carry a `_N` suffix.
    pub batch_key: String,

    /// The response file.
    pub path: PathBuf,
}

/// Writes one response file per batch, and optionally a running transcript.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    /// Directory for `batch_*.txt` files.
    output_dir: PathBuf,

    /// Optional single file which accumulates every response.
    transcript_file: Option<PathBuf>,
}

impl ResponseWriter {
    /// Create a new writer.
    pub fn new(output_dir: impl Into<PathBuf>, transcript_file: Option<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            transcript_file,
        }
    }

    /// The response file name for a batch key, e.g. `batch_00001.txt`.
    pub fn file_name(batch_key: &str) -> String {
        format!("batch_{batch_key}.txt")
    }

    /// Where the response for `batch_key` would go if the key is still free.
    pub fn path_for(&self, batch_key: &str) -> PathBuf {
        self.output_dir.join(Self::file_name(batch_key))
    }

    /// Write `text` verbatim to a new response file for `batch_key`.
    ///
    /// We write to a temporary file and link it into place, so readers never
    /// see a half-written response. An existing response file is never
    /// replaced: if `batch_<key>.txt` is taken we use `batch_<key>_2.txt`,
    /// then `_3`, and so on.
    #[instrument(level = "debug", skip_all, fields(batch_key = batch_key))]
    pub async fn write(&self, batch_key: &str, text: &str) -> Result<SavedResponse> {
        fs::create_dir_all(&self.output_dir).await.with_context(|| {
            format!("failed to create output directory {}", self.output_dir.display())
        })?;

        let tmp_path = self.path_for(batch_key).with_extension("txt.partial");
        let mut file = fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(text.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("failed to sync {}", tmp_path.display()))?;
        drop(file);

        let saved = self.link_into_free_slot(batch_key, &tmp_path).await;
        if let Err(err) = fs::remove_file(&tmp_path).await {
            warn!("Could not remove {}: {err}", tmp_path.display());
        }
        saved
    }

    /// Hard-link `tmp_path` to the first unused response file name for
    /// `batch_key`. Linking fails instead of overwriting, so a file that
    /// appears between our check and our write is never lost.
    async fn link_into_free_slot(
        &self,
        batch_key: &str,
        tmp_path: &Path,
    ) -> Result<SavedResponse> {
        for n in 1..=MAX_KEY_SUFFIX {
            let key = if n == 1 {
                batch_key.to_owned()
            } else {
                format!("{batch_key}_{n}")
            };
            let path = self.path_for(&key);
            match fs::hard_link(tmp_path, &path).await {
                Ok(()) => {
                    if n > 1 {
                        warn!(
                            "{} already exists, saving this batch as {}",
                            Self::file_name(batch_key),
                            Self::file_name(&key)
                        );
                    }
                    return Ok(SavedResponse { batch_key: key, path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to move response into {}", path.display())
                    });
                }
            }
        }
        Err(anyhow!(
            "no free response file name left for batch key {batch_key:?} in {}",
            self.output_dir.display()
        ))
    }

    /// Append `text` to our transcript file, if we have one.
    async fn append_transcript(&self, saved: &SavedResponse, text: &str) -> Result<()> {
        let Some(transcript) = &self.transcript_file else {
            return Ok(());
        };
        if let Some(parent) = transcript.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.with_context(|| {
                    format!("failed to create directory {}", parent.display())
                })?;
            }
        }
        let entry = format!(
            "---\nFile: {}\n{}\n",
            Self::file_name(&saved.batch_key),
            text.trim()
        );
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(transcript)
            .await
            .with_context(|| format!("failed to open transcript {}", transcript.display()))?;
        file.write_all(entry.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", transcript.display()))?;
        file.flush().await.context("failed to flush transcript")?;
        Ok(())
    }

    /// Persist a successful batch: write the response, append it to the
    /// transcript, and only then mark `ids` as done in `tracker`.
    pub async fn commit_batch(
        &self,
        tracker: &mut ProgressTracker,
        batch_key: &str,
        ids: &[Identifier],
        text: &str,
    ) -> Result<SavedResponse> {
        let saved = self.write(batch_key, text).await?;
        self.append_transcript(&saved, text).await?;
        tracker.mark(ids).await?;
        Ok(saved)
    }
}

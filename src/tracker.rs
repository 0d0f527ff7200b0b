//! Durable record of which identifiers have already been transcribed.
//!
//! The record is a plain UTF-8 text file with one identifier per line. We only
//! ever append to it. A missing file is the same as an empty record.
//!
//! There is no locking. Two processes running at once may both pick the same
//! identifiers and both append them; that costs duplicate API calls, but never
//! corrupts earlier entries.

use std::{collections::BTreeSet, io};

use tokio::{fs, io::AsyncWriteExt as _};

use crate::{identifier::Identifier, prelude::*};

/// Append-only set of processed identifiers, backed by a text file.
#[derive(Debug)]
pub struct ProgressTracker {
    /// The backing file.
    path: PathBuf,

    /// Everything recorded so far.
    done: BTreeSet<Identifier>,
}

impl ProgressTracker {
    /// Load a tracker from `path`.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let done = match fs::read_to_string(path).await {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(Identifier::new)
                .collect(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read progress tracker {}", path.display())
                });
            }
        };
        debug!(count = done.len(), "Loaded progress tracker");
        Ok(Self {
            path: path.to_owned(),
            done,
        })
    }

    /// Has `id` already been processed?
    pub fn has(&self, id: &Identifier) -> bool {
        self.done.contains(id)
    }

    /// How many identifiers have been recorded?
    pub fn len(&self) -> usize {
        self.done.len()
    }

    /// Is the record empty?
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// All recorded identifiers, in sorted order.
    #[cfg(test)]
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.done.iter()
    }

    /// Record `ids` as processed. Identifiers which are already present (or
    /// repeated within `ids`) are skipped, so calling this twice is harmless.
    ///
    /// The new lines are appended in a single write and synced to disk before
    /// we update our in-memory view.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn mark(&mut self, ids: &[Identifier]) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut lines = String::new();
        for id in ids {
            if !self.done.contains(id) && seen.insert(id.clone()) {
                lines.push_str(id.as_str());
                lines.push('\n');
            }
        }
        if seen.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.with_context(|| {
                    format!("failed to create directory {}", parent.display())
                })?;
            }
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| {
                format!("failed to open progress tracker {}", self.path.display())
            })?;
        file.write_all(lines.as_bytes())
            .await
            .context("failed to append to progress tracker")?;
        file.flush().await.context("failed to flush progress tracker")?;
        file.sync_data()
            .await
            .context("failed to sync progress tracker")?;

        debug!(count = seen.len(), "Marked identifiers as processed");
        self.done.extend(seen);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tokens: &[&str]) -> Vec<Identifier> {
        tokens.iter().map(|t| Identifier::new(t)).collect()
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ProgressTracker::load(&dir.path().join("nope.txt"))
            .await
            .unwrap();
        assert!(tracker.is_empty());
        assert!(!tracker.has(&Identifier::new("00001.JPG")));
    }

    #[tokio::test]
    async fn mark_persists_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("processed.txt");

        let mut tracker = ProgressTracker::load(&path).await.unwrap();
        tracker
            .mark(&ids(&["00001.JPG", "00002.JPG", "00001.JPG"]))
            .await
            .unwrap();
        tracker.mark(&ids(&["00002.JPG", "00003.JPG"])).await.unwrap();
        tracker.mark(&ids(&["00003.JPG"])).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "00001.JPG\n00002.JPG\n00003.JPG\n");

        let reloaded = ProgressTracker::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.has(&Identifier::new("00002.JPG")));
    }

    #[tokio::test]
    async fn load_ignores_blank_lines_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.txt");
        std::fs::write(&path, "00001.JPG\r\n\n  00002.JPG  \n").unwrap();

        let tracker = ProgressTracker::load(&path).await.unwrap();
        let loaded = tracker.identifiers().cloned().collect::<Vec<_>>();
        assert_eq!(loaded, ids(&["00001.JPG", "00002.JPG"]));
    }
}

//! Identifiers for source images.

use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::prelude::*;

/// Leading digits of an identifier, used to build batch keys.
static NUMERIC_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").expect("failed to compile regex"));

/// Characters we don't want to see in an output file name.
static UNSAFE_FILENAME_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("failed to compile regex"));

/// Minimum number of digits in a numeric batch key.
const BATCH_KEY_WIDTH: usize = 5;

/// A token which uniquely addresses one source image, either a zero-padded
/// sequence number like `00042.JPG` or a plain file name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap an existing token. Surrounding whitespace is removed.
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(token.as_ref().trim().to_owned())
    }

    /// Build a zero-padded identifier from a sequence number, for example
    /// `from_index(42, 5, ".JPG")` gives `00042.JPG`.
    pub fn from_index(index: u32, width: usize, suffix: &str) -> Self {
        Self(format!("{index:0width$}{suffix}"))
    }

    /// The identifier as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A key naming the batch which starts with this identifier.
    ///
    /// Numeric identifiers use their sequence number, re-padded to at least
    /// five digits (`7.JPG` → `00007`). Anything else uses the whole file
    /// name, extension included, with unsafe characters replaced by `_`
    /// (`scan.png` → `scan_png`).
    ///
    /// Keys are not guaranteed to be unique (`1a.png` and `1b.png` share
    /// `00001`), so [`crate::writer::ResponseWriter`] never reuses a taken one.
    pub fn batch_key(&self) -> String {
        if let Some(caps) = NUMERIC_PREFIX_RE.captures(&self.0) {
            let digits = &caps[1];
            if let Ok(n) = digits.parse::<u64>() {
                return format!("{n:0BATCH_KEY_WIDTH$}");
            }
            return digits.to_owned();
        }
        let name = Path::new(&self.0)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.clone());
        let key = UNSAFE_FILENAME_CHARS_RE.replace_all(&name, "_");
        if key.is_empty() {
            "batch".to_owned()
        } else {
            key.into_owned()
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pads_sequence_numbers() {
        assert_eq!(Identifier::from_index(1, 5, ".JPG").as_str(), "00001.JPG");
        assert_eq!(Identifier::from_index(700, 5, ".JPG").as_str(), "00700.JPG");
        assert_eq!(Identifier::from_index(123456, 5, "").as_str(), "123456");
    }

    #[test]
    fn numeric_batch_keys_are_padded() {
        assert_eq!(Identifier::new("00001.JPG").batch_key(), "00001");
        assert_eq!(Identifier::new("7.jpg").batch_key(), "00007");
        assert_eq!(Identifier::new("1234567.png").batch_key(), "1234567");
    }

    #[test]
    fn file_name_batch_keys_are_sanitized() {
        assert_eq!(Identifier::new("scan page A.png").batch_key(), "scan_page_A_png");
        assert_eq!(Identifier::new("letter-02.jpeg").batch_key(), "letter-02_jpeg");
    }

    #[test]
    fn extensions_keep_file_name_keys_apart() {
        assert_ne!(
            Identifier::new("scan.jpg").batch_key(),
            Identifier::new("scan.png").batch_key()
        );
    }

    #[test]
    fn new_trims_whitespace() {
        assert_eq!(Identifier::new("  00003.JPG\n"), Identifier::from("00003.JPG"));
    }
}

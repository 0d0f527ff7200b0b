//! Line-oriented parser for model responses.
//!
//! A response is a sequence of blocks like:
//!
//! ```text
//! Original URL: [https://example.com/00001.JPG]
//! Transcription: Some text,
//! which may continue on later lines.
//! Translation: Some translated text.
//! ---
//! ```
//!
//! The parser is deliberately forgiving. Fields which never show up are left
//! as `None`, and lines it doesn't understand are ignored unless we're inside
//! a multi-line field.

/// Block separator. Any line starting with this ends the current block.
const SEPARATOR: &str = "---";

/// Marker for the image URL line.
const URL_MARKER: &str = "Original URL";

/// Marker for the transcription header.
const TRANSCRIPTION_MARKER: &str = "Transcription";

/// Marker for the translation header.
const TRANSLATION_MARKER: &str = "Translation";

/// Which multi-line field, if any, we're currently reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParserState {
    /// Outside any multi-line field.
    #[default]
    Neutral,
    InTranscription,
    InTranslation,
}

/// One of our multi-line text fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Transcription,
    Translation,
}

impl Field {
    /// The state we're in while reading this field.
    fn state(self) -> ParserState {
        match self {
            Field::Transcription => ParserState::InTranscription,
            Field::Translation => ParserState::InTranslation,
        }
    }
}

/// What a single line asks us to do to the record being accumulated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect<'a> {
    /// Nothing to record.
    Ignore,

    /// Emit the current record, if it has anything in it, and start fresh.
    Flush,

    /// Set the image URL.
    SetImageUrl(&'a str),

    /// A field header was seen. The field now exists, even if the header
    /// carried no inline text.
    Begin(Field, &'a str),

    /// A continuation line for a field.
    Append(Field, &'a str),
}

/// Compute the next state and the effect of `line`, given the current
/// `state`. This is a pure function; [`parse_response`] applies the effects.
pub fn transition(state: ParserState, line: &str) -> (ParserState, Effect<'_>) {
    let line = line.trim();
    if line.starts_with(SEPARATOR) {
        return (ParserState::Neutral, Effect::Flush);
    }

    // Order matters here: a URL line mentioning "Transcription" is still a URL
    // line.
    if line.contains(URL_MARKER) {
        let effect = bracketed(line).map_or(Effect::Ignore, Effect::SetImageUrl);
        (ParserState::Neutral, effect)
    } else if line.contains(TRANSCRIPTION_MARKER) {
        let field = Field::Transcription;
        (field.state(), Effect::Begin(field, after_colon(line)))
    } else if line.contains(TRANSLATION_MARKER) {
        let field = Field::Translation;
        (field.state(), Effect::Begin(field, after_colon(line)))
    } else {
        match state {
            ParserState::Neutral => (state, Effect::Ignore),
            ParserState::InTranscription => (state, Effect::Append(Field::Transcription, line)),
            ParserState::InTranslation => (state, Effect::Append(Field::Translation, line)),
        }
    }
}

/// The text between the first `[` and the following `]`, if both exist.
fn bracketed(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once('[')?;
    let (inner, _) = rest.split_once(']')?;
    Some(inner)
}

/// The trimmed text after the first `:`, or the empty string.
fn after_colon(line: &str) -> &str {
    line.split_once(':').map_or("", |(_, rest)| rest.trim())
}

/// A structured record extracted from one block of a response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsolidatedRecord {
    pub image_url: Option<String>,
    pub transcription: Option<String>,
    pub translation: Option<String>,
}

impl ConsolidatedRecord {
    /// Has anything been recorded yet?
    fn is_empty(&self) -> bool {
        self.image_url.is_none() && self.transcription.is_none() && self.translation.is_none()
    }

    fn field_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Transcription => &mut self.transcription,
            Field::Translation => &mut self.translation,
        }
    }

    /// Apply one effect. Returns a finished record on [`Effect::Flush`].
    fn apply(&mut self, effect: Effect<'_>) -> Option<ConsolidatedRecord> {
        match effect {
            Effect::Ignore => {}
            Effect::Flush => {
                let record = std::mem::take(self);
                if !record.is_empty() {
                    return Some(record.trimmed());
                }
            }
            Effect::SetImageUrl(url) => self.image_url = Some(url.to_owned()),
            Effect::Begin(field, text) | Effect::Append(field, text) => {
                let value = self.field_mut(field).get_or_insert_with(String::new);
                push_words(value, text);
            }
        }
        None
    }

    /// Trim whitespace from our text fields.
    fn trimmed(mut self) -> Self {
        for value in [&mut self.transcription, &mut self.translation]
            .into_iter()
            .flatten()
        {
            *value = value.trim().to_owned();
        }
        self
    }
}

/// Append `text` to `value`, space-separated. Blank text is skipped.
fn push_words(value: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !value.is_empty() {
        value.push(' ');
    }
    value.push_str(text);
}

/// Parse a full response into records, one per non-empty block.
pub fn parse_response(text: &str) -> Vec<ConsolidatedRecord> {
    let mut records = vec![];
    let mut state = ParserState::Neutral;
    let mut current = ConsolidatedRecord::default();
    for line in text.lines() {
        let (next, effect) = transition(state, line);
        state = next;
        records.extend(current.apply(effect));
    }
    records.extend(current.apply(Effect::Flush));
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_blocks_round_trip() {
        let text = "\
Original URL: [https://a/00001.JPG]
Transcription: שלום
Translation:  Hello
---
Original URL: [https://a/00002.JPG]
Transcription: עולם
Translation: World
---
";
        let records = parse_response(text);
        assert_eq!(
            records,
            [
                ConsolidatedRecord {
                    image_url: Some("https://a/00001.JPG".to_owned()),
                    transcription: Some("שלום".to_owned()),
                    translation: Some("Hello".to_owned()),
                },
                ConsolidatedRecord {
                    image_url: Some("https://a/00002.JPG".to_owned()),
                    transcription: Some("עולם".to_owned()),
                    translation: Some("World".to_owned()),
                },
            ]
        );
    }

    #[test]
    fn missing_translation_is_absent_not_an_error() {
        let records = parse_response("Original URL: [x]\nTranscription: only this\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transcription.as_deref(), Some("only this"));
        assert_eq!(records[0].translation, None);
    }

    #[test]
    fn continuation_lines_are_space_joined() {
        let text = "Transcription:\n  line one\nline two\n\nTranslation: a\nb\n---";
        let records = parse_response(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transcription.as_deref(), Some("line one line two"));
        assert_eq!(records[0].translation.as_deref(), Some("a b"));
        assert_eq!(records[0].image_url, None);
    }

    #[test]
    fn header_without_text_still_creates_field() {
        let records = parse_response("Translation:\n---\n");
        assert_eq!(records[0].translation.as_deref(), Some(""));
        assert_eq!(records[0].transcription, None);
    }

    #[test]
    fn empty_blocks_and_chatter_are_skipped() {
        let text = "Here are your results.\n---\n---\nOriginal URL: no brackets\n---\n";
        assert!(parse_response(text).is_empty());
    }

    #[test]
    fn transitions() {
        use Effect::*;
        use ParserState::*;

        assert_eq!(transition(InTranslation, "----- "), (Neutral, Flush));
        assert_eq!(
            transition(InTranscription, "**Original URL**: [u] Transcription"),
            (Neutral, SetImageUrl("u"))
        );
        assert_eq!(
            transition(Neutral, "Transcription: a: b"),
            (InTranscription, Begin(Field::Transcription, "a: b"))
        );
        assert_eq!(
            transition(InTranscription, " more "),
            (InTranscription, Append(Field::Transcription, "more"))
        );
        assert_eq!(transition(Neutral, "stray"), (Neutral, Ignore));
    }
}

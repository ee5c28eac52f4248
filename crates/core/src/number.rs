//! Document numbering value objects.
//!
//! A document number is rendered as `<PREFIX><sep><period><sep><seq>`, e.g.
//! `CO-2026-17`. The `<PREFIX><sep><period>` part is the [`SequenceKey`]: the
//! key under which the counter store tracks the last issued sequence.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::error::{DomainError, DomainResult};

/// Separator used between prefix, period and sequence unless configured otherwise.
pub const DEFAULT_SEPARATOR: char = '-';

/// Upper bound for zero-padding of the sequence component.
pub const MAX_PAD_WIDTH: usize = 12;

/// Counter key for one document series within one period (e.g. `CO-2026`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SequenceKey(String);

impl SequenceKey {
    /// Build the key for `prefix` + `period` joined by `separator`.
    ///
    /// Neither component may be empty or contain the separator, otherwise the
    /// trailing sequence of a rendered number could not be told apart.
    pub fn from_parts(prefix: &str, period: &str, separator: char) -> DomainResult<Self> {
        validate_component("prefix", prefix, separator)?;
        validate_component("period", period, separator)?;
        Ok(Self(format!("{prefix}{separator}{period}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SequenceKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::validation("sequence key must not be empty"));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DomainError::validation(format!(
                "sequence key `{s}` contains whitespace or control characters"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SequenceKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SequenceKey> for String {
    fn from(value: SequenceKey) -> Self {
        value.0
    }
}

fn validate_component(name: &str, value: &str, separator: char) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::validation(format!("{name} must not be empty")));
    }
    if value.contains(separator) {
        return Err(DomainError::validation(format!(
            "{name} `{value}` must not contain the separator `{separator}`"
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DomainError::validation(format!(
            "{name} `{value}` contains whitespace or control characters"
        )));
    }
    Ok(())
}

/// Rendering rules for document numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    separator: char,
    pad_width: usize,
}

impl Default for NumberFormat {
    /// `-` separator, no padding (`CO-2026-17`).
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            pad_width: 0,
        }
    }
}

impl NumberFormat {
    pub fn new(separator: char, pad_width: usize) -> DomainResult<Self> {
        if separator.is_ascii_alphanumeric() || separator.is_whitespace() {
            return Err(DomainError::validation(format!(
                "separator `{separator}` must be punctuation"
            )));
        }
        if pad_width > MAX_PAD_WIDTH {
            return Err(DomainError::validation(format!(
                "pad width {pad_width} exceeds {MAX_PAD_WIDTH}"
            )));
        }
        Ok(Self {
            separator,
            pad_width,
        })
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn pad_width(&self) -> usize {
        self.pad_width
    }

    /// Counter key for `prefix` in `period`.
    pub fn key(&self, prefix: &str, period: &str) -> DomainResult<SequenceKey> {
        SequenceKey::from_parts(prefix, period, self.separator)
    }

    /// Render the number issued as `seq` under `key`.
    pub fn render(&self, key: &SequenceKey, seq: u64) -> DocumentNumber {
        let rendered = format!(
            "{key}{sep}{seq:0width$}",
            sep = self.separator,
            width = self.pad_width
        );
        DocumentNumber {
            key: key.clone(),
            seq,
            rendered,
        }
    }

    /// The literal every number issued under `key` starts with (`CO-2026-`).
    pub fn number_prefix(&self, key: &SequenceKey) -> String {
        format!("{key}{}", self.separator)
    }

    /// Recover the trailing sequence of a number issued under `key`.
    ///
    /// Anything after the key other than a separator followed by ASCII digits
    /// is malformed, including extra suffix segments such as `CO-2026-12-B`.
    pub fn parse_seq(&self, key: &SequenceKey, raw: &str) -> Result<u64, MalformedNumber> {
        let trailing = raw
            .strip_prefix(key.as_str())
            .and_then(|rest| rest.strip_prefix(self.separator))
            .ok_or_else(|| MalformedNumber::ForeignPrefix {
                number: raw.to_string(),
                expected: self.number_prefix(key),
            })?;

        if trailing.is_empty() {
            return Err(MalformedNumber::EmptySequence {
                number: raw.to_string(),
            });
        }
        if !trailing.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MalformedNumber::NonNumericSequence {
                number: raw.to_string(),
                trailing: trailing.to_string(),
            });
        }
        trailing
            .parse::<u64>()
            .map_err(|_| MalformedNumber::SequenceOverflow {
                number: raw.to_string(),
            })
    }

    /// Parse a full number issued under `key` into a [`DocumentNumber`].
    pub fn parse(&self, key: &SequenceKey, raw: &str) -> Result<DocumentNumber, MalformedNumber> {
        let seq = self.parse_seq(key, raw)?;
        Ok(DocumentNumber {
            key: key.clone(),
            seq,
            rendered: raw.to_string(),
        })
    }
}

/// A formatted document number (e.g. `CO-2026-17`).
///
/// Issued once by the allocator and embedded in the business document it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentNumber {
    key: SequenceKey,
    seq: u64,
    rendered: String,
}

impl DocumentNumber {
    pub fn key(&self) -> &SequenceKey {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn into_string(self) -> String {
        self.rendered
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl Serialize for DocumentNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.rendered)
    }
}

/// Why an existing document number could not be parsed under its key.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedNumber {
    #[error("`{number}` does not start with `{expected}`")]
    ForeignPrefix { number: String, expected: String },

    #[error("`{number}` has no sequence component")]
    EmptySequence { number: String },

    #[error("`{number}` has non-numeric sequence component `{trailing}`")]
    NonNumericSequence { number: String, trailing: String },

    #[error("`{number}` has a sequence component that does not fit in 64 bits")]
    SequenceOverflow { number: String },
}

impl MalformedNumber {
    pub fn number(&self) -> &str {
        match self {
            Self::ForeignPrefix { number, .. }
            | Self::EmptySequence { number }
            | Self::NonNumericSequence { number, .. }
            | Self::SequenceOverflow { number } => number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn co_2026() -> SequenceKey {
        NumberFormat::default().key("CO", "2026").unwrap()
    }

    #[test]
    fn default_format_renders_without_padding() {
        let number = NumberFormat::default().render(&co_2026(), 17);
        assert_eq!(number.as_str(), "CO-2026-17");
        assert_eq!(number.seq(), 17);
        assert_eq!(number.key().as_str(), "CO-2026");
    }

    #[test]
    fn padded_format_zero_fills_sequence() {
        let format = NumberFormat::new('/', 5).unwrap();
        let key = format.key("INV", "2026").unwrap();
        assert_eq!(key.as_str(), "INV/2026");
        assert_eq!(format.render(&key, 42).as_str(), "INV/2026/00042");
        assert_eq!(format.parse_seq(&key, "INV/2026/00042"), Ok(42));
    }

    #[test]
    fn padding_never_truncates_wide_sequences() {
        let format = NumberFormat::new('-', 2).unwrap();
        assert_eq!(format.render(&co_2026(), 12345).as_str(), "CO-2026-12345");
    }

    #[test]
    fn components_containing_separator_are_rejected() {
        let format = NumberFormat::default();
        assert!(format.key("C-O", "2026").is_err());
        assert!(format.key("CO", "2026-Q1").is_err());
        assert!(format.key("", "2026").is_err());
        assert!(format.key("CO", "").is_err());
    }

    #[test]
    fn invalid_formats_are_rejected() {
        assert!(NumberFormat::new('x', 0).is_err());
        assert!(NumberFormat::new(' ', 0).is_err());
        assert!(NumberFormat::new('-', MAX_PAD_WIDTH + 1).is_err());
    }

    #[test]
    fn sequence_key_parse_rejects_blank_values() {
        assert!("".parse::<SequenceKey>().is_err());
        assert!("CO 2026".parse::<SequenceKey>().is_err());
        assert_eq!("CO-2026".parse::<SequenceKey>().unwrap(), co_2026());
    }

    #[test]
    fn extra_suffix_is_malformed() {
        let err = NumberFormat::default()
            .parse_seq(&co_2026(), "CO-2026-12-B")
            .unwrap_err();
        assert_eq!(
            err,
            MalformedNumber::NonNumericSequence {
                number: "CO-2026-12-B".to_string(),
                trailing: "12-B".to_string(),
            }
        );
    }

    #[test]
    fn other_series_and_glued_periods_are_foreign() {
        let format = NumberFormat::default();
        assert!(matches!(
            format.parse_seq(&co_2026(), "PO-2026-3"),
            Err(MalformedNumber::ForeignPrefix { .. })
        ));
        assert!(matches!(
            format.parse_seq(&co_2026(), "CO-20261"),
            Err(MalformedNumber::ForeignPrefix { .. })
        ));
    }

    #[test]
    fn empty_and_overflowing_sequences_are_malformed() {
        let format = NumberFormat::default();
        assert!(matches!(
            format.parse_seq(&co_2026(), "CO-2026-"),
            Err(MalformedNumber::EmptySequence { .. })
        ));
        assert!(matches!(
            format.parse_seq(&co_2026(), "CO-2026-99999999999999999999999"),
            Err(MalformedNumber::SequenceOverflow { .. })
        ));
    }

    #[test]
    fn sequence_key_serializes_as_plain_string() {
        let json = serde_json::to_string(&co_2026()).unwrap();
        assert_eq!(json, "\"CO-2026\"");
        let back: SequenceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, co_2026());
        assert!(serde_json::from_str::<SequenceKey>("\"\"").is_err());
    }

    proptest! {
        /// Property: the trailing integer of any rendered number is the
        /// sequence it was rendered from.
        #[test]
        fn rendered_sequence_is_recovered(seq in 0u64..u64::MAX, pad in 0usize..=MAX_PAD_WIDTH) {
            let format = NumberFormat::new('-', pad).unwrap();
            let key = format.key("CO", "2026").unwrap();
            let number = format.render(&key, seq);
            prop_assert_eq!(format.parse_seq(&key, number.as_str()), Ok(seq));
        }
    }
}

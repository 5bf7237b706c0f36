//! LSNP wire record: newline-delimited key-value pairs terminated by a
//! blank line (spec §4.1).
//!
//! Keys keep insertion order so serialized test vectors are reproducible;
//! equality ignores order, since two records with the same pairs in a
//! different sequence mean the same thing on the wire.

use thiserror::Error;

/// One LSNP message: an ordered list of string key/value pairs.
///
/// Lookups are linear scans. Records carry at most a few dozen fields
/// (file-chunk records are the largest, with a handful of header fields
/// plus one `DATA` value), so a `Vec` beats the bookkeeping of a hash map.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, String)>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("record is empty")]
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializeError {
    #[error("value for key {0:?} contains a forbidden newline")]
    NewlineInValue(String),
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key, preserving the position of the first
    /// insertion if the key already exists.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = value;
        } else {
            self.fields.push((key, value));
        }
        self
    }

    /// Builder-style variant of [`Record::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a full record out of `bytes`.
    ///
    /// Splits on the first LF of each line; within a line, splits on the
    /// first `": "` and trims the one conventional leading space. Lines
    /// without a colon are skipped silently, matching spec §4.1. Binary
    /// input that isn't valid UTF-8 is treated line-by-line with lossy
    /// decoding, since the protocol never sends non-text outside of the
    /// base64-encoded `DATA` field.
    pub fn parse(bytes: &[u8]) -> Result<Record, ParseError> {
        let text = String::from_utf8_lossy(bytes);
        let mut record = Record::new();
        for line in text.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            record.set(key, value);
        }
        if record.fields.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(record)
    }

    /// Serialize back to wire bytes: `key: value\n` per field, terminated
    /// by an extra blank line.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let mut out = String::new();
        for (key, value) in &self.fields {
            if value.contains('\n') {
                return Err(SerializeError::NewlineInValue(key.clone()));
            }
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        Ok(out.into_bytes())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.fields.len() != other.fields.len() {
            return false;
        }
        self.fields
            .iter()
            .all(|(k, v)| other.get(k) == Some(v.as_str()))
    }
}

impl Eq for Record {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_empty_record() {
        assert_eq!(Record::parse(b""), Err(ParseError::Empty));
        assert_eq!(Record::parse(b"\n\n"), Err(ParseError::Empty));
    }

    #[test]
    fn parse_skips_lines_without_colon() {
        let r = Record::parse(b"TYPE: PING\nnotacolonline\nFROM: alice@1.2.3.4\n\n").unwrap();
        assert_eq!(r.get("TYPE"), Some("PING"));
        assert_eq!(r.get("FROM"), Some("alice@1.2.3.4"));
    }

    #[test]
    fn parse_trims_one_leading_space() {
        let r = Record::parse(b"TYPE:  PING\n\n").unwrap();
        // only the single conventional space after ':' is trimmed
        assert_eq!(r.get("TYPE"), Some(" PING"));
    }

    #[test]
    fn serialize_roundtrip_preserves_semantic_equality() {
        let r = Record::new().with("TYPE", "DM").with("FROM", "a@1.2.3.4");
        let bytes = r.serialize().unwrap();
        let r2 = Record::parse(&bytes).unwrap();
        assert_eq!(r, r2);
    }

    #[test]
    fn serialize_rejects_embedded_newline() {
        let r = Record::new().with("CONTENT", "hello\nworld");
        assert!(matches!(
            r.serialize(),
            Err(SerializeError::NewlineInValue(_))
        ));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = Record::new().with("A", "1").with("B", "2");
        let b = Record::new().with("B", "2").with("A", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut r = Record::new();
        r.set("TYPE", "PING").set("TYPE", "PONG");
        assert_eq!(r.get("TYPE"), Some("PONG"));
        assert_eq!(r.iter().count(), 1);
    }
}

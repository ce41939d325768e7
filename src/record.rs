//! Verse records and their identity
//!
//! A record's identity is the full `(book_name, chapter, verse, text)` tuple.
//! Including the text means an edited verse is treated as new work instead of
//! being matched to a result computed for the old wording.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One verse from one dataset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub book_name: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
}

impl Record {
    pub fn new(
        book_name: impl Into<String>,
        chapter: u32,
        verse: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            book_name: book_name.into(),
            chapter,
            verse,
            text: text.into(),
        }
    }

    /// Borrowed identity of this record
    pub fn key(&self) -> RecordKey<'_> {
        RecordKey {
            book_name: &self.book_name,
            chapter: self.chapter,
            verse: self.verse,
            text: &self.text,
        }
    }

    /// Whether there is any text to decompose
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.book_name, self.chapter, self.verse)
    }
}

/// Identity of a record, borrowed from a [`Record`] or a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey<'a> {
    pub book_name: &'a str,
    pub chapter: u32,
    pub verse: u32,
    pub text: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_includes_text() {
        let original = Record::new("Genesis", 1, 1, "In the beginning");
        let edited = Record::new("Genesis", 1, 1, "In the beginning God");

        assert_ne!(original.key(), edited.key());
        assert_eq!(original.key(), original.clone().key());
    }

    #[test]
    fn test_keys_deduplicate_in_sets() {
        let a = Record::new("Exodus", 20, 2, "Thou shalt not");
        let b = a.clone();
        let mut set = HashSet::new();
        assert!(set.insert(a.key()));
        assert!(!set.insert(b.key()));
    }

    #[test]
    fn test_display_reference() {
        let record = Record::new("1 Samuel", 3, 10, "Speak");
        assert_eq!(record.to_string(), "1 Samuel 3:10");
    }

    #[test]
    fn test_has_text() {
        assert!(Record::new("Genesis", 1, 1, "text").has_text());
        assert!(!Record::new("Genesis", 1, 2, "   ").has_text());
    }
}

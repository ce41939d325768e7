//! Append-only ledger of decomposition outcomes
//!
//! One CSV row per completed dispatch: `book_name, chapter, verse, text,
//! normalization`, where `normalization` is a JSON array of strings (empty on
//! failure). A verse counts as processed once any of its rows carries a
//! non-empty array.

pub mod retention;
pub mod writer;

pub use retention::{compact_ledger, CompactionStats, LedgerRetention};
pub use writer::LedgerWriter;

use crate::error::{NormalizeError, Result};
use crate::record::{Record, RecordKey};
use crate::source::{normalize_header, parse_number};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Ledger columns, in output order
pub const LEDGER_HEADER: [&str; 5] = ["book_name", "chapter", "verse", "text", "normalization"];

/// Outcome of one dispatch attempt for one verse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub book_name: String,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    pub propositions: Vec<String>,
}

impl LedgerEntry {
    pub fn new(record: &Record, propositions: Vec<String>) -> Self {
        Self {
            book_name: record.book_name.clone(),
            chapter: record.chapter,
            verse: record.verse,
            text: record.text.clone(),
            propositions,
        }
    }

    /// Entry recording a failed attempt
    pub fn failed(record: &Record) -> Self {
        Self::new(record, Vec::new())
    }

    pub fn key(&self) -> RecordKey<'_> {
        RecordKey {
            book_name: &self.book_name,
            chapter: self.chapter,
            verse: self.verse,
            text: &self.text,
        }
    }

    /// Whether this entry marks its verse as processed
    pub fn is_success(&self) -> bool {
        !self.propositions.is_empty()
    }

    /// The CSV fields of this entry
    pub(crate) fn to_fields(&self) -> Result<[String; 5]> {
        Ok([
            self.book_name.clone(),
            self.chapter.to_string(),
            self.verse.to_string(),
            self.text.clone(),
            serde_json::to_string(&self.propositions)?,
        ])
    }
}

/// Pure: parse the `normalization` cell. Anything but a JSON string array is empty.
pub fn parse_normalization(cell: &str) -> Vec<String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(cell).unwrap_or_else(|e| {
        debug!("Treating unparseable normalization cell as empty: {}", e);
        Vec::new()
    })
}

/// Read every entry of the ledger at `path`. A missing ledger has no entries.
pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(NormalizeError::Io(e)),
    };
    read_entries(file).map_err(|e| match e {
        NormalizeError::Ledger { message, .. } => NormalizeError::ledger(path, message),
        other => other,
    })
}

/// Read ledger entries from CSV data
///
/// Rows with the wrong number of fields (a row torn by a crash) or with
/// invalid chapter/verse numbers are skipped with a warning.
pub fn read_entries<R: Read>(reader: R) -> Result<Vec<LedgerEntry>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Ok(Vec::new());
    }

    let mut indices = [0usize; 5];
    for (slot, name) in indices.iter_mut().zip(LEDGER_HEADER) {
        *slot = headers.iter().position(|h| h == name).ok_or_else(|| {
            NormalizeError::ledger("<ledger>", format!("missing column '{}'", name))
        })?;
    }
    let [book_idx, chapter_idx, verse_idx, text_idx, norm_idx] = indices;

    let mut entries = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let line = index + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping unreadable ledger row {}: {}", line, e);
                continue;
            }
        };
        if row.len() != headers.len() {
            warn!(
                "Skipping ledger row {} with {} fields (expected {})",
                line,
                row.len(),
                headers.len()
            );
            continue;
        }

        let field = |idx: usize| row.get(idx).unwrap_or("");
        let numbers = parse_number(field(chapter_idx), "chapter", line)
            .and_then(|c| parse_number(field(verse_idx), "verse", line).map(|v| (c, v)));
        let (chapter, verse) = match numbers {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Skipping ledger row: {}", e);
                continue;
            }
        };

        entries.push(LedgerEntry {
            book_name: field(book_idx).trim().to_string(),
            chapter,
            verse,
            text: field(text_idx).to_string(),
            propositions: parse_normalization(field(norm_idx)),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_normalization() {
        assert_eq!(parse_normalization(r#"["a", "b"]"#), vec!["a", "b"]);
        assert!(parse_normalization("[]").is_empty());
        assert!(parse_normalization("").is_empty());
        assert!(parse_normalization("['python', 'repr']").is_empty());
        assert!(parse_normalization("[1, 2]").is_empty());
    }

    #[test]
    fn test_read_entries() {
        let data = "\
book_name,chapter,verse,text,normalization
Genesis,1,1,In the beginning,\"[\"\"God created.\"\"]\"
Genesis,1,2,The earth,[]
";
        let entries = read_entries(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].propositions, vec!["God created."]);
        assert!(entries[0].is_success());
        assert!(!entries[1].is_success());
    }

    #[test]
    fn test_torn_and_invalid_rows_skipped() {
        let data = "\
book_name,chapter,verse,text,normalization
Genesis,1,1,a,\"[\"\"x\"\"]\"
Genesis,x,2,b,[]
Genesis,1,3,c";
        let entries = read_entries(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].verse, 1);
    }

    #[test]
    fn test_missing_column_is_ledger_error() {
        let err = read_entries("book_name,chapter,verse,text\nG,1,1,a\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("normalization"));
    }

    #[test]
    fn test_missing_and_empty_ledger() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");
        assert!(read_ledger(&path).unwrap().is_empty());

        std::fs::write(&path, "").unwrap();
        assert!(read_ledger(&path).unwrap().is_empty());
    }

    #[test]
    fn test_entry_key_matches_record_key() {
        let record = Record::new("Ruth", 1, 16, "Whither thou goest");
        let entry = LedgerEntry::new(&record, vec!["p".into()]);
        assert_eq!(entry.key(), record.key());
        assert!(!LedgerEntry::failed(&record).is_success());
    }
}

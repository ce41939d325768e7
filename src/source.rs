//! Record source: loads one dataset's verses from its CSV table
//!
//! Headers are normalized (`Book Name` and `book_name` are the same column)
//! and an optional per-dataset filter narrows the records before resume
//! planning sees them.

use crate::error::{NormalizeError, Result};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REQUIRED_COLUMNS: [&str; 4] = ["book_name", "chapter", "verse", "text"];

/// Dataset-specific inclusion predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFilter {
    /// Keep only verses flagged in the `potential_difference_verse` column
    PotentialDifference,
}

impl RecordFilter {
    fn column(&self) -> &'static str {
        match self {
            RecordFilter::PotentialDifference => "potential_difference_verse",
        }
    }
}

/// Interpret a boolean-like cell. Accepts `true`/`false` in any case and `1`/`0`.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Normalize a header cell to its canonical column name
pub(crate) fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Parse chapter/verse numbers, tolerating integral floats such as `3.0`
pub(crate) fn parse_number(value: &str, column: &str, row: usize) -> Result<u32> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u32>() {
        return Ok(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as u32),
        _ => Err(NormalizeError::Source(format!(
            "row {}: invalid {} value '{}'",
            row, column, value
        ))),
    }
}

/// The backing table for one dataset
#[derive(Debug, Clone)]
pub struct RecordSource {
    dataset: String,
    path: PathBuf,
    filter: Option<RecordFilter>,
}

impl RecordSource {
    pub fn new(dataset: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            path: path.into(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<RecordFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full ordered record collection, with the filter applied
    pub fn load(&self) -> Result<Vec<Record>> {
        if !self.path.is_file() {
            return Err(NormalizeError::SourceUnavailable {
                dataset: self.dataset.clone(),
                path: self.path.clone(),
            });
        }

        let file = std::fs::File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NormalizeError::SourceUnavailable {
                    dataset: self.dataset.clone(),
                    path: self.path.clone(),
                }
            } else {
                NormalizeError::Io(e)
            }
        })?;

        let records = read_records(file, self.filter)?;
        info!(
            dataset = %self.dataset,
            records = records.len(),
            "Loaded source {}",
            self.path.display()
        );
        Ok(records)
    }
}

/// Read records from CSV data. Exposed for callers that already hold the bytes.
pub fn read_records<R: Read>(reader: R, filter: Option<RecordFilter>) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let mut indices = [0usize; 4];
    for (slot, name) in indices.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = column(name)
            .ok_or_else(|| NormalizeError::Source(format!("missing required column '{}'", name)))?;
    }
    let [book_idx, chapter_idx, verse_idx, text_idx] = indices;

    // An absent flag column turns the filter into a no-op
    let flag_idx = match filter {
        Some(f) => {
            let idx = column(f.column());
            if idx.is_none() {
                debug!("Filter column '{}' absent; keeping all records", f.column());
            }
            idx
        }
        None => None,
    };

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        // Data rows are 2-based in spreadsheet terms (header is row 1)
        let line = index + 2;

        if let Some(idx) = flag_idx {
            if !parse_flag(row.get(idx).unwrap_or("")) {
                continue;
            }
        }

        let field = |idx: usize| row.get(idx).unwrap_or("");
        let numbers = parse_number(field(chapter_idx), "chapter", line)
            .and_then(|c| parse_number(field(verse_idx), "verse", line).map(|v| (c, v)));
        let (chapter, verse) = match numbers {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Skipping source row: {}", e);
                continue;
            }
        };

        records.push(Record {
            book_name: field(book_idx).trim().to_string(),
            chapter,
            verse,
            text: field(text_idx).to_string(),
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SEPTUAGINT: &str = "\
book_name,chapter,verse,potential_difference_verse,text
Genesis,1,1,True,Verse 1 text
Genesis,1,2,False,Verse 2 text
Exodus,20,1,true,Verse 3 text
";

    #[test]
    fn test_load_records_in_order() {
        let data = "book_name,chapter,verse,text\nGenesis,1,1,In the beginning...\nExodus,20,2,Thou shalt not...\n";
        let records = read_records(data.as_bytes(), None).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], Record::new("Genesis", 1, 1, "In the beginning..."));
        assert_eq!(records[1].book_name, "Exodus");
        assert_eq!(records[1].chapter, 20);
    }

    #[test]
    fn test_filter_potential_difference() {
        let records =
            read_records(SEPTUAGINT.as_bytes(), Some(RecordFilter::PotentialDifference)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "Verse 1 text");
        assert_eq!(records[1].text, "Verse 3 text");
    }

    #[test]
    fn test_filter_without_column_is_noop() {
        let data = "book_name,chapter,verse,text\nGenesis,1,1,a\nGenesis,1,2,b\n";
        let records =
            read_records(data.as_bytes(), Some(RecordFilter::PotentialDifference)).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_headers_are_normalized() {
        let data = "Book Name,Chapter,Verse,Text\nPsalms,23,1,The Lord is my shepherd\n";
        let records = read_records(data.as_bytes(), None).unwrap();
        assert_eq!(records[0].book_name, "Psalms");
        assert_eq!(records[0].verse, 1);
    }

    #[test]
    fn test_integral_float_numbers_accepted() {
        let data = "book_name,chapter,verse,text\nGenesis,1.0,2.0,x\n";
        let records = read_records(data.as_bytes(), None).unwrap();
        assert_eq!((records[0].chapter, records[0].verse), (1, 2));
    }

    #[test]
    fn test_row_with_invalid_number_skipped() {
        let data = "book_name,chapter,verse,text\nGenesis,1,1,a\nGenesis,one,2,b\nGenesis,1,3.5,c\nGenesis,1,4,d\n";
        let records = read_records(data.as_bytes(), None).unwrap();

        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "d"]);
    }

    #[test]
    fn test_invalid_number_names_row() {
        let err = parse_number("one", "chapter", 3).unwrap_err();
        assert!(matches!(err, NormalizeError::Source(msg) if msg.contains("row 3")));
    }

    #[test]
    fn test_missing_required_column() {
        let data = "book_name,chapter,text\nGenesis,1,x\n";
        let err = read_records(data.as_bytes(), None).unwrap_err();
        assert!(err.to_string().contains("verse"));
    }

    #[test]
    fn test_parse_flag_values() {
        assert!(parse_flag("True"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("yes"));
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let temp = TempDir::new().unwrap();
        let source = RecordSource::new("vulgate", temp.path().join("vulgate.csv"));

        match source.load() {
            Err(NormalizeError::SourceUnavailable { dataset, .. }) => assert_eq!(dataset, "vulgate"),
            other => panic!("expected SourceUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_file_with_filter() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("septuagint.csv");
        std::fs::write(&path, SEPTUAGINT).unwrap();

        let source = RecordSource::new("septuagint", &path)
            .with_filter(Some(RecordFilter::PotentialDifference));
        assert_eq!(source.load().unwrap().len(), 2);
    }
}

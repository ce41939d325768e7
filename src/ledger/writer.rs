//! Single-writer append discipline for the ledger file
//!
//! Each row is encoded in memory and handed to the file in one `write_all`,
//! then flushed and synced before the next append begins. A crash can at worst
//! leave a partial final row, possibly ending inside a quoted field;
//! [`LedgerWriter::open`] truncates such a torn tail before appending, so it
//! is never glued to a new row.

use super::{LedgerEntry, LEDGER_HEADER};
use crate::error::{NormalizeError, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Appends ledger rows, one at a time, to a single file
pub struct LedgerWriter {
    path: PathBuf,
    file: File,
    rows_written: usize,
}

impl LedgerWriter {
    /// Open `path` for appending, creating it with a header if needed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    NormalizeError::ledger(&path, format!("failed to create directory: {}", e))
                })?;
            }
        }

        if let Some(offset) = repair_torn_tail(&path).await? {
            warn!(
                "Truncated torn trailing row in {} at byte {}",
                path.display(),
                offset
            );
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| NormalizeError::ledger(&path, format!("failed to open: {}", e)))?;

        let len = file.metadata().await?.len();
        if len == 0 {
            let header = encode_row(&LEDGER_HEADER)?;
            write_synced(&mut file, &header)
                .await
                .map_err(|e| NormalizeError::ledger(&path, format!("failed to write header: {}", e)))?;
            info!("Created ledger {}", path.display());
        } else {
            debug!("Appending to existing ledger {} ({} bytes)", path.display(), len);
        }

        Ok(Self {
            path,
            file,
            rows_written: 0,
        })
    }

    /// Append one entry. The full row is durable when this returns.
    pub async fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        let row = encode_row(&entry.to_fields()?)?;
        write_synced(&mut self.file, &row)
            .await
            .map_err(|e| NormalizeError::ledger(&self.path, format!("failed to append row: {}", e)))?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this writer
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

async fn write_synced(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

/// Pure: encode one CSV row, including its terminating newline
pub(crate) fn encode_row<S: AsRef<[u8]>>(fields: &[S]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| NormalizeError::Io(std::io::Error::other(e.to_string())))
}

/// Pure: byte offset where a torn trailing row starts, if the data has one
///
/// The last record is complete only when it ends with a newline, has as many
/// fields as the header, and closes every quote it opens. A row torn right
/// after a newline inside a quoted field fails the last two checks. Quoted
/// fields may span lines, so the record boundary comes from the CSV reader
/// rather than from the last newline.
pub(crate) fn torn_tail_offset(data: &[u8]) -> Option<u64> {
    if data.is_empty() {
        return None;
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut record = csv::ByteRecord::new();
    let mut header_fields = None;
    let mut last: Option<(u64, usize)> = None;
    loop {
        let start = reader.position().byte();
        match reader.read_byte_record(&mut record) {
            Ok(true) => {
                header_fields.get_or_insert(record.len());
                last = Some((start, record.len()));
            }
            Ok(false) => break,
            Err(_) => {
                last = Some((start, 0));
                break;
            }
        }
    }

    let (start, fields) = last?;
    let tail = data.get(start as usize..).unwrap_or_default();
    let quotes = tail.iter().filter(|&&b| b == b'"').count();
    let complete =
        data.ends_with(b"\n") && header_fields == Some(fields) && quotes % 2 == 0;

    if complete {
        None
    } else {
        Some(start)
    }
}

/// Truncate a torn trailing row, returning the new length if anything was cut
async fn repair_torn_tail(path: &Path) -> Result<Option<u64>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(NormalizeError::ledger(path, format!("failed to read: {}", e))),
    };

    let Some(offset) = torn_tail_offset(&data) else {
        return Ok(None);
    };

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| NormalizeError::ledger(path, format!("failed to open for repair: {}", e)))?;
    file.set_len(offset).await?;
    file.sync_all().await?;
    Ok(Some(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::read_ledger;
    use crate::record::Record;
    use tempfile::TempDir;

    fn entry(verse: u32, props: &[&str]) -> LedgerEntry {
        LedgerEntry::new(
            &Record::new("Genesis", 1, verse, format!("text {}", verse)),
            props.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_encode_row_quotes_json() {
        let row = encode_row(&entry(1, &["a, b"]).to_fields().unwrap()).unwrap();
        assert_eq!(
            String::from_utf8(row).unwrap(),
            "Genesis,1,1,text 1,\"[\"\"a, b\"\"]\"\n"
        );
    }

    #[test]
    fn test_torn_tail_offset() {
        assert_eq!(torn_tail_offset(b""), None);
        assert_eq!(torn_tail_offset(b"h1,h2\na,b\n"), None);
        assert_eq!(torn_tail_offset(b"h1,h2\na,b\nc,"), Some(10));
        // Torn inside a quoted field that spans lines
        assert_eq!(torn_tail_offset(b"h1,h2\na,\"multi\nline"), Some(6));
        // Only a torn header
        assert_eq!(torn_tail_offset(b"book_na"), Some(0));
        // Torn right after a newline inside a quoted field
        assert_eq!(torn_tail_offset(b"h1,h2,h3\na,b,c\nd,\"first line\n"), Some(15));
        assert_eq!(torn_tail_offset(b"h1,h2\na,\"[\"\"x\n"), Some(6));
        // Too few fields, newline-terminated
        assert_eq!(torn_tail_offset(b"h1,h2,h3\na,b,c\nd,e\n"), Some(15));
        // A complete multi-line quoted field is not torn
        assert_eq!(torn_tail_offset(b"h1,h2\na,\"x\ny\"\n"), None);
        assert_eq!(torn_tail_offset(b"h1,h2\na,\"say \"\"hi\"\"\"\n"), None);
    }

    #[tokio::test]
    async fn test_open_creates_header_and_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("output").join("vulgate_normalised.csv");

        let writer = LedgerWriter::open(&path).await.unwrap();
        assert_eq!(writer.rows_written(), 0);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "book_name,chapter,verse,text,normalization\n"
        );
    }

    #[tokio::test]
    async fn test_reopen_does_not_rewrite_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&entry(1, &["p"])).await.unwrap();
        drop(writer);

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&entry(2, &[])).await.unwrap();
        assert_eq!(writer.rows_written(), 1);
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("book_name").count(), 1);

        let entries = read_ledger(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], entry(1, &["p"]));
        assert!(entries[1].propositions.is_empty());
    }

    #[tokio::test]
    async fn test_open_repairs_torn_row() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&entry(1, &["p"])).await.unwrap();
        drop(writer);

        // Simulate a crash mid-append
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"Genesis,1,2,text 2,\"[\"\"half");
        std::fs::write(&path, &bytes).unwrap();

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&entry(3, &["q"])).await.unwrap();
        drop(writer);

        let entries = read_ledger(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], entry(3, &["q"]));
    }

    #[tokio::test]
    async fn test_open_repairs_row_torn_inside_multiline_text() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&entry(1, &["p"])).await.unwrap();
        drop(writer);

        // Crash after the embedded line break of a verse's text
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"Genesis,1,2,\"first line\n");
        std::fs::write(&path, &bytes).unwrap();

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        for verse in 3..=5 {
            writer.append(&entry(verse, &["q"])).await.unwrap();
        }
        drop(writer);

        let verses: Vec<u32> = read_ledger(&path).unwrap().iter().map(|e| e.verse).collect();
        assert_eq!(verses, vec![1, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_multiline_text_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");
        let record = Record::new("Psalms", 23, 1, "The Lord is my shepherd;\nI shall not want.");

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&LedgerEntry::new(&record, vec!["p".into()])).await.unwrap();
        drop(writer);

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        writer.append(&entry(2, &["q"])).await.unwrap();
        drop(writer);

        let entries = read_ledger(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, record.text);
    }

    #[tokio::test]
    async fn test_torn_header_rewritten() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");
        std::fs::write(&path, "book_name,chap").unwrap();

        drop(LedgerWriter::open(&path).await.unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "book_name,chapter,verse,text,normalization\n"
        );
    }
}

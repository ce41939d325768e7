//! Ledger retention policy
//!
//! Failed attempts append an empty row on every run until the verse finally
//! succeeds. `Audit` keeps all of them. `Compact` rewrites the ledger before
//! planning so that each verse keeps its first successful row, or only its
//! latest failed row when it has never succeeded. Compaction never runs while
//! a dispatch is appending.

use super::writer::encode_row;
use super::{read_ledger, LedgerEntry, LEDGER_HEADER};
use crate::error::{NormalizeError, Result};
use crate::record::RecordKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// How empty-result rows are retained across runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerRetention {
    /// Append-only; every attempt stays in the ledger
    #[default]
    Audit,
    /// Drop superseded failure rows before planning
    Compact,
}

/// Counts reported by a compaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub rows_before: usize,
    pub rows_after: usize,
}

impl CompactionStats {
    pub fn rows_removed(&self) -> usize {
        self.rows_before - self.rows_after
    }
}

/// Pure: indices of the entries a compacted ledger keeps, in ledger order
pub fn retained_indices(entries: &[LedgerEntry]) -> Vec<usize> {
    let mut first_success: HashMap<RecordKey<'_>, usize> = HashMap::new();
    let mut last_failure: HashMap<RecordKey<'_>, usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        if entry.is_success() {
            first_success.entry(entry.key()).or_insert(index);
        } else {
            last_failure.insert(entry.key(), index);
        }
    }

    let mut keep: HashSet<usize> = first_success.values().copied().collect();
    keep.extend(
        last_failure
            .iter()
            .filter(|(key, _)| !first_success.contains_key(*key))
            .map(|(_, index)| *index),
    );

    let mut keep: Vec<usize> = keep.into_iter().collect();
    keep.sort_unstable();
    keep
}

/// Rewrite the ledger at `path` keeping only retained rows
///
/// The new content is written to a temporary file in the same directory,
/// synced, and renamed over the ledger, so a crash leaves either the old or
/// the new ledger. A missing ledger, or one with nothing to drop, is left
/// untouched.
pub fn compact_ledger(path: &Path) -> Result<CompactionStats> {
    let entries = read_ledger(path)?;
    let keep = retained_indices(&entries);
    let stats = CompactionStats {
        rows_before: entries.len(),
        rows_after: keep.len(),
    };

    if stats.rows_removed() == 0 {
        return Ok(stats);
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(&encode_row(&LEDGER_HEADER)?)?;
    for index in keep {
        temp.write_all(&encode_row(&entries[index].to_fields()?)?)?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| NormalizeError::ledger(path, format!("failed to replace ledger: {}", e)))?;

    info!(
        "Compacted ledger {}: {} -> {} rows",
        path.display(),
        stats.rows_before,
        stats.rows_after
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerWriter;
    use crate::record::Record;
    use tempfile::TempDir;

    fn entry(verse: u32, props: &[&str]) -> LedgerEntry {
        LedgerEntry::new(
            &Record::new("Exodus", 3, verse, format!("v{}", verse)),
            props.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_retained_indices() {
        let entries = vec![
            entry(1, &[]),    // 0: superseded by success at 2
            entry(2, &[]),    // 1: superseded by later failure at 3
            entry(1, &["a"]), // 2: success kept
            entry(2, &[]),    // 3: latest failure kept
            entry(4, &["b"]), // 4: success kept
        ];
        assert_eq!(retained_indices(&entries), vec![2, 3, 4]);
    }

    #[test]
    fn test_retained_indices_empty() {
        assert!(retained_indices(&[]).is_empty());
    }

    #[test]
    fn test_policy_deserializes() {
        #[derive(Deserialize)]
        struct Wrapper {
            retention: LedgerRetention,
        }
        let w: Wrapper = toml::from_str("retention = \"compact\"").unwrap();
        assert_eq!(w.retention, LedgerRetention::Compact);
        assert_eq!(LedgerRetention::default(), LedgerRetention::Audit);
    }

    #[tokio::test]
    async fn test_compact_rewrites_ledger() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ledger.csv");

        let mut writer = LedgerWriter::open(&path).await.unwrap();
        for e in [entry(1, &[]), entry(1, &[]), entry(2, &["x"]), entry(1, &[])] {
            writer.append(&e).await.unwrap();
        }
        drop(writer);

        let stats = compact_ledger(&path).unwrap();
        assert_eq!(stats.rows_before, 4);
        assert_eq!(stats.rows_after, 2);
        assert_eq!(stats.rows_removed(), 2);

        let entries = read_ledger(&path).unwrap();
        assert_eq!(entries, vec![entry(2, &["x"]), entry(1, &[])]);

        // Already compact: nothing to do
        assert_eq!(compact_ledger(&path).unwrap().rows_removed(), 0);
    }

    #[test]
    fn test_compact_missing_ledger_is_noop() {
        let temp = TempDir::new().unwrap();
        let stats = compact_ledger(&temp.path().join("none.csv")).unwrap();
        assert_eq!(stats, CompactionStats::default());
        assert!(!temp.path().join("none.csv").exists());
    }
}

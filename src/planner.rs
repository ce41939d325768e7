//! Pure functions for resume planning
//!
//! The ledger is the only record of progress. A verse is processed once any
//! ledger entry for its identity carries propositions; everything else in the
//! source is pending again, including verses whose earlier attempts failed.

use crate::ledger::LedgerEntry;
use crate::record::{Record, RecordKey};
use std::collections::HashSet;

/// What the next dispatch has to do for one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePlan {
    /// Records to dispatch, in source order, one per identity
    pub pending: Vec<Record>,
    /// Source records already carrying a successful ledger entry
    pub processed: usize,
    /// Records in the source collection
    pub total: usize,
    /// Repeated identities dropped from `pending`
    pub duplicates: usize,
    /// Pending records whose earlier attempts left only empty entries
    pub retrying: usize,
    /// Records with blank text, never dispatched
    pub skipped_blank: usize,
}

impl ResumePlan {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Identities with at least one successful entry
pub fn processed_keys(entries: &[LedgerEntry]) -> HashSet<RecordKey<'_>> {
    entries
        .iter()
        .filter(|entry| entry.is_success())
        .map(LedgerEntry::key)
        .collect()
}

/// Pure function computing the pending subset of `records`
pub fn plan(records: Vec<Record>, entries: &[LedgerEntry]) -> ResumePlan {
    let processed = processed_keys(entries);
    let attempted: HashSet<RecordKey<'_>> = entries.iter().map(LedgerEntry::key).collect();

    let mut plan = ResumePlan {
        total: records.len(),
        ..ResumePlan::default()
    };

    let mut seen: HashSet<RecordKey<'_>> = HashSet::new();
    let mut pending_indices = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let key = record.key();
        if processed.contains(&key) {
            plan.processed += 1;
            continue;
        }
        if !record.has_text() {
            plan.skipped_blank += 1;
            continue;
        }
        if !seen.insert(key) {
            plan.duplicates += 1;
            continue;
        }
        if attempted.contains(&key) {
            plan.retrying += 1;
        }
        pending_indices.push(index);
    }
    drop(seen);

    let mut wanted = pending_indices.into_iter().peekable();
    plan.pending = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            if wanted.peek() == Some(&index) {
                wanted.next();
                Some(record)
            } else {
                None
            }
        })
        .collect();

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::abc_records;

    fn success(record: &Record) -> LedgerEntry {
        LedgerEntry::new(record, vec!["p".to_string()])
    }

    #[test]
    fn test_empty_ledger_everything_pending() {
        let plan = plan(abc_records(), &[]);
        assert_eq!(plan.pending, abc_records());
        assert_eq!(plan.total, 3);
        assert_eq!(plan.processed, 0);
        assert_eq!(plan.retrying, 0);
    }

    #[test]
    fn test_successful_entries_are_not_pending() {
        let records = abc_records();
        let entries = vec![success(&records[0]), success(&records[2])];

        let plan = plan(records.clone(), &entries);
        assert_eq!(plan.pending, vec![records[1].clone()]);
        assert_eq!(plan.processed, 2);
    }

    #[test]
    fn test_fully_processed_plan_is_complete() {
        let records = abc_records();
        let entries: Vec<_> = records.iter().map(success).collect();
        let plan = plan(records, &entries);
        assert!(plan.is_complete());
        assert_eq!(plan.processed, 3);
    }

    #[test]
    fn test_failed_entries_are_retried() {
        let records = abc_records();
        let entries = vec![
            success(&records[0]),
            LedgerEntry::failed(&records[1]),
            LedgerEntry::failed(&records[1]),
        ];

        let plan = plan(records.clone(), &entries);
        assert_eq!(plan.pending, vec![records[1].clone(), records[2].clone()]);
        assert_eq!(plan.retrying, 1);
    }

    #[test]
    fn test_failure_after_success_stays_processed() {
        let records = abc_records();
        let entries = vec![success(&records[1]), LedgerEntry::failed(&records[1])];
        let plan = plan(records, &entries);
        assert_eq!(plan.pending.len(), 2);
        assert_eq!(plan.processed, 1);
    }

    #[test]
    fn test_identity_includes_text() {
        let records = abc_records();
        let mut revised = records[0].clone();
        revised.text = "revised wording".to_string();

        let plan = plan(vec![revised.clone()], &[success(&records[0])]);
        assert_eq!(plan.pending, vec![revised]);
    }

    #[test]
    fn test_duplicate_identities_dispatched_once() {
        let mut records = abc_records();
        records.push(records[0].clone());

        let plan = plan(records, &[]);
        assert_eq!(plan.pending, abc_records());
        assert_eq!(plan.duplicates, 1);
        assert_eq!(plan.total, 4);
    }

    #[test]
    fn test_blank_text_skipped() {
        let mut records = abc_records();
        records.push(Record::new("Genesis", 1, 4, "   "));

        let plan = plan(records, &[]);
        assert_eq!(plan.pending.len(), 3);
        assert_eq!(plan.skipped_blank, 1);
    }
}

//! Per-dataset run: load, plan, dispatch
//!
//! Datasets run one after another. Source and ledger failures skip the
//! dataset; only configuration errors end the run.

use crate::client::DecompositionClient;
use crate::config::DatasetConfig;
use crate::dispatcher::{DispatchSummary, Dispatcher};
use crate::error::Result;
use crate::ledger::{compact_ledger, read_ledger, CompactionStats, LedgerRetention, LedgerWriter};
use crate::planner::{self, ResumePlan};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of running one dataset to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub name: String,
    pub total: usize,
    /// Verses already processed before this run
    pub processed_before: usize,
    pub pending: usize,
    pub dispatch: DispatchSummary,
    pub compaction: Option<CompactionStats>,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<DatasetReport>,
    /// Skipped datasets with the reason
    pub skipped: Vec<(String, String)>,
}

impl RunSummary {
    pub fn rows_written(&self) -> usize {
        self.completed.iter().map(|r| r.dispatch.dispatched).sum()
    }
}

/// Plan one dataset without touching its ledger
pub fn plan_dataset(dataset: &DatasetConfig) -> Result<ResumePlan> {
    let records = dataset.record_source().load()?;
    let entries = read_ledger(&dataset.ledger)?;
    Ok(planner::plan(records, &entries))
}

pub struct Pipeline {
    client: Arc<DecompositionClient>,
    dispatcher: Dispatcher,
    retention: LedgerRetention,
}

impl Pipeline {
    pub fn new(client: Arc<DecompositionClient>, dispatcher: Dispatcher) -> Self {
        Self {
            client,
            dispatcher,
            retention: LedgerRetention::default(),
        }
    }

    pub fn with_retention(mut self, retention: LedgerRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Run every dataset in order
    pub async fn run(&self, datasets: &[DatasetConfig]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for dataset in datasets {
            match self.run_dataset(dataset).await {
                Ok(report) => summary.completed.push(report),
                Err(e) if e.is_fatal() => {
                    error!(dataset = %dataset.name, "Aborting run: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(dataset = %dataset.name, "Skipping dataset: {}", e);
                    summary.skipped.push((dataset.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Run finished: {} datasets completed, {} skipped, {} rows written",
            summary.completed.len(),
            summary.skipped.len(),
            summary.rows_written()
        );
        Ok(summary)
    }

    /// Load, plan, and dispatch one dataset
    pub async fn run_dataset(&self, dataset: &DatasetConfig) -> Result<DatasetReport> {
        info!(dataset = %dataset.name, "Processing dataset");
        let records = dataset.record_source().load()?;

        let compaction = match self.retention {
            LedgerRetention::Compact => Some(compact_ledger(&dataset.ledger)?),
            LedgerRetention::Audit => None,
        };

        // Opened before planning: a torn tail is repaired before the ledger is
        // read, and an interrupted run still leaves a well-formed file
        let mut writer = LedgerWriter::open(&dataset.ledger).await?;

        let entries = read_ledger(&dataset.ledger)?;
        let plan = planner::plan(records, &entries);
        drop(entries);

        info!(
            dataset = %dataset.name,
            total = plan.total,
            processed = plan.processed,
            pending = plan.pending.len(),
            retrying = plan.retrying,
            "Resume plan ready"
        );
        if plan.duplicates > 0 {
            warn!(dataset = %dataset.name, "Dropped {} duplicate records", plan.duplicates);
        }
        if plan.skipped_blank > 0 {
            warn!(dataset = %dataset.name, "Skipped {} records with blank text", plan.skipped_blank);
        }

        let pending = plan.pending.len();
        let dispatch = self
            .dispatcher
            .dispatch(self.client.clone(), plan.pending, &mut writer)
            .await?;

        Ok(DatasetReport {
            name: dataset.name.clone(),
            total: plan.total,
            processed_before: plan.processed,
            pending,
            dispatch,
            compaction,
        })
    }
}

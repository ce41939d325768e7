//! Bounded worker pool that decomposes pending verses
//!
//! Pending records go into a work queue drained by `W` worker tasks. Each
//! worker sends its outcome to a result channel whose only consumer is the
//! ledger writer, so rows land one at a time in completion order.

use crate::client::DecompositionClient;
use crate::error::{NormalizeError, Result};
use crate::ledger::{LedgerEntry, LedgerWriter};
use crate::record::Record;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Outcome = (Record, Result<Vec<String>>);

/// Counts for one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Records whose outcome reached the ledger
    pub dispatched: usize,
    /// Rows written with propositions
    pub succeeded: usize,
    /// Rows written empty
    pub failed: usize,
}

impl DispatchSummary {
    fn record(&mut self, success: bool) {
        self.dispatched += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Runs the worker pool for one dataset
#[derive(Debug, Clone)]
pub struct Dispatcher {
    concurrency: usize,
    show_progress: bool,
}

impl Dispatcher {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Decompose every pending record and append one ledger row per outcome
    ///
    /// Per-record failures become empty rows. A run-fatal error stops the
    /// workers from taking new records; outcomes already in flight are still
    /// written before the error is returned. A ledger write failure stops the
    /// dispatch the same way.
    pub async fn dispatch(
        &self,
        client: Arc<DecompositionClient>,
        pending: Vec<Record>,
        writer: &mut LedgerWriter,
    ) -> Result<DispatchSummary> {
        let total = pending.len();
        if total == 0 {
            debug!("Nothing to dispatch");
            return Ok(DispatchSummary::default());
        }

        let workers_count = self.concurrency.min(total);
        info!(
            "Dispatching {} records with {} workers",
            total, workers_count
        );

        let (work_tx, work_rx) = mpsc::channel::<Record>(total);
        let work_rx = Arc::new(RwLock::new(work_rx));
        for record in pending {
            work_tx
                .send(record)
                .await
                .map_err(|e| NormalizeError::External(format!("work queue closed: {}", e)))?;
        }
        drop(work_tx);

        let (result_tx, mut result_rx) = mpsc::channel::<Outcome>(workers_count);
        let abort = Arc::new(AtomicBool::new(false));

        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(workers_count);
        for worker_index in 0..workers_count {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let abort = abort.clone();
            let client = client.clone();
            workers.push(tokio::spawn(async move {
                run_worker(worker_index, client, work_rx, result_tx, abort).await
            }));
        }
        drop(result_tx);

        let progress = self.progress_bar(total);
        let mut summary = DispatchSummary::default();
        let mut fatal: Option<NormalizeError> = None;
        let mut ledger_error: Option<NormalizeError> = None;

        while let Some((record, outcome)) = result_rx.recv().await {
            let entry = match outcome {
                Ok(propositions) => {
                    if propositions.is_empty() {
                        warn!(
                            book = %record.book_name,
                            chapter = record.chapter,
                            verse = record.verse,
                            "No propositions produced; recording empty result"
                        );
                    }
                    LedgerEntry::new(&record, propositions)
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        book = %record.book_name,
                        chapter = record.chapter,
                        verse = record.verse,
                        error = %e,
                        "Fatal error; stopping dispatch"
                    );
                    fatal.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    warn!(
                        book = %record.book_name,
                        chapter = record.chapter,
                        verse = record.verse,
                        error = %e,
                        "Decomposition failed; recording empty result"
                    );
                    LedgerEntry::failed(&record)
                }
            };

            if ledger_error.is_some() {
                continue;
            }
            if let Err(e) = writer.append(&entry).await {
                error!(error = %e, "Failed to append ledger row; stopping dispatch");
                abort.store(true, Ordering::SeqCst);
                ledger_error = Some(e);
                continue;
            }
            summary.record(entry.is_success());
            progress.inc(1);
        }

        for joined in join_all(workers).await {
            if let Err(join_err) = joined {
                error!("Dispatch worker panicked: {}", join_err);
            }
        }
        progress.finish_and_clear();

        match fatal.or(ledger_error) {
            Some(e) => Err(e),
            None => {
                info!(
                    "Dispatch complete: {} succeeded, {} empty",
                    summary.succeeded, summary.failed
                );
                Ok(summary)
            }
        }
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("█▓▒░ "));
        }
        pb
    }
}

async fn run_worker(
    worker_index: usize,
    client: Arc<DecompositionClient>,
    work_rx: Arc<RwLock<mpsc::Receiver<Record>>>,
    result_tx: mpsc::Sender<Outcome>,
    abort: Arc<AtomicBool>,
) {
    loop {
        if abort.load(Ordering::SeqCst) {
            debug!(worker = worker_index, "Worker stopping after abort");
            break;
        }

        let next = {
            let mut rx = work_rx.write().await;
            rx.recv().await
        };
        let Some(record) = next else {
            break;
        };

        debug!(worker = worker_index, "Decomposing {}", record);
        let outcome = client.decompose(&record.text).await;
        if matches!(&outcome, Err(e) if e.is_fatal()) {
            abort.store(true, Ordering::SeqCst);
        }
        if result_tx.send((record, outcome)).await.is_err() {
            break;
        }
    }
}

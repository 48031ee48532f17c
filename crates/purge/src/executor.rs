//! Bounded-concurrency batch executor
//!
//! A fixed number of workers pull chunks from a shared queue until it is
//! empty. Each chunk is processed exactly once. A failing chunk is logged
//! and recorded in the report; it never stops the other workers or the
//! remaining chunks.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Workers used when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Largest chunk the bulk-removal endpoint accepts.
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of chunks in flight at once.
    pub concurrency: usize,
    /// Report what would be done without calling the operation.
    pub dry_run: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }
}

/// Receives one tick per finished chunk, whatever its outcome.
pub trait Progress: Send + Sync {
    fn advance(&self);
}

impl Progress for AtomicUsize {
    fn advance(&self) {
        self.fetch_add(1, Ordering::SeqCst);
    }
}

/// Discards progress ticks.
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Succeeded,
    Failed(String),
    /// Dry run: the chunk would have been processed.
    Planned,
    /// Cancellation was requested before the chunk finished.
    Cancelled,
}

impl ChunkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChunkStatus::Succeeded => "succeeded",
            ChunkStatus::Failed(_) => "failed",
            ChunkStatus::Planned => "planned",
            ChunkStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkOutcome<T> {
    /// Position of the chunk in the input order.
    pub index: usize,
    pub items: Arc<[T]>,
    pub status: ChunkStatus,
}

/// Outcome of every chunk of a run, in input order.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub dry_run: bool,
    /// Number of chunks handed to the executor.
    pub planned: usize,
    pub outcomes: Vec<ChunkOutcome<T>>,
}

impl<T> BatchReport<T> {
    fn count(&self, pred: impl Fn(&ChunkStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| *s == ChunkStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ChunkStatus::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| *s == ChunkStatus::Cancelled)
    }

    /// Chunks with a recorded outcome. Equals `planned` unless a worker task died.
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    /// Items across all succeeded chunks.
    pub fn items_succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == ChunkStatus::Succeeded)
            .map(|o| o.items.len())
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChunkOutcome<T>> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ChunkStatus::Failed(_)))
    }

    /// Every planned chunk has an outcome and none failed or was cancelled.
    pub fn is_success(&self) -> bool {
        self.processed() == self.planned && self.failed() == 0 && self.cancelled() == 0
    }
}

/// Apply `operation` to every chunk with at most `config.concurrency` in flight.
///
/// Completes once every chunk has an outcome. `progress` advances exactly
/// once per chunk, in dry-run mode too. Cancelling `cancel` stops new chunks
/// from starting and abandons in-flight ones; both are reported as cancelled.
pub async fn run<T, F, Fut, E>(
    chunks: Vec<Vec<T>>,
    operation: F,
    config: &ExecutorConfig,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
) -> BatchReport<T>
where
    T: fmt::Debug + Send + Sync + 'static,
    F: Fn(Arc<[T]>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let planned = chunks.len();
    let queue: VecDeque<(usize, Arc<[T]>)> = chunks
        .into_iter()
        .enumerate()
        .map(|(index, items)| (index, Arc::from(items)))
        .collect();

    if config.dry_run {
        info!(chunks = planned, "dry run, no changes will be made");
        let outcomes = queue
            .into_iter()
            .map(|(index, items)| {
                debug!(chunk = index, size = items.len(), "would process chunk");
                progress.advance();
                ChunkOutcome {
                    index,
                    items,
                    status: ChunkStatus::Planned,
                }
            })
            .collect();
        return BatchReport {
            dry_run: true,
            planned,
            outcomes,
        };
    }

    let workers = config.concurrency.clamp(1, planned.max(1));
    info!(chunks = planned, workers, "starting batch run");

    let queue = Arc::new(Mutex::new(queue));
    let operation = Arc::new(operation);
    let mut set = JoinSet::new();

    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let operation = Arc::clone(&operation);
        let progress = Arc::clone(&progress);
        let cancel = cancel.clone();

        set.spawn(async move {
            let mut outcomes = Vec::new();
            loop {
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some((index, items)) = next else {
                    break;
                };

                let status = if cancel.is_cancelled() {
                    ChunkStatus::Cancelled
                } else {
                    // Own task per chunk: a panicking operation loses only this chunk
                    let mut task = tokio::spawn((*operation)(Arc::clone(&items)));
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            task.abort();
                            ChunkStatus::Cancelled
                        }
                        joined = &mut task => match joined {
                            Ok(Ok(())) => {
                                debug!(worker, chunk = index, size = items.len(), "chunk done");
                                ChunkStatus::Succeeded
                            }
                            Ok(Err(e)) => {
                                error!(
                                    worker,
                                    chunk = index,
                                    size = items.len(),
                                    first = ?items.first(),
                                    error = %e,
                                    "chunk failed"
                                );
                                ChunkStatus::Failed(e.to_string())
                            }
                            Err(e) => {
                                error!(
                                    worker,
                                    chunk = index,
                                    first = ?items.first(),
                                    error = %e,
                                    "chunk operation panicked"
                                );
                                ChunkStatus::Failed(format!("operation panicked: {e}"))
                            }
                        },
                    }
                };

                progress.advance();
                outcomes.push(ChunkOutcome {
                    index,
                    items,
                    status,
                });
            }
            debug!(worker, processed = outcomes.len(), "worker finished");
            outcomes
        });
    }

    let mut outcomes = Vec::with_capacity(planned);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(mut done) => outcomes.append(&mut done),
            Err(e) => error!(error = %e, "batch worker died"),
        }
    }
    outcomes.sort_by_key(|o| o.index);

    let report = BatchReport {
        dry_run: false,
        planned,
        outcomes,
    };
    if report.cancelled() > 0 {
        warn!(cancelled = report.cancelled(), "batch run cancelled");
    }
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        total = planned,
        "batch run finished"
    );
    report
}

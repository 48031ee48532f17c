//! Bulk purge engine
//!
//! Splits an id list into API-sized batches and drives a mutating operation
//! over them with a fixed-size worker pool. Failures stay local to their
//! batch; the caller gets a report of every batch's outcome.
//!
//! Batch lifecycle:
//! 1. `partition()` cuts the ids into chunks of at most `batch_size`
//! 2. `run()` queues the chunks and starts `concurrency` workers
//! 3. Each worker claims the next chunk, applies the operation, advances progress
//! 4. A failed chunk is logged and recorded; the worker moves on
//! 5. `run()` returns once every worker has drained the queue
//!
//! In dry-run mode step 3 never calls the operation.

pub mod error;
pub mod executor;
pub mod partition;

pub use error::{Error, Result};
pub use executor::{
    BatchReport, ChunkOutcome, ChunkStatus, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY,
    ExecutorConfig, NoProgress, Progress, run,
};
pub use partition::partition;

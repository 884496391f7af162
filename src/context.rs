//! Execution context shared by every stage of a job.
//!
//! Instead of reaching for process-wide framework state, each stage receives
//! an [`ExecutionContext`] that owns the worker pool, the object store and the
//! run timestamp.

use crate::error::{GearboxError, Result};
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Explicitly constructed resources for one job run.
pub struct ExecutionContext {
    pool: rayon::ThreadPool,
    store: Arc<dyn ObjectStore>,
    started_utc: DateTime<Utc>,
}

impl ExecutionContext {
    /// Build a context with `threads` workers (`0` picks rayon's default).
    pub fn new(store: Arc<dyn ObjectStore>, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("gearbox-worker-{i}"))
            .build()
            .map_err(|e| GearboxError::Config(format!("cannot start worker pool: {e}")))?;

        Ok(Self {
            pool,
            store,
            started_utc: Utc::now(),
        })
    }

    /// Run `op` inside the worker pool so rayon iterators use its threads.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn started_utc(&self) -> DateTime<Utc> {
        self.started_utc
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("threads", &self.threads())
            .field("started_utc", &self.started_utc)
            .finish_non_exhaustive()
    }
}

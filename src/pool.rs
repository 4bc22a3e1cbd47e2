//! Bounded worker pool and the driver that feeds it from an item source.
//!
//! Admission is a counting semaphore with one permit per concurrent
//! pipeline. [`pump`] reserves a permit *before* pulling the next item, so a
//! full pool stops the source from being asked for more work (and, for a
//! paginated source, from requesting more pages). The permit travels with
//! the spawned pipeline and is released when it finishes, successfully or
//! not, which admits exactly one more item: a sliding window rather than
//! fixed batches.
//!
//! Completion is the join set draining after the source reported the end of
//! its input; nothing can still be writing once [`WorkerPool::finish`]
//! returns.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::SyncError;

/// Pull side of the pipeline: yields one item at a time, then `None`.
#[async_trait]
pub trait ItemSource: Send {
    type Item: Send + 'static;

    /// An error here is fatal to the whole run.
    async fn next_item(&mut self) -> Result<Option<Self::Item>, SyncError>;
}

/// Per-item work executed inside the pool.
#[async_trait]
pub trait ItemJob: Send + Sync + 'static {
    type Item: Send + 'static;

    /// An error here only drops this item.
    async fn run(&self, item: Self::Item) -> Result<(), SyncError>;
}

/// Counts reported once the pool has drained.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub admitted: usize,
    pub completed: usize,
    pub failed: usize,
}

/// An admission slot; dropping it frees the slot again.
pub struct Slot {
    // held for release-on-drop only
    _permit: OwnedSemaphorePermit,
}

pub struct WorkerPool<J: ItemJob> {
    job: Arc<J>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    workers: JoinSet<bool>,
    admitted: usize,
}

impl<J: ItemJob> WorkerPool<J> {
    /// A pool running at most `concurrency` pipelines (at least one).
    pub fn new(job: Arc<J>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            job,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            workers: JoinSet::new(),
            admitted: 0,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Slots currently taken: running pipelines plus any slot reserved but
    /// not yet started (e.g. the one [`pump`] holds while it waits for the
    /// next item).
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// Waits until fewer than `concurrency` pipelines are running.
    pub async fn reserve(&self) -> Result<Slot, SyncError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map(|permit| Slot { _permit: permit })
            .map_err(|_| SyncError::PoolClosed)
    }

    /// Starts the pipeline for `item` in the reserved slot.
    pub fn start(&mut self, slot: Slot, item: J::Item) {
        let job = Arc::clone(&self.job);
        self.admitted += 1;
        self.workers.spawn(async move {
            let _slot = slot;
            match job.run(item).await {
                Ok(()) => true,
                Err(err) => {
                    error!(error = %err, "worker errored");
                    false
                }
            }
        });
    }

    /// Waits for every started pipeline to finish.
    pub async fn finish(mut self) -> PoolSummary {
        let mut summary = PoolSummary {
            admitted: self.admitted,
            ..PoolSummary::default()
        };
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(true) => summary.completed += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    error!(error = %e, "worker task panicked");
                    summary.failed += 1;
                }
            }
        }
        debug!(?summary, "worker pool drained");
        summary
    }

    /// Stops tracking running pipelines without cancelling them.
    fn abandon(mut self) {
        let running = self.workers.len();
        if running > 0 {
            warn!(running, "abandoning in-flight workers");
        }
        self.workers.detach_all();
    }
}

/// Feeds every item of `source` through `pool` and waits for completion.
///
/// A source error abandons the pool and is returned; pipelines already
/// running keep going but are no longer awaited.
pub async fn pump<S, J>(source: &mut S, mut pool: WorkerPool<J>) -> Result<PoolSummary, SyncError>
where
    S: ItemSource<Item = J::Item>,
    J: ItemJob,
{
    loop {
        let slot = pool.reserve().await?;
        match source.next_item().await {
            Ok(Some(item)) => pool.start(slot, item),
            Ok(None) => break,
            Err(err) => {
                pool.abandon();
                return Err(err);
            }
        }
    }
    Ok(pool.finish().await)
}

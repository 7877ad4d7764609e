//! # Concurrency Controller
//!
//! Per-operation slot pool. Each running operation owns one controller sized to
//! its `max_parallel_operations`; two operations never share slots. Slots are
//! released when the [`ConcurrencySlot`] guard drops, whether the sub-task
//! succeeded, failed or panicked.

use crate::error::{BatchError, BatchResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct SlotCounters {
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Bounds the number of simultaneously executing sub-tasks of one operation
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    semaphore: Arc<Semaphore>,
    limit: usize,
    counters: Arc<SlotCounters>,
}

impl ConcurrencyController {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            counters: Arc::new(SlotCounters::default()),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> BatchResult<ConcurrencySlot> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| BatchError::Orchestration("concurrency controller closed".to_string()))?;

        let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(running, Ordering::SeqCst);

        Ok(ConcurrencySlot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently held
    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Highest number of slots held at once since creation
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A held slot; dropping it frees the slot
#[derive(Debug)]
pub struct ConcurrencySlot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<SlotCounters>,
}

impl Drop for ConcurrencySlot {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

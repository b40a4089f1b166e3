// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! An in-memory [`Gutter`] used by tests, benches and the demo binary in
//! place of a real buffer-tree-backed streaming layer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use sketch_core::batch::BatchGroup;
use sketch_core::gutter::Gutter;

struct WorkerQueue {
    pending: Mutex<VecDeque<BatchGroup>>,
    ready: Condvar,
}

/// A `Vec`-of-queues gutter: one FIFO of flushed [`BatchGroup`]s per worker,
/// guarded the way the cluster's own pause barrier is — a mutex paired with
/// a condvar, rather than a channel, so `force_flush` can wake every
/// blocked `get_data` call at once without anyone having to poll.
pub struct InMemoryGutter {
    workers: Vec<WorkerQueue>,
    non_block: AtomicBool,
}

impl InMemoryGutter {
    /// Construct an empty gutter partitioning updates across `num_workers`
    /// queues.
    pub fn new(num_workers: usize) -> Self {
        let workers = (0..num_workers.max(1))
            .map(|_| WorkerQueue {
                pending: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
            })
            .collect();
        Self {
            workers,
            non_block: AtomicBool::new(false),
        }
    }

    /// Enqueue a flushed group of batches for `worker_id`, waking any
    /// thread blocked in `get_data` for that worker.
    pub fn push(&self, worker_id: usize, group: BatchGroup) {
        let worker = &self.workers[worker_id];
        let mut pending = worker.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        pending.push_back(group);
        worker.ready.notify_one();
    }
}

impl Gutter for InMemoryGutter {
    fn get_data(&self, worker_id: usize) -> BatchGroup {
        let worker = &self.workers[worker_id];
        let mut pending = worker.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.non_block.load(Ordering::Acquire) {
            return pending.pop_front().unwrap_or_default();
        }
        while pending.is_empty() {
            pending = worker
                .ready
                .wait(pending)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        pending.pop_front().unwrap_or_default()
    }

    fn set_non_block(&self, non_block: bool) {
        self.non_block.store(non_block, Ordering::Release);
    }

    fn force_flush(&self) {
        for worker in &self.workers {
            worker.ready.notify_all();
        }
    }

    fn num_workers(&self) -> usize {
        self.workers.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sketch_core::batch::Batch;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn get_data_returns_pushed_group() {
        let gutter = InMemoryGutter::new(1);
        let group = vec![Batch::new(1, vec![2]).unwrap()];
        gutter.push(0, group.clone());
        assert_eq!(gutter.get_data(0), group);
    }

    #[test]
    fn get_data_blocks_until_pushed() {
        let gutter = Arc::new(InMemoryGutter::new(1));
        let reader = Arc::clone(&gutter);
        let handle = thread::spawn(move || reader.get_data(0));

        thread::sleep(Duration::from_millis(20));
        let group = vec![Batch::new(3, vec![4]).unwrap()];
        gutter.push(0, group.clone());

        assert_eq!(handle.join().unwrap(), group);
    }

    #[test]
    fn non_block_returns_empty_when_nothing_pending() {
        let gutter = InMemoryGutter::new(1);
        gutter.set_non_block(true);
        assert!(gutter.get_data(0).is_empty());
    }
}

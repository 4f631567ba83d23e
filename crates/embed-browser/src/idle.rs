//! Idle Queue
//!
//! Work deferred until the current native callback has returned. The host
//! drains the queue from its event loop with [`IdleQueue::run_pending`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

type Job = Box<dyn FnOnce()>;

struct Entry {
    id: u64,
    name: &'static str,
    job: Job,
}

/// FIFO of deferred jobs for the UI thread
pub struct IdleQueue {
    jobs: RefCell<VecDeque<Entry>>,
    next_id: Cell<u64>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self {
            jobs: RefCell::new(VecDeque::new()),
            next_id: Cell::new(1),
        }
    }

    /// Queue `job` to run on the next drain. Returns its id.
    pub fn async_exec(&self, name: &'static str, job: impl FnOnce() + 'static) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.jobs.borrow_mut().push_back(Entry {
            id,
            name,
            job: Box::new(job),
        });
        tracing::trace!(id, name, "idle job queued");
        id
    }

    /// Run the jobs queued before this call. Jobs queued while draining wait
    /// for the next drain. Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let pending = self.jobs.borrow().len();
        let mut ran = 0;
        for _ in 0..pending {
            // Borrow released before the job runs so it may queue more work
            let Some(entry) = self.jobs.borrow_mut().pop_front() else {
                break;
            };
            let Entry { id, name, job } = entry;
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!(id, name, "idle job panicked");
            }
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }

    /// Drop every queued job without running it.
    pub fn clear(&self) {
        self.jobs.borrow_mut().clear();
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleQueue").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_runs_in_order() {
        let queue = IdleQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            queue.async_exec("push", move || log.borrow_mut().push(i));
        }
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_work_queued_during_drain_waits() {
        let queue = Rc::new(IdleQueue::new());
        let hits = Rc::new(Cell::new(0));

        let inner = queue.clone();
        let counter = hits.clone();
        queue.async_exec("outer", move || {
            counter.set(counter.get() + 1);
            let counter = counter.clone();
            inner.async_exec("inner", move || counter.set(counter.get() + 1));
        });

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_panicking_job_does_not_stop_drain() {
        let queue = IdleQueue::new();
        let hits = Rc::new(Cell::new(0));
        queue.async_exec("boom", || panic!("boom"));
        let counter = hits.clone();
        queue.async_exec("after", move || counter.set(1));
        assert_eq!(queue.run_pending(), 2);
        assert_eq!(hits.get(), 1);
    }
}

//! The engine's event queue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::task::Waker;

type Job = Box<dyn FnOnce()>;

/// FIFO queue of pending engine events.
///
/// Every request result, transaction event and deferred open is posted
/// here and dispatched by [`run_pending`](Self::run_pending). Nothing runs
/// on its own: awaiting bridge futures pump the loop when polled, and
/// native callers pump it directly.
#[derive(Clone, Default)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

#[derive(Default)]
struct LoopInner {
    queue: RefCell<VecDeque<Job>>,
    parked: RefCell<Vec<Waker>>,
}

impl EventLoop {
    /// Creates an empty event loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a job and wakes any parked waiter.
    pub(crate) fn post(&self, job: impl FnOnce() + 'static) {
        self.inner.queue.borrow_mut().push_back(Box::new(job));
        let parked = std::mem::take(&mut *self.inner.parked.borrow_mut());
        for waker in parked {
            waker.wake();
        }
    }

    /// Runs queued jobs, including ones they queue, until the queue is
    /// empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.inner.queue.borrow_mut().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Whether no job is queued.
    pub fn is_idle(&self) -> bool {
        self.inner.queue.borrow().is_empty()
    }

    /// Registers a waker to be woken by the next [`post`](Self::post).
    pub(crate) fn park(&self, waker: &Waker) {
        let mut parked = self.inner.parked.borrow_mut();
        if !parked.iter().any(|w| w.will_wake(waker)) {
            parked.push(waker.clone());
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("queued", &self.inner.queue.borrow().len())
            .field("parked", &self.inner.parked.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn runs_jobs_in_fifo_order() {
        let events = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let log = Rc::clone(&log);
            events.post(move || log.borrow_mut().push(n));
        }
        assert_eq!(events.run_pending(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(events.is_idle());
    }

    #[test]
    fn jobs_posted_by_jobs_run_in_same_pass() {
        let events = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (outer_events, outer_log) = (events.clone(), Rc::clone(&log));
        events.post(move || {
            outer_log.borrow_mut().push("outer");
            let inner_log = Rc::clone(&outer_log);
            outer_events.post(move || inner_log.borrow_mut().push("inner"));
        });
        assert_eq!(events.run_pending(), 2);
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }
}

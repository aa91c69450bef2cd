//! Single-settlement futures.

use crate::error::{CoreError, CoreResult};
use crate::native::EventLoop;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a linked settle-once pair.
///
/// The [`Deferred`] half is handed to event handlers; the [`Settlement`]
/// half is awaited. Polling the settlement pumps `events`, so whatever
/// event settles it gets dispatched by the awaiting task itself.
pub fn deferred<T>(events: &EventLoop) -> (Deferred<T>, Settlement<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Deferred {
            sender: Rc::new(RefCell::new(Some(sender))),
        },
        Settlement {
            receiver,
            events: events.clone(),
        },
    )
}

/// The settling half. Clones share one outcome: the first call to
/// [`resolve`](Self::resolve) or [`reject`](Self::reject) wins and every
/// later call is ignored.
pub struct Deferred<T> {
    sender: Rc<RefCell<Option<oneshot::Sender<CoreResult<T>>>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Rc::clone(&self.sender),
        }
    }
}

impl<T> Deferred<T> {
    /// Settles with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles with an error. Returns `false` if already settled.
    pub fn reject(&self, error: CoreError) -> bool {
        self.settle(Err(error))
    }

    /// Whether an outcome was delivered.
    pub fn is_settled(&self) -> bool {
        self.sender.borrow().is_none()
    }

    fn settle(&self, outcome: CoreResult<T>) -> bool {
        let sender = self.sender.borrow_mut().take();
        match sender {
            // A dropped settlement means nobody is waiting; still settled.
            Some(sender) => {
                let _ = sender.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// The awaited half. Resolves to the outcome, or to
/// [`CoreError::Abandoned`] if every [`Deferred`] clone was dropped
/// unsettled.
#[must_use = "settlements do nothing unless awaited"]
pub struct Settlement<T> {
    receiver: oneshot::Receiver<CoreResult<T>>,
    events: EventLoop,
}

impl<T> Settlement<T> {
    /// A settlement that is already rejected.
    pub fn rejected(events: &EventLoop, error: CoreError) -> Self {
        let (deferred, settlement) = deferred(events);
        deferred.reject(error);
        settlement
    }
}

impl<T> Future for Settlement<T> {
    type Output = CoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.events.run_pending();
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(CoreError::Abandoned)),
            Poll::Pending => {
                self.events.park(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for Settlement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settlement").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_once() {
        let events = EventLoop::new();
        let (deferred, settlement) = deferred::<u32>(&events);
        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert!(!deferred.reject(CoreError::Abandoned));
        assert_eq!(settlement.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reject_after_resolve_is_ignored() {
        let events = EventLoop::new();
        let (deferred, settlement) = deferred::<u32>(&events);
        let other = deferred.clone();
        assert!(other.reject(CoreError::aborted("first")));
        assert!(!deferred.resolve(3));
        assert!(matches!(settlement.await, Err(CoreError::Aborted { .. })));
    }

    #[tokio::test]
    async fn dropped_deferred_is_abandoned() {
        let events = EventLoop::new();
        let (deferred, settlement) = deferred::<u32>(&events);
        drop(deferred);
        assert!(matches!(settlement.await, Err(CoreError::Abandoned)));
    }

    #[tokio::test]
    async fn settled_by_queued_event() {
        let events = EventLoop::new();
        let (deferred, settlement) = deferred::<&str>(&events);
        events.post(move || {
            deferred.resolve("from the loop");
        });
        assert_eq!(settlement.await.unwrap(), "from the loop");
    }
}

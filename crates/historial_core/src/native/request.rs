//! Native requests.

use crate::error::CoreError;
use crate::native::listener::Slot;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Whether a request has produced its result yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Still queued.
    Pending,
    /// Succeeded or failed.
    Done,
}

/// An operation whose outcome is delivered by a success or error event.
///
/// Cursor requests fire success once per cursor step; all other requests
/// fire exactly one event.
pub struct Request<T> {
    inner: Rc<RequestInner<T>>,
}

struct RequestInner<T> {
    state: Cell<ReadyState>,
    result: RefCell<Option<T>>,
    error: RefCell<Option<CoreError>>,
    on_success: Slot<Request<T>>,
    on_error: Slot<CoreError>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Request<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RequestInner {
                state: Cell::new(ReadyState::Pending),
                result: RefCell::new(None),
                error: RefCell::new(None),
                on_success: Slot::default(),
                on_error: Slot::default(),
            }),
        }
    }

    /// Current ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.inner.state.get()
    }

    /// Moves the result out, leaving `None` behind.
    pub fn take_result(&self) -> Option<T> {
        self.inner.result.borrow_mut().take()
    }

    /// The error, once the request failed.
    pub fn error(&self) -> Option<CoreError> {
        self.inner.error.borrow().clone()
    }

    /// Sets the success handler. It receives the request itself.
    pub fn set_on_success(&self, handler: impl FnMut(&Request<T>) + 'static) {
        self.inner.on_success.set(handler);
    }

    /// Sets the error handler.
    pub fn set_on_error(&self, handler: impl FnMut(&CoreError) + 'static) {
        self.inner.on_error.set(handler);
    }

    pub(crate) fn succeed(&self, value: T) {
        *self.inner.result.borrow_mut() = Some(value);
        self.inner.state.set(ReadyState::Done);
        self.inner.on_success.fire(self);
    }

    pub(crate) fn fail(&self, error: CoreError) {
        *self.inner.result.borrow_mut() = None;
        *self.inner.error.borrow_mut() = Some(error.clone());
        self.inner.state.set(ReadyState::Done);
        self.inner.on_error.fire(&error);
    }

    /// Re-enters the pending state before a cursor step.
    pub(crate) fn rearm(&self) {
        self.inner.state.set(ReadyState::Pending);
    }

    pub(crate) fn downgrade(&self) -> WeakRequest<T> {
        WeakRequest(Rc::downgrade(&self.inner))
    }
}

impl<T: Clone> Request<T> {
    /// A copy of the result, once the request succeeded.
    pub fn result(&self) -> Option<T> {
        self.inner.result.borrow().clone()
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("ready_state", &self.inner.state.get())
            .field("error", &self.inner.error.borrow())
            .finish_non_exhaustive()
    }
}

/// Non-owning request reference, held by cursors so a cursor stored in its
/// own request's result does not keep the request alive.
pub(crate) struct WeakRequest<T>(Weak<RequestInner<T>>);

impl<T> WeakRequest<T> {
    pub(crate) fn upgrade(&self) -> Option<Request<T>> {
        self.0.upgrade().map(|inner| Request { inner })
    }
}

impl<T> Clone for WeakRequest<T> {
    fn clone(&self) -> Self {
        WeakRequest(Weak::clone(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_stores_result_and_fires() {
        let request: Request<u32> = Request::new();
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        request.set_on_success(move |req| sink.set(req.result().unwrap_or_default()));
        assert_eq!(request.ready_state(), ReadyState::Pending);
        request.succeed(7);
        assert_eq!(request.ready_state(), ReadyState::Done);
        assert_eq!(seen.get(), 7);
        assert_eq!(request.take_result(), Some(7));
        assert_eq!(request.result(), None);
    }

    #[test]
    fn failure_stores_error_and_fires() {
        let request: Request<u32> = Request::new();
        let fired = Rc::new(Cell::new(false));
        let sink = Rc::clone(&fired);
        request.set_on_error(move |_| sink.set(true));
        request.fail(CoreError::constraint("dup"));
        assert!(fired.get());
        assert!(matches!(request.error(), Some(CoreError::Constraint { .. })));
    }

    #[test]
    fn weak_request_does_not_keep_request_alive() {
        let request: Request<u32> = Request::new();
        let weak = request.downgrade();
        assert!(weak.upgrade().is_some());
        drop(request);
        assert!(weak.upgrade().is_none());
    }
}

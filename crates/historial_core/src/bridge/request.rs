//! Turning native requests into settlements.

use crate::bridge::deferred::{deferred, Settlement};
use crate::error::CoreResult;
use crate::native::{EventLoop, Request};

/// Attaches success and error handlers to `request` that settle the
/// returned future.
///
/// Replaces any handlers already set. The success handler moves the result
/// out of the request.
pub fn settle<T: 'static>(events: &EventLoop, request: &Request<T>) -> Settlement<T> {
    let (on_success, settlement) = deferred(events);
    let on_error = on_success.clone();
    request.set_on_success(move |req| {
        if let Some(value) = req.take_result() {
            on_success.resolve(value);
        }
    });
    request.set_on_error(move |err| {
        on_error.reject(err.clone());
    });
    settlement
}

/// Like [`settle`], for a native call that may fail before issuing its
/// request.
pub fn promisify<T: 'static>(events: &EventLoop, issued: CoreResult<Request<T>>) -> Settlement<T> {
    match issued {
        Ok(request) => settle(events, &request),
        Err(err) => Settlement::rejected(events, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[tokio::test]
    async fn settles_on_success_event() {
        let events = EventLoop::new();
        let request: Request<u32> = Request::new();
        let settlement = settle(&events, &request);
        let req = request.clone();
        events.post(move || req.succeed(5));
        assert_eq!(settlement.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn repeated_events_settle_once() {
        let events = EventLoop::new();
        let request: Request<u32> = Request::new();
        let settlement = settle(&events, &request);
        let req = request.clone();
        events.post(move || {
            req.succeed(1);
            req.fail(CoreError::aborted("late"));
            req.succeed(2);
        });
        assert_eq!(settlement.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn error_passes_through_unchanged() {
        let events = EventLoop::new();
        let request: Request<u32> = Request::new();
        let settlement = settle(&events, &request);
        let req = request.clone();
        events.post(move || req.fail(CoreError::constraint("duplicate email")));
        match settlement.await {
            Err(CoreError::Constraint { message }) => assert_eq!(message, "duplicate email"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn early_failure_is_rejected() {
        let events = EventLoop::new();
        let settlement = promisify::<u32>(&events, Err(CoreError::invalid_state("closed")));
        assert!(matches!(settlement.await, Err(CoreError::InvalidState { .. })));
    }
}

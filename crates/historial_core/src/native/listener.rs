//! Single-handler event slots.

use std::cell::RefCell;

type Handler<A> = Box<dyn FnMut(&A)>;

/// Holds at most one event handler.
///
/// Setting a handler replaces the previous one. A handler may replace
/// itself while it runs; firing never holds a borrow across the call.
pub(crate) struct Slot<A: ?Sized> {
    handler: RefCell<Option<Handler<A>>>,
}

impl<A: ?Sized> Default for Slot<A> {
    fn default() -> Self {
        Self {
            handler: RefCell::new(None),
        }
    }
}

impl<A: ?Sized> Slot<A> {
    pub(crate) fn set(&self, handler: impl FnMut(&A) + 'static) {
        *self.handler.borrow_mut() = Some(Box::new(handler));
    }

    /// Calls the handler, if any. Returns whether one ran.
    pub(crate) fn fire(&self, arg: &A) -> bool {
        let taken = self.handler.borrow_mut().take();
        let Some(mut handler) = taken else {
            return false;
        };
        handler(arg);
        let mut slot = self.handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn fire_without_handler_is_noop() {
        let slot: Slot<u32> = Slot::default();
        assert!(!slot.fire(&1));
    }

    #[test]
    fn handler_survives_firing() {
        let seen = Rc::new(Cell::new(0));
        let slot: Slot<u32> = Slot::default();
        let counter = Rc::clone(&seen);
        slot.set(move |n| counter.set(counter.get() + n));
        slot.fire(&2);
        slot.fire(&3);
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn handler_can_replace_itself() {
        let slot: Rc<Slot<()>> = Rc::new(Slot::default());
        let seen = Rc::new(Cell::new(0));
        let inner_slot = Rc::clone(&slot);
        let inner_seen = Rc::clone(&seen);
        slot.set(move |_| {
            let again = Rc::clone(&inner_seen);
            inner_slot.set(move |_| again.set(100));
        });
        slot.fire(&());
        slot.fire(&());
        assert_eq!(seen.get(), 100);
    }
}

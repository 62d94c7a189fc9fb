use crate::ProjectionError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = Box<dyn FnMut(&T)>;

struct Listener<T> {
    id: u64,
    callback: Option<Callback<T>>,
}

struct Listeners<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Listener<T>>>,
}

/// Publish/subscribe channel delivering values to registered listeners.
///
/// Listeners run in registration order and may add or remove listeners,
/// themselves included, while a value is being delivered.
pub struct Event<T> {
    listeners: Rc<Listeners<T>>,
}

impl<T: 'static> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: Rc::new(Listeners {
                next_id: Cell::new(0),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn add_listener(&self, callback: impl FnMut(&T) + 'static) -> ListenerToken {
        let id = self.listeners.next_id.get();
        self.listeners.next_id.set(id + 1);

        self.listeners.entries.borrow_mut().push(Listener {
            id,
            callback: Some(Box::new(callback)),
        });

        let listeners: Rc<dyn ListenerSet> = self.listeners.clone();

        ListenerToken {
            listeners: Rc::downgrade(&listeners),
            id,
        }
    }

    /// Unsubscribes a listener. Returns `false` if it was already removed.
    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        token.remove()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.entries.borrow().len()
    }

    pub fn raise(&self, value: &T) {
        let ids: Vec<u64> = self.listeners.entries.borrow().iter().map(|l| l.id).collect();

        for id in ids {
            let callback = self
                .listeners
                .entries
                .borrow_mut()
                .iter_mut()
                .find(|listener| listener.id == id)
                .and_then(|listener| listener.callback.take());

            if let Some(mut callback) = callback {
                callback(value);

                // put it back unless the listener was removed during the call
                let mut entries = self.listeners.entries.borrow_mut();

                if let Some(listener) = entries.iter_mut().find(|l| l.id == id) {
                    listener.callback = Some(callback);
                }
            }
        }
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.listeners.entries.borrow().len();
        write!(f, "Event {{ {} listeners }}", count)
    }
}

trait ListenerSet {
    fn remove(&self, id: u64) -> bool;
}

impl<T> ListenerSet for Listeners<T> {
    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let count = entries.len();

        entries.retain(|listener| listener.id != id);
        entries.len() != count
    }
}

/// Unsubscribe token returned by `Event::add_listener`.
///
/// Dropping the token keeps the listener registered.
pub struct ListenerToken {
    listeners: Weak<dyn ListenerSet>,
    id: u64,
}

impl ListenerToken {
    /// Removes the listener. Returns `false` if it was already removed or
    /// the event no longer exists.
    pub fn remove(self) -> bool {
        match self.listeners.upgrade() {
            Some(listeners) => listeners.remove(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for ListenerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerToken({})", self.id)
    }
}

pub type ErrorEvent = Event<ProjectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_receive_values_in_order() {
        let event = Event::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in 0..3 {
            let seen = seen.clone();
            event.add_listener(move |value: &u32| seen.borrow_mut().push((tag, *value)));
        }

        event.raise(&7);

        assert_eq!(*seen.borrow(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn removed_listeners_are_not_called() {
        let event = Event::new();
        let calls = Rc::new(Cell::new(0));

        let token = {
            let calls = calls.clone();
            event.add_listener(move |_: &()| calls.set(calls.get() + 1))
        };

        assert!(event.remove_listener(token));
        event.raise(&());

        assert_eq!(calls.get(), 0);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn listeners_can_remove_themselves_while_raised() {
        let event = Event::new();
        let token: Rc<RefCell<Option<ListenerToken>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let registered = {
            let token = token.clone();
            let calls = calls.clone();

            event.add_listener(move |_: &()| {
                calls.set(calls.get() + 1);

                if let Some(token) = token.borrow_mut().take() {
                    assert!(token.remove());
                }
            })
        };

        *token.borrow_mut() = Some(registered);

        event.raise(&());
        event.raise(&());

        assert_eq!(calls.get(), 1);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn tokens_outliving_their_event_are_inert() {
        let event = Event::new();
        let token = event.add_listener(|_: &()| {});

        drop(event);

        assert!(!token.remove());
    }
}

//! Change notifications.
//!
//! The engine publishes a [`Change`] whenever observable editor state moves;
//! views subscribe instead of polling. A [`Subscription`] unsubscribes when
//! dropped.

#[cfg(test)]
#[path = "observer_test.rs"]
mod observer_test;

use std::cell::RefCell;
use std::rc::Rc;

/// What part of the editor changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The region set (loaded, created, updated, deleted).
    Regions,
    /// The draft or edit session.
    Drawing,
    /// Selected or hovered region.
    Selection,
    /// Zoom scale.
    Scale,
    /// Background image.
    Background,
    /// Display toggles (grid, labels).
    Display,
}

pub type Listener = Rc<dyn Fn(Change)>;

/// Broadcasts [`Change`]s to listeners in subscription order.
#[derive(Default)]
pub struct Subject {
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl Subject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. It stays registered while the returned
    /// subscription is alive.
    #[must_use]
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        self.listeners.borrow_mut().push(Rc::clone(&listener));
        Subscription { listener, listeners: Rc::clone(&self.listeners) }
    }

    /// Notify every listener.
    ///
    /// Listeners may subscribe or unsubscribe from inside the callback; the
    /// change is delivered to the set registered when publishing started.
    pub fn publish(&self, change: Change) {
        let listeners = self.listeners.borrow().clone();
        for listener in listeners {
            listener(change);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl std::fmt::Debug for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject").field("listeners", &self.listener_count()).finish()
    }
}

/// Keeps a listener registered; dropping it unsubscribes.
pub struct Subscription {
    listener: Listener,
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners
            .borrow_mut()
            .retain(|item| !Rc::ptr_eq(item, &self.listener));
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

//! Local handler registry.
//!
//! The [`HandlerRegistry`] maps event types to handlers in registration
//! order. A handler may appear at most once per event type, and an event type
//! disappears from the registry as soon as its last handler is removed so
//! stale entries never accumulate. Handlers registered under
//! [`WILDCARD_EVENT`] observe every broadcast event.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

use crate::error::RegistryError;
use crate::handler::Handler;

/// Event type whose handlers observe every broadcast event.
pub const WILDCARD_EVENT: &str = "*";

/// Identifies one successful registration.
///
/// Tokens are never reused, so a stale token cannot remove a handler that was
/// registered again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

#[derive(Debug)]
struct Registration {
    id: RegistrationId,
    handler: Handler,
}

/// Handlers keyed by event type.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Registration>>,
    last_id: u64,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler for an event type.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandler`] if the same handler is
    /// already registered for `event_type`.
    pub fn register(
        &mut self,
        event_type: &str,
        handler: Handler,
    ) -> Result<RegistrationId, RegistryError> {
        let handlers = self.handlers.entry(event_type.to_owned()).or_default();
        if handlers.iter().any(|existing| existing.handler.same_as(&handler)) {
            return Err(RegistryError::DuplicateHandler {
                event_type: event_type.to_owned(),
            });
        }
        self.last_id += 1;
        let id = RegistrationId(self.last_id);
        handlers.push(Registration { id, handler });
        Ok(id)
    }

    /// Removes a handler, returning `true` when it was registered.
    pub fn remove(&mut self, event_type: &str, handler: &Handler) -> bool {
        self.remove_where(event_type, |entry| entry.handler.same_as(handler))
    }

    /// Removes the registration `id`, returning `true` when it was still
    /// present.
    pub fn remove_registration(&mut self, event_type: &str, id: RegistrationId) -> bool {
        self.remove_where(event_type, |entry| entry.id == id)
    }

    fn remove_where(
        &mut self,
        event_type: &str,
        matches: impl Fn(&Registration) -> bool,
    ) -> bool {
        let Some(handlers) = self.handlers.get_mut(event_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|entry| !matches(entry));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.handlers.remove(event_type);
        }
        removed
    }

    /// Returns `true` when at least one handler serves `event_type`.
    #[must_use]
    pub fn has_handlers(&self, event_type: &str) -> bool {
        self.handlers
            .get(event_type)
            .is_some_and(|handlers| !handlers.is_empty())
    }

    /// Returns a snapshot of the handlers for `event_type`, in registration
    /// order.
    ///
    /// Dispatch iterates over the snapshot so handlers may register or remove
    /// handlers while being invoked.
    #[must_use]
    pub fn snapshot(&self, event_type: &str) -> Vec<Handler> {
        self.handlers
            .get(event_type)
            .map(|handlers| handlers.iter().map(|entry| entry.handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of event types with at least one handler.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Capability that removes one registration.
///
/// Returned by [`EventService::on`](crate::EventService::on). Unsubscribing
/// is idempotent and remains safe after the service has been dropped. The
/// subscription does not keep the handler alive, so a handler may hold its
/// own subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<RefCell<HandlerRegistry>>,
    event_type: String,
    id: RegistrationId,
}

impl Subscription {
    pub(crate) const fn new(
        registry: Weak<RefCell<HandlerRegistry>>,
        event_type: String,
        id: RegistrationId,
    ) -> Self {
        Self {
            registry,
            event_type,
            id,
        }
    }

    /// Event type the handler was registered for.
    #[must_use]
    pub const fn event_type(&self) -> &str {
        self.event_type.as_str()
    }

    /// Removes the registration, returning `true` if this call removed it.
    #[must_use]
    pub fn unsubscribe(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .borrow_mut()
                .remove_registration(&self.event_type, self.id)
        })
    }
}

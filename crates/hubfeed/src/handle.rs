//! Subscription handles.

use std::fmt;
use std::sync::Weak;

use hubfeed_registry::{Callback, Removal};

/// The manager side of a handle: removes one (function, callback) pair.
pub(crate) trait Release: Send + Sync {
    fn release(&self, wire_name: &str, callback: &Callback) -> Removal;

    /// Stops the connection in the background if nothing is subscribed.
    fn schedule_stop(&self);
}

/// One open (function, callback) pair.
///
/// Dropping the handle unsubscribes the pair; so does
/// [`HubManager::close`](crate::HubManager::close), which also waits for
/// the connection to stop when this was the last subscription. Releasing
/// never fails: a handle that outlives its manager releases nothing.
#[must_use = "dropping the handle closes the subscription"]
pub struct ConnectionHandle {
    wire_name: String,
    callback: Callback,
    owner: Weak<dyn Release>,
    released: bool,
}

impl ConnectionHandle {
    pub(crate) fn new(wire_name: String, callback: Callback, owner: Weak<dyn Release>) -> Self {
        Self {
            wire_name,
            callback,
            owner,
            released: false,
        }
    }

    /// The wire name this handle is subscribed to.
    pub fn function_name(&self) -> &str {
        &self.wire_name
    }

    /// The callback this handle registered.
    pub fn callback(&self) -> &Callback {
        &self.callback
    }

    /// Turns the handle inert without touching the registry.
    pub(crate) fn disarm(&mut self) {
        self.released = true;
    }

    /// Removes the pair now. Returns `None` if already released or the
    /// manager is gone.
    pub(crate) fn release(&mut self) -> Option<Removal> {
        if std::mem::replace(&mut self.released, true) {
            return None;
        }
        let owner = self.owner.upgrade()?;
        Some(owner.release(&self.wire_name, &self.callback))
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let Some(removal) = self.release() else {
            return;
        };
        if removal.emptied_registry() {
            if let Some(owner) = self.owner.upgrade() {
                owner.schedule_stop();
            }
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("function_name", &self.wire_name)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

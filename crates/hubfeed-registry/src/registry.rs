//! The subscription registry: every live listener, keyed by wire name.
//!
//! Keys ignore case, matching how hubs route push events. The first
//! registration's spelling is the one invoked on the wire.
//!
//! # Concurrency note
//!
//! Unlike a manager owned by a single task, this registry is hit from
//! everywhere at once: callers opening and closing handles on arbitrary
//! tasks, and the hub's receive task snapshotting callbacks for each push.
//! One `parking_lot::Mutex` serializes all of it. Critical sections are
//! short map operations with no I/O, so a blocking lock is the right tool
//! even inside async code; callbacks always run after the lock is dropped.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::{Callback, FunctionNameMap, Subscription};

/// Result of [`SubscriptionRegistry::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The resolved wire name the callback is registered under.
    pub wire_name: String,
    /// `true` if this call created the subscription.
    pub created: bool,
    /// `false` if the callback was already registered under this name.
    pub added: bool,
}

/// Result of [`SubscriptionRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The (name, callback) pair was not registered. Nothing changed.
    NotFound,
    /// The callback was removed; other listeners keep the subscription.
    CallbackRemoved,
    /// The last callback was removed, taking the subscription with it.
    SubscriptionRemoved {
        /// `true` if no subscriptions remain at all.
        registry_empty: bool,
    },
}

impl Removal {
    /// `true` if this removal left the whole registry empty.
    pub fn emptied_registry(self) -> bool {
        matches!(self, Removal::SubscriptionRemoved { registry_empty: true })
    }
}

/// Thread-safe map from wire name (case-insensitive) to [`Subscription`].
///
/// ## Lifecycle
///
/// ```text
/// add(f, cb1) ──→ [f: cb1] ──add(f, cb2)──→ [f: cb1, cb2]
///                                               │
///                            remove(f, cb1) ────┘
///                                  │
///                                  ▼
///                              [f: cb2] ──remove(f, cb2)──→ {} (empty)
/// ```
#[derive(Debug)]
pub struct SubscriptionRegistry {
    names: FunctionNameMap,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry that resolves names through `names`.
    pub fn new(names: FunctionNameMap) -> Self {
        Self {
            names,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// The name map this registry resolves through.
    pub fn names(&self) -> &FunctionNameMap {
        &self.names
    }

    /// Resolves a logical name to its wire name.
    pub fn resolve(&self, function_name: &str) -> String {
        self.names.resolve(function_name).to_string()
    }

    /// Registers `callback` under the wire name `function_name` resolves to.
    ///
    /// Creates the subscription (with `params`) if absent. Registering the
    /// same callback twice under one name is a no-op, not an error; the
    /// existing subscription keeps its original params and spelling, which
    /// [`Registration::wire_name`] reports.
    pub fn add(
        &self,
        function_name: &str,
        callback: Callback,
        params: Vec<Value>,
    ) -> Registration {
        let wire_name = self.resolve(function_name);
        let key = registry_key(&wire_name);
        let mut subscriptions = self.subscriptions.lock();

        let registration = match subscriptions.get_mut(&key) {
            Some(existing) => Registration {
                added: existing.add_callback(callback),
                created: false,
                wire_name: existing.function_name().to_string(),
            },
            None => {
                subscriptions.insert(
                    key,
                    Subscription::new(wire_name.clone(), params, callback),
                );
                Registration {
                    wire_name,
                    created: true,
                    added: true,
                }
            }
        };
        drop(subscriptions);

        tracing::debug!(
            function = %registration.wire_name,
            created = registration.created,
            added = registration.added,
            "callback registered"
        );
        registration
    }

    /// Removes one (name, callback) pair, resolving `function_name` first.
    pub fn remove(&self, function_name: &str, callback: &Callback) -> Removal {
        let wire_name = self.resolve(function_name);
        self.remove_wire(&wire_name, callback)
    }

    /// Removes one (wire name, callback) pair.
    ///
    /// Deletes the subscription when its last callback goes. Unknown pairs
    /// are ignored.
    pub fn remove_wire(&self, wire_name: &str, callback: &Callback) -> Removal {
        let key = registry_key(wire_name);
        let mut subscriptions = self.subscriptions.lock();

        let Some(subscription) = subscriptions.get_mut(&key) else {
            return Removal::NotFound;
        };
        if !subscription.remove_callback(callback) {
            return Removal::NotFound;
        }
        if !subscription.is_empty() {
            return Removal::CallbackRemoved;
        }

        subscriptions.remove(&key);
        let registry_empty = subscriptions.is_empty();
        drop(subscriptions);

        tracing::debug!(function = %wire_name, registry_empty, "subscription removed");
        Removal::SubscriptionRemoved { registry_empty }
    }

    /// A snapshot of the callbacks registered under `wire_name`.
    ///
    /// Cloning the `Arc`s is cheap and lets the caller invoke them after
    /// the lock is released.
    pub fn callbacks(&self, wire_name: &str) -> Option<Vec<Callback>> {
        self.subscriptions
            .lock()
            .get(&registry_key(wire_name))
            .map(|s| s.callbacks().to_vec())
    }

    /// A snapshot of every subscription, for replay after a reconnect.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.subscriptions.lock().values().cloned().collect()
    }

    /// Wire names with at least one listener, as first registered.
    pub fn function_names(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .values()
            .map(|s| s.function_name().to_string())
            .collect()
    }

    /// Returns `true` if a subscription exists for `wire_name`.
    pub fn contains(&self, wire_name: &str) -> bool {
        self.subscriptions
            .lock()
            .contains_key(&registry_key(wire_name))
    }

    /// Returns `true` if `callback` is registered under `wire_name`.
    pub fn is_registered(&self, wire_name: &str, callback: &Callback) -> bool {
        self.subscriptions
            .lock()
            .get(&registry_key(wire_name))
            .is_some_and(|s| s.contains(callback))
    }

    /// Number of callbacks registered under `wire_name` (0 if none).
    pub fn callback_count(&self, wire_name: &str) -> usize {
        self.subscriptions
            .lock()
            .get(&registry_key(wire_name))
            .map_or(0, |s| s.callbacks().len())
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        let removed = {
            let mut subscriptions = self.subscriptions.lock();
            let n = subscriptions.len();
            subscriptions.clear();
            n
        };
        if removed > 0 {
            tracing::debug!(removed, "registry cleared");
        }
    }

    /// Number of subscriptions (not callbacks).
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Returns `true` if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.lock().is_empty()
    }
}

fn registry_key(wire_name: &str) -> String {
    wire_name.to_lowercase()
}

// =========================================================================
// Tests
// =========================================================================

//! Subscription types: one wire name, its replay arguments, its listeners.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A listener for decoded push payloads.
///
/// Callbacks are compared by identity (`Arc::ptr_eq`), so registering a
/// clone of the same `Arc` twice is a duplicate, while two separately
/// allocated closures with identical code are not.
pub type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// Wraps a closure into a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&str) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Interest in one push event, shared by every listener on that wire name.
///
/// Exists only while it has at least one callback: the registry creates
/// it with the first and deletes it with the last.
#[derive(Clone)]
pub struct Subscription {
    function_name: String,
    params: Vec<Value>,
    callbacks: Vec<Callback>,
}

impl Subscription {
    pub(crate) fn new(
        function_name: String,
        params: Vec<Value>,
        first: Callback,
    ) -> Self {
        Self {
            function_name,
            params,
            callbacks: vec![first],
        }
    }

    /// The wire name this subscription listens to.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Arguments replayed with the subscribe invocation after a reconnect.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The current listeners.
    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    /// Adds `callback` unless it is already present. Returns `true` if
    /// it was added.
    pub(crate) fn add_callback(&mut self, callback: Callback) -> bool {
        if self.contains(&callback) {
            return false;
        }
        self.callbacks.push(callback);
        true
    }

    /// Removes `callback`. Returns `true` if it was present.
    pub(crate) fn remove_callback(&mut self, callback: &Callback) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        self.callbacks.len() != before
    }

    pub(crate) fn contains(&self, callback: &Callback) -> bool {
        self.callbacks.iter().any(|c| Arc::ptr_eq(c, callback))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("function_name", &self.function_name)
            .field("params", &self.params)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

//! Logical → wire name mapping.

use std::collections::{BTreeSet, HashMap};

/// Maps caller-facing function names to the names the hub understands.
///
/// Lookups ignore case. Names without an entry pass through unchanged, so
/// callers may also use wire names directly.
///
/// The map is handed to the registry by value when the manager is built,
/// which fixes it before the first connection exists.
///
/// ```rust
/// use hubfeed_registry::FunctionNameMap;
///
/// let names = FunctionNameMap::new().with("ticker_BTCUSD", "SubscribeTicker");
/// assert_eq!(names.resolve("TICKER_btcusd"), "SubscribeTicker");
/// assert_eq!(names.resolve("QueryExchangeState"), "QueryExchangeState");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FunctionNameMap {
    /// Keys are lowercased logical names.
    names: HashMap<String, String>,
}

impl FunctionNameMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a mapping, returning the previous wire name.
    pub fn insert(
        &mut self,
        logical: &str,
        wire: impl Into<String>,
    ) -> Option<String> {
        self.names.insert(logical.to_lowercase(), wire.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, logical: &str, wire: impl Into<String>) -> Self {
        self.insert(logical, wire);
        self
    }

    /// Resolves a logical name to its wire name.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.names
            .get(&name.to_lowercase())
            .map(String::as_str)
            .unwrap_or(name)
    }

    /// Every distinct wire name in the map, sorted.
    pub fn wire_names(&self) -> BTreeSet<String> {
        self.names.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<L: AsRef<str>, W: Into<String>> FromIterator<(L, W)> for FunctionNameMap {
    fn from_iter<I: IntoIterator<Item = (L, W)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (logical, wire) in iter {
            map.insert(logical.as_ref(), wire);
        }
        map
    }
}

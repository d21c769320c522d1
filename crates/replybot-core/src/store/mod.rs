//! Durable per-scope command sets.
//!
//! The registry never caches command sets across operations: every operation
//! loads the current set, optionally mutates it and saves the whole set back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{registry::normalize_trigger, scope::Scope, Result};

mod fs;
mod memory;

pub use fs::FsCommandStore;
pub use memory::MemoryCommandStore;

/// Trigger → response mapping for one scope.
///
/// Keys are normalized triggers and never empty. Iteration is in ascending
/// trigger order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandSet(BTreeMap<String, String>);

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, trigger: &str) -> Option<&str> {
        self.0.get(trigger).map(String::as_str)
    }

    pub fn contains(&self, trigger: &str) -> bool {
        self.0.contains_key(trigger)
    }

    /// Insert a new entry. Returns `false` (and leaves the set untouched) if
    /// the trigger already exists.
    pub fn insert(&mut self, trigger: impl Into<String>, response: impl Into<String>) -> bool {
        use std::collections::btree_map::Entry;

        match self.0.entry(trigger.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(response.into());
                true
            }
        }
    }

    pub fn remove(&mut self, trigger: &str) -> Option<String> {
        self.0.remove(trigger)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Re-normalize keys read from disk (hand-edited or older files).
    ///
    /// Keys that normalize to empty are dropped. On a collision an
    /// already-normalized key wins, otherwise the first in trigger order.
    fn normalized(self) -> Self {
        let (canonical, other): (Vec<_>, Vec<_>) = self
            .0
            .into_iter()
            .partition(|(k, _)| *k == normalize_trigger(k));

        let mut out = BTreeMap::new();
        for (raw, response) in canonical.into_iter().chain(other) {
            let key = normalize_trigger(&raw);
            if key.is_empty() {
                continue;
            }
            out.entry(key).or_insert(response);
        }
        Self(out)
    }
}

impl<K, V> FromIterator<(K, V)> for CommandSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Storage port for command sets.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Load the persisted set for `scope`.
    ///
    /// A missing or unreadable record yields an empty set; implementations log
    /// the problem instead of failing the caller.
    async fn load(&self, scope: &Scope) -> CommandSet;

    /// Replace the persisted set for `scope`. A failed save must leave the
    /// previous record intact.
    async fn save(&self, scope: &Scope, commands: &CommandSet) -> Result<()>;
}

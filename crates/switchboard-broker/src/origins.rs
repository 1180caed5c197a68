//! Accepted-origin allowlist for embedded clients.
//!
//! Matching is exact string comparison. Entries are created and destroyed
//! only through [`OriginAllowlist::add`] and [`OriginAllowlist::remove`],
//! independent of client lifecycle.

use indexmap::IndexSet;
use parking_lot::RwLock;
use switchboard_core::{BrokerError, Result};
use tracing::debug;

/// Set of origin strings trusted to talk to the broker.
#[derive(Debug, Default)]
pub struct OriginAllowlist {
    origins: RwLock<IndexSet<String>>,
}

impl OriginAllowlist {
    /// Empty allowlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allowlist seeded with `origins`. Empty strings are skipped.
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = origins
            .into_iter()
            .map(Into::into)
            .filter(|o: &String| !o.is_empty())
            .collect();
        Self {
            origins: RwLock::new(set),
        }
    }

    /// Accept `origin`. Returns `false` if it was already accepted.
    pub fn add(&self, origin: &str) -> Result<bool> {
        if origin.is_empty() {
            return Err(BrokerError::MissingParameter("origin"));
        }
        let added = self.origins.write().insert(origin.to_string());
        debug!(origin, added, "accepted origin added");
        Ok(added)
    }

    /// Stop accepting `origin`. Returns `false` if it was not present.
    pub fn remove(&self, origin: &str) -> bool {
        let removed = self.origins.write().shift_remove(origin);
        debug!(origin, removed, "accepted origin removed");
        removed
    }

    /// Whether `origin` is accepted.
    pub fn is_accepted(&self, origin: &str) -> bool {
        self.origins.read().contains(origin)
    }

    /// Accepted origins in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.origins.read().iter().cloned().collect()
    }

    /// Number of accepted origins.
    pub fn len(&self) -> usize {
        self.origins.read().len()
    }

    /// Whether no origin is accepted.
    pub fn is_empty(&self) -> bool {
        self.origins.read().is_empty()
    }
}

//! Connection registry: which connections are eligible for broadcasts.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use super::connection::{Connection, ConnectionId};
use crate::errors::RegistryError;

/// One registered connection.
#[derive(Clone, Debug)]
pub struct RegistryEntry {
    /// Shared connection handle.
    pub connection: Arc<Connection>,
    /// Cosmetic display name.
    pub identity: String,
    /// When the entry was added.
    pub registered_at: Instant,
}

/// Lock-guarded map of live connections.
///
/// The lock is held only for the duration of each call and never across
/// an `.await`.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<ConnectionId, RegistryEntry>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Fails if its id is already present.
    pub fn register(
        &self,
        connection: Arc<Connection>,
        identity: String,
    ) -> Result<(), RegistryError> {
        let id = connection.id();
        match self.entries.write().entry(id) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(id)),
            Entry::Vacant(slot) => {
                let _ = slot.insert(RegistryEntry {
                    connection,
                    identity,
                    registered_at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    /// Remove a connection. Absent ids are a no-op.
    pub fn deregister(&self, id: ConnectionId) -> Option<RegistryEntry> {
        self.entries.write().remove(&id)
    }

    /// Point-in-time copy of every registered connection.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.entries
            .read()
            .values()
            .map(|entry| entry.connection.clone())
            .collect()
    }

    /// `(id, identity)` for every registered connection, sorted by id.
    pub fn entries(&self) -> Vec<(ConnectionId, String)> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (*id, entry.identity.clone()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }

    /// Display identity of a registered connection.
    pub fn identity(&self, id: ConnectionId) -> Option<String> {
        self.entries.read().get(&id).map(|e| e.identity.clone())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

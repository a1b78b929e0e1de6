//! Keyed persistence for tasks and events.
//!
//! A store is a flat keyed collection of JSON-encodable values. Two
//! backends exist: a process-local hash map and an on-disk redb table.
//! Which one a process uses is chosen at startup by a string tag.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

mod in_memory;
mod persistent;

pub use in_memory::MemoryStore;
pub use persistent::PersistentStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("value not found for key {0}")]
    NotFound(String),
    #[error("value could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Capability set shared by every backend. `put` overwrites, `get` fails
/// with [`StoreError::NotFound`] when the key is absent, `list` returns all
/// values in unspecified order.
pub trait Store<V>: Send + Sync {
    fn put(&self, key: &str, value: V) -> Result<(), StoreError>;
    fn get(&self, key: &str) -> Result<V, StoreError>;
    fn list(&self) -> Result<Vec<V>, StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
}

/// Build a store for the collection `name`, keyed by backend tag. Unknown
/// tags fall back to the in-memory backend. The persistent backend lives in
/// `<name>.db` in the working directory.
pub fn new_store<V>(kind: &str, name: &str) -> Result<Box<dyn Store<V>>, StoreError>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    match kind {
        "inmemory" => Ok(Box::new(MemoryStore::new())),
        "persistent" => {
            let store = PersistentStore::open(format!("{name}.db"), name)?;
            Ok(Box::new(store))
        }
        other => {
            warn!(kind = other, "unknown store type, falling back to inmemory");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_falls_back_to_memory_on_unknown_tag() {
        let store: Box<dyn Store<String>> = new_store("definitely-not-a-backend", "tasks").unwrap();
        store.put("k", "v".to_string()).unwrap();
        assert_eq!(store.get("k").unwrap(), "v");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn factory_builds_memory_store() {
        let store: Box<dyn Store<u64>> = new_store("inmemory", "tasks").unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}

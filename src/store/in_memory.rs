use std::collections::HashMap;
use std::sync::Mutex;

use super::{Store, StoreError};

/// Hash-map backend. The mutex serializes concurrent writers to the same
/// key so the last writer wins.
pub struct MemoryStore<V> {
    db: Mutex<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        MemoryStore {
            db: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn put(&self, key: &str, value: V) -> Result<(), StoreError> {
        let mut db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        db.insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<V, StoreError> {
        let db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        db.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        let db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(db.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        let db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(db.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store.put("a", 1u32).unwrap();
        assert_eq!(store.get("a").unwrap(), 1);
    }

    #[test]
    fn put_overwrites() {
        let store = MemoryStore::new();
        store.put("a", 1u32).unwrap();
        store.put("a", 2u32).unwrap();
        assert_eq!(store.get("a").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store: MemoryStore<u32> = MemoryStore::new();
        assert!(matches!(
            store.get("nope"),
            Err(StoreError::NotFound(key)) if key == "nope"
        ));
    }

    #[test]
    fn list_returns_every_value() {
        let store = MemoryStore::new();
        store.put("a", 1u32).unwrap();
        store.put("b", 2u32).unwrap();
        let mut values = store.list().unwrap();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }
}

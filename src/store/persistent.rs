use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Store, StoreError};

/// On-disk backend: one redb table per logical collection, JSON-encoded
/// values keyed by UUID string. Each `put` is a single write transaction;
/// the table is created idempotently at open.
pub struct PersistentStore<V> {
    db: Database,
    bucket: String,
    path: PathBuf,
    _value: PhantomData<fn() -> V>,
}

impl<V> PersistentStore<V> {
    pub fn open(path: impl AsRef<Path>, bucket: &str) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        let store = PersistentStore {
            db,
            bucket: bucket.to_string(),
            path,
            _value: PhantomData,
        };

        // Creating the table up front means readers never observe a
        // missing table on a fresh database.
        let txn = store.db.begin_write()?;
        txn.open_table(store.table())?;
        txn.commit()?;

        restrict_permissions(&store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.bucket)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %err, "could not set store file mode");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

impl<V> Store<V> for PersistentStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn put(&self, key: &str, value: V) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(&value)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(self.table())?;
            table.insert(key, encoded.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<V, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.table())?;
        let guard = table
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let value = serde_json::from_slice(guard.value())?;
        Ok(value)
    }

    fn list(&self) -> Result<Vec<V>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.table())?;
        let mut values = Vec::new();
        for entry in table.iter()? {
            let (_, guard) = entry?;
            values.push(serde_json::from_slice(guard.value())?);
        }
        Ok(values)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(self.table())?;
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::tempdir;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: String,
        size: u64,
    }

    fn record(id: &str, size: u64) -> Record {
        Record {
            id: id.to_string(),
            size,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path().join("tasks.db"), "tasks").unwrap();

        store.put("t1", record("t1", 42)).unwrap();
        assert_eq!(store.get("t1").unwrap(), record("t1", 42));
    }

    #[test]
    fn put_overwrites_and_count_tracks_keys() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path().join("tasks.db"), "tasks").unwrap();

        store.put("t1", record("t1", 1)).unwrap();
        store.put("t1", record("t1", 2)).unwrap();
        store.put("t2", record("t2", 3)).unwrap();

        assert_eq!(store.get("t1").unwrap().size, 2);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store: PersistentStore<Record> =
            PersistentStore::open(dir.path().join("tasks.db"), "tasks").unwrap();

        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let store = PersistentStore::open(&path, "tasks").unwrap();
            store.put("t1", record("t1", 7)).unwrap();
        }

        let reopened: PersistentStore<Record> = PersistentStore::open(&path, "tasks").unwrap();
        assert_eq!(reopened.get("t1").unwrap(), record("t1", 7));
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store: PersistentStore<Record> =
            PersistentStore::open(dir.path().join("tasks.db"), "tasks").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

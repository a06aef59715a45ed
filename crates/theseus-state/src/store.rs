//! EntityStore — redb-backed key/value persistence for Theseus.
//!
//! An untyped layer: five fixed collections of `&str` keys and `&[u8]`
//! values. Every `update` is its own write transaction, every `read` and
//! `scan` runs against a single read snapshot. Typed access lives in
//! [`crate::repository`].

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::tables::Collection;

/// How long `open` waits for another process to release the file lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between attempts while the file is locked.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe entity store backed by redb.
///
/// redb serializes writers across the whole database (one global write lock)
/// and gives each reader its own MVCC snapshot, so reads and scans never wait
/// on a concurrent `update`.
#[derive(Clone)]
pub struct EntityStore {
    db: Arc<Database>,
}

impl EntityStore {
    /// Open (or create) a persistent store at `path` with the default lock timeout.
    pub fn open(path: &Path) -> StateResult<Self> {
        Self::open_with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    /// Open (or create) a persistent store, waiting at most `lock_timeout`
    /// for another holder of the file to let go.
    pub fn open_with_lock_timeout(path: &Path, lock_timeout: Duration) -> StateResult<Self> {
        let started = Instant::now();
        let db = loop {
            match Database::create(path) {
                Ok(db) => break db,
                Err(DatabaseError::DatabaseAlreadyOpen) if started.elapsed() < lock_timeout => {
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    warn!(?path, ?lock_timeout, "store file is locked by another holder");
                    return Err(StateError::StoreUnavailable(format!(
                        "{} is locked by another process (waited {lock_timeout:?})",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(StateError::StoreUnavailable(format!(
                        "could not open {}: {e}",
                        path.display()
                    )));
                }
            }
        };
        let store = Self { db: Arc::new(db) };
        store.ensure_collections()?;
        info!(?path, "entity store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(StoreUnavailable))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_collections()?;
        debug!("in-memory entity store opened");
        Ok(store)
    }

    /// Create every collection that does not exist yet. Idempotent.
    fn ensure_collections(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(StoreUnavailable))?;
        // Opening a table in a write transaction creates it if absent.
        for collection in Collection::ALL {
            txn.open_table(collection.definition())
                .map_err(map_err!(StoreUnavailable))?;
        }
        txn.commit().map_err(map_err!(StoreUnavailable))?;
        Ok(())
    }

    /// Release this handle.
    ///
    /// The file lock is dropped once the last clone is gone; closing a handle
    /// while clones are still alive only gives up this one.
    pub fn close(self) {
        match Arc::try_unwrap(self.db) {
            Ok(db) => {
                drop(db);
                info!("entity store closed");
            }
            Err(shared) => {
                debug!(
                    remaining = Arc::strong_count(&shared) - 1,
                    "entity store handle released; other handles still open"
                );
            }
        }
    }

    /// Store `value` under `key` in one write transaction.
    ///
    /// Either the commit lands durably or the store is left as it was.
    /// An existing value for `key` is overwritten.
    pub fn update(&self, collection: Collection, key: &str, value: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(TransactionFailed))?;
        {
            let mut table = txn
                .open_table(collection.definition())
                .map_err(map_err!(TransactionFailed))?;
            table.insert(key, value).map_err(map_err!(TransactionFailed))?;
        }
        txn.commit().map_err(map_err!(TransactionFailed))?;
        debug!(%collection, %key, bytes = value.len(), "record stored");
        Ok(())
    }

    /// Point lookup. `None` when the key is absent.
    pub fn read(&self, collection: Collection, key: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(StoreUnavailable))?;
        let table = txn
            .open_table(collection.definition())
            .map_err(map_err!(StoreUnavailable))?;
        let value = table
            .get(key)
            .map_err(map_err!(StoreUnavailable))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Every `(key, value)` pair of a collection, in key order, as of one
    /// point in time.
    pub fn scan(&self, collection: Collection) -> StateResult<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read().map_err(map_err!(StoreUnavailable))?;
        let table = txn
            .open_table(collection.definition())
            .map_err(map_err!(StoreUnavailable))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(StoreUnavailable))? {
            let (key, value) = entry.map_err(map_err!(StoreUnavailable))?;
            results.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: Collection) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(StoreUnavailable))?;
        let table = txn
            .open_table(collection.definition())
            .map_err(map_err!(StoreUnavailable))?;
        let mut n = 0;
        for entry in table.iter().map_err(map_err!(StoreUnavailable))? {
            entry.map_err(map_err!(StoreUnavailable))?;
            n += 1;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_read() {
        let store = EntityStore::open_in_memory().unwrap();
        store
            .update(Collection::HostMachines, "node-01", b"{\"id\":\"node-01\"}")
            .unwrap();

        let value = store.read(Collection::HostMachines, "node-01").unwrap();
        assert_eq!(value.as_deref(), Some(&b"{\"id\":\"node-01\"}"[..]));
    }

    #[test]
    fn read_missing_key_returns_none() {
        let store = EntityStore::open_in_memory().unwrap();
        assert!(store.read(Collection::Users, "nobody").unwrap().is_none());
    }

    #[test]
    fn collections_are_isolated() {
        let store = EntityStore::open_in_memory().unwrap();
        store.update(Collection::Teams, "core", b"team").unwrap();

        assert!(store.read(Collection::Organizations, "core").unwrap().is_none());
        assert_eq!(store.count(Collection::Teams).unwrap(), 1);
        assert_eq!(store.count(Collection::Organizations).unwrap(), 0);
    }

    #[test]
    fn update_overwrites_existing_key() {
        let store = EntityStore::open_in_memory().unwrap();
        store.update(Collection::Containers, "c1", b"first").unwrap();
        store.update(Collection::Containers, "c1", b"second").unwrap();

        let value = store.read(Collection::Containers, "c1").unwrap().unwrap();
        assert_eq!(value, b"second");
        assert_eq!(store.count(Collection::Containers).unwrap(), 1);
    }

    #[test]
    fn scan_returns_key_order() {
        let store = EntityStore::open_in_memory().unwrap();
        for key in ["b", "c", "a"] {
            store.update(Collection::Users, key, key.as_bytes()).unwrap();
        }

        let keys: Vec<String> = store
            .scan(Collection::Users)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_collections_exist_after_open() {
        let store = EntityStore::open_in_memory().unwrap();
        for collection in Collection::ALL {
            assert!(store.scan(collection).unwrap().is_empty());
        }
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("internal.redb");

        {
            let store = EntityStore::open(&db_path).unwrap();
            store.update(Collection::HostMachines, "node-01", b"online").unwrap();
            store.close();
        }

        // Reopen the same database file; collection creation is idempotent.
        let store = EntityStore::open(&db_path).unwrap();
        let value = store.read(Collection::HostMachines, "node-01").unwrap();
        assert_eq!(value.as_deref(), Some(&b"online"[..]));
    }

    #[test]
    fn second_open_times_out_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("internal.redb");
        let _held = EntityStore::open(&db_path).unwrap();

        let timeout = Duration::from_millis(100);
        let started = Instant::now();
        let result = EntityStore::open_with_lock_timeout(&db_path, timeout);

        assert!(matches!(result, Err(StateError::StoreUnavailable(_))));
        assert!(started.elapsed() >= timeout);
    }

    #[test]
    fn open_unwritable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("missing-dir").join("internal.redb");

        let result = EntityStore::open(&db_path);
        assert!(matches!(result, Err(StateError::StoreUnavailable(_))));
    }

    #[test]
    fn close_with_clones_keeps_store_usable() {
        let store = EntityStore::open_in_memory().unwrap();
        let other = store.clone();
        store.close();

        other.update(Collection::Teams, "t", b"x").unwrap();
        assert!(other.read(Collection::Teams, "t").unwrap().is_some());
    }

    #[test]
    fn concurrent_updates_to_different_keys_all_land() {
        let store = EntityStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let key = format!("w{worker}-{i}");
                        store
                            .update(Collection::Containers, &key, key.as_bytes())
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count(Collection::Containers).unwrap(), 200);
    }

    #[test]
    fn scan_sees_a_consistent_snapshot_during_writes() {
        let store = EntityStore::open_in_memory().unwrap();
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    store
                        .update(Collection::Users, &format!("u{i:03}"), b"{}")
                        .unwrap();
                }
            })
        };

        // Every scan sees a prefix of the writer's sequence, never a gap.
        let mut last = 0;
        while last < 100 {
            let keys: Vec<String> = store
                .scan(Collection::Users)
                .unwrap()
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            let expected: Vec<String> = (0..keys.len()).map(|i| format!("u{i:03}")).collect();
            assert_eq!(keys, expected);
            assert!(keys.len() >= last);
            last = keys.len();
            if writer.is_finished() && last < 100 {
                last = store.count(Collection::Users).unwrap();
            }
        }
        writer.join().unwrap();
    }
}

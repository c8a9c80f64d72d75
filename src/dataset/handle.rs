//! # Connection Lifecycle Manager
//!
//! The only way query and mutation code reaches a store. A handle lives for
//! exactly one operation: `with_store` opens it, lends it to the closure and
//! releases it on every exit path. Success closes the connection explicitly so
//! close errors surface; errors and panics release it through `Drop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use super::errors::{DatasetError, DatasetResult};
use super::id::DatasetId;
use super::layout::DatasetLayout;
use crate::observability::{trace_event, Event, MetricsRegistry};

/// How a store is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// SQLite read-only connection
    ReadOnly,
    /// Read-write, never creates files
    ReadWrite,
}

impl AccessMode {
    fn flags(&self) -> OpenFlags {
        match self {
            AccessMode::ReadOnly => {
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            AccessMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadOnly => "read_only",
            AccessMode::ReadWrite => "read_write",
        }
    }
}

/// An open connection to one dataset's store
pub struct StoreHandle {
    dataset_id: DatasetId,
    conn: Option<Connection>,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("dataset_id", &self.dataset_id)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl StoreHandle {
    fn new(dataset_id: DatasetId, conn: Connection, metrics: Arc<MetricsRegistry>) -> Self {
        metrics.handle_opened();
        trace_event(Event::StoreOpened, &[("dataset_id", dataset_id.as_str())]);
        Self {
            dataset_id,
            conn: Some(conn),
            metrics,
        }
    }

    pub fn dataset_id(&self) -> &DatasetId {
        &self.dataset_id
    }

    pub fn conn(&self) -> DatasetResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DatasetError::Internal("store handle already closed".into()))
    }

    pub fn conn_mut(&mut self) -> DatasetResult<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DatasetError::Internal("store handle already closed".into()))
    }

    /// Close the connection, reporting close failures
    pub fn close(mut self) -> DatasetResult<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| DatasetError::storage("failed to close store", e)),
            None => Ok(()),
        }
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        // Dropping the connection closes it
        self.conn.take();
        self.metrics.handle_closed();
        trace_event(Event::StoreClosed, &[("dataset_id", self.dataset_id.as_str())]);
    }
}

/// Opens and releases store handles
#[derive(Debug)]
pub struct StoreManager {
    layout: DatasetLayout,
    busy_timeout: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl StoreManager {
    pub fn new(layout: DatasetLayout, busy_timeout: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            layout,
            busy_timeout,
            metrics,
        }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Run `f` against an open handle to an existing dataset.
    ///
    /// Fails with `NotFound` before opening anything if the dataset does not
    /// exist.
    pub fn with_store<T, F>(&self, id: &DatasetId, mode: AccessMode, f: F) -> DatasetResult<T>
    where
        F: FnOnce(&mut StoreHandle) -> DatasetResult<T>,
    {
        if !self.layout.exists(id) {
            return Err(DatasetError::NotFound(id.to_string()));
        }

        let mut handle = self.open(id, mode.flags(), mode.as_str())?;
        let value = f(&mut handle)?;
        handle.close()?;
        Ok(value)
    }

    /// Create a new, empty store for a dataset that does not exist yet
    pub(crate) fn create(&self, id: &DatasetId) -> DatasetResult<StoreHandle> {
        std::fs::create_dir_all(self.layout.dataset_dir(id))?;
        self.open(
            id,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            "create",
        )
    }

    fn open(&self, id: &DatasetId, flags: OpenFlags, mode: &str) -> DatasetResult<StoreHandle> {
        let path = self.layout.locate(id);
        let conn = Connection::open_with_flags(&path, flags).map_err(|e| {
            DatasetError::storage(&format!("failed to open store ({})", mode), e)
        })?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| DatasetError::storage("failed to set busy timeout", e))?;

        Ok(StoreHandle::new(id.clone(), conn, Arc::clone(&self.metrics)))
    }
}

/// Per-dataset write locks
///
/// Mutations on one dataset run one at a time inside this process. Different
/// datasets never contend. An entry lives only while some caller holds or
/// waits on it.
#[derive(Debug, Default)]
pub struct DatasetLocks {
    locks: Mutex<HashMap<DatasetId, Arc<Mutex<()>>>>,
}

impl DatasetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the dataset's write lock
    pub fn with_lock<T>(&self, id: &DatasetId, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        let value = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only taken under the map lock, so a count of two (map +
        // ours) means nobody else is waiting
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        value
    }

    /// Number of datasets with a live lock entry
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> StoreManager {
        let layout = DatasetLayout::new(temp.path());
        layout.ensure_dirs().unwrap();
        StoreManager::new(layout, Duration::from_millis(500), Arc::new(MetricsRegistry::new()))
    }

    fn create_store(manager: &StoreManager, id: &DatasetId) {
        let handle = manager.create(id).unwrap();
        handle
            .conn()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        handle.close().unwrap();
    }

    #[test]
    fn test_missing_dataset_is_not_found() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let id = DatasetId::parse("missing").unwrap();

        let result = manager.with_store(&id, AccessMode::ReadOnly, |_| Ok(()));
        assert!(matches!(result, Err(DatasetError::NotFound(_))));
        // Nothing was created by the probe
        assert!(!manager.layout().dataset_dir(&id).exists());
    }

    #[test]
    fn test_handle_released_on_success() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let id = DatasetId::parse("ok").unwrap();
        create_store(&manager, &id);

        let x: i64 = manager
            .with_store(&id, AccessMode::ReadOnly, |h| {
                assert_eq!(manager.metrics().open_store_handles(), 1);
                h.conn()?
                    .query_row("SELECT x FROM t", [], |r| r.get(0))
                    .map_err(|e| DatasetError::Query(e.to_string()))
            })
            .unwrap();

        assert_eq!(x, 1);
        assert_eq!(manager.metrics().open_store_handles(), 0);
    }

    #[test]
    fn test_handle_released_on_error() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let id = DatasetId::parse("err").unwrap();
        create_store(&manager, &id);

        let result: DatasetResult<()> = manager.with_store(&id, AccessMode::ReadWrite, |_| {
            Err(DatasetError::Mutation("boom".into()))
        });

        assert!(matches!(result, Err(DatasetError::Mutation(_))));
        assert_eq!(manager.metrics().open_store_handles(), 0);
    }

    #[test]
    fn test_handle_released_on_panic() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let id = DatasetId::parse("panic").unwrap();
        create_store(&manager, &id);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: DatasetResult<()> =
                manager.with_store(&id, AccessMode::ReadOnly, |_| panic!("inside operation"));
        }));

        assert!(outcome.is_err());
        assert_eq!(manager.metrics().open_store_handles(), 0);
    }

    #[test]
    fn test_read_only_handle_rejects_writes() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let id = DatasetId::parse("ro").unwrap();
        create_store(&manager, &id);

        let result = manager.with_store(&id, AccessMode::ReadOnly, |h| {
            h.conn()?
                .execute("INSERT INTO t VALUES (2)", [])
                .map_err(|e| DatasetError::Mutation(e.to_string()))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_locks_are_per_dataset() {
        let locks = DatasetLocks::new();
        let a = DatasetId::parse("a").unwrap();
        let b = DatasetId::parse("b").unwrap();

        // Taking b's lock while holding a's must not deadlock
        let value = locks.with_lock(&a, || locks.with_lock(&b, || 7));
        assert_eq!(value, 7);
    }

    #[test]
    fn test_idle_lock_entries_are_evicted() {
        let locks = DatasetLocks::new();
        let a = DatasetId::parse("a").unwrap();
        let b = DatasetId::parse("b").unwrap();

        locks.with_lock(&a, || {
            locks.with_lock(&b, || assert_eq!(locks.len(), 2));
            assert_eq!(locks.len(), 1);
        });
        assert!(locks.is_empty());
    }

    #[test]
    fn test_contended_lock_entry_survives_until_last_user() {
        let locks = Arc::new(DatasetLocks::new());
        let id = DatasetId::parse("shared").unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        locks.with_lock(&id, || ());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(locks.is_empty());
    }
}

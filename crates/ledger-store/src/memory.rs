//! In-process reference store
//!
//! Snapshot reads with optimistic, serializable commit validation. A
//! transaction reads at the commit timestamp current when it began; at commit
//! every key it read or wrote, and every range it scanned, must be unchanged
//! since then. Read-only transactions always commit.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use ledger_core::{LedgerError, LedgerResult};

use crate::mvcc::VersionedMap;
use crate::{Row, Runner, Store, Transaction};

/// Reference store configuration
#[derive(Clone, Debug, Default)]
pub struct MemoryStoreConfig {
    /// Delay applied before every operation to widen race windows
    pub op_latency: Option<Duration>,
}

impl MemoryStoreConfig {
    pub fn with_latency(latency: Duration) -> Self {
        MemoryStoreConfig {
            op_latency: Some(latency),
        }
    }
}

/// Injectable failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Every read fails with `ReadError`
    FailReads,
    /// Every write fails with `WriteError`
    FailWrites,
    /// Every writing commit fails with `Conflict`
    ForceConflicts,
    /// Every operation fails with `Unavailable`
    Offline,
}

#[derive(Debug, Default)]
struct Faults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    force_conflicts: AtomicBool,
    offline: AtomicBool,
}

impl Faults {
    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::FailReads => &self.fail_reads,
            Fault::FailWrites => &self.fail_writes,
            Fault::ForceConflicts => &self.force_conflicts,
            Fault::Offline => &self.offline,
        }
    }

    fn is_set(&self, fault: Fault) -> bool {
        self.flag(fault).load(Ordering::Relaxed)
    }

    fn check_online(&self) -> LedgerResult<()> {
        if self.is_set(Fault::Offline) {
            return Err(LedgerError::Unavailable("injected outage".into()));
        }
        Ok(())
    }

    fn check_read(&self, key: &[u8]) -> LedgerResult<()> {
        self.check_online()?;
        if self.is_set(Fault::FailReads) {
            return Err(LedgerError::ReadError {
                key: String::from_utf8_lossy(key).into_owned(),
                reason: "injected read fault".into(),
            });
        }
        Ok(())
    }

    fn check_write(&self, key: &[u8]) -> LedgerResult<()> {
        self.check_online()?;
        if self.is_set(Fault::FailWrites) {
            return Err(LedgerError::WriteError {
                key: String::from_utf8_lossy(key).into_owned(),
                reason: "injected write fault".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Shared {
    config: MemoryStoreConfig,
    data: RwLock<VersionedMap>,
    /// Read timestamps of open transactions, with multiplicity
    active: Mutex<BTreeMap<u64, usize>>,
    faults: Faults,
}

impl Shared {
    async fn pause(&self) {
        if let Some(latency) = self.config.op_latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn register(&self, read_ts: u64) {
        *self.active.lock().entry(read_ts).or_insert(0) += 1;
    }

    fn release(&self, read_ts: u64) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&read_ts) {
            *count -= 1;
            if *count == 0 {
                active.remove(&read_ts);
            }
        }
    }

    /// Oldest read timestamp still in use
    fn horizon(&self, last_commit: u64) -> u64 {
        self.active
            .lock()
            .keys()
            .next()
            .copied()
            .unwrap_or(last_commit)
    }

    fn commit_writes(&self, writes: HashMap<Bytes, Option<Bytes>>) -> LedgerResult<u64> {
        for key in writes.keys() {
            self.faults.check_write(key)?;
        }

        let mut data = self.data.write();
        let horizon = self.horizon(data.last_commit());
        Ok(data.apply(writes, horizon))
    }
}

/// In-memory multi-version store
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            shared: Arc::new(Shared {
                config,
                ..Shared::default()
            }),
        }
    }

    /// Turn a fault on
    pub fn inject(&self, fault: Fault) {
        self.shared.faults.flag(fault).store(true, Ordering::Relaxed);
    }

    /// Turn a fault off
    pub fn heal(&self, fault: Fault) {
        self.shared.faults.flag(fault).store(false, Ordering::Relaxed);
    }

    /// Timestamp of the newest commit
    pub fn last_commit(&self) -> u64 {
        self.shared.data.read().last_commit()
    }

    /// Number of transactions currently open
    pub fn open_transactions(&self) -> usize {
        self.shared.active.lock().values().sum()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> LedgerResult<Box<dyn Transaction>> {
        self.shared.pause().await;
        self.shared.faults.check_online()?;

        // Hold the read lock so no commit lands between picking and pinning.
        let data = self.shared.data.read();
        let read_ts = data.last_commit();
        self.shared.register(read_ts);
        drop(data);

        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            read_ts,
            reads: HashSet::new(),
            scans: Vec::new(),
            writes: HashMap::new(),
        }))
    }

    fn direct(&self) -> Box<dyn Runner> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl Runner for MemoryStore {
    async fn get(&mut self, keys: &[Bytes]) -> LedgerResult<Vec<Option<Bytes>>> {
        self.shared.pause().await;
        for key in keys {
            self.shared.faults.check_read(key)?;
        }

        let data = self.shared.data.read();
        let ts = data.last_commit();
        Ok(keys.iter().map(|key| data.get(key, ts)).collect())
    }

    async fn put(&mut self, key: Bytes, value: Bytes) -> LedgerResult<()> {
        self.put_batch(vec![(key, value)]).await
    }

    async fn put_batch(&mut self, rows: Vec<(Bytes, Bytes)>) -> LedgerResult<()> {
        self.shared.pause().await;
        let writes = rows.into_iter().map(|(k, v)| (k, Some(v))).collect();
        self.shared.commit_writes(writes).map(|_| ())
    }

    async fn delete(&mut self, key: Bytes) -> LedgerResult<()> {
        self.shared.pause().await;
        let mut writes = HashMap::new();
        writes.insert(key, None);
        self.shared.commit_writes(writes).map(|_| ())
    }

    async fn scan(&mut self, start: &[u8], end: &[u8], limit: usize) -> LedgerResult<Vec<Row>> {
        self.shared.pause().await;
        self.shared.faults.check_read(start)?;

        let data = self.shared.data.read();
        Ok(data.scan(start, end, data.last_commit(), limit))
    }
}

/// Transaction against a [`MemoryStore`]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    read_ts: u64,
    reads: HashSet<Bytes>,
    scans: Vec<(Bytes, Bytes)>,
    writes: HashMap<Bytes, Option<Bytes>>,
}

impl MemoryTransaction {
    fn validate(&self, data: &VersionedMap) -> LedgerResult<()> {
        if self.shared.faults.is_set(Fault::ForceConflicts) {
            return Err(LedgerError::Conflict);
        }

        let stale_key = self
            .reads
            .iter()
            .chain(self.writes.keys())
            .any(|key| data.latest_commit(key) > self.read_ts);
        let stale_range = self
            .scans
            .iter()
            .any(|(start, end)| data.range_changed_since(start, end, self.read_ts));

        if stale_key || stale_range {
            return Err(LedgerError::Conflict);
        }
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.shared.release(self.read_ts);
    }
}

#[async_trait]
impl Runner for MemoryTransaction {
    async fn get(&mut self, keys: &[Bytes]) -> LedgerResult<Vec<Option<Bytes>>> {
        self.shared.pause().await;
        for key in keys {
            self.shared.faults.check_read(key)?;
        }

        let data = self.shared.data.read();
        let values = keys
            .iter()
            .map(|key| match self.writes.get(key) {
                Some(pending) => pending.clone(),
                None => data.get(key, self.read_ts),
            })
            .collect();
        drop(data);

        self.reads.extend(keys.iter().cloned());
        Ok(values)
    }

    async fn put(&mut self, key: Bytes, value: Bytes) -> LedgerResult<()> {
        self.writes.insert(key, Some(value));
        Ok(())
    }

    async fn put_batch(&mut self, rows: Vec<(Bytes, Bytes)>) -> LedgerResult<()> {
        self.writes
            .extend(rows.into_iter().map(|(key, value)| (key, Some(value))));
        Ok(())
    }

    async fn delete(&mut self, key: Bytes) -> LedgerResult<()> {
        self.writes.insert(key, None);
        Ok(())
    }

    async fn scan(&mut self, start: &[u8], end: &[u8], limit: usize) -> LedgerResult<Vec<Row>> {
        self.shared.pause().await;
        self.shared.faults.check_read(start)?;

        let snapshot = self.shared.data.read().scan(start, end, self.read_ts, usize::MAX);
        let mut merged: BTreeMap<Bytes, Bytes> = snapshot
            .into_iter()
            .map(|row| (row.key, row.value))
            .collect();

        for (key, pending) in &self.writes {
            if &key[..] < start || &key[..] >= end {
                continue;
            }
            match pending {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }

        self.scans
            .push((Bytes::copy_from_slice(start), Bytes::copy_from_slice(end)));

        Ok(merged
            .into_iter()
            .take(limit)
            .map(|(key, value)| Row::new(key, value))
            .collect())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> LedgerResult<()> {
        self.shared.pause().await;

        if self.writes.is_empty() {
            trace!(read_ts = self.read_ts, "read-only commit");
            return Ok(());
        }

        for key in self.writes.keys() {
            self.shared.faults.check_write(key)?;
        }

        let shared = Arc::clone(&self.shared);
        let mut data = shared.data.write();
        self.validate(&data)?;

        let mut this = self;
        let writes = std::mem::take(&mut this.writes);
        let horizon = shared.horizon(data.last_commit());
        let commit_ts = data.apply(writes, horizon);
        trace!(read_ts = this.read_ts, commit_ts, "committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{run_atomic, RetryPolicy};
    use futures::FutureExt;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn test_direct_get_put() {
        let store = MemoryStore::new();
        let mut direct = store.direct();

        assert_eq!(direct.get(&[key("aa")]).await.unwrap(), vec![None]);
        direct.put(key("aa"), key("1")).await.unwrap();
        assert_eq!(direct.get(&[key("aa")]).await.unwrap(), vec![Some(key("1"))]);
    }

    #[tokio::test]
    async fn test_batch_get_keeps_request_order() {
        let store = MemoryStore::new();
        let mut direct = store.direct();
        direct
            .put_batch(vec![(key("b"), key("2")), (key("a"), key("1"))])
            .await
            .unwrap();

        let values = direct.get(&[key("b"), key("zz"), key("a")]).await.unwrap();
        assert_eq!(values, vec![Some(key("2")), None, Some(key("1"))]);
    }

    #[tokio::test]
    async fn test_scan_and_delete() {
        let store = MemoryStore::new();
        let mut direct = store.direct();
        direct
            .put_batch(vec![
                (key("aa"), key("1")),
                (key("ab"), key("2")),
                (key("ac"), key("3")),
                (key("bb"), key("4")),
            ])
            .await
            .unwrap();
        direct.delete(key("ab")).await.unwrap();

        let rows = direct.scan(b"a", b"b", 100).await.unwrap();
        assert_eq!(
            rows,
            vec![Row::new(key("aa"), key("1")), Row::new(key("ac"), key("3"))]
        );
    }

    #[tokio::test]
    async fn test_scan_exact_reports_gap() {
        let store = MemoryStore::new();
        let mut direct = store.direct();
        direct
            .put_batch(vec![(key("a1"), key("x")), (key("a2"), key("y"))])
            .await
            .unwrap();

        let err = direct.scan_exact(b"a", b"b", 3).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::IncompleteScan {
                expected: 3,
                actual: 2
            }
        );
    }

    #[tokio::test]
    async fn test_transaction_reads_own_writes() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();

        txn.put(key("a"), key("1")).await.unwrap();
        assert_eq!(txn.get(&[key("a")]).await.unwrap(), vec![Some(key("1"))]);
        assert_eq!(txn.scan(b"a", b"b", 10).await.unwrap().len(), 1);

        // Not visible outside until commit.
        assert_eq!(store.direct().get(&[key("a")]).await.unwrap(), vec![None]);
        txn.commit().await.unwrap();
        assert_eq!(
            store.direct().get(&[key("a")]).await.unwrap(),
            vec![Some(key("1"))]
        );
    }

    #[tokio::test]
    async fn test_snapshot_isolation_of_reads() {
        let store = MemoryStore::new();
        store.direct().put(key("a"), key("1")).await.unwrap();

        let mut reader = store.begin().await.unwrap();
        store.direct().put(key("a"), key("2")).await.unwrap();

        assert_eq!(reader.get(&[key("a")]).await.unwrap(), vec![Some(key("1"))]);
        // Read-only transactions commit even when their snapshot is stale.
        reader.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_stale_read_conflicts() {
        let store = MemoryStore::new();
        store.direct().put(key("a"), key("1")).await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.get(&[key("a")]).await.unwrap();
        second.get(&[key("a")]).await.unwrap();
        first.put(key("a"), key("2")).await.unwrap();
        second.put(key("a"), key("3")).await.unwrap();

        first.commit().await.unwrap();
        assert_eq!(second.commit().await.unwrap_err(), LedgerError::Conflict);
        assert_eq!(
            store.direct().get(&[key("a")]).await.unwrap(),
            vec![Some(key("2"))]
        );
    }

    #[tokio::test]
    async fn test_phantom_in_scanned_range_conflicts() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.scan(b"a", b"b", 10).await.unwrap();
        txn.put(key("z"), key("1")).await.unwrap();

        store.direct().put(key("am"), key("x")).await.unwrap();
        assert_eq!(txn.commit().await.unwrap_err(), LedgerError::Conflict);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_released() {
        let store = MemoryStore::new();
        let txn = store.begin().await.unwrap();
        assert_eq!(store.open_transactions(), 1);
        drop(txn);
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new();
        let mut direct = store.direct();

        store.inject(Fault::FailReads);
        assert!(matches!(
            direct.get(&[key("a")]).await,
            Err(LedgerError::ReadError { .. })
        ));
        store.heal(Fault::FailReads);

        store.inject(Fault::FailWrites);
        assert!(matches!(
            direct.put(key("a"), key("1")).await,
            Err(LedgerError::WriteError { .. })
        ));
        store.heal(Fault::FailWrites);

        direct.put(key("a"), key("1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = MemoryStore::new();
        store.direct().put(key("a"), key("1")).await.unwrap();
        let mut open = store.begin().await.unwrap();

        store.inject(Fault::Offline);
        assert!(matches!(
            store.begin().await.err(),
            Some(LedgerError::Unavailable(_))
        ));
        assert!(matches!(
            store.direct().scan(b"a", b"b", 10).await,
            Err(LedgerError::Unavailable(_))
        ));
        assert!(matches!(
            open.get(&[key("a")]).await,
            Err(LedgerError::Unavailable(_))
        ));

        store.heal(Fault::Offline);
        assert_eq!(open.get(&[key("a")]).await.unwrap(), vec![Some(key("1"))]);
    }

    #[tokio::test]
    async fn test_run_atomic_retries_conflicts() {
        let store = MemoryStore::new();
        store.direct().put(key("n"), key("0")).await.unwrap();

        let mut calls = 0u32;
        let interfering = store.clone();
        let result = run_atomic(&store, RetryPolicy::new(5), |txn| {
            calls += 1;
            let first_call = calls == 1;
            let interfering = interfering.clone();
            async move {
                txn.get(&[key("n")]).await?;
                if first_call {
                    interfering.direct().put(key("n"), key("9")).await?;
                }
                txn.put(key("n"), key("1")).await
            }
            .boxed()
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 2);
        assert_eq!(
            store.direct().get(&[key("n")]).await.unwrap(),
            vec![Some(key("1"))]
        );
    }

    #[tokio::test]
    async fn test_run_atomic_gives_up() {
        let store = MemoryStore::new();
        store.inject(Fault::ForceConflicts);

        let result = run_atomic(&store, RetryPolicy::new(3), |txn| {
            async move { txn.put(key("a"), key("1")).await }.boxed()
        })
        .await;

        assert_eq!(result, Err(LedgerError::RetriesExhausted { attempts: 3 }));
        assert_eq!(store.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_run_atomic_surfaces_other_errors() {
        let store = MemoryStore::new();
        store.inject(Fault::FailReads);

        let mut calls = 0u32;
        let result: LedgerResult<()> = run_atomic(&store, RetryPolicy::default(), |txn| {
            calls += 1;
            async move { txn.get(&[key("a")]).await.map(|_| ()) }.boxed()
        })
        .await;

        assert!(matches!(result, Err(LedgerError::ReadError { .. })));
        assert_eq!(calls, 1);
    }
}

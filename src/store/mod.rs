//! Persistent, partitioned reference state.
//!
//! A [`CrawlStore`] tracks every reference of a crawl in exactly one of
//! five partitions: queued, active, processed-valid, processed-invalid
//! and cached (the previous run's results). All partition moves are
//! serialized so a reference is never observed in two places, and the
//! start-of-run reconciliation turns any crash leftover back into a
//! runnable configuration.

pub mod backend;
pub mod memory_backend;
pub mod sled_backend;
pub mod transfer;

use parking_lot::Mutex;
use thiserror::Error;

pub use backend::{KvBackend, Partition};
pub use memory_backend::MemoryBackend;
pub use sled_backend::SledBackend;

use crate::reference::CrawlRef;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct CrawlStore {
    backend: Box<dyn KvBackend>,
    /// Serializes the multi-partition move sequences (`next_queued`,
    /// `processed`) so they are linearizable across worker threads.
    move_lock: Mutex<()>,
}

impl CrawlStore {
    pub fn new(backend: Box<dyn KvBackend>) -> Self {
        Self {
            backend,
            move_lock: Mutex::new(()),
        }
    }

    /// Start-of-run reconciliation. With `resume` set and unfinished work
    /// present, prior in-flight references are re-queued; otherwise the
    /// previous run's valid results are promoted to the cache and every
    /// working partition starts empty. Returns whether the run resumes.
    pub fn open(&self, resume: bool) -> Result<bool, StoreError> {
        let _guard = self.move_lock.lock();

        let unfinished = self.backend.len(Partition::Queued)? > 0
            || self.backend.len(Partition::Active)? > 0;
        let resuming = resume && unfinished;

        if resuming {
            for record in self.backend.records(Partition::Active)? {
                let key = record.reference.clone();
                let finalized = self.backend.contains(Partition::ProcessedValid, &key)?
                    || self.backend.contains(Partition::ProcessedInvalid, &key)?;
                if !finalized {
                    // Interrupted mid-flight: back to the queue.
                    self.backend.put(Partition::Queued, &record)?;
                }
                // A finalized duplicate means the crash landed between the
                // processed insert and the active remove; dropping it here
                // restores the one-partition invariant.
                self.backend.remove(Partition::Active, &key)?;
            }
        } else {
            self.backend.clear(Partition::Cached)?;
            self.backend.clear(Partition::Active)?;
            self.backend.clear(Partition::Queued)?;
            self.backend.clear(Partition::ProcessedInvalid)?;

            for record in self.backend.records(Partition::ProcessedValid)? {
                if record.state.map(|s| s.is_good()).unwrap_or(false) {
                    self.backend.put(Partition::Cached, &record)?;
                }
            }
            self.backend.clear(Partition::ProcessedValid)?;
        }

        self.backend.flush()?;
        Ok(resuming)
    }

    pub fn close(&self) -> Result<(), StoreError> {
        self.backend.flush()
    }

    /// Insert a copy of the reference into the queue. Re-queueing the same
    /// key overwrites the non-key fields (last write wins).
    pub fn queue(&self, reference: &CrawlRef) -> Result<(), StoreError> {
        self.backend.put(Partition::Queued, reference)
    }

    /// Atomically move the head of the queue into the active partition.
    pub fn next_queued(&self) -> Result<Option<CrawlRef>, StoreError> {
        let _guard = self.move_lock.lock();
        let Some(record) = self.backend.first(Partition::Queued)? else {
            return Ok(None);
        };
        self.backend.remove(Partition::Queued, &record.reference)?;
        self.backend.put(Partition::Active, &record)?;
        Ok(Some(record))
    }

    pub fn get_cached(&self, reference: &str) -> Result<Option<CrawlRef>, StoreError> {
        self.backend.get(Partition::Cached, reference)
    }

    /// Finalize a reference: remove it from active and cached, and file it
    /// under processed-valid or processed-invalid depending on its state.
    /// Deleted references are terminal removals, not failures, so they
    /// land in processed-valid.
    pub fn processed(&self, reference: &CrawlRef) -> Result<(), StoreError> {
        let _guard = self.move_lock.lock();
        let valid = reference
            .state
            .map(|s| s.is_good() || s == crate::reference::RefState::Deleted)
            .unwrap_or(false);
        let target = if valid {
            Partition::ProcessedValid
        } else {
            Partition::ProcessedInvalid
        };
        self.backend.put(target, reference)?;
        self.backend.remove(Partition::Active, &reference.reference)?;
        self.backend.remove(Partition::Cached, &reference.reference)?;
        Ok(())
    }

    pub fn queued_count(&self) -> Result<usize, StoreError> {
        self.backend.len(Partition::Queued)
    }

    pub fn active_count(&self) -> Result<usize, StoreError> {
        self.backend.len(Partition::Active)
    }

    pub fn processed_count(&self) -> Result<usize, StoreError> {
        Ok(self.backend.len(Partition::ProcessedValid)?
            + self.backend.len(Partition::ProcessedInvalid)?)
    }

    pub fn cached_count(&self) -> Result<usize, StoreError> {
        self.backend.len(Partition::Cached)
    }

    pub fn is_queue_empty(&self) -> Result<bool, StoreError> {
        Ok(self.backend.len(Partition::Queued)? == 0)
    }

    pub fn is_cache_empty(&self) -> Result<bool, StoreError> {
        Ok(self.backend.len(Partition::Cached)? == 0)
    }

    /// Read-only snapshot of the cache, used by orphan handling.
    pub fn cached_records(&self) -> Result<Vec<CrawlRef>, StoreError> {
        self.backend.records(Partition::Cached)
    }

    /// Snapshot of an arbitrary partition (store export, tests).
    pub fn partition_records(&self, partition: Partition) -> Result<Vec<CrawlRef>, StoreError> {
        self.backend.records(partition)
    }

    /// Direct insert used by the store importer; bypasses reconciliation.
    pub fn restore(&self, partition: Partition, record: &CrawlRef) -> Result<(), StoreError> {
        self.backend.put(partition, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::RefState;

    fn memory_store() -> CrawlStore {
        CrawlStore::new(Box::new(MemoryBackend::new()))
    }

    #[test]
    fn test_queue_then_next_queued_moves_to_active() {
        let store = memory_store();
        let r = CrawlRef::new("a");
        store.queue(&r).unwrap();

        let dequeued = store.next_queued().unwrap().unwrap();
        assert_eq!(dequeued, r);
        assert_eq!(store.queued_count().unwrap(), 0);
        assert_eq!(store.active_count().unwrap(), 1);
    }

    #[test]
    fn test_queue_same_key_twice_keeps_one_entry() {
        let store = memory_store();
        let mut r = CrawlRef::new("a");
        store.queue(&r).unwrap();
        r.content_type = Some("text/plain".to_string());
        store.queue(&r).unwrap();

        assert_eq!(store.queued_count().unwrap(), 1);
        let dequeued = store.next_queued().unwrap().unwrap();
        assert_eq!(dequeued.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_processed_partitions_by_state() {
        let store = memory_store();

        for (name, state) in [
            ("good", RefState::Modified),
            ("bad", RefState::Error),
            ("gone", RefState::Deleted),
        ] {
            let mut r = CrawlRef::new(name);
            store.queue(&r).unwrap();
            store.next_queued().unwrap();
            r.state = Some(state);
            store.processed(&r).unwrap();
        }

        let valid = store.partition_records(Partition::ProcessedValid).unwrap();
        let invalid = store.partition_records(Partition::ProcessedInvalid).unwrap();
        let valid_keys: Vec<_> = valid.iter().map(|r| r.reference.as_str()).collect();
        assert!(valid_keys.contains(&"good"));
        assert!(valid_keys.contains(&"gone"));
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].reference, "bad");
        assert_eq!(store.active_count().unwrap(), 0);
        assert_eq!(store.processed_count().unwrap(), 3);
    }

    #[test]
    fn test_processed_evicts_cached_entry() {
        let store = memory_store();
        store
            .restore(Partition::Cached, &CrawlRef::new("a"))
            .unwrap();

        let mut r = CrawlRef::new("a");
        store.queue(&r).unwrap();
        store.next_queued().unwrap();
        r.state = Some(RefState::Unmodified);
        store.processed(&r).unwrap();

        assert!(store.get_cached("a").unwrap().is_none());
        assert!(store.is_cache_empty().unwrap());
    }

    #[test]
    fn test_resume_requeues_active_references() {
        let store = memory_store();
        for name in ["a", "b", "c", "d"] {
            store.queue(&CrawlRef::new(name)).unwrap();
        }
        // Two in flight when the crash happens.
        store.next_queued().unwrap();
        store.next_queued().unwrap();
        assert_eq!(store.active_count().unwrap(), 2);

        let resuming = store.open(true).unwrap();
        assert!(resuming);
        assert_eq!(store.active_count().unwrap(), 0);
        assert_eq!(store.queued_count().unwrap(), 4);
    }

    #[test]
    fn test_resume_drops_active_entry_already_finalized() {
        // A crash between the processed insert and the active remove
        // leaves the key in both partitions.
        let store = memory_store();
        let mut r = CrawlRef::new("a");
        store.queue(&r).unwrap();
        store.next_queued().unwrap();
        r.state = Some(RefState::New);
        store.restore(Partition::ProcessedValid, &r).unwrap();

        let resuming = store.open(true).unwrap();
        assert!(resuming);
        assert_eq!(store.active_count().unwrap(), 0);
        assert_eq!(store.queued_count().unwrap(), 0);
        assert_eq!(store.processed_count().unwrap(), 1);
    }

    #[test]
    fn test_fresh_open_promotes_good_processed_to_cache() {
        let store = memory_store();
        let mut good = CrawlRef::new("good");
        good.state = Some(RefState::New);
        let mut deleted = CrawlRef::new("deleted");
        deleted.state = Some(RefState::Deleted);
        let mut bad = CrawlRef::new("bad");
        bad.state = Some(RefState::Error);
        store.restore(Partition::ProcessedValid, &good).unwrap();
        store.restore(Partition::ProcessedValid, &deleted).unwrap();
        store.restore(Partition::ProcessedInvalid, &bad).unwrap();

        let resuming = store.open(false).unwrap();
        assert!(!resuming);

        assert_eq!(store.cached_count().unwrap(), 1);
        assert!(store.get_cached("good").unwrap().is_some());
        assert!(store.get_cached("deleted").unwrap().is_none());
        assert_eq!(store.processed_count().unwrap(), 0);
        assert_eq!(store.queued_count().unwrap(), 0);
    }

    #[test]
    fn test_open_resume_with_no_unfinished_work_is_fresh() {
        let store = memory_store();
        let mut done = CrawlRef::new("done");
        done.state = Some(RefState::New);
        store.restore(Partition::ProcessedValid, &done).unwrap();

        // Nothing queued or active: a resume request falls back to a
        // fresh start and promotes the cache.
        let resuming = store.open(true).unwrap();
        assert!(!resuming);
        assert_eq!(store.cached_count().unwrap(), 1);
    }

    #[test]
    fn test_reference_never_in_two_working_partitions() {
        let store = memory_store();
        store.queue(&CrawlRef::new("a")).unwrap();
        let mut r = store.next_queued().unwrap().unwrap();
        assert_eq!(store.queued_count().unwrap(), 0);

        r.state = Some(RefState::New);
        store.processed(&r).unwrap();

        let mut containing = 0;
        for partition in [
            Partition::Queued,
            Partition::Active,
            Partition::ProcessedValid,
            Partition::ProcessedInvalid,
        ] {
            if store
                .partition_records(partition)
                .unwrap()
                .iter()
                .any(|x| x.reference == "a")
            {
                containing += 1;
            }
        }
        assert_eq!(containing, 1);
    }
}

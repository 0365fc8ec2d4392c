//! Persistent backend over a sled database, one tree per partition.
//!
//! Records are serde_json encoded under their reference key. sled trees
//! iterate in key order, which gives `first` its sorted-dequeue behavior.

use std::path::Path;

use sled::{Db, Tree};

use crate::reference::CrawlRef;
use crate::store::backend::{KvBackend, Partition};
use crate::store::StoreError;

pub struct SledBackend {
    db: Db,
    queued: Tree,
    active: Tree,
    processed_valid: Tree,
    processed_invalid: Tree,
    cached: Tree,
}

impl SledBackend {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let db = sled::open(dir)?;
        Ok(Self {
            queued: db.open_tree(Partition::Queued.name())?,
            active: db.open_tree(Partition::Active.name())?,
            processed_valid: db.open_tree(Partition::ProcessedValid.name())?,
            processed_invalid: db.open_tree(Partition::ProcessedInvalid.name())?,
            cached: db.open_tree(Partition::Cached.name())?,
            db,
        })
    }

    fn tree(&self, partition: Partition) -> &Tree {
        match partition {
            Partition::Queued => &self.queued,
            Partition::Active => &self.active,
            Partition::ProcessedValid => &self.processed_valid,
            Partition::ProcessedInvalid => &self.processed_invalid,
            Partition::Cached => &self.cached,
        }
    }

    fn encode(record: &CrawlRef) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<CrawlRef, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl KvBackend for SledBackend {
    fn put(&self, partition: Partition, record: &CrawlRef) -> Result<(), StoreError> {
        let bytes = Self::encode(record)?;
        self.tree(partition)
            .insert(record.reference.as_bytes(), bytes)?;
        Ok(())
    }

    fn get(&self, partition: Partition, key: &str) -> Result<Option<CrawlRef>, StoreError> {
        match self.tree(partition).get(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, partition: Partition, key: &str) -> Result<Option<CrawlRef>, StoreError> {
        match self.tree(partition).remove(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn first(&self, partition: Partition) -> Result<Option<CrawlRef>, StoreError> {
        match self.tree(partition).first()? {
            Some((_key, bytes)) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, partition: Partition, key: &str) -> Result<bool, StoreError> {
        Ok(self.tree(partition).contains_key(key.as_bytes())?)
    }

    fn len(&self, partition: Partition) -> Result<usize, StoreError> {
        Ok(self.tree(partition).len())
    }

    fn clear(&self, partition: Partition) -> Result<(), StoreError> {
        self.tree(partition).clear()?;
        Ok(())
    }

    fn records(&self, partition: Partition) -> Result<Vec<CrawlRef>, StoreError> {
        let mut out = Vec::new();
        for entry in self.tree(partition).iter() {
            let (_key, bytes) = entry?;
            out.push(Self::decode(&bytes)?);
        }
        Ok(out)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl Drop for SledBackend {
    fn drop(&mut self) {
        // Best effort; close() flushes explicitly on the happy path.
        let _ = self.db.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_remove() {
        let dir = TempDir::new().unwrap();
        let backend = SledBackend::open(dir.path()).unwrap();

        let r = CrawlRef::new("https://example.com/a");
        backend.put(Partition::Queued, &r).unwrap();

        let loaded = backend.get(Partition::Queued, &r.reference).unwrap().unwrap();
        assert_eq!(loaded, r);
        assert!(backend.contains(Partition::Queued, &r.reference).unwrap());
        assert_eq!(backend.len(Partition::Queued).unwrap(), 1);

        let removed = backend.remove(Partition::Queued, &r.reference).unwrap();
        assert_eq!(removed, Some(r));
        assert_eq!(backend.len(Partition::Queued).unwrap(), 0);
    }

    #[test]
    fn test_first_is_key_ordered() {
        let dir = TempDir::new().unwrap();
        let backend = SledBackend::open(dir.path()).unwrap();

        backend.put(Partition::Queued, &CrawlRef::new("b")).unwrap();
        backend.put(Partition::Queued, &CrawlRef::new("a")).unwrap();
        backend.put(Partition::Queued, &CrawlRef::new("c")).unwrap();

        let first = backend.first(Partition::Queued).unwrap().unwrap();
        assert_eq!(first.reference, "a");
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = SledBackend::open(dir.path()).unwrap();
            backend.put(Partition::Cached, &CrawlRef::new("kept")).unwrap();
            backend.flush().unwrap();
        }
        let backend = SledBackend::open(dir.path()).unwrap();
        assert!(backend.contains(Partition::Cached, "kept").unwrap());
    }

    #[test]
    fn test_partitions_are_disjoint_namespaces() {
        let dir = TempDir::new().unwrap();
        let backend = SledBackend::open(dir.path()).unwrap();

        backend.put(Partition::Queued, &CrawlRef::new("a")).unwrap();
        assert!(!backend.contains(Partition::Active, "a").unwrap());
        assert!(backend.get(Partition::Cached, "a").unwrap().is_none());
    }
}

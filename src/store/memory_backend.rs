//! Volatile in-memory backend, mainly for tests and short-lived crawls.

use dashmap::DashMap;

use crate::reference::CrawlRef;
use crate::store::backend::{KvBackend, Partition};
use crate::store::StoreError;

#[derive(Default)]
pub struct MemoryBackend {
    queued: DashMap<String, CrawlRef>,
    active: DashMap<String, CrawlRef>,
    processed_valid: DashMap<String, CrawlRef>,
    processed_invalid: DashMap<String, CrawlRef>,
    cached: DashMap<String, CrawlRef>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, partition: Partition) -> &DashMap<String, CrawlRef> {
        match partition {
            Partition::Queued => &self.queued,
            Partition::Active => &self.active,
            Partition::ProcessedValid => &self.processed_valid,
            Partition::ProcessedInvalid => &self.processed_invalid,
            Partition::Cached => &self.cached,
        }
    }
}

impl KvBackend for MemoryBackend {
    fn put(&self, partition: Partition, record: &CrawlRef) -> Result<(), StoreError> {
        self.map(partition)
            .insert(record.reference.clone(), record.clone());
        Ok(())
    }

    fn get(&self, partition: Partition, key: &str) -> Result<Option<CrawlRef>, StoreError> {
        Ok(self.map(partition).get(key).map(|r| r.value().clone()))
    }

    fn remove(&self, partition: Partition, key: &str) -> Result<Option<CrawlRef>, StoreError> {
        Ok(self.map(partition).remove(key).map(|(_k, v)| v))
    }

    fn first(&self, partition: Partition) -> Result<Option<CrawlRef>, StoreError> {
        // DashMap has no key order; scan for the smallest key so dequeue
        // order matches the persistent backend.
        let map = self.map(partition);
        let mut smallest: Option<CrawlRef> = None;
        for entry in map.iter() {
            match &smallest {
                Some(current) if entry.key() >= &current.reference => {}
                _ => smallest = Some(entry.value().clone()),
            }
        }
        Ok(smallest)
    }

    fn contains(&self, partition: Partition, key: &str) -> Result<bool, StoreError> {
        Ok(self.map(partition).contains_key(key))
    }

    fn len(&self, partition: Partition) -> Result<usize, StoreError> {
        Ok(self.map(partition).len())
    }

    fn clear(&self, partition: Partition) -> Result<(), StoreError> {
        self.map(partition).clear();
        Ok(())
    }

    fn records(&self, partition: Partition) -> Result<Vec<CrawlRef>, StoreError> {
        Ok(self
            .map(partition)
            .iter()
            .map(|e| e.value().clone())
            .collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_returns_smallest_key() {
        let backend = MemoryBackend::new();
        backend.put(Partition::Queued, &CrawlRef::new("c")).unwrap();
        backend.put(Partition::Queued, &CrawlRef::new("a")).unwrap();
        backend.put(Partition::Queued, &CrawlRef::new("b")).unwrap();

        assert_eq!(
            backend.first(Partition::Queued).unwrap().unwrap().reference,
            "a"
        );
    }

    #[test]
    fn test_last_write_wins_on_same_key() {
        let backend = MemoryBackend::new();
        let mut r = CrawlRef::new("a");
        backend.put(Partition::Queued, &r).unwrap();
        r.content_type = Some("text/plain".to_string());
        backend.put(Partition::Queued, &r).unwrap();

        assert_eq!(backend.len(Partition::Queued).unwrap(), 1);
        let stored = backend.get(Partition::Queued, "a").unwrap().unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("text/plain"));
    }
}

use crate::reference::CrawlRef;
use crate::store::StoreError;

/// The five disjoint reference partitions a crawl store maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Queued,
    Active,
    ProcessedValid,
    ProcessedInvalid,
    Cached,
}

impl Partition {
    pub const ALL: [Partition; 5] = [
        Partition::Queued,
        Partition::Active,
        Partition::ProcessedValid,
        Partition::ProcessedInvalid,
        Partition::Cached,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Partition::Queued => "queued",
            Partition::Active => "active",
            Partition::ProcessedValid => "processed_valid",
            Partition::ProcessedInvalid => "processed_invalid",
            Partition::Cached => "cached",
        }
    }

    pub fn from_name(name: &str) -> Option<Partition> {
        Partition::ALL.iter().copied().find(|p| p.name() == name)
    }
}

/// Contract for the embedded key/value engine backing a [`super::CrawlStore`].
///
/// Implementations store one record per (partition, reference) pair and are
/// individually thread-safe; the multi-partition move sequences are
/// serialized by the store on top of this contract.
pub trait KvBackend: Send + Sync {
    fn put(&self, partition: Partition, record: &CrawlRef) -> Result<(), StoreError>;

    fn get(&self, partition: Partition, key: &str) -> Result<Option<CrawlRef>, StoreError>;

    fn remove(&self, partition: Partition, key: &str) -> Result<Option<CrawlRef>, StoreError>;

    /// Smallest key in the partition. Key order gives workers a
    /// starvation-free dequeue order.
    fn first(&self, partition: Partition) -> Result<Option<CrawlRef>, StoreError>;

    fn contains(&self, partition: Partition, key: &str) -> Result<bool, StoreError>;

    fn len(&self, partition: Partition) -> Result<usize, StoreError>;

    fn clear(&self, partition: Partition) -> Result<(), StoreError>;

    /// Point-in-time snapshot of every record in the partition.
    fn records(&self, partition: Partition) -> Result<Vec<CrawlRef>, StoreError>;

    fn flush(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_names_round_trip() {
        for p in Partition::ALL {
            assert_eq!(Partition::from_name(p.name()), Some(p));
        }
        assert_eq!(Partition::from_name("bogus"), None);
    }
}

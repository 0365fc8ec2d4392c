//! Store export/import as partition-tagged JSONL.
//!
//! One line per record, so an export can be inspected with standard line
//! tools and re-imported in any order.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::reference::CrawlRef;
use crate::store::backend::Partition;
use crate::store::{CrawlStore, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct TransferRecord {
    partition: String,
    record: CrawlRef,
}

/// Write every partition record to `path`. Returns the record count.
pub fn export_store(store: &CrawlStore, path: &Path) -> Result<usize, StoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut count = 0usize;

    for partition in Partition::ALL {
        for record in store.partition_records(partition)? {
            let line = TransferRecord {
                partition: partition.name().to_string(),
                record,
            };
            let json = serde_json::to_string(&line)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            writeln!(writer, "{}", json)?;
            count += 1;
        }
    }

    writer.flush()?;
    tracing::info!(records = count, path = %path.display(), "store exported");
    Ok(count)
}

/// Read an export produced by [`export_store`] back into the store.
/// Returns the record count.
pub fn import_store(store: &CrawlStore, path: &Path) -> Result<usize, StoreError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut count = 0usize;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: TransferRecord = serde_json::from_str(&line)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let partition = Partition::from_name(&entry.partition).ok_or_else(|| {
            StoreError::Serialization(format!("unknown partition: {}", entry.partition))
        })?;
        store.restore(partition, &entry.record)?;
        count += 1;
    }

    tracing::info!(records = count, path = %path.display(), "store imported");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::RefState;
    use crate::store::MemoryBackend;
    use tempfile::TempDir;

    fn populated_store() -> CrawlStore {
        let store = CrawlStore::new(Box::new(MemoryBackend::new()));
        store.queue(&CrawlRef::new("queued-1")).unwrap();
        store.queue(&CrawlRef::new("queued-2")).unwrap();
        let mut done = CrawlRef::new("done");
        done.state = Some(RefState::Modified);
        store
            .restore(Partition::ProcessedValid, &done)
            .unwrap();
        store
            .restore(Partition::Cached, &CrawlRef::new("cached"))
            .unwrap();
        store
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.jsonl");

        let original = populated_store();
        let exported = export_store(&original, &path).unwrap();
        assert_eq!(exported, 4);

        let restored = CrawlStore::new(Box::new(MemoryBackend::new()));
        let imported = import_store(&restored, &path).unwrap();
        assert_eq!(imported, exported);

        for partition in Partition::ALL {
            let mut a = original.partition_records(partition).unwrap();
            let mut b = restored.partition_records(partition).unwrap();
            a.sort_by(|x, y| x.reference.cmp(&y.reference));
            b.sort_by(|x, y| x.reference.cmp(&y.reference));
            assert_eq!(a, b, "partition {} differs", partition.name());
        }
    }

    #[test]
    fn test_import_rejects_unknown_partition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(
            &path,
            "{\"partition\":\"bogus\",\"record\":{\"reference\":\"a\",\"parent_root_reference\":null,\"root_parent\":true,\"state\":\"new\",\"meta_checksum\":null,\"content_checksum\":null,\"content_type\":null,\"crawl_date\":null}}\n",
        )
        .unwrap();

        let store = CrawlStore::new(Box::new(MemoryBackend::new()));
        assert!(import_store(&store, &path).is_err());
    }
}

use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::sync::Arc;
use tracing::debug;

/// Persistent collection stored as one fjall partition.
pub struct DiskCollection {
    keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Arc<Keyspace>, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let value = self
            .partition
            .get(key)
            .context("Failed to read from disk collection")?
            .map(|slice| slice.to_vec());
        debug!(
            key = %String::from_utf8_lossy(key),
            hit = value.is_some(),
            "Disk collection GET"
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.partition
            .insert(key, value)
            .context("Failed to write to disk collection")?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to flush disk collection")?;
        debug!(key = %String::from_utf8_lossy(key), "Disk collection PUT");
        Ok(())
    }
}

use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Non-persistent collection backed by a HashMap.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entries = self.inner.lock().await;
        let value = entries.get(key).cloned();
        debug!(
            key = %String::from_utf8_lossy(key),
            hit = value.is_some(),
            "Memory collection GET"
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        let mut entries = self.inner.lock().await;
        debug!(key = %String::from_utf8_lossy(key), "Memory collection PUT");
        entries.insert(key.to_vec(), value);
        Ok(())
    }
}

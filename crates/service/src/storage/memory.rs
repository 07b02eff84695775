use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::errors::ProviderError;
use crate::storage::provider::StorageProvider;

/// In-process provider backed by a `DashMap`.
///
/// Embedders hand one of these to [`super::StaticHost`] when the host keeps
/// state in memory; tests use it as a stand-in host provider.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    data: DashMap<String, Value>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn get(&self, key: &str) -> Result<Option<Value>, ProviderError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ProviderError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        self.data.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.data.iter().map(|e| e.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_provider_basic_crud() -> Result<(), ProviderError> {
        let provider = MemoryProvider::new();
        assert!(provider.is_empty());

        provider.set("k", json!([1, 2, 3])).await?;
        assert_eq!(provider.get("k").await?, Some(json!([1, 2, 3])));
        assert_eq!(provider.keys().await?, vec!["k".to_string()]);

        provider.delete("k").await?;
        provider.delete("k").await?;
        assert_eq!(provider.get("k").await?, None);
        assert_eq!(provider.len(), 0);
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ProviderError;

/// Trait abstraction for the storage backing a [`super::DurableKv`].
/// Implementations can be host-injected, file-backed, or in-memory.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, ProviderError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), ProviderError>;
    async fn delete(&self, key: &str) -> Result<(), ProviderError>;
    async fn keys(&self) -> Result<Vec<String>, ProviderError>;
}

/// Detects a storage provider supplied by the embedding host.
///
/// `Ok(None)` means no host provider exists. An `Err` is treated the same
/// way by the selector.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError>;
}

/// Host probe with a fixed answer, for embedders that know up front whether
/// they provide storage.
#[derive(Clone, Default)]
pub struct StaticHost {
    provider: Option<Arc<dyn StorageProvider>>,
}

impl StaticHost {
    pub fn absent() -> Self {
        Self { provider: None }
    }

    pub fn with_provider(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider: Some(provider) }
    }
}

#[async_trait]
impl HostProbe for StaticHost {
    async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError> {
        Ok(self.provider.clone())
    }
}

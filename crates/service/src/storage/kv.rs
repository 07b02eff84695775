use std::sync::Arc;
use std::time::Instant;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{Operation, StorageError};
use crate::observability::{STORAGE_OPS_TOTAL, STORAGE_OP_DURATION};
use crate::storage::backend::{Backend, BackendConfig, BackendKind, BackendSelector};
use crate::storage::retry::RetryPolicy;

/// Durable key-value store.
///
/// Every `get`/`set`/`delete` goes through the [`RetryPolicy`]; the backend is
/// resolved lazily on the first call and kept for the life of the store.
/// Cloning is cheap and clones share the backend.
///
/// Concurrent writers to one key are not serialized: the write that finishes
/// last wins.
#[derive(Clone)]
pub struct DurableKv {
    selector: Arc<BackendSelector>,
    policy: RetryPolicy,
}

fn check_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::validation("key must not be empty"));
    }
    Ok(())
}

fn record(operation: Operation, started: Instant, ok: bool) {
    let op = operation.as_str();
    STORAGE_OPS_TOTAL.with_label_values(&[op, if ok { "ok" } else { "error" }]).inc();
    STORAGE_OP_DURATION.with_label_values(&[op]).observe(started.elapsed().as_secs_f64());
}

impl DurableKv {
    pub fn new(config: BackendConfig, policy: RetryPolicy) -> Self {
        let selector = BackendSelector::new(config, policy.timeout());
        Self { selector: Arc::new(selector), policy }
    }

    pub fn from_config(cfg: &configs::AppConfig) -> Self {
        Self::new(BackendConfig::from(&cfg.storage), RetryPolicy::from(&cfg.retry))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Backend chosen so far; `None` until the first operation.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.selector.kind()
    }

    async fn backend(&self) -> Result<&Backend, StorageError> {
        self.selector.resolve().await
    }

    /// Read `key`. `Ok(None)` when absent.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        check_key(key)?;
        let started = Instant::now();
        let result = match self.backend().await {
            Ok(backend) => {
                let provider = &backend.provider;
                self.policy.run(Operation::Get, key, move || provider.get(key)).await
            }
            Err(e) => Err(e),
        };
        record(Operation::Get, started, result.is_ok());
        result
    }

    /// Read `key`, answering `default` when it is absent or cannot be read.
    pub async fn get_or(&self, key: &str, default: Value) -> Value {
        match self.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "storage read failed; using default");
                default
            }
        }
    }

    /// Typed read. A stored value of the wrong shape is a validation error.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::validation(format!("value at `{key}` has unexpected shape: {e}"))),
            None => Ok(None),
        }
    }

    /// Write `value`, replacing whatever `key` held.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        check_key(key)?;
        let started = Instant::now();
        let result = match self.backend().await {
            Ok(backend) => {
                let provider = &backend.provider;
                self.policy
                    .run(Operation::Set, key, move || provider.set(key, value.clone()))
                    .await
            }
            Err(e) => Err(e),
        };
        record(Operation::Set, started, result.is_ok());
        result
    }

    pub async fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StorageError::validation(format!("value for `{key}` is not serializable: {e}")))?;
        self.set(key, value).await
    }

    /// Remove `key`. Removing a missing key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        let started = Instant::now();
        let result = match self.backend().await {
            Ok(backend) => {
                let provider = &backend.provider;
                self.policy.run(Operation::Delete, key, move || provider.delete(key)).await
            }
            Err(e) => Err(e),
        };
        record(Operation::Delete, started, result.is_ok());
        result
    }

    /// All keys in the namespace. Advisory: any failure yields an empty list.
    pub async fn keys(&self) -> Vec<String> {
        let started = Instant::now();
        let backend = match self.backend().await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(error = %e, "storage backend unavailable; listing no keys");
                record(Operation::Keys, started, false);
                return Vec::new();
            }
        };
        let result = match tokio::time::timeout(self.policy.timeout(), backend.provider.keys()).await {
            Ok(Ok(mut keys)) => {
                keys.sort();
                Ok(keys)
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.policy.timeout())),
        };
        record(Operation::Keys, started, result.is_ok());
        result.unwrap_or_else(|e| {
            warn!(error = %e, "listing storage keys failed");
            Vec::new()
        })
    }
}

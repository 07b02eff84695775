use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use service::errors::{Operation, ProviderError, StorageError};
use service::storage::{
    BackendConfig, BackendKind, DurableKv, HostProbe, MemoryProvider, RetryPolicy, StaticHost, StorageProvider,
};
use uuid::Uuid;

fn tmp_file() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("kv_contract_{}.json", Uuid::new_v4()))
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(50), Duration::from_millis(1), Duration::from_millis(5))
}

/// Provider that fails every call and counts attempts.
#[derive(Default)]
struct BrokenProvider {
    calls: AtomicU32,
}

#[async_trait]
impl StorageProvider for BrokenProvider {
    async fn get(&self, _key: &str) -> Result<Option<Value>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Backend("quota exceeded".into()))
    }
    async fn set(&self, _key: &str, _value: Value) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Backend("quota exceeded".into()))
    }
    async fn delete(&self, _key: &str) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Backend("quota exceeded".into()))
    }
    async fn keys(&self) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Backend("quota exceeded".into()))
    }
}

/// Provider whose calls never complete.
struct HangingProvider;

#[async_trait]
impl StorageProvider for HangingProvider {
    async fn get(&self, _key: &str) -> Result<Option<Value>, ProviderError> {
        std::future::pending().await
    }
    async fn set(&self, _key: &str, _value: Value) -> Result<(), ProviderError> {
        std::future::pending().await
    }
    async fn delete(&self, _key: &str) -> Result<(), ProviderError> {
        std::future::pending().await
    }
    async fn keys(&self) -> Result<Vec<String>, ProviderError> {
        std::future::pending().await
    }
}

/// Host whose availability can be flipped mid-session.
struct ToggleHost {
    available: AtomicBool,
    provider: Arc<MemoryProvider>,
}

#[async_trait]
impl HostProbe for ToggleHost {
    async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(Some(self.provider.clone()))
        } else {
            Ok(None)
        }
    }
}

fn kv_over(provider: Arc<dyn StorageProvider>) -> DurableKv {
    let config = BackendConfig::local(tmp_file(), "sahaay").with_host(Arc::new(StaticHost::with_provider(provider)));
    DurableKv::new(config, fast_policy())
}

#[tokio::test]
async fn round_trip_overwrite_and_delete_on_local_fallback() -> anyhow::Result<()> {
    let file = tmp_file();
    let kv = DurableKv::new(BackendConfig::local(&file, "sahaay"), fast_policy());

    let values = [json!(null), json!(true), json!(3.5), json!("text"), json!([1, "two"]), json!({"a": {"b": [1]}})];
    for (i, v) in values.iter().enumerate() {
        let key = format!("value-{i}");
        kv.set(&key, v.clone()).await?;
        assert_eq!(kv.get(&key).await?, Some(v.clone()));
    }
    assert_eq!(kv.backend_kind(), Some(BackendKind::LocalFallback));

    kv.set("profile", json!({"name": "Asha", "lang": "hi"})).await?;
    kv.set("profile", json!({"theme": "dark"})).await?;
    assert_eq!(kv.get("profile").await?, Some(json!({"theme": "dark"})));

    kv.delete("never-written").await?;
    kv.delete("profile").await?;
    kv.delete("profile").await?;
    assert_eq!(kv.get_or("profile", json!({})).await, json!({}));

    let _ = tokio::fs::remove_file(&file).await;
    Ok(())
}

#[tokio::test]
async fn local_fallback_survives_a_new_store_instance() -> anyhow::Result<()> {
    let file = tmp_file();
    {
        let kv = DurableKv::new(BackendConfig::local(&file, "sahaay"), fast_policy());
        kv.set("chat-messages-chat-1700000000", json!([{"id": "m1", "content": "hi"}])).await?;
    }
    let kv = DurableKv::new(BackendConfig::local(&file, "sahaay"), fast_policy());
    assert!(kv.keys().await.contains(&"chat-messages-chat-1700000000".to_string()));
    assert_eq!(
        kv.get("chat-messages-chat-1700000000").await?,
        Some(json!([{"id": "m1", "content": "hi"}]))
    );
    let _ = tokio::fs::remove_file(&file).await;
    Ok(())
}

#[tokio::test]
async fn exhausted_set_fails_after_every_attempt() {
    let provider = Arc::new(BrokenProvider::default());
    let kv = kv_over(provider.clone());

    let err = kv.set("user-consents", json!({"dataProcessing": true})).await.unwrap_err();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    match err {
        StorageError::Exhausted { operation, key, attempts, .. } => {
            assert_eq!(operation, Operation::Set);
            assert_eq!(key, "user-consents");
            assert_eq!(attempts, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_get_uses_default_and_delete_propagates() {
    let provider = Arc::new(BrokenProvider::default());
    let kv = kv_over(provider.clone());

    assert_eq!(kv.get_or("groups", json!([])).await, json!([]));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    assert!(kv.get("groups").await.is_err());
    assert!(matches!(kv.delete("groups").await, Err(StorageError::Exhausted { .. })));
    assert!(kv.keys().await.is_empty());
}

#[tokio::test]
async fn hanging_backend_times_out_instead_of_blocking() {
    let kv = DurableKv::new(
        BackendConfig::local(tmp_file(), "sahaay").with_host(Arc::new(StaticHost::with_provider(Arc::new(HangingProvider)))),
        RetryPolicy::new(1, Duration::from_millis(20), Duration::from_millis(1), Duration::from_millis(1)),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), kv.set("k", json!(1)))
        .await
        .expect("set must conclude on its own")
        .unwrap_err();
    match err {
        StorageError::Exhausted { attempts, cause, .. } => {
            assert_eq!(attempts, 2);
            assert_eq!(cause, ProviderError::Timeout(Duration::from_millis(20)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(kv.get_or("k", json!("fallback")).await, json!("fallback"));
    assert!(kv.keys().await.is_empty());
}

#[tokio::test]
async fn backend_resolution_is_sticky() -> anyhow::Result<()> {
    let file = tmp_file();
    let host = Arc::new(ToggleHost { available: AtomicBool::new(false), provider: Arc::new(MemoryProvider::new()) });
    let kv = DurableKv::new(BackendConfig::local(&file, "sahaay").with_host(host.clone()), fast_policy());

    kv.set("a", json!(1)).await?;
    assert_eq!(kv.backend_kind(), Some(BackendKind::LocalFallback));

    host.available.store(true, Ordering::SeqCst);
    kv.set("b", json!(2)).await?;
    assert_eq!(kv.backend_kind(), Some(BackendKind::LocalFallback));
    assert!(host.provider.is_empty());
    assert_eq!(kv.keys().await, vec!["a".to_string(), "b".to_string()]);

    // clones share the resolved backend
    let clone = kv.clone();
    assert_eq!(clone.get("b").await?, Some(json!(2)));

    let _ = tokio::fs::remove_file(&file).await;
    Ok(())
}

#[tokio::test]
async fn host_provider_receives_unprefixed_keys() -> anyhow::Result<()> {
    let provider = Arc::new(MemoryProvider::new());
    let kv = kv_over(provider.clone());
    kv.set("ai-config", json!({"model": "gpt-4o-mini"})).await?;
    assert_eq!(provider.keys().await?, vec!["ai-config".to_string()]);
    assert_eq!(kv.backend_kind(), Some(BackendKind::HostBacked));
    Ok(())
}

#[tokio::test]
async fn unopenable_fallback_is_reported_as_unavailable() {
    // a directory cannot be used as the store file
    let dir = std::env::temp_dir().join(format!("kv_contract_dir_{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let kv = DurableKv::new(BackendConfig::local(&dir, "sahaay"), fast_policy());

    assert!(matches!(kv.set("k", json!(1)).await, Err(StorageError::Unavailable(_))));
    assert_eq!(kv.get_or("k", json!(0)).await, json!(0));
    assert!(kv.keys().await.is_empty());
    assert_eq!(kv.backend_kind(), None);
    let _ = std::fs::remove_dir_all(&dir);
}

/// Host whose availability check never answers.
struct SilentHost;

#[async_trait]
impl HostProbe for SilentHost {
    async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn silent_host_falls_back_to_local_instead_of_hanging() -> anyhow::Result<()> {
    let file = tmp_file();
    let policy = RetryPolicy::new(1, Duration::from_millis(20), Duration::from_millis(1), Duration::from_millis(1));
    let kv = DurableKv::new(BackendConfig::local(&file, "sahaay").with_host(Arc::new(SilentHost)), policy);

    let value = tokio::time::timeout(Duration::from_secs(2), kv.get_or("user-consents", json!({}))).await?;
    assert_eq!(value, json!({}));
    assert_eq!(kv.backend_kind(), Some(BackendKind::LocalFallback));

    tokio::time::timeout(Duration::from_secs(2), kv.set("k", json!(1))).await??;
    let keys = tokio::time::timeout(Duration::from_secs(2), kv.keys()).await?;
    assert_eq!(keys, vec!["k".to_string()]);

    let _ = tokio::fs::remove_file(&file).await;
    Ok(())
}

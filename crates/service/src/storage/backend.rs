use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::errors::{ProviderError, StorageError};
use crate::storage::json_map_store::JsonMapStore;
use crate::storage::provider::{HostProbe, StaticHost, StorageProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    HostBacked,
    LocalFallback,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::HostBacked => f.write_str("host"),
            BackendKind::LocalFallback => f.write_str("local-fallback"),
        }
    }
}

/// Where the store looks for a backend. Built once and handed to
/// [`super::DurableKv::new`].
#[derive(Clone)]
pub struct BackendConfig {
    pub host: Arc<dyn HostProbe>,
    pub fallback_file: PathBuf,
    pub namespace: String,
}

impl BackendConfig {
    /// Local fallback only; the host probe always reports absence.
    pub fn local<P: Into<PathBuf>>(fallback_file: P, namespace: impl Into<String>) -> Self {
        Self {
            host: Arc::new(StaticHost::absent()),
            fallback_file: fallback_file.into(),
            namespace: namespace.into(),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = host;
        self
    }
}

impl From<&configs::StorageConfig> for BackendConfig {
    fn from(cfg: &configs::StorageConfig) -> Self {
        Self::local(&cfg.data_file, cfg.namespace.clone())
    }
}

/// The provider chosen on first use.
#[derive(Clone)]
pub struct Backend {
    pub kind: BackendKind,
    pub provider: Arc<dyn StorageProvider>,
}

/// Resolves the backend exactly once; later calls reuse the first answer
/// even when host availability changes.
///
/// Asking the host and opening the fallback file are each bounded by
/// `step_timeout`.
pub struct BackendSelector {
    config: BackendConfig,
    step_timeout: Duration,
    resolved: OnceCell<Backend>,
}

impl BackendSelector {
    pub fn new(config: BackendConfig, step_timeout: Duration) -> Self {
        Self { config, step_timeout, resolved: OnceCell::new() }
    }

    pub fn kind(&self) -> Option<BackendKind> {
        self.resolved.get().map(|b| b.kind)
    }

    pub async fn resolve(&self) -> Result<&Backend, StorageError> {
        self.resolved.get_or_try_init(|| self.select()).await
    }

    async fn select(&self) -> Result<Backend, StorageError> {
        match timeout(self.step_timeout, self.config.host.probe()).await {
            Ok(Ok(Some(provider))) => {
                info!(backend = %BackendKind::HostBacked, "storage backend resolved");
                return Ok(Backend { kind: BackendKind::HostBacked, provider });
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "host storage check failed; treating host storage as absent");
            }
            Err(_) => {
                warn!(timeout = ?self.step_timeout, "host storage check timed out; treating host storage as absent");
            }
        }

        let opened = timeout(
            self.step_timeout,
            JsonMapStore::open(&self.config.fallback_file, &self.config.namespace),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout(self.step_timeout)));
        let store = opened.map_err(|e| {
            StorageError::Unavailable(format!(
                "cannot open local store {}: {e}",
                self.config.fallback_file.display()
            ))
        })?;
        info!(
            backend = %BackendKind::LocalFallback,
            path = %self.config.fallback_file.display(),
            namespace = %self.config.namespace,
            "storage backend resolved"
        );
        Ok(Backend { kind: BackendKind::LocalFallback, provider: store })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tmp_file() -> PathBuf {
        std::env::temp_dir().join(format!("backend_{}.json", uuid::Uuid::new_v4()))
    }

    struct CountingHost {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HostProbe for CountingHost {
        async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Arc::new(MemoryProvider::new())))
        }
    }

    struct FailingHost;

    #[async_trait]
    impl HostProbe for FailingHost {
        async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError> {
            Err(ProviderError::Backend("host bridge threw".into()))
        }
    }

    #[tokio::test]
    async fn host_provider_wins_and_is_checked_once() {
        let host = Arc::new(CountingHost { calls: AtomicU32::new(0) });
        let selector = BackendSelector::new(
            BackendConfig::local(tmp_file(), "sahaay").with_host(host.clone()),
            Duration::from_secs(1),
        );
        assert_eq!(selector.kind(), None);

        for _ in 0..3 {
            let backend = selector.resolve().await.unwrap();
            assert_eq!(backend.kind, BackendKind::HostBacked);
        }
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
        assert_eq!(selector.kind(), Some(BackendKind::HostBacked));
    }

    #[tokio::test]
    async fn failing_host_check_falls_back_to_local() {
        let file = tmp_file();
        let selector = BackendSelector::new(
            BackendConfig::local(&file, "sahaay").with_host(Arc::new(FailingHost)),
            Duration::from_secs(1),
        );
        let backend = selector.resolve().await.unwrap();
        assert_eq!(backend.kind, BackendKind::LocalFallback);
        let _ = tokio::fs::remove_file(&file).await;
    }

    struct SilentHost;

    #[async_trait]
    impl HostProbe for SilentHost {
        async fn probe(&self) -> Result<Option<Arc<dyn StorageProvider>>, ProviderError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn unanswered_host_check_times_out_to_local() {
        let file = tmp_file();
        let selector = BackendSelector::new(
            BackendConfig::local(&file, "sahaay").with_host(Arc::new(SilentHost)),
            Duration::from_millis(20),
        );
        let backend = timeout(Duration::from_secs(2), selector.resolve())
            .await
            .expect("resolution must not hang")
            .unwrap();
        assert_eq!(backend.kind, BackendKind::LocalFallback);
        let _ = tokio::fs::remove_file(&file).await;
    }

    #[test]
    fn config_conversion_uses_storage_section() {
        let cfg = configs::StorageConfig { data_file: "/tmp/x.json".into(), namespace: "ns".into() };
        let backend = BackendConfig::from(&cfg);
        assert_eq!(backend.fallback_file, PathBuf::from("/tmp/x.json"));
        assert_eq!(backend.namespace, "ns");
    }
}

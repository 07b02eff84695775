use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, sync::RwLock};
use tracing::warn;

use crate::errors::ProviderError;
use crate::storage::provider::StorageProvider;

/// JSON file-backed local fallback provider.
///
/// The file holds one flat map shared by every namespace, the way browser
/// local storage is shared by every script on a page. This store only sees
/// keys carrying its `<namespace>:` prefix and leaves other entries intact.
#[derive(Clone)]
pub struct JsonMapStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
    file_path: PathBuf,
    prefix: String,
}

impl JsonMapStore {
    /// Initialize the store from a path. Creates the file with an empty map if missing.
    ///
    /// A file that does not parse is renamed to `<file>.corrupt` and the store
    /// starts empty, so no entry from any namespace is overwritten in place.
    pub async fn open<P: Into<PathBuf>>(path: P, namespace: &str) -> Result<Arc<Self>, ProviderError> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let map: HashMap<String, Value> = match fs::read(&file_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    let backup = corrupt_path(&file_path);
                    fs::rename(&file_path, &backup).await?;
                    warn!(
                        path = %file_path.display(),
                        backup = %backup.display(),
                        error = %e,
                        "local store file unreadable; moved aside and starting empty"
                    );
                    write_empty(&file_path).await?
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => write_empty(&file_path).await?,
            Err(e) => return Err(e.into()),
        };

        Ok(Arc::new(Self {
            inner: Arc::new(RwLock::new(map)),
            file_path,
            prefix: format!("{namespace}:"),
        }))
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn save(&self, map: &HashMap<String, Value>) -> Result<(), ProviderError> {
        let data = serde_json::to_vec(map)?;
        // write-then-rename so a crash never leaves a truncated file behind
        let tmp = self.file_path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.file_path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the map, persist the copy, then swap it in.
    ///
    /// Runs on its own task, so a caller dropped on timeout cannot split memory
    /// from disk. `change` returns false when there is nothing to write.
    async fn commit<F>(&self, change: F) -> Result<(), ProviderError>
    where
        F: FnOnce(&mut HashMap<String, Value>) -> bool + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut map = this.inner.write().await;
            let mut next = map.clone();
            if !change(&mut next) {
                return Ok::<(), ProviderError>(());
            }
            this.save(&next).await?;
            *map = next;
            Ok::<(), ProviderError>(())
        })
        .await
        .map_err(|e| ProviderError::Backend(format!("local store write task failed: {e}")))?
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn corrupt_path(file_path: &Path) -> PathBuf {
    let mut name = file_path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

async fn write_empty(file_path: &Path) -> Result<HashMap<String, Value>, ProviderError> {
    let empty: HashMap<String, Value> = HashMap::new();
    fs::write(file_path, serde_json::to_vec(&empty)?).await?;
    Ok(empty)
}

#[async_trait]
impl StorageProvider for JsonMapStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, ProviderError> {
        let map = self.inner.read().await;
        Ok(map.get(&self.namespaced(key)).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), ProviderError> {
        let full_key = self.namespaced(key);
        self.commit(move |map| {
            map.insert(full_key, value);
            true
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        let full_key = self.namespaced(key);
        self.commit(move |map| map.remove(&full_key).is_some()).await
    }

    async fn keys(&self) -> Result<Vec<String>, ProviderError> {
        let map = self.inner.read().await;
        Ok(map
            .keys()
            .filter_map(|k| k.strip_prefix(&self.prefix))
            .map(str::to_string)
            .collect())
    }
}

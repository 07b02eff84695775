//! Environment/runtime helpers
//!
//! Sanity checks to ensure the local store has somewhere to live at startup.

use std::path::Path;

use tracing::{info, warn};

/// Ensure the parent directory of the local store file exists.
///
/// A store file that exists but is not a regular file is reported and
/// rejected; the fallback provider could never write to it.
pub async fn ensure_data_dir(data_file: &str) -> anyhow::Result<()> {
    let path = Path::new(data_file);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", parent.display()))?;
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) if !meta.is_file() => {
            warn!(%data_file, "store path exists but is not a file");
            Err(anyhow::anyhow!("{data_file} is not a regular file"))
        }
        Ok(_) => Ok(()),
        Err(_) => {
            info!(%data_file, "local store file not found; it will be created on first use");
            Ok(())
        }
    }
}

//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use vitals_store::{BootstrapAdmin, Storage, StorageOptions};

pub use vitals_store::config::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME, DEFAULT_DATA_DIR};

/// Build storage options from the global flags
pub fn storage_options(data_dir: PathBuf, admin_user: String, admin_password: String) -> StorageOptions {
    if admin_password == DEFAULT_ADMIN_PASSWORD {
        tracing::debug!("Using the default bootstrap admin password");
    }
    StorageOptions::new(data_dir).with_bootstrap(BootstrapAdmin::new(admin_user, admin_password))
}

/// Open storage, failing only if no backend can be opened at all
pub async fn open_storage(options: StorageOptions) -> Result<Arc<Storage>> {
    let data_dir = options.data_dir.clone();
    let storage = Storage::open(options)
        .await
        .with_context(|| format!("Failed to open storage in {}", data_dir.display()))?;
    Ok(Arc::new(storage))
}

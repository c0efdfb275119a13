//! Storage configuration
//!
//! [`StorageOptions`] says where things live on disk and which account to
//! bootstrap. [`ConfigStore`] holds the persisted backend selection
//! (`backend.json` in the data directory).

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use vitals_core::{BackendConfig, Result};

/// Data directory used when none is configured
pub const DEFAULT_DATA_DIR: &str = "data";

/// Embedded store file name inside the data directory
pub const EMBEDDED_FILE_NAME: &str = "vitals.redb";

/// Backend selection file name inside the data directory
pub const BACKEND_CONFIG_FILE_NAME: &str = "backend.json";

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Account created when a freshly opened backend has no administrator
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl BootstrapAdmin {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for BootstrapAdmin {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
    }
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub data_dir: PathBuf,
    pub bootstrap: BootstrapAdmin,
}

impl StorageOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            bootstrap: BootstrapAdmin::default(),
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapAdmin) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn embedded_path(&self) -> PathBuf {
        self.data_dir.join(EMBEDDED_FILE_NAME)
    }

    pub fn backend_config_path(&self) -> PathBuf {
        self.data_dir.join(BACKEND_CONFIG_FILE_NAME)
    }
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

/// Persisted backend selection, shared process-wide
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<BackendConfig>,
}

impl ConfigStore {
    /// Load the selection from `path`.
    ///
    /// A missing or unreadable file yields the embedded default; this never
    /// fails.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<BackendConfig>(&content) {
                Ok(config) => {
                    tracing::info!("Loaded backend config from {} ({})", path.display(), config.kind());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Ignoring unreadable backend config {}: {}; using embedded",
                        path.display(),
                        e
                    );
                    BackendConfig::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No backend config at {}, using embedded", path.display());
                BackendConfig::default()
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to read backend config {}: {}; using embedded",
                    path.display(),
                    e
                );
                BackendConfig::default()
            }
        };

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn current(&self) -> BackendConfig {
        self.current.read().await.clone()
    }

    /// Persist `config` and make it current.
    ///
    /// The file is replaced atomically; on error the previous file and the
    /// in-memory value are both unchanged.
    pub async fn save(&self, config: &BackendConfig) -> Result<()> {
        let mut current = self.current.write().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;

        // Set permissions on Unix (restrict to owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        *current = config.clone();
        tracing::info!("Saved backend config ({}) to {}", config.kind(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_core::{BackendKind, RelationalConfig};

    #[tokio::test]
    async fn test_missing_file_defaults_to_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join(BACKEND_CONFIG_FILE_NAME)).await;
        assert_eq!(store.current().await, BackendConfig::Embedded);
    }

    #[tokio::test]
    async fn test_garbage_file_defaults_to_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BACKEND_CONFIG_FILE_NAME);
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = ConfigStore::load(&path).await;
        assert_eq!(store.current().await.kind(), BackendKind::Embedded);
    }

    #[tokio::test]
    async fn test_save_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(BACKEND_CONFIG_FILE_NAME);
        let config = BackendConfig::Relational(RelationalConfig::new(
            "db.internal",
            3307,
            "vitals",
            "pw",
            "vitals",
        ));

        let store = ConfigStore::load(&path).await;
        store.save(&config).await.unwrap();
        assert_eq!(store.current().await, config);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains('\n'), "expected pretty JSON");
        assert!(content.contains("\"relational\""));

        let reloaded = ConfigStore::load(&path).await;
        assert_eq!(reloaded.current().await, config);
    }

    #[tokio::test]
    async fn test_legacy_type_names_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BACKEND_CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            r#"{"type":"mysql","host":"h","port":"3306","user":"u","password":"p","dbname":"d"}"#,
        )
        .await
        .unwrap();

        let store = ConfigStore::load(&path).await;
        match store.current().await {
            BackendConfig::Relational(cfg) => {
                assert_eq!(cfg.port, 3306);
                assert_eq!(cfg.database, "d");
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_option_paths() {
        let options = StorageOptions::new("/var/lib/vitals");
        assert_eq!(options.embedded_path(), PathBuf::from("/var/lib/vitals/vitals.redb"));
        assert_eq!(
            options.backend_config_path(),
            PathBuf::from("/var/lib/vitals/backend.json")
        );
        assert!(!format!("{:?}", options).contains(DEFAULT_ADMIN_PASSWORD));
    }
}

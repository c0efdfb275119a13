//! Storage facade
//!
//! Single entry point for everything above the storage layer. Holds the one
//! active backend behind a read/write lock: ordinary operations share the
//! read side, while backend switches, backups and restores take the write
//! side and so never overlap an in-flight call.

use crate::config::{BootstrapAdmin, ConfigStore, StorageOptions};
use crate::services::auth::hash_password;
use crate::storage::{self, RelationalStore};
use std::path::Path;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};
use vitals_core::{
    validate, BackendConfig, BackendKind, Credentials, DateRange, NewRecord, NewUser, Record,
    Result, Role, StorageBackend, StoreError, User,
};

struct Active {
    backend: Box<dyn StorageBackend>,
    config: BackendConfig,
}

pub struct Storage {
    active: RwLock<Active>,
    config: ConfigStore,
    options: StorageOptions,
}

impl Storage {
    /// Open the persisted backend and make sure it has an administrator.
    ///
    /// If a configured relational backend is unreachable, the embedded store
    /// is opened instead (the persisted selection is left alone). Fails only
    /// when no backend can be opened at all.
    pub async fn open(options: StorageOptions) -> Result<Self> {
        let config = ConfigStore::load(options.backend_config_path()).await;
        let selected = config.current().await;
        info!("Starting storage with {} backend", selected.kind());

        let embedded_path = options.embedded_path();
        let (backend, active_config) = match storage::connect(&selected, &embedded_path).await {
            Ok(backend) => (backend, selected),
            Err(e) if selected.kind() == BackendKind::Relational => {
                warn!("Relational backend unavailable ({}), falling back to embedded", e);
                let backend = storage::connect(&BackendConfig::Embedded, &embedded_path).await?;
                (backend, BackendConfig::Embedded)
            }
            Err(e) => return Err(e),
        };

        ensure_admin(backend.as_ref(), &options.bootstrap).await?;

        Ok(Self {
            active: RwLock::new(Active {
                backend,
                config: active_config,
            }),
            config,
            options,
        })
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    async fn backend(&self) -> RwLockReadGuard<'_, Active> {
        self.active.read().await
    }

    // User operations
    pub async fn create_user(&self, user: &NewUser) -> Result<User> {
        validate::new_user(user)?;
        self.backend().await.backend.create_user(user).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        self.backend().await.backend.get_user(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Credentials> {
        self.backend().await.backend.get_user_by_username(username).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.backend().await.backend.list_users().await
    }

    /// Delete a user together with all of their records
    pub async fn delete_user(&self, id: i64) -> Result<()> {
        self.backend().await.backend.delete_user(id).await
    }

    pub async fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()> {
        validate::password_hash(password_hash)?;
        self.backend()
            .await
            .backend
            .update_user_password(id, password_hash)
            .await
    }

    pub async fn update_user_role(&self, id: i64, role: Role) -> Result<()> {
        self.backend().await.backend.update_user_role(id, role).await
    }

    pub async fn count_admins(&self) -> Result<u64> {
        self.backend().await.backend.count_admins().await
    }

    // Record operations
    pub async fn create_record(&self, user_id: i64, record: &NewRecord) -> Result<Record> {
        validate::new_record(record)?;
        self.backend()
            .await
            .backend
            .create_record(user_id, record)
            .await
    }

    /// Fetch a record owned by `user_id`
    pub async fn get_record(&self, id: i64, user_id: i64) -> Result<Record> {
        self.backend().await.backend.get_record(id, user_id).await
    }

    /// Records of `user_id` within `range`, newest first
    pub async fn list_records(&self, user_id: i64, range: &DateRange) -> Result<Vec<Record>> {
        self.backend()
            .await
            .backend
            .list_records(user_id, range)
            .await
    }

    pub async fn delete_record(&self, id: i64, user_id: i64) -> Result<()> {
        self.backend().await.backend.delete_record(id, user_id).await
    }

    // Settings
    pub async fn get_setting(&self, key: &str) -> Result<String> {
        validate::setting_key(key)?;
        self.backend().await.backend.get_setting(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        validate::setting_key(key)?;
        self.backend().await.backend.set_setting(key, value).await
    }

    // Backend management

    /// Configuration of the backend currently serving calls
    pub async fn backend_config(&self) -> BackendConfig {
        self.backend().await.config.clone()
    }

    pub async fn backend_kind(&self) -> BackendKind {
        self.backend().await.backend.kind()
    }

    /// Check that `config` is reachable without switching to it
    pub async fn test_connection(&self, config: &BackendConfig) -> Result<()> {
        match config {
            BackendConfig::Embedded => Ok(()),
            BackendConfig::Relational(relational) => RelationalStore::ping(relational).await,
        }
    }

    /// Make `config` the active backend and persist the choice.
    ///
    /// The new backend is opened, bootstrapped and persisted before the old
    /// one is closed; if any of that fails the old backend keeps serving.
    pub async fn switch_backend(&self, config: BackendConfig) -> Result<()> {
        let mut active = self.active.write().await;
        info!(
            "Switching storage backend: {} -> {}",
            active.config.kind(),
            config.kind()
        );

        if active.config.kind() == BackendKind::Embedded && config.kind() == BackendKind::Embedded
        {
            return self.reopen_embedded(&mut active).await;
        }

        let mut candidate = storage::connect(&config, &self.options.embedded_path()).await?;

        let prepared = match ensure_admin(candidate.as_ref(), &self.options.bootstrap).await {
            Ok(()) => self.config.save(&config).await,
            Err(e) => Err(e),
        };
        if let Err(e) = prepared {
            error!("Backend switch aborted, keeping {}: {}", active.config.kind(), e);
            if let Err(close_err) = candidate.close().await {
                warn!("Failed to close abandoned backend: {}", close_err);
            }
            return Err(e);
        }

        let mut retired = std::mem::replace(
            &mut *active,
            Active {
                backend: candidate,
                config,
            },
        );
        if let Err(e) = retired.backend.close().await {
            warn!("Failed to close previous {} backend: {}", retired.config.kind(), e);
        }

        info!("Storage backend is now {}", active.config.kind());
        Ok(())
    }

    /// Embedded to embedded: the same file, so it must be released first.
    ///
    /// Once the file is reopened it serves calls even if bootstrapping or
    /// persisting the selection fails afterwards.
    async fn reopen_embedded(&self, active: &mut Active) -> Result<()> {
        active.backend.close().await?;
        active.backend =
            storage::connect(&BackendConfig::Embedded, &self.options.embedded_path())
                .await
                .map_err(|e| {
                    error!("Embedded store could not be reopened: {}", e);
                    e
                })?;
        active.config = BackendConfig::Embedded;

        let prepared = match ensure_admin(active.backend.as_ref(), &self.options.bootstrap).await {
            Ok(()) => self.config.save(&BackendConfig::Embedded).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &prepared {
            error!("Embedded store reopened, but the switch did not complete: {}", e);
        }
        prepared
    }

    /// Write a snapshot of the active backend to `dest`
    pub async fn backup(&self, dest: &Path) -> Result<()> {
        let active = self.active.write().await;
        info!("Backing up {} backend to {}", active.config.kind(), dest.display());
        active.backend.backup(dest).await
    }

    /// Replace the active backend's contents with the snapshot at `src`
    pub async fn restore(&self, src: &Path) -> Result<()> {
        let mut active = self.active.write().await;
        info!("Restoring {} backend from {}", active.config.kind(), src.display());
        active.backend.restore(src).await?;
        ensure_admin(active.backend.as_ref(), &self.options.bootstrap).await
    }

    /// Close the active backend. Later calls fail with `ConnectionFailed`
    /// (embedded) or a closed-pool error (relational).
    pub async fn close(&self) -> Result<()> {
        let mut active = self.active.write().await;
        active.backend.close().await
    }
}

/// Create (or promote) the bootstrap administrator if there is none
async fn ensure_admin(backend: &dyn StorageBackend, admin: &BootstrapAdmin) -> Result<()> {
    if backend.count_admins().await? > 0 {
        debug!("Administrator present, skipping bootstrap");
        return Ok(());
    }

    validate::username(&admin.username)?;
    let password_hash = hash_password(&admin.password)?;
    match backend
        .create_user(&NewUser::new(&admin.username, password_hash, Role::Admin))
        .await
    {
        Ok(user) => {
            info!("Created bootstrap administrator {}", user.username);
            Ok(())
        }
        Err(StoreError::Conflict(_)) => {
            let existing = backend.get_user_by_username(&admin.username).await?;
            warn!(
                "No administrator found, promoting existing user {}",
                existing.user.username
            );
            backend.update_user_role(existing.user.id, Role::Admin).await
        }
        Err(e) => Err(e),
    }
}

//! Embedded driver backed by a single redb file
//!
//! Layout:
//! - `users`: user id -> JSON user, including the credential hash
//! - `records`: record id -> JSON record
//! - `meta`: setting key -> raw value, plus `seq:<table>` id counters
//!
//! Ids come from the counters in `meta` and are assigned in the same write
//! transaction as the insert, so they are unique and never reused. redb
//! allows a single writer at a time, which serializes every check-then-write
//! below (username uniqueness, last-admin protection, cascading deletes).
//!
//! Every blocking task holds a read permit on the store's gate until it has
//! dropped its database handle, even when the caller stops waiting for it.
//! Backup, restore and close take the gate exclusively, so they never run
//! alongside a transaction.

use crate::backup;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadTransaction, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, error, info, warn};
use vitals_core::{
    BackendKind, Credentials, DateRange, NewRecord, NewUser, Record, Result, Role,
    StorageBackend, StoreError, User,
};

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const USER_SEQUENCE: &str = "seq:users";
const RECORD_SEQUENCE: &str = "seq:records";

/// User as persisted in the `users` table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    id: i64,
    username: String,
    password_hash: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl StoredUser {
    fn public(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

impl From<StoredUser> for Credentials {
    fn from(u: StoredUser) -> Self {
        Credentials {
            user: u.public(),
            password_hash: u.password_hash,
        }
    }
}

pub struct EmbeddedStore {
    path: PathBuf,
    db: Option<Arc<Database>>,
    gate: Arc<RwLock<()>>,
}

impl EmbeddedStore {
    /// Open (or create) the store file and its tables
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        info!("Opening embedded store at: {}", path.display());

        let db = blocking({
            let path = path.clone();
            move || open_database(&path)
        })
        .await?;

        Ok(Self {
            path,
            db: Some(Arc::new(db)),
            gate: Arc::new(RwLock::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.db.is_some()
    }

    fn handle(&self) -> Result<Arc<Database>> {
        self.db.clone().ok_or_else(|| {
            StoreError::ConnectionFailed(format!(
                "embedded store {} is closed",
                self.path.display()
            ))
        })
    }

    /// Handle plus a permit that keeps exclusive work out until it is dropped
    async fn lease(&self) -> Result<Lease> {
        let permit = self.gate.clone().read_owned().await;
        Ok(Lease {
            db: self.handle()?,
            _permit: permit,
        })
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTransaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let lease = self.lease().await?;
        blocking(move || {
            let txn = lease.db().begin_read().map_err(kv)?;
            f(&txn)
        })
        .await
    }

    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let lease = self.lease().await?;
        blocking(move || {
            let txn = lease.db().begin_write().map_err(kv)?;
            match f(&txn) {
                Ok(out) => {
                    txn.commit().map_err(kv)?;
                    Ok(out)
                }
                Err(e) => {
                    if let Err(abort) = txn.abort() {
                        warn!("Failed to abort write transaction: {}", abort);
                    }
                    Err(e)
                }
            }
        })
        .await
    }

    /// Drop the database, closing the file. Waits out in-flight tasks and
    /// refuses if anything else still holds the handle.
    async fn release(&mut self) -> Result<()> {
        let _exclusive = self.gate.write().await;
        let Some(db) = self.db.take() else {
            return Ok(());
        };
        match Arc::try_unwrap(db) {
            Ok(db) => {
                drop(db);
                Ok(())
            }
            Err(db) => {
                self.db = Some(db);
                Err(StoreError::Backend(format!(
                    "embedded store {} is still in use",
                    self.path.display()
                )))
            }
        }
    }

    /// Reopen whatever file is at `path`, leaving the store closed if that fails
    async fn reopen(&mut self) {
        let path = self.path.clone();
        match blocking(move || open_database(&path)).await {
            Ok(db) => self.db = Some(Arc::new(db)),
            Err(e) => error!(
                "Embedded store {} could not be reopened and stays closed: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[async_trait]
impl StorageBackend for EmbeddedStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    // User operations
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let user = user.clone();
        self.write(move |txn| {
            let mut users = txn.open_table(USERS).map_err(kv)?;
            if scan_users(&users)?
                .iter()
                .any(|u| u.username == user.username)
            {
                return Err(StoreError::Conflict(format!(
                    "username already exists: {}",
                    user.username
                )));
            }

            let mut meta = txn.open_table(META).map_err(kv)?;
            let id = next_id(&mut meta, USER_SEQUENCE)?;
            let stored = StoredUser {
                id: to_id(id)?,
                username: user.username,
                password_hash: user.password_hash,
                role: user.role,
                created_at: Utc::now(),
            };
            users.insert(id, encode(&stored)?.as_slice()).map_err(kv)?;

            debug!("Created user {} ({})", stored.username, stored.id);
            Ok(stored.public())
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<User> {
        self.read(move |txn| {
            let users = txn.open_table(USERS).map_err(kv)?;
            load_user(&users, id)?
                .map(|u| u.public())
                .ok_or_else(|| user_not_found(id))
        })
        .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Credentials> {
        let username = username.to_string();
        self.read(move |txn| {
            let users = txn.open_table(USERS).map_err(kv)?;
            scan_users(&users)?
                .into_iter()
                .find(|u| u.username == username)
                .map(Credentials::from)
                .ok_or_else(|| StoreError::not_found(format!("user {}", username)))
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.read(|txn| {
            let users = txn.open_table(USERS).map_err(kv)?;
            Ok(scan_users(&users)?.iter().map(StoredUser::public).collect())
        })
        .await
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        self.write(move |txn| {
            let mut users = txn.open_table(USERS).map_err(kv)?;
            let user = load_user(&users, id)?.ok_or_else(|| user_not_found(id))?;
            if user.role == Role::Admin && count_admins_in(&users)? <= 1 {
                return Err(StoreError::validation(
                    "cannot delete the last administrator",
                ));
            }

            let mut records = txn.open_table(RECORDS).map_err(kv)?;
            let owned = record_keys_of(&records, id)?;
            for key in &owned {
                records.remove(*key).map_err(kv)?;
            }
            users.remove(user_key(id)?).map_err(kv)?;

            debug!("Deleted user {} and {} records", id, owned.len());
            Ok(())
        })
        .await
    }

    async fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let password_hash = password_hash.to_string();
        self.write(move |txn| {
            let mut users = txn.open_table(USERS).map_err(kv)?;
            let mut user = load_user(&users, id)?.ok_or_else(|| user_not_found(id))?;
            user.password_hash = password_hash;
            users
                .insert(user_key(id)?, encode(&user)?.as_slice())
                .map_err(kv)?;
            Ok(())
        })
        .await
    }

    async fn update_user_role(&self, id: i64, role: Role) -> Result<()> {
        self.write(move |txn| {
            let mut users = txn.open_table(USERS).map_err(kv)?;
            let mut user = load_user(&users, id)?.ok_or_else(|| user_not_found(id))?;
            if user.role == Role::Admin && role != Role::Admin && count_admins_in(&users)? <= 1 {
                return Err(StoreError::validation(
                    "cannot demote the last administrator",
                ));
            }
            user.role = role;
            users
                .insert(user_key(id)?, encode(&user)?.as_slice())
                .map_err(kv)?;
            Ok(())
        })
        .await
    }

    async fn count_admins(&self) -> Result<u64> {
        self.read(|txn| {
            let users = txn.open_table(USERS).map_err(kv)?;
            count_admins_in(&users)
        })
        .await
    }

    // Record operations
    async fn create_record(&self, user_id: i64, record: &NewRecord) -> Result<Record> {
        let record = record.clone();
        self.write(move |txn| {
            let users = txn.open_table(USERS).map_err(kv)?;
            if load_user(&users, user_id)?.is_none() {
                return Err(user_not_found(user_id));
            }

            let mut meta = txn.open_table(META).map_err(kv)?;
            let id = next_id(&mut meta, RECORD_SEQUENCE)?;
            let recorded_at = record.recorded_at_or_now();
            let stored = record.into_record(to_id(id)?, user_id, recorded_at, Utc::now());

            let mut records = txn.open_table(RECORDS).map_err(kv)?;
            records.insert(id, encode(&stored)?.as_slice()).map_err(kv)?;
            Ok(stored)
        })
        .await
    }

    async fn get_record(&self, id: i64, user_id: i64) -> Result<Record> {
        self.read(move |txn| {
            let records = txn.open_table(RECORDS).map_err(kv)?;
            load_record(&records, id)?
                .filter(|r| r.user_id == user_id)
                .ok_or_else(|| record_not_found(id))
        })
        .await
    }

    async fn list_records(&self, user_id: i64, range: &DateRange) -> Result<Vec<Record>> {
        let range = *range;
        self.read(move |txn| {
            let records = txn.open_table(RECORDS).map_err(kv)?;
            let mut matching = Vec::new();
            for entry in records.iter().map_err(kv)? {
                let (_, value) = entry.map_err(kv)?;
                let record: Record = decode(value.value())?;
                if record.user_id == user_id && range.contains(record.date()) {
                    matching.push(record);
                }
            }
            matching.sort_by(|a, b| {
                b.recorded_at
                    .cmp(&a.recorded_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
            Ok(matching)
        })
        .await
    }

    async fn delete_record(&self, id: i64, user_id: i64) -> Result<()> {
        self.write(move |txn| {
            let mut records = txn.open_table(RECORDS).map_err(kv)?;
            match load_record(&records, id)? {
                Some(r) if r.user_id == user_id => {
                    records.remove(record_key(id)?).map_err(kv)?;
                    Ok(())
                }
                _ => Err(record_not_found(id)),
            }
        })
        .await
    }

    // Settings
    async fn get_setting(&self, key: &str) -> Result<String> {
        let key = key.to_string();
        self.read(move |txn| {
            let meta = txn.open_table(META).map_err(kv)?;
            let raw = meta
                .get(key.as_str())
                .map_err(kv)?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StoreError::not_found(format!("setting {}", key)))?;
            String::from_utf8(raw)
                .map_err(|e| StoreError::Serialization(format!("setting {}: {}", key, e)))
        })
        .await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.write(move |txn| {
            let mut meta = txn.open_table(META).map_err(kv)?;
            meta.insert(key.as_str(), value.as_bytes()).map_err(kv)?;
            Ok(())
        })
        .await
    }

    // Administration
    async fn backup(&self, dest: &Path) -> Result<()> {
        let exclusive = self.gate.clone().write_owned().await;
        self.handle()?;
        let source = self.path.clone();
        let dest = dest.to_path_buf();

        let written = blocking({
            let dest = dest.clone();
            move || {
                let _exclusive = exclusive;
                backup::write_snapshot(&source, &dest)
            }
        })
        .await?;

        info!("Backed up embedded store to {} ({} bytes)", dest.display(), written);
        Ok(())
    }

    async fn restore(&mut self, src: &Path) -> Result<()> {
        backup::check_source(src, &self.path)?;
        info!("Restoring embedded store from {}", src.display());

        self.release().await?;

        let store = self.path.clone();
        let source = src.to_path_buf();
        let staged = match blocking(move || backup::stage_restore(&store, &source)).await {
            Ok(staged) => staged,
            Err(e) => {
                error!("Restore failed before the store file was replaced: {}", e);
                self.reopen().await;
                return Err(e);
            }
        };

        let store = self.path.clone();
        match blocking(move || open_database(&store)).await {
            Ok(db) => {
                self.db = Some(Arc::new(db));
                if let Err(e) = blocking(move || staged.commit()).await {
                    warn!("Restore succeeded but the old store copy remains: {}", e);
                }
                info!("Restore complete");
                Ok(())
            }
            Err(e) => {
                error!("Restored file could not be opened, rolling back: {}", e);
                if let Err(rollback) = blocking(move || staged.rollback()).await {
                    error!("Failed to put the previous store file back: {}", rollback);
                }
                self.reopen().await;
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.db.is_some() {
            info!("Closing embedded store at {}", self.path.display());
        }
        self.release().await
    }
}

fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::create(path).map_err(|e| {
        StoreError::ConnectionFailed(format!("failed to open {}: {}", path.display(), e))
    })?;

    let txn = db.begin_write().map_err(kv)?;
    {
        txn.open_table(USERS).map_err(kv)?;
        txn.open_table(RECORDS).map_err(kv)?;
        txn.open_table(META).map_err(kv)?;
    }
    txn.commit().map_err(kv)?;

    Ok(db)
}

/// Database handle held by one blocking task.
///
/// Fields drop in order, so the handle is gone before the permit is returned.
struct Lease {
    db: Arc<Database>,
    _permit: OwnedRwLockReadGuard<()>,
}

impl Lease {
    fn db(&self) -> &Database {
        &self.db
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Backend(format!("storage task failed: {}", e)))?
}

fn kv<E: Into<redb::Error>>(e: E) -> StoreError {
    StoreError::Backend(e.into().to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn next_id(meta: &mut Table<&'static str, &'static [u8]>, sequence: &str) -> Result<u64> {
    let current = meta
        .get(sequence)
        .map_err(kv)?
        .map(|v| decode::<u64>(v.value()))
        .transpose()?
        .unwrap_or(0);
    let next = current + 1;
    meta.insert(sequence, encode(&next)?.as_slice())
        .map_err(kv)?;
    Ok(next)
}

fn to_id(key: u64) -> Result<i64> {
    i64::try_from(key).map_err(|_| StoreError::Backend(format!("id {} out of range", key)))
}

fn user_key(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| user_not_found(id))
}

fn record_key(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| record_not_found(id))
}

fn user_not_found(id: i64) -> StoreError {
    StoreError::not_found(format!("user {}", id))
}

fn record_not_found(id: i64) -> StoreError {
    StoreError::not_found(format!("record {}", id))
}

fn load_user<T>(users: &T, id: i64) -> Result<Option<StoredUser>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let Ok(key) = u64::try_from(id) else {
        return Ok(None);
    };
    users
        .get(key)
        .map_err(kv)?
        .map(|v| decode(v.value()))
        .transpose()
}

fn load_record<T>(records: &T, id: i64) -> Result<Option<Record>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let Ok(key) = u64::try_from(id) else {
        return Ok(None);
    };
    records
        .get(key)
        .map_err(kv)?
        .map(|v| decode(v.value()))
        .transpose()
}

fn scan_users<T>(users: &T) -> Result<Vec<StoredUser>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in users.iter().map_err(kv)? {
        let (_, value) = entry.map_err(kv)?;
        out.push(decode(value.value())?);
    }
    Ok(out)
}

fn count_admins_in<T>(users: &T) -> Result<u64>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    Ok(scan_users(users)?
        .iter()
        .filter(|u| u.role == Role::Admin)
        .count() as u64)
}

fn record_keys_of<T>(records: &T, user_id: i64) -> Result<Vec<u64>>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut keys = Vec::new();
    for entry in records.iter().map_err(kv)? {
        let (key, value) = entry.map_err(kv)?;
        let record: Record = decode(value.value())?;
        if record.user_id == user_id {
            keys.push(key.value());
        }
    }
    Ok(keys)
}

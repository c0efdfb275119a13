//! Storage port implemented by each backend driver

use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use vitals_types::{BackendKind, Credentials, DateRange, NewRecord, NewUser, Record, Role, User};

/// A storage backend
///
/// Exactly one implementation is active at a time, owned by the facade.
/// Methods taking `&mut self` (`close`, `restore`) are only reachable while
/// the facade holds its exclusive lock.
///
/// Contract shared by all drivers:
/// - usernames are unique (`Conflict` on duplicates)
/// - record reads and deletes check ownership (`NotFound` otherwise)
/// - deleting a user deletes all of that user's records
/// - the last administrator cannot be deleted or demoted (`ValidationFailed`)
/// - record listings are ordered by `recorded_at` descending
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    // Users
    async fn create_user(&self, user: &NewUser) -> Result<User>;
    async fn get_user(&self, id: i64) -> Result<User>;
    async fn get_user_by_username(&self, username: &str) -> Result<Credentials>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn delete_user(&self, id: i64) -> Result<()>;
    async fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()>;
    async fn update_user_role(&self, id: i64, role: Role) -> Result<()>;
    async fn count_admins(&self) -> Result<u64>;

    // Records
    async fn create_record(&self, user_id: i64, record: &NewRecord) -> Result<Record>;
    async fn get_record(&self, id: i64, user_id: i64) -> Result<Record>;
    async fn list_records(&self, user_id: i64, range: &DateRange) -> Result<Vec<Record>>;
    async fn delete_record(&self, id: i64, user_id: i64) -> Result<()>;

    // Settings
    async fn get_setting(&self, key: &str) -> Result<String>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;

    // Administration

    /// Write a point-in-time copy of the whole store to `dest`
    async fn backup(&self, dest: &Path) -> Result<()>;

    /// Replace the whole store with the copy at `src`.
    ///
    /// Must leave the backend open even when it fails.
    async fn restore(&mut self, src: &Path) -> Result<()>;

    /// Release the underlying connection or file handle
    async fn close(&mut self) -> Result<()>;
}

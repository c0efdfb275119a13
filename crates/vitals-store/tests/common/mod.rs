#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use vitals_store::services::auth::hash_password;
use vitals_store::{BootstrapAdmin, NewRecord, NewUser, Result, Role, Storage, StorageOptions, User};

pub const ADMIN: &str = "root";
pub const ADMIN_PASSWORD: &str = "admin123";

pub fn options(dir: &TempDir) -> StorageOptions {
    StorageOptions::new(dir.path()).with_bootstrap(BootstrapAdmin::new(ADMIN, ADMIN_PASSWORD))
}

/// Fresh embedded storage in a temporary data directory
pub async fn open_temp() -> Result<(TempDir, Storage)> {
    let dir = tempfile::tempdir()?;
    let storage = Storage::open(options(&dir)).await?;
    Ok((dir, storage))
}

pub async fn add_user(storage: &Storage, username: &str) -> Result<User> {
    let hash = hash_password("password1")?;
    storage
        .create_user(&NewUser::new(username, hash, Role::User))
        .await
}

pub fn at(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid test timestamp")
}

pub fn blood_pressure(systolic: i32, diastolic: i32, recorded_at: NaiveDateTime) -> NewRecord {
    NewRecord {
        systolic: Some(systolic),
        diastolic: Some(diastolic),
        heart_rate: Some(70),
        recorded_at: Some(recorded_at),
        ..Default::default()
    }
}

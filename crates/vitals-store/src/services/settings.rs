//! Idle-timeout policy stored in the settings table

use crate::facade::Storage;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use vitals_core::{Result, StoreError};

/// Settings key holding the timeout in minutes
pub const IDLE_TIMEOUT_KEY: &str = "idle_timeout";

/// Session idle timeout, in minutes. Zero (or unset) disables it.
pub struct IdleTimeout {
    storage: Arc<Storage>,
}

impl IdleTimeout {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Current timeout in minutes; 0 when unset
    pub async fn minutes(&self) -> Result<u32> {
        match self.storage.get_setting(IDLE_TIMEOUT_KEY).await {
            Ok(raw) => Ok(raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring malformed {} value {:?}", IDLE_TIMEOUT_KEY, raw);
                0
            })),
            Err(StoreError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    pub async fn set_minutes(&self, minutes: i64) -> Result<()> {
        if minutes < 0 {
            return Err(StoreError::validation("idle timeout cannot be negative"));
        }
        let minutes = u32::try_from(minutes)
            .map_err(|_| StoreError::validation("idle timeout is too large"))?;

        self.storage
            .set_setting(IDLE_TIMEOUT_KEY, &minutes.to_string())
            .await?;
        tracing::info!("Idle timeout set to {} minutes", minutes);
        Ok(())
    }

    /// Whether a session last active at `last_activity` has expired at `now`
    pub async fn is_expired(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        Ok(expired(self.minutes().await?, last_activity, now))
    }
}

fn expired(minutes: u32, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    minutes > 0 && now - last_activity > Duration::minutes(i64::from(minutes))
}

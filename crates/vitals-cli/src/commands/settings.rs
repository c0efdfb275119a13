//! Settings commands

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use vitals_store::{IdleTimeout, Storage};

pub async fn idle_timeout(storage: Arc<Storage>, minutes: Option<i64>) -> Result<()> {
    let idle = IdleTimeout::new(storage);

    if let Some(minutes) = minutes {
        idle.set_minutes(minutes).await?;
    }

    match idle.minutes().await? {
        0 => println!("Idle timeout: {}", "disabled".yellow()),
        n => println!("Idle timeout: {}", format!("{} minutes", n).cyan()),
    }
    Ok(())
}

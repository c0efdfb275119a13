//! Backup and restore commands

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use vitals_store::Storage;

use super::confirm;

pub async fn backup(storage: &Storage, path: &Path) -> Result<()> {
    println!("{}", format!("Backing up to {}...", path.display()).dimmed());
    storage.backup(path).await?;

    println!("{}", format!("Backup written to {}", path.display()).green());
    Ok(())
}

pub async fn restore(storage: &Storage, path: &Path, yes: bool) -> Result<()> {
    if !confirm(
        yes,
        format!(
            "Replace all current data with the snapshot at {}?",
            path.display()
        ),
    )? {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    storage.restore(path).await?;
    println!("{}", format!("Restored from {}", path.display()).green());
    Ok(())
}

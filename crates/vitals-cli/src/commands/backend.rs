//! Storage backend commands

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use vitals_store::{BackendConfig, BackendKind, RelationalConfig, Storage, DEFAULT_RELATIONAL_PORT};

use super::{confirm, password_or_prompt};

/// Backend to test or switch to
#[derive(Args, Debug)]
pub struct Target {
    /// embedded or relational (legacy names sqlite, bolt and mysql accepted)
    pub kind: String,
    /// Database server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = DEFAULT_RELATIONAL_PORT)]
    pub port: u16,
    /// Database user
    #[arg(long, default_value = "root")]
    pub user: String,
    /// Database password (optional - will prompt if not provided)
    #[arg(long, env = "VITALS_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Database name
    #[arg(long, default_value = "vitals")]
    pub database: String,
}

impl Target {
    fn kind(&self) -> Result<BackendKind> {
        match self.kind.parse() {
            Ok(kind) => Ok(kind),
            Err(_) => bail!(
                "Unknown backend '{}', expected embedded or relational",
                self.kind
            ),
        }
    }

    fn into_config(self) -> Result<BackendConfig> {
        match self.kind()? {
            BackendKind::Embedded => Ok(BackendConfig::Embedded),
            BackendKind::Relational => {
                let password = password_or_prompt(self.password, false)?;
                Ok(BackendConfig::Relational(RelationalConfig::new(
                    self.host,
                    self.port,
                    self.user,
                    password,
                    self.database,
                )))
            }
        }
    }
}

pub async fn show(storage: &Storage) -> Result<()> {
    println!("{}", "Storage backend".blue().bold());
    println!();

    match storage.backend_config().await {
        BackendConfig::Embedded => {
            println!("   Type: {}", "embedded".cyan());
            println!(
                "   File: {}",
                storage.options().embedded_path().display().to_string().dimmed()
            );
        }
        BackendConfig::Relational(cfg) => {
            println!("   Type:     {}", "relational".cyan());
            println!("   Server:   {}:{}", cfg.host, cfg.port);
            println!("   User:     {}", cfg.user);
            println!("   Database: {}", cfg.database);
        }
    }
    Ok(())
}

pub async fn test(storage: &Storage, target: Target) -> Result<()> {
    let config = target.into_config()?;
    println!("{}", format!("Testing {} backend...", config.kind()).dimmed());

    storage.test_connection(&config).await?;
    println!("{}", "Connection OK".green());
    Ok(())
}

pub async fn switch(storage: &Storage, target: Target, yes: bool) -> Result<()> {
    let config = target.into_config()?;
    let current = storage.backend_config().await;

    if !confirm(
        yes,
        format!("Switch storage from {} to {}?", current.kind(), config.kind()),
    )? {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    let kind = config.kind();
    storage.switch_backend(config).await?;
    println!("{}", format!("Now using the {} backend", kind).green());
    Ok(())
}

//! Vitals CLI
//!
//! Administration tool for the Vitals storage layer: accounts, health
//! records, backend selection, backup and restore.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vitals")]
#[command(author, version, about = "Vitals - health record storage administration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding the embedded store and backend.json
    #[arg(long, global = true, env = "VITALS_DATA_DIR", default_value = config::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Administrator created when the store has none
    #[arg(long, global = true, env = "VITALS_ADMIN_USER", default_value = config::DEFAULT_ADMIN_USERNAME)]
    admin_user: String,

    /// Password for the bootstrap administrator
    #[arg(
        long,
        global = true,
        env = "VITALS_ADMIN_PASSWORD",
        default_value = config::DEFAULT_ADMIN_PASSWORD,
        hide_default_value = true,
        hide_env_values = true
    )]
    admin_password: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Manage health records
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },

    /// Inspect or change the storage backend
    Backend {
        #[command(subcommand)]
        action: BackendAction,
    },

    /// Write a snapshot of the embedded store
    Backup {
        /// Destination file
        path: PathBuf,
    },

    /// Replace the embedded store with a snapshot
    Restore {
        /// Snapshot file
        path: PathBuf,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Application settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// List all users
    List,
    /// Create a user
    Add {
        username: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
        /// Password (optional - will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Delete a user and all of their records
    Delete {
        username: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Change a user's password
    Passwd {
        username: String,
        /// New password (optional - will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Set a user's role (user or admin)
    Role { username: String, role: String },
    /// Check a username and password
    Login {
        username: String,
        /// Password (optional - will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum RecordsAction {
    /// List a user's records, newest first
    List {
        username: String,
        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Add a record
    Add {
        username: String,
        #[command(flatten)]
        measurements: commands::records::Measurements,
    },
    /// Delete a record
    Delete { username: String, id: i64 },
}

#[derive(Subcommand)]
enum BackendAction {
    /// Show the active backend
    Show,
    /// Check that a backend is reachable
    Test {
        #[command(flatten)]
        target: commands::backend::Target,
    },
    /// Switch to another backend and remember the choice
    Switch {
        #[command(flatten)]
        target: commands::backend::Target,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show or set the session idle timeout in minutes (0 disables it)
    #[command(name = "idle-timeout")]
    IdleTimeout {
        #[arg(allow_negative_numbers = true)]
        minutes: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "vitals_cli=debug,vitals_store=debug"
    } else {
        "vitals_cli=info,vitals_store=info"
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    info!("Starting Vitals CLI");

    let options = config::storage_options(cli.data_dir, cli.admin_user, cli.admin_password);
    let storage = config::open_storage(options).await?;

    let result = match cli.command {
        Commands::Users { action } => match action {
            UsersAction::List => commands::users::list(&storage).await,
            UsersAction::Add {
                username,
                admin,
                password,
            } => commands::users::add(storage.clone(), &username, admin, password).await,
            UsersAction::Delete { username, yes } => {
                commands::users::delete(&storage, &username, yes).await
            }
            UsersAction::Passwd { username, password } => {
                commands::users::passwd(storage.clone(), &username, password).await
            }
            UsersAction::Role { username, role } => {
                commands::users::set_role(&storage, &username, &role).await
            }
            UsersAction::Login { username, password } => {
                commands::users::login(storage.clone(), &username, password).await
            }
        },
        Commands::Records { action } => match action {
            RecordsAction::List { username, from, to } => {
                commands::records::list(&storage, &username, from.as_deref(), to.as_deref()).await
            }
            RecordsAction::Add {
                username,
                measurements,
            } => commands::records::add(&storage, &username, measurements).await,
            RecordsAction::Delete { username, id } => {
                commands::records::delete(&storage, &username, id).await
            }
        },
        Commands::Backend { action } => match action {
            BackendAction::Show => commands::backend::show(&storage).await,
            BackendAction::Test { target } => commands::backend::test(&storage, target).await,
            BackendAction::Switch { target, yes } => {
                commands::backend::switch(&storage, target, yes).await
            }
        },
        Commands::Backup { path } => commands::backup::backup(&storage, &path).await,
        Commands::Restore { path, yes } => commands::backup::restore(&storage, &path, yes).await,
        Commands::Settings { action } => match action {
            SettingsAction::IdleTimeout { minutes } => {
                commands::settings::idle_timeout(storage.clone(), minutes).await
            }
        },
    };

    if let Err(e) = storage.close().await {
        error!("Failed to close storage: {}", e);
    }

    if let Err(ref e) = result {
        error!("Command failed: {}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    result
}

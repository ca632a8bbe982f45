//! Mail interception daemon.
//!
//! Starts a watcher for every active account and runs until interrupted.
//! Accounts, held messages, and heartbeats live in a shared SQLite
//! database; the dashboard process operates on the same file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mailscreen_core::account::CredentialVault;
use mailscreen_core::{
    AccountRepository, HeartbeatRepository, MessageRepository, WatcherConfig, WatcherSupervisor,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Watch mailboxes and quarantine inbound mail for review.
#[derive(Debug, Parser)]
#[command(name = "mailscreen", version, about)]
struct Args {
    /// Path to the SQLite database. Defaults to
    /// `<data dir>/mailscreen/mailscreen.db`.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Path to the vault key file. Created with a fresh random key on first
    /// run. Defaults to `<data dir>/mailscreen/vault.key`.
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Force polling even on servers that support IDLE.
    #[arg(long)]
    disable_idle: bool,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailscreen")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let dir = data_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating data directory {}", dir.display()))?;

    let database = args.database.unwrap_or_else(|| dir.join("mailscreen.db"));
    let database = database
        .to_str()
        .context("database path is not valid UTF-8")?;
    let key_file = args.key_file.unwrap_or_else(|| dir.join("vault.key"));

    let vault = Arc::new(CredentialVault::from_key_file(&key_file).context("opening vault key")?);
    let accounts = Arc::new(AccountRepository::new(database).await?);
    let messages = Arc::new(MessageRepository::new(database).await?);
    let heartbeats = Arc::new(HeartbeatRepository::new(database).await?);

    let config = WatcherConfig {
        disable_idle: args.disable_idle,
        ..WatcherConfig::default()
    };
    let supervisor = WatcherSupervisor::new(accounts, messages, heartbeats, vault, config);

    let started = supervisor.start_all_active().await?;
    info!(started, database, "mailscreen running");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    supervisor.shutdown().await;

    Ok(())
}

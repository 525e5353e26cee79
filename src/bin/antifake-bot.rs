use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use antifake_bot::{BotService, Config, MarketClient, Storage, TelegramClient};
use sqlx::SqlitePool;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

fn init_tracing(unbuffered: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if unbuffered {
        // stderr is unbuffered; every event reaches the stream as written
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// The pool needs the database file and its parent directory to exist.
fn prepare_data_paths(dir: &str, db_url: &str) -> Result<()> {
    if !dir.is_empty() {
        fs::create_dir_all(dir)?;
    }
    let db_path = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"));
    if let Some(db_path) = db_path {
        if let Some(parent) = Path::new(db_path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(?parent, error = %e, "failed to create database parent directory");
            }
        }
        if !Path::new(db_path).exists() {
            fs::File::create(db_path)?;
            info!(db_path, "created database file");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(DEFAULT_CONFIG_PATH)?;
    init_tracing(config.process.unbuffered_logs);
    info!(
        cache_writes_disabled = config.process.cache_writes_disabled,
        unbuffered_logs = config.process.unbuffered_logs,
        "starting antifake-bot"
    );

    prepare_data_paths(&config.data.dir, &config.data.db_url)?;

    let pool = SqlitePool::connect(&config.data.db_url).await?;
    let storage = Storage::new(pool.clone(), config.process.cache_writes_disabled).await?;
    info!("database ready");

    let market = MarketClient::new(
        config.market.dest.clone(),
        config.market.locale.clone(),
        Duration::from_secs(config.market.timeout_secs),
    )?;
    let telegram = TelegramClient::new(
        &config.telegram.api_url,
        &config.telegram.token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )?;

    let service = BotService::new(config, storage, market, telegram);
    let bot_handle = tokio::spawn(async move { service.run().await });

    match signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => warn!(error = %e, "unable to listen for shutdown signal"),
    }

    info!("shutting down");
    bot_handle.abort();
    pool.close().await;
    info!("shutdown complete");
    Ok(())
}

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::time::Duration;

use netpulse_affiliate::{Ledger, LedgerError, SettingsStore};
use sea_orm::{ConnectOptions, Database};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

const MAX_BACKOFF_EXP: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting affiliate ledger worker");

    let config = config::Config::from_env()?;
    tracing::info!(
        "Loaded configuration: interval={}s, retries={}, run_once={}",
        config.release_interval.as_secs(),
        config.max_retries,
        config.run_once
    );

    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);
    let db = Database::connect(opt).await?;

    let settings = SettingsStore::ensure_default(&db).await?;
    tracing::info!(
        "Affiliate program enabled={}, hold={} days",
        settings.enabled,
        settings.hold_days()
    );

    let ledger = Ledger::new(db);

    if config.run_once {
        let released = release_with_retry(&ledger, config.max_retries).await?;
        tracing::info!("Released {} commissions, exiting", released);
        return Ok(());
    }

    let mut interval = tokio::time::interval(config.release_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match release_with_retry(&ledger, config.max_retries).await {
                    Ok(0) => tracing::debug!("No commissions due for release"),
                    Ok(released) => tracing::info!("Released {} commissions", released),
                    Err(e) => tracing::error!("Commission release failed: {}", e),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping worker");
                break;
            }
        }
    }

    Ok(())
}

/// Runs one release pass, retrying the whole pass on database errors with
/// exponential backoff. Already released commissions are skipped on retry.
async fn release_with_retry(ledger: &Ledger, max_retries: u32) -> Result<u64, LedgerError> {
    let mut attempt = 0;
    loop {
        match ledger.release_held_commissions().await {
            Ok(released) => return Ok(released),
            Err(e @ LedgerError::Database(_)) if attempt < max_retries => {
                attempt += 1;
                let delay = Duration::from_secs(1 << attempt.min(MAX_BACKOFF_EXP));
                tracing::warn!(
                    "Release pass failed (attempt {}/{}), retrying in {}s: {}",
                    attempt,
                    max_retries,
                    delay.as_secs(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

//! slircd-services - standalone services core driver.
//!
//! Loads configuration and the snapshot, then runs the expiration sweep and
//! periodic saves until interrupted. No protocol layer is attached; queued
//! effects are logged.

use slircd_services::config::{Config, validation};
use slircd_services::state::Matrix;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "services.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "Failed to load config");
            e
        })?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        Config::default()
    };

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "configuration has {} error(s); see messages above",
            errors.len()
        ));
    }

    let db_path = config.database.path.clone();
    let save_every = Duration::from_secs(config.database.save_interval);
    let expire_every = Duration::from_secs(config.expire.interval);

    let mut matrix = Matrix::new(config);
    if Path::new(&db_path).exists() {
        matrix.load(&db_path).map_err(|e| {
            error!(path = %db_path, error = %e, "Failed to load snapshot");
            e
        })?;
    } else {
        info!(path = %db_path, "No snapshot found, starting empty");
    }

    info!(
        db = %db_path,
        expire_secs = expire_every.as_secs(),
        save_secs = save_every.as_secs(),
        "Starting slircd-services"
    );

    let mut expire_timer = tokio::time::interval(expire_every);
    let mut save_timer = tokio::time::interval(save_every);
    // Both fire immediately; skip that first tick.
    expire_timer.tick().await;
    save_timer.tick().await;

    loop {
        tokio::select! {
            _ = expire_timer.tick() => {
                let report = matrix.expire_check();
                if !report.is_empty() {
                    info!(
                        accounts = ?report.accounts,
                        nicks = ?report.nicks,
                        channels = ?report.channels,
                        "Expired records"
                    );
                }
                for effect in matrix.take_effects() {
                    info!(effect = ?effect, "Effect (no protocol layer attached)");
                }
            }
            _ = save_timer.tick() => {
                if let Err(e) = matrix.save(&db_path) {
                    error!(path = %db_path, error = %e, "Periodic save failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    matrix.save(&db_path).map_err(|e| {
        error!(path = %db_path, error = %e, "Final save failed");
        e
    })?;
    info!("Shutdown complete");
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

mod api;
mod cache;
mod config;
mod db;
mod provider;
mod touchdowns;

use api::AppState;
use cache::ResponseCache;
use config::{Command, Config};
use db::models::WeekKey;
use db::Database;
use provider::SportradarClient;
use touchdowns::{sync_season, sync_week};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match &config.command {
        Command::Serve { addr } => {
            let state = AppState {
                db,
                cache: ResponseCache::new(
                    Duration::from_secs(config.cache_ttl_secs),
                    config.cache_max_entries,
                ),
            };

            // Background sweep so idle keys don't linger past their TTL
            let cache = state.cache.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    let swept = cache.sweep_expired().await;
                    if swept > 0 {
                        debug!("Swept {} expired cache entries", swept);
                    }
                }
            });

            let app = api::router(state);
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("Invalid listen address {}", addr))?;
            info!("API listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::Sync {
            season,
            season_type,
            week,
        } => {
            let client = build_client(&config)?;
            let key = WeekKey::new(*season, *season_type, *week)?;
            let report = sync_week(&client, &db, key, &config.sync_options()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::SyncSeason {
            season,
            season_type,
        } => {
            let client = build_client(&config)?;
            let report =
                sync_season(&client, &db, *season, *season_type, &config.sync_options()).await?;
            if !report.failed.is_empty() {
                warn!("{} week(s) failed to sync", report.failed.len());
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn build_client(config: &Config) -> Result<SportradarClient> {
    SportradarClient::new(
        &config.sportradar_api_url,
        config.sportradar_api_key.as_deref().unwrap_or_default(),
        Duration::from_secs(config.http_timeout_secs),
        config.retry_policy(),
    )
}

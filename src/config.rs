use clap::{Parser, Subcommand};
use std::time::Duration;

use crate::db::models::SeasonType;
use crate::provider::RetryPolicy;
use crate::touchdowns::SyncOptions;

/// NFL touchdown aggregation service
#[derive(Parser, Debug, Clone)]
#[command(name = "nfl-touchdowns", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, global = true, env = "DATABASE_PATH", default_value = "touchdowns.db")]
    pub database_path: String,

    /// SportsRadar NFL API base URL
    #[arg(
        long,
        global = true,
        env = "SPORTRADAR_API_URL",
        default_value = "https://api.sportradar.us/nfl/official/trial/v7/en"
    )]
    pub sportradar_api_url: String,

    /// SportsRadar API key (required for syncing)
    #[arg(long, global = true, env = "SPORTRADAR_API_KEY", hide_env_values = true)]
    pub sportradar_api_key: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, global = true, env = "HTTP_TIMEOUT_SECS", default_value = "20")]
    pub http_timeout_secs: u64,

    /// Attempts per provider request when rate limited (including the first)
    #[arg(long, global = true, env = "RETRY_MAX_ATTEMPTS", default_value = "4")]
    pub retry_max_attempts: u32,

    /// Base backoff after a 429, doubled on each retry
    #[arg(long, global = true, env = "RETRY_BASE_DELAY_MS", default_value = "2000")]
    pub retry_base_delay_ms: u64,

    /// Ceiling on any single backoff
    #[arg(long, global = true, env = "RETRY_MAX_DELAY_MS", default_value = "30000")]
    pub retry_max_delay_ms: u64,

    /// Pause before the per-game requests of a week
    #[arg(long, global = true, env = "SYNC_INITIAL_DELAY_MS", default_value = "1000")]
    pub sync_initial_delay_ms: u64,

    /// Stagger between per-game fetches within a week
    #[arg(long, global = true, env = "SYNC_REQUEST_SPACING_MS", default_value = "1100")]
    pub sync_request_spacing_ms: u64,

    /// Lifetime of cached probability/prediction responses
    #[arg(long, global = true, env = "CACHE_TTL_SECS", default_value = "300")]
    pub cache_ttl_secs: u64,

    #[arg(long, global = true, env = "CACHE_MAX_ENTRIES", default_value = "64")]
    pub cache_max_entries: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the read API
    Serve {
        /// Listen address
        #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
        addr: String,
    },
    /// Sync a single week from the provider
    Sync {
        #[arg(long)]
        season: i32,
        /// PRE, REG or POST
        #[arg(long, default_value = "REG")]
        season_type: SeasonType,
        #[arg(long)]
        week: u32,
    },
    /// Sync every week of a season type
    SyncSeason {
        #[arg(long)]
        season: i32,
        #[arg(long, default_value = "REG")]
        season_type: SeasonType,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let syncing = matches!(
            self.command,
            Command::Sync { .. } | Command::SyncSeason { .. }
        );
        if syncing && self.sportradar_api_key.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("SPORTRADAR_API_KEY is required for sync commands");
        }
        if self.retry_max_attempts == 0 {
            anyhow::bail!("retry_max_attempts must be at least 1");
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms must not exceed retry_max_delay_ms");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        if self.cache_max_entries == 0 {
            anyhow::bail!("cache_max_entries must be positive");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: true,
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            initial_delay: Duration::from_millis(self.sync_initial_delay_ms),
            request_spacing: Duration::from_millis(self.sync_request_spacing_ms),
        }
    }
}

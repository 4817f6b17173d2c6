pub mod client;
pub mod payload;

pub use client::{RetryPolicy, SportradarClient};
pub use payload::{GameStatistics, PlayByPlay, ScheduledGame};

use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::WeekKey;

/// Trait every sports-statistics provider must implement.
///
/// Implementations return payloads already normalized by [`payload`], so
/// callers never see raw provider JSON.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Games scheduled for the given week. An empty list is a normal answer.
    async fn fetch_week_schedule(&self, week: &WeekKey) -> Result<Vec<ScheduledGame>>;

    /// Per-team, per-category player statistics for one game.
    async fn fetch_game_statistics(&self, game_id: &str) -> Result<GameStatistics>;

    /// Play-by-play feed for one game.
    async fn fetch_play_by_play(&self, game_id: &str) -> Result<PlayByPlay>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

//! Weekly sync job: fetch every game of a week, fold, persist.
//!
//! Per-game fetches run concurrently and are all allowed to settle; a game
//! that fails contributes nothing, and the week is persisted with whatever
//! succeeded. Folding happens afterwards, sequentially, in schedule order.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::aggregator::WeekAggregator;
use super::extractor::{extract_game, GameExtraction};
use crate::db::models::{SeasonType, WeekKey};
use crate::db::Database;
use crate::provider::{ScheduledGame, StatsProvider};

/// Pacing applied to one batch of provider requests.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Sleep before the first per-game request of the batch
    pub initial_delay: Duration,
    /// Game `i` starts `i × request_spacing` after the batch starts
    pub request_spacing: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub week: WeekKey,
    pub games_total: usize,
    /// Scheduled but not yet played; never fetched
    pub games_unplayed: usize,
    pub games_succeeded: usize,
    pub has_data: bool,
    pub total_touchdowns: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonReport {
    pub weeks: Vec<SyncReport>,
    /// Weeks that could not be synced, with the error message
    pub failed: Vec<(WeekKey, String)>,
}

async fn fetch_game(
    provider: &dyn StatsProvider,
    game: &ScheduledGame,
    start_after: Duration,
) -> Result<GameExtraction> {
    if !start_after.is_zero() {
        tokio::time::sleep(start_after).await;
    }

    let (stats, pbp) = tokio::join!(
        provider.fetch_game_statistics(&game.id),
        provider.fetch_play_by_play(&game.id),
    );
    let stats = stats.with_context(|| format!("statistics for game {}", game.id))?;

    // Statistics alone still count toward the week.
    let pbp = match pbp {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Play-by-play unavailable for game {}: {:#}", game.id, e);
            None
        }
    };

    Ok(extract_game(&stats, pbp.as_ref()))
}

/// Sync one week from the provider into the database.
pub async fn sync_week(
    provider: &dyn StatsProvider,
    db: &Database,
    week: WeekKey,
    opts: &SyncOptions,
) -> Result<SyncReport> {
    info!("Syncing {} from {}", week, provider.name());

    let schedule = provider
        .fetch_week_schedule(&week)
        .await
        .with_context(|| format!("Failed to fetch schedule for {}", week))?;

    let (unplayed, played): (Vec<&ScheduledGame>, Vec<&ScheduledGame>) =
        schedule.iter().partition(|g| g.is_unplayed());
    for game in &unplayed {
        debug!("Game {} is {}, not fetching", game.id, game.status);
    }

    let mut aggregator = WeekAggregator::new(week);

    if played.is_empty() {
        info!("No played games for {} ({} scheduled)", week, schedule.len());
    } else {
        if !opts.initial_delay.is_zero() {
            tokio::time::sleep(opts.initial_delay).await;
        }

        let fetches = played.iter().enumerate().map(|(i, game)| {
            fetch_game(provider, game, opts.request_spacing.saturating_mul(i as u32))
        });
        let results = join_all(fetches).await;

        for (game, result) in played.iter().zip(results) {
            match result {
                Ok(extraction) => aggregator.add_game(&extraction),
                Err(e) => warn!(
                    "Skipping game {} ({} @ {}): {:#}",
                    game.id, game.away.abbreviation, game.home.abbreviation, e
                ),
            }
        }
    }

    let games_succeeded = aggregator.games();
    let summary = aggregator.finish();
    let status = db.save_week(&summary)?;

    if games_succeeded < played.len() {
        warn!("{}: {}/{} games synced", week, games_succeeded, played.len());
    }
    info!(
        "{} synced: {}/{} played games, {} touchdowns across {} teams",
        week,
        games_succeeded,
        played.len(),
        summary.total_touchdowns,
        summary.teams.len()
    );

    Ok(SyncReport {
        week,
        games_total: schedule.len(),
        games_unplayed: unplayed.len(),
        games_succeeded,
        has_data: status.has_data,
        total_touchdowns: summary.total_touchdowns,
    })
}

/// Sync every week of a season type. A failing week is recorded and the
/// walk continues.
pub async fn sync_season(
    provider: &dyn StatsProvider,
    db: &Database,
    season: i32,
    season_type: SeasonType,
    opts: &SyncOptions,
) -> Result<SeasonReport> {
    let mut report = SeasonReport::default();

    for n in 1..=season_type.max_week() {
        let week = WeekKey::new(season, season_type, n)?;
        match sync_week(provider, db, week, opts).await {
            Ok(r) => report.weeks.push(r),
            Err(e) => {
                warn!("Sync failed for {}: {:#}", week, e);
                report.failed.push((week, format!("{:#}", e)));
            }
        }
    }

    info!(
        "{} {} season sync done: {} weeks ok, {} failed",
        season,
        season_type,
        report.weeks.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::payload::{parse_schedule, GameStatistics, PlayByPlay};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        schedule: Value,
        stats: HashMap<String, Value>,
        pbp: HashMap<String, Value>,
        /// Week numbers whose schedule request fails
        broken_weeks: HashSet<u32>,
        schedule_calls: AtomicU32,
    }

    #[async_trait]
    impl StatsProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_week_schedule(&self, week: &WeekKey) -> Result<Vec<ScheduledGame>> {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_weeks.contains(&week.week) {
                return Err(anyhow!("schedule unavailable"));
            }
            Ok(parse_schedule(&self.schedule))
        }

        async fn fetch_game_statistics(&self, game_id: &str) -> Result<GameStatistics> {
            self.stats
                .get(game_id)
                .map(|raw| GameStatistics::from_value(game_id, raw))
                .ok_or_else(|| anyhow!("no statistics for {}", game_id))
        }

        async fn fetch_play_by_play(&self, game_id: &str) -> Result<PlayByPlay> {
            self.pbp
                .get(game_id)
                .map(|raw| PlayByPlay::from_value(game_id, raw))
                .ok_or_else(|| anyhow!("no pbp for {}", game_id))
        }
    }

    fn week(n: u32) -> WeekKey {
        WeekKey::new(2024, SeasonType::Reg, n).unwrap()
    }

    fn two_game_provider() -> FakeProvider {
        let mut p = FakeProvider {
            schedule: json!({ "week": { "games": [
                { "id": "g1", "status": "closed",
                  "home": { "alias": "KC", "market": "Kansas City", "name": "Chiefs" },
                  "away": { "alias": "BAL", "market": "Baltimore", "name": "Ravens" } },
                { "id": "g2", "status": "closed",
                  "home": { "alias": "SF" }, "away": { "alias": "NYJ" } }
            ]}}),
            ..Default::default()
        };
        p.stats.insert(
            "g1".into(),
            json!({ "statistics": {
                "home": { "alias": "KC", "market": "Kansas City", "name": "Chiefs",
                    "receiving": { "players": [{ "id": "kelce", "name": "Travis Kelce", "touchdowns": 1 }] } },
                "away": { "alias": "BAL", "market": "Baltimore", "name": "Ravens",
                    "rushing": { "players": [{ "id": "henry", "name": "Derrick Henry", "touchdowns": 2 }] } }
            }}),
        );
        p.pbp.insert(
            "g1".into(),
            json!({ "periods": [{ "number": 1, "pbp": [{ "events": [{
                "description": "D.Henry 5 yard rush for a touchdown",
                "clock": "9:12",
                "statistics": [{ "stat_type": "rush", "touchdown": 1,
                    "player": { "id": "henry", "name": "Derrick Henry" }, "team": { "alias": "BAL" } }],
                "home_points": 0, "away_points": 6
            }]}]}]}),
        );
        p.stats.insert(
            "g2".into(),
            json!({ "statistics": {
                "home": { "alias": "SF",
                    "rushing": { "players": [{ "id": "cmc", "name": "Christian McCaffrey", "touchdowns": 1 }] } },
                "away": { "alias": "NYJ" }
            }}),
        );
        p
    }

    #[tokio::test]
    async fn test_sync_week_persists_all_games() {
        let db = Database::open(":memory:").unwrap();
        let provider = two_game_provider();

        let report = sync_week(&provider, &db, week(1), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.games_total, 2);
        assert_eq!(report.games_succeeded, 2);
        assert_eq!(report.total_touchdowns, 4);
        assert!(report.has_data);

        let stored = db.get_week(&week(1)).unwrap();
        assert_eq!(stored.total_touchdowns, 4);
        // NYJ had no player lines
        assert_eq!(stored.teams.len(), 3);
        assert_eq!(stored.first_scorers.len(), 1);
        assert_eq!(stored.first_scorers[0].player_id, "henry");
    }

    #[tokio::test]
    async fn test_failed_game_is_skipped() {
        let db = Database::open(":memory:").unwrap();
        let mut provider = two_game_provider();
        provider.stats.remove("g2");

        let report = sync_week(&provider, &db, week(1), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.games_succeeded, 1);
        assert_eq!(report.total_touchdowns, 3);
        assert!(db
            .get_week(&week(1))
            .unwrap()
            .teams
            .iter()
            .all(|t| t.record.team.abbreviation != "SF"));
    }

    #[tokio::test]
    async fn test_empty_week_marked_without_data() {
        let db = Database::open(":memory:").unwrap();
        let provider = FakeProvider {
            schedule: json!({ "week": { "games": [] } }),
            ..Default::default()
        };

        let report = sync_week(&provider, &db, week(3), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.games_total, 0);
        assert!(!report.has_data);
        let status = db.get_week_status(&week(3)).unwrap().unwrap();
        assert!(!status.has_data);
    }

    #[tokio::test]
    async fn test_unplayed_week_has_no_data() {
        let db = Database::open(":memory:").unwrap();
        let mut provider = FakeProvider {
            schedule: json!({ "week": { "games": [
                { "id": "g9", "status": "scheduled",
                  "home": { "alias": "KC" }, "away": { "alias": "BAL" } }
            ]}}),
            ..Default::default()
        };
        provider.stats.insert(
            "g9".into(),
            json!({ "statistics": { "home": { "alias": "KC" }, "away": { "alias": "BAL" } } }),
        );

        let report = sync_week(&provider, &db, week(4), &SyncOptions::default())
            .await
            .unwrap();
        assert!(!report.has_data);
        assert_eq!(report.games_unplayed, 1);
        assert_eq!(report.total_touchdowns, 0);
        assert!(db.team_weeks_played(2024, SeasonType::Reg).unwrap().is_empty());
        assert!(!db.get_week_status(&week(4)).unwrap().unwrap().has_data);
    }

    #[tokio::test]
    async fn test_closed_game_without_player_lines_has_no_data() {
        let db = Database::open(":memory:").unwrap();
        let mut provider = FakeProvider {
            schedule: json!({ "week": { "games": [
                { "id": "g9", "status": "closed",
                  "home": { "alias": "KC" }, "away": { "alias": "BAL" } }
            ]}}),
            ..Default::default()
        };
        provider.stats.insert(
            "g9".into(),
            json!({ "statistics": { "home": { "alias": "KC" }, "away": { "alias": "BAL" } } }),
        );

        let report = sync_week(&provider, &db, week(4), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.games_succeeded, 1);
        assert!(!report.has_data);
        assert!(db.team_weeks_played(2024, SeasonType::Reg).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let db = Database::open(":memory:").unwrap();
        let provider = two_game_provider();
        let opts = SyncOptions::default();

        sync_week(&provider, &db, week(1), &opts).await.unwrap();
        let first = db.get_week(&week(1)).unwrap();
        sync_week(&provider, &db, week(1), &opts).await.unwrap();
        let second = db.get_week(&week(1)).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_spacing_paces_games() {
        let db = Database::open(":memory:").unwrap();
        let provider = two_game_provider();
        let opts = SyncOptions {
            initial_delay: Duration::from_secs(1),
            request_spacing: Duration::from_secs(2),
        };

        let started = tokio::time::Instant::now();
        sync_week(&provider, &db, week(1), &opts).await.unwrap();
        // 1s initial delay, then the second game waits 2s
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_skipped_without_played_games() {
        let db = Database::open(":memory:").unwrap();
        let provider = FakeProvider {
            schedule: json!({ "week": { "games": [] } }),
            ..Default::default()
        };
        let opts = SyncOptions {
            initial_delay: Duration::from_secs(5),
            request_spacing: Duration::from_secs(1),
        };

        let started = tokio::time::Instant::now();
        sync_week(&provider, &db, week(2), &opts).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_season_continues_past_failed_week() {
        let db = Database::open(":memory:").unwrap();
        let mut provider = two_game_provider();
        provider.broken_weeks.insert(2);

        let report = sync_season(&provider, &db, 2024, SeasonType::Pre, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(provider.schedule_calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.weeks.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, week_pre(2));
    }

    fn week_pre(n: u32) -> WeekKey {
        WeekKey::new(2024, SeasonType::Pre, n).unwrap()
    }
}

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to apply schema")?;
        Ok(())
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    /// Persist a week's aggregation in one transaction.
    ///
    /// Every row is upserted on its natural key, so re-saving the same week
    /// converges instead of double-counting. The week row is marked
    /// `has_data = false` when no team produced statistics.
    pub fn save_week(&self, week: &WeekTouchdowns) -> Result<WeekSyncStatus> {
        let key = week.week;
        let status = WeekSyncStatus {
            week: key,
            has_data: week.has_data(),
            last_synced_at: Utc::now(),
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO nfl_touchdown_weeks (season, season_type, week, has_data, last_synced_at)
             VALUES (?1,?2,?3,?4,?5)
             ON CONFLICT(season, season_type, week) DO UPDATE SET
                has_data=excluded.has_data,
                last_synced_at=excluded.last_synced_at",
            params![
                key.season,
                key.season_type.as_str(),
                key.week,
                status.has_data,
                status.last_synced_at,
            ],
        )?;

        for summary in &week.teams {
            let t = &summary.record;
            tx.execute(
                "INSERT INTO nfl_team_touchdowns (
                    season, season_type, week, team_abbr, team_name, location, mascot,
                    total_touchdowns, reported_touchdowns
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
                 ON CONFLICT(season, season_type, week, team_abbr) DO UPDATE SET
                    team_name=excluded.team_name,
                    location=excluded.location,
                    mascot=excluded.mascot,
                    total_touchdowns=excluded.total_touchdowns,
                    reported_touchdowns=excluded.reported_touchdowns",
                params![
                    key.season,
                    key.season_type.as_str(),
                    key.week,
                    t.team.abbreviation,
                    t.team.name,
                    t.team.location,
                    t.team.mascot,
                    t.total_touchdowns,
                    t.reported_touchdowns,
                ],
            )?;

            for p in &summary.players {
                tx.execute(
                    "INSERT INTO nfl_player_touchdowns (
                        season, season_type, week, team_abbr, player_id, player_name, position,
                        rushing, receiving, passing, return_tds, defensive, total
                     ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
                     ON CONFLICT(season, season_type, week, team_abbr, player_id) DO UPDATE SET
                        player_name=excluded.player_name,
                        position=excluded.position,
                        rushing=excluded.rushing,
                        receiving=excluded.receiving,
                        passing=excluded.passing,
                        return_tds=excluded.return_tds,
                        defensive=excluded.defensive,
                        total=excluded.total",
                    params![
                        key.season,
                        key.season_type.as_str(),
                        key.week,
                        p.team_abbr,
                        p.player_id,
                        p.player_name,
                        p.position,
                        p.rushing,
                        p.receiving,
                        p.passing,
                        p.return_tds,
                        p.defensive,
                        p.total,
                    ],
                )?;
            }
        }

        for fs in &week.first_scorers {
            tx.execute(
                "INSERT INTO nfl_first_td_scorers (
                    game_id, team_abbr, season, season_type, week, player_id, player_name,
                    position, touchdown_type, quarter, clock, home_score, away_score
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
                 ON CONFLICT(game_id, team_abbr) DO UPDATE SET
                    season=excluded.season,
                    season_type=excluded.season_type,
                    week=excluded.week,
                    player_id=excluded.player_id,
                    player_name=excluded.player_name,
                    position=excluded.position,
                    touchdown_type=excluded.touchdown_type,
                    quarter=excluded.quarter,
                    clock=excluded.clock,
                    home_score=excluded.home_score,
                    away_score=excluded.away_score",
                params![
                    fs.game_id,
                    fs.team_abbr,
                    key.season,
                    key.season_type.as_str(),
                    key.week,
                    fs.player_id,
                    fs.player_name,
                    fs.position,
                    fs.touchdown_type.as_str(),
                    fs.quarter,
                    fs.clock,
                    fs.score.home,
                    fs.score.away,
                ],
            )?;
        }

        tx.commit().context("Failed to commit week")?;
        Ok(status)
    }

    /// Delete a week; team, player and first-scorer rows cascade.
    pub fn delete_week(&self, key: &WeekKey) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM nfl_touchdown_weeks WHERE season=?1 AND season_type=?2 AND week=?3",
            params![key.season, key.season_type.as_str(), key.week],
        )?;
        Ok(n > 0)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get_week_status(&self, key: &WeekKey) -> Result<Option<WeekSyncStatus>> {
        let conn = self.conn()?;
        let status = conn
            .query_row(
                "SELECT season, season_type, week, has_data, last_synced_at
                 FROM nfl_touchdown_weeks WHERE season=?1 AND season_type=?2 AND week=?3",
                params![key.season, key.season_type.as_str(), key.week],
                map_week_status,
            )
            .optional()?;
        Ok(status)
    }

    pub fn list_week_statuses(
        &self,
        season: i32,
        season_type: SeasonType,
    ) -> Result<Vec<WeekSyncStatus>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT season, season_type, week, has_data, last_synced_at
             FROM nfl_touchdown_weeks WHERE season=?1 AND season_type=?2 ORDER BY week",
        )?;
        let rows = stmt
            .query_map(params![season, season_type.as_str()], map_week_status)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Load a persisted week. A week never synced (or synced without data)
    /// comes back with no teams.
    pub fn get_week(&self, key: &WeekKey) -> Result<WeekTouchdowns> {
        let conn = self.conn()?;
        let args = params![key.season, key.season_type.as_str(), key.week];

        let mut stmt = conn.prepare(
            "SELECT season, season_type, week, team_abbr, team_name, location, mascot,
                    total_touchdowns, reported_touchdowns
             FROM nfl_team_touchdowns
             WHERE season=?1 AND season_type=?2 AND week=?3
             ORDER BY team_abbr",
        )?;
        let teams = stmt
            .query_map(args, map_team)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE season=?1 AND season_type=?2 AND week=?3 ORDER BY team_abbr, player_id",
            PLAYER_SELECT
        ))?;
        let mut players: HashMap<String, Vec<PlayerTouchdownRecord>> = HashMap::new();
        for p in stmt.query_map(args, map_player)? {
            let p = p?;
            players.entry(p.team_abbr.clone()).or_default().push(p);
        }

        let mut stmt = conn.prepare(&format!(
            "{} WHERE season=?1 AND season_type=?2 AND week=?3 ORDER BY game_id, team_abbr",
            FIRST_SCORER_SELECT
        ))?;
        let first_scorers = stmt
            .query_map(args, map_first_scorer)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut week = WeekTouchdowns::empty(*key);
        week.teams = teams
            .into_iter()
            .map(|record| TeamTouchdownSummary {
                players: players.remove(&record.team.abbreviation).unwrap_or_default(),
                record,
            })
            .collect();
        week.total_touchdowns = week.teams.iter().map(|t| t.record.total_touchdowns).sum();
        week.first_scorers = first_scorers;
        Ok(week)
    }

    /// Every weekly player row for a season/season-type.
    pub fn list_player_weeks(
        &self,
        season: i32,
        season_type: SeasonType,
    ) -> Result<Vec<PlayerTouchdownRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE season=?1 AND season_type=?2 ORDER BY team_abbr, player_id, week",
            PLAYER_SELECT
        ))?;
        let rows = stmt
            .query_map(params![season, season_type.as_str()], map_player)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// team abbreviation → number of weeks the team has a touchdown record.
    pub fn team_weeks_played(
        &self,
        season: i32,
        season_type: SeasonType,
    ) -> Result<HashMap<String, u32>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT team_abbr, COUNT(DISTINCT week) FROM nfl_team_touchdowns
             WHERE season=?1 AND season_type=?2 GROUP BY team_abbr",
        )?;
        let rows = stmt
            .query_map(params![season, season_type.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    pub fn list_first_scorers(
        &self,
        season: i32,
        season_type: SeasonType,
        week: Option<u32>,
    ) -> Result<Vec<FirstTouchdownScorerRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE season=?1 AND season_type=?2 AND (?3 IS NULL OR week=?3)
             ORDER BY week, game_id, team_abbr",
            FIRST_SCORER_SELECT
        ))?;
        let rows = stmt
            .query_map(params![season, season_type.as_str(), week], map_first_scorer)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const PLAYER_SELECT: &str = "SELECT season, season_type, week, team_abbr, player_id, player_name,
        position, rushing, receiving, passing, return_tds, defensive, total
 FROM nfl_player_touchdowns";

const FIRST_SCORER_SELECT: &str = "SELECT season, season_type, week, game_id, team_abbr,
        player_id, player_name, position, touchdown_type, quarter, clock, home_score, away_score
 FROM nfl_first_td_scorers";

/// Read (season, season_type, week) from the first three columns.
fn week_key(row: &rusqlite::Row) -> rusqlite::Result<WeekKey> {
    let season_type: String = row.get(1)?;
    let season_type = season_type.parse::<SeasonType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(WeekKey {
        season: row.get(0)?,
        season_type,
        week: row.get(2)?,
    })
}

fn map_week_status(row: &rusqlite::Row) -> rusqlite::Result<WeekSyncStatus> {
    Ok(WeekSyncStatus {
        week: week_key(row)?,
        has_data: row.get(3)?,
        last_synced_at: row.get(4)?,
    })
}

fn map_team(row: &rusqlite::Row) -> rusqlite::Result<TeamTouchdownRecord> {
    Ok(TeamTouchdownRecord {
        week: week_key(row)?,
        team: TeamInfo {
            abbreviation: row.get(3)?,
            name: row.get(4)?,
            location: row.get(5)?,
            mascot: row.get(6)?,
        },
        total_touchdowns: row.get(7)?,
        reported_touchdowns: row.get(8)?,
    })
}

fn map_player(row: &rusqlite::Row) -> rusqlite::Result<PlayerTouchdownRecord> {
    Ok(PlayerTouchdownRecord {
        week: week_key(row)?,
        team_abbr: row.get(3)?,
        player_id: row.get(4)?,
        player_name: row.get(5)?,
        position: row.get(6)?,
        rushing: row.get(7)?,
        receiving: row.get(8)?,
        passing: row.get(9)?,
        return_tds: row.get(10)?,
        defensive: row.get(11)?,
        total: row.get(12)?,
    })
}

fn map_first_scorer(row: &rusqlite::Row) -> rusqlite::Result<FirstTouchdownScorerRecord> {
    let touchdown_type: String = row.get(8)?;
    Ok(FirstTouchdownScorerRecord {
        week: week_key(row)?,
        game_id: row.get(3)?,
        team_abbr: row.get(4)?,
        player_id: row.get(5)?,
        player_name: row.get(6)?,
        position: row.get(7)?,
        touchdown_type: TouchdownType::parse(&touchdown_type),
        quarter: row.get(9)?,
        clock: row.get(10)?,
        score: ScoreSnapshot {
            home: row.get(11)?,
            away: row.get(12)?,
        },
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS nfl_touchdown_weeks (
    season          INTEGER NOT NULL,
    season_type     TEXT    NOT NULL,
    week            INTEGER NOT NULL,
    has_data        INTEGER NOT NULL DEFAULT 0,
    last_synced_at  TEXT    NOT NULL,
    PRIMARY KEY (season, season_type, week)
);

CREATE TABLE IF NOT EXISTS nfl_team_touchdowns (
    season              INTEGER NOT NULL,
    season_type         TEXT    NOT NULL,
    week                INTEGER NOT NULL,
    team_abbr           TEXT    NOT NULL,
    team_name           TEXT    NOT NULL,
    location            TEXT    NOT NULL DEFAULT '',
    mascot              TEXT    NOT NULL DEFAULT '',
    total_touchdowns    INTEGER NOT NULL DEFAULT 0,
    reported_touchdowns INTEGER,
    PRIMARY KEY (season, season_type, week, team_abbr),
    FOREIGN KEY (season, season_type, week)
        REFERENCES nfl_touchdown_weeks(season, season_type, week) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS nfl_player_touchdowns (
    season      INTEGER NOT NULL,
    season_type TEXT    NOT NULL,
    week        INTEGER NOT NULL,
    team_abbr   TEXT    NOT NULL,
    player_id   TEXT    NOT NULL,
    player_name TEXT    NOT NULL,
    position    TEXT,
    rushing     INTEGER NOT NULL DEFAULT 0 CHECK (rushing >= 0),
    receiving   INTEGER NOT NULL DEFAULT 0 CHECK (receiving >= 0),
    passing     INTEGER NOT NULL DEFAULT 0 CHECK (passing >= 0),
    return_tds  INTEGER NOT NULL DEFAULT 0 CHECK (return_tds >= 0),
    defensive   INTEGER NOT NULL DEFAULT 0 CHECK (defensive >= 0),
    total       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (season, season_type, week, team_abbr, player_id),
    FOREIGN KEY (season, season_type, week, team_abbr)
        REFERENCES nfl_team_touchdowns(season, season_type, week, team_abbr) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS nfl_first_td_scorers (
    game_id        TEXT    NOT NULL,
    team_abbr      TEXT    NOT NULL,
    season         INTEGER NOT NULL,
    season_type    TEXT    NOT NULL,
    week           INTEGER NOT NULL,
    player_id      TEXT    NOT NULL,
    player_name    TEXT    NOT NULL,
    position       TEXT,
    touchdown_type TEXT    NOT NULL,
    quarter        INTEGER NOT NULL,
    clock          TEXT    NOT NULL,
    home_score     INTEGER NOT NULL DEFAULT 0,
    away_score     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (game_id, team_abbr),
    FOREIGN KEY (season, season_type, week)
        REFERENCES nfl_touchdown_weeks(season, season_type, week) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_player_td_season ON nfl_player_touchdowns(season, season_type);
CREATE INDEX IF NOT EXISTS idx_first_td_season ON nfl_first_td_scorers(season, season_type, week);
"#;

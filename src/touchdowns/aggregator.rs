use std::collections::BTreeMap;
use tracing::warn;

use super::extractor::GameExtraction;
use crate::db::models::{
    FirstTouchdownScorerRecord, PlayerTouchdownRecord, TeamInfo, TeamTouchdownRecord,
    TeamTouchdownSummary, WeekKey, WeekTouchdowns,
};

/// Running totals for one team over the week.
#[derive(Debug, Clone)]
struct TeamAccumulator {
    team: TeamInfo,
    /// player_id → running record
    players: BTreeMap<String, PlayerTouchdownRecord>,
    reported_touchdowns: Option<u32>,
}

impl TeamAccumulator {
    fn new(team: TeamInfo) -> Self {
        TeamAccumulator {
            team,
            players: BTreeMap::new(),
            reported_touchdowns: None,
        }
    }

    fn player(
        &mut self,
        week: WeekKey,
        player_id: &str,
        player_name: &str,
        position: Option<&String>,
    ) -> &mut PlayerTouchdownRecord {
        let abbr = &self.team.abbreviation;
        let record = self.players.entry(player_id.to_string()).or_insert_with(|| {
            PlayerTouchdownRecord::empty(week, abbr, player_id, player_name, position.cloned())
        });
        if record.position.is_none() {
            record.position = position.cloned();
        }
        record
    }

    fn total(&self) -> u32 {
        self.players.values().map(|p| p.total).sum()
    }
}

/// Folds per-game extractions into per-team, per-player weekly totals.
///
/// Owned by a single sync call; games are folded one at a time.
#[derive(Debug, Clone)]
pub struct WeekAggregator {
    week: WeekKey,
    teams: BTreeMap<String, TeamAccumulator>,
    first_scorers: Vec<FirstTouchdownScorerRecord>,
    games: usize,
}

impl WeekAggregator {
    pub fn new(week: WeekKey) -> Self {
        WeekAggregator {
            week,
            teams: BTreeMap::new(),
            first_scorers: Vec::new(),
            games: 0,
        }
    }

    /// Number of games folded so far.
    pub fn games(&self) -> usize {
        self.games
    }

    pub fn add_game(&mut self, game: &GameExtraction) {
        let week = self.week;
        self.games += 1;

        for extraction in &game.teams {
            let abbr = extraction.team.abbreviation.clone();
            let acc = self
                .teams
                .entry(abbr)
                .or_insert_with(|| TeamAccumulator::new(extraction.team.clone()));

            for p in &extraction.participants {
                acc.player(week, &p.player_id, &p.player_name, p.position.as_ref());
            }
            for inc in &extraction.increments {
                acc.player(week, &inc.player_id, &inc.player_name, inc.position.as_ref())
                    .add(inc.category, inc.count);
            }
            if let Some(reported) = extraction.reported_touchdowns {
                acc.reported_touchdowns = Some(acc.reported_touchdowns.unwrap_or(0) + reported);
            }
        }

        for fs in &game.first_scorers {
            // One record per (game, team); extractor already guarantees it.
            if self
                .first_scorers
                .iter()
                .any(|r| r.game_id == game.game_id && r.team_abbr == fs.team_abbr)
            {
                continue;
            }
            self.first_scorers.push(FirstTouchdownScorerRecord {
                game_id: game.game_id.clone(),
                week,
                team_abbr: fs.team_abbr.clone(),
                player_id: fs.player_id.clone(),
                player_name: fs.player_name.clone(),
                position: fs.position.clone(),
                touchdown_type: fs.touchdown_type,
                quarter: fs.quarter,
                clock: fs.clock.clone(),
                score: fs.score,
            });
        }
    }

    /// Finalize team totals. Each team total is the sum of its players'
    /// totals; a differing scoreboard total is logged and kept alongside.
    pub fn finish(self) -> WeekTouchdowns {
        let week = self.week;
        let teams: Vec<TeamTouchdownSummary> = self
            .teams
            .into_values()
            .map(|acc| {
                let total = acc.total();
                if let Some(reported) = acc.reported_touchdowns {
                    if reported != total {
                        warn!(
                            "Touchdown mismatch for {} in {}: scoreboard={} summed players={}",
                            acc.team.abbreviation, week, reported, total
                        );
                    }
                }
                TeamTouchdownSummary {
                    record: TeamTouchdownRecord {
                        week,
                        team: acc.team,
                        total_touchdowns: total,
                        reported_touchdowns: acc.reported_touchdowns,
                    },
                    players: acc.players.into_values().collect(),
                }
            })
            .collect();

        let total_touchdowns = teams.iter().map(|t| t.record.total_touchdowns).sum();
        WeekTouchdowns {
            week,
            teams,
            first_scorers: self.first_scorers,
            total_touchdowns,
        }
    }
}

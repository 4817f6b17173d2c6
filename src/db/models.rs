use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejected query/CLI parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing required parameter '{0}'")]
    Missing(&'static str),
    #[error("invalid value '{value}' for parameter '{name}'")]
    Invalid { name: &'static str, value: String },
    #[error("unknown season type '{0}' (expected PRE, REG or POST)")]
    UnknownSeasonType(String),
    #[error("week {week} is out of range for {season_type} (1..={max})")]
    WeekOutOfRange {
        season_type: SeasonType,
        week: u32,
        max: u32,
    },
}

/// Partition of an NFL season. Week numbering restarts in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeasonType {
    #[serde(rename = "PRE")]
    Pre,
    #[serde(rename = "REG")]
    Reg,
    #[serde(rename = "POST")]
    Post,
}

impl SeasonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonType::Pre => "PRE",
            SeasonType::Reg => "REG",
            SeasonType::Post => "POST",
        }
    }

    /// Highest week number the league schedules for this season type.
    pub fn max_week(&self) -> u32 {
        match self {
            SeasonType::Pre => 3,
            SeasonType::Reg => 18,
            SeasonType::Post => 5,
        }
    }
}

impl fmt::Display for SeasonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeasonType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRE" => Ok(SeasonType::Pre),
            "REG" => Ok(SeasonType::Reg),
            "POST" | "PST" => Ok(SeasonType::Post),
            _ => Err(ParamError::UnknownSeasonType(s.to_string())),
        }
    }
}

/// (season, season type, week): the natural key every weekly record hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekKey {
    pub season: i32,
    pub season_type: SeasonType,
    pub week: u32,
}

impl WeekKey {
    pub fn new(season: i32, season_type: SeasonType, week: u32) -> Result<Self, ParamError> {
        let max = season_type.max_week();
        if week == 0 || week > max {
            return Err(ParamError::WeekOutOfRange {
                season_type,
                week,
                max,
            });
        }
        Ok(WeekKey {
            season,
            season_type,
            week,
        })
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} week {}", self.season, self.season_type, self.week)
    }
}

/// The five mutually exclusive buckets a touchdown is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchdownCategory {
    Rushing,
    Receiving,
    Passing,
    Return,
    Defensive,
}

impl TouchdownCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TouchdownCategory::Rushing => "rushing",
            TouchdownCategory::Receiving => "receiving",
            TouchdownCategory::Passing => "passing",
            TouchdownCategory::Return => "return",
            TouchdownCategory::Defensive => "defensive",
        }
    }
}

/// Touchdown classification for a first-scorer record. `Unknown` is used when
/// the play resolved a scorer but not the kind of score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchdownType {
    Rushing,
    Receiving,
    Passing,
    Return,
    Defensive,
    Unknown,
}

impl TouchdownType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TouchdownType::Rushing => "rushing",
            TouchdownType::Receiving => "receiving",
            TouchdownType::Passing => "passing",
            TouchdownType::Return => "return",
            TouchdownType::Defensive => "defensive",
            TouchdownType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "rushing" => TouchdownType::Rushing,
            "receiving" => TouchdownType::Receiving,
            "passing" => TouchdownType::Passing,
            "return" => TouchdownType::Return,
            "defensive" => TouchdownType::Defensive,
            _ => TouchdownType::Unknown,
        }
    }
}

/// Team identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInfo {
    /// Uppercase 2–4 letter abbreviation, e.g. "KC"
    pub abbreviation: String,
    /// Display name, e.g. "Kansas City Chiefs"
    pub name: String,
    pub location: String,
    pub mascot: String,
}

impl TeamInfo {
    pub fn new(abbreviation: &str, location: &str, mascot: &str) -> Self {
        let name = match (location.is_empty(), mascot.is_empty()) {
            (false, false) => format!("{} {}", location, mascot),
            (true, false) => mascot.to_string(),
            (false, true) => location.to_string(),
            (true, true) => abbreviation.to_uppercase(),
        };
        TeamInfo {
            abbreviation: abbreviation.to_uppercase(),
            name,
            location: location.to_string(),
            mascot: mascot.to_string(),
        }
    }
}

/// One team's touchdown tally for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTouchdownRecord {
    pub week: WeekKey,
    pub team: TeamInfo,
    /// Always the sum of the team's player totals
    pub total_touchdowns: u32,
    /// Scoreboard total from the provider, kept for data-quality comparison
    pub reported_touchdowns: Option<u32>,
}

/// One player's touchdown breakdown for one team and week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTouchdownRecord {
    pub week: WeekKey,
    pub team_abbr: String,
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
    pub rushing: u32,
    pub receiving: u32,
    pub passing: u32,
    #[serde(rename = "return")]
    pub return_tds: u32,
    pub defensive: u32,
    pub total: u32,
}

impl PlayerTouchdownRecord {
    pub fn empty(
        week: WeekKey,
        team_abbr: &str,
        player_id: &str,
        player_name: &str,
        position: Option<String>,
    ) -> Self {
        PlayerTouchdownRecord {
            week,
            team_abbr: team_abbr.to_string(),
            player_id: player_id.to_string(),
            player_name: player_name.to_string(),
            position,
            rushing: 0,
            receiving: 0,
            passing: 0,
            return_tds: 0,
            defensive: 0,
            total: 0,
        }
    }

    /// Add `count` to one bucket and re-derive `total`.
    pub fn add(&mut self, category: TouchdownCategory, count: u32) {
        let bucket = match category {
            TouchdownCategory::Rushing => &mut self.rushing,
            TouchdownCategory::Receiving => &mut self.receiving,
            TouchdownCategory::Passing => &mut self.passing,
            TouchdownCategory::Return => &mut self.return_tds,
            TouchdownCategory::Defensive => &mut self.defensive,
        };
        *bucket = bucket.saturating_add(count);
        self.total = self.rushing + self.receiving + self.passing + self.return_tds + self.defensive;
    }
}

/// Home/away score at the moment of a touchdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub home: u32,
    pub away: u32,
}

/// First player on a team to score a touchdown in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstTouchdownScorerRecord {
    pub game_id: String,
    pub week: WeekKey,
    pub team_abbr: String,
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
    pub touchdown_type: TouchdownType,
    pub quarter: u32,
    pub clock: String,
    pub score: ScoreSnapshot,
}

/// Whether a week was synced and whether it yielded statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSyncStatus {
    pub week: WeekKey,
    pub has_data: bool,
    pub last_synced_at: DateTime<Utc>,
}

/// A team's tally together with its players, as served and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTouchdownSummary {
    #[serde(flatten)]
    pub record: TeamTouchdownRecord,
    pub players: Vec<PlayerTouchdownRecord>,
}

/// Everything a week sync produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekTouchdowns {
    pub week: WeekKey,
    pub teams: Vec<TeamTouchdownSummary>,
    pub first_scorers: Vec<FirstTouchdownScorerRecord>,
    pub total_touchdowns: u32,
}

impl WeekTouchdowns {
    pub fn empty(week: WeekKey) -> Self {
        WeekTouchdowns {
            week,
            teams: vec![],
            first_scorers: vec![],
            total_touchdowns: 0,
        }
    }

    /// True once any player line was seen. Unplayed games report team
    /// identities with no players and don't count.
    pub fn has_data(&self) -> bool {
        self.teams.iter().any(|t| !t.players.is_empty())
    }
}

/// Smoothed likelihood that a player scores in a given week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTouchdownProbability {
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
    pub team_abbr: String,
    /// Weeks with at least one touchdown (S)
    pub weeks_with_touchdown: u32,
    /// Weeks the player's team played (W)
    pub team_games_played: u32,
    pub total_touchdowns: u32,
    /// Percent, two decimals
    pub probability: f64,
}

/// One candidate in a team's "who scores first" ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstScorerCandidate {
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
    pub first_touchdowns: u32,
    pub first_scorer_frequency: f64,
    pub weekly_probability: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstScorerPrediction {
    pub team_abbr: String,
    pub team_games_played: u32,
    pub top: Option<FirstScorerCandidate>,
    pub candidates: Vec<FirstScorerCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_type_parse() {
        assert_eq!("reg".parse::<SeasonType>(), Ok(SeasonType::Reg));
        assert_eq!("POST".parse::<SeasonType>(), Ok(SeasonType::Post));
        assert!("playoffs".parse::<SeasonType>().is_err());
    }

    #[test]
    fn test_week_key_bounds() {
        assert!(WeekKey::new(2024, SeasonType::Pre, 3).is_ok());
        assert!(WeekKey::new(2024, SeasonType::Pre, 4).is_err());
        assert!(WeekKey::new(2024, SeasonType::Reg, 18).is_ok());
        assert!(WeekKey::new(2024, SeasonType::Post, 6).is_err());
        assert_eq!(
            WeekKey::new(2024, SeasonType::Reg, 0),
            Err(ParamError::WeekOutOfRange {
                season_type: SeasonType::Reg,
                week: 0,
                max: 18
            })
        );
    }

    #[test]
    fn test_player_add_recomputes_total() {
        let week = WeekKey::new(2024, SeasonType::Reg, 1).unwrap();
        let mut p = PlayerTouchdownRecord::empty(week, "KC", "p1", "Isiah Pacheco", None);
        p.add(TouchdownCategory::Rushing, 2);
        p.add(TouchdownCategory::Receiving, 1);
        p.add(TouchdownCategory::Rushing, 0);
        assert_eq!(p.rushing, 2);
        assert_eq!(p.total, 3);
        assert_eq!(
            p.total,
            p.rushing + p.receiving + p.passing + p.return_tds + p.defensive
        );
    }

    #[test]
    fn test_team_info_display_name() {
        let t = TeamInfo::new("kc", "Kansas City", "Chiefs");
        assert_eq!(t.abbreviation, "KC");
        assert_eq!(t.name, "Kansas City Chiefs");
        assert_eq!(TeamInfo::new("NYJ", "", "").name, "NYJ");
    }
}

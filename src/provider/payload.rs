//! Ingestion-time normalization of provider payloads.
//!
//! Provider JSON is loosely shaped: numbers arrive as strings, arrays go
//! missing, categories are sometimes wrapped in `{ "players": [...] }` and
//! sometimes bare. Everything is normalized here, once, into plain structs
//! whose fields always exist. Missing or negative counts become 0, missing
//! arrays become empty. Nothing in this module returns an error.

use serde_json::Value;

use crate::db::models::{ScoreSnapshot, TeamInfo, TouchdownCategory};

// ── Numeric helpers ──────────────────────────────────────────────────────────

/// Read a count that may be a number or a numeric string. Negative or
/// unparseable values read as `None`/0 so data artifacts never subtract.
fn opt_count(v: &Value) -> Option<u32> {
    let n = v
        .as_i64()
        .map(|i| i as f64)
        .or_else(|| v.as_f64())
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))?;
    if !n.is_finite() {
        return None;
    }
    Some(if n <= 0.0 { 0 } else { n.floor() as u32 })
}

fn count(v: &Value) -> u32 {
    opt_count(v).unwrap_or(0)
}

fn opt_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array(v: &Value) -> &[Value] {
    v.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn team_from_value(v: &Value) -> TeamInfo {
    let alias = v["alias"]
        .as_str()
        .or_else(|| v["abbreviation"].as_str())
        .unwrap_or("");
    let location = v["market"]
        .as_str()
        .or_else(|| v["location"].as_str())
        .unwrap_or("");
    let mascot = v["name"].as_str().unwrap_or("");
    TeamInfo::new(alias, location, mascot)
}

// ── Schedule ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub id: String,
    /// Provider status string, e.g. "closed", "scheduled"
    pub status: String,
    pub home: TeamInfo,
    pub away: TeamInfo,
}

impl ScheduledGame {
    /// Not kicked off yet (or never will be); statistics would be empty.
    pub fn is_unplayed(&self) -> bool {
        matches!(
            self.status.as_str(),
            "scheduled" | "created" | "time-tbd" | "flex-schedule" | "postponed" | "cancelled"
        )
    }
}

/// Parse a week schedule (`{ week: { games: [...] } }` or `{ games: [...] }`).
pub fn parse_schedule(raw: &Value) -> Vec<ScheduledGame> {
    let games = if raw["week"]["games"].is_array() {
        array(&raw["week"]["games"])
    } else {
        array(&raw["games"])
    };

    games
        .iter()
        .filter_map(|g| {
            let id = opt_string(&g["id"])?;
            let home = team_from_value(&g["home"]);
            let away = team_from_value(&g["away"]);
            if home.abbreviation.is_empty() || away.abbreviation.is_empty() {
                return None;
            }
            Some(ScheduledGame {
                id,
                status: g["status"].as_str().unwrap_or("unknown").to_string(),
                home,
                away,
            })
        })
        .collect()
}

// ── Game statistics ──────────────────────────────────────────────────────────

/// Per-category player lists found in a team's statistics block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCategory {
    Rushing,
    Receiving,
    Passing,
    KickReturns,
    PuntReturns,
    MiscReturns,
    InterceptionReturns,
    Fumbles,
}

impl StatCategory {
    pub const ALL: [StatCategory; 8] = [
        StatCategory::Rushing,
        StatCategory::Receiving,
        StatCategory::Passing,
        StatCategory::KickReturns,
        StatCategory::PuntReturns,
        StatCategory::MiscReturns,
        StatCategory::InterceptionReturns,
        StatCategory::Fumbles,
    ];

    /// JSON keys the category may appear under, preferred first.
    fn keys(&self) -> &'static [&'static str] {
        match self {
            StatCategory::Rushing => &["rushing"],
            StatCategory::Receiving => &["receiving"],
            StatCategory::Passing => &["passing"],
            StatCategory::KickReturns => &["kick_returns"],
            StatCategory::PuntReturns => &["punt_returns"],
            StatCategory::MiscReturns => &["misc_returns"],
            StatCategory::InterceptionReturns => &["interception_returns", "int_returns"],
            StatCategory::Fumbles => &["fumbles"],
        }
    }

    pub fn bucket(&self) -> TouchdownCategory {
        match self {
            StatCategory::Rushing => TouchdownCategory::Rushing,
            StatCategory::Receiving => TouchdownCategory::Receiving,
            StatCategory::Passing => TouchdownCategory::Passing,
            StatCategory::KickReturns | StatCategory::PuntReturns | StatCategory::MiscReturns => {
                TouchdownCategory::Return
            }
            StatCategory::InterceptionReturns | StatCategory::Fumbles => {
                TouchdownCategory::Defensive
            }
        }
    }

    /// Touchdowns on one player line.
    ///
    /// Fumble-return scores are reported under several names depending on
    /// the feed, so the fumbles category sums all of them and only falls back
    /// to the plain `touchdowns` field when none are present. Other categories
    /// read `touchdowns`, then `<category>_touchdowns`.
    fn touchdowns(&self, line: &Value) -> u32 {
        match self {
            StatCategory::Fumbles => {
                const FIELDS: [&str; 4] =
                    ["return_touchdowns", "own_rec_tds", "opp_rec_tds", "ez_rec_tds"];
                let parts: Vec<u32> = FIELDS.iter().filter_map(|f| opt_count(&line[*f])).collect();
                if parts.is_empty() {
                    count(&line["touchdowns"])
                } else {
                    parts.iter().sum()
                }
            }
            _ => opt_count(&line["touchdowns"])
                .or_else(|| opt_count(&line[format!("{}_touchdowns", self.bucket().as_str())]))
                .unwrap_or(0),
        }
    }
}

/// One player's line in one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatLine {
    pub id: Option<String>,
    pub name: String,
    pub position: Option<String>,
    pub touchdowns: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryLines {
    pub category: StatCategory,
    pub lines: Vec<StatLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamStatistics {
    pub team: TeamInfo,
    pub categories: Vec<CategoryLines>,
    /// Scoreboard touchdown total, when the feed carries one
    pub reported_touchdowns: Option<u32>,
}

impl TeamStatistics {
    pub fn from_value(raw: &Value) -> Self {
        let categories = StatCategory::ALL
            .iter()
            .map(|cat| {
                let block = cat.keys().iter().map(|k| &raw[*k]).find(|v| !v.is_null());
                let players = match block {
                    Some(b) if b.is_array() => array(b),
                    Some(b) => array(&b["players"]),
                    None => &[],
                };
                let lines = players
                    .iter()
                    .filter_map(|p| {
                        let name = p["name"]
                            .as_str()
                            .or_else(|| p["full_name"].as_str())?
                            .trim()
                            .to_string();
                        if name.is_empty() {
                            return None;
                        }
                        Some(StatLine {
                            id: opt_string(&p["id"]),
                            name,
                            position: opt_string(&p["position"]),
                            touchdowns: cat.touchdowns(p),
                        })
                    })
                    .collect();
                CategoryLines {
                    category: *cat,
                    lines,
                }
            })
            .collect();

        TeamStatistics {
            team: team_from_value(raw),
            categories,
            reported_touchdowns: opt_count(&raw["touchdowns"]["total"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameStatistics {
    pub game_id: String,
    pub home: TeamStatistics,
    pub away: TeamStatistics,
}

impl GameStatistics {
    pub fn from_value(game_id: &str, raw: &Value) -> Self {
        let stats = if raw["statistics"].is_object() {
            &raw["statistics"]
        } else {
            raw
        };
        GameStatistics {
            game_id: opt_string(&raw["id"]).unwrap_or_else(|| game_id.to_string()),
            home: TeamStatistics::from_value(&stats["home"]),
            away: TeamStatistics::from_value(&stats["away"]),
        }
    }
}

// ── Play-by-play ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: Option<String>,
    pub name: String,
    pub position: Option<String>,
}

fn player_ref(v: &Value) -> Option<PlayerRef> {
    let name = v["name"].as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    Some(PlayerRef {
        id: opt_string(&v["id"]),
        name: name.to_string(),
        position: opt_string(&v["position"]),
    })
}

fn alias(v: &Value) -> Option<String> {
    v["alias"].as_str().map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty())
}

/// A structured `statistics` entry on a play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStat {
    pub stat_type: String,
    pub player: Option<PlayerRef>,
    pub team: Option<String>,
    pub touchdown: u32,
}

/// A structured `details` entry on a play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetail {
    pub category: String,
    pub players: Vec<PlayerRef>,
    pub start_location: Option<String>,
    pub end_location: Option<String>,
}

/// Position of an event in the feed: (period number, drive index, event index).
pub type EventOrder = (u32, u32, u32);

#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub order: EventOrder,
    pub quarter: u32,
    pub clock: String,
    pub description: String,
    pub statistics: Vec<EventStat>,
    pub details: Vec<EventDetail>,
    /// Team in possession at the start of the play
    pub possession: Option<String>,
    pub score: ScoreSnapshot,
}

impl PlayEvent {
    fn from_value(order: EventOrder, raw: &Value) -> Self {
        let statistics = array(&raw["statistics"])
            .iter()
            .map(|s| EventStat {
                stat_type: s["stat_type"].as_str().unwrap_or("").to_lowercase(),
                player: player_ref(&s["player"]),
                team: alias(&s["team"]),
                touchdown: count(&s["touchdown"]),
            })
            .collect();
        let details = array(&raw["details"])
            .iter()
            .map(|d| EventDetail {
                category: d["category"].as_str().unwrap_or("").to_lowercase(),
                players: array(&d["players"]).iter().filter_map(player_ref).collect(),
                start_location: alias(&d["start_location"]),
                end_location: alias(&d["end_location"]),
            })
            .collect();
        let description = raw["description"]
            .as_str()
            .or_else(|| raw["alt_description"].as_str())
            .unwrap_or("")
            .to_string();
        let home = opt_count(&raw["home_points"]).unwrap_or_else(|| count(&raw["score"]["home_points"]));
        let away = opt_count(&raw["away_points"]).unwrap_or_else(|| count(&raw["score"]["away_points"]));

        PlayEvent {
            order,
            quarter: order.0,
            clock: raw["clock"].as_str().unwrap_or("").to_string(),
            description,
            statistics,
            details,
            possession: alias(&raw["start_situation"]["possession"]),
            score: ScoreSnapshot { home, away },
        }
    }
}

/// A game's play-by-play flattened to one list. Events carry their feed
/// position in `order`; the list itself is in feed order, not sorted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayByPlay {
    pub game_id: String,
    pub events: Vec<PlayEvent>,
}

impl PlayByPlay {
    pub fn from_value(game_id: &str, raw: &Value) -> Self {
        let mut events = Vec::new();
        for (p_idx, period) in array(&raw["periods"]).iter().enumerate() {
            let number = opt_count(&period["number"])
                .filter(|n| *n > 0)
                .unwrap_or(p_idx as u32 + 1);
            for (d_idx, item) in array(&period["pbp"]).iter().enumerate() {
                // Drives hold an events list; stray plays sit directly in pbp.
                if item["events"].is_array() {
                    for (e_idx, ev) in array(&item["events"]).iter().enumerate() {
                        events.push(PlayEvent::from_value((number, d_idx as u32, e_idx as u32), ev));
                    }
                } else {
                    events.push(PlayEvent::from_value((number, d_idx as u32, 0), item));
                }
            }
        }
        PlayByPlay {
            game_id: opt_string(&raw["id"]).unwrap_or_else(|| game_id.to_string()),
            events,
        }
    }
}

//! Per-game touchdown extraction.
//!
//! Two independent passes over one game's normalized payloads:
//! - category stat lines → per-player touchdown increments and the set of
//!   players who appeared at all;
//! - play-by-play → each team's first touchdown scorer, by chronological scan.

use std::collections::HashSet;
use tracing::trace;

use crate::db::models::{ScoreSnapshot, TeamInfo, TouchdownCategory, TouchdownType};
use crate::provider::payload::{
    EventStat, GameStatistics, PlayByPlay, PlayEvent, PlayerRef, StatLine, TeamStatistics,
};

/// Identity of a player line before it is turned into a storage key.
///
/// Some provider categories omit player IDs. The fallback key includes the
/// team and touchdown bucket so two unnamed-ID lines in different buckets
/// never collapse into one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerKey {
    pub team_abbr: String,
    pub provider_id: Option<String>,
    pub fallback_name: Option<String>,
    pub category: Option<TouchdownCategory>,
}

impl PlayerKey {
    pub fn for_line(team_abbr: &str, line: &StatLine, category: TouchdownCategory) -> Self {
        PlayerKey {
            team_abbr: team_abbr.to_string(),
            provider_id: line.id.clone(),
            fallback_name: Some(line.name.clone()),
            category: Some(category),
        }
    }

    pub fn for_ref(team_abbr: &str, player: &PlayerRef, touchdown_type: TouchdownType) -> Self {
        let category = match touchdown_type {
            TouchdownType::Rushing => Some(TouchdownCategory::Rushing),
            TouchdownType::Receiving => Some(TouchdownCategory::Receiving),
            TouchdownType::Passing => Some(TouchdownCategory::Passing),
            TouchdownType::Return => Some(TouchdownCategory::Return),
            TouchdownType::Defensive => Some(TouchdownCategory::Defensive),
            TouchdownType::Unknown => None,
        };
        PlayerKey {
            team_abbr: team_abbr.to_string(),
            provider_id: player.id.clone(),
            fallback_name: Some(player.name.clone()),
            category,
        }
    }

    /// Stable player identifier: the provider ID, else `TEAM-name-category`.
    pub fn resolve(&self) -> String {
        if let Some(id) = &self.provider_id {
            return id.clone();
        }
        let name = self
            .fallback_name
            .as_deref()
            .map(slug)
            .unwrap_or_else(|| "unknown".to_string());
        let category = self.category.map(|c| c.as_str()).unwrap_or("unknown");
        format!("{}-{}-{}", self.team_abbr, name, category)
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchdownIncrement {
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
    pub category: TouchdownCategory,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamExtraction {
    pub team: TeamInfo,
    pub increments: Vec<TouchdownIncrement>,
    /// Everyone seen in any category list, touchdowns or not
    pub participants: Vec<Participant>,
    pub reported_touchdowns: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstScorer {
    pub team_abbr: String,
    pub player_id: String,
    pub player_name: String,
    pub position: Option<String>,
    pub touchdown_type: TouchdownType,
    pub quarter: u32,
    pub clock: String,
    pub score: ScoreSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameExtraction {
    pub game_id: String,
    pub teams: Vec<TeamExtraction>,
    pub first_scorers: Vec<FirstScorer>,
}

/// Extract touchdown increments and participants from one team's stats.
pub fn extract_team_touchdowns(stats: &TeamStatistics) -> TeamExtraction {
    let abbr = stats.team.abbreviation.as_str();
    let mut increments = Vec::new();
    let mut participants = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for block in &stats.categories {
        let bucket = block.category.bucket();
        for line in &block.lines {
            let player_id = PlayerKey::for_line(abbr, line, bucket).resolve();

            if seen.insert(player_id.clone()) {
                participants.push(Participant {
                    player_id: player_id.clone(),
                    player_name: line.name.clone(),
                    position: line.position.clone(),
                });
            }

            if line.touchdowns == 0 {
                continue;
            }
            increments.push(TouchdownIncrement {
                player_id,
                player_name: line.name.clone(),
                position: line.position.clone(),
                category: bucket,
                count: line.touchdowns,
            });
        }
    }

    TeamExtraction {
        team: stats.team.clone(),
        increments,
        participants,
        reported_touchdowns: stats.reported_touchdowns,
    }
}

/// Case-insensitive "touchdown" substring, or a standalone "TD" token.
pub fn is_touchdown_description(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower.contains("touchdown")
        || lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|w| w == "td")
}

struct ResolvedScore {
    player: PlayerRef,
    touchdown_type: TouchdownType,
    team: Option<String>,
}

fn stat_type_kind(stat_type: &str) -> Option<TouchdownType> {
    match stat_type {
        "rush" => Some(TouchdownType::Rushing),
        "receive" => Some(TouchdownType::Receiving),
        "pass" => Some(TouchdownType::Passing),
        "kick_return" | "punt_return" | "misc_return" | "return" => Some(TouchdownType::Return),
        "int_return" | "interception_return" | "fumble_return" => Some(TouchdownType::Defensive),
        _ => None,
    }
}

/// Strategy 1: structured `statistics` entries.
///
/// The ball carrier or receiver is the scorer, so rush/receive lines win over
/// the passer's line. Return and defensive lines only count when they carry a
/// touchdown flag.
fn resolve_from_statistics(event: &PlayEvent) -> Option<ResolvedScore> {
    let candidates: Vec<(TouchdownType, &EventStat)> = event
        .statistics
        .iter()
        .filter(|s| s.player.is_some())
        .filter_map(|s| stat_type_kind(&s.stat_type).map(|k| (k, s)))
        .collect();

    let carrier = |k: TouchdownType| matches!(k, TouchdownType::Rushing | TouchdownType::Receiving);
    let special = |k: TouchdownType| matches!(k, TouchdownType::Return | TouchdownType::Defensive);

    let (kind, stat) = candidates
        .iter()
        .find(|(k, s)| carrier(*k) && s.touchdown > 0)
        .or_else(|| candidates.iter().find(|(k, s)| special(*k) && s.touchdown > 0))
        .or_else(|| candidates.iter().find(|(k, _)| carrier(*k)))
        .or_else(|| candidates.iter().find(|(k, _)| *k == TouchdownType::Passing))?;

    Some(ResolvedScore {
        player: stat.player.clone()?,
        touchdown_type: *kind,
        team: stat.team.clone(),
    })
}

/// Strategy 2: `details` entries. The scoring team is the opponent of the
/// side of the field the play ended on, else the side it started on.
fn resolve_from_details(event: &PlayEvent, home: &str, away: &str) -> Option<ResolvedScore> {
    let detail = event
        .details
        .iter()
        .find(|d| matches!(d.category.as_str(), "rush" | "pass_reception") && !d.players.is_empty())?;

    let touchdown_type = if detail.category == "rush" {
        TouchdownType::Rushing
    } else {
        TouchdownType::Receiving
    };
    let team = match detail.end_location.as_deref() {
        Some(end) if end == home => Some(away.to_string()),
        Some(end) if end == away => Some(home.to_string()),
        _ => detail.start_location.clone(),
    };

    Some(ResolvedScore {
        player: detail.players[0].clone(),
        touchdown_type,
        team,
    })
}

/// Resolve scorer and team for one touchdown event, or `None` to skip it.
///
/// `details` are consulted when `statistics` are absent, and also when
/// statistics are present but name no rush, receive, pass, return or
/// defensive player (penalty-only or team-only entries).
fn resolve_event(event: &PlayEvent, home: &str, away: &str) -> Option<(String, ResolvedScore)> {
    let mut resolved = if event.statistics.is_empty() {
        resolve_from_details(event, home, away)
    } else {
        resolve_from_statistics(event).or_else(|| resolve_from_details(event, home, away))
    }?;

    // Strategy 3: possession at the start of the play.
    if resolved.team.is_none() {
        resolved.team = event.possession.clone();
    }
    let team = resolved.team.clone()?;
    Some((team, resolved))
}

/// Sort a game's events chronologically: period, then drive, then event.
pub fn chronological(pbp: &PlayByPlay) -> Vec<&PlayEvent> {
    let mut events: Vec<&PlayEvent> = pbp.events.iter().collect();
    events.sort_by_key(|e| e.order);
    events
}

/// First touchdown scorer per team, in the order the teams first scored.
///
/// The first resolvable touchdown seen for a team is final; later events never
/// replace it. Events whose scorer or team cannot be resolved are skipped.
pub fn extract_first_scorers(pbp: &PlayByPlay, home: &str, away: &str) -> Vec<FirstScorer> {
    let mut scorers: Vec<FirstScorer> = Vec::new();

    for event in chronological(pbp)
        .into_iter()
        .filter(|e| is_touchdown_description(&e.description))
    {
        let Some((team, resolved)) = resolve_event(event, home, away) else {
            trace!(
                "Skipping unresolvable touchdown event in {} (Q{} {})",
                pbp.game_id,
                event.quarter,
                event.clock
            );
            continue;
        };
        if scorers.iter().any(|s| s.team_abbr == team) {
            continue;
        }

        let player_id = PlayerKey::for_ref(&team, &resolved.player, resolved.touchdown_type).resolve();
        scorers.push(FirstScorer {
            team_abbr: team,
            player_id,
            player_name: resolved.player.name,
            position: resolved.player.position,
            touchdown_type: resolved.touchdown_type,
            quarter: event.quarter,
            clock: event.clock.clone(),
            score: event.score,
        });
    }

    scorers
}

/// Extract everything one game contributes to its week.
///
/// A team with no player lines (an unplayed game still reports team
/// identities) contributes nothing, so it never counts as a week played.
pub fn extract_game(stats: &GameStatistics, pbp: Option<&PlayByPlay>) -> GameExtraction {
    let teams: Vec<TeamExtraction> = [&stats.home, &stats.away]
        .into_iter()
        .filter(|t| !t.team.abbreviation.is_empty())
        .map(extract_team_touchdowns)
        .filter(|t| !t.participants.is_empty())
        .collect();

    let first_scorers = pbp
        .map(|p| {
            extract_first_scorers(
                p,
                &stats.home.team.abbreviation,
                &stats.away.team.abbreviation,
            )
        })
        .unwrap_or_default();

    GameExtraction {
        game_id: stats.game_id.clone(),
        teams,
        first_scorers,
    }
}

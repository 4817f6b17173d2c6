//! Weekly touchdown likelihoods and first-scorer rankings.
//!
//! The weekly estimate is Laplace-smoothed:
//!
//!   p = (S + 2) / (W + 5) × 100
//!
//! where
//!   S = weeks in which the player scored at least once
//!   W = weeks the player's team played
//!
//! The prior (2 successes in 5 trials, ≈40%) pulls small samples away from
//! 0% and 100%. The first-scorer score blends how often the player opened
//! the team's scoring with the weekly estimate:
//!
//!   score = 0.6 × first_scorer_frequency + 0.4 × weekly_probability

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::db::models::{
    FirstScorerCandidate, FirstScorerPrediction, FirstTouchdownScorerRecord,
    PlayerTouchdownProbability, PlayerTouchdownRecord,
};

const PRIOR_SUCCESSES: f64 = 2.0;
const PRIOR_TRIALS: f64 = 5.0;
const FIRST_SCORER_WEIGHT: f64 = 0.6;
const WEEKLY_WEIGHT: f64 = 0.4;

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Smoothed weekly scoring probability in percent, two decimals, in [0, 100].
pub fn smoothed_probability(weeks_with_td: u32, team_games: u32) -> f64 {
    let p = (weeks_with_td as f64 + PRIOR_SUCCESSES) / (team_games as f64 + PRIOR_TRIALS) * 100.0;
    round2(p.clamp(0.0, 100.0))
}

#[derive(Default)]
struct PlayerSeason {
    name: String,
    position: Option<String>,
    weeks_played: BTreeSet<u32>,
    weeks_with_td: u32,
    total: u32,
}

/// Per-player weekly probabilities for one season/season-type.
///
/// `records` are the player's weekly rows; `team_games` maps a team
/// abbreviation to the number of weeks it played. Players who never scored
/// are left out. Results are sorted by probability, highest first.
pub fn estimate_player_probabilities(
    records: &[PlayerTouchdownRecord],
    team_games: &HashMap<String, u32>,
) -> Vec<PlayerTouchdownProbability> {
    let mut players: BTreeMap<(String, String), PlayerSeason> = BTreeMap::new();
    for r in records {
        let entry = players
            .entry((r.team_abbr.clone(), r.player_id.clone()))
            .or_default();
        if entry.name.is_empty() {
            entry.name = r.player_name.clone();
        }
        if entry.position.is_none() {
            entry.position = r.position.clone();
        }
        if entry.weeks_played.insert(r.week.week) && r.total > 0 {
            entry.weeks_with_td += 1;
        }
        entry.total += r.total;
    }

    let mut out: Vec<PlayerTouchdownProbability> = players
        .into_iter()
        .filter(|(_, p)| p.total > 0)
        .map(|((team_abbr, player_id), p)| {
            // A player's own rows can't outnumber the team's games.
            let games = team_games
                .get(&team_abbr)
                .copied()
                .unwrap_or(0)
                .max(p.weeks_played.len() as u32);
            PlayerTouchdownProbability {
                probability: smoothed_probability(p.weeks_with_td, games),
                player_id,
                player_name: p.name,
                position: p.position,
                team_abbr,
                weeks_with_touchdown: p.weeks_with_td,
                team_games_played: games,
                total_touchdowns: p.total,
            }
        })
        .collect();

    out.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then(b.total_touchdowns.cmp(&a.total_touchdowns))
    });
    out
}

/// Rank each team's candidates to score its first touchdown.
///
/// Ties keep the order of `probabilities`; only the top candidate per team
/// is surfaced, so tie-breaking beyond that is not attempted.
pub fn predict_first_scorers(
    probabilities: &[PlayerTouchdownProbability],
    first_scorers: &[FirstTouchdownScorerRecord],
    team_games: &HashMap<String, u32>,
) -> Vec<FirstScorerPrediction> {
    let mut first_counts: HashMap<(&str, &str), u32> = HashMap::new();
    for fs in first_scorers {
        *first_counts
            .entry((fs.team_abbr.as_str(), fs.player_id.as_str()))
            .or_default() += 1;
    }

    let mut by_team: BTreeMap<&str, Vec<FirstScorerCandidate>> = BTreeMap::new();
    let games_for = |team: &str| team_games.get(team).copied().unwrap_or(0);
    let frequency = |count: u32, games: u32| {
        if games == 0 {
            0.0
        } else {
            round2((count as f64 / games as f64 * 100.0).min(100.0))
        }
    };
    let blend = |freq: f64, weekly: f64| round2(FIRST_SCORER_WEIGHT * freq + WEEKLY_WEIGHT * weekly);

    for p in probabilities {
        let games = games_for(&p.team_abbr);
        let count = first_counts
            .get(&(p.team_abbr.as_str(), p.player_id.as_str()))
            .copied()
            .unwrap_or(0);
        let freq = frequency(count, games);
        by_team
            .entry(p.team_abbr.as_str())
            .or_default()
            .push(FirstScorerCandidate {
                player_id: p.player_id.clone(),
                player_name: p.player_name.clone(),
                position: p.position.clone(),
                first_touchdowns: count,
                first_scorer_frequency: freq,
                weekly_probability: p.probability,
                score: blend(freq, p.probability),
            });
    }

    // First scorers whose ID never showed up in weekly stats (play-by-play
    // and box score IDs can disagree) still rank on frequency alone.
    for fs in first_scorers {
        let candidates = by_team.entry(fs.team_abbr.as_str()).or_default();
        if candidates.iter().any(|c| c.player_id == fs.player_id) {
            continue;
        }
        let count = first_counts[&(fs.team_abbr.as_str(), fs.player_id.as_str())];
        let freq = frequency(count, games_for(&fs.team_abbr));
        candidates.push(FirstScorerCandidate {
            player_id: fs.player_id.clone(),
            player_name: fs.player_name.clone(),
            position: fs.position.clone(),
            first_touchdowns: count,
            first_scorer_frequency: freq,
            weekly_probability: 0.0,
            score: blend(freq, 0.0),
        });
    }

    by_team
        .into_iter()
        .map(|(team, mut candidates)| {
            candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            FirstScorerPrediction {
                team_abbr: team.to_string(),
                team_games_played: games_for(team),
                top: candidates.first().cloned(),
                candidates,
            }
        })
        .collect()
}

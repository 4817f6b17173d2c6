use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::payload::{parse_schedule, GameStatistics, PlayByPlay, ScheduledGame};
use super::StatsProvider;
use crate::db::models::WeekKey;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited on {path} after {attempts} attempts")]
    RateLimited { path: String, attempts: u32 },
    #[error("provider returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },
}

/// Backoff policy for HTTP 429 responses.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Ceiling on any single wait, `Retry-After` included
    pub max_delay: Duration,
    /// Add up to 25% random jitter to each wait
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Wait before retrying after the `attempt`-th (1-based) rate-limited try.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let mut delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if let Some(ra) = retry_after {
            delay = delay.max(ra);
        }
        if self.jitter {
            let quarter = (delay.as_millis() / 4) as u64;
            if quarter > 0 {
                delay += Duration::from_millis(rand::thread_rng().gen_range(0..=quarter));
            }
        }
        delay.min(self.max_delay)
    }
}

/// Client for the SportsRadar NFL v7 REST API.
#[derive(Clone)]
pub struct SportradarClient {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl SportradarClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(SportradarClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))
            .with_context(|| format!("Invalid provider URL for {}", path))?;
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        Ok(url)
    }

    /// GET a JSON document, retrying 429s per the retry policy.
    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = self.url_for(path)?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            // Path only: the query string carries the API key.
            debug!("GET {} (attempt {})", path, attempt);

            let resp = self
                .http
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("SportsRadar request failed: {}", path))?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.retry.max_attempts {
                    return Err(ProviderError::RateLimited {
                        path: path.to_string(),
                        attempts: attempt,
                    }
                    .into());
                }
                let retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                let wait = self.retry.delay_for(attempt, retry_after);
                warn!(
                    "SportsRadar 429 on {}, waiting {:?} (attempt {}/{})",
                    path, wait, attempt, self.retry.max_attempts
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::Status {
                    status: status.as_u16(),
                    path: path.to_string(),
                    body,
                }
                .into());
            }

            return resp
                .json::<Value>()
                .await
                .with_context(|| format!("Failed to parse SportsRadar response for {}", path));
        }
    }
}

#[async_trait]
impl StatsProvider for SportradarClient {
    fn name(&self) -> &str {
        "SportsRadar"
    }

    async fn fetch_week_schedule(&self, week: &WeekKey) -> Result<Vec<ScheduledGame>> {
        let path = format!(
            "games/{}/{}/{}/schedule.json",
            week.season, week.season_type, week.week
        );
        let raw = self.get_json(&path).await?;
        Ok(parse_schedule(&raw))
    }

    async fn fetch_game_statistics(&self, game_id: &str) -> Result<GameStatistics> {
        let raw = self
            .get_json(&format!("games/{}/statistics.json", game_id))
            .await?;
        Ok(GameStatistics::from_value(game_id, &raw))
    }

    async fn fetch_play_by_play(&self, game_id: &str) -> Result<PlayByPlay> {
        let raw = self.get_json(&format!("games/{}/pbp.json", game_id)).await?;
        Ok(PlayByPlay::from_value(game_id, &raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SeasonType;
    use axum::{extract::State, http::StatusCode as HttpStatus, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    /// Serve a fake provider that answers 429 for the first `throttled` calls.
    async fn spawn_provider(throttled: u32) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/games/:id/statistics.json",
                get(
                    |State((hits, throttled)): State<(Arc<AtomicU32>, u32)>| async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        if n < throttled {
                            return Err(HttpStatus::TOO_MANY_REQUESTS);
                        }
                        Ok(Json(json!({
                            "id": "g1",
                            "statistics": {
                                "home": { "alias": "KC", "rushing": { "players": [
                                    { "id": "p1", "name": "Isiah Pacheco", "touchdowns": 1 }
                                ]}},
                                "away": { "alias": "BAL" }
                            }
                        })))
                    },
                ),
            )
            .route(
                "/games/:id/:season_type/:week/schedule.json",
                get(|| async {
                    Json(json!({ "week": { "games": [
                        { "id": "g1", "status": "closed",
                          "home": { "alias": "KC" }, "away": { "alias": "BAL" } }
                    ]}}))
                }),
            )
            .with_state((hits.clone(), throttled));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), hits)
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4, None), Duration::from_secs(10));
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(60))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_jitter_stays_under_ceiling() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };
        for attempt in 1..8 {
            assert!(policy.delay_for(attempt, None) <= policy.max_delay);
        }
    }

    #[tokio::test]
    async fn test_retries_through_rate_limit() {
        let (base, hits) = spawn_provider(2).await;
        let client =
            SportradarClient::new(&base, "secret", Duration::from_secs(5), fast_policy(4)).unwrap();

        let stats = client.fetch_game_statistics("g1").await.unwrap();
        assert_eq!(stats.home.team.abbreviation, "KC");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_is_hard_failure() {
        let (base, hits) = spawn_provider(10).await;
        let client =
            SportradarClient::new(&base, "secret", Duration::from_secs(5), fast_policy(3)).unwrap();

        let err = client.fetch_game_statistics("g1").await.unwrap_err();
        match err.downcast_ref::<ProviderError>() {
            Some(ProviderError::RateLimited { attempts, .. }) => assert_eq!(*attempts, 3),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_429_error_is_not_retried() {
        let (base, _) = spawn_provider(0).await;
        let client =
            SportradarClient::new(&base, "secret", Duration::from_secs(5), fast_policy(4)).unwrap();

        let err = client.fetch_play_by_play("g1").await.unwrap_err();
        match err.downcast_ref::<ProviderError>() {
            Some(ProviderError::Status { status, .. }) => assert_eq!(*status, 404),
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schedule_fetch() {
        let (base, _) = spawn_provider(0).await;
        let client =
            SportradarClient::new(&base, "secret", Duration::from_secs(5), fast_policy(2)).unwrap();
        let week = WeekKey::new(2024, SeasonType::Reg, 1).unwrap();

        let games = client.fetch_week_schedule(&week).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].home.abbreviation, "KC");
    }
}

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::cache::ResponseCache;
use crate::db::models::{
    ParamError, PlayerTouchdownProbability, SeasonType, WeekKey, WeekTouchdowns,
};
use crate::db::Database;
use crate::touchdowns::{estimate_player_probabilities, predict_first_scorers};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Season-wide probability and prediction payloads
    pub cache: ResponseCache<Value>,
}

/// Build the Axum router for the touchdown read API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/nfl/touchdowns", get(touchdowns_handler))
        .route(
            "/api/nfl/touchdowns/probabilities",
            get(probabilities_handler),
        )
        .route("/api/nfl/first-td/predictions", get(predictions_handler))
        .route("/api/nfl/first-td/scorers", get(first_scorers_handler))
        .route("/api/nfl/weeks", get(weeks_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ── Responses ────────────────────────────────────────────────────────────────

enum ApiError {
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<ParamError> for ApiError {
    fn from(e: ParamError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<ParamError>() {
            Some(p) => ApiError::BadRequest(p.to_string()),
            None => ApiError::Internal(e),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(e) => {
                error!("API request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn success<T: Serialize>(data: T) -> ApiResult {
    Ok(Json(json!({ "success": true, "data": serde_json::to_value(data)? })))
}

// ── Query parameters ─────────────────────────────────────────────────────────

/// Raw query string; parsed by hand so bad input gets the JSON error shape.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TouchdownQuery {
    season: Option<String>,
    season_type: Option<String>,
    week: Option<String>,
}

impl TouchdownQuery {
    fn season(&self) -> Result<(i32, SeasonType), ParamError> {
        let raw = self.season.as_deref().ok_or(ParamError::Missing("season"))?;
        let season = raw.trim().parse::<i32>().map_err(|_| ParamError::Invalid {
            name: "season",
            value: raw.to_string(),
        })?;
        let season_type = self
            .season_type
            .as_deref()
            .ok_or(ParamError::Missing("seasonType"))?
            .parse::<SeasonType>()?;
        Ok((season, season_type))
    }

    fn week_number(&self) -> Result<Option<u32>, ParamError> {
        self.week
            .as_deref()
            .map(|raw| {
                raw.trim().parse::<u32>().map_err(|_| ParamError::Invalid {
                    name: "week",
                    value: raw.to_string(),
                })
            })
            .transpose()
    }

    fn week_key(&self) -> Result<WeekKey, ParamError> {
        let (season, season_type) = self.season()?;
        let week = self.week_number()?.ok_or(ParamError::Missing("week"))?;
        WeekKey::new(season, season_type, week)
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WeekResponse {
    #[serde(flatten)]
    week: WeekTouchdowns,
    has_data: bool,
}

/// GET /api/nfl/touchdowns?season=2024&seasonType=REG&week=5
async fn touchdowns_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TouchdownQuery>,
) -> ApiResult {
    let key = q.week_key()?;
    let week = state.db.get_week(&key)?;
    let has_data = week.has_data();
    success(WeekResponse { week, has_data })
}

/// Probabilities as JSON, from cache when fresh.
async fn cached_probabilities(
    state: &AppState,
    season: i32,
    season_type: SeasonType,
) -> Result<Value, ApiError> {
    let key = format!("probabilities:{}:{}", season, season_type);
    if let Some(v) = state.cache.get(&key).await {
        return Ok(v);
    }
    let records = state.db.list_player_weeks(season, season_type)?;
    let team_games = state.db.team_weeks_played(season, season_type)?;
    let value = serde_json::to_value(estimate_player_probabilities(&records, &team_games))?;
    state.cache.set(&key, value.clone()).await;
    Ok(value)
}

/// GET /api/nfl/touchdowns/probabilities?season=2024&seasonType=REG
async fn probabilities_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TouchdownQuery>,
) -> ApiResult {
    let (season, season_type) = q.season()?;
    success(cached_probabilities(&state, season, season_type).await?)
}

/// GET /api/nfl/first-td/predictions?season=2024&seasonType=REG
async fn predictions_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TouchdownQuery>,
) -> ApiResult {
    let (season, season_type) = q.season()?;
    let key = format!("predictions:{}:{}", season, season_type);
    if let Some(v) = state.cache.get(&key).await {
        return success(v);
    }

    let probabilities: Vec<PlayerTouchdownProbability> =
        serde_json::from_value(cached_probabilities(&state, season, season_type).await?)?;
    let first_scorers = state.db.list_first_scorers(season, season_type, None)?;
    let team_games = state.db.team_weeks_played(season, season_type)?;
    let value = serde_json::to_value(predict_first_scorers(
        &probabilities,
        &first_scorers,
        &team_games,
    ))?;
    state.cache.set(&key, value.clone()).await;
    success(value)
}

/// GET /api/nfl/first-td/scorers?season=2024&seasonType=REG[&week=5]
async fn first_scorers_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TouchdownQuery>,
) -> ApiResult {
    let (season, season_type) = q.season()?;
    let week = match q.week_number()? {
        Some(n) => Some(WeekKey::new(season, season_type, n)?.week),
        None => None,
    };
    success(state.db.list_first_scorers(season, season_type, week)?)
}

/// GET /api/nfl/weeks?season=2024&seasonType=REG
async fn weeks_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TouchdownQuery>,
) -> ApiResult {
    let (season, season_type) = q.season()?;
    success(state.db.list_week_statuses(season, season_type)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        PlayerTouchdownRecord, TeamInfo, TeamTouchdownRecord, TeamTouchdownSummary,
        TouchdownCategory,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn seeded_state() -> AppState {
        let db = Database::open(":memory:").unwrap();
        let key = WeekKey::new(2024, SeasonType::Reg, 1).unwrap();
        let mut henry =
            PlayerTouchdownRecord::empty(key, "BAL", "henry", "Derrick Henry", Some("RB".into()));
        henry.add(TouchdownCategory::Rushing, 2);
        db.save_week(&WeekTouchdowns {
            week: key,
            teams: vec![TeamTouchdownSummary {
                record: TeamTouchdownRecord {
                    week: key,
                    team: TeamInfo::new("BAL", "Baltimore", "Ravens"),
                    total_touchdowns: 2,
                    reported_touchdowns: None,
                },
                players: vec![henry],
            }],
            first_scorers: vec![],
            total_touchdowns: 2,
        })
        .unwrap();
        AppState {
            db,
            cache: ResponseCache::new(Duration::from_secs(60), 16),
        }
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_week_summary() {
        let app = router(seeded_state());
        let (status, body) =
            get_json(&app, "/api/nfl/touchdowns?season=2024&seasonType=REG&week=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["totalTouchdowns"], 2);
        assert_eq!(body["data"]["hasData"], true);
        assert_eq!(body["data"]["teams"][0]["team"]["abbreviation"], "BAL");
        assert_eq!(body["data"]["teams"][0]["players"][0]["rushing"], 2);
    }

    #[tokio::test]
    async fn test_week_without_data() {
        let app = router(seeded_state());
        let (status, body) =
            get_json(&app, "/api/nfl/touchdowns?season=2024&seasonType=REG&week=7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["teams"], json!([]));
        assert_eq!(body["data"]["totalTouchdowns"], 0);
        assert_eq!(body["data"]["hasData"], false);
    }

    #[tokio::test]
    async fn test_invalid_params_are_400() {
        let app = router(seeded_state());
        for uri in [
            "/api/nfl/touchdowns?season=2024&seasonType=XYZ&week=1",
            "/api/nfl/touchdowns?season=2024&seasonType=REG&week=19",
            "/api/nfl/touchdowns?season=2024&seasonType=REG",
            "/api/nfl/weeks?season=abc&seasonType=REG",
        ] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["success"], false);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_probabilities_cached() {
        let state = seeded_state();
        let app = router(state.clone());
        let uri = "/api/nfl/touchdowns/probabilities?season=2024&seasonType=REG";

        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["playerId"], "henry");
        // (1+2)/(1+5)
        assert_eq!(body["data"][0]["probability"], 50.0);

        // Served from cache until cleared.
        state
            .db
            .delete_week(&WeekKey::new(2024, SeasonType::Reg, 1).unwrap())
            .unwrap();
        let (_, cached) = get_json(&app, uri).await;
        assert_eq!(cached, body);

        state.cache.clear().await;
        let (_, fresh) = get_json(&app, uri).await;
        assert_eq!(fresh["data"], json!([]));
    }

    #[tokio::test]
    async fn test_predictions_and_weeks() {
        let app = router(seeded_state());
        let (status, body) =
            get_json(&app, "/api/nfl/first-td/predictions?season=2024&seasonType=REG").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["teamAbbr"], "BAL");
        assert_eq!(body["data"][0]["top"]["playerId"], "henry");

        let (_, weeks) = get_json(&app, "/api/nfl/weeks?season=2024&seasonType=REG").await;
        assert_eq!(weeks["data"][0]["week"]["week"], 1);
        assert_eq!(weeks["data"][0]["hasData"], true);

        let (_, scorers) =
            get_json(&app, "/api/nfl/first-td/scorers?season=2024&seasonType=REG&week=1").await;
        assert_eq!(scorers["data"], json!([]));
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(seeded_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

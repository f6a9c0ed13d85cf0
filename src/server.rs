//! HTTP surface. Thin by design: handlers resolve the caller identity,
//! deserialize input, and delegate to the engine; all business rules live in
//! `engine` and `streak`/`leveling`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::engine::{insights, CompletionEngine};
use crate::error::{EngineError, Rejection};
use crate::traits::{CatalogStore, HistoryStore, RoutineStore, StateStore, UserStore};
use crate::types::{ProfilePatch, User};
use crate::utils::local_date_in;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CompletionEngine>,
    pub store: Arc<dyn StateStore>,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl From<Rejection> for ApiError {
    fn from(rej: Rejection) -> Self {
        ApiError(EngineError::Rejected(rej))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(EngineError::Storage(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            EngineError::Rejected(rej) => {
                let status = match &rej {
                    Rejection::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    Rejection::NotFound(_) => StatusCode::NOT_FOUND,
                    Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                    Rejection::LimitReached(_) => StatusCode::TOO_MANY_REQUESTS,
                    Rejection::Conflict(_) => StatusCode::CONFLICT,
                };
                let mut body = json!({
                    "kind": rej.kind(),
                    "message": rej.to_string(),
                });
                if let Rejection::RateLimited { retry_after_seconds } = &rej {
                    body["retryAfterSeconds"] = json!(retry_after_seconds);
                }
                (status, Json(json!({ "error": body }))).into_response()
            }
            EngineError::Storage(err) => {
                error!("Storage failure: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": {
                            "kind": "INTERNAL",
                            "message": "transient storage failure, please retry",
                        }
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Resolves the opaque caller identity. Credential parsing happens upstream;
/// by the time a request reaches the engine, the header is just a stable id.
fn require_user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Rejection::InvalidInput("x-user-id header is required".to_string()).into())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/quests", get(list_quests))
        .route("/quests/:id/complete", post(complete_quest))
        .route("/routines", get(list_routines).post(create_routine))
        .route("/routines/:id", delete(deactivate_routine))
        .route("/routines/:id/logs", post(log_routine))
        .route("/runs", get(list_runs))
        .route("/insights/weekly", get(weekly_insights))
        .route("/me", get(get_me).patch(patch_me))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn list_quests(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let quests = state.store.list_quests().await?;
    Ok(Json(quests))
}

async fn complete_quest(
    State(state): State<AppState>,
    Path(quest_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let outcome = state
        .engine
        .complete_quest(&user_id, &quest_id, Utc::now())
        .await?;
    Ok(Json(outcome))
}

/// Input schema with explicit presence: an absent `dailyTarget` and a zero
/// are different client mistakes and get different messages.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoutineRequest {
    title: Option<String>,
    base_points: Option<i64>,
    daily_target: Option<i64>,
}

async fn create_routine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRoutineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let routine = state
        .engine
        .create_routine(
            &user_id,
            req.title.as_deref(),
            req.base_points,
            req.daily_target,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(routine)))
}

async fn list_routines(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let now = Utc::now();
    let timezone = state
        .store
        .get_user(&user_id)
        .await?
        .map(|u| u.timezone)
        .unwrap_or_else(|| "UTC".to_string());
    let today = local_date_in(&timezone, now);
    let routines = state.store.list_routines(&user_id, today).await?;
    Ok(Json(routines))
}

async fn deactivate_routine(
    State(state): State<AppState>,
    Path(routine_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    state.engine.deactivate_routine(&user_id, &routine_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_routine(
    State(state): State<AppState>,
    Path(routine_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let outcome = state
        .engine
        .log_routine(&user_id, &routine_id, Utc::now())
        .await?;
    Ok(Json(outcome))
}

async fn weekly_insights(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let report = insights::weekly_insights(state.store.as_ref(), &user_id, Utc::now()).await?;
    Ok(Json(report))
}

async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let user = state
        .store
        .get_user(&user_id)
        .await?
        .unwrap_or_else(|| User::new(&user_id, Utc::now()));
    Ok(Json(user))
}

async fn patch_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<ProfilePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let now = Utc::now();
    // Insert-if-absent, then a column-scoped patch: neither write can carry
    // a stale progression read over a concurrently committed completion.
    state
        .store
        .ensure_user(&User::new(&user_id, now))
        .await?;
    let updated = crate::traits::update_profile(state.store.as_ref(), &user_id, &patch, now)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user row vanished during profile update"))?;
    Ok(Json(updated))
}

async fn list_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_user(&headers)?;
    let runs = state.store.list_runs(&user_id, 50).await?;
    Ok(Json(runs))
}

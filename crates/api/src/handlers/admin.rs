//! Administrative handlers: whitelist and quota management, snapshot reload.
//!
//! Routes (all under `/api/v1/admin`):
//! - `PUT    /users/{platform}/{id}`        — add or refresh a user
//! - `DELETE /users/{platform}/{id}`        — remove a user
//! - `GET    /users/{platform}/{id}`        — current quota record
//! - `PUT    /users/{platform}/{id}/limit`  — set the daily limit
//! - `PUT    /groups/{platform}/{id}`       — allow a group
//! - `DELETE /groups/{platform}/{id}`       — disallow a group
//! - `POST   /reload`                       — re-read the snapshot from disk
//!
//! Admin identity is enforced by the chat adapter before these are called;
//! within the deployment boundary the endpoints are unauthenticated.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpsertUserRequest {
    /// Daily limit for the user; defaults to the configured
    /// `DEFAULT_DAILY_LIMIT` when omitted.
    #[validate(range(min = 1, max = 10_000))]
    pub limit: Option<u32>,
    #[validate(length(max = 100))]
    pub nickname: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetLimitRequest {
    #[validate(range(min = 1, max = 10_000))]
    pub limit: u32,
    #[validate(length(max = 100))]
    pub nickname: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpsertGroupRequest {
    #[validate(length(max = 200))]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// PUT /api/v1/admin/users/{platform}/{id}
///
/// Idempotent upsert: re-adding an existing user replaces the record with a
/// fresh full allowance at the given limit.
pub async fn upsert_user(
    State(state): State<AppState>,
    Path((platform, user_id)): Path<(String, String)>,
    Json(input): Json<UpsertUserRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let limit = input.limit.or(Some(state.config.default_daily_limit));
    let record = state
        .store
        .add_user(&platform, &user_id, limit, input.nickname)
        .await?;
    Ok(Json(DataResponse { data: record }))
}

/// DELETE /api/v1/admin/users/{platform}/{id}
pub async fn remove_user(
    State(state): State<AppState>,
    Path((platform, user_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let removed = state.store.remove_user(&platform, &user_id).await?;
    Ok(Json(DataResponse {
        data: RemovedResponse { removed },
    }))
}

/// GET /api/v1/admin/users/{platform}/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path((platform, user_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .store
        .user_info(&platform, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} on {platform}")))?;
    Ok(Json(DataResponse { data: record }))
}

/// PUT /api/v1/admin/users/{platform}/{id}/limit
pub async fn set_limit(
    State(state): State<AppState>,
    Path((platform, user_id)): Path<(String, String)>,
    Json(input): Json<SetLimitRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = state
        .store
        .set_limit(&platform, &user_id, input.limit, input.nickname)
        .await?;
    Ok(Json(DataResponse { data: record }))
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// PUT /api/v1/admin/groups/{platform}/{id}
pub async fn upsert_group(
    State(state): State<AppState>,
    Path((platform, group_id)): Path<(String, String)>,
    Json(input): Json<UpsertGroupRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = state
        .store
        .add_group(&platform, &group_id, input.name)
        .await?;
    Ok(Json(DataResponse { data: record }))
}

/// DELETE /api/v1/admin/groups/{platform}/{id}
pub async fn remove_group(
    State(state): State<AppState>,
    Path((platform, group_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let removed = state.store.remove_group(&platform, &group_id).await?;
    Ok(Json(DataResponse {
        data: RemovedResponse { removed },
    }))
}

// ---------------------------------------------------------------------------
// Reload
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
}

/// POST /api/v1/admin/reload
///
/// Atomic with respect to in-flight reservations: jobs already admitted are
/// never retroactively revoked, and a corrupt snapshot leaves the live
/// state untouched (422).
pub async fn reload(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.store.reload().await?;
    Ok(Json(DataResponse {
        data: ReloadResponse { reloaded: true },
    }))
}

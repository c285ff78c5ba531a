//! Handler for the generation endpoint.
//!
//! Routes:
//! - `POST /api/v1/generate` — parse, validate, and enqueue a command
//!
//! Parse and validation errors are always reported (400 with the offending
//! field). Admission denials depend on origin: private requests get the
//! denial reason, group requests get an empty 204 so the bot's presence is
//! never leaked to unauthorized groups.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use atelier_core::request::{Origin, Requester};
use atelier_core::validate::{parse_request, RequestContext};
use atelier_queue::EnqueueError;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Inbound chat message, as forwarded by a platform adapter. Natural-
/// language inputs are pre-translated into the same `text` grammar by the
/// external LLM adapter before they get here.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Raw command text (`Key:<Value>` pairs, or free text).
    pub text: String,
    /// Chat platform identifier, e.g. `qq` or `discord`.
    pub platform: String,
    /// Platform user id of the requester.
    pub user_id: String,
    pub nickname: Option<String>,
    /// Present for group-origin messages; the adapter has already verified
    /// the explicit @-mention before forwarding.
    pub group_id: Option<String>,
    /// Ordered opaque image references attached to the message.
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub seed: u64,
    pub model: String,
    /// True when no `Key:<...>` pairs were found and the whole message was
    /// taken as the positive prompt.
    pub no_keys_fallback: bool,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST /api/v1/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(input): Json<GenerateRequest>,
) -> AppResult<Response> {
    let origin = match &input.group_id {
        Some(group_id) => Origin::Group {
            group_id: group_id.clone(),
        },
        None => Origin::Private,
    };
    let is_group = origin.is_group();

    let ctx = RequestContext {
        requester: Requester {
            platform: input.platform.clone(),
            user_id: input.user_id.clone(),
            nickname: input.nickname.clone(),
        },
        origin,
        attachments: input.attachments.clone(),
    };

    // Grammar errors are reported regardless of origin; the requester typed
    // the command and deserves the field-scoped reason.
    let parsed = parse_request(&input.text, ctx, &state.policy)?;
    let seed = parsed.request.seed;
    let model = parsed.request.model.clone();

    match state.queue.enqueue(parsed.request).await {
        Ok(ticket) => {
            let job_id = ticket.job_id.to_string();
            state.jobs.track(ticket);
            Ok((
                StatusCode::ACCEPTED,
                Json(DataResponse {
                    data: GenerateResponse {
                        job_id,
                        seed,
                        model,
                        no_keys_fallback: parsed.no_keys_fallback,
                    },
                }),
            )
                .into_response())
        }
        Err(err) => Ok(denial_response(err, is_group)),
    }
}

/// Map an admission denial to a response, honoring the silent-in-groups
/// policy.
fn denial_response(err: EnqueueError, is_group: bool) -> Response {
    if is_group {
        tracing::debug!(error = %err, "Silently denying group-origin request");
        return StatusCode::NO_CONTENT.into_response();
    }

    let (status, code) = match &err {
        EnqueueError::NotWhitelisted => (StatusCode::FORBIDDEN, "NOT_WHITELISTED"),
        EnqueueError::GroupNotAllowed => (StatusCode::FORBIDDEN, "GROUP_NOT_ALLOWED"),
        EnqueueError::QuotaExhausted => (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXHAUSTED"),
        EnqueueError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_CLOSED"),
        EnqueueError::Store(_) => {
            tracing::error!(error = %err, "Store failure during admission");
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    let body = serde_json::json!({
        "error": err.to_string(),
        "code": code,
    });
    (status, Json(body)).into_response()
}

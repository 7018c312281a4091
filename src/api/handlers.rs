//! HTTP handlers.
//!
//! Every query handler validates its body first and only then asks the guard
//! for a ready connection.

use axum::{extract::State, http::StatusCode, Json};

use crate::api::error::Result;
use crate::api::state::AppState;
use crate::api::types::{EntityRequest, HealthResponse, SearchEntitiesRequest};
use crate::guard::{ReadinessPhase, SessionBackend};
use crate::telegram::{Directory, EntitySummary, MemberSummary, MessageSummary};

pub const READY_MESSAGE: &str =
    "Telegram API service is running and the Telegram client is connected!";
pub const NOT_READY_MESSAGE: &str =
    "Telegram API service is running but the Telegram client is not connected yet.";

/// GET / - readiness from the current snapshot; never starts a connection.
pub async fn root<B: SessionBackend>(
    State(state): State<AppState<B>>,
) -> (StatusCode, &'static str) {
    match state.guard.phase() {
        ReadinessPhase::Ready => (StatusCode::OK, READY_MESSAGE),
        _ => (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_MESSAGE),
    }
}

/// GET /health
pub async fn health<B: SessionBackend>(State(state): State<AppState<B>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        phase: state.guard.phase(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.config.uptime_seconds(),
    })
}

/// POST /search_entities
pub async fn search_entities<B>(
    State(state): State<AppState<B>>,
    Json(req): Json<SearchEntitiesRequest>,
) -> Result<Json<Vec<EntitySummary>>>
where
    B: SessionBackend,
    B::Handle: Directory,
{
    let query = req.validate()?;
    let client = state.guard.ensure_ready().await?;

    let results = client.search_entities(&query.keyword, query.limit).await?;
    Ok(Json(results))
}

/// POST /get_messages
pub async fn get_messages<B>(
    State(state): State<AppState<B>>,
    Json(req): Json<EntityRequest>,
) -> Result<Json<Vec<MessageSummary>>>
where
    B: SessionBackend,
    B::Handle: Directory,
{
    let query = req.validate()?;
    let client = state.guard.ensure_ready().await?;

    let messages = client
        .get_messages(&query.entity, query.limit, query.offset_id)
        .await?;
    Ok(Json(messages))
}

/// POST /get_members
pub async fn get_members<B>(
    State(state): State<AppState<B>>,
    Json(req): Json<EntityRequest>,
) -> Result<Json<Vec<MemberSummary>>>
where
    B: SessionBackend,
    B::Handle: Directory,
{
    let query = req.validate()?;
    let client = state.guard.ensure_ready().await?;

    let members = client.get_members(&query.entity, query.limit).await?;
    Ok(Json(members))
}

//! REST entry point. Deserializes the request DTO, registers the job's
//! owner record (so subscriptions can be authorized before and after the
//! job exists), runs the orchestrator, and returns the assembled response.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use platefinder_common::protocol::OwnerRecord;
use platefinder_common::types::SearchRequest;

use crate::AppState;

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut request): Json<SearchRequest>,
) -> impl IntoResponse {
    if request.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "query must be non-empty"})),
        )
            .into_response();
    }
    if request.session_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "sessionId must be non-empty"})),
        )
            .into_response();
    }

    // Pin the request id before the pipeline runs so the owner record and
    // any pre-existing pending subscriptions key on the same id.
    let request_id = request
        .request_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.request_id = Some(request_id.clone());

    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    state.hub.register_job(
        &request_id,
        OwnerRecord {
            owner_user_id: user_id,
            owner_session_id: Some(request.session_id.clone()),
        },
    );

    info!(request_id = %request_id, session_id = %request.session_id, "Search accepted");
    let response = state.orchestrator.run(request).await;
    Json(response).into_response()
}

//! Request handlers for the bridge endpoint.

use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use wbridge_core::{BridgeError, SyncConfig};

/// Query string of a bridge request.
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
    pub id: Option<String>,
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn bad_request(message: impl Into<String>) -> Response {
    let message = message.into();
    debug!("Rejecting bridge request: {}", message);
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// Dispatch `GetId`, `GetResult` and `SetResult` on any path ending in the
/// bridge endpoint path.
pub async fn handle_action(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    Query(query): Query<ActionQuery>,
    body: Bytes,
) -> Response {
    if !uri.path().ends_with(SyncConfig::ENDPOINT_PATH) {
        return StatusCode::NOT_FOUND.into_response();
    }

    match (method, query.action.as_deref()) {
        (Method::GET, Some(SyncConfig::ACTION_GET_ID)) => {
            let reply = state.service.assign_id();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain")],
                reply.to_body(),
            )
                .into_response()
        }
        (Method::GET, Some(SyncConfig::ACTION_GET_RESULT)) => {
            let Some(raw) = query.id.as_deref() else {
                return bad_request("GetResult requires an id");
            };
            let Ok(id) = raw.trim().parse::<i64>() else {
                return bad_request(format!("Invalid id: {}", raw));
            };
            match state.service.get_result(id).await {
                Ok(record) => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    record.unwrap_or_default(),
                )
                    .into_response(),
                Err(e @ BridgeError::InvalidSourceId(_)) => bad_request(e.to_string()),
                Err(e) => {
                    warn!("GetResult failed: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                }
            }
        }
        (Method::POST, Some(SyncConfig::ACTION_SET_RESULT)) => {
            if state.service.set_result(body) {
                StatusCode::NO_CONTENT.into_response()
            } else {
                bad_request("Result record does not carry an assignable source id")
            }
        }
        (method, action) => bad_request(format!(
            "Unsupported action {:?} for {}",
            action.unwrap_or(""),
            method
        )),
    }
}

//! Release handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::release::{OutgoingServer, ReleaseReport};
use crate::web::dto::{ApiResponse, ReleaseRequest, ValidatedJson};
use crate::web::error::ApiError;
use crate::web::handlers::{parse_id, AppState};

/// POST /api/messages/:id/release - Relay a stored message upstream.
pub async fn release_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<ReleaseRequest>,
) -> Result<Json<ApiResponse<ReleaseReport>>, ApiError> {
    let id = parse_id(&id)?;
    let message = state.store.get(&id)?;

    let target = match (req.target(), req.name.as_deref()) {
        (Some(target), _) => target,
        (None, Some(name)) => state
            .outgoing
            .get(name)
            .ok_or_else(|| ApiError::not_found(format!("outgoing server '{}' not found", name)))?,
        (None, None) => return Err(ApiError::field("host", "Either host or name is required")),
    };

    let report = state.releaser.release(&message, &target).await?;

    if req.save && req.host.is_some() {
        if target.name.is_empty() {
            tracing::warn!(id = %id, "Release target not saved: no name given");
        } else {
            state.outgoing.insert(target);
        }
    }

    Ok(Json(ApiResponse::new(report)))
}

/// GET /api/outgoing-smtp - Saved release targets, without passwords.
pub async fn list_outgoing_servers(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<OutgoingServer>>> {
    Json(ApiResponse::new(state.outgoing.list()))
}

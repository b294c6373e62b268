//! Fault injection handlers.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::chaos::ChaosSettings;
use crate::web::dto::ApiResponse;
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// GET /api/chaos - Current fault injection settings.
pub async fn get_chaos(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ChaosSettings>> {
    Json(ApiResponse::new(state.chaos.settings()))
}

/// PUT /api/chaos - Replace the settings.
pub async fn update_chaos(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<ChaosSettings>,
) -> Result<Json<ApiResponse<ChaosSettings>>, ApiError> {
    let chaos = state.chaos.clone();
    let updated = tokio::task::spawn_blocking(move || chaos.update(settings))
        .await
        .map_err(|e| ApiError::internal(format!("chaos update task failed: {}", e)))??;
    Ok(Json(ApiResponse::new(updated)))
}

/// DELETE /api/chaos - Turn fault injection off.
pub async fn disable_chaos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ChaosSettings>>, ApiError> {
    let chaos = state.chaos.clone();
    let updated = tokio::task::spawn_blocking(move || chaos.disable())
        .await
        .map_err(|e| ApiError::internal(format!("chaos update task failed: {}", e)))??;
    Ok(Json(ApiResponse::new(updated)))
}

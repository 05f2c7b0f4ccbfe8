//! Root and health endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::{ApiError, AppState};

/// GET /api/
pub async fn root() -> &'static str {
    "root api route"
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            let error = ApiError::new("STORE_UNAVAILABLE", e.to_string());
            (StatusCode::SERVICE_UNAVAILABLE, Json(error)).into_response()
        }
    }
}

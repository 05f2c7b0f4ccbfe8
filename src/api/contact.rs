//! Contact form endpoint

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};

use super::{ApiError, AppState};
use crate::services::{ContactConfirmation, ContactRequest};

pub fn router() -> Router<AppState> {
    Router::new().route("/sendMail", post(send_mail))
}

/// POST /api/sendMail
async fn send_mail(
    State(state): State<AppState>,
    body: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<ContactConfirmation>, ApiError> {
    let Json(request) = body?;
    let confirmation = state.contact.relay(request).await?;
    Ok(Json(confirmation))
}

//! Third-party verification endpoints
//!
//! - POST /api/verifyCaptcha - Check a reCAPTCHA token
//! - POST /api/registerNewsletterEmail - Register a newsletter lead

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::models::VerificationOutcome;

#[derive(Debug, Deserialize)]
pub struct VerifyCaptchaRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterEmailRequest {
    #[serde(default)]
    pub email: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/verifyCaptcha", post(verify_captcha))
        .route("/registerNewsletterEmail", post(register_newsletter_email))
}

async fn verify_captcha(
    State(state): State<AppState>,
    body: Result<Json<VerifyCaptchaRequest>, JsonRejection>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let Json(request) = body?;
    let outcome = state.captcha.verify(&request.token).await?;
    Ok(Json(outcome))
}

async fn register_newsletter_email(
    State(state): State<AppState>,
    body: Result<Json<RegisterEmailRequest>, JsonRejection>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let Json(request) = body?;
    let outcome = state.leads.register_lead(request.email.trim()).await?;
    Ok(Json(outcome))
}

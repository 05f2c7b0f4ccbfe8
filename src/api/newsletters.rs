//! Newsletter API endpoints
//!
//! - GET /api/newsletters - Number of newsletter records
//! - GET /api/newsletters/{id} - One record by numeric id

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};

use super::{ApiError, AppState};
use crate::models::NewsletterRecord;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/newsletters", get(count_newsletters))
        .route("/newsletters/{id}", get(get_newsletter))
}

async fn count_newsletters(State(state): State<AppState>) -> Result<Json<u64>, ApiError> {
    let count = state.newsletters.count().await?;
    Ok(Json(count))
}

async fn get_newsletter(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<NewsletterRecord>, ApiError> {
    let Path(id) = path?;
    let newsletter_id: i64 = id
        .parse()
        .map_err(|_| ApiError::validation_error(format!("newsletter id must be an integer, got '{}'", id)))?;

    let record = state.newsletters.find_by_id(newsletter_id).await?;
    Ok(Json(record))
}

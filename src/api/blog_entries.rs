//! Blog entry API endpoints
//!
//! - GET  /api/blogEntries - List every entry
//! - GET  /api/blogEntries/{id} - Get one entry
//! - POST /api/blogEntries/{id}/add-comment - Append a comment
//! - POST /api/insertMany - Bulk insert entries

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::db::InsertManySummary;
use crate::models::{BlogEntry, NewComment};

/// Body of a bulk insert
#[derive(Debug, Deserialize)]
pub struct InsertManyRequest {
    #[serde(rename = "blogEntries")]
    pub blog_entries: Vec<BlogEntry>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blogEntries", get(list_entries))
        .route("/blogEntries/", get(list_entries))
        .route("/blogEntries/{id}", get(get_entry))
        .route("/blogEntries/{id}/add-comment", post(add_comment))
        .route("/insertMany", post(insert_many))
}

/// GET /api/blogEntries
async fn list_entries(State(state): State<AppState>) -> Result<Json<Vec<BlogEntry>>, ApiError> {
    let entries = state.blog_entries.find_all().await?;
    Ok(Json(entries))
}

/// GET /api/blogEntries/{id}
async fn get_entry(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<BlogEntry>, ApiError> {
    let Path(id) = path?;
    let entry = state.blog_entries.find_by_id(&id).await?;
    Ok(Json(entry))
}

/// POST /api/blogEntries/{id}/add-comment
async fn add_comment(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<NewComment>, JsonRejection>,
) -> Result<Json<BlogEntry>, ApiError> {
    let Path(id) = path?;
    let Json(input) = body?;
    let entry = state.comments.submit(&id, input).await?;
    Ok(Json(entry))
}

/// POST /api/insertMany
async fn insert_many(
    State(state): State<AppState>,
    body: Result<Json<InsertManyRequest>, JsonRejection>,
) -> Result<Json<InsertManySummary>, ApiError> {
    let Json(request) = body?;
    let summary = state.blog_entries.insert_many(request.blog_entries).await?;
    Ok(Json(summary))
}

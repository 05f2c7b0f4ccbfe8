//! API layer - HTTP handlers and routing
//!
//! Every route lives under `/api`:
//! - Blog entries and comments
//! - Newsletter counts and records
//! - Contact form relay
//! - reCAPTCHA verification and newsletter lead registration

pub mod blog_entries;
pub mod contact;
pub mod error;
pub mod newsletters;
pub mod site;
pub mod state;
pub mod verification;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiErrorDetail};
pub use state::AppState;

/// Build the routes mounted under `/api`
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(site::health))
        .merge(blog_entries::router())
        .merge(newsletters::router())
        .merge(contact::router())
        .merge(verification::router())
}

/// Build the complete router with middleware
///
/// `cors_origin` of `*` allows any origin; anything else must be a single
/// valid origin.
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin.trim();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    let cors = if origin == "*" {
        cors.allow_origin(Any)
    } else {
        let origin = origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {}", origin))?;
        cors.allow_origin(origin)
    };

    let router = Router::new()
        .route("/api", get(site::root))
        .route("/api/", get(site::root))
        .nest("/api", build_api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    Ok(router)
}

use axum::{routing::post, Router};

pub mod alerts;
pub mod analyze;
pub mod system;

/// Router for all analysis endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/analyze", analyze::router())
        .route("/alerts/decide", post(alerts::decide))
}

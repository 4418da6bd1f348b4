use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use insightforge_ai::OriginType;

use crate::app::services::{request_scope, AppServices};
use crate::app::{dto, errors};

/// Normalize a ready-made analysis and decide whether it warrants a notification.
pub async fn decide(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::DecideAlertRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let (cancel, _guard) = request_scope();
    let origin = OriginType::parse(&body.origin);
    match services
        .pipeline()
        .assess(&body.analysis, &origin, &body.rules, &cancel)
        .await
    {
        Ok(assessment) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "insight": assessment.insight,
                "decision": assessment.decision,
            })),
        )
            .into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

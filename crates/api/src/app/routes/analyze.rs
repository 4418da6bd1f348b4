use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::info;

use insightforge_ai::{OriginType, ProjectAnalysisJob};
use insightforge_core::{OrganizationId, ProjectId};
use insightforge_infra::{MediaRequest, PendingFilter};

use crate::app::services::{request_scope, AppServices};
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/project", post(analyze_project))
        .route("/comments", post(analyze_comments))
        .route("/organization", post(analyze_organization))
        .route("/media", post(analyze_media))
}

pub async fn analyze_project(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::AnalyzeProjectRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let project_id: ProjectId = match dto::parse_id(&body.project_id, "project_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if body.analysis_type.trim().is_empty() {
        return errors::invalid_input("analysis_type is required");
    }

    let (cancel, _guard) = request_scope();
    let pipeline = services.pipeline();
    let job = ProjectAnalysisJob::new(project_id, OriginType::parse(&body.analysis_type), body.data);

    let insight = match pipeline.analyze(&job, &cancel).await {
        Ok(i) => i,
        Err(e) => return errors::pipeline_error_to_response(e),
    };

    let notification = match &body.notification_rules {
        Some(rules) => Some(pipeline.decide_notification(&insight, rules, &cancel).await),
        None => None,
    };

    info!(
        project_id = %project_id,
        insight_id = %insight.id(),
        category = %insight.category(),
        "project analysis complete"
    );

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "insight": insight,
            "notification": notification,
        })),
    )
        .into_response()
}

pub async fn analyze_comments(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::AnalyzeCommentsRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let project_id: Option<ProjectId> = match body.project_id.as_deref() {
        Some(raw) => match dto::parse_id(raw, "project_id") {
            Ok(v) => Some(v),
            Err(resp) => return resp,
        },
        None => None,
    };
    if body.limit == Some(0) {
        return errors::invalid_input("limit must be positive");
    }

    let filter = PendingFilter::comments()
        .for_project(project_id)
        .with_limit(body.limit);
    let (cancel, _guard) = request_scope();

    match services.pipeline().analyze_pending_comments(&filter, &cancel).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "total": report.total,
                "succeeded": report.succeeded,
                "failed": report.failed,
                "items": report.items,
            })),
        )
            .into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn analyze_organization(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::AnalyzeOrganizationRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let organization_id: OrganizationId = match dto::parse_id(&body.organization_id, "organization_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let (cancel, _guard) = request_scope();
    match services
        .pipeline()
        .organizational_insight(organization_id, body.context, &cancel)
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "insight": result.insight,
                "metrics": result.metrics,
            })),
        )
            .into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

pub async fn analyze_media(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<MediaRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::body(payload) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let (cancel, _guard) = request_scope();
    match services.pipeline().process_media(body, &cancel).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "insight": result.insight,
                "job": result.job,
            })),
        )
            .into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

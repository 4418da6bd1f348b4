use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use insightforge_ai::{NotificationRules, OrganizationContext};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AnalyzeProjectRequest {
    pub project_id: String,
    pub analysis_type: String,
    #[serde(default)]
    pub data: JsonValue,
    /// Also run the Alert Decision Engine when present.
    pub notification_rules: Option<NotificationRules>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzeCommentsRequest {
    pub project_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeOrganizationRequest {
    pub organization_id: String,
    #[serde(default)]
    pub context: OrganizationContext,
}

#[derive(Debug, Deserialize)]
pub struct DecideAlertRequest {
    pub analysis: JsonValue,
    pub origin: String,
    #[serde(default)]
    pub rules: NotificationRules,
}

// -------------------------
// Mapping helpers
// -------------------------

/// Body extraction failures use the same envelope as every other error.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| errors::invalid_input(rejection.body_text()))
}

pub fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.trim()
        .parse()
        .map_err(|_| errors::invalid_input(format!("invalid {what}")))
}

#[cfg(test)]
mod tests {
    use insightforge_core::ProjectId;

    use super::*;

    #[test]
    fn comments_request_fields_are_optional() {
        let req: AnalyzeCommentsRequest = serde_json::from_str("{}").unwrap();
        assert!(req.project_id.is_none());
        assert!(req.limit.is_none());
    }

    #[test]
    fn decide_request_defaults_rules() {
        let req: DecideAlertRequest =
            serde_json::from_str(r#"{"analysis": {}, "origin": "sla"}"#).unwrap();
        assert_eq!(req.rules, NotificationRules::default());
    }

    #[test]
    fn bad_ids_are_rejected() {
        assert!(parse_id::<ProjectId>("not-a-uuid", "project_id").is_err());
        let id = ProjectId::new();
        assert_eq!(parse_id::<ProjectId>(&id.to_string(), "project_id").ok(), Some(id));
    }
}

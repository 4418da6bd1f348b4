//! Analysis jobs: what to ask the inference service for each origin kind.

use insightforge_core::{OrganizationId, ProjectId, RecordId};
use serde_json::{Value as JsonValue, json};

use crate::error::AiError;
use crate::inference::{ChatMessage, InferenceRequest};
use crate::insight::OriginType;
use crate::organization::{OrganizationContext, OrganizationMetrics};

const ANALYST_PROMPT: &str = "You are a project analytics assistant. Reply with a single fenced ```json block \
containing an object with a \"type\" field naming the analysis kind, plus executive_summary, \
confidence_score, recommendations and risk_factors.";

/// One analysis to run through inference.
///
/// Jobs only describe the work; executing it (retry, fallback, persistence)
/// belongs to the pipeline.
pub trait AnalysisJob: Send + Sync {
    /// Which normalizer rule sets apply to the result.
    fn origin(&self) -> OriginType;

    /// Validate the input and build the inference request.
    fn request(&self) -> Result<InferenceRequest, AiError>;

    fn project_id(&self) -> Option<ProjectId> {
        None
    }
}

/// Team performance, cost, SLA or whole-project analysis of a data snapshot.
#[derive(Debug, Clone)]
pub struct ProjectAnalysisJob {
    project_id: ProjectId,
    origin: OriginType,
    data: JsonValue,
}

impl ProjectAnalysisJob {
    pub fn new(project_id: ProjectId, origin: OriginType, data: JsonValue) -> Self {
        Self {
            project_id,
            origin,
            data,
        }
    }
}

impl AnalysisJob for ProjectAnalysisJob {
    fn origin(&self) -> OriginType {
        self.origin.clone()
    }

    fn request(&self) -> Result<InferenceRequest, AiError> {
        if !self.data.is_object() {
            return Err(AiError::invalid_input("project data must be a JSON object"));
        }

        Ok(InferenceRequest::new(vec![
            ChatMessage::system(ANALYST_PROMPT),
            ChatMessage::user(format!(
                "Analysis kind: {}\nProject: {}\nData:\n{}",
                self.origin, self.project_id, self.data
            )),
        ]))
    }

    fn project_id(&self) -> Option<ProjectId> {
        Some(self.project_id)
    }
}

/// Sentiment/urgency analysis of a pending external comment.
#[derive(Debug, Clone)]
pub struct CommentAnalysisJob {
    pub record_id: RecordId,
    pub project_id: Option<ProjectId>,
    pub text: String,
    pub author: Option<String>,
}

impl AnalysisJob for CommentAnalysisJob {
    fn origin(&self) -> OriginType {
        OriginType::ExternalComment
    }

    fn request(&self) -> Result<InferenceRequest, AiError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AiError::invalid_input(format!(
                "comment {} has no text",
                self.record_id
            )));
        }

        let author = self.author.as_deref().unwrap_or("anonymous");
        Ok(InferenceRequest::new(vec![
            ChatMessage::system(ANALYST_PROMPT),
            ChatMessage::user(format!(
                "Analysis kind: external_comment\nAuthor: {author}\nComment:\n{text}"
            )),
        ])
        .with_max_tokens(600))
    }

    fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }
}

/// Narrative overview of an organization, grounded in computed metrics.
#[derive(Debug, Clone)]
pub struct OrganizationalAnalysisJob {
    organization_id: OrganizationId,
    context: OrganizationContext,
    metrics: OrganizationMetrics,
}

impl OrganizationalAnalysisJob {
    pub fn new(organization_id: OrganizationId, context: OrganizationContext) -> Self {
        let metrics = OrganizationMetrics::compute(&context.projects);
        Self {
            organization_id,
            context,
            metrics,
        }
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn metrics(&self) -> &OrganizationMetrics {
        &self.metrics
    }
}

impl AnalysisJob for OrganizationalAnalysisJob {
    fn origin(&self) -> OriginType {
        OriginType::Organizational
    }

    fn request(&self) -> Result<InferenceRequest, AiError> {
        let facts = json!({
            "organization_id": self.organization_id,
            "metrics": self.metrics,
            "team_size": self.context.team_size,
            "projects": self.context.projects,
        });

        Ok(InferenceRequest::new(vec![
            ChatMessage::system(ANALYST_PROMPT),
            ChatMessage::user(format!("Analysis kind: organizational\nFacts:\n{facts}")),
        ]))
    }
}

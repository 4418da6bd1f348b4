//! `insightforge-ai`
//!
//! **Responsibility:** turn raw, loosely-typed analysis output into scored insights
//! and notification decisions.
//!
//! This crate owns no I/O of its own:
//! - Inference goes through the `InferenceClient` seam, executed by `insightforge-invoke`.
//! - Storage and HTTP live in `insightforge-infra` / `insightforge-api`.
//! - Normalization is deterministic and never fails; bad input degrades to defaults.

pub mod alerting;
pub mod artifact;
pub mod error;
pub mod fields;
pub mod inference;
pub mod insight;
pub mod job;
pub mod normalizer;
pub mod organization;

pub use alerting::{
    AlertDecisionEngine, NotificationCategory, NotificationDecision, NotificationRule,
    NotificationRules, Priority,
};
pub use artifact::ResponseArtifact;
pub use error::AiError;
pub use fields::extract_array_from_field;
pub use inference::{
    ChatMessage, ChatRole, InferenceClient, InferenceRequest, InferenceResponse, ModelTier,
    fallback_plan, run_inference,
};
pub use insight::{AlertDomain, Category, CriticalAlert, Insight, OriginType, Severity};
pub use job::{AnalysisJob, CommentAnalysisJob, OrganizationalAnalysisJob, ProjectAnalysisJob};
pub use normalizer::{criticality_score, normalize, normalize_at};
pub use organization::{OrganizationContext, OrganizationMetrics, ProjectSnapshot, ProjectStatus};

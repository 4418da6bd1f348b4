//! Analysis pipeline: inference through the fallback chain, artifact parsing,
//! normalization, then best-effort persistence.
//!
//! Only the inference result and the primary store read are load-bearing.
//! Insight and notification writes are side channels: their failures are
//! logged and the analysis result is still returned.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use insightforge_ai::fields::first_text;
use insightforge_ai::{
    AiError, AlertDecisionEngine, AnalysisJob, CommentAnalysisJob, InferenceClient, Insight,
    ModelTier, NotificationDecision, NotificationRules, OrganizationContext, OrganizationMetrics,
    OrganizationalAnalysisJob, OriginType, ResponseArtifact, normalize, run_inference,
};
use insightforge_core::{InsightId, OrganizationId, ProjectId, RecordId};
use insightforge_invoke::{
    AsyncJob, CallExecutor, FallbackChain, InvocationError, JobPoller, PollerConfig,
};

use crate::media::{MediaJobs, MediaRequest};
use crate::sink::{InsightSink, TracingInsightSink};
use crate::store::{
    INSIGHTS, NOTIFICATIONS, NewRecord, PendingFilter, ProcessingOutcome, RecordStore, StoreError,
    StoredRecord,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not configured: {0}")]
    Configuration(String),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AiError> for PipelineError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::InvalidInput(msg) => Self::InvalidInput(msg),
            AiError::InferenceFailed(e) => Self::Invocation(e),
            AiError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Configuration(_) => "configuration_error",
            Self::Invocation(e) => e.root_cause().code(),
            Self::Store(_) => "store_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Invocation(e) if matches!(e.root_cause(), InvocationError::Cancelled))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub record_id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight_id: Option<InsightId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationalInsight {
    pub insight: Insight,
    pub metrics: OrganizationMetrics,
    /// False when the narrative came from the deterministic metrics summary.
    pub narrative: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaInsight {
    pub insight: Insight,
    pub job: Option<AsyncJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub insight: Insight,
    pub decision: NotificationDecision,
}

pub struct AnalysisPipeline {
    client: Arc<dyn InferenceClient>,
    tiers: Vec<ModelTier>,
    temperature: f32,
    max_tokens: u32,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn InsightSink>,
    media: Option<Arc<MediaJobs>>,
    poller: PollerConfig,
    alerts: AlertDecisionEngine,
}

impl AnalysisPipeline {
    pub fn new(client: Arc<dyn InferenceClient>, tiers: Vec<ModelTier>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            client,
            tiers,
            temperature: 0.3,
            max_tokens: 1500,
            store,
            sink: Arc::new(TracingInsightSink),
            media: None,
            poller: PollerConfig::default(),
            alerts: AlertDecisionEngine::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn InsightSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_media(mut self, media: Arc<MediaJobs>, poller: PollerConfig) -> Self {
        self.media = Some(media);
        self.poller = poller;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn chain(&self, cancel: &CancellationToken) -> FallbackChain {
        FallbackChain::new(CallExecutor::with_cancellation(cancel.clone()))
    }

    /// Run inference for `job` and return the raw analysis object it produced.
    async fn infer(&self, job: &dyn AnalysisJob, cancel: &CancellationToken) -> Result<JsonValue, PipelineError> {
        if self.tiers.is_empty() {
            return Err(PipelineError::Configuration("no inference models configured".to_string()));
        }

        let mut request = job.request()?;
        request.temperature = self.temperature;
        request.max_tokens = request.max_tokens.min(self.max_tokens);

        let report = run_inference(&self.chain(cancel), self.client.as_ref(), &self.tiers, &request).await;
        debug!(
            origin = %job.origin(),
            attempts = report.attempts,
            abandoned = report.abandoned.len(),
            outcome = report.outcome.label(),
            "inference finished"
        );
        let response = report.outcome.into_result()?;

        let artifact = ResponseArtifact::from_candidates(&response.candidates);
        match &artifact {
            ResponseArtifact::Recognized { kind, .. } => debug!(kind = %kind, "structured artifact found"),
            ResponseArtifact::FreeText(_) => debug!("free-text response"),
            ResponseArtifact::Unparsable(_) => warn!(origin = %job.origin(), "unparsable artifact, normalizing empty analysis"),
        }
        Ok(artifact.into_analysis_payload())
    }

    /// Single analysis: inference, normalization, best-effort persistence.
    pub async fn analyze(&self, job: &dyn AnalysisJob, cancel: &CancellationToken) -> Result<Insight, PipelineError> {
        let payload = self.infer(job, cancel).await?;
        let insight = normalize(&payload, &job.origin());
        self.record_insight(&insight, job.project_id(), None).await;
        Ok(insight)
    }

    /// Normalize an analysis the caller already has, then decide on notification.
    pub async fn assess(
        &self,
        analysis: &JsonValue,
        origin: &OriginType,
        rules: &NotificationRules,
        cancel: &CancellationToken,
    ) -> Result<Assessment, PipelineError> {
        if !analysis.is_object() {
            return Err(PipelineError::InvalidInput("analysis must be a JSON object".to_string()));
        }
        let insight = normalize(analysis, origin);
        self.record_insight(&insight, None, None).await;
        let decision = self.decide_notification(&insight, rules, cancel).await;
        Ok(Assessment { insight, decision })
    }

    /// Process every pending comment. Each one is analyzed independently and
    /// always marked processed, with the error attached when it failed.
    pub async fn analyze_pending_comments(
        &self,
        filter: &PendingFilter,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        let pending = self.store.get_pending(filter).await?;
        let mut report = BatchReport {
            total: pending.len(),
            ..BatchReport::default()
        };
        info!(collection = %filter.collection, pending = pending.len(), "processing pending records");

        for record in pending {
            if cancel.is_cancelled() {
                warn!(remaining = report.total - report.items.len(), "batch cancelled, leaving remaining records pending");
                break;
            }

            let (outcome, item) = match self.analyze_comment(&record, cancel).await {
                Ok(insight) => {
                    report.succeeded += 1;
                    (
                        ProcessingOutcome::Succeeded {
                            insight_id: insight.id(),
                        },
                        BatchItem {
                            record_id: record.id,
                            insight_id: Some(insight.id()),
                            category: Some(insight.category().to_string()),
                            error: None,
                        },
                    )
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(record_id = %record.id, error = %error, "comment analysis failed");
                    (
                        ProcessingOutcome::Failed {
                            error: error.to_string(),
                        },
                        BatchItem {
                            record_id: record.id,
                            insight_id: None,
                            category: None,
                            error: Some(error.to_string()),
                        },
                    )
                }
            };

            if let Err(e) = self.store.mark_processed(record.id, outcome).await {
                warn!(record_id = %record.id, error = %e, "failed to mark record processed");
            }
            report.items.push(item);
        }

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }

    async fn analyze_comment(&self, record: &StoredRecord, cancel: &CancellationToken) -> Result<Insight, PipelineError> {
        let data = &record.data;
        let project_id = first_text(data, &["project_id"]).and_then(|p| p.parse::<ProjectId>().ok());
        let job = CommentAnalysisJob {
            record_id: record.id,
            project_id,
            text: first_text(data, &["text", "content", "comment", "body"])
                .unwrap_or_default()
                .to_string(),
            author: first_text(data, &["author", "author_name"]).map(str::to_string),
        };

        let payload = self.infer(&job, cancel).await?;
        let insight = normalize(&payload, &job.origin());
        self.record_insight(&insight, project_id, Some(record.id)).await;

        let annotation = json!({
            "insight_id": insight.id(),
            "insight_category": insight.category(),
            "criticality_score": insight.criticality_score(),
        });
        if let Err(e) = self.store.update(record.id, annotation).await {
            warn!(record_id = %record.id, error = %e, "failed to annotate source record");
        }
        Ok(insight)
    }

    /// Organization overview. Metrics are always computed locally; when the
    /// narrative inference fails the metrics summary stands in for it.
    pub async fn organizational_insight(
        &self,
        organization_id: OrganizationId,
        context: OrganizationContext,
        cancel: &CancellationToken,
    ) -> Result<OrganizationalInsight, PipelineError> {
        let job = OrganizationalAnalysisJob::new(organization_id, context);
        let metrics = job.metrics().clone();

        let (mut payload, narrative) = match self.infer(&job, cancel).await {
            Ok(payload) => (payload, true),
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                warn!(organization_id = %organization_id, error = %error, "organizational narrative unavailable, using metrics summary");
                (metrics.to_analysis_payload(), false)
            }
        };

        let has_summary = first_text(&payload, &["executive_summary", "summary"]).is_some();
        if let Some(obj) = payload.as_object_mut() {
            if !has_summary {
                obj.insert("executive_summary".to_string(), JsonValue::String(metrics.summary()));
            }
            obj.entry("metrics").or_insert_with(|| json!(metrics));
            obj.insert("organization_id".to_string(), json!(organization_id));
        }

        let insight = normalize(&payload, &OriginType::Organizational);
        self.record_insight(&insight, None, None).await;

        Ok(OrganizationalInsight {
            insight,
            metrics,
            narrative,
        })
    }

    /// Submit media to the job service, wait for the result under the poller's
    /// deadline and normalize it.
    pub async fn process_media(
        &self,
        request: MediaRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaInsight, PipelineError> {
        let media = self
            .media
            .clone()
            .ok_or_else(|| PipelineError::Configuration("media processing is not configured".to_string()))?;
        if request.media_url.trim().is_empty() {
            return Err(PipelineError::InvalidInput("media_url is required".to_string()));
        }

        let origin = request
            .origin
            .as_deref()
            .map(OriginType::parse)
            .unwrap_or(OriginType::ExternalComment);

        let poller = JobPoller::new(self.poller).with_cancellation(cancel.clone());
        let report = poller.run(media, &request).await;
        // Cleanup runs detached; nobody needs to wait for it.
        drop(report.cleanup);

        let result = report.outcome.into_result()?;
        let payload = match result {
            obj @ JsonValue::Object(_) => obj,
            JsonValue::String(text) => ResponseArtifact::parse(&text).into_analysis_payload(),
            other => json!({ "executive_summary": other.to_string() }),
        };

        let insight = normalize(&payload, &origin);
        self.record_insight(&insight, None, None).await;

        Ok(MediaInsight {
            insight,
            job: report.job,
        })
    }

    /// Alert Decision Engine, inference-backed when the rules ask for it. A
    /// decision to notify is stored as a notification record, best-effort.
    pub async fn decide_notification(
        &self,
        insight: &Insight,
        rules: &NotificationRules,
        cancel: &CancellationToken,
    ) -> NotificationDecision {
        let decision = self
            .alerts
            .decide_with_inference(&self.chain(cancel), self.client.as_ref(), &self.tiers, insight, rules)
            .await;

        if decision.should_notify {
            let record = NewRecord::new(
                NOTIFICATIONS,
                json!({
                    "insight_id": insight.id(),
                    "priority": decision.priority,
                    "category": decision.category,
                    "message": decision.message,
                    "expires_at": decision.expires_at,
                }),
            );
            if let Err(e) = self.store.insert(record).await {
                warn!(insight_id = %insight.id(), error = %e, "failed to store notification");
            }
        }
        decision
    }

    async fn record_insight(&self, insight: &Insight, project_id: Option<ProjectId>, source: Option<RecordId>) {
        self.sink.emit(insight);

        let mut data = match serde_json::to_value(insight) {
            Ok(data) => data,
            Err(e) => {
                warn!(insight_id = %insight.id(), error = %e, "insight not serializable, skipping persistence");
                return;
            }
        };
        if let Some(obj) = data.as_object_mut() {
            if let Some(project_id) = project_id {
                obj.insert("project_id".to_string(), json!(project_id));
            }
            if let Some(source) = source {
                obj.insert("source_record_id".to_string(), json!(source));
            }
        }

        if let Err(e) = self.store.insert(NewRecord::new(INSIGHTS, data)).await {
            warn!(insight_id = %insight.id(), error = %e, "failed to store insight");
        }
    }
}

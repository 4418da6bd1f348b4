//! Alert Decision Engine: insight + organization rules → notification decision.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use insightforge_invoke::FallbackChain;

use crate::artifact::ResponseArtifact;
use crate::fields::number;
use crate::inference::{ChatMessage, InferenceClient, InferenceRequest, ModelTier, run_inference};
use crate::insight::{Category, Insight};

pub const DEFAULT_EXPIRY_HOURS: u32 = 24;
/// Longest expiry honoured from rules or inference; larger values are capped.
pub const MAX_EXPIRY_HOURS: u32 = 24 * 365;
const DECISION_KIND: &str = "notification_decision";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "urgent" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationCategory {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDecision {
    pub should_notify: bool,
    pub priority: Priority,
    pub message: String,
    pub category: NotificationCategory,
    pub expires_at: DateTime<Utc>,
}

/// How to react to insights of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub notify: bool,
    pub priority: Priority,
    pub category: NotificationCategory,
    pub expires_in_hours: u32,
}

impl NotificationRule {
    /// Built-in rule table keyed by insight category.
    pub fn default_for(category: Category) -> Self {
        let (notify, priority, kind, hours) = match category {
            Category::HrCritical | Category::FinancialCritical | Category::SlaCritical => {
                (true, Priority::Critical, NotificationCategory::Error, 48)
            }
            Category::Hr | Category::Financial => {
                (true, Priority::High, NotificationCategory::Warning, DEFAULT_EXPIRY_HOURS)
            }
            Category::Sla => (true, Priority::Medium, NotificationCategory::Warning, DEFAULT_EXPIRY_HOURS),
            Category::General => (false, Priority::Low, NotificationCategory::Info, DEFAULT_EXPIRY_HOURS),
        };

        Self {
            notify,
            priority,
            category: kind,
            expires_in_hours: hours,
        }
    }
}

/// Per-organization notification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationRules {
    pub enabled: bool,
    /// Decisions below this priority are kept but not delivered.
    pub min_priority: Priority,
    /// Ask the inference service instead of using the rule table.
    pub use_inference: bool,
    pub overrides: BTreeMap<Category, NotificationRule>,
}

impl Default for NotificationRules {
    fn default() -> Self {
        Self {
            enabled: true,
            min_priority: Priority::Low,
            use_inference: false,
            overrides: BTreeMap::new(),
        }
    }
}

impl NotificationRules {
    pub fn rule_for(&self, category: Category) -> NotificationRule {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| NotificationRule::default_for(category))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertDecisionEngine;

impl AlertDecisionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Rule-table decision.
    pub fn decide(&self, insight: &Insight, rules: &NotificationRules) -> NotificationDecision {
        self.decide_at(insight, rules, Utc::now())
    }

    pub fn decide_at(
        &self,
        insight: &Insight,
        rules: &NotificationRules,
        now: DateTime<Utc>,
    ) -> NotificationDecision {
        let rule = rules.rule_for(insight.category());
        let message = match insight.critical_alerts().first() {
            Some(alert) => format!("{}: {}", alert.title, insight.executive_summary()),
            None => insight.executive_summary().to_string(),
        };

        NotificationDecision {
            should_notify: rules.enabled && rule.notify && rule.priority >= rules.min_priority,
            priority: rule.priority,
            message,
            category: rule.category,
            expires_at: expiry(now, rule.expires_in_hours),
        }
    }

    /// Decision used whenever inference cannot produce one.
    pub fn default_decision(&self, now: DateTime<Utc>) -> NotificationDecision {
        NotificationDecision {
            should_notify: true,
            priority: Priority::Medium,
            message: "New project insight available for review.".to_string(),
            category: NotificationCategory::Info,
            expires_at: expiry(now, DEFAULT_EXPIRY_HOURS),
        }
    }

    pub fn decision_request(&self, insight: &Insight, rules: &NotificationRules) -> InferenceRequest {
        let facts = json!({
            "category": insight.category(),
            "criticality_score": insight.criticality_score(),
            "executive_summary": insight.executive_summary(),
            "critical_alerts": insight.critical_alerts(),
            "min_priority": rules.min_priority,
        });

        InferenceRequest::new(vec![
            ChatMessage::system(
                "You decide whether an insight warrants notifying project managers. Reply with a fenced \
                 ```json block: {\"type\": \"notification_decision\", \"should_notify\": bool, \
                 \"priority\": \"low|medium|high|critical\", \"message\": string, \
                 \"category\": \"info|warning|error|success\", \"expires_in_hours\": number}.",
            ),
            ChatMessage::user(facts.to_string()),
        ])
        .with_temperature(0.0)
        .with_max_tokens(400)
    }

    /// Read a decision out of an inference artifact. `None` when the artifact is
    /// not a well-formed decision.
    pub fn decision_from_artifact(
        &self,
        artifact: &ResponseArtifact,
        now: DateTime<Utc>,
    ) -> Option<NotificationDecision> {
        let ResponseArtifact::Recognized { kind, fields } = artifact else {
            return None;
        };
        if kind != DECISION_KIND {
            return None;
        }

        let should_notify = fields.get("should_notify")?.as_bool()?;
        let priority = Priority::parse(fields.get("priority")?.as_str()?)?;
        let message = fields
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::trim)
            .filter(|m| !m.is_empty())?
            .to_string();
        let category = fields
            .get("category")
            .and_then(|c| c.as_str())
            .and_then(NotificationCategory::parse)
            .unwrap_or(NotificationCategory::Info);
        let hours = number(fields.get("expires_in_hours"))
            .filter(|h| *h > 0.0)
            .map(|h| h.min(f64::from(MAX_EXPIRY_HOURS)).round() as u32)
            .unwrap_or(DEFAULT_EXPIRY_HOURS);

        Some(NotificationDecision {
            should_notify,
            priority,
            message,
            category,
            expires_at: expiry(now, hours),
        })
    }

    /// Rule table, or inference when `rules.use_inference` is set. Inference
    /// failure or an unusable answer yields `default_decision`.
    pub async fn decide_with_inference(
        &self,
        chain: &FallbackChain,
        client: &dyn InferenceClient,
        tiers: &[ModelTier],
        insight: &Insight,
        rules: &NotificationRules,
    ) -> NotificationDecision {
        if !rules.use_inference {
            return self.decide(insight, rules);
        }

        let request = self.decision_request(insight, rules);
        let report = run_inference(chain, client, tiers, &request).await;
        let now = Utc::now();

        let response = match report.outcome.into_result() {
            Ok(response) => response,
            Err(error) => {
                warn!(insight_id = %insight.id(), error = %error, "notification inference failed, using default decision");
                return self.default_decision(now);
            }
        };

        let artifact = ResponseArtifact::from_candidates(&response.candidates);
        match self.decision_from_artifact(&artifact, now) {
            Some(decision) => {
                debug!(insight_id = %insight.id(), priority = ?decision.priority, "notification decided by inference");
                decision
            }
            None => {
                warn!(insight_id = %insight.id(), "unusable notification decision, using default");
                self.default_decision(now)
            }
        }
    }
}

fn expiry(now: DateTime<Utc>, hours: u32) -> DateTime<Utc> {
    let hours = hours.min(MAX_EXPIRY_HOURS);
    now.checked_add_signed(ChronoDuration::hours(i64::from(hours)))
        .or_else(|| now.checked_add_signed(ChronoDuration::hours(i64::from(DEFAULT_EXPIRY_HOURS))))
        .unwrap_or(now)
}

//! Canonical insight model: origins, alerts, categories.

use std::fmt;

use chrono::{DateTime, Utc};
use insightforge_core::InsightId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// What kind of analysis produced a raw payload. Drives which rule sets run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OriginType {
    TeamPerformance,
    Cost,
    Sla,
    /// Whole-project analysis: HR, financial and SLA rule sets all apply.
    ProjectInsights,
    ExternalComment,
    Organizational,
    Other(String),
}

impl OriginType {
    pub fn parse(raw: &str) -> Self {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "team_performance" | "performance" => Self::TeamPerformance,
            "cost_analysis" | "cost" | "budget" => Self::Cost,
            "sla" | "sla_risk" | "sprint" => Self::Sla,
            "project_insights" | "project" => Self::ProjectInsights,
            "external_comment" | "comment" => Self::ExternalComment,
            "organizational" | "organization" => Self::Organizational,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::TeamPerformance => "team_performance",
            Self::Cost => "cost_analysis",
            Self::Sla => "sla",
            Self::ProjectInsights => "project_insights",
            Self::ExternalComment => "external_comment",
            Self::Organizational => "organizational",
            Self::Other(s) => s,
        }
    }

    pub(crate) fn runs_hr_rules(&self) -> bool {
        matches!(self, Self::TeamPerformance | Self::ProjectInsights)
    }

    pub(crate) fn runs_financial_rules(&self) -> bool {
        matches!(self, Self::Cost | Self::ProjectInsights)
    }

    pub(crate) fn runs_sla_rules(&self) -> bool {
        matches!(self, Self::Sla | Self::ProjectInsights)
    }

    /// Summary used when neither the payload nor the alerts provide one.
    pub fn fallback_summary(&self) -> Option<&'static str> {
        match self {
            Self::TeamPerformance => {
                Some("Team performance analysis completed. No critical issues were detected.")
            }
            Self::Cost => Some("Cost analysis completed. Budget indicators are within expected ranges."),
            Self::Sla => Some("SLA risk analysis completed. No imminent breaches were detected."),
            Self::ProjectInsights => {
                Some("Project analysis completed. Review the recommendations for details.")
            }
            Self::ExternalComment => Some("Comment analyzed. No urgent follow-up required."),
            Self::Organizational => Some("Organizational overview generated."),
            Self::Other(_) => None,
        }
    }
}

impl From<String> for OriginType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for OriginType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<OriginType> for String {
    fn from(value: OriginType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for OriginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration order is severity order: `Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertDomain {
    Hr,
    Financial,
    Sla,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalAlert {
    pub domain: AlertDomain,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub action_required: bool,
}

impl CriticalAlert {
    pub fn new(
        domain: AlertDomain,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            severity,
            title: title.into(),
            description: description.into(),
            action_required: severity >= Severity::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    HrCritical,
    FinancialCritical,
    SlaCritical,
    Hr,
    Financial,
    Sla,
    General,
}

impl Category {
    /// Highest severity first, then HR > Financial > SLA. First match wins.
    pub fn from_alerts(alerts: &[CriticalAlert]) -> Self {
        let has = |domain: AlertDomain, critical: bool| {
            alerts
                .iter()
                .any(|a| a.domain == domain && (!critical || a.severity == Severity::Critical))
        };

        if has(AlertDomain::Hr, true) {
            Self::HrCritical
        } else if has(AlertDomain::Financial, true) {
            Self::FinancialCritical
        } else if has(AlertDomain::Sla, true) {
            Self::SlaCritical
        } else if has(AlertDomain::Hr, false) {
            Self::Hr
        } else if has(AlertDomain::Financial, false) {
            Self::Financial
        } else if has(AlertDomain::Sla, false) {
            Self::Sla
        } else {
            Self::General
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HrCritical => "HR_CRITICAL",
            Self::FinancialCritical => "FINANCIAL_CRITICAL",
            Self::SlaCritical => "SLA_CRITICAL",
            Self::Hr => "HR",
            Self::Financial => "FINANCIAL",
            Self::Sla => "SLA",
            Self::General => "GENERAL",
        }
    }

    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Self::HrCritical | Self::FinancialCritical | Self::SlaCritical
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, scored record derived from one raw analysis event.
///
/// Only the normalizer constructs insights; there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    id: InsightId,
    origin: OriginType,
    raw: JsonValue,
    critical_alerts: Vec<CriticalAlert>,
    criticality_score: f64,
    category: Category,
    executive_summary: String,
    created_at: DateTime<Utc>,
}

impl Insight {
    pub(crate) fn new(
        origin: OriginType,
        raw: JsonValue,
        critical_alerts: Vec<CriticalAlert>,
        criticality_score: f64,
        executive_summary: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let category = Category::from_alerts(&critical_alerts);
        Self {
            id: InsightId::new(),
            origin,
            raw,
            critical_alerts,
            criticality_score,
            category,
            executive_summary,
            created_at,
        }
    }

    pub fn id(&self) -> InsightId {
        self.id
    }

    pub fn origin(&self) -> &OriginType {
        &self.origin
    }

    pub fn raw(&self) -> &JsonValue {
        &self.raw
    }

    pub fn critical_alerts(&self) -> &[CriticalAlert] {
        &self.critical_alerts
    }

    pub fn criticality_score(&self) -> f64 {
        self.criticality_score
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn executive_summary(&self) -> &str {
        &self.executive_summary
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn critical_count(&self) -> usize {
        self.critical_alerts
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .count()
    }
}

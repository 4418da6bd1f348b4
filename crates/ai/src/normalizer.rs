//! Insight Normalizer & Scorer.
//!
//! Deterministic keyword and threshold rules over a raw analysis payload. The
//! normalizer never fails: missing or malformed fields simply produce no alert.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::fields::{extract_array_from_field, first_number, first_text, number};
use crate::insight::{AlertDomain, CriticalAlert, Insight, OriginType, Severity};

/// Confidence assumed when the payload carries none.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const CRITICAL_WEIGHT: f64 = 0.3;
pub const HIGH_WEIGHT: f64 = 0.15;

const LOW_PERFORMANCE_THRESHOLD: f64 = 0.3;
const COST_OVERRUN_THRESHOLD: f64 = 0.7;
const SLA_CONFIDENCE_THRESHOLD: f64 = 0.7;

const CONFIDENCE_KEYS: &[&str] = &["confidence_score", "confidence"];
const SUMMARY_KEYS: &[&str] = &["executive_summary", "summary"];
const MEMBER_KEYS: &[&str] = &["team_metrics", "team_members", "members"];

const ZERO_COMPLETION_SIGNALS: &[&str] = &[
    "zero completion",
    "0% completion",
    "zero tasks completed",
    "no tasks completed",
    "not completed any",
    "completion rate of 0",
];
const OVERLOAD_SIGNALS: &[&str] = &["overload", "burnout", "burn out", "burned out", "overworked"];
const MISSING_ESTIMATE_SIGNALS: &[&str] = &[
    "missing estimate",
    "missing cost estimate",
    "no estimate",
    "without estimate",
    "unestimated",
];
const WORKFLOW_RISK_SIGNALS: &[&str] = &["unassigned", "workflow bottleneck", "bottleneck"];

pub fn normalize(raw: &JsonValue, origin: &OriginType) -> Insight {
    normalize_at(raw, origin, Utc::now())
}

/// Same as [`normalize`] with an explicit creation time.
pub fn normalize_at(raw: &JsonValue, origin: &OriginType, at: DateTime<Utc>) -> Insight {
    let mut alerts = Vec::new();

    if origin.runs_hr_rules() {
        team_performance_alerts(raw, &mut alerts);
    }
    if origin.runs_financial_rules() {
        cost_alerts(raw, &mut alerts);
    }
    if origin.runs_sla_rules() {
        sla_alerts(raw, origin, &mut alerts);
    }

    let score = criticality_score(base_confidence(raw), &alerts);
    let summary = executive_summary(raw, origin, &alerts);

    Insight::new(origin.clone(), raw.clone(), alerts, score, summary, at)
}

/// `base + 0.3 per Critical + 0.15 per High`, capped at 1.0.
///
/// There is no lower clamp: a negative base stays negative.
pub fn criticality_score(base: f64, alerts: &[CriticalAlert]) -> f64 {
    let base = if base.is_finite() { base } else { DEFAULT_CONFIDENCE };
    let bump: f64 = alerts
        .iter()
        .map(|a| match a.severity {
            Severity::Critical => CRITICAL_WEIGHT,
            Severity::High => HIGH_WEIGHT,
            Severity::Medium => 0.0,
        })
        .sum();
    (base + bump).min(1.0)
}

fn base_confidence(raw: &JsonValue) -> f64 {
    first_number(raw, CONFIDENCE_KEYS).unwrap_or(DEFAULT_CONFIDENCE)
}

fn mentions(text: &str, signals: &[&str]) -> bool {
    let lower = text.to_lowercase();
    signals.iter().any(|s| lower.contains(s))
}

fn team_performance_alerts(raw: &JsonValue, alerts: &mut Vec<CriticalAlert>) {
    let members = MEMBER_KEYS
        .iter()
        .find_map(|k| raw.get(*k).and_then(JsonValue::as_array));

    for member in members.into_iter().flatten() {
        let name = first_text(member, &["name", "member", "member_name"]).unwrap_or("Unnamed member");
        let completion = number(member.get("completion_rate"));
        let performance = number(member.get("performance_score"));

        if completion == Some(0.0) {
            alerts.push(CriticalAlert::new(
                AlertDomain::Hr,
                Severity::Critical,
                format!("Zero task completion: {name}"),
                format!("{name} has not completed any assigned tasks."),
            ));
        } else if let Some(score) = performance.filter(|s| *s < LOW_PERFORMANCE_THRESHOLD) {
            alerts.push(CriticalAlert::new(
                AlertDomain::Hr,
                Severity::Critical,
                format!("Low performance: {name}"),
                format!("{name} has a performance score of {score:.2}, below the {LOW_PERFORMANCE_THRESHOLD:.2} threshold."),
            ));
        }
    }

    let recommendations = extract_array_from_field(raw.get("recommendations"));
    let member_critical = alerts
        .iter()
        .any(|a| a.domain == AlertDomain::Hr && a.severity == Severity::Critical);

    if !member_critical {
        if let Some(text) = recommendations.iter().find(|r| mentions(r, ZERO_COMPLETION_SIGNALS)) {
            alerts.push(CriticalAlert::new(
                AlertDomain::Hr,
                Severity::Critical,
                "Zero task completion detected",
                text.clone(),
            ));
        }
    }

    if let Some(text) = recommendations.iter().find(|r| mentions(r, OVERLOAD_SIGNALS)) {
        alerts.push(CriticalAlert::new(
            AlertDomain::Hr,
            Severity::High,
            "Team overload risk",
            text.clone(),
        ));
    }
}

fn cost_alerts(raw: &JsonValue, alerts: &mut Vec<CriticalAlert>) {
    let mut statements = extract_array_from_field(raw.get("recommendations"));
    statements.extend(extract_array_from_field(raw.get("risk_factors")));

    if let Some(text) = statements.iter().find(|s| mentions(s, MISSING_ESTIMATE_SIGNALS)) {
        alerts.push(CriticalAlert::new(
            AlertDomain::Financial,
            Severity::High,
            "Missing cost estimates",
            text.clone(),
        ));
    }

    let overrun = number(raw.get("cost_overrun_risk")).or_else(|| {
        raw.get("budget_analysis")
            .and_then(|b| number(b.get("cost_overrun_risk")))
    });

    if let Some(risk) = overrun.filter(|r| *r > COST_OVERRUN_THRESHOLD) {
        alerts.push(CriticalAlert::new(
            AlertDomain::Financial,
            Severity::Critical,
            "Cost overrun risk",
            format!(
                "Cost overrun risk is {:.0}%, above the {:.0}% threshold.",
                risk * 100.0,
                COST_OVERRUN_THRESHOLD * 100.0
            ),
        ));
    }
}

fn sla_alerts(raw: &JsonValue, origin: &OriginType, alerts: &mut Vec<CriticalAlert>) {
    let risk_factors = extract_array_from_field(raw.get("risk_factors"));

    let confidence = first_number(raw, CONFIDENCE_KEYS);
    if *origin == OriginType::Sla {
        if let Some(confidence) = confidence.filter(|c| *c > SLA_CONFIDENCE_THRESHOLD) {
            let description = first_text(raw, &["prediction", "sla_risk"])
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "SLA breach predicted with {:.0}% confidence.",
                        confidence * 100.0
                    )
                });
            alerts.push(CriticalAlert::new(
                AlertDomain::Sla,
                Severity::Critical,
                "SLA breach risk",
                description,
            ));
        }
    }

    if let Some(text) = risk_factors.iter().find(|f| mentions(f, WORKFLOW_RISK_SIGNALS)) {
        alerts.push(CriticalAlert::new(
            AlertDomain::Sla,
            Severity::High,
            "Workflow risk",
            text.clone(),
        ));
    }
}

fn executive_summary(raw: &JsonValue, origin: &OriginType, alerts: &[CriticalAlert]) -> String {
    let criticals: Vec<&CriticalAlert> = alerts
        .iter()
        .filter(|a| a.severity == Severity::Critical)
        .collect();

    if let Some(existing) = first_text(raw, SUMMARY_KEYS) {
        return match criticals.len() {
            0 => existing.to_string(),
            1 => format!("1 critical alert detected. {existing}"),
            n => format!("{n} critical alerts detected. {existing}"),
        };
    }

    if let Some(first) = criticals.first() {
        return first.description.clone();
    }

    origin
        .fallback_summary()
        .unwrap_or("Analysis completed.")
        .to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::insight::Category;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn one_member_with_zero_completion_is_one_critical_hr_alert() {
        let raw = json!({
            "confidence_score": 0.6,
            "team_metrics": [
                { "name": "Ana", "completion_rate": 0, "performance_score": 0.9 },
                { "name": "Ben", "completion_rate": 0.8, "performance_score": 0.7 }
            ],
            "recommendations": ["Ana has zero completion this sprint"]
        });

        let insight = normalize(&raw, &OriginType::TeamPerformance);

        assert_eq!(insight.critical_alerts().len(), 1);
        let alert = &insight.critical_alerts()[0];
        assert_eq!(alert.domain, AlertDomain::Hr);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(insight.category(), Category::HrCritical);
        assert!(approx(insight.criticality_score(), 0.9));
    }

    #[test]
    fn score_is_capped_at_one() {
        let raw = json!({
            "confidence": 0.9,
            "team_members": [{ "name": "Ana", "completion_rate": 0 }]
        });

        let insight = normalize(&raw, &OriginType::TeamPerformance);

        assert_eq!(insight.category(), Category::HrCritical);
        assert!(approx(insight.criticality_score(), 1.0));
    }

    #[test]
    fn low_performance_and_overload_signals() {
        let raw = json!({
            "team_metrics": [{ "name": "Cy", "completion_rate": 0.4, "performance_score": 0.2 }],
            "recommendations": { "a": "Risk of burnout for the backend team", "b": "Keep standups short" }
        });

        let insight = normalize(&raw, &OriginType::TeamPerformance);
        let severities: Vec<Severity> = insight.critical_alerts().iter().map(|a| a.severity).collect();

        assert_eq!(severities, vec![Severity::Critical, Severity::High]);
        assert!(approx(insight.criticality_score(), 0.5 + 0.3 + 0.15));
    }

    #[test]
    fn zero_completion_keyword_without_member_data_still_alerts() {
        let raw = json!({ "recommendations": "Two developers have no tasks completed in 3 weeks" });

        let insight = normalize(&raw, &OriginType::TeamPerformance);

        assert_eq!(insight.category(), Category::HrCritical);
        assert_eq!(
            insight.executive_summary(),
            "Two developers have no tasks completed in 3 weeks"
        );
    }

    #[test]
    fn cost_overrun_above_threshold_is_one_critical_financial_alert() {
        let raw = json!({ "cost_overrun_risk": 0.85 });

        let insight = normalize(&raw, &OriginType::Cost);

        assert_eq!(insight.critical_alerts().len(), 1);
        assert_eq!(insight.critical_alerts()[0].domain, AlertDomain::Financial);
        assert_eq!(insight.critical_alerts()[0].severity, Severity::Critical);
        assert_eq!(insight.category(), Category::FinancialCritical);
        assert!(approx(insight.criticality_score(), 0.8));
    }

    #[test]
    fn nested_budget_overrun_and_missing_estimates() {
        let raw = json!({
            "budget_analysis": { "cost_overrun_risk": "0.75" },
            "risk_factors": ["12 tasks with missing estimates"]
        });

        let insight = normalize(&raw, &OriginType::parse("budget"));

        assert_eq!(insight.critical_alerts().len(), 2);
        assert_eq!(insight.category(), Category::FinancialCritical);
    }

    #[test]
    fn overrun_at_threshold_does_not_alert() {
        let insight = normalize(&json!({ "cost_overrun_risk": 0.7 }), &OriginType::Cost);
        assert!(insight.critical_alerts().is_empty());
        assert_eq!(insight.category(), Category::General);
    }

    #[test]
    fn sla_confidence_rule_requires_sla_origin() {
        let raw = json!({ "confidence_score": 0.8, "risk_factors": ["3 unassigned tickets"] });

        let sla = normalize(&raw, &OriginType::Sla);
        assert_eq!(sla.category(), Category::SlaCritical);
        assert_eq!(sla.critical_alerts().len(), 2);

        let project = normalize(&raw, &OriginType::ProjectInsights);
        assert_eq!(project.category(), Category::Sla);
        assert_eq!(project.critical_alerts().len(), 1);
        assert_eq!(project.critical_alerts()[0].severity, Severity::High);
    }

    #[test]
    fn comment_origin_runs_no_rules() {
        let raw = json!({ "cost_overrun_risk": 0.99, "team_metrics": [{ "completion_rate": 0 }] });

        let insight = normalize(&raw, &OriginType::ExternalComment);

        assert!(insight.critical_alerts().is_empty());
        assert_eq!(insight.category(), Category::General);
        assert_eq!(
            insight.executive_summary(),
            "Comment analyzed. No urgent follow-up required."
        );
    }

    #[test]
    fn existing_summary_gets_critical_banner() {
        let raw = json!({
            "executive_summary": "Budget is tight.",
            "cost_overrun_risk": 0.9
        });

        let insight = normalize(&raw, &OriginType::Cost);

        assert_eq!(
            insight.executive_summary(),
            "1 critical alert detected. Budget is tight."
        );
    }

    #[test]
    fn summary_without_criticals_is_kept_verbatim() {
        let raw = json!({ "summary": "All good.", "risk_factors": ["workflow bottleneck in QA"] });

        let insight = normalize(&raw, &OriginType::Sla);

        assert_eq!(insight.executive_summary(), "All good.");
        assert_eq!(insight.category(), Category::Sla);
    }

    #[test]
    fn unknown_origin_uses_generic_summary() {
        let insight = normalize(&json!({}), &OriginType::parse("weather"));
        assert_eq!(insight.executive_summary(), "Analysis completed.");
        assert!(approx(insight.criticality_score(), DEFAULT_CONFIDENCE));
    }

    #[test]
    fn malformed_payloads_never_panic() {
        for raw in [json!(null), json!("text"), json!([1, 2]), json!({ "team_metrics": "x" })] {
            let insight = normalize(&raw, &OriginType::ProjectInsights);
            assert_eq!(insight.category(), Category::General);
        }
    }

    #[test]
    fn non_finite_base_falls_back_to_default() {
        assert!(approx(criticality_score(f64::NAN, &[]), DEFAULT_CONFIDENCE));
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Medium),
            Just(Severity::High),
            Just(Severity::Critical)
        ]
    }

    proptest! {
        #[test]
        fn score_is_monotonic_in_alerts(
            base in 0.0f64..1.0,
            severities in proptest::collection::vec(severity_strategy(), 0..8),
            extra in severity_strategy(),
        ) {
            let alerts: Vec<CriticalAlert> = severities
                .iter()
                .map(|s| CriticalAlert::new(AlertDomain::Sla, *s, "t", "d"))
                .collect();
            let before = criticality_score(base, &alerts);

            let mut more = alerts.clone();
            more.push(CriticalAlert::new(AlertDomain::Hr, extra, "t", "d"));
            let after = criticality_score(base, &more);

            prop_assert!(after >= before);
            prop_assert!(after <= 1.0);
        }
    }
}

//! Deterministic organization-wide project metrics.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub name: String,
    pub status: ProjectStatus,
    /// Percent complete, 0..=100.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub open_risks: u32,
}

/// What the caller knows about an organization at analysis time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrganizationContext {
    #[serde(default)]
    pub projects: Vec<ProjectSnapshot>,
    #[serde(default)]
    pub team_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMetrics {
    pub total_projects: usize,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub on_hold_projects: usize,
    /// Mean progress over every project; 0 when there are none.
    pub average_progress: f64,
    pub open_risks: u32,
}

impl OrganizationMetrics {
    pub fn compute(projects: &[ProjectSnapshot]) -> Self {
        let count = |status: ProjectStatus| projects.iter().filter(|p| p.status == status).count();

        let progress_sum: f64 = projects
            .iter()
            .map(|p| if p.progress.is_finite() { p.progress.clamp(0.0, 100.0) } else { 0.0 })
            .sum();
        let average_progress = match projects.len() {
            0 => 0.0,
            n => progress_sum / n as f64,
        };

        Self {
            total_projects: projects.len(),
            active_projects: count(ProjectStatus::Active),
            completed_projects: count(ProjectStatus::Completed),
            on_hold_projects: count(ProjectStatus::OnHold),
            average_progress,
            open_risks: projects.iter().map(|p| p.open_risks).sum(),
        }
    }

    pub fn summary(&self) -> String {
        let plural = if self.total_projects == 1 { "" } else { "s" };
        format!(
            "{} project{plural} ({} active, {} completed, {} on hold), average progress {:.1}%, {} open risk(s).",
            self.total_projects,
            self.active_projects,
            self.completed_projects,
            self.on_hold_projects,
            self.average_progress,
            self.open_risks,
        )
    }

    /// Raw analysis payload used when no narrative is available.
    pub fn to_analysis_payload(&self) -> JsonValue {
        json!({
            "executive_summary": self.summary(),
            "metrics": self,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(status: ProjectStatus, progress: f64, risks: u32) -> ProjectSnapshot {
        ProjectSnapshot {
            name: format!("{status:?}"),
            status,
            progress,
            open_risks: risks,
        }
    }

    #[test]
    fn averages_over_all_projects() {
        let metrics = OrganizationMetrics::compute(&[
            project(ProjectStatus::Active, 40.0, 0),
            project(ProjectStatus::Active, 20.0, 0),
            project(ProjectStatus::Completed, 100.0, 0),
        ]);

        assert_eq!(metrics.total_projects, 3);
        assert_eq!(metrics.active_projects, 2);
        assert_eq!(metrics.completed_projects, 1);
        assert!((metrics.average_progress - 160.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.open_risks, 0);
    }

    #[test]
    fn empty_organization_has_zero_average() {
        let metrics = OrganizationMetrics::compute(&[]);
        assert_eq!(metrics.average_progress, 0.0);
        assert!(metrics.summary().starts_with("0 projects"));
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let metrics = OrganizationMetrics::compute(&[
            project(ProjectStatus::Active, 250.0, 1),
            project(ProjectStatus::OnHold, f64::NAN, 2),
        ]);
        assert_eq!(metrics.average_progress, 50.0);
        assert_eq!(metrics.open_risks, 3);
        assert_eq!(metrics.on_hold_projects, 1);
    }

    #[test]
    fn unknown_status_deserializes() {
        let p: ProjectSnapshot =
            serde_json::from_str(r#"{"name":"x","status":"archived"}"#).unwrap();
        assert_eq!(p.status, ProjectStatus::Unknown);
        assert_eq!(p.progress, 0.0);
    }
}

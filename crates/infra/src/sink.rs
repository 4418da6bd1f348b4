//! Insight sinks.
//!
//! Insights are side outputs: a sink must not fail the analysis that produced them.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use insightforge_ai::Insight;

pub trait InsightSink: Send + Sync + 'static {
    fn emit(&self, insight: &Insight);
}

/// Logs each insight as a structured event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInsightSink;

impl InsightSink for TracingInsightSink {
    fn emit(&self, insight: &Insight) {
        info!(
            insight_id = %insight.id(),
            origin = %insight.origin(),
            category = %insight.category(),
            criticality_score = insight.criticality_score(),
            critical_alerts = insight.critical_alerts().len(),
            "insight produced"
        );
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInsightSink {
    inner: Mutex<Vec<Insight>>,
}

impl InMemoryInsightSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Insight> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl InsightSink for InMemoryInsightSink {
    fn emit(&self, insight: &Insight) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(insight.clone());
    }
}

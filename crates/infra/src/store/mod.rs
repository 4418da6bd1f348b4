//! Record store: the keyed document store the pipeline reads work from and
//! writes insights to.
//!
//! Every operation is an atomic single-record operation.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use insightforge_core::{InsightId, ProjectId, RecordId};

pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;

pub const COMMENTS: &str = "comments";
pub const INSIGHTS: &str = "insights";
pub const NOTIFICATIONS: &str = "notifications";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFilter {
    pub collection: String,
    /// Matches `data.project_id`.
    pub project_id: Option<ProjectId>,
    pub limit: Option<usize>,
}

impl PendingFilter {
    pub fn comments() -> Self {
        Self {
            collection: COMMENTS.to_string(),
            project_id: None,
            limit: None,
        }
    }

    pub fn for_project(mut self, project_id: Option<ProjectId>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Attached to a record when it leaves the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Succeeded { insight_id: InsightId },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub collection: String,
    pub data: JsonValue,
}

impl NewRecord {
    pub fn new(collection: impl Into<String>, data: JsonValue) -> Self {
        Self {
            collection: collection.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub collection: String,
    pub data: JsonValue,
    pub processed: bool,
    pub outcome: Option<ProcessingOutcome>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("invalid fields: {0}")]
    InvalidFields(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Unprocessed records, oldest first.
    async fn get_pending(&self, filter: &PendingFilter) -> Result<Vec<StoredRecord>, StoreError>;

    async fn mark_processed(&self, id: RecordId, outcome: ProcessingOutcome) -> Result<(), StoreError>;

    async fn insert(&self, record: NewRecord) -> Result<RecordId, StoreError>;

    /// Shallow merge of `fields` (a JSON object) into the record's data.
    async fn update(&self, id: RecordId, fields: JsonValue) -> Result<(), StoreError>;
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;

use insightforge_core::RecordId;

use super::{NewRecord, PendingFilter, ProcessingOutcome, RecordStore, StoreError, StoredRecord};

/// In-memory record store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordId, StoredRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every record of a collection, oldest first.
    pub fn list(&self, collection: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut out: Vec<_> = records
            .values()
            .filter(|r| r.collection == collection)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }

    pub fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.read().map_err(|_| poisoned())?.get(&id).cloned())
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("record store lock poisoned".to_string())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_pending(&self, filter: &PendingFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let project = filter.project_id.map(|p| p.to_string());

        let mut pending: Vec<_> = records
            .values()
            .filter(|r| {
                r.collection == filter.collection
                    && !r.processed
                    && project
                        .as_deref()
                        .is_none_or(|p| r.data.get("project_id").and_then(JsonValue::as_str) == Some(p))
            })
            .cloned()
            .collect();

        // FIFO
        pending.sort_by_key(|r| (r.created_at, r.id));
        if let Some(limit) = filter.limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn mark_processed(&self, id: RecordId, outcome: ProcessingOutcome) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.processed = true;
        record.outcome = Some(outcome);
        record.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn insert(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        let id = RecordId::new();
        let stored = StoredRecord {
            id,
            collection: record.collection,
            data: record.data,
            processed: false,
            outcome: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.records.write().map_err(|_| poisoned())?.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, id: RecordId, fields: JsonValue) -> Result<(), StoreError> {
        let JsonValue::Object(fields) = fields else {
            return Err(StoreError::InvalidFields("update fields must be a JSON object".to_string()));
        };

        let mut records = self.records.write().map_err(|_| poisoned())?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        match &mut record.data {
            JsonValue::Object(data) => data.extend(fields),
            other => *other = JsonValue::Object(fields),
        }
        Ok(())
    }

}

//! Postgres-backed record store.
//!
//! ## Schema
//!
//! One `records` table; `data` and `outcome` are JSONB. `ensure_schema` creates it
//! when missing.
//!
//! ## Error Mapping
//!
//! | SQLx result | StoreError |
//! |-------------|------------|
//! | zero rows affected on update | `NotFound` |
//! | undecodable column | `Storage` |
//! | any other error | `Storage` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use insightforge_core::RecordId;

use super::{NewRecord, PendingFilter, ProcessingOutcome, RecordStore, StoreError, StoredRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id           UUID PRIMARY KEY,
    collection   TEXT NOT NULL,
    data         JSONB NOT NULL DEFAULT '{}'::jsonb,
    processed    BOOLEAN NOT NULL DEFAULT FALSE,
    outcome      JSONB,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS records_pending_idx
    ON records (collection, created_at)
    WHERE processed = FALSE;
"#;

/// Thread-safe: the SQLx pool is `Send + Sync` and cheap to clone.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(storage)?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(storage)?;
        Ok(())
    }
}

fn storage(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

fn decode(row: &PgRow) -> Result<StoredRecord, StoreError> {
    let outcome: Option<JsonValue> = row.try_get("outcome").map_err(storage)?;
    let outcome = outcome
        .map(serde_json::from_value::<ProcessingOutcome>)
        .transpose()
        .map_err(|e| StoreError::Storage(format!("undecodable outcome: {e}")))?;

    Ok(StoredRecord {
        id: RecordId::from_uuid(row.try_get::<Uuid, _>("id").map_err(storage)?),
        collection: row.try_get("collection").map_err(storage)?,
        data: row.try_get("data").map_err(storage)?,
        processed: row.try_get("processed").map_err(storage)?,
        outcome,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(storage)?,
        processed_at: row.try_get("processed_at").map_err(storage)?,
    })
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(skip(self), fields(collection = %filter.collection))]
    async fn get_pending(&self, filter: &PendingFilter) -> Result<Vec<StoredRecord>, StoreError> {
        let limit = filter
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT id, collection, data, processed, outcome, created_at, processed_at
            FROM records
            WHERE collection = $1
              AND processed = FALSE
              AND ($2::text IS NULL OR data->>'project_id' = $2)
            ORDER BY created_at, id
            LIMIT $3
            "#,
        )
        .bind(&filter.collection)
        .bind(filter.project_id.map(|p| p.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(decode).collect()
    }

    #[instrument(skip(self, outcome), fields(record_id = %id))]
    async fn mark_processed(&self, id: RecordId, outcome: ProcessingOutcome) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET processed = TRUE, outcome = $2, processed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .bind(Json(&outcome))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self, record), fields(collection = %record.collection))]
    async fn insert(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        let id = RecordId::new();
        sqlx::query(
            r#"
            INSERT INTO records (id, collection, data, processed, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            "#,
        )
        .bind(*id.as_uuid())
        .bind(&record.collection)
        .bind(&record.data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(id)
    }

    #[instrument(skip(self, fields), fields(record_id = %id))]
    async fn update(&self, id: RecordId, fields: JsonValue) -> Result<(), StoreError> {
        if !fields.is_object() {
            return Err(StoreError::InvalidFields("update fields must be a JSON object".to_string()));
        }

        // jsonb `||` on two objects is a shallow merge.
        let result = sqlx::query("UPDATE records SET data = data || $2 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(&fields)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

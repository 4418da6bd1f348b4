//! Infrastructure layer: configuration, remote service clients, record
//! storage and the analysis pipeline that ties them together.

pub mod config;
mod http;
pub mod inference;
pub mod media;
pub mod pipeline;
pub mod sink;
pub mod store;

pub use config::{ConfigError, InferenceConfig, InsightConfig, MediaConfig};
pub use inference::HttpInferenceClient;
pub use media::{HttpMediaJobs, MediaJobs, MediaRequest};
pub use pipeline::{
    AnalysisPipeline, Assessment, BatchItem, BatchReport, MediaInsight, OrganizationalInsight,
    PipelineError,
};
pub use sink::{InMemoryInsightSink, InsightSink, TracingInsightSink};
pub use store::{
    InMemoryRecordStore, NewRecord, PendingFilter, PostgresRecordStore, ProcessingOutcome,
    RecordStore, StoreError, StoredRecord,
};

//! Service wiring: builds the analysis pipeline from configuration.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

use insightforge_infra::{
    AnalysisPipeline, HttpInferenceClient, HttpMediaJobs, InMemoryRecordStore, InsightConfig,
    PostgresRecordStore, RecordStore, StoreError,
};
use insightforge_invoke::InvocationError;

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("inference client: {0}")]
    Inference(InvocationError),

    #[error("media client: {0}")]
    Media(InvocationError),

    #[error("record store: {0}")]
    Store(#[from] StoreError),
}

pub struct AppServices {
    pipeline: AnalysisPipeline,
}

impl AppServices {
    pub fn new(pipeline: AnalysisPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn from_config(config: &InsightConfig) -> Result<Self, WiringError> {
        let client = HttpInferenceClient::new(&config.inference).map_err(WiringError::Inference)?;
        if config.inference.api_key.is_none() {
            warn!("INFERENCE_API_KEY not set; analysis requests will fail with a configuration error");
        }

        let store: Arc<dyn RecordStore> = match &config.database_url {
            Some(url) => {
                let store = PostgresRecordStore::connect(url).await?;
                store.ensure_schema().await?;
                info!("using postgres record store");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set; records are kept in memory only");
                InMemoryRecordStore::arc()
            }
        };

        let mut pipeline = AnalysisPipeline::new(Arc::new(client), config.inference.tiers(), store)
            .with_sampling(config.inference.temperature, config.inference.max_tokens);

        if let Some(base_url) = &config.media.base_url {
            let media = HttpMediaJobs::new(
                base_url.clone(),
                config.media.api_key.clone(),
                config.inference.timeout,
            )
            .map_err(WiringError::Media)?;
            pipeline = pipeline.with_media(Arc::new(media), config.media.poller);
            info!(base_url = %base_url, "media processing enabled");
        }

        Ok(Self::new(pipeline))
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }
}

/// Cancellation scoped to one request. Dropping the guard (the handler future
/// being dropped when the client goes away) cancels all work under the token.
pub fn request_scope() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

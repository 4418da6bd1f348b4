//! Inference request/response model and the client seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use insightforge_invoke::{
    FallbackChain, FallbackPlan, FallbackReport, InvocationError, InvocationRequest, RetryPolicy,
    TargetId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// One inference call. The message content is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl InferenceRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.3,
            max_tokens: 1500,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub candidates: Vec<String>,
}

impl InferenceResponse {
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![text.into()],
        }
    }
}

/// Outbound inference service. Implementations classify their own failures
/// into `InvocationError`; retry and fallback happen above this seam.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(
        &self,
        target: &TargetId,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InvocationError>;
}

/// One entry of a model fallback order.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelTier {
    pub target: TargetId,
    pub policy: RetryPolicy,
}

impl ModelTier {
    pub fn new(target: impl Into<TargetId>, policy: RetryPolicy) -> Self {
        Self {
            target: target.into(),
            policy,
        }
    }
}

/// Same request against every tier, in the given order.
pub fn fallback_plan(tiers: &[ModelTier], request: &InferenceRequest) -> FallbackPlan<InferenceRequest> {
    FallbackPlan::new(
        tiers
            .iter()
            .map(|tier| InvocationRequest::new(tier.target.clone(), request.clone(), tier.policy.clone()))
            .collect(),
    )
}

pub async fn run_inference(
    chain: &FallbackChain,
    client: &dyn InferenceClient,
    tiers: &[ModelTier],
    request: &InferenceRequest,
) -> FallbackReport<InferenceResponse> {
    let plan = fallback_plan(tiers, request);

    chain
        .execute(&plan, |req| {
            let target = req.target().clone();
            let payload = req.payload().clone();
            async move { client.complete(&target, &payload).await }
        })
        .await
}

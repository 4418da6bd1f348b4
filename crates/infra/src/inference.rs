//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use insightforge_ai::{InferenceClient, InferenceRequest, InferenceResponse};
use insightforge_invoke::{InvocationError, TargetId};

use crate::config::InferenceConfig;
use crate::http::{ensure_success, join_url, transport_error};

#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpInferenceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, InvocationError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InvocationError::configuration(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn complete(
        &self,
        target: &TargetId,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, InvocationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InvocationError::configuration("INFERENCE_API_KEY is not set"))?;

        let body = json!({
            "model": target.as_str(),
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        debug!(target_id = %target, messages = request.messages.len(), "sending inference request");

        let response = self
            .http
            .post(join_url(&self.base_url, "chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| InvocationError::transient(format!("undecodable inference response: {e}")))?;

        Ok(InferenceResponse {
            candidates: completion
                .choices
                .into_iter()
                .filter_map(|c| c.message.content)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use insightforge_ai::ChatMessage;

    use super::*;

    async fn stub_server(status: StatusCode, body: serde_json::Value) -> SocketAddr {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = body.clone();
                async move { (status, axum::Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr, api_key: Option<&str>) -> HttpInferenceClient {
        HttpInferenceClient::new(&InferenceConfig {
            base_url: format!("http://{addr}/v1"),
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
            ..InferenceConfig::default()
        })
        .unwrap()
    }

    fn request() -> InferenceRequest {
        InferenceRequest::new(vec![ChatMessage::user("ping")])
    }

    #[tokio::test]
    async fn success_returns_every_candidate() {
        let addr = stub_server(
            StatusCode::OK,
            json!({ "choices": [
                { "message": { "role": "assistant", "content": "first" } },
                { "message": { "role": "assistant", "content": null } },
                { "message": { "role": "assistant", "content": "second" } }
            ]}),
        )
        .await;

        let response = client(addr, Some("sk-test"))
            .complete(&TargetId::from("gpt-test"), &request())
            .await
            .unwrap();

        assert_eq!(response.candidates, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let addr = stub_server(StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "overloaded" })).await;

        let err = client(addr, Some("sk-test"))
            .complete(&TargetId::from("gpt-test"), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Transient(_)));
    }

    #[tokio::test]
    async fn bad_credentials_are_configuration_errors() {
        let addr = stub_server(StatusCode::UNAUTHORIZED, json!({ "error": "bad key" })).await;

        let err = client(addr, Some("sk-wrong"))
            .complete(&TargetId::from("gpt-test"), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Configuration(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_sending() {
        // Nothing listens on this port; a sent request would be a transport error.
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let err = client(addr, None)
            .complete(&TargetId::from("gpt-test"), &request())
            .await
            .unwrap_err();

        assert_eq!(err, InvocationError::configuration("INFERENCE_API_KEY is not set"));
    }
}

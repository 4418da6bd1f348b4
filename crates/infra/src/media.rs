//! HTTP client for the remote media-processing job service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use insightforge_invoke::{InvocationError, JobProgress, JobProtocol, JobStatus};

use crate::http::{ensure_success, join_url, transport_error};

/// Audio, video or document to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRequest {
    pub media_url: String,
    pub media_type: String,
    /// Origin used to normalize the result; `external_comment` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Media job service behind a trait object, as the pipeline holds it.
pub type MediaJobs = dyn JobProtocol<Payload = MediaRequest, Handle = String, Output = JsonValue>;

/// `POST /jobs`, `GET /jobs/{id}`, `GET /jobs/{id}/result`, `DELETE /jobs/{id}`.
#[derive(Debug, Clone)]
pub struct HttpMediaJobs {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpMediaJobs {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, InvocationError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| InvocationError::configuration(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, join_url(&self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedJob {
    #[serde(alias = "job_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobState {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

fn parse_status(raw: &str) -> Option<JobStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "created" => Some(JobStatus::Created),
        "queued" | "pending" => Some(JobStatus::Queued),
        "running" | "processing" | "in_progress" => Some(JobStatus::Running),
        "completed" | "succeeded" | "done" => Some(JobStatus::Completed),
        "failed" | "error" => Some(JobStatus::Failed),
        "timed_out" | "expired" => Some(JobStatus::TimedOut),
        _ => None,
    }
}

#[async_trait]
impl JobProtocol for HttpMediaJobs {
    type Payload = MediaRequest;
    type Handle = String;
    type Output = JsonValue;

    async fn create(&self, payload: &MediaRequest) -> Result<String, InvocationError> {
        let response = self
            .request(reqwest::Method::POST, "jobs")
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;
        let created: CreatedJob = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| InvocationError::transient(format!("undecodable job creation response: {e}")))?;
        Ok(created.id)
    }

    async fn poll(&self, handle: &String) -> Result<JobProgress, InvocationError> {
        let response = self
            .request(reqwest::Method::GET, &format!("jobs/{handle}"))
            .send()
            .await
            .map_err(transport_error)?;
        let state: JobState = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| InvocationError::transient(format!("undecodable job status: {e}")))?;

        let status = parse_status(&state.status).unwrap_or_else(|| {
            debug!(job_id = %handle, status = %state.status, "unknown job status, treating as running");
            JobStatus::Running
        });

        Ok(JobProgress {
            status,
            error: state.error,
        })
    }

    async fn fetch(&self, handle: &String) -> Result<JsonValue, InvocationError> {
        let response = self
            .request(reqwest::Method::GET, &format!("jobs/{handle}/result"))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| InvocationError::transient(format!("undecodable job result: {e}")))
    }

    async fn cleanup(&self, handle: &String) -> Result<(), InvocationError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("jobs/{handle}"))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::Router;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use insightforge_invoke::{InvocationOutcome, JobPoller, PollerConfig};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct StubState {
        polls: AtomicU32,
        deletes: AtomicU32,
    }

    async fn stub_server(state: Arc<StubState>) -> SocketAddr {
        let app = Router::new()
            .route("/jobs", post(|| async { axum::Json(json!({ "job_id": "job-7" })) }))
            .route(
                "/jobs/:id",
                get(|State(s): State<Arc<StubState>>, Path(_id): Path<String>| async move {
                    let n = s.polls.fetch_add(1, Ordering::SeqCst);
                    let status = if n == 0 { "processing" } else { "completed" };
                    axum::Json(json!({ "status": status }))
                })
                .delete(|State(s): State<Arc<StubState>>, Path(_id): Path<String>| async move {
                    s.deletes.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }),
            )
            .route(
                "/jobs/:id/result",
                get(|Path(id): Path<String>| async move {
                    axum::Json(json!({ "job": id, "executive_summary": "Customer is unhappy with delays." }))
                }),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn remote_status_names_are_mapped() {
        assert_eq!(parse_status("PENDING"), Some(JobStatus::Queued));
        assert_eq!(parse_status("in_progress"), Some(JobStatus::Running));
        assert_eq!(parse_status("succeeded"), Some(JobStatus::Completed));
        assert_eq!(parse_status("mystery"), None);
    }

    #[tokio::test]
    async fn full_job_lifecycle_against_http_service() {
        let state = Arc::new(StubState::default());
        let addr = stub_server(state.clone()).await;
        let jobs = Arc::new(HttpMediaJobs::new(format!("http://{addr}"), None, Duration::from_secs(5)).unwrap());

        let poller = JobPoller::new(PollerConfig {
            interval: Duration::from_millis(10),
            deadline: Duration::from_secs(5),
            poll_error_budget: 1,
            cleanup_timeout: Duration::from_secs(1),
        });
        let request = MediaRequest {
            media_url: "https://cdn.example.com/call.mp3".to_string(),
            media_type: "audio".to_string(),
            origin: None,
        };

        let report = poller.run(jobs, &request).await;

        match &report.outcome {
            InvocationOutcome::Success(result) => assert_eq!(result["job"], "job-7"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(state.polls.load(Ordering::SeqCst), 2);

        report.cleanup.expect("cleanup scheduled").await.unwrap();
        assert_eq!(state.deletes.load(Ordering::SeqCst), 1);
    }
}

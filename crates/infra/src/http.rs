//! Mapping of outbound HTTP failures onto the invocation taxonomy.
//!
//! | condition | `InvocationError` |
//! |-----------|-------------------|
//! | 401, 403, 404 | `Configuration` (bad credential or unknown target) |
//! | 408, 429, 5xx | `Transient` |
//! | 400, 422, other 4xx | `Rejected` |
//! | transport timeout | `Timeout` |
//! | request could not be built | `Configuration` |
//! | other transport errors | `Transient` |

use reqwest::StatusCode;

use insightforge_invoke::InvocationError;

const DETAIL_LIMIT: usize = 200;

pub(crate) fn status_error(status: StatusCode, body: &str) -> InvocationError {
    let snippet: String = body.trim().chars().take(DETAIL_LIMIT).collect();
    let detail = if snippet.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {snippet}")
    };

    match status.as_u16() {
        401 | 403 | 404 => InvocationError::configuration(detail),
        408 | 429 => InvocationError::transient(detail),
        s if s >= 500 => InvocationError::transient(detail),
        _ => InvocationError::rejected(detail),
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> InvocationError {
    if err.is_timeout() {
        InvocationError::Timeout
    } else if err.is_builder() {
        InvocationError::configuration(err.to_string())
    } else {
        InvocationError::transient(err.to_string())
    }
}

/// Fail with the mapped error unless the response is a 2xx.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, InvocationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use insightforge_infra::PipelineError;
use insightforge_invoke::InvocationError;

pub fn pipeline_error_to_response(err: PipelineError) -> axum::response::Response {
    let status = match &err {
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::Configuration(_) | PipelineError::Store(_) | PipelineError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::Invocation(e) => match e.root_cause() {
            InvocationError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InvocationError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            InvocationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        },
    };
    json_error(status, err.code(), err.to_string())
}

/// `{ "success": false, "error": <message>, "code": <machine code> }`
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": message.into(),
            "code": code,
        })),
    )
        .into_response()
}

pub fn invalid_input(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_input", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_failures_map_to_gateway_statuses() {
        let cases = [
            (InvocationError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (InvocationError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
            (InvocationError::rejected("bad prompt"), StatusCode::BAD_GATEWAY),
            (
                InvocationError::configuration("INFERENCE_API_KEY is not set"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                InvocationError::Exhausted {
                    attempts: 3,
                    last: Box::new(InvocationError::Timeout),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];

        for (error, expected) in cases {
            let response = pipeline_error_to_response(PipelineError::Invocation(error));
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn invalid_input_is_bad_request() {
        let response = pipeline_error_to_response(PipelineError::InvalidInput("text is required".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

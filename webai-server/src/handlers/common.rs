//! Shared handler plumbing: message collection, upstream invocation, and
//! the error-to-status mapping every endpoint goes through.

use crate::state::AppState;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};
use std::path::PathBuf;
use webai_core::extract::{extract_content, TempFileGuard};
use webai_core::notify::{classify_upstream_error, ErrorCategory, UpstreamFailure};
use webai_core::sse::frames_into_stream;
use webai_core::upstream::images::serialize_response_images;
use webai_core::{resolve_model, GeneratedResponse, ModelId};

/// Error shape returned to API clients.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "message": self.message,
                "type": self.kind,
                "code": self.status.as_u16(),
            }
        });
        (self.status, Json(body)).into_response()
    }
}

/// Everything extracted from a message list: the joined prompt, the file
/// paths to attach, and the guard that deletes materialized temp files.
#[derive(Debug)]
pub struct PromptBundle {
    pub prompt: String,
    pub files: Vec<PathBuf>,
    pub guard: TempFileGuard,
}

fn role_prefix(role: &str) -> &'static str {
    match role {
        "system" | "developer" => "System: ",
        "assistant" => "Assistant: ",
        _ => "User: ",
    }
}

/// Flatten chat-style messages into one role-prefixed prompt, extracting
/// file attachments along the way. Rejects a list with no usable text.
pub async fn collect_messages(messages: &[Value]) -> Result<PromptBundle, ApiError> {
    let mut segments = Vec::new();
    let mut files = Vec::new();
    let mut owned = Vec::new();

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let content = message.get("content").cloned().unwrap_or(Value::Null);
        let extracted = extract_content(&content).await;
        files.extend(extracted.file_paths());
        owned.extend(extracted.owned_paths());
        let text = extracted.text.trim();
        if !text.is_empty() {
            segments.push(format!("{}{}", role_prefix(role), text));
        }
    }

    // Guard first: rejecting the request must still delete any temp files
    // extraction already materialized.
    let guard = TempFileGuard::new(owned);
    if segments.is_empty() {
        return Err(ApiError::bad_request("No usable text content in messages"));
    }

    Ok(PromptBundle { prompt: segments.join("\n\n"), files, guard })
}

/// Resolve the requested model, falling back to the configured default when
/// the request names none.
pub async fn resolve_request_model(state: &AppState, requested: Option<&str>) -> ModelId {
    match requested {
        Some(name) => resolve_model(Some(name)),
        None => {
            let default = state.config.snapshot().await.default_model;
            resolve_model(Some(&default))
        },
    }
}

/// Run one upstream generation and inline the response images. All error
/// paths trip the notification gate before mapping to a status code.
pub async fn run_generation(
    state: &AppState,
    endpoint: &str,
    prompt: &str,
    model: ModelId,
    files: &[PathBuf],
) -> Result<GeneratedResponse, ApiError> {
    let session = state.client.live_session().await.map_err(|err| ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        kind: "service_unavailable",
        message: err.to_string(),
    })?;

    let mut response = match session.generate(prompt, model, files).await {
        Ok(response) => response,
        Err(err) => return Err(map_upstream_error(state, endpoint, &err.to_string()).await),
    };

    if !response.images.is_empty() {
        response.images =
            serialize_response_images(std::mem::take(&mut response.images), &session.cookies())
                .await;
    }
    Ok(response)
}

async fn map_upstream_error(state: &AppState, endpoint: &str, detail: &str) -> ApiError {
    match classify_upstream_error(detail) {
        UpstreamFailure::Auth => {
            state
                .notifier
                .notify(ErrorCategory::Auth, "Gemini authentication failed", endpoint, detail)
                .await;
            ApiError {
                status: StatusCode::UNAUTHORIZED,
                kind: "authentication_error",
                message: format!("Gemini authentication failed: {detail}"),
            }
        },
        UpstreamFailure::Transient => {
            state
                .notifier
                .notify(ErrorCategory::ServerError, "Gemini upstream error", endpoint, detail)
                .await;
            ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                kind: "service_unavailable",
                message: format!("Gemini is temporarily unavailable, please retry: {detail}"),
            }
        },
        UpstreamFailure::Unexpected => {
            state
                .notifier
                .notify(ErrorCategory::ServerError, "Gemini request failed", endpoint, detail)
                .await;
            ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "api_error",
                message: detail.to_string(),
            }
        },
    }
}

/// Stream pre-built SSE frames; the guard rides inside the stream so temp
/// files outlive the response body.
pub fn sse_response(frames: Vec<Bytes>, guard: TempFileGuard) -> Response {
    let mut response = axum::body::Body::from_stream(frames_into_stream(frames, guard))
        .into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", header::HeaderValue::from_static("no"));
    response
}

//! OpenAI Responses API compatibility surface.

use crate::handlers::common::{
    collect_messages, resolve_request_model, run_generation, sse_response, ApiError, PromptBundle,
};
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use webai_core::sse::responses::{build_response, responses_stream_frames};

#[derive(Debug, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub model: Option<String>,
    /// Either a bare string or a list of message items.
    #[serde(default)]
    pub input: Value,
    /// System-prompt shorthand, prepended before the input messages.
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

pub async fn create_response(
    State(state): State<AppState>,
    Json(request): Json<ResponsesRequest>,
) -> Result<Response, ApiError> {
    let messages = input_as_messages(&request);
    if messages.is_empty() {
        return Err(ApiError::bad_request("No input provided"));
    }

    let PromptBundle { prompt, files, guard } = collect_messages(&messages).await?;
    let model = resolve_request_model(&state, request.model.as_deref()).await;
    let response = run_generation(&state, "/v1/responses", &prompt, model, &files).await?;

    if request.stream {
        Ok(sse_response(responses_stream_frames(&response, model.as_str()), guard))
    } else {
        Ok(Json(build_response(&response, model.as_str())).into_response())
    }
}

/// Normalize the Responses input shape into chat-style messages so both
/// surfaces share one extraction path. Non-message items are skipped.
fn input_as_messages(request: &ResponsesRequest) -> Vec<Value> {
    let mut messages = Vec::new();

    if let Some(instructions) = &request.instructions {
        if !instructions.trim().is_empty() {
            messages.push(json!({ "role": "system", "content": instructions }));
        }
    }

    match &request.input {
        Value::String(text) => {
            messages.push(json!({ "role": "user", "content": text }));
        },
        Value::Array(items) => {
            for item in items {
                let item_type = item.get("type").and_then(Value::as_str).unwrap_or("message");
                if item_type != "message" {
                    continue;
                }
                let role = item.get("role").and_then(Value::as_str).unwrap_or("user");
                let content = item.get("content").cloned().unwrap_or(Value::Null);
                messages.push(json!({ "role": role, "content": content }));
            }
        },
        _ => {},
    }

    messages
}

//! OpenAI Chat Completions compatibility surface.

use crate::handlers::common::{
    collect_messages, resolve_request_model, run_generation, sse_response, ApiError, PromptBundle,
};
use crate::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use webai_core::list_model_ids;
use webai_core::sse::chat::{build_chat_completion, chat_stream_frames};

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub stream: bool,
}

pub async fn list_models() -> Json<Value> {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<Value> = list_model_ids()
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": created,
                "owned_by": "google",
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::bad_request("No messages provided"));
    }

    let PromptBundle { prompt, files, guard } = collect_messages(&request.messages).await?;
    let model = resolve_request_model(&state, request.model.as_deref()).await;
    let response =
        run_generation(&state, "/v1/chat/completions", &prompt, model, &files).await?;

    if request.stream {
        Ok(sse_response(chat_stream_frames(&response, model.as_str()), guard))
    } else {
        Ok(Json(build_chat_completion(&response, model.as_str())).into_response())
    }
}

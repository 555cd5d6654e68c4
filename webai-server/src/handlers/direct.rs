//! Stateless direct endpoint: one prompt in, one upstream answer out,
//! no OpenAI framing.

use crate::handlers::common::{resolve_request_model, run_generation, ApiError};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct GeminiRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Local file paths to attach, passed through as-is.
    #[serde(default)]
    pub files: Vec<String>,
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GeminiRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }

    let model = resolve_request_model(&state, request.model.as_deref()).await;
    let files: Vec<PathBuf> = request.files.iter().map(PathBuf::from).collect();
    let response = run_generation(&state, "/gemini", &request.message, model, &files).await?;

    let mut body = json!({ "response": response.text });
    if let Some(thoughts) = &response.thoughts {
        body["thoughts"] = json!(thoughts);
    }
    if !response.images.is_empty() {
        body["images"] = json!(response.images);
    }
    Ok(Json(body))
}

//! Responses API wire format: single-shot JSON and the 7-event SSE sequence.
//!
//! Event order, fixed:
//! response.created → response.output_item.added → response.content_part.added
//! → response.output_text.delta → response.output_text.done
//! → response.output_item.done → response.completed

use super::{content_with_image_links, sse_event};
use crate::upstream::GeneratedResponse;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

fn make_response_id() -> String {
    format!("resp_{}", &Uuid::new_v4().simple().to_string()[..24])
}

fn make_message_id() -> String {
    format!("msg_{}", &Uuid::new_v4().simple().to_string()[..24])
}

fn build_response_base(resp_id: &str, model: &str, status: &str, output: Value) -> Value {
    json!({
        "id": resp_id,
        "object": "response",
        "created_at": Utc::now().timestamp(),
        "model": model,
        "output": output,
        "status": status,
        "usage": {
            "input_tokens": 0,
            "output_tokens": 0,
            "total_tokens": 0,
        },
    })
}

fn completed_item(msg_id: &str, content_text: &str) -> Value {
    json!({
        "type": "message",
        "id": msg_id,
        "role": "assistant",
        "status": "completed",
        "content": [{"type": "output_text", "text": content_text, "annotations": []}],
    })
}

/// Non-streaming completed Responses object.
#[must_use]
pub fn build_response(response: &GeneratedResponse, model: &str) -> Value {
    let resp_id = make_response_id();
    let msg_id = make_message_id();
    let content_text = content_with_image_links(&response.text, &response.images);

    let mut result = build_response_base(
        &resp_id,
        model,
        "completed",
        json!([completed_item(&msg_id, &content_text)]),
    );
    if !response.images.is_empty() {
        result["images"] = json!(response.images);
    }
    if let Some(thoughts) = &response.thoughts {
        result["thoughts"] = json!(thoughts);
    }
    result
}

/// The full SSE event sequence for a completed response. One response id and
/// one message id are minted here and reused across every event.
#[must_use]
pub fn responses_stream_frames(response: &GeneratedResponse, model: &str) -> Vec<Bytes> {
    let resp_id = make_response_id();
    let msg_id = make_message_id();
    let content_text = content_with_image_links(&response.text, &response.images);

    let mut frames = Vec::with_capacity(7);

    frames.push(sse_event(
        "response.created",
        &json!({
            "type": "response.created",
            "response": build_response_base(&resp_id, model, "in_progress", json!([])),
        }),
    ));

    frames.push(sse_event(
        "response.output_item.added",
        &json!({
            "type": "response.output_item.added",
            "output_index": 0,
            "item": {
                "type": "message",
                "id": &msg_id,
                "role": "assistant",
                "status": "in_progress",
                "content": [],
            },
        }),
    ));

    frames.push(sse_event(
        "response.content_part.added",
        &json!({
            "type": "response.content_part.added",
            "output_index": 0,
            "content_index": 0,
            "part": {"type": "output_text", "text": "", "annotations": []},
        }),
    ));

    // Single delta carrying the full text — the upstream has no token stream.
    frames.push(sse_event(
        "response.output_text.delta",
        &json!({
            "type": "response.output_text.delta",
            "output_index": 0,
            "content_index": 0,
            "delta": &content_text,
        }),
    ));

    frames.push(sse_event(
        "response.output_text.done",
        &json!({
            "type": "response.output_text.done",
            "output_index": 0,
            "content_index": 0,
            "text": &content_text,
        }),
    ));

    let item = completed_item(&msg_id, &content_text);
    frames.push(sse_event(
        "response.output_item.done",
        &json!({
            "type": "response.output_item.done",
            "output_index": 0,
            "item": item,
        }),
    ));

    let mut completed = build_response_base(
        &resp_id,
        model,
        "completed",
        json!([completed_item(&msg_id, &content_text)]),
    );
    if !response.images.is_empty() {
        completed["images"] = json!(response.images);
    }
    frames.push(sse_event(
        "response.completed",
        &json!({
            "type": "response.completed",
            "response": completed,
        }),
    ));

    frames
}

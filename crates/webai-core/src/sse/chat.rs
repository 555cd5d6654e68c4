//! Chat Completions wire format: single-shot JSON and the streamed variant.

use super::{content_with_image_links, sse_data};
use crate::upstream::GeneratedResponse;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4())
}

/// Non-streaming `chat.completion` response object.
#[must_use]
pub fn build_chat_completion(response: &GeneratedResponse, model: &str) -> Value {
    let content = content_with_image_links(&response.text, &response.images);
    let mut result = json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content,
            },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": 0,
            "completion_tokens": 0,
            "total_tokens": 0,
        },
    });
    // Raw images as a top-level extension field
    if !response.images.is_empty() {
        result["images"] = json!(response.images);
    }
    result
}

/// Streamed `chat.completion.chunk` frames: role announcement, one full
/// content delta, a closing delta with `finish_reason`, then `[DONE]`.
#[must_use]
pub fn chat_stream_frames(response: &GeneratedResponse, model: &str) -> Vec<Bytes> {
    let id = completion_id();
    let created = Utc::now().timestamp();
    let content = content_with_image_links(&response.text, &response.images);

    let chunk = |delta: Value, finish_reason: Value| {
        json!({
            "id": &id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
        })
    };

    let first = chunk(json!({"role": "assistant", "content": ""}), Value::Null);

    let mut content_chunk = chunk(json!({"content": content}), Value::Null);
    if !response.images.is_empty() {
        content_chunk["images"] = json!(response.images);
    }

    let final_chunk = chunk(json!({}), json!("stop"));

    vec![
        sse_data(&first),
        sse_data(&content_chunk),
        sse_data(&final_chunk),
        Bytes::from_static(b"data: [DONE]\n\n"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::test_support::parse_frames;
    use crate::upstream::{ImageKind, ResponseImage};

    fn response_with_image() -> GeneratedResponse {
        GeneratedResponse {
            text: "Hi".to_string(),
            thoughts: None,
            images: vec![ResponseImage {
                kind: ImageKind::GeneratedImage,
                url: "https://x/img.png".to_string(),
                base64: String::new(),
                title: "Pic".to_string(),
                alt: String::new(),
            }],
        }
    }

    #[test]
    fn test_stream_is_three_chunks_plus_done() {
        let frames = chat_stream_frames(&GeneratedResponse::default(), "gemini-3.0-flash");
        assert_eq!(frames.len(), 4);
        assert_eq!(&frames[3][..], b"data: [DONE]\n\n");
    }

    #[test]
    fn test_stream_chunks_share_id_and_announce_role() {
        let frames = chat_stream_frames(&response_with_image(), "gemini-3.0-flash");
        let parsed = parse_frames(&frames[..3]);

        let id = parsed[0].1["id"].as_str().expect("id").to_string();
        assert!(id.starts_with("chatcmpl-"));
        for (_, payload) in &parsed {
            assert_eq!(payload["id"].as_str(), Some(id.as_str()));
            assert_eq!(payload["object"].as_str(), Some("chat.completion.chunk"));
        }

        assert_eq!(parsed[0].1["choices"][0]["delta"]["role"].as_str(), Some("assistant"));
        assert_eq!(parsed[0].1["choices"][0]["delta"]["content"].as_str(), Some(""));
        assert_eq!(parsed[2].1["choices"][0]["finish_reason"].as_str(), Some("stop"));
    }

    #[test]
    fn test_stream_concatenation_matches_single_shot() {
        let response = response_with_image();
        let single = build_chat_completion(&response, "gemini-3.0-flash");
        let single_content =
            single["choices"][0]["message"]["content"].as_str().expect("content").to_string();

        let frames = chat_stream_frames(&response, "gemini-3.0-flash");
        let parsed = parse_frames(&frames[..3]);
        let streamed: String = parsed
            .iter()
            .filter_map(|(_, p)| p["choices"][0]["delta"]["content"].as_str())
            .collect();

        assert_eq!(streamed, single_content);
        assert!(single_content.contains("![Pic](https://x/img.png)"));
    }

    #[test]
    fn test_single_shot_without_images_has_no_extension_field() {
        let single = build_chat_completion(&GeneratedResponse::default(), "m");
        assert!(single.get("images").is_none());
        assert_eq!(single["usage"]["total_tokens"].as_i64(), Some(0));
    }
}

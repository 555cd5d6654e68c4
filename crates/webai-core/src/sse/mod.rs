//! Streaming protocol emulators.
//!
//! The upstream never streams: the only primitive is one blocking call that
//! returns a complete answer. "Streaming" therefore replays a fixed,
//! protocol-legal event skeleton around a single real content delta, so
//! clients that require incremental events (progress indicators, SSE
//! parsers) cannot tell the difference.

pub mod chat;
pub mod responses;

use crate::extract::TempFileGuard;
use crate::upstream::ResponseImage;
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use std::convert::Infallible;
use std::pin::Pin;

/// A named SSE frame: `event: <name>\ndata: <json>\n\n` (Responses style).
pub(crate) fn sse_event(event: &str, data: &Value) -> Bytes {
    Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        event,
        serde_json::to_string(data).unwrap_or_default()
    ))
}

/// A bare SSE frame: `data: <json>\n\n` (Chat Completions style).
pub(crate) fn sse_data(data: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", serde_json::to_string(data).unwrap_or_default()))
}

/// Response text with image references appended as markdown links.
/// Both single-shot builders and stream emulators go through this, so their
/// final content is field-identical for the same response.
#[must_use]
pub fn content_with_image_links(text: &str, images: &[ResponseImage]) -> String {
    if images.is_empty() {
        return text.to_string();
    }
    let links: Vec<String> =
        images.iter().map(|img| format!("![{}]({})", img.title, img.url)).collect();
    format!("{}\n\n{}", text, links.join("\n")).trim().to_string()
}

/// Wrap pre-built frames into a byte stream that holds the request's temp
/// file guard. The guard drops when the stream completes or the client
/// disconnects, so cleanup runs on every exit path and never before the
/// last frame is produced.
pub fn frames_into_stream(
    frames: Vec<Bytes>,
    guard: TempFileGuard,
) -> Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>> {
    Box::pin(async_stream::stream! {
        let _guard = guard;
        for frame in frames {
            yield Ok(frame);
        }
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::Bytes;
    use serde_json::Value;

    /// Parse SSE frames into (event name, payload) pairs. Bare `data:` frames
    /// get an empty event name; the `[DONE]` sentinel maps to a null payload.
    pub fn parse_frames(frames: &[Bytes]) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for frame in frames {
            let text = std::str::from_utf8(frame).expect("frame is utf-8");
            let mut event = String::new();
            let mut data = Value::Null;
            for line in text.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = name.to_string();
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    if payload != "[DONE]" {
                        data = serde_json::from_str(payload).expect("frame payload is JSON");
                    }
                }
            }
            out.push((event, data));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::ImageKind;

    fn image(title: &str, url: &str) -> ResponseImage {
        ResponseImage {
            kind: ImageKind::WebImage,
            url: url.to_string(),
            base64: String::new(),
            title: title.to_string(),
            alt: String::new(),
        }
    }

    #[test]
    fn test_content_without_images_is_verbatim() {
        assert_eq!(content_with_image_links("Hi", &[]), "Hi");
    }

    #[test]
    fn test_content_appends_markdown_links() {
        let images = vec![image("A cat", "https://x/cat.png"), image("A dog", "https://x/dog.png")];
        let content = content_with_image_links("Here:", &images);
        assert_eq!(content, "Here:\n\n![A cat](https://x/cat.png)\n![A dog](https://x/dog.png)");
    }

    #[test]
    fn test_empty_text_with_images_is_trimmed() {
        let images = vec![image("Img", "https://x/i.png")];
        assert_eq!(content_with_image_links("", &images), "![Img](https://x/i.png)");
    }
}

//! Multimodal content extraction.
//!
//! Turns one external message `content` field (plain string, or an array of
//! Chat Completions / Responses API parts) into plain text plus a list of
//! local file handles. Inline base64 images and remote URLs are materialized
//! as temp files; `file://` references resolve against the upload directory.
//!
//! Extraction never fails on a malformed part: it degrades per-part with a
//! logged warning and the request proceeds with whatever survived.

mod temp_files;

pub use temp_files::{cleanup_temp_files, get_temp_dir, TempFileGuard};

use base64::Engine as _;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Timeout for remote image downloads. A timeout skips the image, it never
/// fails the request.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

static MIME_TO_EXT: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("image/jpeg", ".jpg"),
        ("image/jpg", ".jpg"),
        ("image/png", ".png"),
        ("image/gif", ".gif"),
        ("image/webp", ".webp"),
        ("image/bmp", ".bmp"),
        ("application/pdf", ".pdf"),
    ])
});

static DOWNLOAD_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .unwrap_or_default()
});

fn ext_for_mime(mime: &str) -> &'static str {
    MIME_TO_EXT.get(mime).copied().unwrap_or(".bin")
}

/// One local file handle produced by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    /// True when the extractor created this file (base64 / remote download)
    /// and the caller owns its cleanup. False for pre-existing references.
    pub owned: bool,
}

/// Result of extracting one message's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub text: String,
    pub files: Vec<ExtractedFile>,
}

impl ExtractedMessage {
    fn text_only(text: String) -> Self {
        Self { text, files: Vec::new() }
    }

    /// Paths of every file, in part order.
    #[must_use]
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Paths the extractor created, for the request's cleanup guard.
    #[must_use]
    pub fn owned_paths(&self) -> Vec<PathBuf> {
        self.files.iter().filter(|f| f.owned).map(|f| f.path.clone()).collect()
    }
}

/// Extract text and file handles from a message `content` value.
///
/// Accepts both Chat Completions part types (`text`, `image_url` with a
/// nested `{url}` object) and Responses API part types (`input_text`,
/// `input_image` with a direct string `image_url`). Unknown part types are
/// ignored, not rejected.
pub async fn extract_content(content: &Value) -> ExtractedMessage {
    match content {
        Value::String(s) => ExtractedMessage::text_only(s.clone()),
        Value::Array(parts) => extract_parts(parts).await,
        // Falsy scalars are treated as absent content, not stringified.
        Value::Null | Value::Bool(false) => ExtractedMessage::default(),
        Value::Number(n) if n.as_f64() == Some(0.0) => ExtractedMessage::default(),
        other => ExtractedMessage::text_only(other.to_string()),
    }
}

async fn extract_parts(parts: &[Value]) -> ExtractedMessage {
    let mut text_parts: Vec<&str> = Vec::new();
    let mut files: Vec<ExtractedFile> = Vec::new();

    for part in parts {
        let Some(part_type) = part.get("type").and_then(Value::as_str) else {
            continue;
        };

        match part_type {
            "text" | "input_text" => {
                if let Some(txt) = part.get("text").and_then(Value::as_str) {
                    if !txt.is_empty() {
                        text_parts.push(txt);
                    }
                }
            },
            "image_url" | "input_image" => {
                let url = image_url_of(part);
                if url.is_empty() {
                    continue;
                }
                if let Some(file) = materialize_image(&url).await {
                    files.push(file);
                }
            },
            _ => {},
        }
    }

    ExtractedMessage { text: text_parts.join(" "), files }
}

/// The URL of an image part. Chat Completions nests it as
/// `{"image_url": {"url": "..."}}`, the Responses API sends a direct string.
fn image_url_of(part: &Value) -> String {
    match part.get("image_url") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(obj)) => {
            obj.get("url").and_then(Value::as_str).unwrap_or_default().to_string()
        },
        _ => String::new(),
    }
}

async fn materialize_image(url: &str) -> Option<ExtractedFile> {
    if let Some(rest) = url.strip_prefix("data:") {
        match decode_data_uri(rest) {
            Ok(path) => Some(ExtractedFile { path, owned: true }),
            Err(e) => {
                tracing::warn!("Skipping invalid base64 image: {}", e);
                None
            },
        }
    } else if let Some(file_id) = url.strip_prefix("file://") {
        resolve_file_ref(file_id).map(|path| ExtractedFile { path, owned: false })
    } else if url.starts_with("http://") || url.starts_with("https://") {
        download_to_tempfile(url).await.map(|path| ExtractedFile { path, owned: true })
    } else {
        // Unknown scheme — skip silently
        None
    }
}

/// Decode the payload of a `data:<mime>;base64,<data>` URI into a temp file.
/// `rest` is the URI with the `data:` prefix already stripped.
fn decode_data_uri(rest: &str) -> Result<PathBuf, String> {
    let comma = rest.find(',').ok_or("missing ',' separator in data URI")?;
    let (header, payload) = rest.split_at(comma);
    let payload = &payload[1..];

    let mut header_parts = header.split(';');
    let mime = header_parts.next().unwrap_or("").trim();
    if !header.contains("base64") {
        return Err(format!("data URI for '{}' is not base64-encoded", mime));
    }

    let raw = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))?;

    let dest = get_temp_dir().join(temp_files::unique_name("b64", ext_for_mime(mime)));
    std::fs::write(&dest, &raw).map_err(|e| format!("failed to write temp file: {}", e))?;
    tracing::debug!("Decoded base64 image to {} ({} bytes)", dest.display(), raw.len());
    Ok(dest)
}

/// Resolve a `file://<id>` reference to a previously uploaded file.
/// Identifiers carrying path separators or parent-dir sequences are rejected.
fn resolve_file_ref(file_id: &str) -> Option<PathBuf> {
    if file_id.contains('/') || file_id.contains('\\') || file_id.contains("..") {
        tracing::warn!("Invalid file_id in URL: file://{}", file_id);
        return None;
    }
    let candidate = get_temp_dir().join(file_id);
    if candidate.exists() {
        Some(candidate)
    } else {
        tracing::warn!("File not found for file_id: {}", file_id);
        None
    }
}

/// Download a remote image into a temp file named by its content type.
/// Returns `None` on any network failure (non-fatal to the request).
async fn download_to_tempfile(url: &str) -> Option<PathBuf> {
    let result = async {
        let resp = DOWNLOAD_CLIENT.get(url).send().await?.error_for_status()?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .unwrap_or("")
            .trim()
            .to_string();
        let body = resp.bytes().await?;
        Ok::<_, reqwest::Error>((content_type, body))
    }
    .await;

    match result {
        Ok((content_type, body)) => {
            let ext = MIME_TO_EXT.get(content_type.as_str()).copied().unwrap_or(".jpg");
            let dest = get_temp_dir().join(temp_files::unique_name("dl", ext));
            match std::fs::write(&dest, &body) {
                Ok(()) => {
                    tracing::debug!(
                        "Downloaded {} to {} ({} bytes)",
                        url,
                        dest.display(),
                        body.len()
                    );
                    Some(dest)
                },
                Err(e) => {
                    tracing::warn!("Failed to write downloaded image {}: {}", url, e);
                    None
                },
            }
        },
        Err(e) => {
            tracing::warn!("Failed to download {}: {}", url, e);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_plain_string_passthrough() {
        let result = extract_content(&json!("hello")).await;
        assert_eq!(result.text, "hello");
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn test_null_content_is_empty() {
        let result = extract_content(&Value::Null).await;
        assert_eq!(result.text, "");
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn test_falsy_scalars_are_treated_as_absent() {
        assert_eq!(extract_content(&json!(false)).await.text, "");
        assert_eq!(extract_content(&json!(0)).await.text, "");
        assert_eq!(extract_content(&json!(0.0)).await.text, "");
        // Truthy scalars still coerce
        assert_eq!(extract_content(&json!(true)).await.text, "true");
    }

    #[tokio::test]
    async fn test_non_string_scalar_is_coerced() {
        let result = extract_content(&json!(42)).await;
        assert_eq!(result.text, "42");
    }

    #[tokio::test]
    async fn test_text_parts_are_space_joined() {
        let content = json!([
            {"type": "text", "text": "a"},
            {"type": "input_text", "text": "b"},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.text, "a b");
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_part_types_are_ignored() {
        let content = json!([
            {"type": "function_call", "name": "x"},
            {"type": "text", "text": "kept"},
            {"not_even_a_type": true},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.text, "kept");
    }

    #[tokio::test]
    async fn test_data_uri_decodes_to_file() {
        // "QUJD" decodes to "ABC" (3 bytes)
        let content = json!([
            {"type": "input_image", "image_url": "data:image/png;base64,QUJD"},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.files.len(), 1);
        let file = &result.files[0];
        assert!(file.owned);
        assert_eq!(file.path.extension().and_then(|e| e.to_str()), Some("png"));
        let bytes = std::fs::read(&file.path).expect("read temp file");
        assert_eq!(bytes, b"ABC");
        cleanup_temp_files(&result.owned_paths());
    }

    #[tokio::test]
    async fn test_unknown_mime_gets_bin_extension() {
        let content = json!([
            {"type": "input_image", "image_url": "data:application/x-weird;base64,QUJD"},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].path.extension().and_then(|e| e.to_str()), Some("bin"));
        cleanup_temp_files(&result.owned_paths());
    }

    #[tokio::test]
    async fn test_invalid_data_uri_is_skipped() {
        let content = json!([
            {"type": "image_url", "image_url": {"url": "data:image/png;base64"}},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,%%%"}},
            {"type": "text", "text": "still here"},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.text, "still here");
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn test_nested_image_url_object() {
        let content = json!([
            {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD", "detail": "auto"}},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].path.extension().and_then(|e| e.to_str()), Some("jpg"));
        cleanup_temp_files(&result.owned_paths());
    }

    #[tokio::test]
    async fn test_file_ref_traversal_is_rejected() {
        let content = json!([
            {"type": "image_url", "image_url": {"url": "file://../../etc/passwd"}},
            {"type": "image_url", "image_url": {"url": "file://sub/dir.png"}},
        ]);
        let result = extract_content(&content).await;
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn test_file_ref_resolves_existing_upload() {
        let name = temp_files::unique_name("upload", ".png");
        let path = get_temp_dir().join(&name);
        std::fs::write(&path, b"data").expect("write upload");

        let content = json!([
            {"type": "input_image", "image_url": format!("file://{}", name)},
        ]);
        let result = extract_content(&content).await;
        assert_eq!(result.files.len(), 1);
        assert!(!result.files[0].owned, "pre-existing uploads are not owned by the request");

        std::fs::remove_file(&path).expect("cleanup");
    }

    #[tokio::test]
    async fn test_missing_file_ref_is_skipped() {
        let content = json!([
            {"type": "input_image", "image_url": "file://does-not-exist.png"},
        ]);
        let result = extract_content(&content).await;
        assert!(result.files.is_empty());
    }

    #[tokio::test]
    async fn test_empty_and_unknown_schemes_are_skipped() {
        let content = json!([
            {"type": "input_image", "image_url": ""},
            {"type": "input_image", "image_url": "ftp://example.com/x.png"},
        ]);
        let result = extract_content(&content).await;
        assert!(result.files.is_empty());
    }
}

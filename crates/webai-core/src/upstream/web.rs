//! Default [`SessionConnector`] talking to the Gemini web app with session
//! cookies. The wire format is the batchexecute envelope the web UI itself
//! uses; everything here is best-effort parsing of an unversioned protocol,
//! so parse failures surface as retryable upstream errors rather than bugs.

use crate::error::AppError;
use crate::models::ModelId;
use crate::upstream::{
    ConnectError, CookiePair, CredentialCandidate, GeneratedResponse, ImageKind, ResponseImage,
    SessionConnector, UpstreamSession,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const INIT_URL: &str = "https://gemini.google.com/app";
const GENERATE_URL: &str =
    "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";
const UPLOAD_URL: &str = "https://content-push.googleapis.com/upload";
const UPLOAD_PUSH_ID: &str = "feeds/mcudyrk2a4khkz";
const BOQ_VERSION: &str = "boq_assistant-bard-web-server_20250326.21_p1";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const INIT_TIMEOUT: Duration = Duration::from_secs(30);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(300);

/// Production session factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiWebConnector;

#[async_trait]
impl SessionConnector for GeminiWebConnector {
    async fn connect(
        &self,
        candidate: &CredentialCandidate,
        proxy: Option<&str>,
    ) -> Result<Arc<dyn UpstreamSession>, ConnectError> {
        let client = build_http_client(proxy)
            .map_err(|e| ConnectError::Other(format!("Failed to build HTTP client: {e}")))?;
        let jar = RwLock::new(candidate.cookies.clone());

        let response = client
            .get(INIT_URL)
            .timeout(INIT_TIMEOUT)
            .header(COOKIE, cookie_header(&candidate.cookies))
            .send()
            .await
            .map_err(|e| ConnectError::Network(format!("Failed to reach Gemini: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ConnectError::Auth(format!(
                "Gemini rejected the session cookies (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(ConnectError::Network(format!(
                "Unexpected status {} fetching the Gemini app shell",
                status.as_u16()
            )));
        }

        absorb_rotated_cookies(&jar, response.headers());

        let html = response
            .text()
            .await
            .map_err(|e| ConnectError::Network(format!("Failed to read the app shell: {e}")))?;
        let access_token = extract_access_token(&html).ok_or_else(|| {
            // The shell renders without SNlM0e when the cookies are stale.
            ConnectError::Auth(
                "Failed to obtain an access token; cookies are likely invalid or expired"
                    .to_string(),
            )
        })?;

        Ok(Arc::new(GeminiWebSession { client, access_token, jar }))
    }
}

pub struct GeminiWebSession {
    client: reqwest::Client,
    access_token: String,
    jar: RwLock<CookiePair>,
}

#[async_trait]
impl UpstreamSession for GeminiWebSession {
    async fn generate(
        &self,
        prompt: &str,
        model: ModelId,
        files: &[PathBuf],
    ) -> Result<GeneratedResponse, AppError> {
        let mut uploaded = Vec::with_capacity(files.len());
        for path in files {
            uploaded.push(self.upload_file(path).await?);
        }

        let f_req = build_generate_payload(prompt, &uploaded);
        let reqid = request_id();
        let response = self
            .client
            .post(GENERATE_URL)
            .timeout(GENERATE_TIMEOUT)
            .query(&[("bl", BOQ_VERSION), ("rt", "c"), ("_reqid", reqid.as_str())])
            .header(COOKIE, cookie_header(&self.cookies()))
            .header("x-goog-ext-525001261-jspb", model_header(model))
            .form(&[("at", self.access_token.as_str()), ("f.req", f_req.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Auth(format!(
                "Gemini session cookie was rejected (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Gemini generate returned HTTP {}",
                status.as_u16()
            )));
        }

        absorb_rotated_cookies(&self.jar, response.headers());

        let body = response.text().await?;
        parse_generate_response(&body)
    }

    fn cookies(&self) -> CookiePair {
        self.jar.read().expect("cookie jar lock poisoned").clone()
    }
}

impl GeminiWebSession {
    /// Push one local file to the upload service; returns the opaque
    /// identifier the generate payload references it by.
    async fn upload_file(&self, path: &PathBuf) -> Result<(String, String), AppError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(name.clone());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(UPLOAD_URL)
            .timeout(INIT_TIMEOUT)
            .header("Push-ID", UPLOAD_PUSH_ID)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "File upload failed with HTTP {}",
                response.status().as_u16()
            )));
        }
        let identifier = response.text().await?;
        Ok((identifier.trim().to_string(), name))
    }
}

fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(url)?);
    }
    builder.build()
}

fn cookie_header(pair: &CookiePair) -> String {
    format!("__Secure-1PSID={}; __Secure-1PSIDTS={}", pair.psid, pair.psidts)
}

/// Model selection header the web UI sends; the upstream falls back to the
/// default flash model when the value is unknown to it.
fn model_header(model: ModelId) -> &'static str {
    match model {
        ModelId::Pro => "[1,null,null,null,\"9d8ca3786d86a86f\"]",
        ModelId::Flash => "[1,null,null,null,\"b1e46a6037e6aa9f\"]",
        ModelId::FlashThinking => "[1,null,null,null,\"7ca48d02d802f20a\"]",
    }
}

fn request_id() -> String {
    // The web UI sends a short pseudo-random id; any value works.
    format!("{}", chrono::Utc::now().timestamp_millis() % 1_000_000)
}

fn build_generate_payload(prompt: &str, uploaded: &[(String, String)]) -> String {
    let file_list: Value = if uploaded.is_empty() {
        Value::Null
    } else {
        Value::Array(
            uploaded
                .iter()
                .map(|(id, name)| json!([[id], name]))
                .collect(),
        )
    };
    // Stateless: no conversation metadata, every call starts a fresh chat.
    let inner = json!([[prompt, 0, Value::Null, file_list], Value::Null, Value::Null]);
    json!([Value::Null, inner.to_string()]).to_string()
}

/// Record any `__Secure-1PSID`/`__Secure-1PSIDTS` the upstream rotated
/// through Set-Cookie.
fn absorb_rotated_cookies(jar: &RwLock<CookiePair>, headers: &HeaderMap) {
    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let Some((name, rest)) = raw.split_once('=') else { continue };
        let value = rest.split(';').next().unwrap_or("").trim();
        if value.is_empty() {
            continue;
        }
        match name.trim() {
            "__Secure-1PSIDTS" => {
                jar.write().expect("cookie jar lock poisoned").psidts = value.to_string();
                tracing::debug!("Captured rotated __Secure-1PSIDTS from upstream");
            },
            "__Secure-1PSID" => {
                jar.write().expect("cookie jar lock poisoned").psid = value.to_string();
                tracing::debug!("Captured rotated __Secure-1PSID from upstream");
            },
            _ => {},
        }
    }
}

fn extract_access_token(html: &str) -> Option<String> {
    let marker = "\"SNlM0e\":\"";
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')? + start;
    let token = &html[start..end];
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Parse the batchexecute response body into a [`GeneratedResponse`].
fn parse_generate_response(body: &str) -> Result<GeneratedResponse, AppError> {
    let payload = find_response_payload(body).ok_or_else(|| {
        AppError::Upstream("Failed to parse the Gemini response envelope".to_string())
    })?;

    let candidate = payload
        .get(4)
        .and_then(|c| c.get(0))
        .ok_or_else(|| {
            AppError::Upstream("Failed to parse the Gemini response: no candidates".to_string())
        })?;

    let text = str_path(candidate, &[1, 0])
        .ok_or_else(|| {
            AppError::Upstream("Failed to parse the Gemini response: no text".to_string())
        })?
        .to_string();

    let thoughts = str_path(candidate, &[37, 0, 0]).map(str::to_string);

    let mut images = Vec::new();
    if let Some(list) = candidate.get(12).and_then(|v| v.get(1)).and_then(Value::as_array) {
        for img in list {
            if let Some(url) = str_path(img, &[0, 0, 0]) {
                images.push(ResponseImage {
                    kind: ImageKind::WebImage,
                    url: url.to_string(),
                    base64: String::new(),
                    title: str_path(img, &[7, 0]).unwrap_or("[Image]").to_string(),
                    alt: str_path(img, &[0, 4]).unwrap_or_default().to_string(),
                });
            }
        }
    }
    if let Some(list) = candidate
        .get(12)
        .and_then(|v| v.get(7))
        .and_then(|v| v.get(0))
        .and_then(Value::as_array)
    {
        for (i, img) in list.iter().enumerate() {
            if let Some(url) = str_path(img, &[0, 3, 3]) {
                images.push(ResponseImage {
                    kind: ImageKind::GeneratedImage,
                    url: url.to_string(),
                    base64: String::new(),
                    title: format!("[Generated Image {}]", i + 1),
                    alt: str_path(img, &[3, 5, 0]).unwrap_or_default().to_string(),
                });
            }
        }
    }

    Ok(GeneratedResponse { text, thoughts, images })
}

/// Walk the chunked envelope: skip the `)]}'` guard, try each line as a
/// JSON array, and return the first `wrb.fr` payload that carries a
/// candidate list.
fn find_response_payload(body: &str) -> Option<Value> {
    for line in body.lines() {
        let Ok(envelope) = serde_json::from_str::<Value>(line) else { continue };
        let Some(items) = envelope.as_array() else { continue };
        for item in items {
            let Some(raw) = item.get(2).and_then(Value::as_str) else { continue };
            let Ok(payload) = serde_json::from_str::<Value>(raw) else { continue };
            if payload.get(4).map_or(false, |v| !v.is_null()) {
                return Some(payload);
            }
        }
    }
    None
}

fn str_path<'a>(value: &'a Value, path: &[usize]) -> Option<&'a str> {
    let mut cursor = value;
    for &index in path {
        cursor = cursor.get(index)?;
    }
    cursor.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_extraction() {
        let html = r#"<script>window.WIZ_global_data = {"SNlM0e":"AFnx9-token-123:171","x":1};</script>"#;
        assert_eq!(extract_access_token(html).as_deref(), Some("AFnx9-token-123:171"));
        assert!(extract_access_token("<html>no token here</html>").is_none());
        assert!(extract_access_token(r#""SNlM0e":"""#).is_none());
    }

    #[test]
    fn test_cookie_header_format() {
        let pair = CookiePair::new("sid", "ts");
        assert_eq!(cookie_header(&pair), "__Secure-1PSID=sid; __Secure-1PSIDTS=ts");
    }

    #[test]
    fn test_rotated_psidts_is_absorbed() {
        let jar = RwLock::new(CookiePair::new("sid", "old-ts"));
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            "__Secure-1PSIDTS=new-ts; Path=/; Secure; HttpOnly".parse().expect("header"),
        );
        headers.append(SET_COOKIE, "NID=ignored; Path=/".parse().expect("header"));
        absorb_rotated_cookies(&jar, &headers);
        let pair = jar.read().expect("lock").clone();
        assert_eq!(pair.psid, "sid");
        assert_eq!(pair.psidts, "new-ts");
    }

    #[test]
    fn test_empty_set_cookie_value_is_ignored() {
        let jar = RwLock::new(CookiePair::new("sid", "ts"));
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, "__Secure-1PSIDTS=; Path=/".parse().expect("header"));
        absorb_rotated_cookies(&jar, &headers);
        assert_eq!(jar.read().expect("lock").psidts, "ts");
    }

    #[test]
    fn test_generate_payload_without_files() {
        let payload = build_generate_payload("hello", &[]);
        let outer: Value = serde_json::from_str(&payload).expect("outer");
        let inner: Value =
            serde_json::from_str(outer[1].as_str().expect("inner string")).expect("inner");
        assert_eq!(inner[0][0], "hello");
        assert!(inner[0][3].is_null());
    }

    #[test]
    fn test_generate_payload_with_files() {
        let uploaded = vec![("contrib_service/id123".to_string(), "cat.png".to_string())];
        let payload = build_generate_payload("look", &uploaded);
        let outer: Value = serde_json::from_str(&payload).expect("outer");
        let inner: Value =
            serde_json::from_str(outer[1].as_str().expect("inner string")).expect("inner");
        assert_eq!(inner[0][3][0][0][0], "contrib_service/id123");
        assert_eq!(inner[0][3][0][1], "cat.png");
    }

    fn envelope_with(payload: &Value) -> String {
        let line = serde_json::json!([["wrb.fr", Value::Null, payload.to_string()]]);
        format!(")]}}'\n\n123\n{line}\n")
    }

    #[test]
    fn test_parse_text_and_thoughts() {
        let mut candidate = vec![Value::Null; 40];
        candidate[1] = json!(["The answer."]);
        candidate[37] = json!([["Thinking about it."]]);
        let mut payload = vec![Value::Null; 5];
        payload[4] = json!([Value::Array(candidate)]);
        let body = envelope_with(&Value::Array(payload));

        let parsed = parse_generate_response(&body).expect("parse");
        assert_eq!(parsed.text, "The answer.");
        assert_eq!(parsed.thoughts.as_deref(), Some("Thinking about it."));
        assert!(parsed.images.is_empty());
    }

    #[test]
    fn test_parse_web_images() {
        let mut candidate = vec![Value::Null; 40];
        candidate[1] = json!(["See below."]);
        candidate[12] = json!([
            Value::Null,
            [[[["https://img.example/cat.jpg"], Value::Null, Value::Null, Value::Null, "a cat"],
              Value::Null, Value::Null, Value::Null, Value::Null, Value::Null, Value::Null,
              ["Cat photo"]]]
        ]);
        let mut payload = vec![Value::Null; 5];
        payload[4] = json!([Value::Array(candidate)]);
        let body = envelope_with(&Value::Array(payload));

        let parsed = parse_generate_response(&body).expect("parse");
        assert_eq!(parsed.images.len(), 1);
        assert_eq!(parsed.images[0].kind, ImageKind::WebImage);
        assert_eq!(parsed.images[0].url, "https://img.example/cat.jpg");
        assert_eq!(parsed.images[0].title, "Cat photo");
        assert_eq!(parsed.images[0].alt, "a cat");
    }

    #[test]
    fn test_garbage_body_is_a_parse_error() {
        let err = parse_generate_response(")]}'\n\nnot json at all").expect_err("err");
        assert!(err.to_string().to_lowercase().contains("parse"));
    }
}

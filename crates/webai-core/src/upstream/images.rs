//! Inline serialization of response images. Upstream image URLs are often
//! cookie-gated and short-lived, so each one is fetched with the session
//! cookies and embedded as a base64 data URI. Every fetch is best-effort:
//! a failure leaves that image's `base64` empty and the response intact.

use crate::upstream::{CookiePair, ResponseImage};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::COOKIE;
use std::sync::LazyLock;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

static IMAGE_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .unwrap_or_default()
});

/// Fill in `base64` for every image in place.
pub async fn serialize_response_images(
    mut images: Vec<ResponseImage>,
    cookies: &CookiePair,
) -> Vec<ResponseImage> {
    for image in &mut images {
        image.base64 = fetch_image_as_data_uri(&image.url, cookies).await.unwrap_or_default();
    }
    images
}

async fn fetch_image_as_data_uri(url: &str, cookies: &CookiePair) -> Option<String> {
    let response = IMAGE_CLIENT
        .get(url)
        .header(
            COOKIE,
            format!("__Secure-1PSID={}; __Secure-1PSIDTS={}", cookies.psid, cookies.psidts),
        )
        .send()
        .await
        .map_err(|e| tracing::warn!("Image fetch failed for {}: {}", url, e))
        .ok()?;

    if !response.status().is_success() {
        tracing::warn!("Image fetch for {} returned HTTP {}", url, response.status().as_u16());
        return None;
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or_else(|| "image/jpeg".to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| tracing::warn!("Image body read failed for {}: {}", url, e))
        .ok()?;

    Some(format!("data:{};base64,{}", mime, BASE64.encode(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::ImageKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image(url: String) -> ResponseImage {
        ResponseImage {
            kind: ImageKind::WebImage,
            url,
            base64: String::new(),
            title: "[Image]".to_string(),
            alt: String::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_fetch_yields_data_uri() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .and(header("cookie", "__Secure-1PSID=sid; __Secure-1PSIDTS=ts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"PNGDATA".to_vec()),
            )
            .mount(&server)
            .await;

        let cookies = CookiePair::new("sid", "ts");
        let out =
            serialize_response_images(vec![image(format!("{}/cat.png", server.uri()))], &cookies)
                .await;
        assert_eq!(out[0].base64, format!("data:image/png;base64,{}", BASE64.encode(b"PNGDATA")));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_base64_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cookies = CookiePair::new("sid", "ts");
        let out =
            serialize_response_images(vec![image(format!("{}/gone.jpg", server.uri()))], &cookies)
                .await;
        assert_eq!(out[0].base64, "");
        assert_eq!(out[0].title, "[Image]");
    }

    #[tokio::test]
    async fn test_missing_content_type_defaults_to_jpeg() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RAW".to_vec()))
            .mount(&server)
            .await;

        let cookies = CookiePair::new("sid", "ts");
        let out = serialize_response_images(vec![image(format!("{}/raw", server.uri()))], &cookies)
            .await;
        assert!(out[0].base64.starts_with("data:image/jpeg;base64,"));
    }
}

//! Upstream session abstraction and the Gemini web client behind it.
//!
//! The authenticated web client is an opaque capability to the rest of the
//! gateway: `connect(credentials, proxy) -> session`, `generate(prompt,
//! model, files) -> response`, plus an observable cookie jar that the
//! upstream rotates on its own schedule.

pub mod images;
pub mod web;

use crate::error::AppError;
use crate::models::ModelId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// The two session cookies that authenticate the web client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookiePair {
    pub psid: String,
    pub psidts: String,
}

impl CookiePair {
    #[must_use]
    pub fn new(psid: impl Into<String>, psidts: impl Into<String>) -> Self {
        Self { psid: psid.into(), psidts: psidts.into() }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.psid.trim().is_empty() && !self.psidts.trim().is_empty()
    }
}

/// Where a credential pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    Env,
    Config,
    Browser,
}

/// One complete credential pair plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCandidate {
    pub source: CredentialSource,
    pub cookies: CookiePair,
}

/// Connection failure partitioning drives the credential chain:
/// auth failures advance to the next candidate, everything else aborts.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

/// An image attached to a generated response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseImage {
    /// "web_image" or "generated_image".
    #[serde(rename = "type")]
    pub kind: ImageKind,
    /// Original upstream URL.
    pub url: String,
    /// Data URI (`data:<mime>;base64,...`), empty when the fetch failed.
    pub base64: String,
    pub title: String,
    pub alt: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    WebImage,
    GeneratedImage,
}

/// A completed upstream answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ResponseImage>,
}

/// A live authenticated session. Exactly one exists process-wide at a time,
/// owned by the [`crate::client::ClientManager`].
#[async_trait]
pub trait UpstreamSession: Send + Sync {
    /// Single blocking upstream call: complete answer, no token streaming.
    async fn generate(
        &self,
        prompt: &str,
        model: ModelId,
        files: &[PathBuf],
    ) -> Result<GeneratedResponse, AppError>;

    /// Current cookie values. The upstream library rotates these silently;
    /// the rotation persister polls this jar.
    fn cookies(&self) -> CookiePair;
}

/// Session factory. The production implementation is
/// [`web::GeminiWebConnector`]; tests substitute mocks.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        candidate: &CredentialCandidate,
        proxy: Option<&str>,
    ) -> Result<Arc<dyn UpstreamSession>, ConnectError>;
}

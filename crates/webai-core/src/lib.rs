//! # WebAI Core
//!
//! Core business logic for WebAI Gateway.
//!
//! ```text
//! webai-core/src/
//! ├── models.rs    # Model name resolution (aliases + heuristics)
//! ├── extract/     # Multimodal content extraction + temp file lifecycle
//! ├── client/      # Credential chain, session lifecycle, cookie rotation
//! ├── upstream/    # Gemini web client behind SessionConnector/UpstreamSession
//! ├── sse/         # Streaming protocol emulators (Chat Completions, Responses)
//! ├── notify.rs    # Notification gate interface + error classification
//! └── config.rs    # Persisted configuration store
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod notify;
pub mod sse;
pub mod upstream;

// Re-export commonly used types
pub use client::{ClientErrorCode, ClientManager, ClientStatus};
pub use config::{AppConfig, ConfigStore};
pub use error::{AppError, AppResult};
pub use models::{list_model_ids, resolve_model, ModelId};
pub use upstream::{CookiePair, CredentialCandidate, CredentialSource, GeneratedResponse};

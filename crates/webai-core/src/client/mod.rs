//! Upstream client lifecycle: credential chain, session ownership, status.
//!
//! Exactly one live session exists process-wide. All mutation funnels
//! through [`ClientManager::initialize`] behind a single-flight lock; a new
//! session is built fully off to the side and swapped in atomically, so
//! readers never observe a half-constructed handle.

mod browser;
pub mod rotation;

use crate::config::{AppConfig, ConfigStore};
use crate::error::{AppError, AppResult};
use crate::upstream::{
    ConnectError, CookiePair, CredentialCandidate, CredentialSource, SessionConnector,
    UpstreamSession,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub const ENV_COOKIE_1PSID: &str = "GEMINI_COOKIE_1PSID";
pub const ENV_COOKIE_1PSIDTS: &str = "GEMINI_COOKIE_1PSIDTS";

/// Why the client is not initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientErrorCode {
    None,
    AuthExpired,
    NoCredentials,
    Network,
    Disabled,
    Unknown,
}

/// Snapshot of the client state for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub initialized: bool,
    pub error_code: ClientErrorCode,
    pub error: Option<String>,
}

impl ClientStatus {
    fn uninitialized() -> Self {
        Self { initialized: false, error_code: ClientErrorCode::None, error: None }
    }

    fn ready() -> Self {
        Self { initialized: true, error_code: ClientErrorCode::None, error: None }
    }

    fn failed(code: ClientErrorCode, detail: impl Into<String>) -> Self {
        Self { initialized: false, error_code: code, error: Some(detail.into()) }
    }
}

struct ClientState {
    session: Option<Arc<dyn UpstreamSession>>,
    status: ClientStatus,
}

/// Owns the single upstream session and its initialization lifecycle.
pub struct ClientManager {
    connector: Arc<dyn SessionConnector>,
    config: Arc<ConfigStore>,
    state: RwLock<ClientState>,
    /// Single-flight guard: concurrent `initialize` callers serialize here,
    /// late callers observe the in-flight attempt's result.
    init_lock: Mutex<()>,
}

impl ClientManager {
    #[must_use]
    pub fn new(connector: Arc<dyn SessionConnector>, config: Arc<ConfigStore>) -> Self {
        Self {
            connector,
            config,
            state: RwLock::new(ClientState {
                session: None,
                status: ClientStatus::uninitialized(),
            }),
            init_lock: Mutex::new(()),
        }
    }

    /// (Re-)initialize the upstream session. Idempotent; fully supersedes
    /// the previous handle and status. Returns true when a session is live.
    pub async fn initialize(&self) -> bool {
        let _flight = self.init_lock.lock().await;

        let cfg = self.config.snapshot().await;
        if !cfg.gemini_enabled {
            let detail = "Gemini client is disabled in config.";
            tracing::info!("{}", detail);
            self.install_failure(ClientErrorCode::Disabled, detail).await;
            return false;
        }

        let candidates = build_candidates(&cfg).await;
        self.try_candidates(candidates, cfg.proxy()).await
    }

    async fn try_candidates(
        &self,
        candidates: Vec<CredentialCandidate>,
        proxy: Option<&str>,
    ) -> bool {
        if candidates.is_empty() {
            let detail = "Gemini cookies not found.";
            tracing::error!("{}", detail);
            self.install_failure(ClientErrorCode::NoCredentials, detail).await;
            return false;
        }

        let mut last_auth_error = String::new();
        for candidate in &candidates {
            match self.connector.connect(candidate, proxy).await {
                Ok(session) => {
                    tracing::info!(
                        "Gemini client initialized successfully (credentials: {:?})",
                        candidate.source
                    );
                    self.install_session(session).await;
                    return true;
                },
                Err(ConnectError::Auth(msg)) => {
                    tracing::error!(
                        "Gemini authentication failed ({:?} credentials): {}",
                        candidate.source,
                        msg
                    );
                    last_auth_error = msg;
                },
                Err(ConnectError::Network(msg)) => {
                    // Network failures are not credential-specific; trying
                    // the next pair over a broken network is pointless.
                    tracing::error!("Network error initializing Gemini client: {}", msg);
                    self.install_failure(ClientErrorCode::Network, msg).await;
                    return false;
                },
                Err(ConnectError::Other(msg)) => {
                    tracing::error!("Unexpected error initializing Gemini client: {}", msg);
                    self.install_failure(ClientErrorCode::Unknown, msg).await;
                    return false;
                },
            }
        }

        self.install_failure(ClientErrorCode::AuthExpired, last_auth_error).await;
        false
    }

    async fn install_session(&self, session: Arc<dyn UpstreamSession>) {
        let mut state = self.state.write().await;
        state.session = Some(session);
        state.status = ClientStatus::ready();
    }

    async fn install_failure(&self, code: ClientErrorCode, detail: impl Into<String>) {
        let mut state = self.state.write().await;
        state.session = None;
        state.status = ClientStatus::failed(code, detail);
    }

    /// The live session, or the last recorded initialization error.
    /// Safe to call concurrently with re-initialization.
    pub async fn live_session(&self) -> AppResult<Arc<dyn UpstreamSession>> {
        let state = self.state.read().await;
        match &state.session {
            Some(session) => Ok(session.clone()),
            None => {
                let detail = state.status.error.clone().unwrap_or_else(|| {
                    "Gemini client was not initialized. Check logs for details.".to_string()
                });
                Err(AppError::NotInitialized(detail))
            },
        }
    }

    /// The live session if any, without the error detail. Used by the
    /// rotation persister, for which an absent session is not an error.
    pub async fn current_session(&self) -> Option<Arc<dyn UpstreamSession>> {
        self.state.read().await.session.clone()
    }

    /// Pure status read: never blocks on initialization, never triggers it.
    pub async fn status(&self) -> ClientStatus {
        self.state.read().await.status.clone()
    }
}

/// Ordered credential candidates: environment first, then the persisted
/// config pair (skipped when identical to the environment pair), then — only
/// when nothing else was found — browser-derived cookies.
async fn build_candidates(cfg: &AppConfig) -> Vec<CredentialCandidate> {
    let env_pair = env_credentials();
    let config_pair = {
        let pair = CookiePair::new(cfg.cookie_1psid.trim(), cfg.cookie_1psidts.trim());
        pair.is_complete().then_some(pair)
    };

    let mut candidates = build_candidate_list(env_pair, config_pair);

    if candidates.is_empty() && cfg.browser_cookie_fallback {
        if let Some(candidate) = browser::load_browser_cookies().await {
            candidates.push(candidate);
        }
    }

    candidates
}

/// The deterministic (env, config) part of the chain, kept pure for testing.
fn build_candidate_list(
    env_pair: Option<CookiePair>,
    config_pair: Option<CookiePair>,
) -> Vec<CredentialCandidate> {
    let mut candidates = Vec::new();

    if let Some(cookies) = env_pair {
        candidates.push(CredentialCandidate { source: CredentialSource::Env, cookies });
    }

    if let Some(cookies) = config_pair {
        // Avoid a redundant duplicate attempt when env and config carry
        // the same pair.
        let duplicate = candidates.iter().any(|c| c.cookies == cookies);
        if !duplicate {
            candidates.push(CredentialCandidate { source: CredentialSource::Config, cookies });
        }
    }

    candidates
}

fn env_credentials() -> Option<CookiePair> {
    let psid = trimmed_env(ENV_COOKIE_1PSID)?;
    let psidts = trimmed_env(ENV_COOKIE_1PSIDTS)?;
    Some(CookiePair::new(psid, psidts))
}

/// Env values arrive quoted from some shells and .env loaders.
fn trimmed_env(name: &str) -> Option<String> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::error::AppError;
    use crate::models::ModelId;
    use crate::upstream::{
        ConnectError, CookiePair, CredentialCandidate, CredentialSource, GeneratedResponse,
        SessionConnector, UpstreamSession,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Scripted outcome for one connect attempt.
    pub enum ConnectOutcome {
        Success,
        AuthError(&'static str),
        NetworkError(&'static str),
        OtherError(&'static str),
    }

    pub struct MockSession {
        pub cookies: Mutex<CookiePair>,
        pub response: GeneratedResponse,
        pub calls: Mutex<Vec<(String, ModelId, Vec<PathBuf>)>>,
    }

    impl MockSession {
        pub fn new(cookies: CookiePair) -> Arc<Self> {
            Arc::new(Self {
                cookies: Mutex::new(cookies),
                response: GeneratedResponse::default(),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl UpstreamSession for MockSession {
        async fn generate(
            &self,
            prompt: &str,
            model: ModelId,
            files: &[PathBuf],
        ) -> Result<GeneratedResponse, AppError> {
            self.calls.lock().expect("lock").push((
                prompt.to_string(),
                model,
                files.to_vec(),
            ));
            Ok(self.response.clone())
        }

        fn cookies(&self) -> CookiePair {
            self.cookies.lock().expect("lock").clone()
        }
    }

    pub struct MockConnector {
        outcomes: Mutex<VecDeque<ConnectOutcome>>,
        pub attempts: Mutex<Vec<CredentialSource>>,
    }

    impl MockConnector {
        pub fn new(outcomes: Vec<ConnectOutcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                attempts: Mutex::new(Vec::new()),
            })
        }

        pub fn attempt_count(&self) -> usize {
            self.attempts.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl SessionConnector for MockConnector {
        async fn connect(
            &self,
            candidate: &CredentialCandidate,
            _proxy: Option<&str>,
        ) -> Result<Arc<dyn UpstreamSession>, ConnectError> {
            self.attempts.lock().expect("lock").push(candidate.source);
            match self.outcomes.lock().expect("lock").pop_front() {
                Some(ConnectOutcome::Success) | None => {
                    Ok(MockSession::new(candidate.cookies.clone()))
                },
                Some(ConnectOutcome::AuthError(m)) => Err(ConnectError::Auth(m.to_string())),
                Some(ConnectOutcome::NetworkError(m)) => Err(ConnectError::Network(m.to_string())),
                Some(ConnectOutcome::OtherError(m)) => Err(ConnectError::Other(m.to_string())),
            }
        }
    }
}

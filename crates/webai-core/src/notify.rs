//! Notification gate interface and upstream failure classification.
//!
//! The gate itself (throttling, transport) belongs to an external
//! collaborator; the core only classifies failures and invokes the trait
//! from the request-handling edge.

use async_trait::async_trait;

/// Alert categories the request edge reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credential rejection — the session cookies have expired.
    Auth,
    /// 5xx-class upstream instability.
    ServerError,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::ServerError => "server_error",
        }
    }
}

/// How an upstream generation failure maps onto the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Auth/cookie rejection → 401, notify under [`ErrorCategory::Auth`].
    Auth,
    /// Known transient instability (parse/stall errors) → 503 with retry hint.
    Transient,
    /// Everything else → 500.
    Unexpected,
}

/// Classify an upstream error by message content. The web client does not
/// expose typed failures for these, so the keywords mirror what it emits.
#[must_use]
pub fn classify_upstream_error(message: &str) -> UpstreamFailure {
    let lower = message.to_lowercase();
    if lower.contains("auth") || lower.contains("cookie") {
        UpstreamFailure::Auth
    } else if lower.contains("zombie") || lower.contains("parse") || lower.contains("stalled") {
        UpstreamFailure::Transient
    } else {
        UpstreamFailure::Unexpected
    }
}

/// Rate-limited alerting trigger, invoked when upstream calls fail.
/// Returns whether a notification was actually sent.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        category: ErrorCategory,
        summary: &str,
        endpoint: &str,
        detail: &str,
    ) -> bool;
}

/// Default gate: logs the alert and reports it as not sent.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        category: ErrorCategory,
        summary: &str,
        endpoint: &str,
        detail: &str,
    ) -> bool {
        tracing::warn!(
            category = category.as_str(),
            endpoint = endpoint,
            detail = detail,
            "Notification: {}",
            summary
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_keywords() {
        assert_eq!(classify_upstream_error("AuthError: SNlM0e not found"), UpstreamFailure::Auth);
        assert_eq!(classify_upstream_error("cookie expired"), UpstreamFailure::Auth);
    }

    #[test]
    fn test_transient_keywords() {
        assert_eq!(
            classify_upstream_error("Failed to parse response envelope"),
            UpstreamFailure::Transient
        );
        assert_eq!(classify_upstream_error("zombie session"), UpstreamFailure::Transient);
        assert_eq!(classify_upstream_error("stream stalled"), UpstreamFailure::Transient);
    }

    #[test]
    fn test_everything_else_is_unexpected() {
        assert_eq!(classify_upstream_error("boom"), UpstreamFailure::Unexpected);
    }
}

//! Error types for the portal client.

/// Failures at the portal boundary.
///
/// Extraction never produces these: a parser that finds nothing degrades to
/// an empty result and the Regression Guard catches systemic failure at the
/// batch level.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The portal rejected the credentials. Fatal for the principal; callers
    /// must not retry.
    #[error("portal rejected credentials for principal '{0}'")]
    AuthenticationFailed(String),

    /// Network failure or timeout. Retryable by the caller with backoff;
    /// never retried internally.
    #[error("portal unreachable")]
    Unavailable(#[source] reqwest::Error),

    /// An authenticated request was redirected back to the login page: the
    /// session was revoked server-side. Callers observing this must
    /// invalidate the cached session for the principal.
    #[error("portal session is invalid or expired: {0}")]
    InvalidSession(String),

    /// A response that should have parsed did not (login token missing,
    /// term selector absent).
    #[error("failed to parse portal response from {url}")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PortalError {
    /// True when a caller may reasonably retry the operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

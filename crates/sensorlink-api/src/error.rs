use thiserror::Error;

/// Top-level error type for the `sensorlink-api` crate.
///
/// Covers transport, HTTP status, and body decoding failures.
/// `sensorlink-core` wraps these into its sensor-handling errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote ──────────────────────────────────────────────────────
    /// The remote kept answering HTTP 429 until the retry budget ran out.
    #[error("Rate limited -- gave up after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Bearer token was rejected.
    #[error("Unauthorized (HTTP {status}) -- check the API token")]
    Unauthorized { status: u16 },

    /// Any other non-success HTTP status.
    #[error("Unexpected HTTP {status}: {body}")]
    Status { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Request body could not be encoded.
    #[error("Request encoding failed: {0}")]
    Encode(String),

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the remote rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Unauthorized { status } | Self::Status { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = Error::Status {
            status: 400,
            body: "bad".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn rate_limited_reports_429() {
        let err = Error::RateLimited { attempts: 6 };
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(429));
    }
}

use thiserror::Error;

/// Top-level error type for the `tidewatch-api` crate.
///
/// Distinguishes every failure mode the Signal K REST surface can produce.
/// Unauthorized, missing path, and missing optional capability are separate
/// variants so `tidewatch-core` can map them into distinct user-facing
/// diagnostics instead of one generic failure.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server answered 401 -- the token is missing, expired, or revoked.
    #[error("Unauthorized -- re-authentication required")]
    Unauthorized,

    // ── Addressing ──────────────────────────────────────────────────
    /// The addressed path does not exist on the server (404).
    #[error("Path not found: {path}")]
    NotFound { path: String },

    /// A required optional server capability is absent (404 on a
    /// capability-specific surface, e.g. the batch-read plugin).
    #[error("Server capability missing: {capability}")]
    CapabilityMissing { capability: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Any other non-2xx status, with the status code in the message.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The response body did not carry the expected envelope fields.
    #[error("Invalid server response: {message}")]
    InvalidResponse { message: String },
}

impl Error {
    /// Returns `true` if re-authentication might resolve this error.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Returns `true` if this is a "path not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the server lacks an optional capability
    /// (the caller may downgrade to a simpler request shape).
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, Self::CapabilityMissing { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

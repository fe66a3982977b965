// ── Core error types ──
//
// User-facing errors from tidewatch-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<tidewatch_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: token rejected by server")]
    Unauthorized,

    #[error("Cannot reach server: {reason}")]
    ConnectionFailed { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Path not found on server: {path}")]
    PathNotFound { path: String },

    #[error("Server does not support {capability}")]
    CapabilityMissing { capability: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Session store error: {message}")]
    Session { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<tidewatch_api::Error> for CoreError {
    fn from(err: tidewatch_api::Error) -> Self {
        match err {
            tidewatch_api::Error::Unauthorized => CoreError::Unauthorized,
            tidewatch_api::Error::NotFound { path } => CoreError::PathNotFound { path },
            tidewatch_api::Error::CapabilityMissing { capability } => {
                CoreError::CapabilityMissing { capability }
            }
            tidewatch_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            tidewatch_api::Error::Transport(ref e) => {
                if e.is_connect() || e.is_timeout() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            tidewatch_api::Error::Server { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            tidewatch_api::Error::InvalidResponse { message } => CoreError::Api {
                message: format!("Malformed response: {message}"),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_unauthorized() {
        let err = CoreError::from(tidewatch_api::Error::Unauthorized);
        assert!(matches!(err, CoreError::Unauthorized));
    }

    #[test]
    fn translates_missing_capability() {
        let err = CoreError::from(tidewatch_api::Error::CapabilityMissing {
            capability: "batch reads (wsk plugin)".into(),
        });
        let CoreError::CapabilityMissing { capability } = err else {
            panic!("expected CapabilityMissing, got {err}");
        };
        assert!(capability.contains("wsk"));
    }
}

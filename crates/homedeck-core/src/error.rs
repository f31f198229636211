// ── Core error types ──
//
// User-facing errors from homedeck-core. Transport-level failures from
// homedeck-api are translated into domain-appropriate variants here --
// consumers never match on HTTP statuses directly.

use homedeck_api::FailureKind;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Connection to the hub failed with: '{reason}'")]
    HubConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Widget errors ────────────────────────────────────────────────
    #[error("Widget module fetch failed for '{name}': {reason}")]
    ModuleFetch { name: String, reason: String },

    #[error("Widget module execution failed for '{name}': {reason}")]
    ModuleExecute { name: String, reason: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Token storage error: {0}")]
    TokenStorage(#[from] std::io::Error),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<homedeck_api::Error> for CoreError {
    fn from(err: homedeck_api::Error) -> Self {
        match err {
            homedeck_api::Error::Api(failure) => match failure.kind {
                FailureKind::Status(401) | FailureKind::Status(403) => {
                    CoreError::AuthenticationFailed {
                        message: failure.to_string(),
                    }
                }
                FailureKind::Status(status) => CoreError::Api {
                    message: failure.to_string(),
                    status: Some(status),
                },
                FailureKind::ConnectionFailed | FailureKind::Timeout => CoreError::Api {
                    message: failure.to_string(),
                    status: None,
                },
            },
            homedeck_api::Error::WebSocketConnect(reason) => CoreError::HubConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            homedeck_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            homedeck_api::Error::Tls(reason) => CoreError::Config {
                message: format!("TLS error: {reason}"),
            },
            homedeck_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Deserialization error: {message}"),
                status: None,
            },
        }
    }
}

// ── API error types ──
//
// Failures are classified exactly once, at the HTTP boundary: a request
// either never got a response (connection failed / timed out) or came back
// with a non-success status. Consumers see an `ApiFailure` with a stable
// kind plus the server's ordered error detail list -- never a raw
// `reqwest::Error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the `homedeck-api` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Classified request failure (transport, timeout, or HTTP status).
    #[error("{0}")]
    Api(ApiFailure),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// The classified failure, if this error is one.
    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Api(failure) => Some(failure),
            _ => None,
        }
    }
}

// ── Failure classification ───────────────────────────────────────────

/// What went wrong with a request, independent of which request it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response at all (connection refused, reset, DNS failure).
    ConnectionFailed,
    /// Connected, but the response did not arrive within the deadline.
    Timeout,
    /// Response received with a non-success HTTP status.
    Status(u16),
}

impl FailureKind {
    /// Human description of the failure kind.
    ///
    /// Common HTTP statuses get a proper phrase; anything unmapped echoes
    /// the raw status code to help with diagnosis.
    pub fn description(self) -> String {
        match self {
            Self::ConnectionFailed => "Connection Failed".into(),
            Self::Timeout => "Timeout".into(),
            Self::Status(code) => match code {
                400 => "Bad Request".into(),
                401 => "Unauthorized".into(),
                402 => "Payment Required".into(),
                403 => "Forbidden".into(),
                404 => "Not Found".into(),
                405 => "Not Allowed".into(),
                406 => "Not Acceptable".into(),
                408 => "Request Timeout".into(),
                409 => "Conflict".into(),
                410 => "Gone".into(),
                500 => "Internal Server Error".into(),
                501 => "Not Implemented".into(),
                502 => "Bad Gateway".into(),
                503 => "Service Unavailable".into(),
                504 => "Gateway Timeout".into(),
                other => format!("Error code: {other}"),
            },
        }
    }
}

/// One entry of the server's error body.
///
/// The designer server reports failures as an ordered list of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub property: Option<String>,
    pub error_message: String,
}

impl ErrorDetail {
    fn message(message: impl Into<String>) -> Self {
        Self {
            property: None,
            error_message: message.into(),
        }
    }
}

/// A classified request failure: the kind plus the server's detail list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub errors: Vec<ErrorDetail>,
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors.first() {
            Some(detail) => write!(f, "{}: {}", self.kind.description(), detail.error_message),
            None => write!(f, "{}", self.kind.description()),
        }
    }
}

impl ApiFailure {
    /// Classify an error raised before any response arrived.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self {
                kind: FailureKind::Timeout,
                errors: vec![ErrorDetail::message(
                    "The server failed to respond within the request deadline.",
                )],
            }
        } else {
            Self {
                kind: FailureKind::ConnectionFailed,
                errors: vec![ErrorDetail::message("Failed to connect to the server.")],
            }
        }
    }

    /// Classify a response that came back with a non-success status.
    ///
    /// The body is expected to be an ordered `ErrorDetail` list; if it is
    /// not, a single synthetic detail carries the status description.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let kind = FailureKind::Status(response.status().as_u16());
        let errors = match response.json::<Vec<ErrorDetail>>().await {
            Ok(errors) if !errors.is_empty() => errors,
            _ => vec![ErrorDetail::message(kind.description())],
        };
        Self { kind, errors }
    }

    /// Whether this is the server telling us the refresh token was revoked.
    ///
    /// These are suppressed from generic display -- the session simply ends.
    pub fn is_revoked_token(&self) -> bool {
        self.kind == FailureKind::Status(401)
            && self
                .errors
                .first()
                .is_some_and(|detail| detail.error_message == "user token revoked")
    }

    /// The user-facing message for this failure, keyed by the failed action.
    pub fn user_message(&self, action: &str) -> String {
        let first = self.errors.first();
        match self.kind {
            // Conflict means a concurrent-update rejection; the server's
            // own phrasing is the most useful thing to show.
            FailureKind::Status(409) => first
                .map(|detail| detail.error_message.clone())
                .unwrap_or_else(|| self.kind.description()),
            FailureKind::Status(404) => {
                format!("{action} failed because the item no longer exists.")
            }
            FailureKind::Status(400) => {
                let message = first.map_or("", |detail| detail.error_message.as_str());
                format!("{action} failed with error '{message}'.")
            }
            _ => format!(
                "{action} failed. Error was: '{}'.",
                self.kind.description()
            ),
        }
    }
}

// ── Reporting ────────────────────────────────────────────────────────

/// Destination for user-visible error messages.
///
/// Rendering (toasts, status bars) is the embedder's concern; this crate
/// only decides *whether* and *what* to report.
pub trait MessageSink: Send + Sync {
    fn error(&self, message: &str);
}

/// Default sink: routes messages into the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn error(&self, message: &str) {
        tracing::error!(message, "api failure");
    }
}

/// Route a classified failure through the reporting chain.
///
/// The caller-supplied predicate gets first chance to mark the failure as
/// handled; revoked-token failures are auto-suppressed. Anything left
/// unhandled becomes one message on the sink, keyed by `action`. The
/// failure is returned either way for further local handling.
pub fn report(
    failure: ApiFailure,
    action: &str,
    callback: Option<&dyn Fn(&ApiFailure) -> bool>,
    sink: &dyn MessageSink,
) -> ApiFailure {
    let mut handled = failure.is_revoked_token();

    if !handled {
        if let Some(callback) = callback {
            handled = callback(&failure);
        }
    }

    if !handled {
        sink.error(&failure.user_message(action));
    }

    failure
}

// ── Tests ────────────────────────────────────────────────────────────

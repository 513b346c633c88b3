//! Error types for the agents client.
//!
//! Every failure a call can surface falls into one of four kinds:
//!
//! - **Request**: invalid local input, rejected before anything is sent
//! - **Transport**: connection / timeout / non-2xx HTTP failures
//! - **Protocol**: the event stream ended without a final result, or the
//!   final result itself could not be decoded
//! - **Remote**: the agents service explicitly reported a failure
//!
//! A fifth, non-fatal kind (**Decode**) is yielded by event streams for a
//! single malformed non-final block; the stream keeps going after it.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse classification of an [`AgentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid local input; never reached the network.
    Request,
    /// Connection, DNS, TLS, timeout or non-2xx HTTP failure.
    Transport,
    /// Stream ended without a final event, or the final event was undecodable.
    Protocol,
    /// The service reported a failure.
    Remote,
    /// An isolated non-final event block could not be decoded.
    Decode,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Request => "request",
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Remote => "remote",
            ErrorKind::Decode => "decode",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// AgentError enum
// ---------------------------------------------------------------------------

/// Unified error type for the agents client.
///
/// Variants carry a human-readable message plus, where one exists, the raw
/// payload that caused the failure so callers can log or re-present it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// Invalid local input (empty question, no collections, bad filter target).
    #[error("Invalid request: {message}")]
    Request {
        /// Human-readable error message.
        message: String,
    },

    /// Transport-level error (connection failed, body read failed, etc.).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection establishment or inactivity between chunks timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// A single non-final event block carried an undecodable payload.
    ///
    /// Event streams yield this and continue with the next block.
    #[error("Failed to decode `{event}` event: {message}")]
    Decode {
        /// The `event:` tag of the offending block.
        event: String,
        /// Decoder error message.
        message: String,
        /// The raw `data:` content of the block.
        raw: String,
    },

    /// The exchange violated the streaming protocol.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Human-readable error message.
        message: String,
        /// Raw block content, when a specific block was at fault.
        raw: Option<String>,
    },

    /// The agents service reported a failure. Surfaced verbatim, never retried.
    #[error("Query agent error: {message}")]
    Remote {
        /// Message reported by the service.
        message: String,
        /// Machine-readable error code, if the service sent one.
        code: Option<String>,
        /// Additional structured context, if any.
        details: Option<serde_json::Value>,
        /// HTTP status when the failure came back as a non-2xx response.
        status: Option<u16>,
    },
}

/// Convenience result type for agents client operations.
pub type Result<T, E = AgentError> = std::result::Result<T, E>;

impl AgentError {
    /// Create a `Request` error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Create a `Protocol` error with no raw payload.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            raw: None,
        }
    }

    /// Create a `Remote` error carrying only a message.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            code: None,
            details: None,
            status: None,
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Request { .. } => ErrorKind::Request,
            AgentError::Transport(_) | AgentError::Timeout(_) | AgentError::Http { .. } => {
                ErrorKind::Transport
            }
            AgentError::Decode { .. } => ErrorKind::Decode,
            AgentError::Protocol { .. } => ErrorKind::Protocol,
            AgentError::Remote { .. } => ErrorKind::Remote,
        }
    }

    /// Whether this error ends the exchange.
    ///
    /// Only isolated decode errors are non-fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AgentError::Decode { .. })
    }

    /// The raw payload associated with this error, if any.
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            AgentError::Decode { raw, .. } => Some(raw),
            AgentError::Protocol { raw, .. } => raw.as_deref(),
            AgentError::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Build the error for a non-2xx HTTP response.
    ///
    /// Bodies in the service's error envelope become [`AgentError::Remote`]
    /// with the status attached; anything else is [`AgentError::Http`].
    pub fn from_status(status: u16, body: String) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => {
                let mut err = envelope.error.into_error();
                if let AgentError::Remote { status: s, .. } = &mut err {
                    *s = Some(status);
                }
                err
            }
            Err(_) => AgentError::Http { status, body },
        }
    }

    /// Build the error for an `error` event payload.
    ///
    /// Accepts `{"error": "..."}`, `{"error": {"message", "code", "details"}}`
    /// or a bare `{"message": ...}`. Anything else is reported verbatim.
    pub fn from_error_event(raw: &str) -> Self {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(raw) {
            return envelope.error.into_error();
        }
        if let Ok(body) = serde_json::from_str::<ErrorBody>(raw) {
            return body.into_error();
        }
        AgentError::remote(raw.trim().to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Timeout(format!("request timed out: {err}"))
        } else if err.is_connect() {
            AgentError::Transport(format!("connection failed: {err}"))
        } else {
            AgentError::Transport(format!("HTTP request failed: {err}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Wire error shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Structured(ErrorBody),
    Text(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl ErrorPayload {
    fn into_error(self) -> AgentError {
        match self {
            ErrorPayload::Structured(body) => body.into_error(),
            ErrorPayload::Text(message) => AgentError::remote(message),
        }
    }
}

impl ErrorBody {
    fn into_error(self) -> AgentError {
        AgentError::Remote {
            message: self.message,
            code: self.code,
            details: self.details,
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_family_shares_kind() {
        assert_eq!(AgentError::Transport("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(AgentError::Timeout("x".into()).kind(), ErrorKind::Transport);
        let http = AgentError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(http.kind(), ErrorKind::Transport);
        assert_eq!(http.raw_payload(), Some("bad gateway"));
    }

    #[test]
    fn only_decode_is_non_fatal() {
        let decode = AgentError::Decode {
            event: "progress_message".into(),
            message: "expected value".into(),
            raw: "{oops".into(),
        };
        assert!(!decode.is_fatal());
        assert_eq!(decode.raw_payload(), Some("{oops"));
        assert!(AgentError::protocol("no final").is_fatal());
        assert!(AgentError::request("empty").is_fatal());
    }

    #[test]
    fn status_with_error_envelope_is_remote() {
        let body = r#"{"error":{"message":"Test error message","code":"test_error_code","details":{"info":"test detail"}}}"#;
        match AgentError::from_status(400, body.to_string()) {
            AgentError::Remote {
                message,
                code,
                details,
                status,
            } => {
                assert_eq!(message, "Test error message");
                assert_eq!(code.as_deref(), Some("test_error_code"));
                assert_eq!(details, Some(serde_json::json!({"info": "test detail"})));
                assert_eq!(status, Some(400));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn status_with_plain_body_is_http() {
        let err = AgentError::from_status(503, "upstream down".to_string());
        assert!(matches!(err, AgentError::Http { status: 503, .. }));
    }

    #[test]
    fn error_event_shapes() {
        let err = AgentError::from_error_event(r#"{"error":"quota exceeded"}"#);
        assert!(format!("{err}").contains("quota exceeded"));

        let err = AgentError::from_error_event(r#"{"message":"bad collection"}"#);
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(format!("{err}").contains("bad collection"));

        let err = AgentError::from_error_event("not json at all");
        assert!(format!("{err}").contains("not json at all"));
    }
}

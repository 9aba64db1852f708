use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::{DecodeFailure, Payload};
use crate::schema::SchemaIssue;

/// Failure kind, one per [`ApiError`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiErrorCode {
    Aborted,
    Timeout,
    Network,
    Http,
    Schema,
}

impl ApiErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aborted => "aborted",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Http => "http",
            Self::Schema => "schema",
        }
    }
}

impl std::fmt::Display for ApiErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error record returned by every failed logical call.
///
/// `Network` and `Timeout` carry fixed, non-technical messages; `Http` and
/// `Schema` surface server- or validator-provided detail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The caller's cancellation handle fired.
    #[error("request was aborted")]
    Aborted,
    /// A per-attempt timeout or the whole-call elapsed cap fired.
    #[error("request timed out")]
    Timeout,
    /// No connectivity, or the transport failed before a response arrived.
    #[error("you are offline, check your internet connection")]
    Network,
    /// Non-2xx response, or a body that could not be decoded.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        /// Decoded error body, when one could be read.
        details: Option<serde_json::Value>,
    },
    /// The response decoded but failed structural validation.
    #[error("received data is not a supported structure")]
    Schema { issues: Vec<SchemaIssue> },
}

impl ApiError {
    pub const fn code(&self) -> ApiErrorCode {
        match self {
            Self::Aborted => ApiErrorCode::Aborted,
            Self::Timeout => ApiErrorCode::Timeout,
            Self::Network => ApiErrorCode::Network,
            Self::Http { .. } => ApiErrorCode::Http,
            Self::Schema { .. } => ApiErrorCode::Schema,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True only when the caller's own handle cancelled the call.
    pub const fn aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Raw outcome of a single transport attempt, before classification.
#[derive(Debug)]
pub(crate) enum AttemptFailure {
    /// The combined cancellation signal fired mid-attempt.
    Cancelled,
    /// `reqwest` failed before yielding a response.
    Transport(reqwest::Error),
    /// The response arrived with a non-2xx status.
    Status { status: u16, body: Payload },
    /// The response arrived but its body could not be decoded.
    Decode { status: u16, failure: DecodeFailure },
}

/// Maps a raw attempt failure, plus the cancellation sources that were in
/// play, to an error record.
///
/// A cancellation caused by the per-attempt timeout or the elapsed cap is a
/// TIMEOUT; any other cancellation is the caller's and becomes ABORTED.
/// HTTP failures keep their status and surface the server-provided
/// `error`/`message` fields when the body carries them.
pub(crate) fn classify_failure(
    failure: AttemptFailure,
    timeout_source: &CancellationToken,
    elapsed_source: &CancellationToken,
) -> ApiError {
    match failure {
        AttemptFailure::Cancelled => {
            if timeout_source.is_cancelled() || elapsed_source.is_cancelled() {
                ApiError::Timeout
            } else {
                ApiError::Aborted
            }
        }
        AttemptFailure::Transport(error) => {
            debug!("transport failure: {error}");
            ApiError::Network
        }
        AttemptFailure::Status { status, body } => {
            let details = body.as_json().cloned();
            let message = details
                .as_ref()
                .and_then(server_message)
                .or_else(|| {
                    body.as_text()
                        .filter(|text| !text.is_empty())
                        .map(str::to_owned)
                })
                .unwrap_or_else(|| format!("http error {status}"));
            ApiError::Http {
                status,
                message,
                details,
            }
        }
        AttemptFailure::Decode { status, failure } => match failure {
            DecodeFailure::Read(error) => {
                debug!("response body read failed: {error}");
                ApiError::Network
            }
            DecodeFailure::InvalidJson { raw, .. } => ApiError::Http {
                status,
                message: "invalid JSON in response".to_owned(),
                details: Some(serde_json::Value::String(raw)),
            },
        },
    }
}

/// Server error bodies carry the human text in `error`, falling back to
/// `message` (which some backends send as an array of strings).
fn server_message(details: &serde_json::Value) -> Option<String> {
    for field in ["error", "message"] {
        match details.get(field) {
            Some(serde_json::Value::String(text)) => return Some(text.clone()),
            Some(serde_json::Value::Array(parts)) => {
                let joined = parts
                    .iter()
                    .filter_map(|part| part.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                if !joined.is_empty() {
                    return Some(joined);
                }
            }
            _ => {}
        }
    }
    None
}

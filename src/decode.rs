use bytes::Bytes;
use reqwest::{header, Response, StatusCode};

use crate::options::ParseMode;

/// Decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// 204/205, or an empty body under a JSON content type.
    Empty,
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// View of the payload as a JSON value for validation and typed access.
    /// `Empty` maps to `null`, text to a JSON string and bytes to `null`.
    pub(crate) fn to_json_value(&self) -> serde_json::Value {
        match self {
            Self::Empty | Self::Bytes(_) => serde_json::Value::Null,
            Self::Json(value) => value.clone(),
            Self::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

/// Why a response body could not be decoded.
#[derive(Debug)]
pub(crate) enum DecodeFailure {
    /// The body stream failed mid-read.
    Read(reqwest::Error),
    /// A JSON content type carried a non-empty body that does not parse.
    /// The raw text is kept for diagnostics.
    InvalidJson {
        raw: String,
        #[allow(dead_code)]
        source: serde_json::Error,
    },
}

/// True for `application/json` and any `+json` structured suffix, e.g.
/// `application/problem+json`, case-insensitive.
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let normalized = content_type.to_ascii_lowercase();
    normalized.contains("application/json") || normalized.contains("+json")
}

/// Decodes a response body according to the parse mode.
///
/// 204/205 decode to [`Payload::Empty`] regardless of mode. In JSON mode a
/// non-JSON content type falls back to text instead of failing, an empty or
/// whitespace-only body decodes to `Empty`, and unparseable JSON is reported
/// with the raw text attached. Text and blob modes decode directly.
pub(crate) async fn parse_response_body(
    response: Response,
    mode: ParseMode,
) -> Result<Payload, DecodeFailure> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return Ok(Payload::Empty);
    }

    match mode {
        ParseMode::Json => {
            let json_content = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(is_json_content_type);
            let raw = response.text().await.map_err(DecodeFailure::Read)?;

            if !json_content {
                return Ok(Payload::Text(raw));
            }
            if raw.trim().is_empty() {
                return Ok(Payload::Empty);
            }
            match serde_json::from_str(&raw) {
                Ok(value) => Ok(Payload::Json(value)),
                Err(source) => Err(DecodeFailure::InvalidJson { raw, source }),
            }
        }
        ParseMode::Text => response
            .text()
            .await
            .map(Payload::Text)
            .map_err(DecodeFailure::Read),
        ParseMode::Blob => response
            .bytes()
            .await
            .map(Payload::Bytes)
            .map_err(DecodeFailure::Read),
    }
}

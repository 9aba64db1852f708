use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::Form;
use tokio_util::sync::CancellationToken;

use crate::cache::QueryCache;
use crate::query::Query;
use crate::retry::RetryPolicy;
use crate::schema::ResponseSchema;

/// How the response body is decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Json,
    Text,
    Blob,
}

/// Request body forms.
///
/// Multipart forms and raw bytes pass through untouched with no content-type
/// override, so the transport keeps control of the multipart boundary. JSON
/// values are serialized and tagged `application/json`.
#[derive(Debug)]
pub enum RequestBody {
    Json(serde_json::Value),
    Multipart(Form),
    Bytes(Bytes),
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Form> for RequestBody {
    fn from(form: Form) -> Self {
        Self::Multipart(form)
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

/// Per-call options for one logical request. Anything left unset falls back
/// to the client defaults.
#[derive(Default)]
pub struct RequestOptions {
    pub query: Option<Query>,
    pub body: Option<RequestBody>,
    /// Merged over the client's default headers; explicit entries win.
    pub headers: HeaderMap,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Caller-owned cancellation handle; once fired the call is over, no
    /// retry policy revives it.
    pub signal: Option<CancellationToken>,
    pub retry: Option<RetryPolicy>,
    pub schema: Option<Arc<dyn ResponseSchema>>,
    pub parse: ParseMode,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn schema(mut self, schema: impl ResponseSchema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn parse(mut self, parse: ParseMode) -> Self {
        self.parse = parse;
        self
    }
}

/// Client-wide defaults merged under every call's options.
#[derive(Clone, Debug)]
pub struct ClientDefaults {
    pub headers: HeaderMap,
    /// Default per-attempt timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Explicit cache instance; the process-wide cache when unset.
    pub cache: Option<QueryCache>,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(8),
            retry: RetryPolicy::standard(),
            cache: None,
        }
    }
}

impl ClientDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

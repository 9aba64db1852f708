//! `tracklib-http` is the resilient HTTP request core of the Tracklib
//! music-library front end.
//!
//! The crate layers per-attempt timeouts, cross-cutting cancellation,
//! retry-with-backoff, response-schema validation and an in-memory response
//! cache on top of a plain `reqwest` transport:
//! - [`create_client`] / [`ApiClient`]: method-bound client with merged
//!   defaults
//! - [`RetryPolicy`]: declarative retry behavior per call or per client
//! - [`QueryCache`]: shared response cache with point and substring
//!   invalidation

mod cache;
mod client;
mod decode;
mod error;
mod options;
mod query;
mod retry;
mod schema;
mod signal;

pub use cache::{cached_queries, invalidate_all, invalidate_query, set_query, QueryCache};
pub use client::{create_client, ApiClient, ApiResponse};
pub use decode::Payload;
pub use error::{ApiError, ApiErrorCode};
pub use options::{ClientDefaults, ParseMode, RequestBody, RequestOptions};
pub use query::{build_query, Query, QueryValue};
pub use retry::{Backoff, Jitter, RetryCondition, RetryPolicy, RetryWhen};
pub use schema::{ResponseSchema, SchemaIssue, TypedSchema};
pub use signal::{combine_signals, Deadline};

pub type ApiResult = std::result::Result<ApiResponse, ApiError>;

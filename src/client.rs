use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::QueryCache;
use crate::decode::{parse_response_body, Payload};
use crate::error::{classify_failure, ApiError, AttemptFailure};
use crate::options::{ClientDefaults, ParseMode, RequestBody, RequestOptions};
use crate::query::build_query;
use crate::schema::SchemaIssue;
use crate::signal::{combine_signals, Deadline};
use crate::ApiResult;

/// Creates a method-bound client for `base_url` with the given defaults.
pub fn create_client(base_url: impl Into<String>, defaults: ClientDefaults) -> ApiClient {
    ApiClient::new(base_url, defaults)
}

/// Successful outcome of one logical call.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub payload: Payload,
    /// Status of the final transport exchange; `None` when the payload was
    /// served from the cache.
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

impl ApiResponse {
    fn from_cache(payload: Payload) -> Self {
        Self {
            payload,
            status: None,
            headers: HeaderMap::new(),
        }
    }

    /// Deserializes the JSON payload into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.payload.to_json_value()).map_err(|error| ApiError::Schema {
            issues: vec![SchemaIssue::root(error.to_string())],
        })
    }
}

/// Method-bound HTTP client carrying a base URL, merged defaults and a
/// response cache.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    defaults: ClientDefaults,
    cache: QueryCache,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, defaults: ClientDefaults) -> Self {
        let cache = defaults
            .cache
            .clone()
            .unwrap_or_else(|| QueryCache::global().clone());
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            defaults,
            cache,
        }
    }

    /// Cache instance this client reads and populates.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// GET carries no body; one set on the options is dropped.
    pub async fn get(&self, path: &str, mut opts: RequestOptions) -> ApiResult {
        opts.body = None;
        self.dispatch(Method::GET, path, opts).await
    }

    pub async fn post(&self, path: &str, opts: RequestOptions) -> ApiResult {
        self.dispatch(Method::POST, path, opts).await
    }

    pub async fn put(&self, path: &str, opts: RequestOptions) -> ApiResult {
        self.dispatch(Method::PUT, path, opts).await
    }

    pub async fn patch(&self, path: &str, opts: RequestOptions) -> ApiResult {
        self.dispatch(Method::PATCH, path, opts).await
    }

    pub async fn delete(&self, path: &str, opts: RequestOptions) -> ApiResult {
        self.dispatch(Method::DELETE, path, opts).await
    }

    fn join_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// The attempt loop for one logical call.
    ///
    /// The elapsed-cap deadline starts once here and is shared across
    /// attempts; each attempt arms its own timeout and combines both with
    /// the caller's handle. Only GET responses consult or populate the
    /// cache, and only after the schema gate passes.
    async fn dispatch(&self, method: Method, path: &str, opts: RequestOptions) -> ApiResult {
        let RequestOptions {
            query,
            mut body,
            headers,
            timeout,
            signal,
            retry,
            schema,
            parse,
        } = opts;

        let url = self.join_url(path);
        let query_string = build_query(query.as_ref());
        let request_key = if query_string.is_empty() {
            url
        } else {
            format!("{url}?{query_string}")
        };

        if method == Method::GET {
            if let Some(payload) = self.cache.lookup(&request_key) {
                debug!("cache hit for {request_key}");
                return Ok(ApiResponse::from_cache(payload));
            }
        }

        let retry = retry.unwrap_or_else(|| self.defaults.retry.clone());
        let attempt_timeout = timeout.unwrap_or(self.defaults.timeout);
        let replayable_body = !matches!(body, Some(RequestBody::Multipart(_)));

        let mut merged_headers = self.defaults.headers.clone();
        for (name, value) in headers.iter() {
            merged_headers.insert(name, value.clone());
        }

        let started = Instant::now();
        let elapsed_deadline = Deadline::after(retry.elapsed_cap());
        let elapsed_token = elapsed_deadline.token();

        let mut retries_done: u32 = 0;
        let mut previous_delay: Option<Duration> = None;

        loop {
            let attempt_deadline = Deadline::after(attempt_timeout);
            let timeout_token = attempt_deadline.token();
            let combined = combine_signals([
                Some(timeout_token.clone()),
                Some(elapsed_token.clone()),
                signal.clone(),
            ]);
            let _watchers = combined.clone().drop_guard();

            let attempt_body = next_body(&mut body);
            let outcome = tokio::select! {
                outcome = self.perform_attempt(&method, &request_key, merged_headers.clone(), attempt_body, parse) => outcome,
                _ = combined.cancelled() => Err(AttemptFailure::Cancelled),
            };

            match outcome {
                Ok((status, response_headers, payload)) => {
                    if parse == ParseMode::Json {
                        if let Some(schema) = &schema {
                            if let Err(issues) = schema.validate(&payload.to_json_value()) {
                                if method == Method::GET {
                                    self.cache.mark_rejected(&request_key);
                                }
                                return Err(ApiError::Schema { issues });
                            }
                        }
                    }
                    if method == Method::GET {
                        self.cache.store(&request_key, payload.clone());
                    }
                    return Ok(ApiResponse {
                        payload,
                        status: Some(status),
                        headers: response_headers,
                    });
                }
                Err(failure) => {
                    let error = classify_failure(failure, &timeout_token, &elapsed_token);

                    let retry_allowed = retry.should_retry(Some(&error), &method, retries_done)
                        && replayable_body
                        && !elapsed_token.is_cancelled()
                        && !signal
                            .as_ref()
                            .is_some_and(CancellationToken::is_cancelled);
                    if !retry_allowed {
                        return Err(error);
                    }

                    retries_done += 1;
                    let delay = retry
                        .backoff_window()
                        .delay_for(retries_done, previous_delay);
                    previous_delay = Some(delay);
                    // never sleep past the remaining elapsed budget
                    let remaining = retry.elapsed_cap().saturating_sub(started.elapsed());
                    let delay = delay.min(remaining);
                    debug!(
                        "retrying {method} {request_key} after {} ms",
                        delay.as_millis()
                    );

                    let external_fired = async {
                        match &signal {
                            Some(signal) => signal.cancelled().await,
                            None => std::future::pending().await,
                        }
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = elapsed_token.cancelled() => return Err(error),
                        _ = external_fired => return Err(error),
                    }
                }
            }
        }
    }

    async fn perform_attempt(
        &self,
        method: &Method,
        url: &str,
        headers: HeaderMap,
        body: Option<RequestBody>,
        parse: ParseMode,
    ) -> Result<(StatusCode, HeaderMap, Payload), AttemptFailure> {
        let mut request = self.http.request(method.clone(), url).headers(headers);
        request = match body {
            Some(RequestBody::Json(value)) => request.json(&value),
            Some(RequestBody::Multipart(form)) => request.multipart(form),
            Some(RequestBody::Bytes(bytes)) => request.body(bytes),
            None => request,
        };

        let response = request.send().await.map_err(AttemptFailure::Transport)?;
        let status = response.status();
        let response_headers = response.headers().clone();

        if !status.is_success() {
            // Error bodies are decoded as JSON so the classifier can read
            // the server-provided message.
            let body = parse_response_body(response, ParseMode::Json)
                .await
                .unwrap_or(Payload::Empty);
            return Err(AttemptFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        match parse_response_body(response, parse).await {
            Ok(payload) => Ok((status, response_headers, payload)),
            Err(failure) => Err(AttemptFailure::Decode {
                status: status.as_u16(),
                failure,
            }),
        }
    }
}

/// Replays JSON and byte bodies across attempts; a multipart form is
/// consumed by the first attempt and cannot be replayed, which also makes
/// such requests ineligible for retry.
fn next_body(body: &mut Option<RequestBody>) -> Option<RequestBody> {
    match body {
        None => None,
        Some(RequestBody::Json(value)) => Some(RequestBody::Json(value.clone())),
        Some(RequestBody::Bytes(bytes)) => Some(RequestBody::Bytes(bytes.clone())),
        Some(RequestBody::Multipart(_)) => body.take(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{next_body, ApiClient};
    use crate::options::{ClientDefaults, RequestBody};

    #[test]
    fn join_normalizes_to_exactly_one_slash() {
        let client = ApiClient::new("http://x/api/", ClientDefaults::new());
        assert_eq!(client.join_url("/tracks"), "http://x/api/tracks");
        assert_eq!(client.join_url("tracks"), "http://x/api/tracks");

        let client = ApiClient::new("http://x/api", ClientDefaults::new());
        assert_eq!(client.join_url("tracks"), "http://x/api/tracks");
    }

    #[test]
    fn json_bodies_replay_across_attempts() {
        let mut body = Some(RequestBody::Json(json!({"id": 1})));
        assert!(next_body(&mut body).is_some());
        assert!(next_body(&mut body).is_some());
        assert!(body.is_some());
    }

    #[test]
    fn multipart_bodies_are_single_shot() {
        let form = reqwest::multipart::Form::new().text("title", "Nightcall");
        let mut body = Some(RequestBody::Multipart(form));
        assert!(next_body(&mut body).is_some());
        assert!(body.is_none());
        assert!(next_body(&mut body).is_none());
    }
}

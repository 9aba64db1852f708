use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use reqwest::Method;

use crate::error::ApiError;

/// Condition tags a policy can retry on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RetryCondition {
    Network,
    Timeout,
    Http5xx,
    Http429,
}

/// Which failures trigger another attempt: a set of condition tags, or an
/// explicit set of HTTP statuses. Resolved once when the policy is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryWhen {
    Conditions(BTreeSet<RetryCondition>),
    Statuses(BTreeSet<u16>),
}

impl RetryWhen {
    pub fn conditions(tags: impl IntoIterator<Item = RetryCondition>) -> Self {
        Self::Conditions(tags.into_iter().collect())
    }

    pub fn statuses(codes: impl IntoIterator<Item = u16>) -> Self {
        Self::Statuses(codes.into_iter().collect())
    }

    fn matches(&self, error: &ApiError) -> bool {
        match self {
            Self::Conditions(tags) => match error {
                ApiError::Http { status, .. } => {
                    (tags.contains(&RetryCondition::Http5xx) && (500..=599).contains(status))
                        || (tags.contains(&RetryCondition::Http429) && *status == 429)
                }
                ApiError::Network => tags.contains(&RetryCondition::Network),
                ApiError::Timeout => tags.contains(&RetryCondition::Timeout),
                _ => false,
            },
            Self::Statuses(codes) => error
                .status()
                .is_some_and(|status| codes.contains(&status)),
        }
    }
}

/// Jitter strategy applied to backoff delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Sample uniformly in `(0, delay]`.
    #[default]
    Full,
    /// `min(max, uniform(min, previous * factor))` recurrence.
    Decorrelated,
}

/// Backoff window for waits between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub jitter: Jitter,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(300),
            max_delay: Duration::from_millis(1000),
            factor: 2.0,
            jitter: Jitter::Full,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry_index` (1-based), never above
    /// `max_delay`. Decorrelated jitter feeds on the previous delay.
    pub fn delay_for(&self, retry_index: u32, previous: Option<Duration>) -> Duration {
        let min_ms = (self.min_delay.as_millis() as u64).max(1);
        let max_ms = (self.max_delay.as_millis() as u64).max(min_ms);
        let mut rng = rand::rng();

        let delay_ms = match self.jitter {
            Jitter::Decorrelated => {
                let previous_ms = previous
                    .map_or(min_ms, |delay| delay.as_millis() as u64)
                    .max(min_ms);
                let high = ((previous_ms as f64) * self.factor.max(1.0)).round() as u64;
                let high = high.clamp(min_ms, max_ms);
                rng.random_range(min_ms..=high)
            }
            _ => {
                let exponent = retry_index.saturating_sub(1).min(31);
                let grown = (min_ms as f64) * self.factor.max(1.0).powi(exponent as i32);
                let capped = (grown.min(max_ms as f64) as u64).max(1);
                match self.jitter {
                    Jitter::Full => rng.random_range(1..=capped),
                    _ => capped,
                }
            }
        };
        Duration::from_millis(delay_ms)
    }
}

/// Declarative retry behavior for one logical call.
///
/// `attempts` counts every try including the first, so 0 or 1 disables
/// retrying. `max_elapsed` is a hard wall-clock cap across all attempts
/// combined: once it expires no further attempt is started even if attempts
/// remain.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    attempts: u32,
    methods: Vec<Method>,
    when: RetryWhen,
    max_elapsed: Duration,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// Client default: 3 attempts for GET/HEAD on network failures and 5xx
    /// responses.
    pub fn standard() -> Self {
        Self {
            attempts: 3,
            methods: vec![Method::GET, Method::HEAD],
            when: RetryWhen::conditions([RetryCondition::Network, RetryCondition::Http5xx]),
            max_elapsed: Duration::from_secs(30),
            backoff: Backoff::default(),
        }
    }

    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self::standard().attempts(1)
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn when(mut self, when: RetryWhen) -> Self {
        self.when = when;
        self
    }

    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub(crate) fn elapsed_cap(&self) -> Duration {
        self.max_elapsed
    }

    pub(crate) fn backoff_window(&self) -> &Backoff {
        &self.backoff
    }

    /// Ordered retry gate; any failed rule short-circuits to "no retry".
    ///
    /// 1. the last outcome was a success;
    /// 2. the policy disables retrying;
    /// 3. the attempt ceiling is reached (`retries_done` counts retries, not
    ///    the first try);
    /// 4. the method is not eligible;
    /// 5. the failure does not match the trigger set.
    pub fn should_retry(
        &self,
        error: Option<&ApiError>,
        method: &Method,
        retries_done: u32,
    ) -> bool {
        let Some(error) = error else {
            return false;
        };
        if self.attempts == 0 {
            return false;
        }
        if retries_done >= self.attempts.saturating_sub(1) {
            return false;
        }
        if !self.methods.contains(method) {
            return false;
        }
        self.when.matches(error)
    }
}

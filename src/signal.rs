use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Merges any number of optional cancellation tokens into a token that fires
/// as soon as any input fires.
///
/// Zero inputs produce a token that never fires and a single input is
/// returned as-is. With two or more inputs the result is an independent
/// token: if one input already fired the combined token comes back already
/// cancelled, otherwise per-input watcher tasks relay the first firing and
/// detach once the combined token is cancelled. Cancelling the combined
/// token after the race is decided is how callers release the watchers.
pub fn combine_signals<I>(signals: I) -> CancellationToken
where
    I: IntoIterator<Item = Option<CancellationToken>>,
{
    let inputs: Vec<CancellationToken> = signals.into_iter().flatten().collect();

    if inputs.len() <= 1 {
        return inputs.into_iter().next().unwrap_or_default();
    }

    if inputs.iter().any(CancellationToken::is_cancelled) {
        let combined = CancellationToken::new();
        combined.cancel();
        return combined;
    }

    let combined = CancellationToken::new();
    for input in inputs {
        let relay = combined.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = input.cancelled() => relay.cancel(),
                _ = relay.cancelled() => {}
            }
        });
    }
    combined
}

/// A cancellation token fired after a fixed duration.
///
/// The timer task is aborted when the `Deadline` is dropped, so an attempt
/// that resolves early never leaves a timer behind to fire against it.
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        let token = CancellationToken::new();
        let armed = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            armed.cancel();
        });
        Self { token, timer }
    }

    /// Handle to the deadline's token; stays valid after the `Deadline`
    /// itself is dropped.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_elapsed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{combine_signals, Deadline};

    async fn assert_fires(token: &CancellationToken) {
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("token must fire");
    }

    #[tokio::test(start_paused = true)]
    async fn combined_fires_when_any_input_fires() {
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        let third = CancellationToken::new();
        let combined = combine_signals([
            Some(first.clone()),
            Some(second.clone()),
            Some(third.clone()),
        ]);

        assert!(!combined.is_cancelled());
        second.cancel();
        assert_fires(&combined).await;
    }

    #[tokio::test(start_paused = true)]
    async fn already_fired_input_yields_fired_combined() {
        let fired = CancellationToken::new();
        fired.cancel();
        let pending = CancellationToken::new();

        let combined = combine_signals([Some(pending), Some(fired)]);
        assert!(combined.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn single_input_is_returned_as_is() {
        let only = CancellationToken::new();
        let combined = combine_signals([None, Some(only.clone()), None]);

        only.cancel();
        assert!(combined.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_inputs_never_fire() {
        let combined = combine_signals([None, None]);
        assert!(!combined.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_combined_does_not_touch_inputs() {
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        let combined = combine_signals([Some(first.clone()), Some(second.clone())]);

        combined.cancel();
        tokio::task::yield_now().await;
        assert!(!first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_after_duration() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let token = deadline.token();
        assert!(!deadline.is_elapsed());
        assert_fires(&token).await;
        assert!(deadline.is_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_deadline_never_fires() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let token = deadline.token();
        drop(deadline);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!token.is_cancelled());
    }
}

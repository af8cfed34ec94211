//! Bounded retry for rate-limited remote calls.

use std::{future::Future, sync::OnceLock, time::Duration};

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::ErrorKind,
    throttle::limiter::{sleep_or_cancel, RateLimiter},
    Error, Result,
};

/// Added to every provider-suggested wait.
pub const RETRY_AFTER_BUFFER: Duration = Duration::from_secs(1);

/// Upper bound on any provider-suggested wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3_600);

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            buffer: RETRY_AFTER_BUFFER,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Provider-suggested wait plus buffer, or zero when the text carries no usable hint.
    pub fn suggested_wait(&self, error_text: &str) -> Duration {
        let hint = parse_retry_after(error_text);
        if hint.is_zero() {
            Duration::ZERO
        } else {
            hint.saturating_add(self.buffer)
        }
    }

    /// Run `op` through the limiter, retrying only on `RateLimited`.
    ///
    /// When the error names a wait, sleep for it before the next attempt. When it
    /// doesn't, the limiter's incremented backoff alone spaces the retry out.
    pub async fn run<T, F, Fut>(
        &self,
        limiter: &RateLimiter,
        cancel: &CancellationToken,
        operation: &str,
        mut op: F,
    ) -> Result<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            limiter.wait(cancel).await?;

            let err = match op().await {
                Ok(v) => {
                    limiter.on_success().await;
                    return Ok(v);
                }
                Err(Error::Api(e)) if e.kind == ErrorKind::RateLimited => e,
                Err(other) => return Err(other),
            };

            limiter.on_rate_limit_error().await;
            if attempt >= max_attempts {
                tracing::warn!(operation, attempts = attempt, "giving up: still rate limited");
                return Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: err,
                });
            }

            let wait = self.suggested_wait(&err.message);
            if wait.is_zero() {
                tracing::info!(
                    operation,
                    attempt,
                    "rate limited without retry hint; backing off via limiter"
                );
            } else {
                tracing::info!(
                    operation,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "rate limited; waiting as instructed"
                );
                sleep_or_cancel(wait, cancel).await?;
            }
        }
    }
}

fn retry_after_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry after\s+(\S+)").expect("valid regex"))
}

fn duration_part_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)").expect("valid regex"))
}

/// Extract the duration following `retry after ` in free-form error text.
///
/// Returns zero when the phrase is missing or the token doesn't parse, and
/// never more than [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(text: &str) -> Duration {
    retry_after_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_duration_token(m.as_str()))
        .map(|d| d.min(MAX_RETRY_AFTER))
        .unwrap_or(Duration::ZERO)
}

/// Parse `30`, `30s`, `1.5s`, `500ms`, `2m`, `1h`, `1m30s`.
///
/// Trailing punctuation (`30s).`) is ignored. A bare number means seconds.
/// Values too large for a `Duration` saturate at `Duration::MAX`.
pub fn parse_duration_token(token: &str) -> Option<Duration> {
    let token = token.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    if token.is_empty() {
        return None;
    }
    if let Ok(secs) = token.parse::<f64>() {
        return secs_to_duration(secs);
    }

    let mut total_ms = 0f64;
    let mut consumed = 0usize;
    for caps in duration_part_re().captures_iter(token) {
        let whole = caps.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();

        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let unit_ms = match caps.get(2)?.as_str() {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return None,
        };
        total_ms += value * unit_ms;
    }

    if consumed == 0 || consumed != token.len() {
        return None;
    }
    secs_to_duration(total_ms / 1_000.0)
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use crate::throttle::limiter::LimiterConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn fast_limiter() -> RateLimiter {
        RateLimiter::new(LimiterConfig {
            min_interval: Duration::from_millis(10),
            max_backoff: Duration::from_secs(5),
        })
    }

    fn rate_limited(text: &str) -> Error {
        Error::Api(ApiError::from_remote("conversations.history(C1)", text))
    }

    #[test]
    fn retry_after_adds_buffer() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.suggested_wait("rate_limited: retry after 30s"),
            Duration::from_secs(31)
        );
        assert_eq!(p.suggested_wait("rate_limited"), Duration::ZERO);
        assert_eq!(p.suggested_wait("rate_limited: retry after soon"), Duration::ZERO);
    }

    #[test]
    fn parses_common_duration_shapes() {
        assert_eq!(parse_retry_after("Retry After 12"), Duration::from_secs(12));
        assert_eq!(
            parse_retry_after("ratelimited (retry after 1m30s)."),
            Duration::from_secs(90)
        );
        assert_eq!(
            parse_retry_after("retry after 500ms"),
            Duration::from_millis(500)
        );
        assert_eq!(parse_retry_after("retry after 1.5s"), Duration::from_millis(1500));
        assert_eq!(parse_retry_after("retry after 20m"), Duration::from_secs(1200));
        assert_eq!(parse_retry_after("retry after 10x"), Duration::ZERO);
        assert_eq!(parse_retry_after("retry after"), Duration::ZERO);
    }

    #[test]
    fn huge_hints_are_capped_instead_of_panicking() {
        assert_eq!(parse_retry_after("retry after 2h"), MAX_RETRY_AFTER);
        assert_eq!(parse_retry_after("retry after 1e300"), MAX_RETRY_AFTER);
        assert_eq!(
            parse_retry_after("retry after 99999999999999999999999h"),
            MAX_RETRY_AFTER
        );
        assert_eq!(parse_duration_token("1e300"), Some(Duration::MAX));
        assert_eq!(parse_duration_token("-5"), None);
        assert_eq!(parse_duration_token("inf"), None);
        assert_eq!(parse_duration_token("NaN"), None);
        assert_eq!(parse_duration_token("2h"), Some(Duration::from_secs(7200)));

        let p = RetryPolicy {
            max_attempts: 3,
            buffer: Duration::MAX,
        };
        assert_eq!(p.suggested_wait("retry after 30s"), Duration::MAX);
        assert_eq!(
            RetryPolicy::default().suggested_wait("retry after 1e300"),
            MAX_RETRY_AFTER + RETRY_AFTER_BUFFER
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limit_then_succeeds_after_hint() {
        let rl = fast_limiter();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let out = RetryPolicy::default()
            .run(&rl, &cancel, "conversations.history(C1)", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(rate_limited("rate_limited: retry after 2s"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(out, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(rl.backoff_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_wait_falls_back_to_limiter_backoff() {
        let rl = fast_limiter();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        RetryPolicy::default()
            .run(&rl, &cancel, "conversations.join(C1)", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(rate_limited("ratelimited"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        // Second attempt waited min_interval × 2.
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let rl = fast_limiter();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let err = RetryPolicy::with_max_attempts(3)
            .run(&rl, &cancel, "conversations.history(C9)", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(rate_limited("rate_limited")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            Error::RetriesExhausted {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "conversations.history(C9)");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_errors_are_not_retried() {
        let rl = fast_limiter();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let err = RetryPolicy::default()
            .run(&rl, &cancel, "conversations.join(C1)", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(rate_limited("missing_scope")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), Some(ErrorKind::MissingScope));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_retry_sleep() {
        let rl = fast_limiter();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = RetryPolicy::default()
            .run(&rl, &cancel, "conversations.list", || async {
                Err::<(), _>(rate_limited("rate_limited: retry after 600s"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}

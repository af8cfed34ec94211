use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Backoff exponent ceiling: the interval never grows past `min_interval × 64`.
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

#[derive(Clone, Copy, Debug)]
pub struct LimiterConfig {
    /// Minimum spacing between admitted calls while the service is healthy.
    pub min_interval: Duration,
    /// Upper bound on the backed-off spacing.
    pub max_backoff: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        // Tier 3 methods allow ~50 calls/min per workspace.
        Self {
            min_interval: Duration::from_millis(1200),
            max_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    last_admitted: Option<Instant>,
    backoff_count: u32,
}

/// Shared throttle for every outbound call of one process.
///
/// Spacing is `min(min_interval × 2^backoff_count, max_backoff)` measured from the
/// previously admitted call. Slots are reserved under the lock and slept on outside
/// it, so concurrent callers are admitted one interval apart.
#[derive(Debug)]
pub struct RateLimiter {
    cfg: LimiterConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(cfg: LimiterConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(LimiterState::default()),
        }
    }

    fn interval_for(&self, backoff_count: u32) -> Duration {
        let multiplier = 1u32 << backoff_count.min(MAX_BACKOFF_EXPONENT);
        self.cfg
            .min_interval
            .saturating_mul(multiplier)
            .min(self.cfg.max_backoff)
    }

    /// Reserve the next slot and return how long the caller must sleep for it.
    fn reserve(&self, st: &mut LimiterState, now: Instant) -> Duration {
        let interval = self.interval_for(st.backoff_count);
        let start = match st.last_admitted {
            Some(last) => std::cmp::max(now, last + interval),
            None => now,
        };
        st.last_admitted = Some(start);
        start.saturating_duration_since(now)
    }

    /// Block until this call may be issued, or fail with `Error::Cancelled`.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let delay = {
            let mut st = self.state.lock().await;
            self.reserve(&mut st, Instant::now())
        };
        if delay.is_zero() {
            return Ok(());
        }
        sleep_or_cancel(delay, cancel).await
    }

    pub async fn on_success(&self) {
        self.state.lock().await.backoff_count = 0;
    }

    pub async fn on_rate_limit_error(&self) {
        let mut st = self.state.lock().await;
        st.backoff_count = (st.backoff_count + 1).min(MAX_BACKOFF_EXPONENT);
    }

    pub async fn backoff_count(&self) -> u32 {
        self.state.lock().await.backoff_count
    }

    /// Spacing the next reservation will use.
    pub async fn current_interval(&self) -> Duration {
        let count = self.state.lock().await.backoff_count;
        self.interval_for(count)
    }
}

/// Sleep for `d` unless `cancel` fires first.
pub async fn sleep_or_cancel(d: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep(d) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(min_ms: u64, max_ms: u64) -> RateLimiter {
        RateLimiter::new(LimiterConfig {
            min_interval: Duration::from_millis(min_ms),
            max_backoff: Duration::from_millis(max_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_then_spaced() {
        let rl = limiter(100, 10_000);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        rl.wait(&cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        rl.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_error_doubles_and_success_resets() {
        let rl = limiter(100, 10_000);
        let cancel = CancellationToken::new();

        rl.wait(&cancel).await.unwrap();
        rl.on_rate_limit_error().await;
        let t = Instant::now();
        rl.wait(&cancel).await.unwrap();
        assert!(t.elapsed() >= Duration::from_millis(200));

        rl.on_success().await;
        assert_eq!(rl.backoff_count().await, 0);
        let t = Instant::now();
        rl.wait(&cancel).await.unwrap();
        let waited = t.elapsed();
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn backoff_saturates_and_is_capped() {
        let rl = limiter(100, 3_000);
        for _ in 0..20 {
            rl.on_rate_limit_error().await;
        }
        assert_eq!(rl.backoff_count().await, MAX_BACKOFF_EXPONENT);
        // 100ms × 64 = 6.4s, capped at 3s.
        assert_eq!(rl.current_interval().await, Duration::from_secs(3));

        let wide = limiter(10, 60_000);
        for _ in 0..20 {
            wide.on_rate_limit_error().await;
        }
        assert_eq!(wide.current_interval().await, Duration::from_millis(640));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let rl = Arc::new(limiter(60_000, 60_000));
        let cancel = CancellationToken::new();
        rl.wait(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let t = Instant::now();
        let err = rl.wait(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(t.elapsed() < Duration::from_secs(1));

        // Already-cancelled tokens fail without touching the schedule.
        assert!(matches!(rl.wait(&cancel).await, Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_are_admitted_one_interval_apart() {
        let rl = Arc::new(limiter(100, 10_000));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rl = rl.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                rl.wait(&cancel).await.unwrap();
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for h in handles {
            admitted.push(h.await.unwrap());
        }
        admitted.sort();

        for pair in admitted.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(100));
        }
        assert!(admitted[7].duration_since(start) >= Duration::from_millis(700));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_state_updates_are_race_free() {
        let rl = Arc::new(limiter(1, 1_000));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move {
                rl.on_rate_limit_error().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(rl.backoff_count().await, MAX_BACKOFF_EXPONENT);

        let mut handles = Vec::new();
        for i in 0..64 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    rl.on_success().await;
                } else {
                    rl.on_rate_limit_error().await;
                }
                rl.backoff_count().await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap() <= MAX_BACKOFF_EXPONENT);
        }
        rl.on_success().await;
        assert_eq!(rl.current_interval().await, Duration::from_millis(1));
    }
}

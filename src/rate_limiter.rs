//! Leaky-bucket rate limiter (§4.3): one per base resolver. `acquire()`
//! blocks the writer until a token is available; tokens regenerate at a
//! configured rate and bursts up to the configured size are admitted.

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Queries per second ceiling for the resolver this limiter guards.
    pub queries_per_second: u32,
    /// Burst allowance above the steady-state rate.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            queries_per_second: 20,
            burst_size: 5,
        }
    }
}

/// Per-resolver token bucket. `acquire` awaits a token rather than
/// rejecting, since the base resolver's writer is meant to pace itself
/// against the ceiling, not drop queries (§4.3, §4.4 step 4).
pub struct DnsRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl DnsRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let qps = NonZeroU32::new(config.queries_per_second.max(1)).unwrap();
        let burst = NonZeroU32::new(config.burst_size.max(1)).unwrap();
        let quota = Quota::per_second(qps).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Block until a token is available. Cooperates with shutdown: the
    /// caller is expected to wrap this in a `select!` against a
    /// cancellation signal so pending acquirers unblock on `Stop()`
    /// (§4.3, §5).
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Non-blocking check, used by the sanity/RTT probes which need to
    /// know immediately rather than wait (§4.9 supplement).
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

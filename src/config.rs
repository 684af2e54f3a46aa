//! Pure data records the caller assembles at construction time (§9:
//! "the core takes all tunables ... as a configuration record injected
//! at construction"). No file/env parsing lives here — that belongs to
//! the excluded CLI/config layer.

use std::net::SocketAddr;
use std::time::Duration;

use crate::rate_limiter::RateLimitConfig;

/// Tunables for a single base resolver (§4.4, §4.5).
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upstream server address (default port 53).
    pub addr: SocketAddr,

    /// Human label for log/metric attribution, independent of `addr`.
    pub label: String,

    /// Deadline for a reply to an outstanding query (§4.2, §7).
    pub query_timeout: Duration,

    /// Deadline for the UDP write itself (§4.4 step 5).
    pub write_timeout: Duration,

    /// Deadline for a TCP fallback query (§4.4 step 7).
    pub tcp_timeout: Duration,

    /// How often the resolver rotates to a fresh UDP socket (§4.4).
    pub rotation_interval: Duration,

    /// How often the reaper sweeps the exchange table (§4.2).
    pub reap_interval: Duration,

    /// Per-resolver rate limit.
    pub rate_limit: RateLimitConfig,

    /// Sliding-window failure detector tunables (§4.5).
    pub failure_window: FailureWindowConfig,
}

impl ResolverConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            label: addr.to_string(),
            query_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(2),
            tcp_timeout: Duration::from_secs(60),
            rotation_interval: Duration::from_secs(45),
            reap_interval: Duration::from_millis(250),
            rate_limit: RateLimitConfig::default(),
            failure_window: FailureWindowConfig::default(),
        }
    }
}

/// Sliding-window failure detector thresholds (§4.5, §9: threshold 0.9).
#[derive(Debug, Clone, Copy)]
pub struct FailureWindowConfig {
    /// Maximum recent outcomes retained.
    pub max_entries: usize,
    /// Horizon past which entries are discarded.
    pub horizon: Duration,
    /// Minimum outcomes in-window before the detector can trip.
    pub min_outcomes: usize,
    /// Timeout fraction at or above which the detector trips.
    pub threshold: f64,
}

impl Default for FailureWindowConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            horizon: Duration::from_secs(30),
            min_outcomes: 15,
            threshold: 0.9,
        }
    }
}

/// Tunables for the round-robin pool (§4.6) and its collaborators.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Per-resolver configuration, in rotation order.
    pub resolvers: Vec<ResolverConfig>,

    /// Trusted resolver used only for baseline cross-checks (§4.6).
    pub baseline: ResolverConfig,

    /// Wildcard probe tunables (§4.7, §9: N=5).
    pub wildcard: WildcardConfig,

    /// NSEC walk tunables (§4.8).
    pub walk: WalkConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct WildcardConfig {
    /// Number of unlikely-name probes per subdomain test.
    pub probe_count: usize,
    pub min_label_len: usize,
    pub max_label_len: usize,
}

impl Default for WildcardConfig {
    fn default() -> Self {
        Self {
            probe_count: 5,
            min_label_len: 6,
            max_label_len: 24,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalkConfig {
    /// Maximum mutation attempts per chain gap before giving up (§4.8).
    pub attempt_budget: usize,
    pub max_label_len: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            attempt_budget: 100,
            max_label_len: 63,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_config_defaults_are_sane() {
        let cfg = ResolverConfig::new("8.8.8.8:53".parse().unwrap());
        assert_eq!(cfg.label, "8.8.8.8:53");
        assert!(cfg.query_timeout > Duration::ZERO);
        assert_eq!(cfg.failure_window.threshold, 0.9);
    }
}

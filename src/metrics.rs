//! Prometheus metrics registry (§2 component M, §6 supplement): queries,
//! timeouts, stopped resolvers, and wildcard classifications, in the
//! style of the teacher's `DnsMetrics` — one `Registry` plus a fixed set
//! of named collectors, with an `encode()` helper for the HTTP surface.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct PoolMetrics {
    registry: Registry,

    pub queries_total: IntCounter,
    pub timeouts_total: IntCounter,
    pub resolvers_stopped: IntCounter,
    pub baseline_rejections: IntCounter,
    pub wildcard_classifications: IntCounterVec,
    pub walk_names_discovered: IntCounter,
}

impl PoolMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = IntCounter::with_opts(Opts::new(
            "greywing_queries_total",
            "Total number of queries dispatched to upstream resolvers",
        ))?;
        let timeouts_total = IntCounter::with_opts(Opts::new(
            "greywing_timeouts_total",
            "Total number of queries that timed out",
        ))?;
        let resolvers_stopped = IntCounter::with_opts(Opts::new(
            "greywing_resolvers_stopped_total",
            "Total number of times a resolver was stopped",
        ))?;
        let baseline_rejections = IntCounter::with_opts(Opts::new(
            "greywing_baseline_rejections_total",
            "Total number of answers rejected by baseline cross-check",
        ))?;
        let wildcard_classifications = IntCounterVec::new(
            Opts::new(
                "greywing_wildcard_classifications_total",
                "Wildcard classifications by type",
            ),
            &["type"],
        )?;
        let walk_names_discovered = IntCounter::with_opts(Opts::new(
            "greywing_walk_names_discovered_total",
            "Total number of names discovered via NSEC walking",
        ))?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(timeouts_total.clone()))?;
        registry.register(Box::new(resolvers_stopped.clone()))?;
        registry.register(Box::new(baseline_rejections.clone()))?;
        registry.register(Box::new(wildcard_classifications.clone()))?;
        registry.register(Box::new(walk_names_discovered.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            timeouts_total,
            resolvers_stopped,
            baseline_rejections,
            wildcard_classifications,
            walk_names_discovered,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in Prometheus text exposition format, for
    /// the optional `serve_metrics` HTTP endpoint (§6 supplement).
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

//! Round-robin pool (§4.6): selects the next live resolver, drives the
//! retry policy, cross-checks non-empty answers against a trusted
//! baseline, and folds in wildcard suppression for in-scope names.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::base_resolver::{BaseResolver, Resolver};
use crate::config::PoolConfig;
use crate::dns::{DNSPacket, DNSResourceType, ExtractedRecord};
use crate::error::DnsError;
use crate::metrics::PoolMetrics;
use crate::priority::Priority;
use crate::retry::{DefaultRetryPolicy, LastReply, RetryPolicy};
use crate::wildcard::{WildcardDetector, WildcardType};

/// Round-robin pool of upstream resolvers plus a trusted baseline.
pub struct Pool {
    resolvers: Vec<Arc<BaseResolver>>,
    baseline: Arc<BaseResolver>,
    cursor: AtomicUsize,
    retry_policy: Arc<dyn RetryPolicy>,
    wildcard: WildcardDetector,
    metrics: Arc<PoolMetrics>,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool[{} resolvers]", self.resolvers.len())
    }
}

impl Pool {
    pub async fn new(config: PoolConfig) -> std::io::Result<Arc<Self>> {
        Self::with_retry_policy(config, Arc::new(DefaultRetryPolicy)).await
    }

    pub async fn with_retry_policy(
        config: PoolConfig,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> std::io::Result<Arc<Self>> {
        let mut resolvers = Vec::with_capacity(config.resolvers.len());
        for resolver_config in config.resolvers {
            resolvers.push(BaseResolver::new(resolver_config).await?);
        }
        let baseline = BaseResolver::new(config.baseline).await?;

        Ok(Arc::new(Self {
            resolvers,
            baseline,
            cursor: AtomicUsize::new(0),
            retry_policy,
            wildcard: WildcardDetector::new(config.wildcard),
            metrics: Arc::new(PoolMetrics::new().expect("metrics registry construction")),
        }))
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        self.metrics.clone()
    }

    /// Number of resolvers not currently stopped.
    pub fn live_count(&self) -> usize {
        self.resolvers.iter().filter(|r| !r.stopped()).count()
    }

    /// Advances the cursor and returns the next live resolver, or `None`
    /// if every resolver is stopped (the caller then falls back to the
    /// baseline, §4.6).
    fn next_live(&self) -> Option<Arc<BaseResolver>> {
        let len = self.resolvers.len();
        if len == 0 {
            return None;
        }
        for _ in 0..len {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let candidate = &self.resolvers[idx];
            if !candidate.stopped() {
                return Some(candidate.clone());
            }
        }
        None
    }

    /// `pool.Query(message, priority, retryPolicy)` (§6).
    pub async fn query(
        &self,
        name: &str,
        qtype: DNSResourceType,
        priority: Priority,
    ) -> Result<DNSPacket, DnsError> {
        let mut attempts = 0u32;
        let mut last: Option<Result<DNSPacket, DnsError>> = None;

        loop {
            let last_reply = match &last {
                None => LastReply::None,
                Some(Ok(packet)) => LastReply::Ok(packet),
                Some(Err(err)) => LastReply::Err(err),
            };
            if attempts > 0 && !self.retry_policy.keep_trying(attempts, priority, last_reply) {
                break;
            }

            let Some(resolver) = self.next_live() else {
                return self.baseline.query(name, qtype, priority).await;
            };

            self.metrics.queries_total.inc();
            let result = resolver.query(name, qtype, priority).await;
            attempts += 1;

            if matches!(result, Err(DnsError::Timeout)) {
                self.metrics.timeouts_total.inc();
            }

            if let Err(DnsError::ServerError(rcode)) = &result {
                if rcode.stops_resolver() {
                    info!(resolver = %resolver, rcode = ?rcode, "stopping resolver on server error");
                    resolver.stop();
                    self.metrics.resolvers_stopped.inc();
                }
            }

            match &result {
                Ok(reply) if !reply.answers.is_empty() => {
                    return self.cross_check_baseline(name, qtype, priority, reply.clone(), &resolver).await;
                }
                _ => {}
            }

            last = Some(result);
            if attempts >= priority.max_retries() {
                break;
            }
        }

        last.unwrap_or(Err(DnsError::PoolExhausted))
    }

    /// Re-queries the baseline when a non-baseline resolver returns a
    /// non-empty answer (§4.6). An empty baseline answer marks the
    /// original response a false positive and stops the offending
    /// resolver; the baseline's (empty) response is returned upward.
    async fn cross_check_baseline(
        &self,
        name: &str,
        qtype: DNSResourceType,
        priority: Priority,
        candidate: DNSPacket,
        resolver: &Arc<BaseResolver>,
    ) -> Result<DNSPacket, DnsError> {
        let baseline_reply = self.baseline.query(name, qtype, priority).await;
        match baseline_reply {
            Ok(baseline) if baseline.answers.is_empty() => {
                debug!(resolver = %resolver, "baseline cross-check found no answers, stopping resolver");
                resolver.stop();
                self.metrics.resolvers_stopped.inc();
                self.metrics.baseline_rejections.inc();
                Ok(baseline)
            }
            Ok(_) => Ok(candidate),
            Err(_) => Ok(candidate),
        }
    }

    /// `pool.WildcardType(message, domain)` (§6, §4.7).
    pub async fn wildcard_type(
        &self,
        name: &str,
        domain: &str,
        records: &[ExtractedRecord],
    ) -> WildcardType {
        let kind = self.wildcard.classify(self, name, domain, records).await;
        let label = match kind {
            WildcardType::None => "none",
            WildcardType::Static => "static",
            WildcardType::Dynamic => "dynamic",
        };
        self.metrics
            .wildcard_classifications
            .with_label_values(&[label])
            .inc();
        kind
    }

    /// Dispatches an unlikely-name wildcard probe through the pool
    /// itself, so wildcard tests share the same resolvers, retry
    /// policy, and stop/baseline behavior as ordinary queries.
    pub(crate) async fn probe(
        &self,
        name: &str,
        qtype: DNSResourceType,
    ) -> Result<DNSPacket, DnsError> {
        self.query(name, qtype, Priority::Critical).await
    }

    pub fn resolver_addrs(&self) -> Vec<SocketAddr> {
        self.resolvers
            .iter()
            .filter_map(|r| r.label().parse().ok())
            .collect()
    }

    /// `pool.serve_metrics(addr)` (§6 supplement): starts the optional
    /// `/health` + `/metrics` HTTP endpoint over this pool's registry.
    /// Runs until the process receives ctrl-c.
    pub async fn serve_metrics(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        crate::http::serve(self.clone(), addr).await
    }
}

#[async_trait]
impl Resolver for Pool {
    async fn query(
        &self,
        name: &str,
        qtype: DNSResourceType,
        priority: Priority,
    ) -> Result<DNSPacket, DnsError> {
        Pool::query(self, name, qtype, priority).await
    }

    fn stop(&self) {
        for resolver in &self.resolvers {
            resolver.stop();
        }
        self.baseline.stop();
    }

    fn stopped(&self) -> bool {
        self.resolvers.iter().all(|r| r.stopped()) && self.baseline.stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use tokio::net::UdpSocket;

    async fn single_resolver_pool() -> (Arc<Pool>, SocketAddr) {
        let stub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = stub.local_addr().unwrap();
        drop(stub);

        let baseline_stub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let baseline_addr = baseline_stub.local_addr().unwrap();
        drop(baseline_stub);

        let config = PoolConfig {
            resolvers: vec![ResolverConfig::new(addr)],
            baseline: ResolverConfig::new(baseline_addr),
            wildcard: Default::default(),
            walk: Default::default(),
        };
        let pool = Pool::new(config).await.unwrap();
        (pool, addr)
    }

    #[tokio::test]
    async fn pool_reports_live_count() {
        let (pool, _addr) = single_resolver_pool().await;
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn pool_stops_a_servfail_resolver_and_fails_over_to_the_next() {
        use crate::dns::{DNSHeader, DNSResource, DNSResourceClass};

        let servfail = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let servfail_addr = servfail.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let Ok((n, peer)) = servfail.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(query) = DNSPacket::parse(&buf[..n]) else {
                    continue;
                };
                let mut header = DNSHeader::new_query(query.header.id);
                header.qr = true;
                header.rcode = 2; // ServFail
                let reply = DNSPacket {
                    header,
                    questions: query.questions.clone(),
                    answers: Vec::new(),
                    authorities: Vec::new(),
                    additional: Vec::new(),
                };
                let _ = servfail.send_to(&reply.to_bytes(), peer).await;
            }
        });

        let good = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let good_addr = good.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let Ok((n, peer)) = good.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(query) = DNSPacket::parse(&buf[..n]) else {
                    continue;
                };
                let question = &query.questions[0];
                let mut header = DNSHeader::new_query(query.header.id);
                header.qr = true;
                let mut reply = DNSPacket {
                    header,
                    questions: query.questions.clone(),
                    answers: Vec::new(),
                    authorities: Vec::new(),
                    additional: Vec::new(),
                };
                reply.answers.push(DNSResource {
                    labels: question.labels.clone(),
                    rtype: DNSResourceType::A,
                    raw_class: DNSResourceClass::IN.into(),
                    ttl: 300,
                    rdata: vec![192, 0, 2, 50],
                });
                reply.header.ancount = reply.answers.len() as u16;
                let _ = good.send_to(&reply.to_bytes(), peer).await;
            }
        });

        let config = PoolConfig {
            resolvers: vec![ResolverConfig::new(servfail_addr), ResolverConfig::new(good_addr)],
            baseline: ResolverConfig::new(good_addr),
            wildcard: Default::default(),
            walk: Default::default(),
        };
        let pool = Pool::new(config).await.unwrap();

        let reply = pool
            .query("failover.example.com", DNSResourceType::A, Priority::Normal)
            .await
            .expect("second resolver should answer once the first is stopped");

        assert_eq!(reply.answers[0].rdata, vec![192, 0, 2, 50]);
        assert!(pool.resolvers[0].stopped());
        assert!(!pool.resolvers[1].stopped());
    }
}

//! Input/filter pipeline glue (§6, §4.9 supplement): a deduplicating
//! source queue feeding a dynamic DNS worker pool, plus a final
//! domain-keyed dedup filter on the way out (§8 property 5).

use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHasher;
use tokio::sync::{Semaphore, mpsc};

use crate::dns::{DNSResourceType, ExtractedRecord};
use crate::pool::Pool;
use crate::priority::Priority;

/// Approximate-membership filter (§6: ≈0.01 false-positive rate over
/// 1,000,000 items). No bloom-filter crate is in the dependency stack,
/// so this is a small hand-rolled bit array sized from the standard
/// bloom-filter formulas, hashed with `rustc-hash`'s `FxHasher` and the
/// double-hashing trick (Kirsch/Mitzenmacher) to derive `k` probe
/// positions from two independent hashes.
pub struct Membership {
    bits: Mutex<Vec<u64>>,
    num_bits: u64,
    k: u32,
}

impl Membership {
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = (expected_items.max(1)) as f64;
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        let m = (-(n * false_positive_rate.ln()) / ln2_sq).ceil().max(64.0) as u64;
        let k = ((m as f64 / n) * std::f64::consts::LN_2).round().max(1.0) as u32;
        let words = m.div_ceil(64) as usize;
        Self {
            bits: Mutex::new(vec![0u64; words]),
            num_bits: (words as u64) * 64,
            k,
        }
    }

    fn hashes(key: &str) -> (u64, u64) {
        let mut h1 = FxHasher::default();
        key.hash(&mut h1);
        let h1 = h1.finish();

        let mut h2 = FxHasher::default();
        key.hash(&mut h2);
        0x9E37_79B9_7F4A_7C15u64.hash(&mut h2);
        let h2 = h2.finish() | 1;

        (h1, h2)
    }

    /// Inserts `key` and reports whether it was already present. A
    /// `true` result may be a false positive; a `false` result is exact.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let (h1, h2) = Self::hashes(key);
        let mut bits = self.bits.lock();
        let mut already_present = true;
        for i in 0..self.k as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits;
            let word = (bit / 64) as usize;
            let mask = 1u64 << (bit % 64);
            if bits[word] & mask == 0 {
                already_present = false;
            }
            bits[word] |= mask;
        }
        already_present
    }
}

/// A deduplicating source queue (§6): callers push addresses/names in,
/// `recv` pulls the next one the membership filter hasn't already seen.
pub struct DedupSource<T> {
    filter: Membership,
    inbound: mpsc::UnboundedReceiver<T>,
}

impl<T: AsRef<str>> DedupSource<T> {
    pub fn new(expected_items: usize) -> (Self, mpsc::UnboundedSender<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                filter: Membership::new(expected_items, 0.01),
                inbound: rx,
            },
            tx,
        )
    }

    /// `Next`/`Data` (§6): the next not-yet-seen item, or `None` once
    /// every sender has dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let item = self.inbound.recv().await?;
            if !self.filter.check_and_insert(item.as_ref()) {
                return Some(item);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordTag {
    Dns,
    Axfr,
    Cert,
}

/// `Output{name, domain, records, tag, source}` (§6): what the pool
/// hands to a pipeline sink task. The pool never stores these itself.
#[derive(Clone, Debug)]
pub struct PipelineRecord {
    pub name: String,
    pub domain: String,
    pub records: Vec<ExtractedRecord>,
    pub tag: RecordTag,
    pub source: String,
}

/// The dynamic DNS worker-pool stage (§6: `maxDnsPipelineTasks ≈ 2000`).
/// Bounded concurrency via a semaphore rather than a fixed thread count,
/// so the stage scales down under backpressure from a slow sink.
pub struct DnsStage {
    pool: Arc<Pool>,
    max_tasks: usize,
}

impl DnsStage {
    pub fn new(pool: Arc<Pool>, max_tasks: usize) -> Arc<Self> {
        Arc::new(Self { pool, max_tasks })
    }

    /// Drains `source`, issuing one query per item, and emits a
    /// [`PipelineRecord`] per non-empty reply to `sink`.
    pub async fn run<T>(
        self: Arc<Self>,
        mut source: DedupSource<T>,
        sink: mpsc::UnboundedSender<PipelineRecord>,
        qtype: DNSResourceType,
        source_tag: &'static str,
    ) where
        T: AsRef<str> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_tasks.max(1)));
        let mut joins = Vec::new();

        while let Some(item) = source.recv().await {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("dns stage semaphore is never closed");
            let pool = self.pool.clone();
            let sink = sink.clone();
            let name = item.as_ref().to_string();

            joins.push(tokio::spawn(async move {
                let _permit = permit;
                if let Ok(reply) = pool.query(&name, qtype, Priority::Normal).await {
                    let extracted = reply.extract();
                    if !extracted.is_empty() {
                        let _ = sink.send(PipelineRecord {
                            name: name.clone(),
                            domain: name,
                            records: extracted,
                            tag: RecordTag::Dns,
                            source: source_tag.to_string(),
                        });
                    }
                }
            }));
        }

        for join in joins {
            let _ = join.await;
        }
    }
}

/// Final FIFO filter stage (§6): a second membership filter keyed by the
/// emitted domain, independent of the source-side one, so records that
/// arrive via different routes but resolve to the same domain collapse.
pub struct DomainDedupStage {
    filter: Membership,
}

impl DomainDedupStage {
    pub fn new() -> Self {
        Self {
            filter: Membership::new(1_000_000, 0.01),
        }
    }

    /// Returns `true` if `record` should be forwarded downstream.
    pub fn admit(&self, record: &PipelineRecord) -> bool {
        !self.filter.check_and_insert(&record.domain)
    }
}

impl Default for DomainDedupStage {
    fn default() -> Self {
        Self::new()
    }
}

/// `203.0.113.1-3` → three reverse-lookup names (§8 property 5). Only
/// IPv4 ranges are expanded; mixed-family or inverted ranges are empty.
pub fn expand_ip_range(start: IpAddr, end: IpAddr) -> Vec<IpAddr> {
    match (start, end) {
        (IpAddr::V4(lo), IpAddr::V4(hi)) => {
            let lo = u32::from(lo);
            let hi = u32::from(hi);
            if lo > hi {
                return Vec::new();
            }
            (lo..=hi).map(|n| IpAddr::V4(std::net::Ipv4Addr::from(n))).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_reports_repeats_and_admits_new_keys() {
        let m = Membership::new(1000, 0.01);
        assert!(!m.check_and_insert("example.com"));
        assert!(m.check_and_insert("example.com"));
        assert!(!m.check_and_insert("other.example.com"));
    }

    #[tokio::test]
    async fn dedup_source_drops_repeats_across_senders() {
        let (mut source, tx) = DedupSource::<String>::new(100);
        tx.send("a.example.com".to_string()).unwrap();
        tx.send("a.example.com".to_string()).unwrap();
        tx.send("b.example.com".to_string()).unwrap();
        drop(tx);

        let mut seen = Vec::new();
        while let Some(item) = source.recv().await {
            seen.push(item);
        }
        assert_eq!(seen, vec!["a.example.com".to_string(), "b.example.com".to_string()]);
    }

    #[test]
    fn expand_ip_range_produces_inclusive_sequence() {
        let start: IpAddr = "203.0.113.1".parse().unwrap();
        let end: IpAddr = "203.0.113.3".parse().unwrap();
        let ips = expand_ip_range(start, end);
        assert_eq!(
            ips,
            vec![
                "203.0.113.1".parse::<IpAddr>().unwrap(),
                "203.0.113.2".parse::<IpAddr>().unwrap(),
                "203.0.113.3".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn domain_dedup_stage_admits_each_domain_once() {
        let stage = DomainDedupStage::new();
        let record = PipelineRecord {
            name: "www.example.com".into(),
            domain: "example.com".into(),
            records: Vec::new(),
            tag: RecordTag::Dns,
            source: "test".into(),
        };
        assert!(stage.admit(&record));
        assert!(!stage.admit(&record));
    }
}

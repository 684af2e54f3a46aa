//! Wildcard detector (§4.7): per-subdomain classification with cached
//! results and single-flight tests. The per-subdomain "in-flight flag"
//! the spec describes is realised here as an async mutex guarding a
//! lazily-populated cache cell — concurrent callers queue on the same
//! lock rather than racing a hand-rolled flag, which gives the same
//! single-flight guarantee with less bookkeeping.

use std::collections::HashSet;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::config::WildcardConfig;
use crate::dns::{DNSResourceType, ExtractedRecord, labels_of, normalize_name};
use crate::error::DnsError;
use crate::pool::Pool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WildcardType {
    None,
    Static,
    Dynamic,
}

#[derive(Clone, Debug)]
struct WildcardEntry {
    kind: WildcardType,
    answer_set: HashSet<String>,
}

const PROBE_TYPES: [DNSResourceType; 3] =
    [DNSResourceType::CNAME, DNSResourceType::A, DNSResourceType::AAAA];

pub struct WildcardDetector {
    config: WildcardConfig,
    cache: DashMap<String, std::sync::Arc<AsyncMutex<Option<WildcardEntry>>>>,
}

impl WildcardDetector {
    pub fn new(config: WildcardConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
        }
    }

    /// Classify `{name, domain, records}` per §4.7.
    pub async fn classify(
        &self,
        pool: &Pool,
        name: &str,
        domain: &str,
        records: &[ExtractedRecord],
    ) -> WildcardType {
        let candidate: HashSet<String> = records.iter().map(|r| r.data.clone()).collect();
        let ancestors = self.ancestor_chain(name, domain);
        if ancestors.is_empty() {
            return WildcardType::None;
        }

        let mut results = Vec::with_capacity(ancestors.len());
        for ancestor in &ancestors {
            results.push(self.get_or_test(pool, ancestor).await);
        }

        if results.iter().any(|e| e.kind == WildcardType::Dynamic) {
            return WildcardType::Dynamic;
        }

        let intersects = |e: &WildcardEntry| {
            e.kind == WildcardType::Static && !e.answer_set.is_disjoint(&candidate)
        };

        if results.iter().any(intersects) {
            return WildcardType::Static;
        }

        if results.windows(3).any(|w| w.iter().all(intersects)) {
            return WildcardType::Static;
        }

        WildcardType::None
    }

    /// Ancestor subdomains from the root `domain` up to, but excluding,
    /// the full `name` (§4.7).
    fn ancestor_chain(&self, name: &str, domain: &str) -> Vec<String> {
        let name = normalize_name(name);
        let domain = normalize_name(domain);
        if name == domain {
            return Vec::new();
        }
        let Some(prefix) = name.strip_suffix(&format!(".{domain}")) else {
            return Vec::new();
        };
        let mut prefix_labels = labels_of(prefix);
        prefix_labels.reverse(); // nearest-to-domain label first

        let mut ancestors = vec![domain.clone()];
        let mut current = domain;
        // drop the last label (closest to `name`) so the chain never
        // reaches the full name itself.
        if !prefix_labels.is_empty() {
            prefix_labels.pop();
        }
        for label in prefix_labels {
            current = format!("{label}.{current}");
            ancestors.push(current.clone());
        }
        ancestors
    }

    async fn get_or_test(&self, pool: &Pool, subdomain: &str) -> WildcardEntry {
        let cell = self
            .cache
            .entry(subdomain.to_string())
            .or_insert_with(|| std::sync::Arc::new(AsyncMutex::new(None)))
            .clone();

        let mut guard = cell.lock().await;
        if let Some(entry) = guard.as_ref() {
            return entry.clone();
        }
        let entry = self.run_test(pool, subdomain).await;
        *guard = Some(entry.clone());
        entry
    }

    async fn run_test(&self, pool: &Pool, subdomain: &str) -> WildcardEntry {
        let mut probe_sets = Vec::with_capacity(self.config.probe_count);
        let mut failed = false;

        for _ in 0..self.config.probe_count {
            let probe_name = format!(
                "{}.{}",
                self.random_unlikely_label(subdomain),
                subdomain
            );
            let mut set = HashSet::new();
            for qtype in PROBE_TYPES {
                match pool.probe(&probe_name, qtype).await {
                    Ok(reply) => {
                        for record in reply.extract() {
                            set.insert(record.data);
                        }
                    }
                    Err(DnsError::NameError) => {}
                    Err(err) => {
                        debug!(subdomain, error = %err, "wildcard probe failed");
                        failed = true;
                    }
                }
            }
            probe_sets.push(set);
        }

        if failed {
            // fail-safe: an incomplete test must not be reported as `none` (§4.7).
            return WildcardEntry {
                kind: WildcardType::Dynamic,
                answer_set: HashSet::new(),
            };
        }

        if probe_sets.iter().all(|s| s.is_empty()) {
            return WildcardEntry {
                kind: WildcardType::None,
                answer_set: HashSet::new(),
            };
        }

        let mut intersection = probe_sets[0].clone();
        for set in &probe_sets[1..] {
            intersection = intersection.intersection(set).cloned().collect();
        }

        if intersection.is_empty() {
            WildcardEntry {
                kind: WildcardType::Dynamic,
                answer_set: HashSet::new(),
            }
        } else {
            WildcardEntry {
                kind: WildcardType::Static,
                answer_set: intersection,
            }
        }
    }

    fn random_unlikely_label(&self, subdomain: &str) -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";
        let max_len = self
            .config
            .max_label_len
            .min(253usize.saturating_sub(subdomain.len() + 1))
            .max(self.config.min_label_len);

        let mut rng = rand::rng();
        let len = rng.random_range(self.config.min_label_len..=max_len);
        let label: String = (0..len)
            .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
            .collect();
        let trimmed = label.trim_matches('-').to_string();
        if trimmed.is_empty() {
            "probe".to_string()
        } else {
            trimmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> WildcardDetector {
        WildcardDetector::new(WildcardConfig::default())
    }

    #[test]
    fn ancestor_chain_stops_before_full_name() {
        let d = detector();
        let chain = d.ancestor_chain("random.wild.example.com", "wild.example.com");
        assert_eq!(chain, vec!["wild.example.com".to_string()]);
    }

    #[test]
    fn ancestor_chain_covers_multiple_levels() {
        let d = detector();
        let chain = d.ancestor_chain("a.b.wild.example.com", "wild.example.com");
        assert_eq!(
            chain,
            vec!["wild.example.com".to_string(), "b.wild.example.com".to_string()]
        );
    }

    #[test]
    fn ancestor_chain_is_empty_for_the_domain_itself() {
        let d = detector();
        assert!(d.ancestor_chain("wild.example.com", "wild.example.com").is_empty());
    }

    #[test]
    fn unlikely_label_stays_within_bounds() {
        let d = detector();
        let label = d.random_unlikely_label("wild.example.com");
        assert!(label.len() >= 1);
        assert!(label.len() <= d.config.max_label_len);
        assert!(!label.starts_with('-') && !label.ends_with('-'));
    }
}

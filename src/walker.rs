//! NSEC walker (§4.8): enumerates named labels in a zone by following
//! the NSEC chain, with label-mutation heuristics to force the next
//! chain link into view.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::WalkConfig;
use crate::dns::{DNSPacket, DNSResourceType, normalize_name};
use crate::pool::Pool;
use crate::priority::Priority;

pub struct Walker {
    pool: Arc<Pool>,
    config: WalkConfig,
}

impl Walker {
    pub fn new(pool: Arc<Pool>, config: WalkConfig) -> Self {
        Self { pool, config }
    }

    /// `walker.Traverse(domain) -> sequence of names` (§6).
    pub async fn traverse(&self, domain: &str) -> Vec<String> {
        let domain = normalize_name(domain);
        let mut discovered = Vec::new();
        let mut current = "0".to_string();
        let mut seen_currents = std::collections::HashSet::new();

        loop {
            if !seen_currents.insert(current.clone()) {
                debug!(domain, "walk chain revisited a prior label, stopping");
                break;
            }

            let Some((owner, next, next_query_name)) = self.advance(&domain, &current).await else {
                debug!(domain, "walk exhausted its attempt budget without progress");
                break;
            };

            if let Some(name) = owner.strip_suffix(&format!(".{domain}")).map(str::to_string) {
                discovered.push(name);
            } else if owner != domain {
                discovered.push(owner.clone());
            }

            if next.is_empty() || next == domain {
                break;
            }
            current = next_query_name
                .strip_suffix(&format!(".{domain}"))
                .map(str::to_string)
                .unwrap_or(next_query_name);
        }

        self.pool
            .metrics()
            .walk_names_discovered
            .inc_by(discovered.len() as u64);
        discovered
    }

    /// Issues mutation attempts for `current` until one turns up an NSEC
    /// record exactly matching the expected query name, or the attempt
    /// budget is exhausted. Returns `(owner, raw next domain, padded next
    /// query name)` — closure detection must compare against the raw
    /// value, since padding only changes what gets queried next.
    async fn advance(&self, domain: &str, current: &str) -> Option<(String, String, String)> {
        for _ in 0..self.config.attempt_budget {
            for candidate in self.mutations(domain, current) {
                for qtype in [DNSResourceType::NSEC, DNSResourceType::A] {
                    let Ok(reply) = self.pool.query(&candidate, qtype, Priority::High).await else {
                        continue;
                    };
                    if let Some(result) = self.inspect_reply(&reply, &candidate) {
                        return Some(result);
                    }
                }
            }
        }
        None
    }

    fn mutations(&self, domain: &str, current: &str) -> Vec<String> {
        let doubled = double_last_char(current);
        vec![
            format!("0.{current}.{domain}"),
            format!("{doubled}.{domain}"),
            format!("{current}0.{domain}"),
            format!("{current}-.{domain}"),
        ]
    }

    fn inspect_reply(&self, reply: &DNSPacket, expected_name: &str) -> Option<(String, String, String)> {
        let expected = normalize_name(expected_name);
        for record in reply.answers.iter().chain(&reply.authorities) {
            if record.rtype != DNSResourceType::NSEC {
                continue;
            }
            if record.owner_name() != expected {
                continue;
            }
            let next = record.nsec_next_domain()?;
            trace!(owner = %expected, next = %next, "nsec chain link");
            let padded = pad_label(&next, self.config.max_label_len);
            return Some((record.owner_name(), next, padded));
        }
        None
    }
}

/// Labels longer than `MaxDNSLabelLen` are truncated and padded to
/// remain lexicographically just after the prior label (§4.8).
fn pad_label(name: &str, max: usize) -> String {
    let mut labels: Vec<String> = name.split('.').map(str::to_string).collect();
    if let Some(first) = labels.first_mut() {
        if first.len() > max {
            let mut truncated: String = first.chars().take(max).collect();
            let pad = match truncated.chars().last() {
                Some('9') | Some('-') => 'a',
                _ => 'z',
            };
            truncated.push(pad);
            *first = truncated;
        }
    }
    labels.join(".")
}

fn double_last_char(s: &str) -> String {
    match s.chars().last() {
        Some(c) => format!("{s}{c}"),
        None => s.to_string(),
    }
}

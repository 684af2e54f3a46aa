//! Sanity / ECS / zone-transfer probes (§4.9): initial filtering of a
//! candidate resolver list, run once per resolver before it joins a pool.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::base_resolver::{BaseResolver, Resolver};
use crate::dns::{DNSPacket, DNSResourceType, ExtractedRecord};
use crate::priority::Priority;

const KNOWN_GOOD: &[&str] = &["www.google.com", "www.cloudflare.com", "a.root-servers.net"];
const KNOWN_BAD_PREFIX: &str = "this-name-should-not-exist-anywhere-9f3a1c";

/// Outcome of the sanity + ECS pass for one candidate resolver (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanityVerdict {
    pub resolves_known_good: bool,
    pub rejects_known_bad: bool,
    pub leaks_client_subnet: bool,
    pub within_rtt_ceiling: bool,
}

impl SanityVerdict {
    /// This crate supplements the sanity probe with a raw-RTT gate (§6
    /// supplement): a resolver that technically answers but is too slow
    /// to be worth querying is dropped alongside the correctness checks.
    pub fn passed(&self) -> bool {
        self.resolves_known_good
            && self.rejects_known_bad
            && !self.leaks_client_subnet
            && self.within_rtt_ceiling
    }
}

/// Runs the known-good/known-bad sanity pass, the ECS leak probe, and the
/// RTT gate against one resolver and reports a single pass/fail verdict.
pub async fn sanity_probe(resolver: &BaseResolver, rtt_ceiling: Duration) -> SanityVerdict {
    let mut resolves_known_good = true;
    let mut within_rtt_ceiling = true;

    for name in KNOWN_GOOD {
        let started = std::time::Instant::now();
        match resolver.query(name, DNSResourceType::A, Priority::High).await {
            Ok(reply) if !reply.answers.is_empty() => {
                if started.elapsed() > rtt_ceiling {
                    within_rtt_ceiling = false;
                }
            }
            _ => resolves_known_good = false,
        }
    }

    let bad_name = format!("{KNOWN_BAD_PREFIX}.invalid");
    let rejects_known_bad = match resolver.query(&bad_name, DNSResourceType::A, Priority::High).await {
        Ok(reply) => reply.answers.is_empty(),
        Err(_) => true,
    };

    let leaks_client_subnet = probe_client_subnet_leak(resolver).await;

    let verdict = SanityVerdict {
        resolves_known_good,
        rejects_known_bad,
        leaks_client_subnet,
        within_rtt_ceiling,
    };
    debug!(resolver = %resolver, ?verdict, "sanity probe complete");
    verdict
}

/// `o-o.myaddr.l.google.com TXT` (§4.9): a resolver that echoes the
/// client's subnet back in the TXT answer is leaking ECS data upstream.
async fn probe_client_subnet_leak(resolver: &BaseResolver) -> bool {
    match resolver
        .query("o-o.myaddr.l.google.com", DNSResourceType::TXT, Priority::High)
        .await
    {
        Ok(reply) => reply
            .extract()
            .iter()
            .any(|r| r.data.starts_with("edns0-client-subnet")),
        Err(_) => false,
    }
}

/// Client-side AXFR against one authoritative nameserver (§4.9): opens a
/// TCP connection with the spec's connect/read deadlines, issues an AXFR
/// query, and folds every envelope's records into `{owner, rrtype, data}`
/// triples. Any error along the way ends the probe gracefully with
/// whatever records were already collected.
pub async fn zone_transfer_probe(ns_addr: SocketAddr, zone: &str) -> Vec<ExtractedRecord> {
    match tokio::time::timeout(Duration::from_secs(20), TcpStream::connect(ns_addr)).await {
        Ok(Ok(stream)) => collect_axfr(stream, zone).await,
        Ok(Err(e)) => {
            debug!(%ns_addr, zone, error = %e, "zone transfer connect failed");
            Vec::new()
        }
        Err(_) => {
            debug!(%ns_addr, zone, "zone transfer connect timed out");
            Vec::new()
        }
    }
}

async fn collect_axfr(mut stream: TcpStream, zone: &str) -> Vec<ExtractedRecord> {
    let query = DNSPacket::build_forward(1, zone, DNSResourceType::AXFR);
    let bytes = query.to_bytes();
    let len = bytes.len() as u16;

    if stream.write_all(&len.to_be_bytes()).await.is_err() {
        return Vec::new();
    }
    if stream.write_all(&bytes).await.is_err() {
        return Vec::new();
    }
    if stream.flush().await.is_err() {
        return Vec::new();
    }

    let mut records = Vec::new();
    let mut soa_seen = 0u32;

    loop {
        let envelope = tokio::time::timeout(Duration::from_secs(30), read_envelope(&mut stream)).await;
        let Ok(Some(packet)) = envelope else {
            break;
        };

        for record in &packet.answers {
            if record.rtype == DNSResourceType::SOA {
                soa_seen += 1;
            }
        }
        records.extend(packet.extract());

        // RFC 5936: the transfer closes when the trailing SOA repeats
        // the leading one.
        if soa_seen >= 2 {
            break;
        }
    }

    info!(zone, records = records.len(), "zone transfer probe complete");
    records
}

async fn read_envelope(stream: &mut TcpStream) -> Option<DNSPacket> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.ok()?;
    match DNSPacket::parse(&buf) {
        Ok(packet) => Some(packet),
        Err(e) => {
            warn!(error = ?e, "dropping malformed AXFR envelope");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_requires_every_gate_to_pass() {
        let verdict = SanityVerdict {
            resolves_known_good: true,
            rejects_known_bad: true,
            leaks_client_subnet: false,
            within_rtt_ceiling: true,
        };
        assert!(verdict.passed());

        let leaking = SanityVerdict {
            leaks_client_subnet: true,
            ..verdict
        };
        assert!(!leaking.passed());

        let slow = SanityVerdict {
            within_rtt_ceiling: false,
            ..verdict
        };
        assert!(!slow.passed());
    }
}

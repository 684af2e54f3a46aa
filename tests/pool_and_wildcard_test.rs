use std::net::SocketAddr;
use std::sync::Arc;

use greywing::config::{PoolConfig, ResolverConfig, WildcardConfig};
use greywing::dns::{DNSHeader, DNSPacket, DNSResource, DNSResourceClass, DNSResourceType};
use greywing::pool::Pool;
use greywing::priority::Priority;
use greywing::wildcard::WildcardType;
use tokio::net::UdpSocket;

/// Spins up a UDP stub authoritative server: every query for a name
/// under `answers_for` gets back the fixed `ip`; anything else gets an
/// empty NXDOMAIN-equivalent reply.
async fn spawn_stub(answers_for: &'static str, ip: [u8; 4]) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let (n, peer) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(_) => break,
            };
            let Ok(query) = DNSPacket::parse(&buf[..n]) else {
                continue;
            };
            let Some(question) = query.questions.first() else {
                continue;
            };
            let name = question.name();

            let mut header = DNSHeader::new_query(query.header.id);
            header.qr = true;
            header.rd = true;
            header.ra = true;

            let mut reply = DNSPacket {
                header,
                questions: query.questions.clone(),
                answers: Vec::new(),
                authorities: Vec::new(),
                additional: Vec::new(),
            };

            if name.ends_with(answers_for) {
                reply.answers.push(DNSResource {
                    labels: question.labels.clone(),
                    rtype: DNSResourceType::A,
                    raw_class: DNSResourceClass::IN.into(),
                    ttl: 300,
                    rdata: ip.to_vec(),
                });
            } else {
                reply.header.rcode = 3; // NXDOMAIN
            }
            reply.header.ancount = reply.answers.len() as u16;

            let _ = socket.send_to(&reply.to_bytes(), peer).await;
        }
    });

    addr
}

async fn pool_over_stub(addr: SocketAddr) -> Arc<Pool> {
    let config = PoolConfig {
        resolvers: vec![ResolverConfig::new(addr), ResolverConfig::new(addr)],
        baseline: ResolverConfig::new(addr),
        wildcard: WildcardConfig::default(),
        walk: Default::default(),
    };
    Pool::new(config).await.unwrap()
}

#[tokio::test]
async fn pool_resolves_through_round_robin_and_baseline_cross_check() {
    let addr = spawn_stub("example.com", [203, 0, 113, 9]).await;
    let pool = pool_over_stub(addr).await;

    let reply = pool
        .query("www.example.com", DNSResourceType::A, Priority::Normal)
        .await
        .expect("query should succeed");

    assert_eq!(reply.answers.len(), 1);
    assert_eq!(reply.answers[0].rdata, vec![203, 0, 113, 9]);
}

#[tokio::test]
async fn pool_surfaces_nxdomain_as_a_terminal_name_error() {
    use greywing::error::DnsError;

    let addr = spawn_stub("example.com", [203, 0, 113, 9]).await;
    let pool = pool_over_stub(addr).await;

    let result = pool
        .query("nope.other.test", DNSResourceType::A, Priority::Normal)
        .await;

    assert!(matches!(result, Err(DnsError::NameError)));
}

#[tokio::test]
async fn wildcard_detector_classifies_static_wildcard_under_pool() {
    // Every name under wild.example.com resolves to the same IP, so
    // random-label probes should all intersect and classify as static.
    let addr = spawn_stub("wild.example.com", [198, 51, 100, 7]).await;
    let pool = pool_over_stub(addr).await;

    let records = pool
        .query("random.wild.example.com", DNSResourceType::A, Priority::Normal)
        .await
        .unwrap()
        .extract();

    let kind = pool
        .wildcard_type("random.wild.example.com", "wild.example.com", &records)
        .await;
    assert_eq!(kind, WildcardType::Static);
}

#[tokio::test]
async fn wildcard_detector_classifies_no_wildcard_when_nothing_intersects() {
    // `answers_for` only matches the exact queried name, so every
    // unlikely-label probe for the "utica.edu" ancestor comes back
    // NXDOMAIN and the intersection across probe rounds is empty.
    let addr = spawn_stub("www.utica.edu", [203, 0, 113, 20]).await;
    let pool = pool_over_stub(addr).await;

    let records = pool
        .query("www.utica.edu", DNSResourceType::A, Priority::Normal)
        .await
        .unwrap()
        .extract();

    let kind = pool.wildcard_type("www.utica.edu", "utica.edu", &records).await;
    assert_eq!(kind, WildcardType::None);
}

/// Spins up a stub distinguishing three name shapes: the real candidate
/// name itself, probes under the nearer ancestor `sub.wild.example.com`
/// (always NXDOMAIN), and probes under the root ancestor
/// `wild.example.com` (always the fixed IP, so that ancestor is static
/// and intersects the candidate's own answer).
async fn spawn_non_nearest_ancestor_stub(ip: [u8; 4]) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let (n, peer) = match socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(_) => break,
            };
            let Ok(query) = DNSPacket::parse(&buf[..n]) else {
                continue;
            };
            let Some(question) = query.questions.first() else {
                continue;
            };
            let name = question.name();

            let mut header = DNSHeader::new_query(query.header.id);
            header.qr = true;
            header.rd = true;
            header.ra = true;

            let mut reply = DNSPacket {
                header,
                questions: query.questions.clone(),
                answers: Vec::new(),
                authorities: Vec::new(),
                additional: Vec::new(),
            };

            let answer = if name == "leaf.sub.wild.example.com" {
                true
            } else if name.ends_with(".sub.wild.example.com") {
                false
            } else {
                name.ends_with(".wild.example.com")
            };

            if answer {
                reply.answers.push(DNSResource {
                    labels: question.labels.clone(),
                    rtype: DNSResourceType::A,
                    raw_class: DNSResourceClass::IN.into(),
                    ttl: 300,
                    rdata: ip.to_vec(),
                });
            } else {
                reply.header.rcode = 3; // NXDOMAIN
            }
            reply.header.ancount = reply.answers.len() as u16;

            let _ = socket.send_to(&reply.to_bytes(), peer).await;
        }
    });

    addr
}

#[tokio::test]
async fn wildcard_static_ancestor_need_not_be_the_nearest_one() {
    // The nearest ancestor, sub.wild.example.com, classifies `None` on
    // its own; the non-nearest root ancestor, wild.example.com, is
    // static and intersects the candidate's records. The overall
    // classification must still come back `Static`.
    let ip = [198, 51, 100, 44];
    let addr = spawn_non_nearest_ancestor_stub(ip).await;
    let pool = pool_over_stub(addr).await;

    let records = pool
        .query("leaf.sub.wild.example.com", DNSResourceType::A, Priority::Normal)
        .await
        .unwrap()
        .extract();

    let kind = pool
        .wildcard_type("leaf.sub.wild.example.com", "wild.example.com", &records)
        .await;
    assert_eq!(kind, WildcardType::Static);
}

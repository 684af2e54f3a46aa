//! One upstream server (§4.4): UDP socket lifecycle, rate-limited
//! writer, reader(s), timeout reaper, and TCP fallback on truncation.
//! A small fixed set of long-lived tasks cooperate over channels, per
//! the §5 concurrency model — no lock is held across network I/O.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::config::ResolverConfig;
use crate::dns::{DNSPacket, DNSResourceType};
use crate::error::DnsError;
use crate::exchange::{ExchangeEntry, ExchangeKey, ExchangeTable};
use crate::failure_detector::FailureWindow;
use crate::priority::Priority;

/// The small polymorphic surface every resolver variant implements (§9):
/// `Query`, `Stop`, `Stopped`, `String`. `WildcardType` lives on `Pool`,
/// since it is meaningful only at the pool level (§4.7).
#[async_trait]
pub trait Resolver: fmt::Display + Send + Sync {
    async fn query(
        &self,
        name: &str,
        qtype: DNSResourceType,
        priority: Priority,
    ) -> Result<DNSPacket, DnsError>;
    fn stop(&self);
    fn stopped(&self) -> bool;
}

struct WriteJob {
    key: ExchangeKey,
    bytes: Vec<u8>,
}

/// One upstream DNS server.
pub struct BaseResolver {
    config: ResolverConfig,
    exchanges: Arc<ExchangeTable>,
    rate_limiter: Arc<crate::rate_limiter::DnsRateLimiter>,
    pub(crate) failure_window: Arc<FailureWindow>,
    stopped: Arc<AtomicBool>,
    next_id: AtomicU16,
    sockets: Arc<Mutex<VecDeque<Arc<UdpSocket>>>>,
    write_txs: [mpsc::UnboundedSender<WriteJob>; 4],
    shutdown: broadcast::Sender<()>,
}

impl fmt::Display for BaseResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config.label)
    }
}

impl BaseResolver {
    pub async fn new(config: ResolverConfig) -> std::io::Result<Arc<Self>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(config.addr).await?;
        let socket = Arc::new(socket);

        let (shutdown, _) = broadcast::channel(1);
        let (c_tx, c_rx) = mpsc::unbounded_channel();
        let (h_tx, h_rx) = mpsc::unbounded_channel();
        let (n_tx, n_rx) = mpsc::unbounded_channel();
        let (l_tx, l_rx) = mpsc::unbounded_channel();

        let resolver = Arc::new(Self {
            rate_limiter: Arc::new(crate::rate_limiter::DnsRateLimiter::new(
                config.rate_limit,
            )),
            failure_window: Arc::new(FailureWindow::new(config.failure_window)),
            exchanges: Arc::new(ExchangeTable::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU16::new(1),
            sockets: Arc::new(Mutex::new(VecDeque::from([socket.clone()]))),
            write_txs: [c_tx, h_tx, n_tx, l_tx],
            shutdown,
            config,
        });

        resolver.clone().spawn_reader(socket);
        resolver.clone().spawn_writer(c_rx, h_rx, n_rx, l_rx);
        resolver.clone().spawn_reaper();
        resolver.clone().spawn_rotator();
        Ok(resolver)
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Feeds an outcome to the failure detector and stops the resolver
    /// if it trips (§4.5).
    fn observe(&self, timed_out: bool) {
        if self.failure_window.record(timed_out) {
            self.stop();
        }
    }

    /// Allocates a transaction id not currently present in the exchange
    /// table for `(id, name)` (§4.4 step 2). Scans forward from the
    /// counter for at most one full pass of the id space so a collision
    /// against a long-lived outstanding query for the same popular name
    /// is skipped rather than handed back to the caller.
    fn allocate_key(&self, name: &str) -> Option<ExchangeKey> {
        for _ in 0..=u16::MAX {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let key = ExchangeKey::new(id, name);
            if !self.exchanges.contains(&key) {
                return Some(key);
            }
        }
        None
    }

    fn enqueue_write(&self, priority: Priority, key: ExchangeKey, bytes: Vec<u8>) {
        let tx = match priority {
            Priority::Critical => &self.write_txs[0],
            Priority::High => &self.write_txs[1],
            Priority::Normal => &self.write_txs[2],
            Priority::Low => &self.write_txs[3],
        };
        let _ = tx.send(WriteJob { key, bytes });
    }

    fn spawn_writer(
        self: Arc<Self>,
        mut critical: mpsc::UnboundedReceiver<WriteJob>,
        mut high: mpsc::UnboundedReceiver<WriteJob>,
        mut normal: mpsc::UnboundedReceiver<WriteJob>,
        mut low: mpsc::UnboundedReceiver<WriteJob>,
    ) {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    Some(job) = critical.recv() => job,
                    Some(job) = high.recv() => job,
                    Some(job) = normal.recv() => job,
                    Some(job) = low.recv() => job,
                    else => break,
                };
                // rate-limit acquisition must not block past shutdown (§4.3).
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = self.rate_limiter.acquire() => {}
                }
                self.write_job(job).await;
            }
        });
    }

    async fn write_job(&self, job: WriteJob) {
        let socket = self.sockets.lock().front().cloned();
        let Some(socket) = socket else {
            self.exchanges.remove(&job.key, Err(DnsError::ResolverErr("no socket".into())));
            return;
        };

        match tokio::time::timeout(self.config.write_timeout, socket.send(&job.bytes)).await {
            Ok(Ok(_)) => self.exchanges.update_timestamp(&job.key),
            Ok(Err(e)) => {
                warn!(resolver = %self.config.label, error = %e, "udp write failed");
                self.observe(true);
                self.exchanges
                    .remove(&job.key, Err(DnsError::ResolverErr(e.to_string())));
            }
            Err(_elapsed) => {
                self.observe(true);
                self.exchanges.remove(&job.key, Err(DnsError::Timeout));
            }
        }
    }

    fn spawn_reader(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    result = tokio::time::timeout(Duration::from_millis(500), socket.recv(&mut buf)) => {
                        match result {
                            Ok(Ok(n)) => self.clone().handle_datagram(buf[..n].to_vec()).await,
                            Ok(Err(_)) => break,
                            Err(_elapsed) => {
                                let still_active = self
                                    .sockets
                                    .lock()
                                    .iter()
                                    .any(|s| Arc::ptr_eq(s, &socket));
                                if !still_active {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    async fn handle_datagram(self: Arc<Self>, bytes: Vec<u8>) {
        let reply = match DNSPacket::parse(&bytes) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(resolver = %self.config.label, error = ?e, "dropping malformed reply");
                return;
            }
        };
        let id = reply.header.id;
        let name = reply.question_name();
        let key = ExchangeKey::new(id, name);

        if reply.header.tc {
            self.clone().handle_truncated(key, reply).await;
            return;
        }

        let rcode = crate::dns::ResponseCode::from(reply.header.rcode);
        self.observe(false);
        let outcome = match rcode {
            crate::dns::ResponseCode::NoError => Ok(reply),
            crate::dns::ResponseCode::NameError => Err(DnsError::NameError),
            other => Err(DnsError::ServerError(other)),
        };
        self.exchanges.remove(&key, outcome);
    }

    async fn handle_truncated(self: Arc<Self>, key: ExchangeKey, _udp_reply: DNSPacket) {
        let Some(outgoing) = self.exchanges.peek_outgoing(&key) else {
            return;
        };
        let bytes = outgoing.to_bytes();
        let outcome = self.send_tcp(&bytes).await;
        self.observe(outcome.is_err());
        self.exchanges.remove(&key, outcome);
    }

    async fn send_tcp(&self, bytes: &[u8]) -> Result<DNSPacket, DnsError> {
        tokio::time::timeout(self.config.tcp_timeout, self.send_tcp_inner(bytes))
            .await
            .map_err(|_| DnsError::Timeout)?
    }

    async fn send_tcp_inner(&self, bytes: &[u8]) -> Result<DNSPacket, DnsError> {
        let mut stream = TcpStream::connect(self.config.addr)
            .await
            .map_err(DnsError::from)?;

        let len = bytes.len() as u16;
        stream.write_all(&len.to_be_bytes()).await.map_err(DnsError::from)?;
        stream.write_all(bytes).await.map_err(DnsError::from)?;
        stream.flush().await.map_err(DnsError::from)?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await.map_err(DnsError::from)?;
        let reply_len = u16::from_be_bytes(len_buf) as usize;

        let mut reply_buf = vec![0u8; reply_len];
        stream.read_exact(&mut reply_buf).await.map_err(DnsError::from)?;

        DNSPacket::parse(&reply_buf).map_err(DnsError::from)
    }

    fn spawn_reaper(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(self.config.reap_interval) => {}
                }
                // re-read query_timeout on every tick rather than caching it (§9).
                let reaped = self.exchanges.remove_expired(self.config.query_timeout);
                for _ in 0..reaped {
                    self.observe(true);
                }
                if self.stopped.load(Ordering::Relaxed) {
                    break;
                }
            }
        });
    }

    fn spawn_rotator(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(self.config.rotation_interval) => {}
                }
                if self.stopped.load(Ordering::Relaxed) {
                    break;
                }
                let fresh = match UdpSocket::bind("0.0.0.0:0").await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(resolver = %self.config.label, error = %e, "socket rotation failed");
                        continue;
                    }
                };
                if fresh.connect(self.config.addr).await.is_err() {
                    continue;
                }
                let fresh = Arc::new(fresh);
                self.clone().spawn_reader(fresh.clone());
                let mut sockets = self.sockets.lock();
                sockets.push_front(fresh);
                while sockets.len() > 2 {
                    sockets.pop_back();
                }
            }
        });
    }
}

#[async_trait]
impl Resolver for BaseResolver {
    async fn query(
        &self,
        name: &str,
        qtype: DNSResourceType,
        priority: Priority,
    ) -> Result<DNSPacket, DnsError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Err(DnsError::ResolverUnavailable);
        }

        // `allocate_key` already checks liveness against the table, but a
        // concurrent caller can still win the race between that check and
        // `add` below; retry with a freshly allocated id rather than
        // failing the caller on what the spec treats as a transient
        // collision (§4.4 step 2).
        let (key, packet, rx) = {
            let mut attempt = None;
            for _ in 0..4 {
                let Some(key) = self.allocate_key(name) else {
                    return Err(DnsError::ResolverErr("exchange id space exhausted".into()));
                };
                let packet = DNSPacket::build_forward(key.id, name, qtype);
                let (entry, rx) = ExchangeEntry::new(key.clone(), packet.clone());
                match self.exchanges.add(entry) {
                    Ok(()) => {
                        attempt = Some((key, packet, rx));
                        break;
                    }
                    Err(_rejected) => continue,
                }
            }
            match attempt {
                Some(v) => v,
                None => return Err(DnsError::ResolverErr("duplicate exchange id".into())),
            }
        };

        self.enqueue_write(priority, key.clone(), packet.to_bytes());

        let wait = self.config.query_timeout + Duration::from_millis(500);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(DnsError::ResolverUnavailable),
            Err(_elapsed) => {
                self.exchanges.remove(&key, Err(DnsError::Timeout));
                Err(DnsError::Timeout)
            }
        }
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::Relaxed) {
            return;
        }
        debug!(resolver = %self.config.label, "stopping resolver");
        let _ = self.shutdown.send(());
        self.exchanges.remove_all();
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket as TokioUdpSocket;

    async fn stub_resolver_config() -> (ResolverConfig, TokioUdpSocket) {
        let stub = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = stub.local_addr().unwrap();
        let mut cfg = ResolverConfig::new(addr);
        cfg.query_timeout = Duration::from_millis(300);
        cfg.reap_interval = Duration::from_millis(50);
        (cfg, stub)
    }

    #[tokio::test]
    async fn timeout_reaping_completes_caller_and_drains_table() {
        let (cfg, _blackhole) = stub_resolver_config().await;
        let resolver = BaseResolver::new(cfg).await.unwrap();

        let result = resolver.query("black.hole.example", DNSResourceType::A, Priority::Normal).await;
        assert!(matches!(result, Err(DnsError::Timeout)));
        assert_eq!(resolver.exchange_count(), 0);
    }

    #[tokio::test]
    async fn stop_marks_stopped_and_rejects_new_queries() {
        let (cfg, _stub) = stub_resolver_config().await;
        let resolver = BaseResolver::new(cfg).await.unwrap();
        resolver.stop();
        assert!(resolver.stopped());
        let result = resolver.query("example.com", DNSResourceType::A, Priority::Normal).await;
        assert!(matches!(result, Err(DnsError::ResolverUnavailable)));
    }

    #[tokio::test]
    async fn allocate_key_skips_ids_already_outstanding_for_the_same_name() {
        let (cfg, _blackhole) = stub_resolver_config().await;
        let resolver = BaseResolver::new(cfg).await.unwrap();

        // force the counter to collide on its very next value so the
        // skip-if-outstanding loop in `allocate_key` has to do real work.
        let occupied = resolver.allocate_key("busy.example.com").unwrap();
        resolver.next_id.store(occupied.id, Ordering::Relaxed);
        let (entry, _rx) = ExchangeEntry::new(occupied.clone(), DNSPacket::build_forward(occupied.id, "busy.example.com", DNSResourceType::A));
        resolver.exchanges.add(entry).unwrap();

        let next = resolver.allocate_key("busy.example.com").unwrap();
        assert_ne!(next.id, occupied.id);
        assert!(!resolver.exchanges.contains(&next));
    }

    #[tokio::test]
    async fn truncated_udp_reply_triggers_a_single_tcp_reissue() {
        use tokio::net::TcpListener;
        use crate::dns::{DNSHeader, DNSResource, DNSResourceClass};

        let udp = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        let tcp = TcpListener::bind(addr).await.unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let Ok((n, peer)) = udp.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(query) = DNSPacket::parse(&buf[..n]) else {
                    continue;
                };
                let mut header = DNSHeader::new_query(query.header.id);
                header.qr = true;
                header.tc = true;
                let reply = DNSPacket {
                    header,
                    questions: query.questions.clone(),
                    answers: Vec::new(),
                    authorities: Vec::new(),
                    additional: Vec::new(),
                };
                let _ = udp.send_to(&reply.to_bytes(), peer).await;
            }
        });

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _peer)) = tcp.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut len_buf = [0u8; 2];
                    if stream.read_exact(&mut len_buf).await.is_err() {
                        return;
                    }
                    let len = u16::from_be_bytes(len_buf) as usize;
                    let mut buf = vec![0u8; len];
                    if stream.read_exact(&mut buf).await.is_err() {
                        return;
                    }
                    let Ok(query) = DNSPacket::parse(&buf) else {
                        return;
                    };

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
                        labels: query.questions[0].labels.clone(),
                        rtype: DNSResourceType::A,
                        raw_class: DNSResourceClass::IN.into(),
                        ttl: 300,
                        rdata: vec![203, 0, 113, 42],
                    });
                    reply.header.ancount = reply.answers.len() as u16;

                    let bytes = reply.to_bytes();
                    let len = bytes.len() as u16;
                    let _ = stream.write_all(&len.to_be_bytes()).await;
                    let _ = stream.write_all(&bytes).await;
                });
            }
        });

        let mut cfg = ResolverConfig::new(addr);
        cfg.query_timeout = Duration::from_secs(2);
        let resolver = BaseResolver::new(cfg).await.unwrap();

        let reply = resolver
            .query("trunc.example.com", DNSResourceType::A, Priority::Normal)
            .await
            .expect("truncated reply should be reissued over tcp");

        assert_eq!(reply.answers.len(), 1);
        assert_eq!(reply.answers[0].rdata, vec![203, 0, 113, 42]);
        assert_eq!(resolver.exchange_count(), 0);
    }
}

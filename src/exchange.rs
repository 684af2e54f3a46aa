//! Per-resolver table of outstanding queries (§4.2). Keyed by (id,
//! normalised question name); an entry disappears exactly once, via
//! `remove`, `remove_expired`, or `remove_all`.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::dns::DNSPacket;
use crate::error::DnsError;

/// Result handed to whichever caller is waiting on an exchange entry.
pub type QueryOutcome = Result<DNSPacket, DnsError>;

#[derive(Hash, PartialEq, Eq, Clone, Debug)]
pub struct ExchangeKey {
    pub id: u16,
    pub name: String,
}

impl ExchangeKey {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: crate::dns::normalize_name(&name.into()),
        }
    }
}

pub struct ExchangeEntry {
    pub key: ExchangeKey,
    /// Zero means "queued but not yet transmitted" (§4.2): the reaper
    /// must never expire such an entry.
    pub timestamp: Option<Instant>,
    pub outgoing: DNSPacket,
    completion: Option<oneshot::Sender<QueryOutcome>>,
}

impl ExchangeEntry {
    pub fn new(key: ExchangeKey, outgoing: DNSPacket) -> (Self, oneshot::Receiver<QueryOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                key,
                timestamp: None,
                outgoing,
                completion: Some(tx),
            },
            rx,
        )
    }

    fn complete(&mut self, outcome: QueryOutcome) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }
}

/// Outstanding-query table for one base resolver.
#[derive(Default)]
pub struct ExchangeTable {
    entries: DashMap<ExchangeKey, ExchangeEntry>,
}

impl ExchangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `add(entry)`: fails (returns the entry back) if the key already
    /// exists (§4.2 invariant: keys are unique within one resolver).
    pub fn add(&self, entry: ExchangeEntry) -> Result<(), ExchangeEntry> {
        if self.entries.contains_key(&entry.key) {
            return Err(entry);
        }
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Whether `key` is currently outstanding, used by id allocation to
    /// skip ids already in use for a given name (§4.4 step 2).
    pub fn contains(&self, key: &ExchangeKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Marks the moment the message was actually put on the wire.
    pub fn update_timestamp(&self, key: &ExchangeKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.timestamp = Some(Instant::now());
        }
    }

    /// Clones the outgoing message for an in-flight entry without
    /// removing it, so a truncated-reply handler can reissue it over
    /// TCP while the entry stays reachable for the eventual completion.
    pub fn peek_outgoing(&self, key: &ExchangeKey) -> Option<DNSPacket> {
        self.entries.get(key).map(|e| e.outgoing.clone())
    }

    /// Removes and completes the entry for (id, name), if present.
    pub fn remove(&self, key: &ExchangeKey, outcome: QueryOutcome) -> bool {
        if let Some((_, mut entry)) = self.entries.remove(key) {
            entry.complete(outcome);
            true
        } else {
            false
        }
    }

    /// Sweeps entries whose `now - timestamp > query_timeout`, completing
    /// each with `DnsError::Timeout`. Entries with no timestamp yet
    /// (still queued) are left alone.
    pub fn remove_expired(&self, query_timeout: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<ExchangeKey> = self
            .entries
            .iter()
            .filter_map(|entry| match entry.timestamp {
                Some(ts) if now.duration_since(ts) > query_timeout => Some(entry.key.clone()),
                _ => None,
            })
            .collect();

        let count = expired.len();
        for key in expired {
            self.remove(&key, Err(DnsError::Timeout));
        }
        count
    }

    /// Drains every outstanding entry on shutdown, completing each with
    /// `DnsError::ResolverUnavailable`.
    pub fn remove_all(&self) {
        let keys: Vec<ExchangeKey> = self.entries.iter().map(|e| e.key.clone()).collect();
        for key in keys {
            self.remove(&key, Err(DnsError::ResolverUnavailable));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

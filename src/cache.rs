//! Query cache: positive and negative caching keyed on (qname, qtype,
//! qclass), grounded on the teacher's `cache::{CacheKey, CacheEntry}`
//! (lowercased-name fingerprint key, TTL-bearing entry, lazy expiry on
//! lookup) generalized to negative entries via SOA MINIMUM (spec.md
//! §4.4) and a hard cap on live entries with eager eviction instead of
//! the teacher's `DomainTrie` prefix structure, which this resolver has
//! no use for since it never answers wildcard/zone queries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::wire::{Message, RecordClass, RecordType, ResourceRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: String,
    qtype: RecordType,
    qclass: RecordClass,
}

impl CacheKey {
    pub fn new(qname: &str, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            name: qname.trim_end_matches('.').to_ascii_lowercase(),
            qtype,
            qclass,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CacheValue {
    Positive(Vec<ResourceRecord>),
    /// NXDOMAIN or NODATA, cached only when an SOA with a usable MINIMUM
    /// accompanied the response (spec.md §4.4: "a NODATA response with
    /// no SOA in the authority section is not cached").
    Negative,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

pub struct Cache {
    entries: HashMap<CacheKey, CacheEntry>,
    max_ttl: Duration,
    max_entries: usize,
}

impl Cache {
    pub fn new(max_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_ttl,
            max_entries,
        }
    }

    pub fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<CacheValue> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a positive answer. TTL is the minimum of the answer
    /// RRset's own TTLs, capped by `max_ttl`.
    pub fn insert_positive(&mut self, key: CacheKey, records: Vec<ResourceRecord>, now: Instant) {
        if records.is_empty() {
            return;
        }
        let min_ttl = records.iter().map(|r| r.ttl).min().unwrap_or(0);
        let ttl = Duration::from_secs(min_ttl as u64).min(self.max_ttl);
        self.evict_if_over_capacity(now);
        self.entries.insert(
            key,
            CacheEntry {
                value: CacheValue::Positive(records),
                inserted_at: now,
                ttl,
            },
        );
    }

    /// Insert a negative entry, TTL from the SOA MINIMUM, capped by
    /// `max_ttl`. Callers must have already verified an SOA was present.
    pub fn insert_negative(&mut self, key: CacheKey, soa_minimum: u32, now: Instant) {
        let ttl = Duration::from_secs(soa_minimum as u64).min(self.max_ttl);
        self.evict_if_over_capacity(now);
        self.entries.insert(
            key,
            CacheEntry {
                value: CacheValue::Negative,
                inserted_at: now,
                ttl,
            },
        );
    }

    fn evict_if_over_capacity(&mut self, now: Instant) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.entries.retain(|_, entry| !entry.is_expired(now));
        if self.entries.len() >= self.max_entries {
            // still over: drop the entry with the least remaining life.
            if let Some(key) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.ttl.saturating_sub(now.duration_since(e.inserted_at)))
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract the records and SOA-derived negative-cache eligibility from a
/// decoded response, for the caller to feed into `insert_positive` /
/// `insert_negative` (spec.md §4.4).
pub fn cacheable_outcome(message: &Message) -> Outcome {
    if !message.answers.is_empty() {
        return Outcome::Positive(message.answers.clone());
    }
    let soa_minimum = message
        .authorities
        .iter()
        .find_map(|rr| rr.rdata.soa_minimum());
    match soa_minimum {
        Some(minimum) => Outcome::Negative { soa_minimum: minimum },
        None => Outcome::NotCacheable,
    }
}

pub enum Outcome {
    Positive(Vec<ResourceRecord>),
    Negative { soa_minimum: u32 },
    NotCacheable,
}

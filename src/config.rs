use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::flags::Flags;

/// Channel configuration snapshot.
///
/// Plain public fields with a `Default` impl, in the shape of the
/// teacher's `DnsConfig` — copy-on-init, and `Channel::save_options`
/// hands back a `Clone` of exactly this struct (spec.md §4.7). Derives
/// `Serialize`/`Deserialize` so hosts can persist and reload it as JSON
/// the way the teacher's own config loader round-trips `DnsConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configured recursive servers, in preference order.
    pub servers: Vec<SocketAddr>,

    /// Option flags (EDNS, NOROTATE, NOSEARCH, STAYOPEN, ...).
    pub flags: Flags,

    /// Per-try timeout before a query is considered timed out on its
    /// current server and re-dispatched.
    pub timeout: Duration,

    /// Number of tries per server before giving up entirely
    /// (spec.md §4.5: "after `tries x servers` total attempts").
    pub tries: u32,

    /// Search-list suffixes, applied in order to short names.
    pub search: Vec<String>,

    /// Names with fewer than this many dots are subject to search-list
    /// expansion.
    pub ndots: u32,

    /// Maximum number of queries a single UDP socket may carry before
    /// it is retired and a fresh one opened on next use.
    pub udp_max_queries: u32,

    /// EDNS UDP payload size advertised in outgoing OPT records
    /// (RFC 6891 default 1232).
    pub udp_payload_size: u16,

    /// Upper bound on how long a cache entry may live, regardless of
    /// the RRset's own TTL.
    pub qcache_max_ttl: Duration,

    /// Probability (0.0..=1.0) that a cooled-down failed server is
    /// probed out-of-band on the next initial query (spec.md §4.3).
    pub retry_chance: f64,

    /// Cool-down period before a failed server becomes probe-eligible.
    pub retry_delay: Duration,

    /// Whether the bounded query cache is enabled at all.
    pub query_cache: bool,

    /// Whether server failover on SERVFAIL/NOTIMP/REFUSED is enabled;
    /// mirrors `NOCHECKRESP` but expressed as a positive knob for
    /// callers that construct `Config` directly rather than via flags.
    pub server_failover: bool,

    /// Bound on the number of live cache entries before lazy eviction
    /// sweeps eagerly instead of only on lookup.
    pub qcache_max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            flags: Flags::empty(),
            timeout: Duration::from_millis(2000),
            tries: 3,
            search: Vec::new(),
            ndots: 1,
            udp_max_queries: 0, // 0 == unlimited, matches c-ares semantics
            udp_payload_size: 1232,
            qcache_max_ttl: Duration::from_secs(3600),
            retry_chance: 0.0,
            retry_delay: Duration::from_secs(30),
            query_cache: true,
            server_failover: true,
            qcache_max_entries: 8192,
        }
    }
}

impl Config {
    pub fn with_servers(servers: Vec<SocketAddr>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    pub fn set_servers(&mut self, servers: Vec<SocketAddr>) {
        self.servers = servers;
    }

    /// `get_servers`-equivalent: a CSV rendering of the configured
    /// servers, matching the public operation named in spec.md §6.
    pub fn servers_csv(&self) -> String {
        self.servers
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

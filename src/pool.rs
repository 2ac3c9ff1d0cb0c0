//! Server pool: per-server health tracking, dispatch ordering, and
//! cool-down probing, grounded on the teacher's `resolver::ServerHealth`
//! (consecutive-failure count, exponential backoff `should_retry_health_check`)
//! generalized from tokio-interval health checks to the host-driven
//! model's "probe on next initial query" scheme (spec.md §4.3).

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::{RngCore, SeedableRng};

use crate::flags::Flags;
use crate::wire::cookie::ServerCookieState;

/// Dense index into the server pool, in the style of `slab::Slab`'s own
/// key type rather than pulling in a second arena crate just for this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub usize);

#[derive(Debug, Clone)]
pub struct ServerEntry {
    pub address: SocketAddr,
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    pub cookie: ServerCookieState,
    /// Set while a cool-down probe is outstanding, so at most one probe
    /// per server is in flight at a time (spec.md §4.3).
    pub probe_outstanding: bool,
}

impl ServerEntry {
    fn new(address: SocketAddr) -> Self {
        Self {
            address,
            consecutive_failures: 0,
            last_failure: None,
            cookie: ServerCookieState::default(),
            probe_outstanding: false,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
        self.probe_outstanding = false;
    }

    fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.last_failure = Some(now);
        self.probe_outstanding = false;
    }

    fn cooled_down(&self, now: Instant, retry_delay: Duration) -> bool {
        match self.last_failure {
            Some(last) => now.duration_since(last) >= retry_delay,
            None => false,
        }
    }
}

pub struct ServerPool {
    servers: Vec<ServerEntry>,
    /// Dispatch preference as a permutation of `ServerId`s, kept separate
    /// from `servers` so that a `ServerId` — stored long-term in
    /// `Connection::server` and `Query::current_server` — always stays a
    /// valid, stable index into `servers` no matter how dispatch
    /// preference is reshuffled (spec.md §9: dense ids over cyclic
    /// references; a rotation that moved entries in `servers` itself
    /// would dangle every `ServerId` issued before the rotation).
    order: Vec<ServerId>,
    no_rotate: bool,
}

impl ServerPool {
    pub fn new(addresses: Vec<SocketAddr>, flags: Flags) -> Self {
        let servers: Vec<ServerEntry> = addresses.into_iter().map(ServerEntry::new).collect();
        let order = (0..servers.len()).map(ServerId).collect();
        Self {
            servers,
            order,
            no_rotate: flags.contains(Flags::NOROTATE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn get(&self, id: ServerId) -> Option<&ServerEntry> {
        self.servers.get(id.0)
    }

    pub fn get_mut(&mut self, id: ServerId) -> Option<&mut ServerEntry> {
        self.servers.get_mut(id.0)
    }

    /// Dispatch order for a fresh query: servers in rotation-preference
    /// order, healthy ones first, then unhealthy ones, each group stable
    /// within itself. `NOROTATE` only affects whether success reorders
    /// that preference, never the healthy/unhealthy partitioning itself.
    pub fn dispatch_order(&self) -> Vec<ServerId> {
        let mut order = self.order.clone();
        order.sort_by_key(|id| self.servers[id.0].consecutive_failures > 0);
        order
    }

    /// Called after a query completes successfully on `id`. Per
    /// spec.md §4.3, the server moves to the front of the dispatch
    /// order only if its failure count is *already* zero, i.e. it was
    /// healthy and first-ranked already -- a server recovering from
    /// failure simply rejoins the healthy group in its existing
    /// configured-index position, it doesn't jump the queue. Skipped
    /// entirely under `NOROTATE`.
    pub fn record_success(&mut self, id: ServerId) {
        let Some(entry) = self.servers.get_mut(id.0) else {
            return;
        };
        let already_healthy = entry.consecutive_failures == 0;
        entry.record_success();
        if already_healthy && !self.no_rotate {
            if let Some(pos) = self.order.iter().position(|&o| o == id) {
                let id = self.order.remove(pos);
                self.order.insert(0, id);
            }
        }
    }

    pub fn record_failure(&mut self, id: ServerId, now: Instant) {
        if let Some(entry) = self.servers.get_mut(id.0) {
            entry.record_failure(now);
        }
    }

    /// Whether an unhealthy, cooled-down server should be opportunistically
    /// probed on this initial query, per `retry_chance` (spec.md §4.3).
    /// Only one probe may be outstanding per server at a time.
    pub fn should_probe(
        &mut self,
        id: ServerId,
        now: Instant,
        retry_delay: Duration,
        retry_chance: f64,
        rng: &mut dyn RngCore,
    ) -> bool {
        let Some(entry) = self.servers.get_mut(id.0) else {
            return false;
        };
        if entry.is_healthy() || entry.probe_outstanding || retry_chance <= 0.0 {
            return false;
        }
        if !entry.cooled_down(now, retry_delay) {
            return false;
        }
        let roll = (rng.next_u32() as f64) / (u32::MAX as f64);
        if roll < retry_chance {
            entry.probe_outstanding = true;
            true
        } else {
            false
        }
    }

    /// The oldest-failing, cooled-down, probe-eligible server, if any
    /// (spec.md §4.3: "the oldest eligible failed server"). Does not
    /// itself roll the Bernoulli trial; callers pair this with
    /// `should_probe`.
    pub fn oldest_probe_candidate(&self, now: Instant, retry_delay: Duration) -> Option<ServerId> {
        self.servers
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_healthy() && !e.probe_outstanding && e.cooled_down(now, retry_delay))
            .min_by_key(|(_, e)| e.last_failure)
            .map(|(i, _)| ServerId(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServerId, &ServerEntry)> {
        self.servers
            .iter()
            .enumerate()
            .map(|(i, e)| (ServerId(i), e))
    }
}

//! Channel: the top-level handle wiring config, server pool, connection
//! manager, query arena, and cache into the public surface (spec.md
//! §4.7), grounded on the teacher's `DnsResolver` as the one long-lived
//! object callers hold, generalized from an async struct with its own
//! background tasks to a plain value the host drives via `event`.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use rand::{RngCore, SeedableRng};
use tracing::info;

use crate::config::Config;
use crate::engine::{Engine, ServerStateCallback};
use crate::event::{self, Interest};
use crate::pool::ServerId;
use crate::query::QueryOutcome;
use crate::socket::{SocketFunctions, StdSocketFunctions};
use crate::status::Status;
use crate::wire::{RecordClass, RecordType};

pub type SocketCallback = Box<dyn FnMut(i32, bool)>;

/// A resolver channel. One per independent resolution context, mirroring
/// c-ares's `ares_channel` and the teacher's single `DnsResolver`
/// instance (spec.md §9 "one Channel per independent resolver context").
pub struct Channel {
    engine: Engine,
    socket_cb: Option<SocketCallback>,
    local_ip4: Option<std::net::Ipv4Addr>,
    local_ip6: Option<std::net::Ipv6Addr>,
    local_dev: Option<String>,
}

impl Channel {
    pub fn new(config: Config) -> Self {
        Self::with_sockets(config, Box::new(StdSocketFunctions::default()))
    }

    pub fn with_sockets(config: Config, sockets: Box<dyn SocketFunctions>) -> Self {
        let rng: Box<dyn RngCore> = Box::new(rand::rngs::StdRng::from_os_rng());
        Self {
            engine: Engine::new(config, sockets, rng),
            socket_cb: None,
            local_ip4: None,
            local_ip6: None,
            local_dev: None,
        }
    }

    /// Submit a fully specified query (spec.md §4.5, §4.7, §6): `name`
    /// is sent exactly as given, with no search-list expansion,
    /// regardless of `NOSEARCH`. The callback fires exactly once,
    /// possibly synchronously for a cache hit.
    pub fn query(
        &mut self,
        name: &str,
        qtype: RecordType,
        qclass: RecordClass,
        callback: impl FnOnce(QueryOutcome) + 'static,
    ) {
        self.engine.submit(name, qtype, qclass, callback, Instant::now());
    }

    /// Explicit search-list resolution entry point: always subject to
    /// ndots/search-list expansion, independent of `NOSEARCH` -- that
    /// flag only governs whether `query` expands, never `search`.
    /// Exposed separately because c-ares callers rely on `ares_search`
    /// having that distinct guarantee from `ares_query` (spec.md §4.7).
    pub fn search(
        &mut self,
        name: &str,
        qtype: RecordType,
        qclass: RecordClass,
        callback: impl FnOnce(QueryOutcome) + 'static,
    ) {
        self.engine.submit_search(name, qtype, qclass, callback, Instant::now());
    }

    pub fn set_servers(&mut self, servers: Vec<SocketAddr>) {
        self.engine.set_servers(servers, Instant::now());
    }

    /// Configured server list in original, set order (spec.md §6
    /// `get_servers`) -- independent of live dispatch preference, which
    /// `dispatch_order` exposes separately.
    pub fn get_servers(&self) -> Vec<SocketAddr> {
        self.engine.servers.iter().map(|(_, s)| s.address).collect()
    }

    /// Current dispatch preference, healthiest/most-recently-successful
    /// server first (spec.md §4.3), as addresses. Distinct from
    /// `get_servers`, which always reflects configured order.
    pub fn dispatch_order(&self) -> Vec<SocketAddr> {
        self.engine
            .servers
            .dispatch_order()
            .into_iter()
            .filter_map(|id| self.engine.servers.get(id).map(|s| s.address))
            .collect()
    }

    pub fn set_local_ip4(&mut self, addr: std::net::Ipv4Addr) {
        self.local_ip4 = Some(addr);
    }

    pub fn set_local_ip6(&mut self, addr: std::net::Ipv6Addr) {
        self.local_ip6 = Some(addr);
    }

    pub fn set_local_dev(&mut self, name: &str) {
        self.local_dev = Some(name.to_string());
    }

    pub fn local_ip(&self) -> Option<IpAddr> {
        self.local_ip4
            .map(IpAddr::V4)
            .or(self.local_ip6.map(IpAddr::V6))
    }

    pub fn set_socket_callback(&mut self, cb: SocketCallback) {
        self.socket_cb = Some(cb);
    }

    pub fn set_server_state_callback(&mut self, cb: ServerStateCallback) {
        self.engine.set_server_state_callback(cb);
    }

    pub fn set_socket_functions(&mut self, sockets: Box<dyn SocketFunctions>) {
        self.engine.set_sockets(sockets);
    }

    pub fn save_options(&self) -> Config {
        self.engine.config.clone()
    }

    /// Cancel every in-flight query, firing `ECANCELLED` (spec.md §4.7).
    /// Unlike `destroy`, the channel remains usable afterward.
    pub fn cancel(&mut self) {
        self.engine.cancel_all(Status::ECancelled);
    }

    /// Cancel every in-flight query with `EDESTRUCTION` and leave the
    /// channel in a state where it must not be used again (spec.md
    /// §4.7's open question: resolved as "cancel with EDESTRUCTION,
    /// consistent with c-ares's `ares_destroy` semantics" -- see
    /// DESIGN.md).
    pub fn destroy(mut self) {
        self.engine.cancel_all(Status::EDestruction);
        info!("channel destroyed");
    }

    /// Re-initialize configuration in place. In-flight queries whose
    /// server is still present in the new configuration are re-homed
    /// and keep running; queries whose server was removed are
    /// cancelled with `ENOTFOUND` (spec.md §4.7, open question --
    /// see DESIGN.md).
    pub fn reinit(&mut self, config: Config) {
        self.engine.reinit(config, Instant::now());
    }

    /// Produce an independent channel sharing this one's configuration
    /// but with its own server health state, arena, and cache (spec.md
    /// §4.7 `dup`).
    pub fn dup(&self) -> Channel {
        Channel::new(self.engine.config.clone())
    }

    // --- Event interface (spec.md §5) ---

    pub fn sockets_of_interest(&self) -> Vec<Interest> {
        event::sockets_of_interest(&self.engine.connections)
    }

    pub fn process_fd(&mut self, connection_fd: i32, readable: bool, _writable: bool) {
        let now = Instant::now();
        if let Some((id, _)) = self
            .engine
            .connections
            .iter()
            .find(|(_, c)| c.fd == connection_fd)
        {
            if readable {
                self.engine.on_readable(id, now);
            }
        }
        self.engine.poll_timeouts(now);
    }

    pub fn timeout_until_next(&self) -> Option<std::time::Duration> {
        event::timeout_until_next(self.engine.next_deadline(), Instant::now())
    }

    /// Drive the timeout sweep without a readable fd, for hosts whose
    /// reactor woke them purely on the `timeout_until_next` deadline.
    pub fn poll_timeouts(&mut self) {
        self.engine.poll_timeouts(Instant::now());
    }

    pub fn server_health(&self, id: ServerId) -> Option<bool> {
        self.engine.servers.get(id).map(|s| s.is_healthy())
    }
}

//! The query engine: the state machine tying together the cache, server
//! pool, connection manager, and wire codec (spec.md §4.5).
//!
//! Grounded on the teacher's `resolver::{resolve, resolve_recursively,
//! query_upstream}` control flow (try cache, then upstream, handle
//! TC/SERVFAIL/timeout) generalized from tokio `select!`/`spawn` into an
//! explicit, host-driven step function with no internal scheduling of
//! its own.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use rand::RngCore;
use tracing::{debug, trace, warn};

use crate::cache::{self, Cache, CacheKey, CacheValue, Outcome as CacheOutcome};
use crate::config::Config;
use crate::conn::{self, ConnectionId, ConnectionManager, ConnectionSlot, Transport};
use crate::flags::Flags;
use crate::pool::{ServerId, ServerPool};
use crate::query::{Query, QueryArena, QueryId, QueryOutcome};
use crate::socket::{SocketFunctions, SocketKind};
use crate::status::Status;
use crate::wire::edns::Edns;
use crate::wire::enums::{RecordClass, RecordType, ResponseCode};
use crate::wire::message::{self, QueryParams};
use crate::{search, wire};

type Callback = Box<dyn FnOnce(QueryOutcome)>;
pub type ServerStateCallback = Box<dyn FnMut(ServerId, std::net::SocketAddr, bool)>;

pub struct Engine {
    pub config: Config,
    pub servers: ServerPool,
    pub connections: ConnectionManager,
    pub queries: QueryArena,
    pub cache: Cache,
    sockets: Box<dyn SocketFunctions>,
    rng: Box<dyn RngCore>,
    callbacks: rustc_hash::FxHashMap<QueryId, Callback>,
    server_state_cb: Option<ServerStateCallback>,
    next_wire_id: u16,
}

impl Engine {
    pub fn new(config: Config, sockets: Box<dyn SocketFunctions>, rng: Box<dyn RngCore>) -> Self {
        let servers = ServerPool::new(config.servers.clone(), config.flags);
        Self {
            connections: ConnectionManager::new(config.udp_max_queries),
            cache: Cache::new(config.qcache_max_ttl, config.qcache_max_entries),
            servers,
            config,
            sockets,
            rng,
            callbacks: rustc_hash::FxHashMap::default(),
            server_state_cb: None,
            next_wire_id: 1,
        }
    }

    pub fn set_server_state_callback(&mut self, cb: ServerStateCallback) {
        self.server_state_cb = Some(cb);
    }

    /// Swap the injectable socket layer in place (spec.md §6
    /// `set_socket_functions`), preserving in-flight queries, server
    /// health, and the cache -- unlike `reinit`, this does not change
    /// the configured servers, so nothing needs re-homing.
    pub fn set_sockets(&mut self, sockets: Box<dyn SocketFunctions>) {
        self.sockets = sockets;
    }

    fn next_id(&mut self) -> u16 {
        let id = self.next_wire_id;
        self.next_wire_id = self.next_wire_id.wrapping_add(1);
        if self.next_wire_id == 0 {
            self.next_wire_id = 1;
        }
        id
    }

    /// Submit a fully specified query (spec.md §6 `query`): `name` is
    /// sent exactly as given, with no search-list expansion, regardless
    /// of `NOSEARCH`. Fires `callback` exactly once, either synchronously
    /// (cache hit, immediate rejection) or later from `process_fd`/
    /// `poll_timeouts`.
    pub fn submit(
        &mut self,
        name: &str,
        qtype: RecordType,
        qclass: RecordClass,
        callback: impl FnOnce(QueryOutcome) + 'static,
        now: Instant,
    ) {
        if wire::name::validate(name).is_err() {
            callback(QueryOutcome::Failed { status: Status::EBadName, timeouts: 0 });
            return;
        }
        let candidates = vec![name.trim_end_matches('.').to_string()];
        self.submit_candidates(candidates, qtype, qclass, callback, now);
    }

    /// Submit a query subject to ndots/search-list expansion (spec.md §6
    /// `search`), independent of `NOSEARCH` -- that flag only controls
    /// whether `submit`'s callers get expansion, not this one.
    pub fn submit_search(
        &mut self,
        name: &str,
        qtype: RecordType,
        qclass: RecordClass,
        callback: impl FnOnce(QueryOutcome) + 'static,
        now: Instant,
    ) {
        if wire::name::validate(name).is_err() {
            callback(QueryOutcome::Failed { status: Status::EBadName, timeouts: 0 });
            return;
        }
        let candidates = search::expansion_order(name, &self.config.search, self.config.ndots);
        self.submit_candidates(candidates, qtype, qclass, callback, now);
    }

    fn submit_candidates(
        &mut self,
        candidates: Vec<String>,
        qtype: RecordType,
        qclass: RecordClass,
        callback: impl FnOnce(QueryOutcome) + 'static,
        now: Instant,
    ) {
        if self.servers.is_empty() {
            callback(QueryOutcome::Failed { status: Status::ENotInitialized, timeouts: 0 });
            return;
        }

        let first = candidates[0].clone();
        if let Some(outcome) = self.try_cache(&first, qtype, qclass, now, 0) {
            callback(outcome);
            return;
        }

        let deadline = now + self.config.timeout * self.config.tries;
        let query = Query::with_candidates(candidates, qtype, qclass, deadline, now);
        let id = self.queries.insert(query);
        self.callbacks.insert(id, Box::new(callback));

        self.dispatch(id, now);
        self.maybe_probe(&first, qtype, qclass, now);
    }

    /// On an initial query (never a retry), opportunistically probe the
    /// oldest cooled-down failed server, independent of whether it ends
    /// up answering anything a real caller sees (spec.md §4.3, §4.5).
    fn maybe_probe(&mut self, qname: &str, qtype: RecordType, qclass: RecordClass, now: Instant) {
        if self.config.retry_chance <= 0.0 || self.servers.is_empty() {
            return;
        }
        let Some(server_id) = self
            .servers
            .oldest_probe_candidate(now, self.config.retry_delay)
        else {
            return;
        };
        if !self.servers.should_probe(
            server_id,
            now,
            self.config.retry_delay,
            self.config.retry_chance,
            &mut *self.rng,
        ) {
            return;
        }

        let deadline = now + self.config.timeout;
        let mut probe = Query::new(qname.to_string(), qtype, qclass, deadline, now);
        probe.is_probe = true;
        probe.pinned_server = Some(server_id);
        let id = self.queries.insert(probe);
        self.callbacks.insert(id, Box::new(|_outcome| {}));
        debug!(?server_id, "issuing out-of-band health probe");
        self.dispatch(id, now);
    }

    /// Advance a query to its next search-list candidate on NXDOMAIN or
    /// NODATA (spec.md §4.5 step 2); if no candidate remains, surface
    /// `status` to the caller. The next candidate is itself checked
    /// against the cache before falling back to a fresh dispatch, same
    /// as the first trial in `submit`.
    fn advance_search_or_fail(&mut self, id: QueryId, status: Status, now: Instant) {
        let Some(query) = self.queries.get(id) else { return };
        let next_index = query.search_index.map(|i| i + 1).unwrap_or(0);
        let Some(next_name) = query.search_candidates.get(next_index).cloned() else {
            self.fail(id, status);
            return;
        };
        let (qtype, qclass, timeouts) = (query.qtype, query.qclass, query.timeouts);

        if let Some(outcome) = self.try_cache(&next_name, qtype, qclass, now, timeouts) {
            if let Some(mut query) = self.queries.remove(id) {
                query.mark_completed();
            }
            if let Some(cb) = self.callbacks.remove(&id) {
                cb(outcome);
            }
            return;
        }

        if let Some(query) = self.queries.get_mut(id) {
            query.original_name = next_name;
            query.search_index = Some(next_index);
            query.attempts = 0;
            query.edns_retry_without_edns = false;
            query.tcp_upgrade_pending = false;
            query.cookie_strikes = 0;
            query.deadline = now + self.config.timeout * self.config.tries;
        }
        self.dispatch(id, now);
    }

    fn try_cache(
        &mut self,
        name: &str,
        qtype: RecordType,
        qclass: RecordClass,
        now: Instant,
        timeouts: u32,
    ) -> Option<QueryOutcome> {
        if !self.config.query_cache {
            return None;
        }
        let key = CacheKey::new(name, qtype, qclass);
        match self.cache.lookup(&key, now) {
            Some(CacheValue::Positive(records)) => {
                trace!(%name, "cache hit (positive)");
                Some(QueryOutcome::Answer { records, timeouts })
            }
            Some(CacheValue::Negative) => {
                trace!(%name, "cache hit (negative)");
                Some(QueryOutcome::Failed { status: Status::ENotFound, timeouts })
            }
            None => None,
        }
    }

    /// Fresh or failover dispatch: pinned probes stay on their one
    /// server, everything else goes to whichever server is first in
    /// the current dispatch order. A failed server is always resorted
    /// to the back of that order before this runs again (`note_failure`
    /// precedes every `retry_or_fail` call), so `order[0]` is always an
    /// untried-or-recovered server, never the one that just failed
    /// (spec.md §4.5: "re-dispatch to the next server in order").
    fn dispatch(&mut self, id: QueryId, now: Instant) {
        let pinned = match self.queries.get(id) {
            Some(q) => q.pinned_server,
            None => return,
        };

        let server_id = if let Some(pinned) = pinned {
            pinned
        } else {
            let order = self.servers.dispatch_order();
            let Some(&first) = order.first() else {
                self.fail(id, Status::ENotInitialized);
                return;
            };
            first
        };

        self.dispatch_to(id, server_id, now);
    }

    /// Re-send the current attempt to the server a query is already
    /// talking to, for the retries spec.md §4.5's response table pins
    /// to the same server (TC-upgrade, FORMERR-without-EDNS, BADCOOKIE)
    /// rather than letting it fall through to ordinary failover.
    fn redispatch_same_server(&mut self, id: QueryId, now: Instant) {
        let server_id = match self.queries.get(id).and_then(|q| q.current_server.or(q.pinned_server)) {
            Some(server_id) => server_id,
            None => return self.dispatch(id, now),
        };
        self.dispatch_to(id, server_id, now);
    }

    fn dispatch_to(&mut self, id: QueryId, server_id: ServerId, now: Instant) {
        let attempts = match self.queries.get(id) {
            Some(q) => q.attempts,
            None => return,
        };
        let transport = self.transport_for(id, server_id);
        debug!(?server_id, ?transport, attempt = attempts, "dispatching query");
        if let Err(status) = self.send_on(id, server_id, transport, now) {
            warn!(?server_id, %status, "send failed, marking server unhealthy");
            self.note_failure(server_id, now);
            self.retry_or_fail(id, status, now);
        }
    }

    fn transport_for(&self, id: QueryId, _server: ServerId) -> Transport {
        let forced_tcp = self.config.flags.contains(Flags::USEVC);
        let pending_upgrade = self
            .queries
            .get(id)
            .map(|q| q.tcp_upgrade_pending)
            .unwrap_or(false);
        if forced_tcp || pending_upgrade {
            Transport::Tcp
        } else {
            Transport::Udp
        }
    }

    fn send_on(
        &mut self,
        id: QueryId,
        server_id: ServerId,
        transport: Transport,
        now: Instant,
    ) -> std::result::Result<(), Status> {
        let server = self.servers.get(server_id).ok_or(Status::ENotInitialized)?;
        let address = server.address;

        let slot = self.connections.connection_for(server_id, address, transport);
        let connection_id = match slot {
            ConnectionSlot::Existing(cid) => cid,
            ConnectionSlot::NeedsOpen { server, address, transport } => {
                let kind = match transport {
                    Transport::Udp => SocketKind::Udp,
                    Transport::Tcp => SocketKind::Tcp,
                };
                let fd = self
                    .sockets
                    .socket(kind, address)
                    .map_err(|_| Status::EConnRefused)?;
                self.sockets
                    .connect(fd, address)
                    .map_err(|_| Status::EConnRefused)?;
                self.connections.insert_opened(server, address, transport, fd)
            }
        };

        let wire_id = self.next_id();
        let use_cookie = self.config.flags.contains(Flags::COOKIE);
        let use_edns = self.config.flags.contains(Flags::EDNS) || use_cookie;

        let retry_without_edns = self
            .queries
            .get(id)
            .map(|q| q.edns_retry_without_edns)
            .unwrap_or(false);

        let edns = if use_edns && !retry_without_edns {
            let mut edns = Edns::new(self.config.udp_payload_size);
            if use_cookie {
                if let Some(server) = self.servers.get_mut(server_id) {
                    let option = server.cookie.outgoing_option(&mut *self.rng);
                    edns.set_cookie_option(option);
                }
            }
            Some(edns)
        } else {
            None
        };

        let dns0x20 = self.config.flags.contains(Flags::DNS0X20);
        let (qname, qtype, qclass) = {
            let query = self.queries.get(id).ok_or(Status::ECancelled)?;
            (query.original_name.clone(), query.qtype, query.qclass)
        };

        let (bytes, transmitted) = message::encode_query(
            QueryParams {
                id: wire_id,
                qname: &qname,
                qtype,
                qclass,
                dns0x20,
                edns,
            },
            &mut *self.rng,
        )
        .map_err(|_| Status::EBadName)?;

        let payload = match transport {
            Transport::Udp => bytes,
            Transport::Tcp => conn::frame_tcp_message(&bytes),
        };

        let conn_state = self.connections.get_mut(connection_id).ok_or(Status::EConnRefused)?;
        let sent = self.sockets.send(conn_state.fd, &payload).map_err(|_| Status::EConnRefused)?;
        if sent < payload.len() {
            conn_state.write_buf = payload[sent..].to_vec();
            conn_state.write_offset = 0;
        }
        conn_state.queries_sent += 1;
        conn_state.waiting.push(id);

        if let Some(query) = self.queries.get_mut(id) {
            query.wire_id = wire_id;
            query.transmitted_name = transmitted;
            query.current_server = Some(server_id);
            query.current_connection = Some(connection_id);
            query.attempts += 1;
            query.deadline = now + self.config.timeout;
        }

        if let Some(cb) = &mut self.server_state_cb {
            cb(server_id, address, true);
        }

        Ok(())
    }

    fn note_failure(&mut self, server_id: ServerId, now: Instant) {
        self.servers.record_failure(server_id, now);
    }

    fn retry_or_fail(&mut self, id: QueryId, status: Status, now: Instant) {
        let exhausted = match self.queries.get(id) {
            Some(q) if q.pinned_server.is_some() => q.attempts >= self.config.tries,
            Some(q) => q.attempts >= self.config.tries * self.servers_len(),
            None => return,
        };
        if exhausted {
            self.fail(id, status);
        } else {
            self.dispatch(id, now);
        }
    }

    fn servers_len(&self) -> u32 {
        self.servers.iter().count() as u32
    }

    fn fail(&mut self, id: QueryId, status: Status) {
        let timeouts = self.queries.get(id).map(|q| q.timeouts).unwrap_or(0);
        if let Some(mut query) = self.queries.remove(id) {
            query.mark_completed();
        }
        if let Some(cb) = self.callbacks.remove(&id) {
            cb(QueryOutcome::Failed { status, timeouts });
        }
    }

    fn succeed(&mut self, id: QueryId, records: Vec<wire::ResourceRecord>) {
        let timeouts = self.queries.get(id).map(|q| q.timeouts).unwrap_or(0);
        if let Some(mut query) = self.queries.remove(id) {
            query.mark_completed();
        }
        if let Some(cb) = self.callbacks.remove(&id) {
            cb(QueryOutcome::Answer { records, timeouts });
        }
    }

    /// Host hands us bytes that arrived on `fd` belonging to `connection`.
    /// Handles framing (UDP: one datagram == one message; TCP: length
    /// prefix, possibly spanning reads) and dispatches to
    /// `handle_response` once a full message is assembled.
    pub fn on_readable(&mut self, connection_id: ConnectionId, now: Instant) {
        let (fd, transport) = match self.connections.get(connection_id) {
            Some(c) => (c.fd, c.transport),
            None => return,
        };

        let mut buf = [0u8; 65535];
        let n = match self.sockets.recv(fd, &mut buf) {
            Ok(n) => n,
            Err(_) => return,
        };
        if n == 0 {
            return;
        }

        match transport {
            Transport::Udp => {
                self.handle_message(connection_id, &buf[..n], now);
            }
            Transport::Tcp => {
                if let Some(conn) = self.connections.get_mut(connection_id) {
                    conn.read_buf.extend_from_slice(&buf[..n]);
                }
                loop {
                    let extracted = self
                        .connections
                        .get(connection_id)
                        .and_then(|c| conn::try_extract_tcp_message(&c.read_buf))
                        .map(|(msg, consumed)| (msg.to_vec(), consumed));
                    let Some((message_bytes, consumed)) = extracted else {
                        break;
                    };
                    if let Some(conn) = self.connections.get_mut(connection_id) {
                        conn.read_buf.drain(..consumed);
                    }
                    self.handle_message(connection_id, &message_bytes, now);
                }
            }
        }
    }

    fn handle_message(&mut self, connection_id: ConnectionId, bytes: &[u8], now: Instant) {
        let message = match message::decode_message(bytes) {
            Ok(m) => m,
            Err(_) => return,
        };
        let Some(header) = message.header else { return };

        let server_id = match self.connections.get(connection_id) {
            Some(c) => c.server,
            None => return,
        };

        let query_id = match self
            .connections
            .get(connection_id)
            .and_then(|c| c.waiting.iter().find(|q| self.queries.get(**q).map(|qq| qq.wire_id) == Some(header.id)).copied())
        {
            Some(id) => id,
            None => {
                debug!(id = header.id, "response matched no outstanding query");
                return;
            }
        };

        if let Some(conn) = self.connections.get_mut(connection_id) {
            conn.waiting.retain(|q| *q != query_id);
        }

        if let Err(reason) = self.verify_response(query_id, &message) {
            trace!(?reason, "dropping spoofed/mismatched response");
            return;
        }

        if message.is_truncated() && !self.config.flags.contains(Flags::IGNTC) {
            if let Some(q) = self.queries.get_mut(query_id) {
                q.tcp_upgrade_pending = true;
            }
            self.redispatch_same_server(query_id, now);
            return;
        }

        let rcode = message.rcode();
        match rcode {
            ResponseCode::NoError if !message.answers.is_empty() => {
                self.servers.record_success(server_id);
                self.complete_success(query_id, message, now);
            }
            ResponseCode::NoError => {
                // NODATA: NOERROR with no answer RRs (spec.md §4.5 table).
                self.servers.record_success(server_id);
                self.cache_negative_if_eligible(query_id, &message, now);
                self.advance_search_or_fail(query_id, Status::ENoData, now);
            }
            ResponseCode::NxDomain => {
                self.servers.record_success(server_id);
                self.cache_negative_if_eligible(query_id, &message, now);
                self.advance_search_or_fail(query_id, Status::ENotFound, now);
            }
            ResponseCode::FormErr => {
                let retried = self
                    .queries
                    .get(query_id)
                    .map(|q| !q.edns_retry_without_edns)
                    .unwrap_or(false);
                if retried {
                    if let Some(q) = self.queries.get_mut(query_id) {
                        q.edns_retry_without_edns = true;
                    }
                    self.redispatch_same_server(query_id, now);
                } else {
                    self.fail(query_id, Status::EFormErr);
                }
            }
            ResponseCode::BadCookie => {
                let strikes = self
                    .queries
                    .get_mut(query_id)
                    .map(|q| {
                        q.cookie_strikes += 1;
                        q.cookie_strikes
                    })
                    .unwrap_or(0);
                if strikes >= 3 {
                    if let Some(q) = self.queries.get_mut(query_id) {
                        q.tcp_upgrade_pending = true;
                    }
                }
                self.redispatch_same_server(query_id, now);
            }
            ResponseCode::ServFail | ResponseCode::NotImp | ResponseCode::Refused => {
                if self.config.flags.contains(Flags::NOCHECKRESP) || !self.config.server_failover {
                    self.fail(query_id, status_for_rcode(rcode));
                } else {
                    self.note_failure(server_id, now);
                    self.retry_or_fail(query_id, status_for_rcode(rcode), now);
                }
            }
            ResponseCode::Other(_) => {
                self.fail(query_id, Status::EBadResp);
            }
        }
    }

    fn verify_response(&mut self, query_id: QueryId, message: &wire::Message) -> std::result::Result<(), &'static str> {
        let query = self.queries.get(query_id).ok_or("query gone")?;

        if self.config.flags.contains(Flags::DNS0X20) {
            let echoed = message
                .questions
                .first()
                .map(|q| &q.name)
                .ok_or("missing question")?;
            if echoed != &query.transmitted_name {
                return Err("0x20 case mismatch");
            }
        }

        if self.config.flags.contains(Flags::COOKIE) {
            if let Some(server_id) = query.current_server {
                let cookie_expected = self
                    .servers
                    .get(server_id)
                    .map(|s| s.cookie.server_cookie.is_some())
                    .unwrap_or(false);
                let option = message.edns.as_ref().and_then(|e| e.cookie_option());
                match option {
                    Some(option) => {
                        if let Some(server) = self.servers.get_mut(server_id) {
                            if server.cookie.observe_response(option).is_err() {
                                return Err("cookie mismatch");
                            }
                        }
                    }
                    // A server that previously rotated in a cookie and then
                    // stops sending one at all looks like an off-path
                    // spoof attempt or a mid-flight anycast handoff to a
                    // node unaware of our state (spec.md §8 scenario 7).
                    None if cookie_expected => return Err("missing expected cookie"),
                    None => {}
                }
            }
        }

        Ok(())
    }

    fn complete_success(&mut self, query_id: QueryId, message: wire::Message, now: Instant) {
        if self.config.query_cache {
            if let Some(query) = self.queries.get(query_id) {
                let key = CacheKey::new(&query.original_name, query.qtype, query.qclass);
                if let CacheOutcome::Positive(records) = cache::cacheable_outcome(&message) {
                    self.cache.insert_positive(key, records, now);
                }
            }
        }
        self.succeed(query_id, message.answers);
    }

    fn cache_negative_if_eligible(&mut self, query_id: QueryId, message: &wire::Message, now: Instant) {
        if !self.config.query_cache {
            return;
        }
        let Some(query) = self.queries.get(query_id) else { return };
        let key = CacheKey::new(&query.original_name, query.qtype, query.qclass);
        if let CacheOutcome::Negative { soa_minimum } = cache::cacheable_outcome(message) {
            self.cache.insert_negative(key, soa_minimum, now);
        }
    }

    /// Sweep in-flight queries for expired deadlines, re-dispatching or
    /// failing them (spec.md §4.5). Hosts call this alongside
    /// `timeout_until_next` (spec.md §5).
    pub fn poll_timeouts(&mut self, now: Instant) {
        let timed_out: Vec<QueryId> = self
            .queries
            .ids()
            .into_iter()
            .filter(|id| self.queries.get(*id).map(|q| q.deadline <= now).unwrap_or(false))
            .collect();

        for id in timed_out {
            if let Some(server_id) = self.queries.get(id).and_then(|q| q.current_server) {
                self.note_failure(server_id, now);
            }
            if let Some(q) = self.queries.get_mut(id) {
                q.timeouts += 1;
            }
            self.retry_or_fail(id, Status::ETimeout, now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queries
            .ids()
            .into_iter()
            .filter_map(|id| self.queries.get(id).map(|q| q.deadline))
            .min()
    }

    /// Synchronously cancel every in-flight query with `status`
    /// (spec.md §4.7 `cancel`/`destroy`). Two-phase: collect ids first,
    /// then fire callbacks, so a callback that reentrantly submits a new
    /// query doesn't get swept up in the same cancellation pass.
    pub fn cancel_all(&mut self, status: Status) {
        let ids = self.queries.ids();
        let mut fired = Vec::with_capacity(ids.len());
        for id in ids {
            let timeouts = self.queries.get(id).map(|q| q.timeouts).unwrap_or(0);
            if let Some(mut query) = self.queries.remove(id) {
                query.mark_completed();
                fired.push((id, timeouts));
            }
        }
        for (id, timeouts) in fired {
            if let Some(cb) = self.callbacks.remove(&id) {
                cb(QueryOutcome::Failed { status, timeouts });
            }
        }
    }

    /// Replace the configured server list in place, re-homing any
    /// in-flight query whose current server address survives into the
    /// new list and cancelling (with `ENOTFOUND`) any whose server was
    /// removed (spec.md §4.7 open question, resolved: cancel rather than
    /// silently re-dispatch -- see DESIGN.md).
    pub fn set_servers(&mut self, addresses: Vec<SocketAddr>, now: Instant) {
        self.retarget_servers(addresses, now);
    }

    /// Apply a full new configuration without cancelling in-flight
    /// queries whose server is still present (spec.md §4.7 `reinit`).
    pub fn reinit(&mut self, new_config: Config, now: Instant) {
        let new_servers = new_config.servers.clone();
        self.config = new_config;
        self.cache = Cache::new(self.config.qcache_max_ttl, self.config.qcache_max_entries);
        self.connections = ConnectionManager::new(self.config.udp_max_queries);
        self.retarget_servers(new_servers, now);
    }

    fn retarget_servers(&mut self, new_addresses: Vec<SocketAddr>, now: Instant) {
        let old_addr_by_id: HashMap<ServerId, SocketAddr> =
            self.servers.iter().map(|(id, e)| (id, e.address)).collect();

        let conn_ids: Vec<ConnectionId> = self.connections.iter().map(|(id, _)| id).collect();
        for cid in conn_ids {
            if let Some(conn) = self.connections.get(cid) {
                let _ = self.sockets.close(conn.fd);
            }
            self.connections.remove(cid);
        }

        let new_pool = ServerPool::new(new_addresses.clone(), self.config.flags);
        let new_id_by_addr: HashMap<SocketAddr, ServerId> =
            new_pool.iter().map(|(id, e)| (e.address, id)).collect();

        let mut cancel_ids = Vec::new();
        let mut keep_ids: Vec<(QueryId, Option<ServerId>)> = Vec::new();
        for id in self.queries.ids() {
            let current = self.queries.get(id).and_then(|q| q.current_server);
            let mapped = current
                .and_then(|sid| old_addr_by_id.get(&sid))
                .and_then(|addr| new_id_by_addr.get(addr).copied());
            if current.is_some() && mapped.is_none() {
                cancel_ids.push(id);
            } else {
                keep_ids.push((id, mapped));
            }
        }

        self.servers = new_pool;
        self.config.servers = new_addresses;

        for (id, mapped) in keep_ids {
            if let Some(query) = self.queries.get_mut(id) {
                query.current_connection = None;
                query.current_server = mapped;
                query.attempts = 0;
                query.deadline = now + self.config.timeout * self.config.tries;
            }
            // Re-homed queries keep the server they were mapped to above
            // rather than being handed to ordinary failover selection;
            // queries that hadn't dispatched yet (`mapped` is `None`
            // because `current_server` was `None`) fall through to a
            // fresh dispatch.
            self.redispatch_same_server(id, now);
        }

        let mut fired = Vec::with_capacity(cancel_ids.len());
        for id in cancel_ids {
            let timeouts = self.queries.get(id).map(|q| q.timeouts).unwrap_or(0);
            if let Some(mut query) = self.queries.remove(id) {
                query.mark_completed();
                fired.push((id, timeouts));
            }
        }
        for (id, timeouts) in fired {
            if let Some(cb) = self.callbacks.remove(&id) {
                cb(QueryOutcome::Failed { status: Status::ENotFound, timeouts });
            }
        }
    }
}

fn status_for_rcode(rcode: ResponseCode) -> Status {
    match rcode {
        ResponseCode::ServFail => Status::EServFail,
        ResponseCode::NotImp => Status::ENotImp,
        ResponseCode::Refused => Status::ERefused,
        _ => Status::EBadResp,
    }
}

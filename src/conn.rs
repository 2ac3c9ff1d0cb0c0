//! Connection manager: UDP and TCP connections toward upstream servers,
//! grounded on the teacher's `resolver::ConnectionPool` (socket-per-server
//! pooling) and `send_tcp_query`'s 2-byte length-prefixed framing
//! (RFC 1035 §4.2.2), generalized from owning tokio sockets to holding
//! only buffers and fd handles the host gives us (spec.md §4.4).

use std::collections::HashMap;
use std::net::SocketAddr;

use slab::Slab;

use crate::pool::ServerId;
use crate::query::QueryId;
use crate::socket::RawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

/// A connection toward one upstream server. Owns only the fd and
/// buffering state; the actual syscalls are made through the injectable
/// `SocketFunctions` (spec.md §4.4, §4.6).
pub struct Connection {
    pub server: ServerId,
    pub address: SocketAddr,
    pub transport: Transport,
    pub fd: RawFd,
    pub queries_sent: u32,
    /// Queries awaiting a response on this connection.
    pub waiting: Vec<QueryId>,
    /// Bytes already written for the in-flight TCP send, if partial.
    pub write_buf: Vec<u8>,
    pub write_offset: usize,
    /// Bytes read so far for the in-flight TCP receive (length-prefix
    /// and/or partial body).
    pub read_buf: Vec<u8>,
}

impl Connection {
    fn new(server: ServerId, address: SocketAddr, transport: Transport, fd: RawFd) -> Self {
        Self {
            server,
            address,
            transport,
            fd,
            queries_sent: 0,
            waiting: Vec::new(),
            write_buf: Vec::new(),
            write_offset: 0,
            read_buf: Vec::new(),
        }
    }

    pub fn wants_write(&self) -> bool {
        self.write_offset < self.write_buf.len()
    }
}

/// Arena of live connections, indexed by `(server, transport)` for
/// lookup and by dense `ConnectionId` for weak references held by
/// `Query` (spec.md §9: avoid cyclic strong references).
pub struct ConnectionManager {
    connections: Slab<Connection>,
    by_server: HashMap<(ServerId, TransportKey), ConnectionId>,
    udp_max_queries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TransportKey {
    Udp,
    Tcp,
}

impl ConnectionManager {
    pub fn new(udp_max_queries: u32) -> Self {
        Self {
            connections: Slab::new(),
            by_server: HashMap::new(),
            udp_max_queries,
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.0)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id.0)
    }

    /// Find or allocate a connection for `server`/`transport`. UDP
    /// connections are retired (a fresh one is opened in their place)
    /// once they've carried `udp_max_queries` queries, if that limit is
    /// nonzero (spec.md §4.4).
    pub fn connection_for(
        &mut self,
        server: ServerId,
        address: SocketAddr,
        transport: Transport,
    ) -> ConnectionSlot {
        let key = (server, transport_key(transport));
        if let Some(&id) = self.by_server.get(&key) {
            let retire = transport == Transport::Udp
                && self.udp_max_queries > 0
                && self.connections[id.0].queries_sent >= self.udp_max_queries
                && self.connections[id.0].waiting.is_empty();
            if !retire {
                return ConnectionSlot::Existing(id);
            }
            self.remove(id);
        }
        ConnectionSlot::NeedsOpen { server, address, transport }
    }

    pub fn insert_opened(
        &mut self,
        server: ServerId,
        address: SocketAddr,
        transport: Transport,
        fd: RawFd,
    ) -> ConnectionId {
        let key = (server, transport_key(transport));
        let id = ConnectionId(self.connections.insert(Connection::new(server, address, transport, fd)));
        self.by_server.insert(key, id);
        id
    }

    /// Tear down a connection, returning the queries that were waiting
    /// on it so the caller can re-dispatch or fail them (spec.md §4.4:
    /// "on teardown, every query waiting on the connection is
    /// re-dispatched as a failure").
    pub fn remove(&mut self, id: ConnectionId) -> Vec<QueryId> {
        if !self.connections.contains(id.0) {
            return Vec::new();
        }
        let conn = self.connections.remove(id.0);
        self.by_server.retain(|_, v| *v != id);
        conn.waiting
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.connections.iter().map(|(i, c)| (ConnectionId(i), c))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut Connection)> {
        self.connections.iter_mut().map(|(i, c)| (ConnectionId(i), c))
    }
}

fn transport_key(t: Transport) -> TransportKey {
    match t {
        Transport::Udp => TransportKey::Udp,
        Transport::Tcp => TransportKey::Tcp,
    }
}

pub enum ConnectionSlot {
    Existing(ConnectionId),
    NeedsOpen {
        server: ServerId,
        address: SocketAddr,
        transport: Transport,
    },
}

/// Prefix a TCP DNS message with its 2-byte big-endian length
/// (RFC 1035 §4.2.2), grounded on the teacher's `send_tcp_query`.
pub fn frame_tcp_message(message: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(message.len() + 2);
    framed.extend_from_slice(&(message.len() as u16).to_be_bytes());
    framed.extend_from_slice(message);
    framed
}

/// Attempt to extract one complete length-prefixed message from a TCP
/// read buffer. Returns the message and the number of bytes consumed,
/// or `None` if more data is needed.
pub fn try_extract_tcp_message(buf: &[u8]) -> Option<(&[u8], usize)> {
    if buf.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < 2 + len {
        return None;
    }
    Some((&buf[2..2 + len], 2 + len))
}

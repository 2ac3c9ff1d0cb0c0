//! Mock socket layer for integration tests, grounded on
//! `examples/original_source/test/ares-test-mock.cc`'s approach: a
//! scripted fake server that inspects the query a client sent and hands
//! back a hand-built wire response, independent of the library's own
//! encoder (so a codec bug can't make a test self-confirm).
//!
//! Also grounded on spec.md §9's composition-over-inheritance guidance:
//! a driver struct holding `(config, server behaviors)` rather than a
//! class hierarchy of mock servers.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use aresium::socket::{RawFd, SocketFunctions, SocketKind};
use aresium::wire::{self, RecordClass, RecordType};

/// What a scripted server does with one incoming query.
pub enum Behavior {
    /// Reply with a NOERROR answer carrying these A-record octets.
    ReplyA(Vec<[u8; 4]>),
    /// Reply with TC=1 and no answers (forces a TCP retry).
    Truncate,
    /// Reply with the given RCODE and no answers.
    Rcode(u8),
    /// Drop the query silently (used to provoke a timeout).
    Drop,
    /// Reply with a NOERROR answer plus an EDNS COOKIE option carrying
    /// this server cookie appended to whatever client cookie was sent.
    ReplyWithCookie { addrs: Vec<[u8; 4]>, server_cookie: [u8; 8] },
    /// Reply BADCOOKIE (rcode 23) with a fresh server cookie offered via EDNS.
    BadCookie { server_cookie: [u8; 8] },
    /// Reply with a NOERROR answer, but echo the question name with every
    /// letter's case flipped -- simulates an off-path spoof (or a broken
    /// resolver) that doesn't preserve DNS-0x20 case, so the client must
    /// reject it.
    ReplyWrongCase(Vec<[u8; 4]>),
}

pub struct Script {
    pub steps: VecDeque<Behavior>,
}

impl Script {
    pub fn new(steps: Vec<Behavior>) -> Self {
        Self { steps: steps.into_iter().collect() }
    }
}

struct SocketRecord {
    kind: SocketKind,
    peer: Option<SocketAddr>,
    pending: VecDeque<Vec<u8>>,
}

impl SocketRecord {
    fn new(kind: SocketKind) -> Self {
        Self { kind, peer: None, pending: VecDeque::new() }
    }
}

pub struct MockSockets {
    next_fd: RawFd,
    sockets: HashMap<RawFd, SocketRecord>,
    scripts: Rc<RefCell<HashMap<SocketAddr, Script>>>,
    /// Every (kind, peer) pair a socket was opened for, in order, so
    /// tests can assert on distinct-connection counts.
    pub socket_log: Rc<RefCell<Vec<(SocketKind, SocketAddr)>>>,
    pub tcp_connect_log: Rc<RefCell<Vec<SocketAddr>>>,
}

impl MockSockets {
    pub fn new(scripts: HashMap<SocketAddr, Script>) -> Self {
        Self {
            next_fd: 1,
            sockets: HashMap::new(),
            scripts: Rc::new(RefCell::new(scripts)),
            socket_log: Rc::new(RefCell::new(Vec::new())),
            tcp_connect_log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn respond(&mut self, fd: RawFd, peer: SocketAddr, kind: SocketKind, query: &[u8]) {
        let message = match wire::decode_message(query) {
            Ok(m) => m,
            Err(_) => return,
        };
        let Some(header) = message.header else { return };
        let Some(question) = message.questions.first() else { return };

        let mut scripts = self.scripts.borrow_mut();
        let Some(script) = scripts.get_mut(&peer) else { return };
        let Some(behavior) = script.steps.pop_front() else { return };

        let response = build_response(header.id, &question.name, &behavior, &message.edns);
        if let Some(bytes) = response {
            let framed = match kind {
                SocketKind::Udp => bytes,
                SocketKind::Tcp => {
                    let mut framed = Vec::with_capacity(bytes.len() + 2);
                    framed.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    framed.extend_from_slice(&bytes);
                    framed
                }
            };
            if let Some(rec) = self.sockets.get_mut(&fd) {
                rec.pending.push_back(framed);
            }
        }
    }
}

impl SocketFunctions for MockSockets {
    fn socket(&mut self, kind: SocketKind, address: SocketAddr) -> io::Result<RawFd> {
        let fd = self.next_fd;
        self.next_fd += 1;
        let mut rec = SocketRecord::new(kind);
        rec.peer = Some(address);
        self.sockets.insert(fd, rec);
        self.socket_log.borrow_mut().push((kind, address));
        Ok(fd)
    }

    fn connect(&mut self, fd: RawFd, address: SocketAddr) -> io::Result<()> {
        if let Some(rec) = self.sockets.get_mut(&fd) {
            rec.peer = Some(address);
            if rec.kind == SocketKind::Tcp {
                self.tcp_connect_log.borrow_mut().push(address);
            }
        }
        Ok(())
    }

    fn send(&mut self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
        let (peer, kind) = match self.sockets.get(&fd) {
            Some(rec) => (rec.peer, rec.kind),
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "unknown fd")),
        };
        let Some(peer) = peer else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "no peer"));
        };

        let query = match kind {
            SocketKind::Udp => buf.to_vec(),
            SocketKind::Tcp => {
                if buf.len() < 2 {
                    return Ok(buf.len());
                }
                buf[2..].to_vec()
            }
        };
        self.respond(fd, peer, kind, &query);
        Ok(buf.len())
    }

    fn recv(&mut self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        let Some(rec) = self.sockets.get_mut(&fd) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown fd"));
        };
        match rec.pending.pop_front() {
            Some(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no data")),
        }
    }

    fn close(&mut self, fd: RawFd) -> io::Result<()> {
        self.sockets.remove(&fd);
        Ok(())
    }
}

/// Hand-build a DNS response message, independent of the crate's own
/// encoder, echoing `qname` and `id`.
fn build_response(
    id: u16,
    qname: &[String],
    behavior: &Behavior,
    request_edns: &Option<wire::edns::Edns>,
) -> Option<Vec<u8>> {
    if matches!(behavior, Behavior::Drop) {
        return None;
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&id.to_be_bytes());

    let (rcode, tc, ancount): (u8, bool, u16) = match behavior {
        Behavior::ReplyA(addrs) => (0, false, addrs.len() as u16),
        Behavior::ReplyWithCookie { addrs, .. } => (0, false, addrs.len() as u16),
        Behavior::ReplyWrongCase(addrs) => (0, false, addrs.len() as u16),
        Behavior::Truncate => (0, true, 0),
        Behavior::Rcode(code) => (*code, false, 0),
        Behavior::BadCookie { .. } => (23, false, 0),
        Behavior::Drop => unreachable!(),
    };

    // flags: QR=1, opcode=0, AA=0, TC, RD=1, RA=1, Z=0, AD=0, CD=0, RCODE low nibble
    let flags: u16 = (1 << 15) | ((tc as u16) << 9) | (1 << 8) | (1 << 7) | ((rcode & 0x0F) as u16);
    buf.extend_from_slice(&flags.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    buf.extend_from_slice(&ancount.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // nscount
    let needs_edns = matches!(
        behavior,
        Behavior::ReplyWithCookie { .. } | Behavior::BadCookie { .. }
    );
    buf.extend_from_slice(&(if needs_edns { 1u16 } else { 0u16 }).to_be_bytes());

    if let Behavior::ReplyWrongCase(_) = behavior {
        let flipped: Vec<String> = qname.iter().map(|l| flip_case(l)).collect();
        encode_name(&mut buf, &flipped);
    } else {
        encode_name(&mut buf, qname);
    }
    buf.extend_from_slice(&u16::from(RecordType::A).to_be_bytes());
    buf.extend_from_slice(&u16::from(RecordClass::IN).to_be_bytes());

    let name_offset: u16 = 12;
    match behavior {
        Behavior::ReplyA(addrs) | Behavior::ReplyWithCookie { addrs, .. } | Behavior::ReplyWrongCase(addrs) => {
            for addr in addrs {
                buf.push(0xC0);
                buf.push(name_offset as u8);
                buf.extend_from_slice(&u16::from(RecordType::A).to_be_bytes());
                buf.extend_from_slice(&u16::from(RecordClass::IN).to_be_bytes());
                buf.extend_from_slice(&300u32.to_be_bytes()); // ttl
                buf.extend_from_slice(&4u16.to_be_bytes());
                buf.extend_from_slice(addr);
            }
        }
        _ => {}
    }

    if needs_edns {
        let client_cookie: Vec<u8> = request_edns
            .as_ref()
            .and_then(|e| e.cookie_option())
            .map(|opt| opt[..8].to_vec())
            .unwrap_or_else(|| vec![0u8; 8]);

        let server_cookie: [u8; 8] = match behavior {
            Behavior::ReplyWithCookie { server_cookie, .. } => *server_cookie,
            Behavior::BadCookie { server_cookie } => *server_cookie,
            _ => unreachable!(),
        };

        let mut option_data = client_cookie;
        option_data.extend_from_slice(&server_cookie);

        buf.push(0); // root name
        buf.extend_from_slice(&u16::from(RecordType::OPT).to_be_bytes());
        buf.extend_from_slice(&1232u16.to_be_bytes()); // udp payload size as CLASS
        buf.push(0); // extended rcode
        buf.push(0); // version
        buf.extend_from_slice(&0u16.to_be_bytes()); // flags

        let mut rdata = Vec::new();
        rdata.extend_from_slice(&10u16.to_be_bytes()); // OPTCODE_COOKIE
        rdata.extend_from_slice(&(option_data.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&option_data);
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
    }

    Some(buf)
}

fn flip_case(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_uppercase() { c.to_ascii_lowercase() } else { c.to_ascii_uppercase() })
        .collect()
}

fn encode_name(buf: &mut Vec<u8>, labels: &[String]) {
    for label in labels {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
}

//! Injectable socket functions (spec.md §4.6), grounded on the
//! teacher's use of plain `std`/`tokio` socket types in
//! `resolver::send_udp_query`/`send_tcp_query`, generalized into a
//! trait so the host (or a test harness) can substitute mock sockets
//! without this crate ever calling `socket(2)`/`connect(2)` itself.

use std::io;
use std::net::SocketAddr;

/// An opaque, host-assigned file descriptor. On Unix this is a raw fd;
/// the type stays a bare integer so the crate never depends on a
/// platform-specific socket type.
pub type RawFd = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Udp,
    Tcp,
}

/// Everything the query engine and connection manager need from a
/// socket layer. A default, std-backed implementation is provided
/// below; hosts embedding this resolver may supply their own (e.g. to
/// route through a sandboxed proxy, or for deterministic tests).
pub trait SocketFunctions {
    fn socket(&mut self, kind: SocketKind, address: SocketAddr) -> io::Result<RawFd>;
    fn connect(&mut self, fd: RawFd, address: SocketAddr) -> io::Result<()>;
    fn send(&mut self, fd: RawFd, buf: &[u8]) -> io::Result<usize>;
    fn recv(&mut self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize>;
    fn close(&mut self, fd: RawFd) -> io::Result<()>;
}

/// Default implementation backed by non-blocking `std::net` sockets.
/// Fds are handed out as a monotonically increasing counter mapped to
/// the real socket, since `std` doesn't expose raw fds portably without
/// the platform-specific `AsRawFd` traits, which the host is free to
/// use instead by supplying its own `SocketFunctions`.
pub struct StdSocketFunctions {
    next_fd: RawFd,
    udp: std::collections::HashMap<RawFd, std::net::UdpSocket>,
    tcp: std::collections::HashMap<RawFd, std::net::TcpStream>,
}

impl Default for StdSocketFunctions {
    fn default() -> Self {
        Self {
            next_fd: 1,
            udp: std::collections::HashMap::new(),
            tcp: std::collections::HashMap::new(),
        }
    }
}

impl SocketFunctions for StdSocketFunctions {
    fn socket(&mut self, kind: SocketKind, address: SocketAddr) -> io::Result<RawFd> {
        let fd = self.next_fd;
        self.next_fd += 1;
        match kind {
            SocketKind::Udp => {
                let bind_addr: SocketAddr = if address.is_ipv4() {
                    "0.0.0.0:0".parse().unwrap()
                } else {
                    "[::]:0".parse().unwrap()
                };
                let socket = std::net::UdpSocket::bind(bind_addr)?;
                socket.set_nonblocking(true)?;
                self.udp.insert(fd, socket);
            }
            SocketKind::Tcp => {
                // Connection established lazily in `connect`.
            }
        }
        Ok(fd)
    }

    fn connect(&mut self, fd: RawFd, address: SocketAddr) -> io::Result<()> {
        if let Some(socket) = self.udp.get(&fd) {
            return socket.connect(address);
        }
        let stream = std::net::TcpStream::connect(address)?;
        stream.set_nonblocking(true)?;
        self.tcp.insert(fd, stream);
        Ok(())
    }

    fn send(&mut self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write;
        if let Some(socket) = self.udp.get(&fd) {
            return socket.send(buf);
        }
        if let Some(stream) = self.tcp.get_mut(&fd) {
            return stream.write(buf);
        }
        Err(io::Error::new(io::ErrorKind::NotFound, "unknown fd"))
    }

    fn recv(&mut self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        if let Some(socket) = self.udp.get(&fd) {
            return socket.recv(buf);
        }
        if let Some(stream) = self.tcp.get_mut(&fd) {
            return stream.read(buf);
        }
        Err(io::Error::new(io::ErrorKind::NotFound, "unknown fd"))
    }

    fn close(&mut self, fd: RawFd) -> io::Result<()> {
        self.udp.remove(&fd);
        self.tcp.remove(&fd);
        Ok(())
    }
}

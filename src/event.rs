//! Event interface (spec.md §5): the three operations a host uses to
//! drive this resolver without it running any I/O loop of its own.
//!
//! Grounded on the teacher's tokio-select-based `resolver` loop, but
//! inverted: instead of this crate awaiting readiness, it reports
//! which fds it cares about and lets the host's own reactor (epoll,
//! kqueue, an existing event loop) tell it when to act.

use std::time::Duration;

use crate::conn::{ConnectionManager, Transport};
use crate::socket::RawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub fd: RawFd,
    pub read: bool,
    pub write: bool,
}

/// Every fd this resolver currently wants to read and/or write.
/// UDP connections always want to read (a response may arrive any
/// time); TCP connections want to read, and want to write only while a
/// partial send is outstanding (spec.md §4.4).
pub fn sockets_of_interest(connections: &ConnectionManager) -> Vec<Interest> {
    connections
        .iter()
        .map(|(_, conn)| Interest {
            fd: conn.fd,
            read: true,
            write: conn.transport == Transport::Tcp && conn.wants_write(),
        })
        .collect()
}

/// How long the host may safely wait before calling back in, derived
/// from the nearest query deadline. `None` means there is nothing
/// in-flight and the host need not schedule a wakeup at all.
pub fn timeout_until_next(next_deadline: Option<std::time::Instant>, now: std::time::Instant) -> Option<Duration> {
    next_deadline.map(|deadline| deadline.saturating_duration_since(now))
}

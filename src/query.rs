//! The query entity and its arena, grounded on the teacher's
//! `resolver::InFlightQuery` (broadcast-channel dedup bookkeeping)
//! generalized to the full per-query state machine this resolver needs
//! without an async runtime to hold continuations for it (spec.md §4.5,
//! §9: dense ids over cyclic references).

use std::time::Instant;

use slab::Slab;

use crate::conn::ConnectionId;
use crate::pool::ServerId;
use crate::status::Status;
use crate::wire::{RecordClass, RecordType, ResourceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub usize);

/// The caller-visible outcome of a query (spec.md §4.5, §6: "the
/// callback receives (status, timeouts, dnsrec_response)"). `timeouts`
/// counts per-try deadline expirations only -- not TC-upgrade retries,
/// BADCOOKIE retries, or EDNS-fallback retries, which the spec calls
/// out as not counting as a timeout.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    Answer { records: Vec<ResourceRecord>, timeouts: u32 },
    Failed { status: Status, timeouts: u32 },
}

impl QueryOutcome {
    pub fn status(&self) -> Status {
        match self {
            QueryOutcome::Answer { .. } => Status::Success,
            QueryOutcome::Failed { status, .. } => *status,
        }
    }

    pub fn timeouts(&self) -> u32 {
        match self {
            QueryOutcome::Answer { timeouts, .. } => *timeouts,
            QueryOutcome::Failed { timeouts, .. } => *timeouts,
        }
    }
}

pub struct Query {
    pub original_name: String,
    pub qtype: RecordType,
    pub qclass: RecordClass,

    /// Full ordered list of names to try (spec.md §4.5 step 2); a
    /// single-element list for queries with no search expansion.
    pub search_candidates: Vec<String>,

    /// Index into `search_candidates` of the name currently being
    /// tried. `None` only ever occurs transiently during construction.
    pub search_index: Option<usize>,

    /// The exact qname bytes last transmitted (post DNS-0x20, if
    /// active), for verifying the echoed qname on response.
    pub transmitted_name: Vec<String>,
    pub wire_id: u16,

    pub deadline: Instant,
    pub created_at: Instant,
    pub attempts: u32,
    pub current_server: Option<ServerId>,
    pub current_connection: Option<ConnectionId>,

    pub edns_retry_without_edns: bool,
    pub tcp_upgrade_pending: bool,
    pub cookie_strikes: u32,
    pub cancellation_requested: bool,

    /// Count of genuine per-try deadline expirations (spec.md §6), not
    /// incremented for TC-upgrade, BADCOOKIE, or EDNS-fallback retries.
    pub timeouts: u32,

    /// Out-of-band health probe to a cooled-down failed server
    /// (spec.md §4.3), pinned to one server and reported to no real
    /// caller; success/failure still update that server's health via
    /// the normal response-handling path.
    pub is_probe: bool,
    pub pinned_server: Option<ServerId>,

    /// Set once the callback has fired, as a belt-and-suspenders
    /// invariant check alongside arena removal (spec.md §4.5: "the
    /// callback fires exactly once").
    completed: bool,
}

impl Query {
    pub fn new(
        original_name: String,
        qtype: RecordType,
        qclass: RecordClass,
        deadline: Instant,
        now: Instant,
    ) -> Self {
        Self::with_candidates(vec![original_name], qtype, qclass, deadline, now)
    }

    /// Construct a query that will walk `candidates` in order on
    /// NXDOMAIN/NODATA (spec.md §4.5 step 2), starting from the first.
    pub fn with_candidates(
        candidates: Vec<String>,
        qtype: RecordType,
        qclass: RecordClass,
        deadline: Instant,
        now: Instant,
    ) -> Self {
        let original_name = candidates[0].clone();
        Self {
            original_name,
            qtype,
            qclass,
            search_candidates: candidates,
            search_index: Some(0),
            transmitted_name: Vec::new(),
            wire_id: 0,
            deadline,
            created_at: now,
            attempts: 0,
            current_server: None,
            current_connection: None,
            edns_retry_without_edns: false,
            tcp_upgrade_pending: false,
            cookie_strikes: 0,
            cancellation_requested: false,
            timeouts: 0,
            is_probe: false,
            pinned_server: None,
            completed: false,
        }
    }

    pub fn mark_completed(&mut self) {
        debug_assert!(!self.completed, "query callback fired more than once");
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Dense arena of in-flight queries. `Query`s never hold a strong
/// reference to their connection or server; they look both up by id
/// through this arena's sibling structures each time they're needed.
#[derive(Default)]
pub struct QueryArena {
    queries: Slab<Query>,
}

impl QueryArena {
    pub fn new() -> Self {
        Self { queries: Slab::new() }
    }

    pub fn insert(&mut self, query: Query) -> QueryId {
        QueryId(self.queries.insert(query))
    }

    pub fn get(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(id.0)
    }

    pub fn get_mut(&mut self, id: QueryId) -> Option<&mut Query> {
        self.queries.get_mut(id.0)
    }

    pub fn remove(&mut self, id: QueryId) -> Option<Query> {
        if self.queries.contains(id.0) {
            Some(self.queries.remove(id.0))
        } else {
            None
        }
    }

    pub fn ids(&self) -> Vec<QueryId> {
        self.queries.iter().map(|(i, _)| QueryId(i)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_round_trips_and_removes() {
        let mut arena = QueryArena::new();
        let now = Instant::now();
        let id = arena.insert(Query::new(
            "example.com".into(),
            RecordType::A,
            RecordClass::IN,
            now,
            now,
        ));
        assert!(arena.get(id).is_some());
        let removed = arena.remove(id);
        assert!(removed.is_some());
        assert!(arena.get(id).is_none());
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn completing_twice_panics_in_debug() {
        let now = Instant::now();
        let mut query = Query::new("example.com".into(), RecordType::A, RecordClass::IN, now, now);
        query.mark_completed();
        query.mark_completed();
    }
}

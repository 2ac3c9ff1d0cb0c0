//! End-to-end scenarios mirroring spec.md §8's concrete examples,
//! driven entirely through the public `Channel`/event-interface surface
//! against the mock socket layer in `common`.

mod common;

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use aresium::prelude::*;
use aresium::query::QueryOutcome;
use aresium::socket::SocketKind;
use common::{Behavior, MockSockets, Script};

fn server_addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

/// Drive `channel` until `done` returns true or `max_ticks` elapses,
/// since the mock sockets respond synchronously within `send`.
fn drive(channel: &mut Channel, done: impl Fn() -> bool, max_ticks: usize) {
    for _ in 0..max_ticks {
        if done() {
            return;
        }
        let interests = channel.sockets_of_interest();
        for interest in interests {
            channel.process_fd(interest.fd, interest.read, interest.write);
        }
        channel.poll_timeouts();
    }
}

/// Like `drive`, but actually sleeps until the next deadline so tests
/// that depend on a genuine per-try timeout firing (rather than an
/// immediate mock reply) make real wall-clock progress.
fn drive_through_timeouts(channel: &mut Channel, done: impl Fn() -> bool, max_ticks: usize) {
    for _ in 0..max_ticks {
        if done() {
            return;
        }
        let interests = channel.sockets_of_interest();
        for interest in interests {
            channel.process_fd(interest.fd, interest.read, interest.write);
        }
        if let Some(timeout) = channel.timeout_until_next() {
            std::thread::sleep(timeout.min(Duration::from_millis(5)).max(Duration::from_micros(200)));
        }
        channel.poll_timeouts();
    }
}

#[test]
fn scenario_1_basic_success() {
    let addr = server_addr(5301);
    let mut scripts = HashMap::new();
    scripts.insert(addr, Script::new(vec![Behavior::ReplyA(vec![[1, 2, 3, 4]])]));
    let sockets = MockSockets::new(scripts);

    let mut config = Config::with_servers(vec![addr]);
    config.flags.insert(Flags::EDNS);
    config.timeout = Duration::from_millis(20);

    let mut channel = Channel::with_sockets(config, Box::new(sockets));
    let result = Rc::new(RefCell::new(None));
    let result_cb = result.clone();
    channel.query("www.google.com", RecordType::A, RecordClass::IN, move |o| {
        *result_cb.borrow_mut() = Some(o);
    });

    drive(&mut channel, || result.borrow().is_some(), 50);

    match result.borrow_mut().take().expect("callback fired") {
        QueryOutcome::Answer { records, timeouts } => {
            assert_eq!(records.len(), 1);
            assert_eq!(timeouts, 0);
        }
        QueryOutcome::Failed { status, .. } => panic!("expected success, got {status}"),
    }
}

#[test]
fn scenario_2_truncation_forces_tcp_retry() {
    let addr = server_addr(5302);
    let mut scripts = HashMap::new();
    scripts.insert(
        addr,
        Script::new(vec![Behavior::Truncate, Behavior::ReplyA(vec![[1, 2, 3, 4]])]),
    );
    let sockets = MockSockets::new(scripts);
    let tcp_log = sockets.tcp_connect_log.clone();

    let mut config = Config::with_servers(vec![addr]);
    config.timeout = Duration::from_millis(20);
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let result = Rc::new(RefCell::new(None));
    let result_cb = result.clone();
    channel.query("www.google.com", RecordType::A, RecordClass::IN, move |o| {
        *result_cb.borrow_mut() = Some(o);
    });

    drive(&mut channel, || result.borrow().is_some(), 50);

    match result.borrow_mut().take().expect("callback fired") {
        QueryOutcome::Answer { records, timeouts } => {
            assert_eq!(records.len(), 1);
            assert_eq!(timeouts, 0, "TC-forced TCP upgrade doesn't count as a timeout");
        }
        QueryOutcome::Failed { status, .. } => panic!("expected success after TCP retry, got {status}"),
    }
    assert_eq!(tcp_log.borrow().len(), 1, "exactly one TCP connect expected");
}

#[test]
fn scenario_3_dns0x20_case_mismatch_times_out() {
    let addr = server_addr(5303);
    let mut scripts = HashMap::new();
    scripts.insert(
        addr,
        Script::new(vec![
            Behavior::ReplyWrongCase(vec![[5, 6, 7, 8]]),
            Behavior::ReplyWrongCase(vec![[5, 6, 7, 8]]),
        ]),
    );
    let sockets = MockSockets::new(scripts);

    let mut config = Config::with_servers(vec![addr]);
    config.flags.insert(Flags::DNS0X20);
    config.timeout = Duration::from_millis(10);
    config.tries = 2;
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let result = Rc::new(RefCell::new(None));
    let result_cb = result.clone();
    channel.query("www.google.com", RecordType::A, RecordClass::IN, move |o| {
        *result_cb.borrow_mut() = Some(o);
    });

    drive_through_timeouts(&mut channel, || result.borrow().is_some(), 2000);

    match result.borrow_mut().take().expect("callback fired") {
        QueryOutcome::Failed { status: Status::ETimeout, .. } => {}
        other => panic!("expected ETIMEOUT from rejected mismatched responses, got {other:?}"),
    }
}

#[test]
fn scenario_7_cookie_rotation_survives_one_missing_cookie() {
    let addr = server_addr(5307);
    let mut scripts = HashMap::new();
    scripts.insert(
        addr,
        Script::new(vec![
            Behavior::ReplyWithCookie { addrs: vec![[1, 1, 1, 1]], server_cookie: [7u8; 8] },
            Behavior::ReplyA(vec![[2, 2, 2, 2]]), // no cookie option: rejected
            Behavior::ReplyWithCookie { addrs: vec![[2, 2, 2, 2]], server_cookie: [7u8; 8] },
        ]),
    );
    let sockets = MockSockets::new(scripts);

    let mut config = Config::with_servers(vec![addr]);
    config.flags.insert(Flags::COOKIE);
    config.timeout = Duration::from_millis(20);
    config.query_cache = false;
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let first = Rc::new(RefCell::new(None));
    let first_cb = first.clone();
    channel.query("a.example.com", RecordType::A, RecordClass::IN, move |o| {
        *first_cb.borrow_mut() = Some(o);
    });
    drive(&mut channel, || first.borrow().is_some(), 50);
    match first.borrow_mut().take().expect("callback fired") {
        QueryOutcome::Answer { timeouts, .. } => assert_eq!(timeouts, 0),
        QueryOutcome::Failed { status, .. } => panic!("expected first query to succeed, got {status}"),
    }

    let second = Rc::new(RefCell::new(None));
    let second_cb = second.clone();
    channel.query("b.example.com", RecordType::A, RecordClass::IN, move |o| {
        *second_cb.borrow_mut() = Some(o);
    });
    drive_through_timeouts(&mut channel, || second.borrow().is_some(), 2000);
    match second.borrow_mut().take().expect("callback fired") {
        QueryOutcome::Answer { records, timeouts } => {
            assert_eq!(records.len(), 1);
            assert_eq!(timeouts, 1, "the cookie-less reply must cost exactly one timeout");
        }
        QueryOutcome::Failed { status, .. } => panic!("expected second query to recover, got {status}"),
    }
}

#[test]
fn scenario_4_search_list_resolves_on_third_suffix() {
    let addr = server_addr(5304);
    let mut scripts = HashMap::new();
    scripts.insert(
        addr,
        Script::new(vec![
            Behavior::Rcode(3), // NXDOMAIN for www.first.com
            Behavior::Rcode(3), // NXDOMAIN for www.second.org
            Behavior::ReplyA(vec![[2, 3, 4, 5]]), // success for www.third.gov
        ]),
    );
    let sockets = MockSockets::new(scripts);

    let mut config = Config::with_servers(vec![addr]);
    config.timeout = Duration::from_millis(20);
    config.search = vec!["first.com".into(), "second.org".into(), "third.gov".into()];
    config.ndots = 1;
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let result = Rc::new(RefCell::new(None));
    let result_cb = result.clone();
    channel.search("www", RecordType::A, RecordClass::IN, move |o| {
        *result_cb.borrow_mut() = Some(o);
    });

    drive(&mut channel, || result.borrow().is_some(), 50);

    match result.borrow_mut().take().expect("callback fired") {
        QueryOutcome::Answer { records, .. } => assert_eq!(records.len(), 1),
        QueryOutcome::Failed { status, .. } => panic!("expected success on third suffix, got {status}"),
    }
}

#[test]
fn scenario_5_cache_dedup_single_socket() {
    let addr = server_addr(5305);
    let mut scripts = HashMap::new();
    scripts.insert(addr, Script::new(vec![Behavior::ReplyA(vec![[1, 2, 3, 4]])]));
    let sockets = MockSockets::new(scripts);
    let socket_log = sockets.socket_log.clone();

    let mut config = Config::with_servers(vec![addr]);
    config.timeout = Duration::from_millis(20);
    config.qcache_max_ttl = Duration::from_secs(3600);
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let first = Rc::new(RefCell::new(None));
    let first_cb = first.clone();
    channel.query("www.google.com", RecordType::A, RecordClass::IN, move |o| {
        *first_cb.borrow_mut() = Some(o);
    });
    drive(&mut channel, || first.borrow().is_some(), 50);
    assert!(matches!(first.borrow().as_ref().unwrap(), QueryOutcome::Answer { .. }));

    let second = Rc::new(RefCell::new(None));
    let second_cb = second.clone();
    channel.query("www.google.com", RecordType::A, RecordClass::IN, move |o| {
        *second_cb.borrow_mut() = Some(o);
    });
    // a cache hit fires synchronously; no extra drive needed.
    assert!(second.borrow().is_some(), "cache hit should fire synchronously");
    assert!(matches!(second.borrow().as_ref().unwrap(), QueryOutcome::Answer { .. }));

    let distinct_udp = socket_log
        .borrow()
        .iter()
        .filter(|(kind, _)| *kind == SocketKind::Udp)
        .count();
    assert_eq!(distinct_udp, 1, "only one socket-creation event expected");
}

#[test]
fn scenario_6_norotate_failover_then_best_server_first() {
    let addrs = vec![server_addr(5310), server_addr(5311), server_addr(5312)];
    let mut scripts = HashMap::new();
    scripts.insert(addrs[0], Script::new(vec![Behavior::Rcode(2), Behavior::Rcode(2)])); // SERVFAIL twice
    scripts.insert(addrs[1], Script::new(vec![Behavior::Rcode(4), Behavior::Rcode(4)])); // NOTIMP twice
    scripts.insert(
        addrs[2],
        Script::new(vec![
            Behavior::ReplyA(vec![[9, 9, 9, 9]]),
            Behavior::ReplyA(vec![[9, 9, 9, 9]]),
        ]),
    );
    let sockets = MockSockets::new(scripts);

    let mut config = Config::with_servers(addrs.clone());
    config.flags.insert(Flags::NOROTATE);
    config.timeout = Duration::from_millis(20);
    config.query_cache = false;
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let first = Rc::new(RefCell::new(None));
    let first_cb = first.clone();
    channel.query("a.example.com", RecordType::A, RecordClass::IN, move |o| {
        *first_cb.borrow_mut() = Some(o);
    });
    drive(&mut channel, || first.borrow().is_some(), 50);
    assert!(matches!(first.borrow().as_ref().unwrap(), QueryOutcome::Answer { .. }));

    let second = Rc::new(RefCell::new(None));
    let second_cb = second.clone();
    channel.query("b.example.com", RecordType::A, RecordClass::IN, move |o| {
        *second_cb.borrow_mut() = Some(o);
    });
    drive(&mut channel, || second.borrow().is_some(), 50);
    assert!(matches!(second.borrow().as_ref().unwrap(), QueryOutcome::Answer { .. }));

    // server 2 (the only one that never failed) should now be first in
    // dispatch order, matching spec.md §8 scenario 6. get_servers stays
    // in configured order regardless -- only dispatch_order reflects
    // health-driven preference.
    assert_eq!(channel.dispatch_order()[0], addrs[2]);
    assert_eq!(channel.get_servers(), addrs);
}

#[test]
fn destroy_is_synchronous_and_cancels_in_flight() {
    let addr = server_addr(5313);
    let scripts = HashMap::new(); // no scripted reply: query would otherwise hang
    let sockets = MockSockets::new(scripts);

    let mut config = Config::with_servers(vec![addr]);
    config.timeout = Duration::from_secs(5);
    let mut channel = Channel::with_sockets(config, Box::new(sockets));

    let result = Rc::new(RefCell::new(None));
    let result_cb = result.clone();
    channel.query("example.com", RecordType::A, RecordClass::IN, move |o| {
        *result_cb.borrow_mut() = Some(o);
    });

    channel.destroy();

    match result.borrow_mut().take().expect("callback fired synchronously") {
        QueryOutcome::Failed { status: Status::EDestruction, .. } => {}
        other => panic!("expected EDESTRUCTION, got {other:?}"),
    }
}

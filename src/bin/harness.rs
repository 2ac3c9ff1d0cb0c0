//! Minimal host loop demonstrating how an embedder drives `aresium`:
//! submit one query, then poll the fds `Channel` reports interested in
//! until the callback fires or the deadline passes.
//!
//! Grounded on the teacher's `src/bin/*` CLI binaries (clap derive,
//! `tracing-subscriber` init) adapted to this crate's host-driven
//! model: there is no async runtime here, just a spin/sleep loop acting
//! as the "host" the library assumes it's embedded in.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use aresium::prelude::*;
use aresium::query::QueryOutcome;

#[derive(Parser, Debug)]
#[command(name = "aresium-harness", about = "Drive a single aresium query to completion")]
struct Args {
    /// Name to resolve.
    name: String,

    /// Upstream DNS servers, e.g. --server 1.1.1.1:53
    #[arg(long = "server", required = true)]
    servers: Vec<SocketAddr>,

    /// Record type: A, AAAA, NS, MX, TXT, CNAME.
    #[arg(long, default_value = "A")]
    qtype: String,

    #[arg(long)]
    dns0x20: bool,

    #[arg(long)]
    cookies: bool,
}

fn parse_qtype(s: &str) -> RecordType {
    match s.to_ascii_uppercase().as_str() {
        "A" => RecordType::A,
        "AAAA" => RecordType::AAAA,
        "NS" => RecordType::NS,
        "MX" => RecordType::MX,
        "TXT" => RecordType::TXT,
        "CNAME" => RecordType::CNAME,
        other => {
            tracing::warn!(%other, "unrecognized qtype, defaulting to A");
            RecordType::A
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = Config::with_servers(args.servers);
    if args.dns0x20 {
        config.flags.insert(Flags::DNS0X20);
    }
    if args.cookies {
        config.flags.insert(Flags::COOKIE);
    }

    let mut channel = Channel::new(config);

    let result: Rc<RefCell<Option<QueryOutcome>>> = Rc::new(RefCell::new(None));
    let result_cb = result.clone();
    channel.query(&args.name, parse_qtype(&args.qtype), RecordClass::IN, move |outcome| {
        *result_cb.borrow_mut() = Some(outcome);
    });

    loop {
        if result.borrow().is_some() {
            break;
        }
        let Some(timeout) = channel.timeout_until_next() else {
            break;
        };
        std::thread::sleep(timeout.min(Duration::from_millis(50)));

        for interest in channel.sockets_of_interest() {
            channel.process_fd(interest.fd, interest.read, interest.write);
        }
        channel.poll_timeouts();
    }

    match result.borrow_mut().take() {
        Some(QueryOutcome::Answer { records, timeouts }) => {
            for record in records {
                println!("{:?}", record.rdata);
            }
            if timeouts > 0 {
                tracing::debug!(timeouts, "query succeeded after retries");
            }
        }
        Some(QueryOutcome::Failed { status, timeouts }) => {
            eprintln!("query failed: {status} (timeouts={timeouts})");
            std::process::exit(1);
        }
        None => {
            eprintln!("query timed out with no host-driven progress");
            std::process::exit(1);
        }
    }
}

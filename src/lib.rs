//! Host-driven asynchronous DNS stub resolver core.
//!
//! This crate has no internal I/O loop and spawns no threads: a host
//! embeds a [`channel::Channel`], submits queries through it, and drives
//! it forward via the [`event`] interface using its own reactor.

pub mod cache;
pub mod channel;
pub mod conn;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod flags;
pub mod pool;
pub mod query;
pub mod search;
pub mod socket;
pub mod status;
pub mod wire;

pub mod prelude {
    pub use crate::channel::Channel;
    pub use crate::config::Config;
    pub use crate::error::{ResolverError, Result};
    pub use crate::flags::Flags;
    pub use crate::query::QueryOutcome;
    pub use crate::status::Status;
    pub use crate::wire::{RecordClass, RecordType};
}

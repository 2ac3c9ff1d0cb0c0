//! DNS wire codec: names, enums, EDNS(0), cookies, RDATA, and the
//! top-level message encode/decode (spec.md §4.1).

pub mod cookie;
pub mod edns;
pub mod enums;
pub mod message;
pub mod name;
pub mod rdata;

pub use enums::{RecordClass, RecordType, ResponseCode};
pub use message::{Header, Message, Question, QueryParams, ResourceRecord, decode_message, encode_query};

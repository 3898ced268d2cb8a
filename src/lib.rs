/* src/lib.rs */

//! mini-dns: an authoritative and forwarding DNS server.
//!
//! Answers come from locally configured zones when possible, from a
//! TTL-aware cache of earlier answers, or from upstream nameservers tried in
//! order with bounded retries. CNAME chains through local zones are followed
//! before anything is forwarded.

pub mod cache;
pub mod codec;
pub mod config;
pub mod dns_server;
pub mod error;
pub mod pattern;
pub mod records;
pub mod resolver;
pub mod store;
pub mod upstream;
pub mod zone;

pub use cache::{AnswerCache, CacheEntry};
pub use codec::{Envelope, Flags, Rcode};
pub use config::{AppConfig, RecordEntry, ZoneConfig};
pub use error::{Error, Result};
pub use records::{Answer, Question, RRType, RecordData};
pub use resolver::DnsResolver;
pub use store::ZoneStore;
pub use upstream::{Exchange, Forwarder, UdpExchange, UpstreamReply};
pub use zone::{Record, UpdateMode, Zone};

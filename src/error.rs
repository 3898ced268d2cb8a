/* src/error.rs */

use crate::records::RRType;
use std::io;
use thiserror::Error;

/// An alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("home directory could not be determined")]
    NoHomeDir,

    /// A `/…/` record key whose body is not a valid regular expression.
    #[error("invalid record key pattern {key:?}: {source}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid {rtype} record data: {reason}")]
    InvalidRecordData { rtype: RRType, reason: String },

    #[error("upstream {nameserver} timed out after {timeout_ms}ms")]
    UpstreamTimeout { nameserver: String, timeout_ms: u64 },

    /// A question asked for a record type this server does not serve.
    #[error("unsupported record type {0}")]
    UnsupportedType(String),

    #[error("upstream {nameserver} failed: {reason}")]
    UpstreamFailure { nameserver: String, reason: String },

    #[error("invalid nameserver address: {0}")]
    InvalidNameserver(String),

    #[error("dns protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

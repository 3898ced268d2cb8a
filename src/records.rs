/* src/records.rs */

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// The record types this server knows how to store and answer.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RRType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    PTR,
    SOA,
    SRV,
    TXT,
    CAA,
    NAPTR,
    DNSKEY,
    DS,
    HINFO,
    DNAME,
    ANY,
}

impl RRType {
    pub const ALL: [RRType; 16] = [
        RRType::A,
        RRType::AAAA,
        RRType::CNAME,
        RRType::MX,
        RRType::NS,
        RRType::PTR,
        RRType::SOA,
        RRType::SRV,
        RRType::TXT,
        RRType::CAA,
        RRType::NAPTR,
        RRType::DNSKEY,
        RRType::DS,
        RRType::HINFO,
        RRType::DNAME,
        RRType::ANY,
    ];

    /// Every type that can hold records. ANY is query-only.
    pub fn storable() -> impl Iterator<Item = RRType> {
        Self::ALL.into_iter().filter(|t| *t != RRType::ANY)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RRType::A => "A",
            RRType::AAAA => "AAAA",
            RRType::CNAME => "CNAME",
            RRType::MX => "MX",
            RRType::NS => "NS",
            RRType::PTR => "PTR",
            RRType::SOA => "SOA",
            RRType::SRV => "SRV",
            RRType::TXT => "TXT",
            RRType::CAA => "CAA",
            RRType::NAPTR => "NAPTR",
            RRType::DNSKEY => "DNSKEY",
            RRType::DS => "DS",
            RRType::HINFO => "HINFO",
            RRType::DNAME => "DNAME",
            RRType::ANY => "ANY",
        }
    }

    /// IANA type code, used to cross the wire codec boundary.
    pub fn code(&self) -> u16 {
        match self {
            RRType::A => 1,
            RRType::NS => 2,
            RRType::CNAME => 5,
            RRType::SOA => 6,
            RRType::PTR => 12,
            RRType::HINFO => 13,
            RRType::MX => 15,
            RRType::TXT => 16,
            RRType::AAAA => 28,
            RRType::SRV => 33,
            RRType::NAPTR => 35,
            RRType::DNAME => 39,
            RRType::DS => 43,
            RRType::DNSKEY => 48,
            RRType::ANY => 255,
            RRType::CAA => 257,
        }
    }

    pub fn from_code(code: u16) -> Option<RRType> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl fmt::Display for RRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RRType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

fn default_preference() -> u16 {
    10
}
fn default_serial() -> u32 {
    1
}
fn default_refresh() -> u32 {
    14400
}
fn default_expire() -> u32 {
    1209600
}
fn default_minimum() -> u32 {
    86400
}
fn default_order() -> u16 {
    100
}
fn default_caa_tag() -> String {
    "issue".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxData {
    #[serde(default = "default_preference", alias = "priority")]
    pub preference: u16,
    pub exchange: String,
}

/// SOA data. The aliases accept the field names upstream resolvers
/// commonly report (`nsname`, `hostmaster`, `expiration`, `minttl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoaData {
    #[serde(alias = "nsname", alias = "primary")]
    pub mname: String,
    #[serde(alias = "hostmaster", alias = "admin")]
    pub rname: String,
    #[serde(default = "default_serial")]
    pub serial: u32,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
    #[serde(default = "default_refresh")]
    pub retry: u32,
    #[serde(default = "default_expire", alias = "expiration")]
    pub expire: u32,
    #[serde(default = "default_minimum", alias = "minttl", alias = "ttl")]
    pub minimum: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrvData {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaaData {
    #[serde(default)]
    pub flags: u8,
    #[serde(default = "default_caa_tag")]
    pub tag: String,
    pub value: String,
    #[serde(default, alias = "issuerCritical")]
    pub issuer_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaptrData {
    #[serde(default = "default_order")]
    pub order: u16,
    #[serde(default = "default_preference")]
    pub preference: u16,
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub services: String,
    #[serde(default)]
    pub regexp: String,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnskeyData {
    pub flags: u16,
    pub algorithm: u8,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsData {
    #[serde(alias = "keyTag")]
    pub key_tag: u16,
    pub algorithm: u8,
    #[serde(alias = "digestType")]
    pub digest_type: u8,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HinfoData {
    pub cpu: String,
    pub os: String,
}

/// Typed record data, one shape per [`RRType`].
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RecordData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(String),
    NS(String),
    PTR(String),
    DNAME(String),
    MX(MxData),
    SOA(SoaData),
    SRV(SrvData),
    TXT(Vec<String>),
    CAA(CaaData),
    NAPTR(NaptrData),
    DNSKEY(DnskeyData),
    DS(DsData),
    HINFO(HinfoData),
}

type Normalizer = fn(&Value) -> std::result::Result<RecordData, String>;

impl RecordData {
    pub fn rtype(&self) -> RRType {
        match self {
            RecordData::A(_) => RRType::A,
            RecordData::AAAA(_) => RRType::AAAA,
            RecordData::CNAME(_) => RRType::CNAME,
            RecordData::NS(_) => RRType::NS,
            RecordData::PTR(_) => RRType::PTR,
            RecordData::DNAME(_) => RRType::DNAME,
            RecordData::MX(_) => RRType::MX,
            RecordData::SOA(_) => RRType::SOA,
            RecordData::SRV(_) => RRType::SRV,
            RecordData::TXT(_) => RRType::TXT,
            RecordData::CAA(_) => RRType::CAA,
            RecordData::NAPTR(_) => RRType::NAPTR,
            RecordData::DNSKEY(_) => RRType::DNSKEY,
            RecordData::DS(_) => RRType::DS,
            RecordData::HINFO(_) => RRType::HINFO,
        }
    }

    /// Builds typed data for `rtype` from a loosely shaped value, as found in
    /// config files and API bodies.
    pub fn from_value(rtype: RRType, value: &Value) -> Result<Self> {
        let normalize = normalizer(rtype).ok_or_else(|| Error::InvalidRecordData {
            rtype,
            reason: "type has no data shape".to_string(),
        })?;
        normalize(value).map_err(|reason| Error::InvalidRecordData { rtype, reason })
    }

    /// The target name for CNAME records.
    pub fn cname_target(&self) -> Option<&str> {
        match self {
            RecordData::CNAME(target) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(ip) => write!(f, "{}", ip),
            RecordData::AAAA(ip) => write!(f, "{}", ip),
            RecordData::CNAME(name)
            | RecordData::NS(name)
            | RecordData::PTR(name)
            | RecordData::DNAME(name) => f.write_str(name),
            RecordData::MX(mx) => write!(f, "{} {}", mx.preference, mx.exchange),
            RecordData::SOA(soa) => write!(f, "{} {} {}", soa.mname, soa.rname, soa.serial),
            RecordData::SRV(srv) => write!(
                f,
                "{} {} {} {}",
                srv.priority, srv.weight, srv.port, srv.target
            ),
            RecordData::TXT(parts) => write!(f, "{:?}", parts),
            RecordData::CAA(caa) => write!(f, "{} {} {:?}", caa.flags, caa.tag, caa.value),
            RecordData::NAPTR(n) => write!(f, "{} {} {}", n.order, n.preference, n.replacement),
            RecordData::DNSKEY(k) => write!(f, "{} {}", k.flags, k.algorithm),
            RecordData::DS(ds) => write!(f, "{} {} {}", ds.key_tag, ds.algorithm, ds.digest_type),
            RecordData::HINFO(h) => write!(f, "{} {}", h.cpu, h.os),
        }
    }
}

/// Looks up the pure normalizer for a record type.
fn normalizer(rtype: RRType) -> Option<Normalizer> {
    let f: Normalizer = match rtype {
        RRType::A => |v| {
            let s = scalar(v)?;
            s.parse::<Ipv4Addr>()
                .map(RecordData::A)
                .map_err(|e| format!("{:?}: {}", s, e))
        },
        RRType::AAAA => |v| {
            let s = scalar(v)?;
            s.parse::<Ipv6Addr>()
                .map(RecordData::AAAA)
                .map_err(|e| format!("{:?}: {}", s, e))
        },
        RRType::CNAME => |v| Ok(RecordData::CNAME(name(v)?)),
        RRType::NS => |v| Ok(RecordData::NS(name(v)?)),
        RRType::PTR => |v| Ok(RecordData::PTR(name(v)?)),
        RRType::DNAME => |v| Ok(RecordData::DNAME(name(v)?)),
        RRType::MX => |v| shaped(v).map(RecordData::MX),
        RRType::SOA => |v| shaped(v).map(RecordData::SOA),
        RRType::SRV => |v| shaped(v).map(RecordData::SRV),
        RRType::TXT => |v| text(v).map(RecordData::TXT),
        RRType::CAA => |v| shaped(v).map(RecordData::CAA),
        RRType::NAPTR => |v| shaped(v).map(RecordData::NAPTR),
        RRType::DNSKEY => |v| shaped(v).map(RecordData::DNSKEY),
        RRType::DS => |v| shaped(v).map(RecordData::DS),
        RRType::HINFO => |v| shaped(v).map(RecordData::HINFO),
        RRType::ANY => return None,
    };
    Some(f)
}

/// Accepts either a bare string or `{ data = "…" }`.
fn scalar(value: &Value) -> std::result::Result<&str, String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Object(map) => match map.get("data") {
            Some(Value::String(s)) => Ok(s),
            _ => Err("expected a string `data` field".to_string()),
        },
        _ => Err("expected a string".to_string()),
    }
}

fn name(value: &Value) -> std::result::Result<String, String> {
    let s = scalar(value)?.trim_end_matches('.');
    if s.is_empty() {
        return Err("empty name".to_string());
    }
    Ok(s.to_string())
}

fn text(value: &Value) -> std::result::Result<Vec<String>, String> {
    let inner = match value {
        Value::Object(map) => map.get("data").unwrap_or(&Value::Null),
        other => other,
    };
    match inner {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| "TXT entries must be strings".to_string())
            })
            .collect(),
        _ => Err("expected a string or list of strings".to_string()),
    }
}

/// Structured shapes may be given inline or nested under `data`.
fn shaped<T: DeserializeOwned>(value: &Value) -> std::result::Result<T, String> {
    let inner = match value {
        Value::Object(map) if map.len() == 1 && map.contains_key("data") => &map["data"],
        other => other,
    };
    serde_json::from_value(inner.clone()).map_err(|e| e.to_string())
}

/// One question from an inbound query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Question {
    pub name: String,
    pub class: String,
    #[serde(rename = "type")]
    pub rtype: RRType,
}

impl Question {
    pub fn new(name: impl Into<String>, rtype: RRType) -> Self {
        Self {
            name: name.into(),
            class: "IN".to_string(),
            rtype,
        }
    }
}

/// A single answer produced by a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RRType,
    pub class: String,
    pub ttl: u32,
    pub data: RecordData,
    pub authoritative: bool,
}

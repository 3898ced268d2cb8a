/* src/config.rs */

use crate::error::{Error, Result};
use crate::zone::UpdateMode;
use fancy_log::{LogLevel, log};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Hard ceiling on CNAME chain length, whatever `max_depth` says.
pub const MAX_DEPTH_CEILING: usize = 256;

/// Used when neither the zone nor the global config lists nameservers.
pub const FALLBACK_NAMESERVER: &str = "8.8.8.8";

const DEFAULT_CONFIG_TEMPLATE: &str = r#"
# Default TTL (seconds) for answers from zones without their own default_ttl.
default_ttl = 300
# Maximum number of CNAME hops followed through local zones.
max_depth = 10
# Forward names that belong to no configured zone.
forward_zone_unknowns = true
# Suppress per-question resolution logging.
silent = false

[dns]
host = "127.0.0.1"
port = 53
nameservers = ["8.8.8.8", "8.8.4.4"]
retries = 4
timeout_ms = 500

# RFC-6761 reserves four TLDs for special use:
#   .example, .invalid, .localhost, and .test
[zones.test]
email = "admin.test"
forwarding = false

[[zones.test.records.A]]
key = "localhost"
data = "127.0.0.1"

[[zones.test.records.AAAA]]
key = "localhost"
data = "::1"

[[zones.test.records.CNAME]]
key = "local"
data = "localhost.test"

[[zones.test.records.MX]]
key = "localhost"
preference = 10
exchange = "mx.test"

[[zones.test.records.TXT]]
key = "test"
data = ["v=mini-dns"]
"#;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub default_ttl: u32,
    pub max_depth: usize,
    pub forward_zone_unknowns: bool,
    pub silent: bool,
    pub dns: DnsConfig,
    pub zones: BTreeMap<String, ZoneConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_ttl: 300,
            max_depth: 10,
            forward_zone_unknowns: true,
            silent: false,
            dns: DnsConfig::default(),
            zones: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DnsConfig {
    pub host: String,
    pub port: u16,
    pub nameservers: Vec<String>,
    pub retries: usize,
    pub timeout_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 53,
            nameservers: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
            retries: 4,
            timeout_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ZoneConfig {
    pub name: Option<String>,
    pub email: Option<String>,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub ttl: u32,
    pub authoritative: bool,
    pub forwarding: bool,
    pub nameservers: Option<Vec<String>>,
    pub update_mode: UpdateMode,
    pub default_ttl: Option<u32>,
    /// Record type name to `(key, data)` entries.
    pub records: BTreeMap<String, Vec<RecordEntry>>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            name: None,
            email: None,
            serial: 1,
            refresh: 14400,
            retry: 14400,
            expire: 1209600,
            ttl: 86400,
            authoritative: true,
            forwarding: true,
            nameservers: None,
            update_mode: UpdateMode::Immediate,
            default_ttl: None,
            records: BTreeMap::new(),
        }
    }
}

/// A record as written in config: its key plus type-specific data fields.
#[derive(Debug, Deserialize, Clone)]
pub struct RecordEntry {
    pub key: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl RecordEntry {
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            other => Map::from_iter([("data".to_string(), other)]),
        };
        Self {
            key: key.into(),
            data,
        }
    }

    pub fn value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

impl AppConfig {
    /// CNAME depth after applying the hard ceiling.
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(MAX_DEPTH_CEILING)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Loads config from `CONFIG_PATH` or `~/mini-dns/config.toml`, writing the
    /// default template there first if the file does not exist.
    pub fn load_or_create_default() -> Result<Self> {
        let config_path = match env::var("CONFIG_PATH").ok().filter(|s| !s.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => dirs::home_dir()
                .ok_or(Error::NoHomeDir)?
                .join("mini-dns")
                .join("config.toml"),
        };

        if !config_path.exists() {
            log(
                LogLevel::Warn,
                &format!(
                    "Config file not found. Creating default at {:?}",
                    config_path
                ),
            );
            if let Some(parent_dir) = config_path.parent() {
                fs::create_dir_all(parent_dir)?;
            }
            fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        log(
            LogLevel::Info,
            &format!("Loading config from {:?}", config_path),
        );
        let config_str = fs::read_to_string(&config_path)?;
        let mut config = Self::from_toml(&config_str)?;

        if let Some(port) = env::var("BIND_PORT").ok().and_then(|p| p.parse().ok()) {
            config.dns.port = port;
        }

        if config.zones.is_empty() {
            log(LogLevel::Warn, "Config loaded, but no zones are configured.");
        }
        if config.max_depth > MAX_DEPTH_CEILING {
            log(
                LogLevel::Warn,
                &format!(
                    "max_depth {} exceeds the ceiling, using {}",
                    config.max_depth, MAX_DEPTH_CEILING
                ),
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        let config = AppConfig::from_toml(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.dns.retries, 4);
        assert_eq!(config.dns.nameservers, vec!["8.8.8.8", "8.8.4.4"]);

        let test = &config.zones["test"];
        assert!(!test.forwarding);
        assert!(test.authoritative);
        assert_eq!(test.email.as_deref(), Some("admin.test"));
        assert_eq!(test.records["A"][0].key, "localhost");
        assert_eq!(
            test.records["MX"][0].value(),
            serde_json::json!({ "preference": 10, "exchange": "mx.test" })
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config =
            AppConfig::from_toml("max_depth = 1000\n[zones.lab]\nupdate_mode = \"deferred\"")
                .unwrap();
        assert_eq!(config.dns.port, 53);
        assert_eq!(config.effective_max_depth(), MAX_DEPTH_CEILING);
        let lab = &config.zones["lab"];
        assert_eq!(lab.update_mode, UpdateMode::Deferred);
        assert_eq!(lab.serial, 1);
        assert!(lab.forwarding);
    }

    #[test]
    fn test_record_entry_wraps_scalars() {
        let entry = RecordEntry::new("host", serde_json::json!("10.0.0.1"));
        assert_eq!(entry.value(), serde_json::json!({ "data": "10.0.0.1" }));
    }
}

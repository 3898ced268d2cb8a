/* src/store.rs */

use crate::config::{AppConfig, FALLBACK_NAMESERVER, ZoneConfig};
use crate::error::Result;
use crate::records::{Answer, RRType};
use crate::zone::{Record, Zone};
use fancy_log::{LogLevel, log};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of every configured zone plus the process-wide policy that
/// applies to names outside them.
pub struct ZoneStore {
    zones: RwLock<HashMap<String, Arc<Zone>>>,
    default_ttl: u32,
    forward_zone_unknowns: bool,
    nameservers: Vec<String>,
}

impl ZoneStore {
    pub fn new(default_ttl: u32, forward_zone_unknowns: bool, nameservers: Vec<String>) -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            default_ttl,
            forward_zone_unknowns,
            nameservers,
        }
    }

    /// Builds the store and creates every zone in the config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Self::new(
            config.default_ttl,
            config.forward_zone_unknowns,
            config.dns.nameservers.clone(),
        );
        for (key, zone) in &config.zones {
            store.create(key, zone)?;
        }
        Ok(store)
    }

    /// Builds a zone, publishes its configured records and registers it.
    /// A zone with the same name is replaced.
    pub fn create(&self, key: &str, config: &ZoneConfig) -> Result<Arc<Zone>> {
        let zone = Zone::from_config(key, config, self.default_ttl)?;
        zone.publish();
        let zone = Arc::new(zone);

        log(
            LogLevel::Info,
            &format!("Zone {} published at serial {}", zone.name(), zone.serial()),
        );
        self.zones
            .write()
            .insert(zone.name().to_string(), zone.clone());
        Ok(zone)
    }

    /// The owning zone of a name: the name with its leftmost label removed.
    /// Names with a single label own themselves.
    pub fn zone_for(name: &str) -> String {
        let name = normalize(name);
        match name.split_once('.') {
            Some((_, zone)) => zone.to_string(),
            None => name,
        }
    }

    /// The key a name is matched against inside its zone: its leftmost label.
    pub fn label_for(name: &str) -> String {
        let name = name.trim_end_matches('.');
        match name.split_once('.') {
            Some((label, _)) => label.to_string(),
            None => name.to_string(),
        }
    }

    pub fn zone(&self, zone: &str) -> Option<Arc<Zone>> {
        self.zones.read().get(zone).cloned()
    }

    pub fn exists(&self, zone: &str) -> bool {
        self.zones.read().contains_key(zone)
    }

    pub fn zone_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.zones.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// First published record of `rtype` in `zone` matching `name`.
    pub fn find(&self, zone: &str, rtype: RRType, name: &str) -> Option<Record> {
        self.zone(zone)?.find(rtype, &Self::label_for(name))
    }

    /// Every matching record of `rtype` for `fqdn`, as authoritative answers.
    pub fn resolve(&self, zone: &str, class: &str, rtype: RRType, fqdn: &str) -> Vec<Answer> {
        match self.zone(zone) {
            Some(zone) => zone.resolve(&Self::label_for(fqdn), class, rtype, fqdn),
            None => Vec::new(),
        }
    }

    pub fn ttl(&self, zone: &str) -> u32 {
        self.zone(zone)
            .map_or(self.default_ttl, |zone| zone.default_ttl())
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    pub fn should_forward(&self, zone: &str) -> bool {
        match self.zone(zone) {
            Some(zone) => zone.is_forwarding(),
            None => self.forward_zone_unknowns,
        }
    }

    /// Nameservers to forward to: the zone's override, then the global list,
    /// then a hard-coded fallback.
    pub fn nameservers(&self, zone: &str) -> Vec<String> {
        if let Some(zone) = self.zone(zone) {
            if let Some(list) = zone.nameservers().filter(|list| !list.is_empty()) {
                return list.to_vec();
            }
        }
        if !self.nameservers.is_empty() {
            return self.nameservers.clone();
        }
        vec![FALLBACK_NAMESERVER.to_string()]
    }

    /// The zone's SOA when it exists and is authoritative.
    pub fn authority(&self, zone: &str) -> Vec<Answer> {
        match self.zone(zone) {
            Some(zone) if zone.is_authoritative() => vec![zone.authority()],
            _ => Vec::new(),
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_lowercase()
}

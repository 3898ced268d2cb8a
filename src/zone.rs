/* src/zone.rs */

use crate::config::ZoneConfig;
use crate::error::{Error, Result};
use crate::pattern::Pattern;
use crate::records::{Answer, RRType, RecordData, SoaData};
use chrono::{DateTime, Utc};
use fancy_log::{LogLevel, log};
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Every mutation is applied and published as it happens.
    #[default]
    Immediate,
    /// Mutations are staged until `publish` is called.
    Deferred,
}

/// A single record owned by a zone.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub key: String,
    pub pattern: Pattern,
    pub rtype: RRType,
    pub data: RecordData,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Builds a record, compiling its key. The id is a content hash, so adding
    /// the same key and data twice yields the same id.
    pub fn new(key: &str, data: RecordData) -> Result<Self> {
        let rtype = data.rtype();
        Ok(Self {
            id: content_id(key, rtype, &data),
            key: key.to_string(),
            pattern: Pattern::compile(key)?,
            rtype,
            data,
            created_at: Utc::now(),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.test(name)
    }

    fn with_data(&self, data: RecordData) -> Self {
        Self {
            data,
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

fn content_id(key: &str, rtype: RRType, data: &RecordData) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b"|");
    hasher.update(rtype.as_str().as_bytes());
    hasher.update(b"|");
    // Serializing plain data structures cannot fail.
    hasher.update(serde_json::to_vec(data).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}

/// A staged change; `None` marks a delete.
type Staged = (String, Option<Record>);

struct ZoneState {
    serial: u32,
    soa: SoaData,
    records: BTreeMap<RRType, Vec<Record>>,
    pending: BTreeMap<RRType, Vec<Staged>>,
}

impl ZoneState {
    /// Serials follow RFC 1982 arithmetic: `u32::MAX + 1` wraps to 0, which
    /// secondaries compare as newer.
    fn bump_serial(&mut self) {
        self.serial = self.serial.wrapping_add(1);
        self.soa.serial = self.serial;
    }

    fn upsert(records: &mut Vec<Record>, record: Record) {
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    fn stage(&mut self, rtype: RRType, id: String, entry: Option<Record>) {
        let pending = self.pending.entry(rtype).or_default();
        match pending.iter_mut().find(|(staged, _)| *staged == id) {
            Some(slot) => slot.1 = entry,
            None => pending.push((id, entry)),
        }
    }

    fn current(&self, rtype: RRType, id: &str) -> Option<&Record> {
        self.records.get(&rtype)?.iter().find(|r| r.id == id)
    }
}

/// One domain's records plus its SOA metadata.
///
/// All record state sits behind a single lock so readers never observe a
/// publish half-applied across record types.
pub struct Zone {
    name: String,
    email: String,
    ttl: u32,
    authoritative: bool,
    forwarding: bool,
    nameservers: Option<Vec<String>>,
    default_ttl: u32,
    update_mode: UpdateMode,
    state: RwLock<ZoneState>,
}

impl Zone {
    /// Builds a zone and stages every configured record. Nothing is visible
    /// until the first `publish`.
    pub fn from_config(key: &str, config: &ZoneConfig, default_ttl: u32) -> Result<Self> {
        let name = config.name.as_deref().unwrap_or(key).to_lowercase();
        let email = config
            .email
            .clone()
            .unwrap_or_else(|| format!("hostmaster.{}", name))
            .to_lowercase();

        let soa = SoaData {
            mname: name.clone(),
            rname: email.clone(),
            serial: config.serial,
            refresh: config.refresh,
            retry: config.retry,
            expire: config.expire,
            minimum: config.ttl,
        };

        let mut state = ZoneState {
            serial: config.serial,
            soa,
            records: BTreeMap::new(),
            pending: BTreeMap::new(),
        };
        for rtype in RRType::storable() {
            state.records.insert(rtype, Vec::new());
            state.pending.insert(rtype, Vec::new());
        }

        log(LogLevel::Info, &format!("Creating zone {}", name));
        for (type_name, entries) in &config.records {
            let Ok(rtype) = type_name.parse::<RRType>() else {
                log(
                    LogLevel::Warn,
                    &format!("Zone {}: skipping unknown record type {}", name, type_name),
                );
                continue;
            };
            for entry in entries {
                let data = RecordData::from_value(rtype, &entry.value())?;
                let record = Record::new(&entry.key, data)?;
                log(
                    LogLevel::Info,
                    &format!("  adding {}.{} IN {}", entry.key, name, rtype),
                );
                state.stage(rtype, record.id.clone(), Some(record));
            }
        }

        Ok(Self {
            name,
            email,
            ttl: config.ttl,
            authoritative: config.authoritative,
            forwarding: config.forwarding,
            nameservers: config.nameservers.clone(),
            default_ttl: config.default_ttl.unwrap_or(default_ttl),
            update_mode: config.update_mode,
            state: RwLock::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn serial(&self) -> u32 {
        self.state.read().serial
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarding
    }

    pub fn nameservers(&self) -> Option<&[String]> {
        self.nameservers.as_deref()
    }

    /// Snapshot of the published records of one type.
    pub fn records(&self, rtype: RRType) -> Vec<Record> {
        self.state
            .read()
            .records
            .get(&rtype)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of staged, unpublished changes across all types.
    pub fn pending_len(&self) -> usize {
        self.state.read().pending.values().map(Vec::len).sum()
    }

    /// True iff a published record of `rtype` matches `name`.
    pub fn has(&self, rtype: RRType, name: &str) -> bool {
        let state = self.state.read();
        state
            .records
            .get(&rtype)
            .is_some_and(|records| records.iter().any(|r| r.matches(name)))
    }

    /// First published record of `rtype` matching `name`.
    pub fn find(&self, rtype: RRType, name: &str) -> Option<Record> {
        let state = self.state.read();
        state.records.get(&rtype)?.iter().find(|r| r.matches(name)).cloned()
    }

    /// Every published record matching `label`, as authoritative answers
    /// named `fqdn`. ANY collects across all types.
    pub fn resolve(&self, label: &str, class: &str, rtype: RRType, fqdn: &str) -> Vec<Answer> {
        let state = self.state.read();
        let types: Vec<RRType> = if rtype == RRType::ANY {
            RRType::storable().collect()
        } else {
            vec![rtype]
        };

        types
            .iter()
            .filter_map(|t| state.records.get(t))
            .flatten()
            .filter(|record| record.matches(label))
            .map(|record| Answer {
                name: fqdn.to_string(),
                rtype: record.rtype,
                class: class.to_string(),
                ttl: self.default_ttl,
                data: record.data.clone(),
                authoritative: true,
            })
            .collect()
    }

    /// The zone's SOA as an authority-section answer.
    pub fn authority(&self) -> Answer {
        let soa = self.state.read().soa.clone();
        Answer {
            name: self.name.clone(),
            rtype: RRType::SOA,
            class: "IN".to_string(),
            ttl: self.ttl,
            data: RecordData::SOA(soa),
            authoritative: true,
        }
    }

    fn applies_now(&self, immediate: bool) -> bool {
        immediate || self.update_mode == UpdateMode::Immediate
    }

    /// Adds a record. Returns `None` when `rtype` cannot hold records.
    pub fn add(
        &self,
        rtype: RRType,
        key: &str,
        data: RecordData,
        immediate: bool,
    ) -> Result<Option<Record>> {
        if rtype == RRType::ANY {
            return Ok(None);
        }
        check_shape(rtype, &data)?;
        let record = Record::new(key, data)?;

        let mut state = self.state.write();
        if self.applies_now(immediate) {
            ZoneState::upsert(state.records.entry(rtype).or_default(), record.clone());
            state.bump_serial();
        } else {
            state.stage(rtype, record.id.clone(), Some(record.clone()));
        }
        Ok(Some(record))
    }

    /// Replaces the data of the published record `id`. Returns `None` when the
    /// type cannot hold records or no such record exists.
    pub fn update(
        &self,
        rtype: RRType,
        id: &str,
        data: RecordData,
        immediate: bool,
    ) -> Result<Option<Record>> {
        if rtype == RRType::ANY {
            return Ok(None);
        }
        check_shape(rtype, &data)?;

        let mut state = self.state.write();
        let Some(current) = state.current(rtype, id) else {
            return Ok(None);
        };
        let record = current.with_data(data);

        if self.applies_now(immediate) {
            ZoneState::upsert(state.records.entry(rtype).or_default(), record.clone());
            state.bump_serial();
        } else {
            state.stage(rtype, record.id.clone(), Some(record.clone()));
        }
        Ok(Some(record))
    }

    /// Removes the published record `id`. Returns false when it does not exist.
    pub fn delete(&self, rtype: RRType, id: &str, immediate: bool) -> bool {
        if rtype == RRType::ANY {
            return false;
        }
        let mut state = self.state.write();
        if state.current(rtype, id).is_none() {
            return false;
        }

        if self.applies_now(immediate) {
            if let Some(records) = state.records.get_mut(&rtype) {
                records.retain(|r| r.id != id);
            }
            state.bump_serial();
        } else {
            state.stage(rtype, id.to_string(), None);
        }
        true
    }

    /// Merges every staged change into the published records and bumps the
    /// serial, all under one write lock.
    pub fn publish(&self) {
        let mut state = self.state.write();
        let pending = std::mem::take(&mut state.pending);

        for (rtype, staged) in pending {
            let records = state.records.entry(rtype).or_default();
            for (id, entry) in staged {
                match entry {
                    Some(record) => ZoneState::upsert(records, record),
                    None => records.retain(|r| r.id != id),
                }
            }
            state.pending.insert(rtype, Vec::new());
        }

        state.bump_serial();
    }
}

fn check_shape(rtype: RRType, data: &RecordData) -> Result<()> {
    if data.rtype() != rtype {
        return Err(Error::InvalidRecordData {
            rtype,
            reason: format!("got {} data", data.rtype()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn zone(update_mode: UpdateMode) -> Zone {
        zone_at(update_mode, 1)
    }

    fn zone_at(update_mode: UpdateMode, serial: u32) -> Zone {
        let config = ZoneConfig {
            update_mode,
            serial,
            ..ZoneConfig::default()
        };
        let zone = Zone::from_config("Example", &config, 300).unwrap();
        zone.publish();
        zone
    }

    fn a(last: u8) -> RecordData {
        RecordData::A(Ipv4Addr::new(10, 0, 0, last))
    }

    fn ids(zone: &Zone, rtype: RRType) -> Vec<String> {
        zone.records(rtype).into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_defaults_and_initial_publish() {
        let zone = zone(UpdateMode::Immediate);
        assert_eq!(zone.name(), "example");
        assert_eq!(zone.email(), "hostmaster.example");
        assert_eq!(zone.serial(), 2);
        assert_eq!(zone.default_ttl(), 300);

        let authority = zone.authority();
        assert_eq!(authority.rtype, RRType::SOA);
        assert_eq!(authority.ttl, 86400);
        let RecordData::SOA(soa) = authority.data else {
            panic!("expected SOA data");
        };
        assert_eq!(soa.serial, 2);
        assert_eq!(soa.mname, "example");

        for rtype in RRType::storable() {
            assert!(zone.records(rtype).is_empty());
        }
    }

    #[test]
    fn test_record_id_is_content_hash() {
        let one = Record::new("host", a(1)).unwrap();
        let two = Record::new("host", a(1)).unwrap();
        let other = Record::new("host", a(2)).unwrap();
        assert_eq!(one.id, two.id);
        assert_ne!(one.id, other.id);
    }

    #[test]
    fn test_add_is_idempotent() {
        let zone = zone(UpdateMode::Immediate);
        zone.add(RRType::A, "host", a(1), true).unwrap();
        zone.add(RRType::A, "host", a(1), true).unwrap();
        assert_eq!(zone.records(RRType::A).len(), 1);
    }

    #[test]
    fn test_resolve_collects_every_match() {
        let zone = zone(UpdateMode::Immediate);
        zone.add(RRType::A, "host", a(1), true).unwrap();
        zone.add(RRType::A, "*", a(2), true).unwrap();
        zone.add(RRType::A, "other", a(3), true).unwrap();

        let answers = zone.resolve("HOST", "IN", RRType::A, "HOST.example");
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().all(|a| a.authoritative && a.ttl == 300));
        assert!(answers.iter().all(|a| a.name == "HOST.example"));
        assert!(zone.has(RRType::A, "host"));
        assert!(!zone.has(RRType::AAAA, "host"));
    }

    #[test]
    fn test_resolve_any_spans_types() {
        let zone = zone(UpdateMode::Immediate);
        zone.add(RRType::A, "host", a(1), true).unwrap();
        zone.add(
            RRType::TXT,
            "host",
            RecordData::TXT(vec!["hi".to_string()]),
            true,
        )
        .unwrap();

        let answers = zone.resolve("host", "IN", RRType::ANY, "host.example");
        let types: Vec<RRType> = answers.iter().map(|a| a.rtype).collect();
        assert_eq!(types, vec![RRType::A, RRType::TXT]);
    }

    #[test]
    fn test_batched_publish_matches_immediate_adds() {
        let immediate = zone(UpdateMode::Immediate);
        let batched = zone(UpdateMode::Deferred);
        let start = immediate.serial();
        assert_eq!(batched.serial(), start);

        for last in 1..=3 {
            immediate.add(RRType::A, "host", a(last), true).unwrap();
            batched.add(RRType::A, "host", a(last), false).unwrap();
        }
        assert!(batched.records(RRType::A).is_empty());
        assert_eq!(batched.pending_len(), 3);
        assert_eq!(batched.serial(), start);

        batched.publish();

        assert_eq!(ids(&batched, RRType::A), ids(&immediate, RRType::A));
        assert_eq!(immediate.serial(), start + 3);
        assert_eq!(batched.serial(), start + 1);
        assert_eq!(batched.pending_len(), 0);
    }

    #[test]
    fn test_immediate_flag_overrides_deferred_mode() {
        let zone = zone(UpdateMode::Deferred);
        let start = zone.serial();
        zone.add(RRType::A, "host", a(1), true).unwrap();
        assert_eq!(zone.records(RRType::A).len(), 1);
        assert_eq!(zone.serial(), start + 1);
    }

    #[test]
    fn test_staged_update_and_delete() {
        let zone = zone(UpdateMode::Deferred);
        let keep = zone.add(RRType::A, "keep", a(1), true).unwrap().unwrap();
        let drop = zone.add(RRType::A, "drop", a(2), true).unwrap().unwrap();

        let updated = zone.update(RRType::A, &keep.id, a(9), false).unwrap().unwrap();
        assert_eq!(updated.id, keep.id);
        assert!(zone.delete(RRType::A, &drop.id, false));

        // Nothing visible until publish.
        assert_eq!(zone.records(RRType::A).len(), 2);
        zone.publish();

        let records = zone.records(RRType::A);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, a(9));
    }

    #[test]
    fn test_sentinel_failures() {
        let zone = zone(UpdateMode::Immediate);
        let serial = zone.serial();
        assert!(zone.add(RRType::ANY, "x", a(1), true).unwrap().is_none());
        assert!(zone.update(RRType::A, "missing", a(1), true).unwrap().is_none());
        assert!(!zone.delete(RRType::A, "missing", true));
        assert!(!zone.delete(RRType::ANY, "missing", true));
        assert_eq!(zone.serial(), serial);
    }

    #[test]
    fn test_mismatched_data_and_bad_key_are_errors() {
        let zone = zone(UpdateMode::Immediate);
        assert!(matches!(
            zone.add(RRType::AAAA, "host", a(1), true),
            Err(Error::InvalidRecordData { .. })
        ));
        assert!(matches!(
            zone.add(RRType::A, "/([/", a(1), true),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_serial_wraps_at_u32_max() {
        // Initial publish takes MAX - 1 to MAX.
        let zone = zone_at(UpdateMode::Immediate, u32::MAX - 1);
        assert_eq!(zone.serial(), u32::MAX);

        zone.add(RRType::A, "host", a(1), true).unwrap();
        assert_eq!(zone.serial(), 0);
        let RecordData::SOA(soa) = zone.authority().data else {
            panic!("expected SOA data");
        };
        assert_eq!(soa.serial, 0);
    }

    #[test]
    fn test_publish_is_never_torn_across_types() {
        let zone = zone(UpdateMode::Deferred);
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        for batch in 0..50 {
                            let label = format!("b{}", batch);
                            let answers =
                                zone.resolve(&label, "IN", RRType::ANY, "b.example");
                            let a_count =
                                answers.iter().filter(|a| a.rtype == RRType::A).count();
                            let txt_count =
                                answers.iter().filter(|a| a.rtype == RRType::TXT).count();
                            assert_eq!(a_count, txt_count, "torn publish for {}", label);
                        }
                    }
                });
            }

            scope.spawn(|| {
                for batch in 0..50u8 {
                    let label = format!("b{}", batch);
                    zone.add(RRType::A, &label, a(batch), false).unwrap();
                    zone.add(
                        RRType::TXT,
                        &label,
                        RecordData::TXT(vec![label.clone()]),
                        false,
                    )
                    .unwrap();
                    zone.publish();
                }
                done.store(true, Ordering::Release);
            });
        });

        assert_eq!(zone.records(RRType::A).len(), 50);
        assert_eq!(zone.records(RRType::TXT).len(), 50);
    }
}

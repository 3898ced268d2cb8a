/* src/resolver.rs */

use crate::cache::{AnswerCache, CacheEntry};
use crate::codec::{Envelope, Flags, Rcode};
use crate::config::MAX_DEPTH_CEILING;
use crate::records::{Answer, Question, RRType, RecordData};
use crate::store::ZoneStore;
use crate::upstream::{Forwarder, UpstreamReply};
use chrono::Utc;
use fancy_log::{LogLevel, log};
use futures::future::join_all;
use std::sync::Arc;

/// Decides where each answer comes from: cache, local zones, or upstream.
pub struct DnsResolver {
    store: Arc<ZoneStore>,
    cache: AnswerCache,
    forwarder: Forwarder,
    max_depth: usize,
    silent: bool,
}

impl DnsResolver {
    pub fn new(
        store: Arc<ZoneStore>,
        cache: AnswerCache,
        forwarder: Forwarder,
        max_depth: usize,
        silent: bool,
    ) -> Self {
        Self {
            store,
            cache,
            forwarder,
            max_depth: max_depth.min(MAX_DEPTH_CEILING),
            silent,
        }
    }

    pub fn store(&self) -> &Arc<ZoneStore> {
        &self.store
    }

    pub fn cache(&self) -> &AnswerCache {
        &self.cache
    }

    /// Resolves every question of a query and assembles the response.
    pub async fn resolve(&self, query: &Envelope) -> Envelope {
        let mut response = Envelope {
            id: query.id,
            flags: Flags {
                qr: true,
                rd: true,
                ra: true,
                aa: false,
                rcode: Rcode::NoError,
            },
            questions: query.questions.clone(),
            ..Envelope::default()
        };

        if query.questions.is_empty() {
            response.flags.rcode = Rcode::FormatError;
            return response;
        }

        let results = join_all(query.questions.iter().map(|q| self.resolve_question(q))).await;

        let mut answered = 0;
        for (question, answers) in query.questions.iter().zip(results) {
            let zone = ZoneStore::zone_for(&question.name);
            let local = answers.is_empty() || answers.iter().any(|a| a.authoritative);
            if local {
                for soa in self.store.authority(&zone) {
                    if !response.authority.contains(&soa) {
                        response.authority.push(soa);
                    }
                }
            }
            if !answers.is_empty() {
                answered += 1;
            }
            response.answers.extend(answers);
        }

        response.flags.aa = response.answers.iter().any(|a| a.authoritative);
        response.flags.rcode = if answered == query.questions.len() {
            Rcode::NoError
        } else {
            Rcode::NameError
        };
        response
    }

    /// Answers one question. An empty list means nothing was found, either
    /// authoritatively or because every upstream failed.
    pub async fn resolve_question(&self, question: &Question) -> Vec<Answer> {
        if let Some(entry) = self.cache.get(question) {
            return entry.aged_answers(Utc::now().timestamp());
        }

        let zone = ZoneStore::zone_for(&question.name);

        if self.store.exists(&zone) {
            let direct =
                self.store
                    .resolve(&zone, &question.class, question.rtype, &question.name);
            if !direct.is_empty() {
                self.remember(question, &direct, true, self.store.ttl(&zone));
                return direct;
            }
        } else if !self.store.should_forward(&zone) {
            return Vec::new();
        }

        let mut chain = Vec::new();
        let canonical = self.canonicalize(question, &mut chain);

        if !chain.is_empty() {
            let target_zone = ZoneStore::zone_for(&canonical.name);
            let local = self.store.resolve(
                &target_zone,
                &canonical.class,
                canonical.rtype,
                &canonical.name,
            );
            if !local.is_empty() || !self.store.should_forward(&zone) {
                chain.extend(local);
                self.remember(question, &chain, true, self.store.ttl(&zone));
                return chain;
            }
        }

        if !self.store.should_forward(&zone) {
            return chain;
        }

        if !self.silent {
            if canonical.name == question.name {
                log(
                    LogLevel::Info,
                    &format!(
                        "Resolving {} {} {}...",
                        question.name, question.class, question.rtype
                    ),
                );
            } else {
                log(
                    LogLevel::Info,
                    &format!(
                        "Resolving {} as {} {} {}...",
                        question.name, canonical.name, question.class, question.rtype
                    ),
                );
            }
        }

        let nameservers = self.store.nameservers(&zone);
        let upstream = match self.forwarder.forward(&canonical, &nameservers).await {
            Some(UpstreamReply::Answers(answers)) => answers,
            Some(UpstreamReply::NotFound) => Vec::new(),
            // Exhausted: a partial chain must not be served or cached.
            None => return Vec::new(),
        };

        let ttl = upstream
            .iter()
            .map(|a| a.ttl)
            .min()
            .unwrap_or_else(|| self.store.default_ttl());
        chain.extend(upstream);
        self.remember(question, &chain, false, ttl);
        chain
    }

    /// Follows CNAME records through local zones, appending one synthesized
    /// answer per hop, and returns the question to actually ask. The depth
    /// bound is the only loop guard.
    pub fn canonicalize(&self, question: &Question, chain: &mut Vec<Answer>) -> Question {
        let mut canonical = question.clone();
        if question.rtype == RRType::CNAME {
            return canonical;
        }

        for _ in 0..self.max_depth {
            let zone = ZoneStore::zone_for(&canonical.name);
            let Some(record) = self.store.find(&zone, RRType::CNAME, &canonical.name) else {
                break;
            };
            let Some(target) = record.data.cname_target() else {
                break;
            };
            chain.push(Answer {
                name: canonical.name.clone(),
                rtype: RRType::CNAME,
                class: canonical.class.clone(),
                ttl: self.store.ttl(&zone),
                data: RecordData::CNAME(target.to_string()),
                authoritative: true,
            });
            canonical.name = target.to_string();
        }

        canonical
    }

    fn remember(&self, question: &Question, answers: &[Answer], authoritative: bool, ttl: u32) {
        if answers.is_empty() {
            return;
        }
        let entry = CacheEntry::new(
            answers.to_vec(),
            authoritative,
            Utc::now().timestamp(),
            ttl,
        );
        self.cache.set(question, entry, ttl);
    }
}

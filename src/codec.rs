/* src/codec.rs */

//! Adapter between DNS wire messages (via hickory-proto) and the plain
//! envelope the resolver works on.

use crate::error::{Error, Result};
use crate::records::{
    Answer, HinfoData, MxData, NaptrData, Question, RRType, RecordData, SoaData, SrvData,
};
use fancy_log::{LogLevel, log};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, HINFO, MX, NAPTR, NS, PTR, SOA, SRV, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rcode {
    #[default]
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
}

impl From<Rcode> for ResponseCode {
    fn from(rcode: Rcode) -> Self {
        match rcode {
            Rcode::NoError => ResponseCode::NoError,
            Rcode::FormatError => ResponseCode::FormErr,
            Rcode::ServerFailure => ResponseCode::ServFail,
            Rcode::NameError => ResponseCode::NXDomain,
            Rcode::NotImplemented => ResponseCode::NotImp,
            Rcode::Refused => ResponseCode::Refused,
        }
    }
}

impl From<ResponseCode> for Rcode {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::NoError => Rcode::NoError,
            ResponseCode::FormErr => Rcode::FormatError,
            ResponseCode::NXDomain => Rcode::NameError,
            ResponseCode::NotImp => Rcode::NotImplemented,
            ResponseCode::Refused => Rcode::Refused,
            _ => Rcode::ServerFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub qr: bool,
    pub rd: bool,
    pub ra: bool,
    pub aa: bool,
    pub rcode: Rcode,
}

/// A DNS message in the shape the resolver consumes and produces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub authority: Vec<Answer>,
    pub additional: Vec<Answer>,
}

impl Envelope {
    pub fn query(id: u16, questions: Vec<Question>) -> Self {
        Self {
            id,
            flags: Flags {
                rd: true,
                ..Flags::default()
            },
            questions,
            ..Self::default()
        }
    }
}

pub fn to_record_type(rtype: RRType) -> RecordType {
    RecordType::from(rtype.code())
}

pub fn from_record_type(rtype: RecordType) -> Option<RRType> {
    RRType::from_code(u16::from(rtype))
}

/// Decodes a wire message. Questions for types outside [`RRType`] fail with
/// [`Error::UnsupportedType`]; see [`not_implemented`] for the reply.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let message = Message::from_bytes(bytes)?;

    let mut questions = Vec::with_capacity(message.queries().len());
    for query in message.queries() {
        let rtype = from_record_type(query.query_type())
            .ok_or_else(|| Error::UnsupportedType(query.query_type().to_string()))?;
        questions.push(Question {
            name: plain_name(query.name()),
            class: query.query_class().to_string(),
            rtype,
        });
    }

    Ok(Envelope {
        id: message.id(),
        flags: Flags {
            qr: message.message_type() == MessageType::Response,
            rd: message.recursion_desired(),
            ra: message.recursion_available(),
            aa: message.authoritative(),
            rcode: message.response_code().into(),
        },
        questions,
        answers: answers_from(message.answers(), false),
        authority: answers_from(message.name_servers(), false),
        additional: answers_from(message.additionals(), false),
    })
}

/// Answers a well-formed query that asks for a type outside [`RRType`]:
/// NOTIMP with the questions echoed as received.
pub fn not_implemented(bytes: &[u8]) -> Result<Vec<u8>> {
    let request = Message::from_bytes(bytes)?;

    let mut message = Message::new();
    message
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NotImp);
    for query in request.queries() {
        message.add_query(query.clone());
    }

    Ok(message.to_bytes()?)
}

pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let mut message = Message::new();
    message
        .set_id(envelope.id)
        .set_message_type(if envelope.flags.qr {
            MessageType::Response
        } else {
            MessageType::Query
        })
        .set_op_code(OpCode::Query)
        .set_authoritative(envelope.flags.aa)
        .set_recursion_desired(envelope.flags.rd)
        .set_recursion_available(envelope.flags.ra)
        .set_response_code(envelope.flags.rcode.into());

    for question in &envelope.questions {
        let mut query = Query::query(fqdn(&question.name)?, to_record_type(question.rtype));
        query.set_query_class(DNSClass::from_str(&question.class).unwrap_or(DNSClass::IN));
        message.add_query(query);
    }
    for record in records_from(&envelope.answers) {
        message.add_answer(record);
    }
    for record in records_from(&envelope.authority) {
        message.add_name_server(record);
    }
    for record in records_from(&envelope.additional) {
        message.add_additional(record);
    }

    Ok(message.to_bytes()?)
}

/// Converts wire records into answers, skipping data we cannot represent.
pub fn answers_from(records: &[Record], authoritative: bool) -> Vec<Answer> {
    records
        .iter()
        .filter_map(|record| {
            let Some(data) = from_rdata(record.data()) else {
                log(
                    LogLevel::Debug,
                    &format!(
                        "Skipping {} record for {} with no local data shape",
                        record.record_type(),
                        record.name()
                    ),
                );
                return None;
            };
            Some(Answer {
                name: plain_name(record.name()),
                rtype: data.rtype(),
                class: record.dns_class().to_string(),
                ttl: record.ttl(),
                data,
                authoritative,
            })
        })
        .collect()
}

fn records_from(answers: &[Answer]) -> Vec<Record> {
    answers
        .iter()
        .filter_map(|answer| match to_record(answer) {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                log(
                    LogLevel::Debug,
                    &format!(
                        "Dropping {} answer for {}: no wire mapping",
                        answer.rtype, answer.name
                    ),
                );
                None
            }
            Err(e) => {
                log(
                    LogLevel::Warn,
                    &format!("Dropping {} answer for {}: {}", answer.rtype, answer.name, e),
                );
                None
            }
        })
        .collect()
}

fn to_record(answer: &Answer) -> Result<Option<Record>> {
    let Some(rdata) = to_rdata(&answer.data)? else {
        return Ok(None);
    };
    let mut record = Record::from_rdata(fqdn(&answer.name)?, answer.ttl, rdata);
    record.set_dns_class(DNSClass::from_str(&answer.class).unwrap_or(DNSClass::IN));
    Ok(Some(record))
}

/// Wire form of typed data. `None` for types hickory has no simple
/// constructor for (CAA, DNSKEY, DS, DNAME).
pub fn to_rdata(data: &RecordData) -> Result<Option<RData>> {
    let rdata = match data {
        RecordData::A(ip) => RData::A(A::from(*ip)),
        RecordData::AAAA(ip) => RData::AAAA(AAAA::from(*ip)),
        RecordData::CNAME(name) => RData::CNAME(CNAME(fqdn(name)?)),
        RecordData::NS(name) => RData::NS(NS(fqdn(name)?)),
        RecordData::PTR(name) => RData::PTR(PTR(fqdn(name)?)),
        RecordData::MX(mx) => RData::MX(MX::new(mx.preference, fqdn(&mx.exchange)?)),
        RecordData::SOA(soa) => RData::SOA(SOA::new(
            fqdn(&soa.mname)?,
            fqdn(&soa.rname)?,
            soa.serial,
            clamp_i32(soa.refresh),
            clamp_i32(soa.retry),
            clamp_i32(soa.expire),
            soa.minimum,
        )),
        RecordData::SRV(srv) => RData::SRV(SRV::new(
            srv.priority,
            srv.weight,
            srv.port,
            fqdn(&srv.target)?,
        )),
        RecordData::TXT(parts) => RData::TXT(TXT::new(parts.clone())),
        RecordData::HINFO(h) => RData::HINFO(HINFO::new(h.cpu.clone(), h.os.clone())),
        RecordData::NAPTR(n) => RData::NAPTR(NAPTR::new(
            n.order,
            n.preference,
            n.flags.as_bytes().into(),
            n.services.as_bytes().into(),
            n.regexp.as_bytes().into(),
            fqdn(&n.replacement)?,
        )),
        RecordData::CAA(_) | RecordData::DNSKEY(_) | RecordData::DS(_) | RecordData::DNAME(_) => {
            return Ok(None);
        }
    };
    Ok(Some(rdata))
}

/// The normalization table for upstream data: one arm per supported type.
pub fn from_rdata(rdata: &RData) -> Option<RecordData> {
    let data = match rdata {
        RData::A(a) => RecordData::A(a.0),
        RData::AAAA(aaaa) => RecordData::AAAA(aaaa.0),
        RData::CNAME(name) => RecordData::CNAME(plain_name(&name.0)),
        RData::NS(name) => RecordData::NS(plain_name(&name.0)),
        RData::PTR(name) => RecordData::PTR(plain_name(&name.0)),
        RData::MX(mx) => RecordData::MX(MxData {
            preference: mx.preference(),
            exchange: plain_name(mx.exchange()),
        }),
        RData::SOA(soa) => RecordData::SOA(SoaData {
            mname: plain_name(soa.mname()),
            rname: plain_name(soa.rname()),
            serial: soa.serial(),
            refresh: soa.refresh().max(0) as u32,
            retry: soa.retry().max(0) as u32,
            expire: soa.expire().max(0) as u32,
            minimum: soa.minimum(),
        }),
        RData::SRV(srv) => RecordData::SRV(SrvData {
            priority: srv.priority(),
            weight: srv.weight(),
            port: srv.port(),
            target: plain_name(srv.target()),
        }),
        RData::TXT(txt) => RecordData::TXT(
            txt.txt_data()
                .iter()
                .map(|part| String::from_utf8_lossy(part).into_owned())
                .collect(),
        ),
        RData::HINFO(h) => RecordData::HINFO(HinfoData {
            cpu: String::from_utf8_lossy(h.cpu()).into_owned(),
            os: String::from_utf8_lossy(h.os()).into_owned(),
        }),
        RData::NAPTR(n) => RecordData::NAPTR(NaptrData {
            order: n.order(),
            preference: n.preference(),
            flags: String::from_utf8_lossy(n.flags()).into_owned(),
            services: String::from_utf8_lossy(n.services()).into_owned(),
            regexp: String::from_utf8_lossy(n.regexp()).into_owned(),
            replacement: plain_name(n.replacement()),
        }),
        _ => return None,
    };
    Some(data)
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Names travel through the core without the trailing root dot.
pub fn plain_name(name: &Name) -> String {
    let name = name.to_string();
    name.strip_suffix('.').unwrap_or(&name).to_string()
}

pub fn fqdn(name: &str) -> Result<Name> {
    let name = name.trim_end_matches('.');
    Ok(Name::from_str(&format!("{}.", name))?)
}

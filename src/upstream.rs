/* src/upstream.rs */

use crate::codec::{self, to_record_type};
use crate::error::{Error, Result};
use crate::records::{Answer, Question};
use async_trait::async_trait;
use fancy_log::{LogLevel, log};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const DNS_PORT: u16 = 53;

/// What a nameserver said about a question.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamReply {
    /// A successful response, possibly without records.
    Answers(Vec<Answer>),
    /// The nameserver reported the name does not exist.
    NotFound,
}

/// One attempt of one question against one nameserver.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, nameserver: &str, question: &Question) -> Result<UpstreamReply>;
}

/// Parses `ip` or `ip:port`; bare addresses use port 53.
pub fn nameserver_addr(nameserver: &str) -> Result<SocketAddr> {
    if let Ok(addr) = nameserver.parse::<SocketAddr>() {
        return Ok(addr);
    }
    nameserver
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| Error::InvalidNameserver(nameserver.to_string()))
}

/// Plain DNS over UDP using a fresh socket per attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpExchange;

#[async_trait]
impl Exchange for UdpExchange {
    async fn exchange(&self, nameserver: &str, question: &Question) -> Result<UpstreamReply> {
        let addr = nameserver_addr(nameserver)?;
        let id: u16 = rand::random();

        let mut request = Message::new();
        request
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        request.add_query(Query::query(
            codec::fqdn(&question.name)?,
            to_record_type(question.rtype),
        ));
        let bytes = request.to_bytes()?;

        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.send_to(&bytes, addr).await?;

        let mut buf = [0u8; 4096];
        let response = loop {
            let (len, from) = socket.recv_from(&mut buf).await?;
            if from != addr {
                continue;
            }
            let response = Message::from_bytes(&buf[..len])?;
            if response.id() == id {
                break response;
            }
        };

        match response.response_code() {
            ResponseCode::NoError => {
                Ok(UpstreamReply::Answers(codec::answers_from(
                    response.answers(),
                    false,
                )))
            }
            ResponseCode::NXDomain => Ok(UpstreamReply::NotFound),
            other => Err(Error::UpstreamFailure {
                nameserver: nameserver.to_string(),
                reason: other.to_string(),
            }),
        }
    }
}

/// Queries nameservers in order, retrying each with a per-attempt timeout.
#[derive(Clone)]
pub struct Forwarder {
    exchange: Arc<dyn Exchange>,
    retries: usize,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(exchange: Arc<dyn Exchange>, retries: usize, timeout_ms: u64) -> Self {
        Self {
            exchange,
            retries: retries.max(1),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// The first nameserver to give any reply wins. `None` means every
    /// nameserver ran out of attempts.
    pub async fn forward(
        &self,
        question: &Question,
        nameservers: &[String],
    ) -> Option<UpstreamReply> {
        for nameserver in nameservers {
            for attempt in 1..=self.retries {
                let attempt_result =
                    timeout(self.timeout, self.exchange.exchange(nameserver, question)).await;
                let outcome = match attempt_result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::UpstreamTimeout {
                        nameserver: nameserver.clone(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }),
                };

                match outcome {
                    Ok(reply) => return Some(reply),
                    Err(e) => log(
                        LogLevel::Debug,
                        &format!(
                            "{} {} attempt {}/{} failed: {}",
                            question.name, question.rtype, attempt, self.retries, e
                        ),
                    ),
                }
            }
            log(
                LogLevel::Warn,
                &format!(
                    "Nameserver {} gave no answer for {} {}",
                    nameserver, question.name, question.rtype
                ),
            );
        }

        log(
            LogLevel::Warn,
            &format!(
                "All nameservers exhausted for {} {}",
                question.name, question.rtype
            ),
        );
        None
    }
}

/* src/dns_server.rs */

use crate::codec::{self, Envelope};
use crate::error::Error;
use crate::records::Answer;
use crate::resolver::DnsResolver;
use fancy_log::{LogLevel, log};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Runs the UDP DNS server. Each datagram is handled on its own task so a
/// slow upstream never stalls the receive loop.
pub async fn run_server(
    bind_addr: &str,
    resolver: Arc<DnsResolver>,
) -> Result<(), Box<dyn std::error::Error>> {
    let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
    log(
        LogLevel::Info,
        &format!("DNS server listening for UDP on {}", bind_addr),
    );
    serve(socket, resolver).await
}

/// Serves queries on an already bound socket until it errors.
pub async fn serve(
    socket: Arc<UdpSocket>,
    resolver: Arc<DnsResolver>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = [0; 512];

    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                log(LogLevel::Warn, &format!("UDP receive failed: {}", e));
                continue;
            }
        };
        let data = buf[..len].to_vec();
        let resolver = resolver.clone();
        let socket = socket.clone();

        tokio::spawn(async move {
            if let Some(response_bytes) = handle_request(&data, addr, &resolver).await {
                if let Err(e) = socket.send_to(&response_bytes, addr).await {
                    log(
                        LogLevel::Error,
                        &format!("Failed to send UDP response to {}: {}", addr, e),
                    );
                }
            }
        });
    }
}

/// Decodes, resolves and encodes one datagram. `None` means drop it.
pub async fn handle_request(
    data: &[u8],
    addr: SocketAddr,
    resolver: &DnsResolver,
) -> Option<Vec<u8>> {
    let query = match codec::decode(data) {
        Ok(query) => query,
        Err(Error::UnsupportedType(rtype)) => {
            log(
                LogLevel::Info,
                &format!("{} inquiry for unsupported type {} -> NOTIMP", addr.ip(), rtype),
            );
            return match codec::not_implemented(data) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log(
                        LogLevel::Error,
                        &format!("Failed to encode NOTIMP for {}: {}", addr, e),
                    );
                    None
                }
            };
        }
        Err(e) => {
            log(
                LogLevel::Warn,
                &format!("Failed to parse request from {}: {}", addr, e),
            );
            return None;
        }
    };

    if query.flags.qr {
        return None;
    }

    let response = resolver.resolve(&query).await;
    log_response(addr, &response);

    match codec::encode(&response) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log(
                LogLevel::Error,
                &format!("Failed to encode response for {}: {}", addr, e),
            );
            None
        }
    }
}

fn log_response(addr: SocketAddr, response: &Envelope) {
    let names = response
        .questions
        .iter()
        .map(|q| format!("{} {}", q.name, q.rtype))
        .collect::<Vec<_>>()
        .join(", ");
    if response.answers.is_empty() {
        log(
            LogLevel::Info,
            &format!("{} inquiry {} -> {:?}", addr.ip(), names, response.flags.rcode),
        );
    } else {
        log(
            LogLevel::Info,
            &format!(
                "{} inquiry {} get {}",
                addr.ip(),
                names,
                format_answers(&response.answers)
            ),
        );
    }
}

/// Formats answers grouped by type for logging, e.g. `A [1.2.3.4, 5.6.7.8]`.
fn format_answers(answers: &[Answer]) -> String {
    let mut grouped = BTreeMap::<_, Vec<String>>::new();
    for answer in answers {
        grouped
            .entry(answer.rtype)
            .or_default()
            .push(answer.data.to_string());
    }

    grouped
        .iter()
        .map(|(rtype, vals)| format!("{} [{}]", rtype, vals.join(", ")))
        .collect::<Vec<_>>()
        .join(" ")
}

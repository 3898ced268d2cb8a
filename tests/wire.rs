/* tests/wire.rs */

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use mini_dns::{
    AnswerCache, AppConfig, DnsResolver, Envelope, Forwarder, Question, RRType, Rcode,
    RecordData, UdpExchange, ZoneStore, codec, dns_server,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const CONFIG: &str = r#"
silent = true

[dns]
nameservers = ["@UPSTREAM@"]
retries = 2
timeout_ms = 500

[zones.test]
forwarding = false

[[zones.test.records.A]]
key = "localhost"
data = "127.0.0.1"

[[zones.test.records.CNAME]]
key = "local"
data = "localhost.test"
"#;

/// Answers every A question with 198.51.100.4 and everything else with
/// NXDOMAIN.
async fn spawn_upstream() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let (len, from) = socket.recv_from(&mut buf).await.unwrap();
            let request = Message::from_bytes(&buf[..len]).unwrap();

            let mut response = Message::new();
            response
                .set_id(request.id())
                .set_message_type(MessageType::Response)
                .set_recursion_available(true);
            for query in request.queries() {
                response.add_query(query.clone());
                if query.query_type() == RecordType::A {
                    response.add_answer(Record::from_rdata(
                        query.name().clone(),
                        45,
                        RData::A(A(Ipv4Addr::new(198, 51, 100, 4))),
                    ));
                } else {
                    response.set_response_code(ResponseCode::NXDomain);
                }
            }
            socket
                .send_to(&response.to_bytes().unwrap(), from)
                .await
                .unwrap();
        }
    });

    addr
}

async fn spawn_server(upstream: SocketAddr) -> SocketAddr {
    let config =
        AppConfig::from_toml(&CONFIG.replace("@UPSTREAM@", &upstream.to_string())).unwrap();
    let store = Arc::new(ZoneStore::from_config(&config).unwrap());
    let forwarder = Forwarder::new(
        Arc::new(UdpExchange),
        config.dns.retries,
        config.dns.timeout_ms,
    );
    let resolver = Arc::new(DnsResolver::new(
        store,
        AnswerCache::default(),
        forwarder,
        config.effective_max_depth(),
        config.silent,
    ));

    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = dns_server::serve(socket, resolver).await;
    });
    addr
}

async fn ask(server: SocketAddr, id: u16, question: Question) -> Envelope {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let bytes = codec::encode(&Envelope::query(id, vec![question])).unwrap();
    client.send_to(&bytes, server).await.unwrap();

    let mut buf = [0u8; 512];
    let (len, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("server replied")
        .unwrap();
    codec::decode(&buf[..len]).unwrap()
}

#[tokio::test]
async fn serves_local_answers_over_udp() {
    let upstream = spawn_upstream().await;
    let server = spawn_server(upstream).await;

    let response = ask(server, 0x1234, Question::new("localhost.test", RRType::A)).await;

    assert_eq!(response.id, 0x1234);
    assert!(response.flags.qr);
    assert!(response.flags.aa);
    assert_eq!(response.flags.rcode, Rcode::NoError);
    assert_eq!(response.questions.len(), 1);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].data, RecordData::A(Ipv4Addr::LOCALHOST));
    assert_eq!(response.authority.len(), 1);
    assert_eq!(response.authority[0].rtype, RRType::SOA);
}

#[tokio::test]
async fn serves_cname_chain_over_udp() {
    let upstream = spawn_upstream().await;
    let server = spawn_server(upstream).await;

    let response = ask(server, 7, Question::new("local.test", RRType::A)).await;

    assert_eq!(response.answers.len(), 2);
    assert_eq!(response.answers[0].rtype, RRType::CNAME);
    assert_eq!(response.answers[1].rtype, RRType::A);
    assert_eq!(response.answers[1].name, "localhost.test");
}

#[tokio::test]
async fn forwards_unknown_zones_through_udp_upstream() {
    let upstream = spawn_upstream().await;
    let server = spawn_server(upstream).await;

    let response = ask(server, 9, Question::new("www.example.com", RRType::A)).await;

    assert!(!response.flags.aa);
    assert_eq!(response.flags.rcode, Rcode::NoError);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].name, "www.example.com");
    assert!(response.answers[0].ttl <= 45);
    assert_eq!(
        response.answers[0].data,
        RecordData::A(Ipv4Addr::new(198, 51, 100, 4))
    );
}

#[tokio::test]
async fn upstream_nxdomain_becomes_name_error() {
    let upstream = spawn_upstream().await;
    let server = spawn_server(upstream).await;

    let response = ask(server, 11, Question::new("example.com", RRType::MX)).await;

    assert!(response.answers.is_empty());
    assert_eq!(response.flags.rcode, Rcode::NameError);
}

#[tokio::test]
async fn garbage_datagrams_are_dropped() {
    let upstream = spawn_upstream().await;
    let server = spawn_server(upstream).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&[0xde, 0xad], server).await.unwrap();

    let mut buf = [0u8; 512];
    let reply = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(reply.is_err());

    // The server keeps serving after a bad packet.
    let response = ask(server, 12, Question::new("localhost.test", RRType::A)).await;
    assert_eq!(response.answers.len(), 1);
}

#[tokio::test]
async fn unsupported_types_get_not_implemented() {
    let upstream = spawn_upstream().await;
    let server = spawn_server(upstream).await;

    let mut query = Message::new();
    query
        .set_id(13)
        .set_message_type(MessageType::Query)
        .set_recursion_desired(true);
    query.add_query(Query::query(
        Name::from_str("www.example.com.").unwrap(),
        RecordType::HTTPS,
    ));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&query.to_bytes().unwrap(), server)
        .await
        .unwrap();

    let mut buf = [0u8; 512];
    let (len, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("server replied")
        .unwrap();
    let reply = Message::from_bytes(&buf[..len]).unwrap();

    assert_eq!(reply.id(), 13);
    assert_eq!(reply.message_type(), MessageType::Response);
    assert_eq!(reply.response_code(), ResponseCode::NotImp);
    assert_eq!(reply.queries().len(), 1);
    assert_eq!(reply.queries()[0].query_type(), RecordType::HTTPS);
    assert!(reply.answers().is_empty());
}

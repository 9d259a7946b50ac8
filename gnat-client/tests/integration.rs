//! Integration tests against a mock in-process server speaking raw wire
//! bytes over a real TCP socket.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

use gnat_client::{Client, ClientOptions, ConnectionState, Delivery, GnatError, Message, Request};

struct MockServer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockServer {
    async fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    async fn write(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

/// Accept one client connection and run the INFO/CONNECT handshake.
/// Returns the client, the server side of the socket, and the raw
/// CONNECT line the client sent.
async fn connect_pair(name: &str) -> (Client, MockServer, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        socket
    });

    let client = Client::connect(ClientOptions::new(name).host("127.0.0.1").port(port))
        .await
        .unwrap();
    let socket = accept.await.unwrap();
    let (read_half, write_half) = socket.into_split();
    let mut server = MockServer {
        reader: BufReader::new(read_half),
        writer: write_half,
    };

    server
        .write(b"INFO {\"server_id\":\"mock\",\"max_payload\":1048576}\r\n")
        .await;
    let connect = server.read_line().await;
    assert!(
        connect.starts_with("CONNECT "),
        "unexpected handshake line: {connect}"
    );

    (client, server, connect)
}

#[tokio::test]
async fn test_handshake_sends_connect_and_caches_info() {
    let (client, _server, connect) = connect_pair("tester").await;

    let body: serde_json::Value =
        serde_json::from_str(connect.strip_prefix("CONNECT ").unwrap()).unwrap();
    assert_eq!(body["name"], "tester");
    assert_eq!(body["verbose"], false);

    let info = client.server_info().expect("INFO should be cached");
    assert_eq!(info.server_id.as_deref(), Some("mock"));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_ping_is_answered_with_exactly_one_pong() {
    let (_client, mut server, _) = connect_pair("tester").await;

    server.write(b"PING\r\n").await;
    assert_eq!(server.read_line().await, "PONG");
}

#[tokio::test]
async fn test_ping_between_announcement_and_payload() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    // PING interleaved after a MSG header must still be answered, and the
    // payload must still reach its announcement.
    server.write(b"MSG x 1 2\r\nPING\r\nhi\r\n").await;
    assert_eq!(server.read_line().await, "PONG");

    let deliveries = client.get(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(
        deliveries,
        vec![Delivery::Message(Message {
            subject: "x".into(),
            payload: Bytes::from_static(b"hi"),
        })]
    );
}

#[tokio::test]
async fn test_publish_writes_one_frame() {
    let (client, mut server, _) = connect_pair("tester").await;

    client.publish("greet", "hi").unwrap();
    assert_eq!(server.read_line().await, "PUB greet 2");
    assert_eq!(server.read_line().await, "hi");
}

#[tokio::test]
async fn test_subscribe_then_back_to_back_messages_in_order() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    let sid = client.subscribe("x").unwrap();
    assert_eq!(sid, 1);
    assert_eq!(server.read_line().await, "SUB x 1");

    // Both frames in one chunk.
    server.write(b"MSG x 1 2\r\nhi\r\nMSG x 1 2\r\nho\r\n").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let deliveries = client.get(None).await.unwrap();
    assert_eq!(
        deliveries,
        vec![
            Delivery::Message(Message {
                subject: "x".into(),
                payload: Bytes::from_static(b"hi"),
            }),
            Delivery::Message(Message {
                subject: "x".into(),
                payload: Bytes::from_static(b"ho"),
            }),
        ]
    );

    // The sink is left empty.
    let again = client.get(Some(Duration::ZERO)).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_msg_with_reply_routes_as_request() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    server.write(b"MSG today 1 INBOX.caller 2\r\n%Y\r\n").await;

    let deliveries = client.get(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(
        deliveries,
        vec![Delivery::Request(Request {
            subject: "today".into(),
            reply: "INBOX.caller".into(),
            payload: Bytes::from_static(b"%Y"),
        })]
    );
}

#[tokio::test]
async fn test_inbox_delivery_skips_the_message_sink() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    server.write(b"MSG INBOX.abc 1 2\r\nhi\r\n").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let deliveries = client.get(Some(Duration::ZERO)).await.unwrap();
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn test_request_receives_correlated_response() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    let responder = tokio::spawn(async move {
        let sub = server.read_line().await;
        let mut parts = sub.split_whitespace();
        assert_eq!(parts.next(), Some("SUB"));
        let inbox = parts.next().unwrap().to_string();
        assert!(inbox.starts_with("INBOX."));
        let sid: u64 = parts.next().unwrap().parse().unwrap();

        assert_eq!(server.read_line().await, format!("UNSUB {} 1", sid));
        assert_eq!(server.read_line().await, format!("PUB today {} 5", inbox));
        assert_eq!(server.read_line().await, "hello");

        server
            .write(format!("MSG {} {} 5\r\nworld\r\n", inbox, sid).as_bytes())
            .await;
        server
    });

    let response = client
        .request("today", "hello", Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(response.payload, Bytes::from_static(b"world"));

    responder.await.unwrap();
}

#[tokio::test]
async fn test_request_timeout_names_subject_and_bound() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    let err = client
        .request("slow", "", Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    match err {
        GnatError::RequestTimeout {
            subject,
            timeout_ms,
        } => {
            assert_eq!(subject, "slow");
            assert_eq!(timeout_ms, 100);
        }
        other => panic!("expected RequestTimeout, got {other:?}"),
    }

    // The client stays usable after a timeout.
    client.publish("after", "ok").unwrap();
    // Skip the request's SUB/UNSUB/PUB header/empty payload lines.
    for _ in 0..4 {
        server.read_line().await;
    }
    assert_eq!(server.read_line().await, "PUB after 2");
    assert_eq!(server.read_line().await, "ok");
}

#[tokio::test]
async fn test_err_frame_is_nonfatal() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    server.write(b"-ERR 'Unknown Protocol Operation'\r\n").await;
    server.write(b"MSG x 1 2\r\nhi\r\n").await;

    let deliveries = client.get(Some(Duration::from_secs(2))).await.unwrap();
    assert_eq!(deliveries.len(), 1);
}

#[tokio::test]
async fn test_get_zero_wait_on_empty_sink_returns_immediately() {
    let (mut client, _server, _) = connect_pair("tester").await;

    let start = std::time::Instant::now();
    let deliveries = client.get(Some(Duration::ZERO)).await.unwrap();
    assert!(deliveries.is_empty());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_publish_before_subscribe_delivers_nothing() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    client.publish("greet", "hi").unwrap();
    client.subscribe("greet").unwrap();
    assert_eq!(server.read_line().await, "PUB greet 2");
    assert_eq!(server.read_line().await, "hi");
    assert_eq!(server.read_line().await, "SUB greet 1");

    // Fire and forget: nothing was subscribed when the publish happened,
    // and the mock broker redelivers nothing.
    let deliveries = client.get(Some(Duration::from_millis(100))).await.unwrap();
    assert!(deliveries.is_empty());
}

#[tokio::test]
async fn test_usage_errors_are_rejected_synchronously() {
    let (mut client, _server, _) = connect_pair("tester").await;

    assert!(matches!(
        client.publish("has space", "x"),
        Err(GnatError::BadSubject { .. })
    ));
    assert!(matches!(
        client.subscribe(""),
        Err(GnatError::BadSubject { .. })
    ));
    assert!(matches!(
        client.publish("ok", &b"bad\r\npayload"[..]),
        Err(GnatError::BadPayload(_))
    ));
    assert!(matches!(
        client
            .request("bad subject", "", Some(Duration::from_millis(10)))
            .await,
        Err(GnatError::BadSubject { .. })
    ));
}

#[tokio::test]
async fn test_server_close_surfaces_connection_closed() {
    let (mut client, server, _) = connect_pair("tester").await;

    drop(server);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = client
        .get(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, GnatError::ConnectionClosed));
    assert!(matches!(
        client.publish("x", "y"),
        Err(GnatError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_disconnect_is_clean_and_idempotent() {
    let (mut client, _server, _) = connect_pair("tester").await;

    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    assert!(matches!(
        client.publish("x", "y"),
        Err(GnatError::NotConnected)
    ));
    assert!(matches!(
        client.get(Some(Duration::from_millis(10))).await,
        Err(GnatError::NotConnected)
    ));

    // Second disconnect is a no-op.
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_sids_are_never_reused() {
    let (mut client, mut server, _) = connect_pair("tester").await;

    let first = client.subscribe("a").unwrap();
    let second = client.subscribe("b").unwrap();
    assert_eq!(server.read_line().await, "SUB a 1");
    assert_eq!(server.read_line().await, "SUB b 2");
    assert!(second > first);

    // A request consumes a sid for its inbox subscription too.
    let _ = client
        .request("c", "", Some(Duration::from_millis(50)))
        .await;
    let sub = server.read_line().await;
    assert!(sub.starts_with("SUB INBOX."));
    assert!(sub.ends_with(" 3"));

    assert_eq!(client.subscribe("d").unwrap(), 4);
}

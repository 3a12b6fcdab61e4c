// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! WebSocket and TLS transports carry the same byte stream.

mod common;

use std::sync::Arc;

use common::TestServer;

use codec::{
    ByteArray, ConnectAckPacket, ConnectPacket, EncodePacket, ProtocolLevel, ReasonCode,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::ClientRequestBuilder;
use tokio_tungstenite::tungstenite::protocol::Message;

fn encode_connect(client_id: &str) -> Vec<u8> {
    let mut packet = ConnectPacket::new(client_id).unwrap();
    packet.set_clean_session(true);
    let mut buf = Vec::new();
    packet.encode(&mut buf).unwrap();
    buf
}

#[tokio::test]
async fn test_websocket_connect() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "ws"
address = "127.0.0.1:18851"
path = "/mqtt"
"#,
    )
    .await;

    let request = ClientRequestBuilder::new("ws://127.0.0.1:18851/mqtt".parse().unwrap())
        .with_sub_protocol("mqtt");
    let (mut ws_stream, response) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws handshake failed");
    assert_eq!(
        response
            .headers()
            .get("sec-websocket-protocol")
            .map(|v| v.to_str().unwrap()),
        Some("mqtt")
    );

    ws_stream
        .send(Message::binary(encode_connect("ws-client")))
        .await
        .unwrap();

    let msg = ws_stream
        .next()
        .await
        .expect("connection closed")
        .expect("ws read failed");
    let Message::Binary(data) = msg else {
        panic!("expected binary frame, got {msg:?}");
    };
    let mut ba = ByteArray::new(&data);
    let ack = ConnectAckPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
    assert_eq!(ack.reason_code(), ReasonCode::Success);
}

#[tokio::test]
async fn test_websocket_wrong_path_rejected() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "ws"
address = "127.0.0.1:18852"
path = "/mqtt"
"#,
    )
    .await;

    let result = tokio_tungstenite::connect_async("ws://127.0.0.1:18852/other").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tls_connect() {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = std::env::temp_dir().join("weir-tests");
    std::fs::create_dir_all(&dir).unwrap();
    let cert_path = dir.join("mqtts-18853-cert.pem");
    let key_path = dir.join("mqtts-18853-key.pem");
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    let config_text = format!(
        r#"
[[listeners]]
protocol = "mqtts"
address = "127.0.0.1:18853"
cert_file = "{}"
key_file = "{}"
"#,
        cert_path.display(),
        key_path.display()
    );
    let _server = TestServer::start(&config_text).await;

    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    roots.add(certified.cert.der().clone()).unwrap();
    let client_config = tokio_rustls::rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

    let tcp_stream = TcpStream::connect("127.0.0.1:18853").await.unwrap();
    let server_name = rustls_pki_types::ServerName::try_from("localhost".to_string()).unwrap();
    let mut tls_stream = connector.connect(server_name, tcp_stream).await.unwrap();

    tls_stream.write_all(&encode_connect("tls-client")).await.unwrap();

    let mut buf = Vec::new();
    while buf.len() < 4 {
        let read = tls_stream.read_buf(&mut buf).await.unwrap();
        assert!(read > 0, "connection closed");
    }
    let mut ba = ByteArray::new(&buf);
    let ack = ConnectAckPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
    assert_eq!(ack.reason_code(), ReasonCode::Success);
}

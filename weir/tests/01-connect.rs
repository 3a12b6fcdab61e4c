// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! CONNECT / CONNACK handshakes over TCP.

mod common;

use common::{TestClient, TestServer};

use codec::{ConnectPacket, Packet, ProtocolLevel, QoS, ReasonCode, SubscribePacket};
use codec::PacketId;

#[tokio::test]
async fn test_connect_v311() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18831"
"#,
    )
    .await;

    let mut packet = ConnectPacket::new("connect-v4").unwrap();
    packet.set_clean_session(true);
    let (_client, ack) = TestClient::connect_with("127.0.0.1:18831", packet).await;
    assert_eq!(ack.reason_code(), ReasonCode::Success);
    assert!(!ack.session_present());
}

#[tokio::test]
async fn test_connect_v5() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18832"
"#,
    )
    .await;

    let mut packet = ConnectPacket::new("connect-v5").unwrap();
    packet.set_level(ProtocolLevel::V5);
    packet.set_clean_session(true);
    let (_client, ack) = TestClient::connect_with("127.0.0.1:18832", packet).await;
    assert_eq!(ack.reason_code(), ReasonCode::Success);
    assert!(!ack.session_present());
}

#[tokio::test]
async fn test_connect_empty_client_id_gets_assigned() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18833"
"#,
    )
    .await;

    let mut packet = ConnectPacket::new("").unwrap();
    packet.set_level(ProtocolLevel::V5);
    packet.set_clean_session(true);
    let (_client, ack) = TestClient::connect_with("127.0.0.1:18833", packet).await;
    assert_eq!(ack.reason_code(), ReasonCode::Success);
    let assigned = ack.assigned_client_id().expect("no assigned client id");
    assert!(!assigned.is_empty());
}

#[tokio::test]
async fn test_connect_anonymous_denied() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18834"

[security]
allow_anonymous = false
"#,
    )
    .await;

    let mut packet = ConnectPacket::new("anon").unwrap();
    packet.set_clean_session(true);
    let (_client, ack) = TestClient::connect_with("127.0.0.1:18834", packet).await;
    assert_eq!(ack.reason_code(), ReasonCode::NotAuthorized);
}

#[tokio::test]
async fn test_connect_with_credentials_accepted() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18835"

[security]
allow_anonymous = false
"#,
    )
    .await;

    let mut packet = ConnectPacket::new("authed").unwrap();
    packet.set_clean_session(true);
    packet.set_username("alice").unwrap();
    packet.set_password(b"secret").unwrap();
    let (_client, ack) = TestClient::connect_with("127.0.0.1:18835", packet).await;
    assert_eq!(ack.reason_code(), ReasonCode::Success);
}

#[tokio::test]
async fn test_subscribe_before_publish_flow() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18836"
"#,
    )
    .await;

    let mut client =
        TestClient::connect("127.0.0.1:18836", "sub-ack", ProtocolLevel::V311, true).await;
    let subscribe =
        SubscribePacket::new("a/b/c", QoS::AtLeastOnce, PacketId::new(5)).unwrap();
    client.send(&subscribe).await;
    match client.read_packet().await {
        Packet::SubscribeAck(ack) => {
            assert_eq!(ack.packet_id(), PacketId::new(5));
            assert_eq!(ack.reasons(), [ReasonCode::GrantedQoS1]);
        }
        other => panic!("expected SUBACK, got {other:?}"),
    }
}

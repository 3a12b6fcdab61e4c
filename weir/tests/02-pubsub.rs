// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Publish/subscribe flows: QoS handshakes, retained messages, session
//! take-over and wills.

mod common;

use std::time::Duration;

use common::{TestClient, TestServer};

use codec::{
    DisconnectPacket, Packet, PacketId, ProtocolLevel, PublishAckPacket, PublishPacket,
    PublishReleasePacket, QoS, ReasonCode, SubscribePacket,
};
use tokio::time::sleep;

const SETTLE: Duration = Duration::from_millis(300);

async fn subscribe(client: &mut TestClient, filter: &str, qos: QoS, packet_id: u16) {
    let mut packet = SubscribePacket::new(filter, qos, PacketId::new(packet_id)).unwrap();
    packet.set_level(client.level);
    client.send(&packet).await;
    match client.read_packet().await {
        Packet::SubscribeAck(ack) => assert_eq!(ack.packet_id(), PacketId::new(packet_id)),
        other => panic!("expected SUBACK, got {other:?}"),
    }
}

#[tokio::test]
async fn test_qos0_pub_sub() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18841"
"#,
    )
    .await;
    let addr = "127.0.0.1:18841";

    let mut publisher = TestClient::connect(addr, "a", ProtocolLevel::V311, true).await;
    let mut subscriber = TestClient::connect(addr, "b", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "sensors/+/temp", QoS::AtMostOnce, 1).await;

    let packet = PublishPacket::new("sensors/room1/temp", QoS::AtMostOnce, b"22").unwrap();
    publisher.send(&packet).await;

    let received = subscriber.read_publish().await;
    assert_eq!(received.topic(), "sensors/room1/temp");
    assert_eq!(received.message(), b"22");
    assert_eq!(received.qos(), QoS::AtMostOnce);
    assert!(!received.retain());

    // Exactly one delivery.
    subscriber.expect_silence(SETTLE).await;
}

#[tokio::test]
async fn test_wildcard_levels() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18842"
"#,
    )
    .await;
    let addr = "127.0.0.1:18842";

    let mut publisher = TestClient::connect(addr, "pub", ProtocolLevel::V311, true).await;
    let mut subscriber = TestClient::connect(addr, "sub", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "a/+/c", QoS::AtMostOnce, 1).await;

    for topic in ["a/b/c", "a//c"] {
        let packet = PublishPacket::new(topic, QoS::AtMostOnce, b"x").unwrap();
        publisher.send(&packet).await;
        let received = subscriber.read_publish().await;
        assert_eq!(received.topic(), topic);
    }

    for topic in ["a/b/d/c", "a/b"] {
        let packet = PublishPacket::new(topic, QoS::AtMostOnce, b"x").unwrap();
        publisher.send(&packet).await;
    }
    subscriber.expect_silence(SETTLE).await;
}

#[tokio::test]
async fn test_qos1_downgrade() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18843"
"#,
    )
    .await;
    let addr = "127.0.0.1:18843";

    let mut publisher = TestClient::connect(addr, "pub", ProtocolLevel::V311, true).await;
    let mut subscriber = TestClient::connect(addr, "sub", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "x", QoS::AtMostOnce, 1).await;

    let mut packet = PublishPacket::new("x", QoS::AtLeastOnce, b"p").unwrap();
    packet.set_packet_id(PacketId::new(12));
    publisher.send(&packet).await;

    match publisher.read_packet().await {
        Packet::PublishAck(ack) => assert_eq!(ack.packet_id(), PacketId::new(12)),
        other => panic!("expected PUBACK, got {other:?}"),
    }

    // Granted maximum QoS was 0, so the delivery is downgraded.
    let received = subscriber.read_publish().await;
    assert_eq!(received.qos(), QoS::AtMostOnce);
    assert_eq!(received.message(), b"p");
}

#[tokio::test]
async fn test_qos2_handshake_and_duplicate_suppression() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18844"
"#,
    )
    .await;
    let addr = "127.0.0.1:18844";

    let mut publisher = TestClient::connect(addr, "a", ProtocolLevel::V311, true).await;
    let mut subscriber = TestClient::connect(addr, "b", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "x", QoS::ExactOnce, 1).await;

    let mut packet = PublishPacket::new("x", QoS::ExactOnce, b"p").unwrap();
    packet.set_packet_id(PacketId::new(7));
    publisher.send(&packet).await;

    match publisher.read_packet().await {
        Packet::PublishReceived(ack) => assert_eq!(ack.packet_id(), PacketId::new(7)),
        other => panic!("expected PUBREC, got {other:?}"),
    }

    // Retransmission between PUBREC and PUBREL: acknowledged again, not
    // fanned out a second time.
    let mut duplicate = PublishPacket::new("x", QoS::ExactOnce, b"p").unwrap();
    duplicate.set_packet_id(PacketId::new(7));
    duplicate.set_dup(true).unwrap();
    publisher.send(&duplicate).await;
    match publisher.read_packet().await {
        Packet::PublishReceived(ack) => assert_eq!(ack.packet_id(), PacketId::new(7)),
        other => panic!("expected PUBREC, got {other:?}"),
    }

    // Nothing reaches the subscriber until PUBREL.
    subscriber.expect_silence(SETTLE).await;

    publisher
        .send(&PublishReleasePacket::new(
            PacketId::new(7),
            ProtocolLevel::V311,
        ))
        .await;
    match publisher.read_packet().await {
        Packet::PublishComplete(ack) => assert_eq!(ack.packet_id(), PacketId::new(7)),
        other => panic!("expected PUBCOMP, got {other:?}"),
    }

    let received = subscriber.read_publish().await;
    assert_eq!(received.qos(), QoS::ExactOnce);
    assert_eq!(received.message(), b"p");
    subscriber.expect_silence(SETTLE).await;
}

#[tokio::test]
async fn test_retained_message_late_subscriber() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18845"
"#,
    )
    .await;
    let addr = "127.0.0.1:18845";

    let mut publisher = TestClient::connect(addr, "a", ProtocolLevel::V311, true).await;
    let mut packet = PublishPacket::new("status", QoS::AtLeastOnce, b"on").unwrap();
    packet.set_packet_id(PacketId::new(3));
    packet.set_retain(true);
    publisher.send(&packet).await;
    match publisher.read_packet().await {
        Packet::PublishAck(_) => {}
        other => panic!("expected PUBACK, got {other:?}"),
    }

    // A later subscriber gets the retained message with retain=1.
    let mut subscriber = TestClient::connect(addr, "b", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "status", QoS::AtLeastOnce, 1).await;
    let received = subscriber.read_publish().await;
    assert_eq!(received.message(), b"on");
    assert!(received.retain());
    subscriber
        .send(&PublishAckPacket::new(
            received.packet_id(),
            ProtocolLevel::V311,
        ))
        .await;

    // An empty retained publish clears the entry.
    let mut clear = PublishPacket::new("status", QoS::AtLeastOnce, b"").unwrap();
    clear.set_packet_id(PacketId::new(4));
    clear.set_retain(true);
    publisher.send(&clear).await;
    match publisher.read_packet().await {
        Packet::PublishAck(_) => {}
        other => panic!("expected PUBACK, got {other:?}"),
    }

    let mut third = TestClient::connect(addr, "c", ProtocolLevel::V311, true).await;
    subscribe(&mut third, "status", QoS::AtLeastOnce, 1).await;
    third.expect_silence(SETTLE).await;
}

#[tokio::test]
async fn test_session_takeover_delivers_queued() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18846"
"#,
    )
    .await;
    let addr = "127.0.0.1:18846";

    let mut first = TestClient::connect(addr, "c", ProtocolLevel::V311, false).await;
    subscribe(&mut first, "t", QoS::AtLeastOnce, 1).await;
    drop(first);
    sleep(SETTLE).await;

    let mut publisher = TestClient::connect(addr, "pub", ProtocolLevel::V311, true).await;
    let mut packet = PublishPacket::new("t", QoS::AtLeastOnce, b"while-away").unwrap();
    packet.set_packet_id(PacketId::new(9));
    publisher.send(&packet).await;
    match publisher.read_packet().await {
        Packet::PublishAck(_) => {}
        other => panic!("expected PUBACK, got {other:?}"),
    }
    sleep(SETTLE).await;

    // Same client id, clean_session=0: the old session state is resumed.
    let mut connect = codec::ConnectPacket::new("c").unwrap();
    connect.set_clean_session(false);
    let (mut second, ack) = TestClient::connect_with(addr, connect).await;
    assert!(ack.session_present());

    let received = second.read_publish().await;
    assert_eq!(received.message(), b"while-away");
    assert_eq!(received.qos(), QoS::AtLeastOnce);
}

#[tokio::test]
async fn test_will_published_on_abnormal_close() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18847"
"#,
    )
    .await;
    let addr = "127.0.0.1:18847";

    let mut subscriber = TestClient::connect(addr, "watcher", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "lwt", QoS::AtLeastOnce, 1).await;

    let mut connect = codec::ConnectPacket::new("mortal").unwrap();
    connect.set_clean_session(true);
    connect
        .set_will("lwt", b"down", QoS::AtLeastOnce, false)
        .unwrap();
    let (client, ack) = TestClient::connect_with(addr, connect).await;
    assert_eq!(ack.reason_code(), ReasonCode::Success);

    // Socket vanishes without DISCONNECT.
    drop(client);

    let received = subscriber.read_publish().await;
    assert_eq!(received.topic(), "lwt");
    assert_eq!(received.message(), b"down");
}

#[tokio::test]
async fn test_will_suppressed_on_clean_disconnect() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18848"
"#,
    )
    .await;
    let addr = "127.0.0.1:18848";

    let mut subscriber = TestClient::connect(addr, "watcher", ProtocolLevel::V311, true).await;
    subscribe(&mut subscriber, "lwt", QoS::AtLeastOnce, 1).await;

    let mut connect = codec::ConnectPacket::new("mortal").unwrap();
    connect.set_clean_session(true);
    connect
        .set_will("lwt", b"down", QoS::AtLeastOnce, false)
        .unwrap();
    let (mut client, _ack) = TestClient::connect_with(addr, connect).await;

    client.send(&DisconnectPacket::new(ProtocolLevel::V311)).await;
    drop(client);

    subscriber.expect_silence(SETTLE).await;
}

#[tokio::test]
async fn test_no_local_v5() {
    let _server = TestServer::start(
        r#"
[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:18849"
"#,
    )
    .await;
    let addr = "127.0.0.1:18849";

    let mut client = TestClient::connect(addr, "loop", ProtocolLevel::V5, true).await;
    let mut topic = codec::SubscribeTopic::new("echo", QoS::AtMostOnce).unwrap();
    topic.set_no_local(true);
    let mut packet = SubscribePacket::with_topics(PacketId::new(1), vec![topic]);
    packet.set_level(ProtocolLevel::V5);
    client.send(&packet).await;
    match client.read_packet().await {
        Packet::SubscribeAck(_) => {}
        other => panic!("expected SUBACK, got {other:?}"),
    }

    let mut publish = PublishPacket::new("echo", QoS::AtMostOnce, b"me").unwrap();
    publish.set_level(ProtocolLevel::V5);
    client.send(&publish).await;

    client.expect_silence(SETTLE).await;
}

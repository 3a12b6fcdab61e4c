// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

#![allow(dead_code)]

//! In-process broker and a minimal wire-level client for integration tests.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use weir::config::Config;
use weir::server::ServerContext;

use codec::{
    ByteArray, ConnectAckPacket, ConnectPacket, EncodePacket, Packet, ProtocolLevel, ReasonCode,
};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A broker running inside the test's runtime.
pub struct TestServer {
    listener_handles: Vec<JoinHandle<()>>,
    dispatcher_handle: JoinHandle<()>,
    shutdown_sender: broadcast::Sender<()>,
}

impl TestServer {
    /// Start a broker from a TOML config snippet.
    ///
    /// # Panics
    ///
    /// Panics if the config is invalid or binding fails.
    pub async fn start(config_text: &str) -> Self {
        let config: Config = toml::from_str(config_text).expect("invalid test config");
        config.validate().expect("invalid test config");
        let mut context = ServerContext::new(config);
        let (listener_handles, dispatcher_handle, shutdown_sender) =
            context.start().await.expect("failed to start broker");
        Self {
            listener_handles,
            dispatcher_handle,
            shutdown_sender,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_sender.send(());
        for handle in &self.listener_handles {
            handle.abort();
        }
        self.dispatcher_handle.abort();
    }
}

/// Length of the first complete packet in `buf`, if any.
fn frame_length(buf: &[u8]) -> Option<usize> {
    if buf.len() < 2 {
        return None;
    }
    let mut value: usize = 0;
    let mut multiplier = 1;
    let mut index = 1;
    loop {
        let byte = *buf.get(index)?;
        value += (byte as usize & 127) * multiplier;
        index += 1;
        if byte & 128 == 0 {
            break;
        }
        multiplier *= 128;
    }
    let total = index + value;
    (buf.len() >= total).then_some(total)
}

/// A raw MQTT client driving encoded packets over TCP.
pub struct TestClient {
    stream: TcpStream,
    pub level: ProtocolLevel,
    buf: Vec<u8>,
}

impl TestClient {
    /// Open a TCP connection, retrying until the broker is up.
    pub async fn open(addr: &str) -> Self {
        for _ in 0..50 {
            if let Ok(stream) = TcpStream::connect(addr).await {
                return Self {
                    stream,
                    level: ProtocolLevel::V311,
                    buf: Vec::new(),
                };
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("broker at {addr} never came up");
    }

    /// Connect and complete the CONNECT/CONNACK handshake.
    pub async fn connect(
        addr: &str,
        client_id: &str,
        level: ProtocolLevel,
        clean_session: bool,
    ) -> Self {
        let mut packet = ConnectPacket::new(client_id).unwrap();
        packet.set_level(level);
        packet.set_clean_session(clean_session);
        let (client, ack) = Self::connect_with(addr, packet).await;
        assert_eq!(ack.reason_code(), ReasonCode::Success);
        client
    }

    /// Connect with a prepared CONNECT packet, returning the CONNACK.
    pub async fn connect_with(addr: &str, packet: ConnectPacket) -> (Self, ConnectAckPacket) {
        let mut client = Self::open(addr).await;
        client.level = packet.level();
        client.send(&packet).await;
        let ack = match client.read_packet().await {
            Packet::ConnectAck(ack) => ack,
            other => panic!("expected CONNACK, got {other:?}"),
        };
        (client, ack)
    }

    pub async fn send<P: EncodePacket>(&mut self, packet: &P) {
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        use tokio::io::AsyncWriteExt;
        self.stream.write_all(&buf).await.unwrap();
    }

    /// Read the next packet, waiting up to `RECV_TIMEOUT`.
    pub async fn read_packet(&mut self) -> Packet {
        loop {
            if let Some(total) = frame_length(&self.buf) {
                let mut ba = ByteArray::new(&self.buf[..total]);
                let packet = Packet::decode(&mut ba, self.level).expect("malformed packet");
                self.buf.drain(..total);
                return packet;
            }

            let read = timeout(RECV_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for packet")
                .expect("read failed");
            assert!(read > 0, "connection closed by broker");
        }
    }

    /// Assert that nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if frame_length(&self.buf).is_some() {
            panic!("unexpected packet already buffered");
        }
        let read = timeout(wait, self.stream.read_buf(&mut self.buf)).await;
        match read {
            Err(_) => {}
            Ok(Ok(0)) => {}
            Ok(Ok(_)) => {
                if frame_length(&self.buf).is_some() {
                    panic!("unexpected packet: {:?}", self.buf);
                }
            }
            Ok(Err(err)) => panic!("read failed: {err}"),
        }
    }

    /// Read the next packet and expect a PUBLISH.
    pub async fn read_publish(&mut self) -> codec::PublishPacket {
        match self.read_packet().await {
            Packet::Publish(packet) => packet,
            other => panic!("expected PUBLISH, got {other:?}"),
        }
    }
}

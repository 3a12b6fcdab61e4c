// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-connection session task.
//!
//! Each accepted socket runs one `Session`. It owns the connection state
//! machine: CONNECT handshake, keep alive supervision, the QoS 1/2
//! acknowledgement bookkeeping in both directions, and the write path with
//! its in-flight window. Everything topic-related is delegated to the
//! dispatcher through the listener.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use codec::{
    ByteArray, DecodeError, EncodePacket, Packet, PacketId, PingResponsePacket, Property,
    ProtocolLevel, PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, QoS, ReasonCode, U16Data,
};
use codec::{ConnectAckPacket, ConnectPacket, DisconnectPacket};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::commands::{ListenerToSessionCmd, SessionCloseInfo, SessionToListenerCmd};
use crate::constants;
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;
use crate::types::SessionId;

mod config;

pub use config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Socket accepted, CONNECT not yet seen.
    Invalid,

    /// CONNECT forwarded, waiting for the broker's verdict.
    Connecting,

    Connected,

    Disconnected,
}

/// One outbound QoS 1/2 message awaiting acknowledgement.
#[derive(Debug, Clone)]
struct InflightOut {
    packet: PublishPacket,

    /// True once PUBREC arrived and PUBREL was sent (QoS 2 only).
    released: bool,
}

/// Try to cut one complete control packet off the front of `buf`.
///
/// Returns the total length of the first packet, or None if more bytes are
/// needed.
///
/// # Errors
///
/// Returns error if the remaining-length field itself is malformed.
fn packet_length(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let mut value: usize = 0;
    let mut multiplier = 1;
    let mut index = 1;
    loop {
        let Some(byte) = buf.get(index) else {
            return Ok(None);
        };
        value += (*byte as usize & 127) * multiplier;
        index += 1;
        if byte & 128 == 0 {
            break;
        }
        multiplier *= 128;
        if multiplier > 128 * 128 * 128 {
            return Err(DecodeError::InvalidVarInt);
        }
    }

    let total = index + value;
    if buf.len() < total {
        Ok(None)
    } else {
        Ok(Some(total))
    }
}

/// Represents a client connection.
///
/// All the state of this client connection is maintained in this struct.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    stream: Stream,

    status: Status,
    client_id: String,
    level: ProtocolLevel,

    /// Keep alive negotiated with the client, in seconds; 0 disables.
    keep_alive: u64,

    /// Keep alive the client asked for, before any server-side cap.
    requested_keep_alive: u16,

    /// Session expiry interval from CONNECT; bounds what a 5.0 DISCONNECT
    /// may override it with.
    session_expiry: u32,

    /// Receive maximum announced by the client.
    receive_maximum: u16,

    clean: bool,
    publish_will: bool,
    expiry_override: Option<u32>,

    accepted_at: Instant,
    last_packet_at: Instant,

    /// QoS 2 messages received and acknowledged with PUBREC, kept until
    /// PUBREL arrives; fan-out happens at PUBREL.
    inbound_qos2: HashMap<u16, PublishPacket>,

    /// QoS 1/2 messages sent to the client, keyed by packet id.
    outbound: HashMap<u16, InflightOut>,

    /// Cursor of the packet id allocator.
    next_packet_id: u16,

    /// Deliveries waiting for a free in-flight slot.
    pending: VecDeque<PublishPacket>,

    sender: Sender<SessionToListenerCmd>,
    receiver: Receiver<ListenerToSessionCmd>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        stream: Stream,
        sender: Sender<SessionToListenerCmd>,
        receiver: Receiver<ListenerToSessionCmd>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            config,
            stream,

            status: Status::Invalid,
            client_id: String::new(),
            level: ProtocolLevel::V311,
            keep_alive: 0,
            requested_keep_alive: 0,
            session_expiry: 0,
            receive_maximum: u16::MAX,

            clean: false,
            publish_will: false,
            expiry_override: None,

            accepted_at: now,
            last_packet_at: now,

            inbound_qos2: HashMap::new(),
            outbound: HashMap::new(),
            next_packet_id: 0,
            pending: VecDeque::new(),

            sender,
            receiver,
        }
    }

    pub async fn run_loop(mut self) {
        let mut buf = Vec::with_capacity(1024);
        let mut timer = interval(constants::TICK_INTERVAL);

        while self.status != Status::Disconnected {
            tokio::select! {
                read = self.stream.read_buf(&mut buf) => {
                    match read {
                        Ok(0) => {
                            log::info!("session: Peer closed connection, {}", self.id);
                            self.publish_will = true;
                            break;
                        }
                        Ok(_) => {
                            if let Err(err) = self.consume_buffer(&mut buf).await {
                                log::warn!(
                                    "session: Closing {} ({}): {}",
                                    self.id, self.client_id, err
                                );
                                break;
                            }
                        }
                        Err(err) => {
                            log::info!("session: Read failed, {}: {}", self.id, err);
                            self.publish_will = true;
                            break;
                        }
                    }
                }
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::warn!("session: Closing {}: {}", self.id, err);
                        break;
                    }
                }
                _ = timer.tick() => {
                    if self.deadline_reached().await {
                        break;
                    }
                }
            }
        }

        // A QoS 2 message whose PUBREL is already out was delivered once;
        // re-publishing it on resume would break exactly-once.
        let info = SessionCloseInfo {
            clean: self.clean,
            publish_will: self.publish_will,
            expiry_override: self.expiry_override,
            inflight_out: self
                .outbound
                .drain()
                .filter(|(_, inflight)| !inflight.released)
                .map(|(_, inflight)| inflight.packet)
                .collect(),
        };
        if let Err(err) = self
            .sender
            .send(SessionToListenerCmd::Disconnect(self.id, info))
            .await
        {
            log::error!(
                "session: Failed to send disconnect cmd, id: {}, err: {:?}",
                self.id,
                err
            );
        }
    }

    /// Decode and handle every complete packet in `buf`.
    async fn consume_buffer(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        loop {
            let length = packet_length(buf).map_err(|err| {
                self.publish_will = true;
                Error::from_string(ErrorKind::DecodeError, format!("Bad packet length: {err:?}"))
            })?;
            let Some(length) = length else {
                return Ok(());
            };

            let mut ba = ByteArray::new(&buf[..length]);
            let packet = Packet::decode(&mut ba, self.level);
            match packet {
                Ok(packet) => {
                    self.last_packet_at = Instant::now();
                    self.handle_client_packet(packet).await?;
                }
                Err(err) => {
                    // A malformed packet closes the connection; a 5.0 client
                    // gets told why first.
                    self.publish_will = true;
                    self.send_disconnect(ReasonCode::MalformedPacket).await;
                    return Err(Error::from_string(
                        ErrorKind::DecodeError,
                        format!("Malformed packet: {err:?}"),
                    ));
                }
            }
            buf.drain(..length);
            if self.status == Status::Disconnected {
                return Ok(());
            }
        }
    }

    async fn handle_client_packet(&mut self, packet: Packet) -> Result<(), Error> {
        match packet {
            Packet::Connect(packet) => self.on_connect(packet).await,
            Packet::Publish(packet) => self.on_publish(packet).await,
            Packet::PublishAck(packet) => self.on_publish_ack(&packet).await,
            Packet::PublishReceived(packet) => self.on_publish_received(&packet).await,
            Packet::PublishRelease(packet) => self.on_publish_release(&packet).await,
            Packet::PublishComplete(packet) => self.on_publish_complete(&packet).await,
            Packet::Subscribe(packet) => self.on_subscribe(packet).await,
            Packet::Unsubscribe(packet) => self.on_unsubscribe(packet).await,
            Packet::PingRequest(_) => self.on_ping_request().await,
            Packet::Disconnect(packet) => self.on_disconnect(&packet),
            Packet::Auth(_) => {
                // Extended authentication is not supported.
                self.publish_will = true;
                self.send_disconnect(ReasonCode::BadAuthenticationMethod)
                    .await;
                Err(Error::new(
                    ErrorKind::DecodeError,
                    "Extended AUTH is not supported",
                ))
            }
            Packet::ConnectAck(_)
            | Packet::SubscribeAck(_)
            | Packet::UnsubscribeAck(_)
            | Packet::PingResponse(_) => {
                self.publish_will = true;
                self.send_disconnect(ReasonCode::ProtocolError).await;
                Err(Error::new(
                    ErrorKind::DecodeError,
                    "Got server-to-client packet from client",
                ))
            }
        }
    }

    /// Require a finished CONNECT handshake before `packet_name` is legal.
    fn require_connected(&mut self, packet_name: &str) -> Result<(), Error> {
        if self.status == Status::Connecting || self.status == Status::Connected {
            Ok(())
        } else {
            Err(Error::from_string(
                ErrorKind::DecodeError,
                format!("Got {packet_name} before CONNECT"),
            ))
        }
    }

    async fn on_connect(&mut self, packet: ConnectPacket) -> Result<(), Error> {
        // A Client can only send the CONNECT packet once over a Network
        // Connection; a second one is a protocol violation [MQTT-3.1.0-2].
        if self.status != Status::Invalid {
            self.publish_will = true;
            self.send_disconnect(ReasonCode::ProtocolError).await;
            return Err(Error::new(ErrorKind::DecodeError, "Second CONNECT"));
        }

        if packet.level() == ProtocolLevel::V31 {
            let ack = ConnectAckPacket::new(
                false,
                ReasonCode::UnsupportedProtocolVersion,
                ProtocolLevel::V311,
            );
            self.send_packet(&ack).await?;
            self.status = Status::Disconnected;
            return Ok(());
        }

        self.level = packet.level();
        self.client_id = packet.client_id().to_string();
        self.clean = false;
        self.requested_keep_alive = packet.keep_alive();
        self.keep_alive = effective_keep_alive(
            packet.keep_alive(),
            self.config.maximum_keep_alive(),
        );
        if self.level == ProtocolLevel::V5 {
            self.session_expiry = packet
                .properties()
                .session_expiry_interval()
                .unwrap_or(0);
            self.receive_maximum = packet
                .properties()
                .receive_maximum()
                .unwrap_or(u16::MAX);
        }

        self.status = Status::Connecting;
        self.sender
            .send(SessionToListenerCmd::Connect(self.id, packet))
            .await?;
        Ok(())
    }

    async fn on_publish(&mut self, packet: PublishPacket) -> Result<(), Error> {
        self.require_connected("PUBLISH")?;

        // Topics starting with `$` belong to the broker; client publishes
        // to them are refused.
        if packet.is_internal_topic() {
            log::warn!(
                "session: {} tried to publish to internal topic {}",
                self.client_id,
                packet.topic()
            );
            match packet.qos() {
                QoS::AtMostOnce => {}
                QoS::AtLeastOnce => {
                    let mut ack = PublishAckPacket::new(packet.packet_id(), self.level);
                    ack.set_reason_code(ReasonCode::TopicNameInvalid);
                    self.send_packet(&ack).await?;
                }
                QoS::ExactOnce => {
                    let mut ack = PublishReceivedPacket::new(packet.packet_id(), self.level);
                    ack.set_reason_code(ReasonCode::TopicNameInvalid);
                    self.send_packet(&ack).await?;
                }
            }
            return Ok(());
        }

        match packet.qos() {
            QoS::AtMostOnce => {
                self.sender
                    .send(SessionToListenerCmd::Publish(self.id, packet))
                    .await?;
            }
            QoS::AtLeastOnce => {
                let ack = PublishAckPacket::new(packet.packet_id(), self.level);
                self.sender
                    .send(SessionToListenerCmd::Publish(self.id, packet))
                    .await?;
                self.send_packet(&ack).await?;
            }
            QoS::ExactOnce => {
                let packet_id = packet.packet_id();
                // A re-delivered PUBLISH with a packet id that is already
                // in flight is acknowledged again but not fanned out;
                // exactly-once is anchored at PUBREL.
                if !self.inbound_qos2.contains_key(&packet_id.value()) {
                    self.inbound_qos2.insert(packet_id.value(), packet);
                }
                let ack = PublishReceivedPacket::new(packet_id, self.level);
                self.send_packet(&ack).await?;
            }
        }
        Ok(())
    }

    async fn on_publish_release(&mut self, packet: &PublishReleasePacket) -> Result<(), Error> {
        self.require_connected("PUBREL")?;

        let packet_id = packet.packet_id();
        let mut ack = PublishCompletePacket::new(packet_id, self.level);
        if let Some(publish) = self.inbound_qos2.remove(&packet_id.value()) {
            // Fan-out happens exactly once, on the first PUBREL.
            self.sender
                .send(SessionToListenerCmd::Publish(self.id, publish))
                .await?;
        } else {
            ack.set_reason_code(ReasonCode::PacketIdentifierNotFound);
        }
        self.send_packet(&ack).await
    }

    async fn on_publish_ack(&mut self, packet: &PublishAckPacket) -> Result<(), Error> {
        self.require_connected("PUBACK")?;

        if self.outbound.remove(&packet.packet_id().value()).is_none() {
            // Duplicate acknowledgements are idempotent.
            log::info!(
                "session: PUBACK for unknown packet id {} from {}",
                packet.packet_id(),
                self.client_id
            );
        }
        self.drain_pending().await
    }

    async fn on_publish_received(&mut self, packet: &PublishReceivedPacket) -> Result<(), Error> {
        self.require_connected("PUBREC")?;

        let packet_id = packet.packet_id();
        let mut release = PublishReleasePacket::new(packet_id, self.level);
        if let Some(inflight) = self.outbound.get_mut(&packet_id.value()) {
            inflight.released = true;
        } else {
            release.set_reason_code(ReasonCode::PacketIdentifierNotFound);
        }
        self.send_packet(&release).await
    }

    async fn on_publish_complete(&mut self, packet: &PublishCompletePacket) -> Result<(), Error> {
        self.require_connected("PUBCOMP")?;

        if self.outbound.remove(&packet.packet_id().value()).is_none() {
            log::info!(
                "session: PUBCOMP for unknown packet id {} from {}",
                packet.packet_id(),
                self.client_id
            );
        }
        self.drain_pending().await
    }

    async fn on_subscribe(&mut self, packet: codec::SubscribePacket) -> Result<(), Error> {
        self.require_connected("SUBSCRIBE")?;
        self.sender
            .send(SessionToListenerCmd::Subscribe(self.id, packet))
            .await?;
        Ok(())
    }

    async fn on_unsubscribe(&mut self, packet: codec::UnsubscribePacket) -> Result<(), Error> {
        self.require_connected("UNSUBSCRIBE")?;
        self.sender
            .send(SessionToListenerCmd::Unsubscribe(self.id, packet))
            .await?;
        Ok(())
    }

    async fn on_ping_request(&mut self) -> Result<(), Error> {
        self.require_connected("PINGREQ")?;
        let ack = PingResponsePacket::new(self.level);
        self.send_packet(&ack).await
    }

    fn on_disconnect(&mut self, packet: &DisconnectPacket) -> Result<(), Error> {
        self.clean = true;
        // Reason 0x04 asks the broker to publish the will anyway.
        self.publish_will = packet.reason_code() == ReasonCode::DisconnectWithWillMessage;

        if let Some(expiry) = packet.properties().session_expiry_interval() {
            // A non-zero expiry may only be set if CONNECT already asked
            // for a persistent session [MQTT-3.1.2-23].
            if self.session_expiry == 0 && expiry > 0 {
                log::warn!(
                    "session: {} tried to raise session expiry on DISCONNECT",
                    self.client_id
                );
            } else {
                self.expiry_override = Some(expiry);
            }
        }

        self.status = Status::Disconnected;
        Ok(())
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToSessionCmd) -> Result<(), Error> {
        match cmd {
            ListenerToSessionCmd::ConnectAck(ack, resumed) => {
                self.on_connect_ack(ack, resumed).await
            }
            ListenerToSessionCmd::Publish(packet) => self.deliver_publish(packet).await,
            ListenerToSessionCmd::SubscribeAck(ack, retained) => {
                self.send_packet(&ack).await?;
                for packet in retained {
                    self.deliver_publish(packet).await?;
                }
                Ok(())
            }
            ListenerToSessionCmd::UnsubscribeAck(ack) => self.send_packet(&ack).await,
            ListenerToSessionCmd::Disconnect(reason) => {
                self.publish_will = true;
                self.send_disconnect(reason).await;
                self.status = Status::Disconnected;
                Ok(())
            }
        }
    }

    async fn on_connect_ack(
        &mut self,
        mut ack: ConnectAckPacket,
        resumed: Vec<PublishPacket>,
    ) -> Result<(), Error> {
        if ack.reason_code().is_error() {
            self.send_packet(&ack).await?;
            self.status = Status::Disconnected;
            return Ok(());
        }

        // If the client asked for a longer (or disabled) keep alive than
        // this listener permits, a 5.0 client is told the enforced value
        // [MQTT-3.2.2-21].
        if self.level == ProtocolLevel::V5
            && self.config.maximum_keep_alive() > 0
            && (self.requested_keep_alive == 0
                || self.requested_keep_alive > self.config.maximum_keep_alive())
        {
            let _ = ack.properties_mut().push(Property::ServerKeepAlive(
                U16Data::new(self.config.maximum_keep_alive()),
            ));
        }

        self.status = Status::Connected;
        self.send_packet(&ack).await?;

        for packet in resumed {
            self.deliver_publish(packet).await?;
        }
        Ok(())
    }

    /// Send one message to the client, allocating a packet id and an
    /// in-flight slot for QoS 1/2.
    async fn deliver_publish(&mut self, mut packet: PublishPacket) -> Result<(), Error> {
        if packet.qos() == QoS::AtMostOnce {
            return self.send_packet(&packet).await;
        }

        if self.outbound.len() >= self.inflight_limit() {
            if self.pending.len() >= constants::PENDING_QUEUE_CAPACITY {
                log::warn!(
                    "session: Pending queue of {} is full, dropping message",
                    self.client_id
                );
                return Ok(());
            }
            self.pending.push_back(packet);
            return Ok(());
        }

        let packet_id = self.alloc_packet_id();
        packet.set_packet_id(packet_id);
        self.outbound.insert(
            packet_id.value(),
            InflightOut {
                packet: packet.clone(),
                released: false,
            },
        );
        self.send_packet(&packet).await
    }

    /// Move queued messages into freed in-flight slots.
    async fn drain_pending(&mut self) -> Result<(), Error> {
        while self.outbound.len() < self.inflight_limit() {
            let Some(packet) = self.pending.pop_front() else {
                return Ok(());
            };
            self.deliver_publish(packet).await?;
        }
        Ok(())
    }

    fn inflight_limit(&self) -> usize {
        let configured = self.config.maximum_inflight_messages();
        let limit = if configured == 0 {
            self.receive_maximum
        } else {
            configured.min(self.receive_maximum)
        };
        usize::from(limit.max(1))
    }

    /// Find the next free packet id, skipping zero and ids in flight.
    fn alloc_packet_id(&mut self) -> PacketId {
        loop {
            self.next_packet_id = match self.next_packet_id {
                u16::MAX => 1,
                id => id + 1,
            };
            if !self.outbound.contains_key(&self.next_packet_id) {
                return PacketId::new(self.next_packet_id);
            }
        }
    }

    /// Check connect and keep alive deadlines. Returns true if the
    /// connection must be closed.
    async fn deadline_reached(&mut self) -> bool {
        if self.status == Status::Invalid
            && self.config.connect_timeout() > 0
            && self.accepted_at.elapsed().as_secs() > self.config.connect_timeout()
        {
            log::info!("session: No CONNECT within deadline, {}", self.id);
            return true;
        }

        // If the Keep Alive value is non-zero and the Server does not
        // receive a Control Packet from the Client within one and a half
        // times the Keep Alive time period, it MUST disconnect [MQTT-3.1.2-24].
        if self.status == Status::Connected
            && self.keep_alive > 0
            && self.last_packet_at.elapsed().as_secs() * 2 > self.keep_alive * 3
        {
            log::info!(
                "session: Keep alive deadline reached, {} ({})",
                self.id,
                self.client_id
            );
            self.publish_will = true;
            self.send_disconnect(ReasonCode::KeepAliveTimeout).await;
            return true;
        }

        false
    }

    /// Send a DISCONNECT with `reason` on 5.0 connections; 3.1.1 has no way
    /// to carry a reason, the socket is simply closed.
    async fn send_disconnect(&mut self, reason: ReasonCode) {
        if self.level == ProtocolLevel::V5 && self.status != Status::Invalid {
            let packet = DisconnectPacket::with_reason(reason, self.level);
            if let Err(err) = self.send_packet(&packet).await {
                log::info!("session: Failed to send DISCONNECT to {}: {}", self.id, err);
            }
        }
    }

    async fn send_packet<P: EncodePacket>(&mut self, packet: &P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        match tokio::time::timeout(constants::WRITE_TIMEOUT, self.stream.write(&buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => {
                self.status = Status::Disconnected;
                self.publish_will = true;
                Err(err)
            }
            Err(_) => {
                self.status = Status::Disconnected;
                self.publish_will = true;
                Err(Error::new(ErrorKind::SocketError, "Write deadline reached"))
            }
        }
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }
}

/// Cap the client's keep alive request at the configured maximum.
fn effective_keep_alive(requested: u16, maximum: u16) -> u64 {
    if maximum > 0 && (requested == 0 || requested > maximum) {
        u64::from(maximum)
    } else {
        u64::from(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_length_needs_more_bytes() {
        assert_eq!(packet_length(&[0x30]), Ok(None));
        assert_eq!(packet_length(&[0x30, 0x04, 0x00]), Ok(None));
    }

    #[test]
    fn test_packet_length_complete() {
        // PINGREQ plus the start of the next packet.
        assert_eq!(packet_length(&[0xc0, 0x00, 0x30]), Ok(Some(2)));
        assert_eq!(packet_length(&[0x30, 0x02, 0xaa, 0xbb]), Ok(Some(4)));
    }

    #[test]
    fn test_packet_length_multi_byte_varint() {
        let mut buf = vec![0x30, 0x80, 0x01];
        buf.extend(std::iter::repeat(0).take(128));
        assert_eq!(packet_length(&buf), Ok(Some(131)));
    }

    #[test]
    fn test_packet_length_rejects_overlong_varint() {
        assert_eq!(
            packet_length(&[0x30, 0xff, 0xff, 0xff, 0xff, 0x7f]),
            Err(DecodeError::InvalidVarInt)
        );
    }

    #[test]
    fn test_effective_keep_alive() {
        assert_eq!(effective_keep_alive(60, 0), 60);
        assert_eq!(effective_keep_alive(0, 0), 0);
        assert_eq!(effective_keep_alive(60, 30), 30);
        assert_eq!(effective_keep_alive(20, 30), 20);
        // A client disabling keep alive is pinned to the server maximum.
        assert_eq!(effective_keep_alive(0, 30), 30);
    }
}

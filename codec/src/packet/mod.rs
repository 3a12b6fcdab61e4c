// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Control packet types.
//!
//! Every packet struct is single-source for both protocol versions: it
//! carries the `ProtocolLevel` it was decoded with (or built for), and its
//! encoder emits the matching layout. Property lists only exist on the wire
//! for MQTT 5.0.

mod auth;
mod connect;
mod connect_ack;
mod disconnect;
mod ping_request;
mod ping_response;
mod publish;
mod publish_ack;
mod publish_complete;
mod publish_received;
mod publish_release;
mod subscribe;
mod subscribe_ack;
mod unsubscribe;
mod unsubscribe_ack;

pub use auth::{AuthPacket, AUTH_PROPERTIES};
pub use connect::{ConnectPacket, CONNECT_PROPERTIES, WILL_PROPERTIES};
pub use connect_ack::{ConnectAckPacket, CONNECT_ACK_PROPERTIES};
pub use disconnect::{DisconnectPacket, DISCONNECT_PROPERTIES};
pub use ping_request::PingRequestPacket;
pub use ping_response::PingResponsePacket;
pub use publish::{PublishPacket, PUBLISH_PROPERTIES};
pub use publish_ack::PublishAckPacket;
pub use publish_complete::PublishCompletePacket;
pub use publish_received::PublishReceivedPacket;
pub use publish_release::PublishReleasePacket;
pub use subscribe::{RetainHandling, SubscribePacket, SubscribeTopic, SUBSCRIBE_PROPERTIES};
pub use subscribe_ack::{SubscribeAckPacket, SUBSCRIBE_ACK_PROPERTIES};
pub use unsubscribe::{UnsubscribePacket, UNSUBSCRIBE_PROPERTIES};
pub use unsubscribe_ack::{UnsubscribeAckPacket, UNSUBSCRIBE_ACK_PROPERTIES};

use crate::{
    ByteArray, DecodeError, EncodeError, EncodePacket, FixedHeader, PacketType, ProtocolLevel,
};

/// Properties which may follow the reason code in PUBACK, PUBREC, PUBREL,
/// PUBCOMP, SUBACK and UNSUBACK packets.
pub const ACK_PROPERTIES: &[crate::PropertyType] = &[
    crate::PropertyType::ReasonString,
    crate::PropertyType::UserProperty,
];

/// One decoded control packet of either protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    /// Decode one complete control packet from `ba`.
    ///
    /// `level` is the protocol version agreed in the CONNECT handshake;
    /// before CONNECT is seen, callers pass the default and the CONNECT
    /// decoder replaces it with the level found in its variable header.
    ///
    /// # Errors
    ///
    /// Returns error if the byte stream is malformed, or shorter than the
    /// remaining length announced in the fixed header.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        if !fixed_header.is_valid_header() {
            log::error!("packet: Auth packet in protocol level {level:?}");
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() > ba.remaining_bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }

        match fixed_header.packet_type() {
            PacketType::Connect => {
                ConnectPacket::decode_body(&fixed_header, ba).map(Self::Connect)
            }
            PacketType::ConnectAck => {
                ConnectAckPacket::decode_body(&fixed_header, ba).map(Self::ConnectAck)
            }
            PacketType::Publish { .. } => {
                PublishPacket::decode_body(&fixed_header, ba).map(Self::Publish)
            }
            PacketType::PublishAck => {
                PublishAckPacket::decode_body(&fixed_header, ba).map(Self::PublishAck)
            }
            PacketType::PublishReceived => {
                PublishReceivedPacket::decode_body(&fixed_header, ba).map(Self::PublishReceived)
            }
            PacketType::PublishRelease => {
                PublishReleasePacket::decode_body(&fixed_header, ba).map(Self::PublishRelease)
            }
            PacketType::PublishComplete => {
                PublishCompletePacket::decode_body(&fixed_header, ba).map(Self::PublishComplete)
            }
            PacketType::Subscribe => {
                SubscribePacket::decode_body(&fixed_header, ba).map(Self::Subscribe)
            }
            PacketType::SubscribeAck => {
                SubscribeAckPacket::decode_body(&fixed_header, ba).map(Self::SubscribeAck)
            }
            PacketType::Unsubscribe => {
                UnsubscribePacket::decode_body(&fixed_header, ba).map(Self::Unsubscribe)
            }
            PacketType::UnsubscribeAck => {
                UnsubscribeAckPacket::decode_body(&fixed_header, ba).map(Self::UnsubscribeAck)
            }
            PacketType::PingRequest => {
                PingRequestPacket::decode_body(&fixed_header, ba).map(Self::PingRequest)
            }
            PacketType::PingResponse => {
                PingResponsePacket::decode_body(&fixed_header, ba).map(Self::PingResponse)
            }
            PacketType::Disconnect => {
                DisconnectPacket::decode_body(&fixed_header, ba).map(Self::Disconnect)
            }
            PacketType::Auth => AuthPacket::decode_body(&fixed_header, ba).map(Self::Auth),
        }
    }

    /// Get packet type of inner packet.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(..) => PacketType::Connect,
            Self::ConnectAck(..) => PacketType::ConnectAck,
            Self::Publish(packet) => PacketType::Publish {
                dup: packet.dup(),
                qos: packet.qos(),
                retain: packet.retain(),
            },
            Self::PublishAck(..) => PacketType::PublishAck,
            Self::PublishReceived(..) => PacketType::PublishReceived,
            Self::PublishRelease(..) => PacketType::PublishRelease,
            Self::PublishComplete(..) => PacketType::PublishComplete,
            Self::Subscribe(..) => PacketType::Subscribe,
            Self::SubscribeAck(..) => PacketType::SubscribeAck,
            Self::Unsubscribe(..) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(..) => PacketType::UnsubscribeAck,
            Self::PingRequest(..) => PacketType::PingRequest,
            Self::PingResponse(..) => PacketType::PingResponse,
            Self::Disconnect(..) => PacketType::Disconnect,
            Self::Auth(..) => PacketType::Auth,
        }
    }
}

impl EncodePacket for Packet {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        match self {
            Self::Connect(packet) => packet.encode(buf),
            Self::ConnectAck(packet) => packet.encode(buf),
            Self::Publish(packet) => packet.encode(buf),
            Self::PublishAck(packet) => packet.encode(buf),
            Self::PublishReceived(packet) => packet.encode(buf),
            Self::PublishRelease(packet) => packet.encode(buf),
            Self::PublishComplete(packet) => packet.encode(buf),
            Self::Subscribe(packet) => packet.encode(buf),
            Self::SubscribeAck(packet) => packet.encode(buf),
            Self::Unsubscribe(packet) => packet.encode(buf),
            Self::UnsubscribeAck(packet) => packet.encode(buf),
            Self::PingRequest(packet) => packet.encode(buf),
            Self::PingResponse(packet) => packet.encode(buf),
            Self::Disconnect(packet) => packet.encode(buf),
            Self::Auth(packet) => packet.encode(buf),
        }
    }
}

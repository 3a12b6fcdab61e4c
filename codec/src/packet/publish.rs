// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use std::io::Write;

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolLevel, PubTopic, QoS,
};

/// `PublishPacket` is used to transport application messages from the Client
/// to the Server, or from the Server to the Client.
///
/// Basic structure of packet:
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Topic name length     |
/// |                       |
/// +-----------------------+
/// | Topic name ...        |
/// +-----------------------+
/// | Packet Identifier     |
/// |                       |
/// +-----------------------+
/// | Properties (5.0) ...  |
/// +-----------------------+
/// | Msg payload ...       |
/// +-----------------------+
/// ```
///
/// Note that the packet identifier is only present in QoS 1 and QoS 2
/// packets [MQTT-2.2.1-2].
///
/// Response of `PublishPacket`:
/// - QoS 0, no response
/// - QoS 1, `PublishAckPacket`
/// - QoS 2, `PublishReceivedPacket`
///
/// The payload is kept in a [`Bytes`] handle, so cloning the packet for every
/// matching subscriber during fan-out shares one buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    /// The DUP flag MUST be set to 1 by the Client or Server when it attempts
    /// to re-deliver a PUBLISH packet [MQTT-3.3.1-1].
    ///
    /// The value of the DUP flag from an incoming PUBLISH packet is not
    /// propagated when the PUBLISH packet is sent to subscribers by the
    /// Server. The DUP flag in the outgoing PUBLISH packet is set
    /// independently; its value MUST be determined solely by whether the
    /// outgoing PUBLISH packet is a retransmission [MQTT-3.3.1-3].
    dup: bool,

    /// A PUBLISH packet MUST NOT have both QoS bits set to 1 [MQTT-3.3.1-4].
    qos: QoS,

    /// If the RETAIN flag is set to 1 in a PUBLISH packet sent by a Client to
    /// a Server, the Server MUST replace any existing retained message for
    /// this topic and store the Application Message [MQTT-3.3.1-5]. If the
    /// Payload contains zero bytes, any retained message for the same topic
    /// MUST be removed instead [MQTT-3.3.1-6], and a zero byte retained
    /// message MUST NOT be stored [MQTT-3.3.1-7].
    retain: bool,

    /// The Topic Name MUST NOT contain wildcard characters [MQTT-3.3.2-2].
    topic: PubTopic,

    /// Only present where the QoS level is 1 or 2; zero otherwise.
    packet_id: PacketId,

    level: ProtocolLevel,

    properties: Properties,

    msg: Bytes,
}

/// Properties available in publish packets.
pub const PUBLISH_PROPERTIES: &[PropertyType] = &[
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::TopicAlias,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
    PropertyType::ContentType,
];

impl PublishPacket {
    /// Create a new publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid.
    pub fn new(topic: &str, qos: QoS, msg: &[u8]) -> Result<Self, EncodeError> {
        let topic = PubTopic::new(topic)?;
        Ok(Self {
            qos,
            topic,
            msg: Bytes::copy_from_slice(msg),
            ..Self::default()
        })
    }

    /// Update `retain` flag.
    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// Update `dup` flag.
    ///
    /// # Errors
    ///
    /// Returns error if `dup` flag is set in a QoS 0 packet.
    pub fn set_dup(&mut self, dup: bool) -> Result<&mut Self, EncodeError> {
        // The DUP flag MUST be set to 0 for all QoS 0 messages [MQTT-3.3.1-2].
        if dup && self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketType);
        }
        self.dup = dup;
        Ok(self)
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    /// Update `qos` value. Resets the packet id for QoS 0.
    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        if qos == QoS::AtMostOnce {
            self.packet_id = PacketId::new(0);
            self.dup = false;
        }
        self.qos = qos;
        self
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    /// Update packet id.
    ///
    /// The packet id field is only present in publish packets where the QoS
    /// level is 1 or 2.
    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Re-stamp the protocol level, used when the broker forwards a message
    /// to a subscriber which connected with a different version.
    pub fn set_level(&mut self, level: ProtocolLevel) -> &mut Self {
        self.level = level;
        self
    }

    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    /// Returns true if topic name starts with `$`.
    #[must_use]
    pub fn is_internal_topic(&self) -> bool {
        self.topic.is_internal()
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Get a reference to message payload.
    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.msg
    }

    fn remaining_length(&self) -> usize {
        let mut remaining_length = self.topic.bytes() + self.msg.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += PacketId::bytes();
        }
        if self.level == ProtocolLevel::V5 {
            remaining_length += self.properties.bytes();
        }
        remaining_length
    }

    pub(crate) fn decode_body(
        fixed_header: &FixedHeader,
        ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        let (dup, qos, retain) =
            if let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() {
                (dup, qos, retain)
            } else {
                return Err(DecodeError::InvalidPacketType);
            };

        let body_start = ba.offset();
        let topic = PubTopic::decode(ba)?;

        // A PUBLISH packet MUST NOT contain a Packet Identifier if its QoS
        // value is set to 0 [MQTT-2.2.1-2].
        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::new(0)
        } else {
            let packet_id = PacketId::decode(ba)?;
            if packet_id.value() == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            packet_id
        };

        let properties = if fixed_header.level() == ProtocolLevel::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(err) = check_property_type_list(properties.props(), PUBLISH_PROPERTIES) {
                log::error!("PublishPacket: Invalid property: {err:?}");
                return Err(err.into());
            }
            properties
        } else {
            Properties::new()
        };

        // It is valid for a PUBLISH packet to contain a zero length payload.
        let header_consumed = ba.offset() - body_start;
        let msg_len = fixed_header
            .remaining_length()
            .checked_sub(header_consumed)
            .ok_or(DecodeError::InvalidRemainingLength)?;

        let msg = Bytes::copy_from_slice(ba.read_bytes(msg_len)?);
        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            level: fixed_header.level(),
            properties,
            msg,
        })
    }

    /// Decode one full publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let packet_type = PacketType::Publish {
            dup: self.dup,
            retain: self.retain,
            qos: self.qos,
        };
        let fixed_header = FixedHeader::new(packet_type, self.remaining_length(), self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;

        self.topic.encode(buf)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.encode(buf)?;
        }
        if self.level == ProtocolLevel::V5 {
            self.properties.encode(buf)?;
        }

        buf.write_all(&self.msg)?;

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_v3() {
        let buf = [
            0x30, 0x13, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o', b'H', b'e', b'l', b'l', b'o',
            b',', b' ', b'w', b'o', b'r',
        ];
        let mut ba = ByteArray::new(&buf);
        let packet = PublishPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(packet.topic(), "hello");
        assert_eq!(packet.qos(), QoS::AtMostOnce);
        assert_eq!(packet.message(), b"Hello, wor");
    }

    #[test]
    fn test_round_trip_qos1_v5() {
        let mut packet = PublishPacket::new("sensors/room1/temp", QoS::AtLeastOnce, b"22").unwrap();
        packet.set_packet_id(PacketId::new(42));
        packet.set_level(ProtocolLevel::V5);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let packet = PublishPacket::new("status", QoS::AtMostOnce, b"").unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert!(decoded.message().is_empty());
    }

    #[test]
    fn test_decode_rejects_zero_packet_id() {
        // QoS 1 publish with packet id 0.
        let buf = [0x32, 0x05, 0x00, 0x01, b'a', 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::InvalidPacketId)
        );
    }

    #[test]
    fn test_set_dup_rejected_on_qos0() {
        let mut packet = PublishPacket::new("a", QoS::AtMostOnce, b"x").unwrap();
        assert!(packet.set_dup(true).is_err());
    }
}

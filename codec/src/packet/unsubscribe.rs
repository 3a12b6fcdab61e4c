// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolLevel, SubTopic,
};

/// Properties available in the UNSUBSCRIBE variable header.
pub const UNSUBSCRIBE_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];

/// An UNSUBSCRIBE packet is sent by the Client to the Server to unsubscribe
/// from topics.
///
/// Basic structure of packet:
///
/// ```txt
/// +---------------------------+
/// | Fixed header              |
/// |                           |
/// +---------------------------+
/// | Packet Identifier         |
/// |                           |
/// +---------------------------+
/// | Properties (5.0) ...      |
/// +---------------------------+
/// | Topic 0 length            |
/// |                           |
/// +---------------------------+
/// | Topic 0 ...               |
/// +---------------------------+
/// | Topic 1 length            |
/// |                           |
/// +---------------------------+
/// | Topic 1 ...               |
/// +---------------------------+
/// ```
///
/// The payload MUST contain at least one Topic Filter [MQTT-3.10.3-2].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribePacket {
    level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    topics: Vec<SubTopic>,
}

impl UnsubscribePacket {
    /// Create a new unsubscribe packet with one topic filter.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is an invalid filter.
    pub fn new(topic: &str, packet_id: PacketId) -> Result<Self, EncodeError> {
        let topic = SubTopic::new(topic)?;
        Ok(Self {
            level: ProtocolLevel::default(),
            packet_id,
            properties: Properties::new(),
            topics: vec![topic],
        })
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

    pub fn set_level(&mut self, level: ProtocolLevel) -> &mut Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn topics(&self) -> &[SubTopic] {
        &self.topics
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub(crate) fn decode_body(
        fixed_header: &FixedHeader,
        ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        let body_start = ba.offset();
        let packet_id = PacketId::decode(ba)?;
        if packet_id.value() == 0 {
            return Err(DecodeError::InvalidPacketId);
        }

        let properties = if fixed_header.level() == ProtocolLevel::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(err) = check_property_type_list(properties.props(), UNSUBSCRIBE_PROPERTIES) {
                log::error!("UnsubscribePacket: Invalid property: {err:?}");
                return Err(err.into());
            }
            properties
        } else {
            Properties::new()
        };

        let mut topics = Vec::new();
        while ba.offset() - body_start < fixed_header.remaining_length() {
            topics.push(SubTopic::decode(ba)?);
        }
        if topics.is_empty() {
            return Err(DecodeError::EmptyTopicFilter);
        }

        Ok(Self {
            level: fixed_header.level(),
            packet_id,
            properties,
            topics,
        })
    }

    /// Decode one full unsubscribe packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        if fixed_header.remaining_length() > ba.remaining_bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let mut remaining_length = PacketId::bytes();
        if self.level == ProtocolLevel::V5 {
            remaining_length += self.properties.bytes();
        }
        remaining_length += self.topics.iter().map(SubTopic::bytes).sum::<usize>();

        let fixed_header = FixedHeader::new(PacketType::Unsubscribe, remaining_length, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if self.level == ProtocolLevel::V5 {
            self.properties.encode(buf)?;
        }
        for topic in &self.topics {
            topic.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = UnsubscribePacket::new("sensors/+/temp", PacketId::new(21)).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // Flag nibble of UNSUBSCRIBE is 0b0010.
        assert_eq!(buf[0], 0xa2);

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribePacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let buf = [0xa2, 0x02, 0x00, 0x15];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            UnsubscribePacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::EmptyTopicFilter)
        );
    }
}

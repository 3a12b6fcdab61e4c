// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::ACK_PROPERTIES;
use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, ProtocolLevel, ReasonCode,
};

/// A PUBACK packet is the response to a PUBLISH packet with QoS 1.
///
/// Basic structure of packet:
///
/// ```txt
/// +----------------------------+
/// | Fixed header               |
/// |                            |
/// +----------------------------+
/// | Packet Identifier          |
/// |                            |
/// +----------------------------+
/// | Reason Code (5.0)          |
/// +----------------------------+
/// | Properties (5.0) ...       |
/// +----------------------------+
/// ```
///
/// In MQTT 5.0 the reason code and properties may be omitted: a remaining
/// length of 2 means reason code 0x00 (Success) with no properties.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishAckPacket {
    level: ProtocolLevel,
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, level: ProtocolLevel) -> Self {
        Self {
            level,
            packet_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        self.reason_code = reason_code;
        self
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub(crate) fn decode_body(
        fixed_header: &FixedHeader,
        ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        let packet_id = PacketId::decode(ba)?;

        let mut reason_code = ReasonCode::Success;
        let mut properties = Properties::new();
        if fixed_header.level() == ProtocolLevel::V5 && fixed_header.remaining_length() > 2 {
            reason_code = ReasonCode::decode(ba)?;
            if fixed_header.remaining_length() > 3 {
                properties = Properties::decode(ba)?;
                if let Err(err) = check_property_type_list(properties.props(), ACK_PROPERTIES) {
                    log::error!("PublishAckPacket: Invalid property: {err:?}");
                    return Err(err.into());
                }
            }
        }

        Ok(Self {
            level: fixed_header.level(),
            packet_id,
            reason_code,
            properties,
        })
    }

    /// Decode one full publish ack packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for PublishAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let short_form = self.level != ProtocolLevel::V5
            || (self.reason_code == ReasonCode::Success && self.properties.is_empty());
        let remaining_length = if short_form {
            PacketId::bytes()
        } else {
            PacketId::bytes() + ReasonCode::bytes() + self.properties.bytes()
        };

        let fixed_header = FixedHeader::new(PacketType::PublishAck, remaining_length, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if !short_form {
            self.reason_code.encode(buf)?;
            self.properties.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v3_round_trip() {
        let packet = PublishAckPacket::new(PacketId::new(17), ProtocolLevel::V311);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x40, 0x02, 0x00, 0x11]);

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishAckPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_v5_success_is_short_form() {
        let packet = PublishAckPacket::new(PacketId::new(3), ProtocolLevel::V5);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x40, 0x02, 0x00, 0x03]);

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishAckPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }

    #[test]
    fn test_v5_reason_code_round_trip() {
        let mut packet = PublishAckPacket::new(PacketId::new(3), ProtocolLevel::V5);
        packet.set_reason_code(ReasonCode::QuotaExceeded);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishAckPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::QuotaExceeded);
    }
}

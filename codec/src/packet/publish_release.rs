// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::ACK_PROPERTIES;
use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, ProtocolLevel, ReasonCode,
};

/// A PUBREL packet is the response to a PUBREC packet.
///
/// It is the third packet of the QoS 2 protocol exchange. Bits 3,2,1 and 0
/// of its fixed header are reserved and MUST be set to 0,0,1 and 0
/// respectively [MQTT-3.6.1-1]; the flag check happens in the fixed header
/// decoder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReleasePacket {
    level: ProtocolLevel,
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishReleasePacket {
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
                    log::error!("PublishReleasePacket: Invalid property: {err:?}");
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

    /// Decode one full publish release packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for PublishReleasePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let short_form = self.level != ProtocolLevel::V5
            || (self.reason_code == ReasonCode::Success && self.properties.is_empty());
        let remaining_length = if short_form {
            PacketId::bytes()
        } else {
            PacketId::bytes() + ReasonCode::bytes() + self.properties.bytes()
        };

        let fixed_header =
            FixedHeader::new(PacketType::PublishRelease, remaining_length, self.level)
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
    fn test_round_trip() {
        let packet = PublishReleasePacket::new(PacketId::new(7), ProtocolLevel::V311);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x62, 0x02, 0x00, 0x07]);

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishReleasePacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_rejects_zero_flags() {
        let buf = [0x60, 0x02, 0x00, 0x07];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishReleasePacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}

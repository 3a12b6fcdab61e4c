// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::ACK_PROPERTIES;
use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolLevel, ReasonCode,
};

/// Properties available in the UNSUBACK variable header.
pub const UNSUBSCRIBE_ACK_PROPERTIES: &[PropertyType] = ACK_PROPERTIES;

/// The UNSUBACK packet is sent by the Server to the Client to confirm
/// receipt of an UNSUBSCRIBE packet.
///
/// In MQTT 5.0 the payload carries one reason code per Topic Filter of the
/// acknowledged UNSUBSCRIBE packet, in the same order [MQTT-3.11.3-1];
/// in 3.1.1 there is no payload, so the remaining length is exactly 2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnsubscribeAckPacket {
    level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    reasons: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, level: ProtocolLevel) -> Self {
        Self {
            level,
            packet_id,
            properties: Properties::new(),
            reasons: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_reasons(packet_id: PacketId, reasons: Vec<ReasonCode>, level: ProtocolLevel) -> Self {
        Self {
            level,
            packet_id,
            properties: Properties::new(),
            reasons,
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
    pub fn reasons(&self) -> &[ReasonCode] {
        &self.reasons
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

        let mut properties = Properties::new();
        let mut reasons = Vec::new();
        if fixed_header.level() == ProtocolLevel::V5 {
            properties = Properties::decode(ba)?;
            if let Err(err) =
                check_property_type_list(properties.props(), UNSUBSCRIBE_ACK_PROPERTIES)
            {
                log::error!("UnsubscribeAckPacket: Invalid property: {err:?}");
                return Err(err.into());
            }
            while ba.offset() - body_start < fixed_header.remaining_length() {
                reasons.push(ReasonCode::decode(ba)?);
            }
        } else if fixed_header.remaining_length() != PacketId::bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }

        Ok(Self {
            level: fixed_header.level(),
            packet_id,
            properties,
            reasons,
        })
    }

    /// Decode one full unsubscribe ack packet.
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

impl EncodePacket for UnsubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let mut remaining_length = PacketId::bytes();
        if self.level == ProtocolLevel::V5 {
            remaining_length += self.properties.bytes() + self.reasons.len();
        }

        let fixed_header =
            FixedHeader::new(PacketType::UnsubscribeAck, remaining_length, self.level)
                .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if self.level == ProtocolLevel::V5 {
            self.properties.encode(buf)?;
            for reason in &self.reasons {
                reason.encode(buf)?;
            }
        }

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v3_round_trip() {
        let packet = UnsubscribeAckPacket::new(PacketId::new(30), ProtocolLevel::V311);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xb0, 0x02, 0x00, 0x1e]);

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_v5_round_trip_with_reasons() {
        // A 5.0 UNSUBACK carries one reason code per filter; packets longer
        // than the bare packet id must decode.
        let packet = UnsubscribeAckPacket::with_reasons(
            PacketId::new(30),
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
            ProtocolLevel::V5,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.reasons().len(), 2);
    }
}

// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use super::ACK_PROPERTIES;
use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolLevel, ReasonCode,
};

/// Properties available in the SUBACK variable header.
pub const SUBSCRIBE_ACK_PROPERTIES: &[PropertyType] = ACK_PROPERTIES;

/// A SUBACK packet is sent by the Server to the Client to confirm receipt
/// and processing of a SUBSCRIBE packet.
///
/// The payload contains a list of reason codes; each reason code corresponds
/// to a Topic Filter in the SUBSCRIBE packet being acknowledged, in the same
/// order [MQTT-3.9.3-1]. The granted-QoS values 0x00/0x01/0x02 are shared
/// between both protocol versions; 0x80 and above signal failure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    level: ProtocolLevel,
    packet_id: PacketId,
    properties: Properties,
    reasons: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason: ReasonCode, level: ProtocolLevel) -> Self {
        Self {
            level,
            packet_id,
            properties: Properties::new(),
            reasons: vec![reason],
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

        let properties = if fixed_header.level() == ProtocolLevel::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(err) =
                check_property_type_list(properties.props(), SUBSCRIBE_ACK_PROPERTIES)
            {
                log::error!("SubscribeAckPacket: Invalid property: {err:?}");
                return Err(err.into());
            }
            properties
        } else {
            Properties::new()
        };

        let mut reasons = Vec::new();
        while ba.offset() - body_start < fixed_header.remaining_length() {
            reasons.push(ReasonCode::decode(ba)?);
        }
        if reasons.is_empty() {
            return Err(DecodeError::InvalidRemainingLength);
        }

        Ok(Self {
            level: fixed_header.level(),
            packet_id,
            properties,
            reasons,
        })
    }

    /// Decode one full subscribe ack packet.
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

impl EncodePacket for SubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let mut remaining_length = PacketId::bytes() + self.reasons.len();
        if self.level == ProtocolLevel::V5 {
            remaining_length += self.properties.bytes();
        }

        let fixed_header = FixedHeader::new(PacketType::SubscribeAck, remaining_length, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if self.level == ProtocolLevel::V5 {
            self.properties.encode(buf)?;
        }
        for reason in &self.reasons {
            reason.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_v3() {
        let packet = SubscribeAckPacket::with_reasons(
            PacketId::new(9),
            vec![ReasonCode::GrantedQoS1, ReasonCode::UnspecifiedError],
            ProtocolLevel::V311,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x90, 0x04, 0x00, 0x09, 0x01, 0x80]);

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_round_trip_v5() {
        let packet = SubscribeAckPacket::new(
            PacketId::new(11),
            ReasonCode::GrantedQoS2,
            ProtocolLevel::V5,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded, packet);
    }
}

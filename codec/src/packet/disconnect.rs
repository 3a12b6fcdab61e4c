// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketType,
    Properties, PropertyType, ProtocolLevel, ReasonCode,
};

/// Properties available in the DISCONNECT variable header.
pub const DISCONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReasonString,
    PropertyType::ServerReference,
    PropertyType::UserProperty,
];

/// The DISCONNECT packet is the final packet sent to the Server from
/// a Client, or from the Server to a Client.
///
/// In MQTT 3.1.1 it has no variable header at all. In 5.0 a reason code and
/// properties may follow; a remaining length of 0 means reason code 0x00
/// (Normal disconnection) with no properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisconnectPacket {
    level: ProtocolLevel,
    reason_code: ReasonCode,
    properties: Properties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(level: ProtocolLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_reason(reason_code: ReasonCode, level: ProtocolLevel) -> Self {
        Self {
            level,
            reason_code,
            properties: Properties::new(),
        }
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

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub(crate) fn decode_body(
        fixed_header: &FixedHeader,
        ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        let mut reason_code = ReasonCode::Success;
        let mut properties = Properties::new();

        if fixed_header.level() == ProtocolLevel::V5 {
            if fixed_header.remaining_length() >= 1 {
                reason_code = ReasonCode::decode(ba)?;
            }
            if fixed_header.remaining_length() >= 2 {
                properties = Properties::decode(ba)?;
                if let Err(err) = check_property_type_list(properties.props(), DISCONNECT_PROPERTIES)
                {
                    log::error!("DisconnectPacket: Invalid property: {err:?}");
                    return Err(err.into());
                }
            }
        } else if fixed_header.remaining_length() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }

        Ok(Self {
            level: fixed_header.level(),
            reason_code,
            properties,
        })
    }

    /// Decode one full disconnect packet.
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

impl EncodePacket for DisconnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let short_form = self.level != ProtocolLevel::V5
            || (self.reason_code == ReasonCode::Success && self.properties.is_empty());
        let remaining_length = if short_form {
            0
        } else {
            ReasonCode::bytes() + self.properties.bytes()
        };

        let fixed_header = FixedHeader::new(PacketType::Disconnect, remaining_length, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;
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
        let packet = DisconnectPacket::new(ProtocolLevel::V311);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xe0, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_v5_reason_round_trip() {
        let packet =
            DisconnectPacket::with_reason(ReasonCode::SessionTakenOver, ProtocolLevel::V5);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::SessionTakenOver);
    }

    #[test]
    fn test_v5_empty_means_normal() {
        let buf = [0xe0, 0x00];
        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }
}

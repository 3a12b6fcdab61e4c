// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketType,
    Properties, PropertyType, ProtocolLevel, ReasonCode,
};

/// Properties available in the AUTH variable header.
pub const AUTH_PROPERTIES: &[PropertyType] = &[
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
];

/// An AUTH packet is sent from Client to Server or Server to Client as part
/// of an extended authentication exchange. MQTT 5.0 only.
///
/// A remaining length of 0 means reason code 0x00 (Success) with no
/// properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
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
        if fixed_header.remaining_length() >= 1 {
            reason_code = ReasonCode::decode(ba)?;
        }
        if fixed_header.remaining_length() >= 2 {
            properties = Properties::decode(ba)?;
            if let Err(err) = check_property_type_list(properties.props(), AUTH_PROPERTIES) {
                log::error!("AuthPacket: Invalid property: {err:?}");
                return Err(err.into());
            }
        }

        Ok(Self {
            reason_code,
            properties,
        })
    }

    /// Decode one full auth packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, ProtocolLevel::V5)?;
        if fixed_header.remaining_length() > ba.remaining_bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for AuthPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let short_form = self.reason_code == ReasonCode::Success && self.properties.is_empty();
        let remaining_length = if short_form {
            0
        } else {
            ReasonCode::bytes() + self.properties.bytes()
        };

        let fixed_header = FixedHeader::new(PacketType::Auth, remaining_length, ProtocolLevel::V5)
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
    use crate::{Property, StringData};

    #[test]
    fn test_round_trip() {
        let mut packet = AuthPacket::new(ReasonCode::ContinueAuthentication);
        packet
            .properties_mut()
            .push(Property::AuthenticationMethod(
                StringData::from("SCRAM-SHA-1").unwrap(),
            ))
            .unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = AuthPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_empty_means_success() {
        let buf = [0xf0, 0x00];
        let mut ba = ByteArray::new(&buf);
        let decoded = AuthPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }
}

// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::property::check_property_type_list;
use crate::{
    ByteArray, ConnectReturnCode, DecodeError, DecodePacket, EncodeError, EncodePacket,
    FixedHeader, PacketType, Properties, PropertyType, ProtocolLevel, ReasonCode,
};

/// Properties available in the CONNACK variable header.
pub const CONNECT_ACK_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumQoS,
    PropertyType::RetainAvailable,
    PropertyType::MaximumPacketSize,
    PropertyType::AssignedClientIdentifier,
    PropertyType::TopicAliasMaximum,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
    PropertyType::WildcardSubscriptionAvailable,
    PropertyType::SubscriptionIdentifierAvailable,
    PropertyType::SharedSubscriptionAvailable,
    PropertyType::ServerKeepAlive,
    PropertyType::ResponseInformation,
    PropertyType::ServerReference,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// The CONNACK packet is the packet sent by the Server in response to
/// a CONNECT packet received from a Client.
///
/// The first packet sent from the Server to the Client MUST be a CONNACK
/// packet [MQTT-3.2.0-1].
///
/// Basic structure of packet:
///
/// ```txt
/// +----------------------------+
/// | Fixed header               |
/// |                            |
/// +----------------------------+
/// | Ack flags                  |
/// +----------------------------+
/// | Reason code / return code  |
/// +----------------------------+
/// | Properties (5.0) ...       |
/// +----------------------------+
/// ```
///
/// For MQTT 3.1.1 the second byte is the connect return code; its wire
/// values differ from the 5.0 reason code table and are mapped on the fly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectAckPacket {
    level: ProtocolLevel,

    /// The Session Present flag informs the Client whether the Server is
    /// using Session State from a previous connection for this ClientID.
    ///
    /// If the Server accepts a connection with Clean Start set to 1, the
    /// Server MUST set Session Present to 0 in the CONNACK packet
    /// [MQTT-3.2.2-2]. Bits 7-1 of the acknowledge flags byte are reserved
    /// and MUST be set to 0 [MQTT-3.2.2-1].
    session_present: bool,

    reason_code: ReasonCode,

    properties: Properties,
}

impl ConnectAckPacket {
    #[must_use]
    pub fn new(session_present: bool, reason_code: ReasonCode, level: ProtocolLevel) -> Self {
        Self {
            level,
            session_present,
            reason_code,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    /// Get assigned client identifier value, if present.
    #[must_use]
    pub fn assigned_client_id(&self) -> Option<&str> {
        match self.properties.find(PropertyType::AssignedClientIdentifier) {
            Some(crate::Property::AssignedClientIdentifier(client_id)) => {
                Some(client_id.as_ref())
            }
            _ => None,
        }
    }

    pub(crate) fn decode_body(
        fixed_header: &FixedHeader,
        ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        let ack_flags = ba.read_byte()?;
        if ack_flags & 0b1111_1110 != 0 {
            log::error!("ConnectAckPacket: Invalid ack flags: {ack_flags:#b}");
            return Err(DecodeError::InvalidPacketFlags);
        }
        let session_present = ack_flags & 0b0000_0001 == 0b0000_0001;

        let reason_code = if fixed_header.level() == ProtocolLevel::V5 {
            ReasonCode::decode(ba)?
        } else {
            ReasonCode::from(ConnectReturnCode::try_from(ba.read_byte()?)?)
        };

        let properties = if fixed_header.level() == ProtocolLevel::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(err) = check_property_type_list(properties.props(), CONNECT_ACK_PROPERTIES) {
                log::error!("ConnectAckPacket: Invalid property: {err:?}");
                return Err(err.into());
            }
            properties
        } else {
            Properties::new()
        };

        Ok(Self {
            level: fixed_header.level(),
            session_present,
            reason_code,
            properties,
        })
    }

    /// Decode one full connect ack packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let mut remaining_length = 2;
        if self.level == ProtocolLevel::V5 {
            remaining_length += self.properties.bytes();
        }

        let fixed_header = FixedHeader::new(PacketType::ConnectAck, remaining_length, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;

        buf.push(u8::from(self.session_present));
        if self.level == ProtocolLevel::V5 {
            self.reason_code.encode(buf)?;
            self.properties.encode(buf)?;
        } else {
            ConnectReturnCode::from(self.reason_code).encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Property, StringData};

    #[test]
    fn test_v3_round_trip() {
        let packet = ConnectAckPacket::new(true, ReasonCode::Success, ProtocolLevel::V311);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0x20, 0x02, 0x01, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectAckPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_v3_return_code_mapping() {
        let packet = ConnectAckPacket::new(
            false,
            ReasonCode::UnsupportedProtocolVersion,
            ProtocolLevel::V311,
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // 3.1.1 wire value of unaccepted protocol version is 1.
        assert_eq!(&buf, &[0x20, 0x02, 0x00, 0x01]);
    }

    #[test]
    fn test_v5_round_trip_with_assigned_client_id() {
        let mut packet = ConnectAckPacket::new(false, ReasonCode::Success, ProtocolLevel::V5);
        packet
            .properties_mut()
            .push(Property::AssignedClientIdentifier(
                StringData::from("weir-abc").unwrap(),
            ))
            .unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectAckPacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.assigned_client_id(), Some("weir-abc"));
    }

    #[test]
    fn test_reserved_ack_flags_rejected() {
        let buf = [0x20, 0x02, 0x02, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectAckPacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}

// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, WriteBytesExt};

use crate::property::check_property_type_list;
use crate::utils::validate_client_id;
use crate::{
    BinaryData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    PacketType, Properties, PropertyType, ProtocolLevel, PubTopic, QoS, StringData,
};

/// Protocol name of MQTT 3.1.1 and 5.0, `0x00 0x04 'M' 'Q' 'T' 'T'`.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol name of the legacy 3.1 protocol.
pub const PROTOCOL_NAME_V31: &str = "MQIsdp";

/// Properties available in the CONNECT variable header.
pub const CONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumPacketSize,
    PropertyType::TopicAliasMaximum,
    PropertyType::RequestResponseInformation,
    PropertyType::RequestProblemInformation,
    PropertyType::UserProperty,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// Properties available in the will property list.
pub const WILL_PROPERTIES: &[PropertyType] = &[
    PropertyType::WillDelayInterval,
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
];

/// Structure of the connect flags byte:
///
/// ```txt
///  7               0
/// +-+-+-+-+-+-+-+-+-+
/// | | | | | | | | | |
/// +-+-+-+-+-+-+-+-+-+
///  ^ ^ ^ ^---^ ^ ^ ^
///  | | |   |   | | +-- reserved, MUST be 0
///  | | |   |   | +---- clean session
///  | | |   |   +------ will flag
///  | | |   +---------- will qos
///  | | +-------------- will retain
///  | +---------------- password flag
///  +------------------ username flag
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ConnectFlags {
    username: bool,
    password: bool,
    will_retain: bool,
    will_qos: QoS,
    will: bool,
    clean_session: bool,
}

impl ConnectFlags {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flags = ba.read_byte()?;

        // The Server MUST validate that the reserved flag in the CONNECT
        // packet is set to 0 [MQTT-3.1.2-3].
        if flags & 0b0000_0001 != 0 {
            log::error!("ConnectPacket: Reserved connect flag bit is set");
            return Err(DecodeError::InvalidConnectFlags);
        }

        let username = flags & 0b1000_0000 == 0b1000_0000;
        let password = flags & 0b0100_0000 == 0b0100_0000;
        let will_retain = flags & 0b0010_0000 == 0b0010_0000;
        let will_qos = QoS::try_from((flags & 0b0001_1000) >> 3)?;
        let will = flags & 0b0000_0100 == 0b0000_0100;
        let clean_session = flags & 0b0000_0010 == 0b0000_0010;

        // If the Will Flag is set to 0, then Will QoS MUST be set to 0 and
        // Will Retain MUST be set to 0 [MQTT-3.1.2-11/13/15].
        if !will && (will_retain || will_qos != QoS::AtMostOnce) {
            log::error!("ConnectPacket: Will flags set without will flag");
            return Err(DecodeError::InvalidConnectFlags);
        }

        Ok(Self {
            username,
            password,
            will_retain,
            will_qos,
            will,
            clean_session,
        })
    }

    fn encode(self, buf: &mut Vec<u8>) {
        let mut flags: u8 = 0;
        if self.username {
            flags |= 0b1000_0000;
        }
        if self.password {
            flags |= 0b0100_0000;
        }
        if self.will_retain {
            flags |= 0b0010_0000;
        }
        flags |= (self.will_qos as u8) << 3;
        if self.will {
            flags |= 0b0000_0100;
        }
        if self.clean_session {
            flags |= 0b0000_0010;
        }
        buf.push(flags);
    }
}

/// `ConnectPacket` is the first packet a Client sends to the Server after
/// the network connection is established.
///
/// Basic structure of packet:
///
/// ```txt
/// +--------------------------+
/// | Fixed header             |
/// |                          |
/// +--------------------------+
/// | Protocol name length     |
/// |                          |
/// +--------------------------+
/// | Protocol name ...        |
/// +--------------------------+
/// | Protocol level           |
/// +--------------------------+
/// | Connect flags            |
/// +--------------------------+
/// | Keep alive               |
/// |                          |
/// +--------------------------+
/// | Properties (5.0) ...     |
/// +--------------------------+
/// | Client id length         |
/// |                          |
/// +--------------------------+
/// | Client id ...            |
/// +--------------------------+
/// | Will props (5.0) ...     |
/// +--------------------------+
/// | Will topic length        |
/// |                          |
/// +--------------------------+
/// | Will topic ...           |
/// +--------------------------+
/// | Will message length      |
/// |                          |
/// +--------------------------+
/// | Will message ...         |
/// +--------------------------+
/// | Username length          |
/// |                          |
/// +--------------------------+
/// | Username ...             |
/// +--------------------------+
/// | Password length          |
/// |                          |
/// +--------------------------+
/// | Password ...             |
/// +--------------------------+
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    /// Protocol version as found in the variable header.
    level: ProtocolLevel,

    connect_flags: ConnectFlags,

    /// Time interval between two packets in seconds.
    ///
    /// If the Keep Alive value is non-zero and the Server does not receive
    /// a Control Packet from the Client within one and a half times the
    /// Keep Alive time period, it MUST disconnect the Network Connection to
    /// the Client as if the network had failed [MQTT-3.1.2-24]. A Keep Alive
    /// value of zero has the effect of turning off the keep alive mechanism.
    keep_alive: u16,

    properties: Properties,

    /// The Client Identifier MUST be present and MUST be the first field in
    /// the CONNECT packet payload [MQTT-3.1.3-3].
    ///
    /// A Server MAY allow a Client to supply a ClientId that has a length of
    /// zero bytes; the Server then assigns a unique ClientId to that Client.
    client_id: StringData,

    will_properties: Properties,
    will_topic: Option<PubTopic>,
    will_message: BinaryData,

    username: StringData,
    password: BinaryData,
}

impl ConnectPacket {
    /// Create a new connect packet with `client_id`.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id).map_err(|_| EncodeError::InvalidData)?;
        let client_id = StringData::from(client_id)?;
        Ok(Self {
            level: ProtocolLevel::V311,
            keep_alive: 60,
            client_id,
            ..Self::default()
        })
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
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    /// Update client id.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn set_client_id(&mut self, client_id: &str) -> Result<&mut Self, EncodeError> {
        validate_client_id(client_id).map_err(|_| EncodeError::InvalidData)?;
        self.client_id = StringData::from(client_id)?;
        Ok(self)
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.connect_flags.clean_session
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.connect_flags.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn has_will(&self) -> bool {
        self.connect_flags.will
    }

    #[must_use]
    pub const fn will_qos(&self) -> QoS {
        self.connect_flags.will_qos
    }

    #[must_use]
    pub const fn will_retain(&self) -> bool {
        self.connect_flags.will_retain
    }

    #[must_use]
    pub const fn will_topic(&self) -> Option<&PubTopic> {
        self.will_topic.as_ref()
    }

    #[must_use]
    pub fn will_message(&self) -> &[u8] {
        self.will_message.as_ref()
    }

    #[must_use]
    pub const fn will_properties(&self) -> &Properties {
        &self.will_properties
    }

    /// Set will message fields.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid or `message` is too large.
    pub fn set_will(
        &mut self,
        topic: &str,
        message: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<&mut Self, EncodeError> {
        self.will_topic = Some(PubTopic::new(topic)?);
        self.will_message = BinaryData::from_slice(message)?;
        self.connect_flags.will = true;
        self.connect_flags.will_qos = qos;
        self.connect_flags.will_retain = retain;
        Ok(self)
    }

    #[must_use]
    pub const fn has_username(&self) -> bool {
        self.connect_flags.username
    }

    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_ref()
    }

    /// Update username.
    ///
    /// # Errors
    ///
    /// Returns error if `username` is invalid.
    pub fn set_username(&mut self, username: &str) -> Result<&mut Self, EncodeError> {
        self.username = StringData::from(username)?;
        self.connect_flags.username = !username.is_empty();
        Ok(self)
    }

    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.connect_flags.password
    }

    #[must_use]
    pub fn password(&self) -> &[u8] {
        self.password.as_ref()
    }

    /// Update password.
    ///
    /// # Errors
    ///
    /// Returns error if `password` is too large.
    pub fn set_password(&mut self, password: &[u8]) -> Result<&mut Self, EncodeError> {
        self.password = BinaryData::from_slice(password)?;
        self.connect_flags.password = !password.is_empty();
        Ok(self)
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn will_properties_mut(&mut self) -> &mut Properties {
        &mut self.will_properties
    }

    const fn protocol_name(&self) -> &'static str {
        match self.level {
            ProtocolLevel::V31 => PROTOCOL_NAME_V31,
            ProtocolLevel::V311 | ProtocolLevel::V5 => PROTOCOL_NAME,
        }
    }

    fn remaining_length(&self) -> usize {
        let mut remaining_length = 2
            + self.protocol_name().len()
            + ProtocolLevel::bytes()
            + 1 // connect flags
            + 2 // keep alive
            + self.client_id.bytes();
        if self.level == ProtocolLevel::V5 {
            remaining_length += self.properties.bytes();
        }
        if self.connect_flags.will {
            if self.level == ProtocolLevel::V5 {
                remaining_length += self.will_properties.bytes();
            }
            if let Some(will_topic) = &self.will_topic {
                remaining_length += will_topic.bytes();
            }
            remaining_length += self.will_message.bytes();
        }
        if self.connect_flags.username {
            remaining_length += self.username.bytes();
        }
        if self.connect_flags.password {
            remaining_length += self.password.bytes();
        }
        remaining_length
    }

    #[allow(clippy::too_many_lines)]
    pub(crate) fn decode_body(
        _fixed_header: &FixedHeader,
        ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        let protocol_name = StringData::decode(ba)?;
        if protocol_name.as_ref() != PROTOCOL_NAME && protocol_name.as_ref() != PROTOCOL_NAME_V31 {
            log::error!("ConnectPacket: Invalid protocol name: {protocol_name}");
            return Err(DecodeError::InvalidProtocolName);
        }

        // The protocol level in the variable header overrides whatever the
        // caller assumed; before CONNECT no level has been agreed yet.
        let level = ProtocolLevel::try_from(ba.read_byte()?)?;

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = ba.read_u16()?;

        let properties = if level == ProtocolLevel::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(err) = check_property_type_list(properties.props(), CONNECT_PROPERTIES) {
                log::error!("ConnectPacket: Invalid property: {err:?}");
                return Err(err.into());
            }
            properties
        } else {
            Properties::new()
        };

        let client_id = StringData::decode(ba)?;
        validate_client_id(client_id.as_ref()).map_err(|_| DecodeError::InvalidClientId)?;

        let mut will_properties = Properties::new();
        let mut will_topic = None;
        let mut will_message = BinaryData::new();
        if connect_flags.will {
            if level == ProtocolLevel::V5 {
                will_properties = Properties::decode(ba)?;
                if let Err(err) = check_property_type_list(will_properties.props(), WILL_PROPERTIES)
                {
                    log::error!("ConnectPacket: Invalid will property: {err:?}");
                    return Err(err.into());
                }
            }
            will_topic = Some(PubTopic::decode(ba)?);
            will_message = BinaryData::decode(ba)?;
        }

        let username = if connect_flags.username {
            StringData::decode(ba)?
        } else {
            StringData::new()
        };

        let password = if connect_flags.password {
            BinaryData::decode(ba)?
        } else {
            BinaryData::new()
        };

        Ok(Self {
            level,
            connect_flags,
            keep_alive,
            properties,
            client_id,
            will_properties,
            will_topic,
            will_message,
            username,
            password,
        })
    }

    /// Decode one full connect packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();

        let fixed_header = FixedHeader::new(
            PacketType::Connect,
            self.remaining_length(),
            self.level,
        )
        .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)?;

        let name = self.protocol_name();
        #[allow(clippy::cast_possible_truncation)]
        buf.write_u16::<BigEndian>(name.len() as u16)?;
        buf.extend_from_slice(name.as_bytes());
        self.level.encode(buf)?;
        self.connect_flags.encode(buf);
        buf.write_u16::<BigEndian>(self.keep_alive)?;

        if self.level == ProtocolLevel::V5 {
            self.properties.encode(buf)?;
        }

        self.client_id.encode(buf)?;

        if self.connect_flags.will {
            if self.level == ProtocolLevel::V5 {
                self.will_properties.encode(buf)?;
            }
            if let Some(will_topic) = &self.will_topic {
                will_topic.encode(buf)?;
            }
            self.will_message.encode(buf)?;
        }

        if self.connect_flags.username {
            self.username.encode(buf)?;
        }
        if self.connect_flags.password {
            self.password.encode(buf)?;
        }

        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Property, U32Data};

    #[test]
    fn test_round_trip_v311() {
        let mut packet = ConnectPacket::new("weir-client-1").unwrap();
        packet.set_clean_session(true);
        packet.set_keep_alive(30);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // Protocol name bytes of 3.1.1 and 5.0.
        assert_eq!(&buf[2..8], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);
        assert_eq!(buf[8], 4);

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.clean_session());
    }

    #[test]
    fn test_round_trip_v5_with_will() {
        let mut packet = ConnectPacket::new("weir-client-2").unwrap();
        packet.set_level(ProtocolLevel::V5);
        packet
            .set_will("lwt", b"down", QoS::AtLeastOnce, false)
            .unwrap();
        packet
            .will_properties_mut()
            .push(Property::WillDelayInterval(U32Data::new(5)))
            .unwrap();
        packet.set_username("user").unwrap();
        packet.set_password(b"pass").unwrap();

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.level(), ProtocolLevel::V5);
        assert_eq!(decoded.will_properties().will_delay_interval(), Some(5));
    }

    #[test]
    fn test_reserved_flag_rejected() {
        let mut packet_buf = Vec::new();
        ConnectPacket::new("c").unwrap().encode(&mut packet_buf).unwrap();
        // Flip the reserved bit inside connect flags. The payload is the
        // three byte client id field, preceded by two keep alive bytes.
        let flags_offset = packet_buf.len() - 6;
        packet_buf[flags_offset] |= 0b0000_0001;

        let mut ba = ByteArray::new(&packet_buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::InvalidConnectFlags)
        );
    }

    #[test]
    fn test_will_qos_without_will_flag_rejected() {
        let mut packet_buf = Vec::new();
        ConnectPacket::new("c").unwrap().encode(&mut packet_buf).unwrap();
        let flags_offset = packet_buf.len() - 6;
        packet_buf[flags_offset] |= 0b0000_1000;

        let mut ba = ByteArray::new(&packet_buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::InvalidConnectFlags)
        );
    }

    #[test]
    fn test_bad_protocol_name_rejected() {
        let buf = [
            0x10, 0x0e, 0x00, 0x04, b'M', b'Q', b'T', b'S', 0x04, 0x02, 0x00, 0x3c, 0x00, 0x02,
            b'i', b'd',
        ];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba, ProtocolLevel::V311),
            Err(DecodeError::InvalidProtocolName)
        );
    }
}

// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Property lists as used by MQTT 5.0 packets.
//!
//! Every property is identified by a single byte tag; its value type depends
//! on the tag. Each packet type accepts a specific subset of tags, declared
//! as a whitelist const next to the packet struct and enforced by
//! [`check_property_type_list`], which also implements the shared rule that
//! a single-valued property must not appear twice.

use std::convert::TryFrom;

use crate::{
    BinaryData, BoolData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket,
    PubTopic, QoS, StringData, StringPairData, U16Data, U32Data, VarInt,
};

/// Properties which are allowed to appear more than once in one list.
pub const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    /// Property is not allowed in this packet type.
    NotAllowed(PropertyType),

    /// A single-valued property appears more than once.
    Duplicated(PropertyType),
}

impl From<PropertyError> for DecodeError {
    fn from(e: PropertyError) -> Self {
        match e {
            PropertyError::NotAllowed(_) => Self::InvalidPropertyType,
            PropertyError::Duplicated(_) => Self::DuplicatedProperty,
        }
    }
}

/// Check that every property in `properties` is allowed by `types` and that
/// single-valued properties occur at most once.
///
/// # Errors
///
/// Returns error with the offending property type.
pub fn check_property_type_list(
    properties: &[Property],
    types: &[PropertyType],
) -> Result<(), PropertyError> {
    if properties.is_empty() {
        return Ok(());
    }

    for property in properties {
        if !types.contains(&property.property_type()) {
            return Err(PropertyError::NotAllowed(property.property_type()));
        }
    }

    for property_type in types {
        let count = properties
            .iter()
            .filter(|p| p.property_type() == *property_type)
            .count();
        if count > 1 && !MULTIPLE_PROPERTIES.contains(property_type) {
            return Err(PropertyError::Duplicated(*property_type));
        }
    }

    Ok(())
}

#[allow(clippy::module_name_repetitions)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// One tagged property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Byte, 0 or 1. Used in PUBLISH, Will Properties.
    ///
    /// Value 1 indicates that the payload is UTF-8 Encoded Character Data.
    PayloadFormatIndicator(BoolData),

    /// Four Byte Integer, lifetime of the message in seconds.
    /// Used in PUBLISH, Will Properties.
    MessageExpiryInterval(U32Data),

    /// UTF-8 Encoded String describing the content of the message.
    /// Used in PUBLISH, Will Properties.
    ContentType(StringData),

    /// Topic Name for a response message.
    /// Used in PUBLISH, Will Properties.
    ResponseTopic(PubTopic),

    /// Binary Data used by the sender of a Request Message to identify which
    /// request the Response Message is for.
    /// Used in PUBLISH, Will Properties.
    CorrelationData(BinaryData),

    /// Variable Byte Integer identifying a subscription, 1 to 268,435,455.
    ///
    /// It is a Protocol Error if the Subscription Identifier has a value of 0.
    /// Used in PUBLISH (repeatable), SUBSCRIBE.
    SubscriptionIdentifier(VarInt),

    /// Four Byte Integer, Session Expiry Interval in seconds.
    ///
    /// If absent the value 0 is used: the Session ends when the Network
    /// Connection is closed. 0xFFFFFFFF means the Session does not expire.
    /// Used in CONNECT, CONNACK, DISCONNECT.
    SessionExpiryInterval(U32Data),

    /// The Client Identifier which was assigned by the Server because a zero
    /// length Client Identifier was found in the CONNECT packet.
    /// Used in CONNACK.
    AssignedClientIdentifier(StringData),

    /// Two Byte Integer, Keep Alive time assigned by the Server. If present,
    /// the Client MUST use this value instead of the value it sent on
    /// CONNECT [MQTT-3.2.2-21]. Used in CONNACK.
    ServerKeepAlive(U16Data),

    /// Name of the authentication method used for extended authentication.
    /// Used in CONNECT, CONNACK, AUTH.
    AuthenticationMethod(StringData),

    /// Binary Data, contents defined by the authentication method.
    /// Used in CONNECT, CONNACK, AUTH.
    AuthenticationData(BinaryData),

    /// Byte, 0 or 1. The Client uses this value to indicate whether Reason
    /// String or User Properties are sent in the case of failures.
    /// Used in CONNECT.
    RequestProblemInformation(BoolData),

    /// Four Byte Integer, Will Delay Interval in seconds.
    ///
    /// The Server delays publishing the Will Message until the interval has
    /// passed or the Session ends, whichever happens first. If a new Network
    /// Connection to this Session is made before the interval has passed,
    /// the Server MUST NOT send the Will Message [MQTT-3.1.3-9].
    /// Used in Will Properties.
    WillDelayInterval(U32Data),

    /// Byte, 0 or 1. A value of 0 indicates that the Server MUST NOT return
    /// Response Information [MQTT-3.1.2-28]. Used in CONNECT.
    RequestResponseInformation(BoolData),

    /// UTF-8 Encoded String used as the basis for creating a Response Topic.
    /// Used in CONNACK.
    ResponseInformation(StringData),

    /// UTF-8 Encoded String identifying another Server for the Client to use.
    /// Used in CONNACK, DISCONNECT.
    ServerReference(StringData),

    /// Human readable reason string for diagnostics, SHOULD NOT be parsed
    /// by the receiver. Used in every acknowledgement packet.
    ReasonString(StringData),

    /// Two Byte Integer, the number of QoS 1 and QoS 2 publications the
    /// sender is willing to process concurrently. It is a Protocol Error
    /// for the value to be 0. Used in CONNECT, CONNACK.
    ReceiveMaximum(U16Data),

    /// Two Byte Integer, the highest value the sender will accept as
    /// a Topic Alias. Used in CONNECT, CONNACK.
    TopicAliasMaximum(U16Data),

    /// Two Byte Integer, an integer identifying the topic instead of the
    /// Topic Name. It is a Protocol Error for the value to be 0.
    /// Used in PUBLISH.
    TopicAlias(U16Data),

    /// Byte, 0 or 1, the highest QoS the Server supports.
    /// Used in CONNACK.
    MaximumQoS(QoS),

    /// Byte, 0 or 1, whether the Server supports retained messages.
    /// Used in CONNACK.
    RetainAvailable(BoolData),

    /// UTF-8 String Pair, may appear multiple times; the order of properties
    /// with the same name must be preserved. Used in every packet which
    /// carries properties.
    UserProperty(StringPairData),

    /// Four Byte Integer, the maximum packet size the sender is willing to
    /// accept. It is a Protocol Error for the value to be 0.
    /// Used in CONNECT, CONNACK.
    MaximumPacketSize(U32Data),

    /// Byte, 0 or 1, whether the Server supports Wildcard Subscriptions.
    /// Used in CONNACK.
    WildcardSubscriptionAvailable(BoolData),

    /// Byte, 0 or 1, whether the Server supports Subscription Identifiers.
    /// Used in CONNACK.
    SubscriptionIdentifierAvailable(BoolData),

    /// Byte, 0 or 1, whether the Server supports Shared Subscriptions.
    /// Used in CONNACK.
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    /// Get type of the property.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Get byte length used in packets, including the identifier byte.
    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::AssignedClientIdentifier(value) => value.bytes(),
            Self::AuthenticationData(value) => value.bytes(),
            Self::AuthenticationMethod(value) => value.bytes(),
            Self::ContentType(value) => value.bytes(),
            Self::CorrelationData(value) => value.bytes(),
            Self::MaximumPacketSize(..) => U32Data::bytes(),
            Self::MaximumQoS(..) => QoS::bytes(),
            Self::MessageExpiryInterval(..) => U32Data::bytes(),
            Self::PayloadFormatIndicator(..) => BoolData::bytes(),
            Self::ReasonString(value) => value.bytes(),
            Self::ReceiveMaximum(..) => U16Data::bytes(),
            Self::RequestProblemInformation(..) => BoolData::bytes(),
            Self::RequestResponseInformation(..) => BoolData::bytes(),
            Self::ResponseInformation(value) => value.bytes(),
            Self::ResponseTopic(value) => value.bytes(),
            Self::RetainAvailable(..) => BoolData::bytes(),
            Self::ServerKeepAlive(..) => U16Data::bytes(),
            Self::ServerReference(value) => value.bytes(),
            Self::SessionExpiryInterval(..) => U32Data::bytes(),
            Self::SharedSubscriptionAvailable(..) => BoolData::bytes(),
            Self::SubscriptionIdentifier(value) => value.bytes(),
            Self::SubscriptionIdentifierAvailable(..) => BoolData::bytes(),
            Self::TopicAlias(..) => U16Data::bytes(),
            Self::TopicAliasMaximum(..) => U16Data::bytes(),
            Self::UserProperty(value) => value.bytes(),
            Self::WildcardSubscriptionAvailable(..) => BoolData::bytes(),
            Self::WillDelayInterval(..) => U32Data::bytes(),
        };

        PropertyType::bytes() + value_bytes
    }
}

impl DecodePacket for Property {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type_byte = ba.read_byte()?;
        let property_type = PropertyType::try_from(property_type_byte)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                let on = BoolData::decode(ba)?;
                Ok(Self::PayloadFormatIndicator(on))
            }
            PropertyType::MessageExpiryInterval => {
                let interval = U32Data::decode(ba)?;
                Ok(Self::MessageExpiryInterval(interval))
            }
            PropertyType::ContentType => {
                let content_type = StringData::decode(ba)?;
                Ok(Self::ContentType(content_type))
            }
            PropertyType::ResponseTopic => {
                let topic = PubTopic::decode(ba)?;
                Ok(Self::ResponseTopic(topic))
            }
            PropertyType::CorrelationData => {
                let data = BinaryData::decode(ba)?;
                Ok(Self::CorrelationData(data))
            }
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                if id.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
            PropertyType::SessionExpiryInterval => {
                let interval = U32Data::decode(ba)?;
                Ok(Self::SessionExpiryInterval(interval))
            }
            PropertyType::AssignedClientIdentifier => {
                let client_id = StringData::decode(ba)?;
                Ok(Self::AssignedClientIdentifier(client_id))
            }
            PropertyType::ServerKeepAlive => {
                let keep_alive = U16Data::decode(ba)?;
                Ok(Self::ServerKeepAlive(keep_alive))
            }
            PropertyType::AuthenticationMethod => {
                let method = StringData::decode(ba)?;
                Ok(Self::AuthenticationMethod(method))
            }
            PropertyType::AuthenticationData => {
                let data = BinaryData::decode(ba)?;
                Ok(Self::AuthenticationData(data))
            }
            PropertyType::RequestProblemInformation => {
                let on = BoolData::decode(ba)?;
                Ok(Self::RequestProblemInformation(on))
            }
            PropertyType::WillDelayInterval => {
                let interval = U32Data::decode(ba)?;
                Ok(Self::WillDelayInterval(interval))
            }
            PropertyType::RequestResponseInformation => {
                let on = BoolData::decode(ba)?;
                Ok(Self::RequestResponseInformation(on))
            }
            PropertyType::ResponseInformation => {
                let info = StringData::decode(ba)?;
                Ok(Self::ResponseInformation(info))
            }
            PropertyType::ServerReference => {
                let reference = StringData::decode(ba)?;
                Ok(Self::ServerReference(reference))
            }
            PropertyType::ReasonString => {
                let reason = StringData::decode(ba)?;
                Ok(Self::ReasonString(reason))
            }
            PropertyType::ReceiveMaximum => {
                let max = U16Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(max))
            }
            PropertyType::TopicAliasMaximum => {
                let max = U16Data::decode(ba)?;
                Ok(Self::TopicAliasMaximum(max))
            }
            PropertyType::TopicAlias => {
                let alias = U16Data::decode(ba)?;
                if alias.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::TopicAlias(alias))
            }
            PropertyType::MaximumQoS => {
                let qos = QoS::decode(ba)?;
                if qos == QoS::ExactOnce {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::RetainAvailable(available))
            }
            PropertyType::UserProperty => {
                let pair = StringPairData::decode(ba)?;
                Ok(Self::UserProperty(pair))
            }
            PropertyType::MaximumPacketSize => {
                let max = U32Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(max))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::WildcardSubscriptionAvailable(available))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::SubscriptionIdentifierAvailable(available))
            }
            PropertyType::SharedSubscriptionAvailable => {
                let available = BoolData::decode(ba)?;
                Ok(Self::SharedSubscriptionAvailable(available))
            }
        }
    }
}

impl EncodePacket for Property {
    #[allow(clippy::match_same_arms)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.property_type() as u8);
        let value_bytes = match self {
            Self::AssignedClientIdentifier(client_id) => client_id.encode(buf)?,
            Self::AuthenticationData(data) => data.encode(buf)?,
            Self::AuthenticationMethod(method) => method.encode(buf)?,
            Self::ContentType(content_type) => content_type.encode(buf)?,
            Self::CorrelationData(data) => data.encode(buf)?,
            Self::MaximumPacketSize(max) => max.encode(buf)?,
            Self::MaximumQoS(qos) => qos.encode(buf)?,
            Self::MessageExpiryInterval(interval) => interval.encode(buf)?,
            Self::PayloadFormatIndicator(on) => on.encode(buf)?,
            Self::ReasonString(reason) => reason.encode(buf)?,
            Self::ReceiveMaximum(max) => max.encode(buf)?,
            Self::RequestProblemInformation(on) => on.encode(buf)?,
            Self::RequestResponseInformation(on) => on.encode(buf)?,
            Self::ResponseInformation(info) => info.encode(buf)?,
            Self::ResponseTopic(topic) => topic.encode(buf)?,
            Self::RetainAvailable(available) => available.encode(buf)?,
            Self::ServerKeepAlive(keep_alive) => keep_alive.encode(buf)?,
            Self::ServerReference(reference) => reference.encode(buf)?,
            Self::SessionExpiryInterval(interval) => interval.encode(buf)?,
            Self::SharedSubscriptionAvailable(available) => available.encode(buf)?,
            Self::SubscriptionIdentifier(id) => id.encode(buf)?,
            Self::SubscriptionIdentifierAvailable(available) => available.encode(buf)?,
            Self::TopicAlias(alias) => alias.encode(buf)?,
            Self::TopicAliasMaximum(value) => value.encode(buf)?,
            Self::UserProperty(pair) => pair.encode(buf)?,
            Self::WildcardSubscriptionAvailable(available) => available.encode(buf)?,
            Self::WillDelayInterval(interval) => interval.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// A property list, wire encoded as a variable byte integer giving the byte
/// length of the entries, followed by the entries themselves.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl AsRef<[Property]> for Properties {
    fn as_ref(&self) -> &[Property] {
        self.0.as_ref()
    }
}

impl Properties {
    /// Create an empty property list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Get total byte length in packet, including the length prefix.
    ///
    /// # Panics
    ///
    /// Panics if properties are larger than 256MB, which cannot happen for
    /// lists built from decoded packets or through `push`.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let payload = self.payload_bytes();
        let len = VarInt::from(payload).unwrap();
        len.bytes() + payload
    }

    fn payload_bytes(&self) -> usize {
        self.0.iter().map(Property::bytes).sum()
    }

    /// Get number of properties in list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether property list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a reference to property list.
    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.0
    }

    /// Find the first property with `property_type`.
    #[must_use]
    pub fn find(&self, property_type: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == property_type)
    }

    /// Get session expiry interval value, if present.
    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        match self.find(PropertyType::SessionExpiryInterval) {
            Some(Property::SessionExpiryInterval(interval)) => Some(interval.value()),
            _ => None,
        }
    }

    /// Get receive maximum value, if present.
    #[must_use]
    pub fn receive_maximum(&self) -> Option<u16> {
        match self.find(PropertyType::ReceiveMaximum) {
            Some(Property::ReceiveMaximum(max)) => Some(max.value()),
            _ => None,
        }
    }

    /// Get will delay interval value, if present.
    #[must_use]
    pub fn will_delay_interval(&self) -> Option<u32> {
        match self.find(PropertyType::WillDelayInterval) {
            Some(Property::WillDelayInterval(interval)) => Some(interval.value()),
            _ => None,
        }
    }

    /// Push a property to the back of the list.
    ///
    /// # Errors
    ///
    /// Returns error if list would grow past the representable length.
    pub fn push(&mut self, v: Property) -> Result<(), EncodeError> {
        let mut len = VarInt::from(self.payload_bytes())?;
        len.add(v.bytes())?;
        self.0.push(v);
        Ok(())
    }

    /// Remove all properties with `property_type` from list.
    pub fn remove(&mut self, property_type: PropertyType) {
        self.0.retain(|p| p.property_type() != property_type);
    }

    /// Clear property list.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let byte_length = VarInt::decode(ba)?;
        let end_offset = ba.offset() + byte_length.value();
        let mut properties = Vec::new();
        while ba.offset() < end_offset {
            let property = Property::decode(ba)?;
            properties.push(property);
        }
        if ba.offset() != end_offset {
            return Err(DecodeError::InvalidRemainingLength);
        }

        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let len = VarInt::from(self.payload_bytes())?;
        let mut bytes_written = len.encode(buf)?;
        for property in &self.0 {
            bytes_written += property.encode(buf)?;
        }

        Ok(bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut properties = Properties::new();
        properties
            .push(Property::SessionExpiryInterval(U32Data::new(120)))
            .unwrap();
        properties
            .push(Property::ReceiveMaximum(U16Data::new(32)))
            .unwrap();
        properties
            .push(Property::UserProperty(
                StringPairData::new("region", "eu-1").unwrap(),
            ))
            .unwrap();

        let mut buf = Vec::new();
        let written = properties.encode(&mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(written, properties.bytes());

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, properties);
    }

    #[test]
    fn test_length_prefix_is_byte_length() {
        let mut properties = Properties::new();
        properties
            .push(Property::SessionExpiryInterval(U32Data::new(10)))
            .unwrap();
        let mut buf = Vec::new();
        properties.encode(&mut buf).unwrap();
        // 1 byte tag + 4 byte value.
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn test_duplicate_check() {
        let properties = [
            Property::ReceiveMaximum(U16Data::new(10)),
            Property::ReceiveMaximum(U16Data::new(20)),
        ];
        assert_eq!(
            check_property_type_list(&properties, &[PropertyType::ReceiveMaximum]),
            Err(PropertyError::Duplicated(PropertyType::ReceiveMaximum))
        );
    }

    #[test]
    fn test_not_allowed_check() {
        let properties = [Property::TopicAlias(U16Data::new(3))];
        assert_eq!(
            check_property_type_list(&properties, &[PropertyType::ReceiveMaximum]),
            Err(PropertyError::NotAllowed(PropertyType::TopicAlias))
        );
    }

    #[test]
    fn test_decode_rejects_zero_receive_maximum() {
        let buf = [0x03, 0x21, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba),
            Err(DecodeError::InvalidPropertyValue)
        );
    }

    #[test]
    fn test_repeated_user_property_order_kept() {
        let mut properties = Properties::new();
        properties
            .push(Property::UserProperty(
                StringPairData::new("k", "first").unwrap(),
            ))
            .unwrap();
        properties
            .push(Property::UserProperty(
                StringPairData::new("k", "second").unwrap(),
            ))
            .unwrap();

        let mut buf = Vec::new();
        properties.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, properties);
    }
}

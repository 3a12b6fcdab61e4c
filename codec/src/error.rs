// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::io;

use crate::byte_array::ByteArrayError;
use crate::topic::TopicError;
use crate::utils::StringError;
use crate::var_int::VarIntError;

/// Errors returned while parsing a byte stream into control packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not enough bytes left in buffer.
    OutOfRange,

    /// Packet type nibble is unknown.
    InvalidPacketType,

    /// Flag nibble does not match the value reserved for this packet type.
    InvalidPacketFlags,

    /// QoS is not 0, 1 or 2.
    InvalidQoS,

    /// Remaining length disagrees with the bytes actually present.
    InvalidRemainingLength,

    /// Variable byte integer is longer than four bytes.
    InvalidVarInt,

    /// Packet exceeds the maximum representable length.
    PacketTooLarge,

    /// Invalid UTF-8 string, or string contains forbidden code points.
    InvalidString,

    /// Byte field must be either 0 or 1.
    InvalidBoolData,

    /// Protocol name must be "MQTT".
    InvalidProtocolName,

    /// Protocol level is not 3.1, 3.1.1 or 5.0.
    InvalidProtocolLevel,

    /// Reserved bit in connect flags is set, or will flags are inconsistent.
    InvalidConnectFlags,

    /// ClientId contains invalid characters or exceeds length limits.
    InvalidClientId,

    /// Packet identifier must not be zero.
    InvalidPacketId,

    /// Topic name or topic filter violates the rules in protocol chapter 4.7.
    InvalidTopic,

    /// Subscribe packet must carry at least one topic filter.
    EmptyTopicFilter,

    /// Reserved bits in subscription options byte are non-zero,
    /// or retain handling is 3.
    InvalidSubscribeOptions,

    /// Property identifier is unknown or not allowed in this packet.
    InvalidPropertyType,

    /// Property value is out of its allowed range.
    InvalidPropertyValue,

    /// A single-valued property appears more than once.
    DuplicatedProperty,

    /// Reason code byte is not in the reason code table.
    InvalidReasonCode,
}

/// Errors returned while serializing control packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    InvalidData,

    /// Length of data exceeds its limitation.
    TooManyData,

    /// Accumulated packet length cannot be represented as a variable byte integer.
    InvalidVarInt,

    /// Packet field combination is invalid, like dup flag set on a QoS 0 publish.
    InvalidPacketType,

    IoError,
}

impl From<ByteArrayError> for DecodeError {
    fn from(e: ByteArrayError) -> Self {
        match e {
            ByteArrayError::OutOfRange => Self::OutOfRange,
            ByteArrayError::InvalidString(_) => Self::InvalidString,
        }
    }
}

impl From<StringError> for DecodeError {
    fn from(_e: StringError) -> Self {
        Self::InvalidString
    }
}

impl From<TopicError> for DecodeError {
    fn from(_e: TopicError) -> Self {
        Self::InvalidTopic
    }
}

impl From<VarIntError> for DecodeError {
    fn from(_e: VarIntError) -> Self {
        Self::InvalidVarInt
    }
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(_e: std::string::FromUtf8Error) -> Self {
        Self::InvalidString
    }
}

impl From<StringError> for EncodeError {
    fn from(e: StringError) -> Self {
        match e {
            StringError::TooManyData => Self::TooManyData,
            StringError::InvalidChar | StringError::InvalidLength => Self::InvalidData,
        }
    }
}

impl From<TopicError> for EncodeError {
    fn from(_e: TopicError) -> Self {
        Self::InvalidData
    }
}

impl From<VarIntError> for EncodeError {
    fn from(_e: VarIntError) -> Self {
        Self::InvalidVarInt
    }
}

impl From<io::Error> for EncodeError {
    fn from(_e: io::Error) -> Self {
        Self::IoError
    }
}

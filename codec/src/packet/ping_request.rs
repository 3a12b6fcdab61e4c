// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, DecodeError, EncodeError, EncodePacket, FixedHeader, PacketType, ProtocolLevel,
};

/// The PINGREQ packet is sent from a Client to the Server.
///
/// It is used to indicate to the Server that the Client is alive in the
/// absence of any other packets being sent, and to request that the Server
/// responds to confirm that it is alive. This packet has no variable header
/// and no payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PingRequestPacket {
    level: ProtocolLevel,
}

impl PingRequestPacket {
    #[must_use]
    pub const fn new(level: ProtocolLevel) -> Self {
        Self { level }
    }

    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

    /// Decode the remaining bytes of a ping request packet.
    ///
    /// # Errors
    ///
    /// Returns error if remaining length is not zero.
    pub(crate) fn decode_body(
        fixed_header: &FixedHeader,
        _ba: &mut ByteArray,
    ) -> Result<Self, DecodeError> {
        if fixed_header.remaining_length() != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Self {
            level: fixed_header.level(),
        })
    }

    /// Decode one full ping request packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for PingRequestPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader::new(PacketType::PingRequest, 0, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = PingRequestPacket::new(ProtocolLevel::V311);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xc0, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = PingRequestPacket::decode(&mut ba, ProtocolLevel::V311).unwrap();
        assert_eq!(decoded, packet);
    }
}

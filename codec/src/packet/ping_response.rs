// Copyright (c) 2024 Weir Authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, DecodeError, EncodeError, EncodePacket, FixedHeader, PacketType, ProtocolLevel,
};

/// A PINGRESP packet is sent by the Server to the Client in response to
/// a PINGREQ packet. It indicates that the Server is alive.
///
/// This packet has no variable header and no payload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PingResponsePacket {
    level: ProtocolLevel,
}

impl PingResponsePacket {
    #[must_use]
    pub const fn new(level: ProtocolLevel) -> Self {
        Self { level }
    }

    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

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

    /// Decode one full ping response packet.
    ///
    /// # Errors
    ///
    /// Returns error if byte stream is malformed.
    pub fn decode(ba: &mut ByteArray, level: ProtocolLevel) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba, level)?;
        Self::decode_body(&fixed_header, ba)
    }
}

impl EncodePacket for PingResponsePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader::new(PacketType::PingResponse, 0, self.level)
            .map_err(|_| EncodeError::InvalidVarInt)?;
        fixed_header.encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let packet = PingResponsePacket::new(ProtocolLevel::V5);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(&buf, &[0xd0, 0x00]);

        let mut ba = ByteArray::new(&buf);
        let decoded = PingResponsePacket::decode(&mut ba, ProtocolLevel::V5).unwrap();
        assert_eq!(decoded, packet);
    }
}

//! Packet Codec: framing of peer-to-peer wire packets.
//!
//! Fixed 7-byte header, big-endian, no alignment padding. The payload
//! carries either a raw Noise handshake message or an AEAD
//! ciphertext-with-tag; the codec itself is agnostic to which.

use crate::error::CodecError;

/// Size of the fixed packet header in bytes.
pub const PACKET_HEADER_SIZE: usize = 7;

/// Packet types as defined on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// First Noise IK handshake message, sent by the initiator.
    HandshakeInit = 0x01,
    /// Second Noise IK handshake message, sent by the responder.
    HandshakeResp = 0x02,
    /// AEAD-encrypted application payload.
    Data = 0x03,
    /// Reserved for a future delivery acknowledgement. Ignored if received,
    /// never emitted.
    Ack = 0x04,
}

impl TryFrom<u8> for PacketType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::HandshakeInit),
            0x02 => Ok(Self::HandshakeResp),
            0x03 => Ok(Self::Data),
            0x04 => Ok(Self::Ack),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }
}

/// A decoded wire packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The packet's type tag.
    pub packet_type: PacketType,
    /// Opaque session tag chosen by the initiator.
    pub connection_id: u32,
    /// Logical channel; unused (zero) for `HandshakeInit`, `HandshakeResp`,
    /// and `Ack`.
    pub stream_id: u16,
    /// Handshake message bytes, or AEAD ciphertext-with-tag.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Construct a new packet.
    #[must_use]
    pub fn new(packet_type: PacketType, connection_id: u32, stream_id: u16, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            connection_id,
            stream_id,
            payload,
        }
    }

    /// Encode into a wire buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + self.payload.len());
        buf.push(self.packet_type as u8);
        buf.extend_from_slice(&self.connection_id.to_be_bytes());
        buf.extend_from_slice(&self.stream_id.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode from a wire buffer.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::MalformedPacket` if `data` is shorter than
    /// [`PACKET_HEADER_SIZE`]. Returns `CodecError::UnknownPacketType` if
    /// the `type` byte is not one of the four recognized values.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(CodecError::MalformedPacket);
        }

        let packet_type = PacketType::try_from(data[0])?;
        let connection_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        let stream_id = u16::from_be_bytes([data[5], data[6]]);
        let payload = data[PACKET_HEADER_SIZE..].to_vec();

        Ok(Self {
            packet_type,
            connection_id,
            stream_id,
            payload,
        })
    }
}

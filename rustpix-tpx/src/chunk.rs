//! Chunk and packet-id header words.
//!
//! A chunk begins with a header word carrying the `"TPX3"` magic, the
//! originating chip index, and the payload length in bytes. Server
//! protocol versions >= 3.20 insert an extra 8-byte packet-id word
//! between chunk headers, letting the reader detect gaps in the stream.

use crate::decoder::{bits, CHUNK_HEADER_MAGIC, PACKET_ID_BYTE};
use crate::{Error, Result};

/// A decoded chunk-header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chip that produced this chunk.
    pub chip_id: u8,
    /// Payload length in bytes; always a multiple of 8.
    pub chunk_size: u16,
}

impl ChunkHeader {
    /// Parses a chunk-header word.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedWord`] if `d` does not carry the `"TPX3"`
    /// magic, and [`Error::MisalignedChunk`] if the payload length is not
    /// a multiple of 8 bytes.
    pub fn parse(d: u64) -> Result<Self> {
        if (d as u32 & 0xFFFF_FFFF) != CHUNK_HEADER_MAGIC {
            return Err(Error::UnexpectedWord(d));
        }
        let chip_id = bits(d, 39, 32) as u8;
        let chunk_size = bits(d, 63, 48) as u16;
        if chunk_size % 8 != 0 {
            return Err(Error::MisalignedChunk(chunk_size));
        }
        Ok(Self {
            chip_id,
            chunk_size,
        })
    }

    /// Number of 8-byte event words carried by the chunk payload.
    #[inline]
    #[must_use]
    pub const fn word_count(self) -> usize {
        (self.chunk_size as usize) / 8
    }
}

/// A decoded packet-id word (server protocol >= 3.20).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PacketId(pub u64);

impl PacketId {
    /// Parses a packet-id word.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedWord`] if `d`'s high byte is not `0x50`.
    pub fn parse(d: u64) -> Result<Self> {
        if bits(d, 63, 56) as u8 != PACKET_ID_BYTE {
            return Err(Error::UnexpectedWord(d));
        }
        Ok(Self(bits(d, 47, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(chip_id: u8, chunk_size: u16) -> u64 {
        u64::from(CHUNK_HEADER_MAGIC) | (u64::from(chip_id) << 32) | (u64::from(chunk_size) << 48)
    }

    #[test]
    fn parses_chip_id_and_size() {
        let h = ChunkHeader::parse(make_header(2, 64)).unwrap();
        assert_eq!(h.chip_id, 2);
        assert_eq!(h.chunk_size, 64);
        assert_eq!(h.word_count(), 8);
    }

    #[test]
    fn rejects_misaligned_size() {
        assert!(ChunkHeader::parse(make_header(0, 5)).is_err());
    }

    #[test]
    fn rejects_non_magic_word() {
        assert!(ChunkHeader::parse(0xDEAD_BEEF_0000_0000).is_err());
    }

    #[test]
    fn packet_id_roundtrip() {
        let d = 0x5000_0000_0001_2345u64;
        let pid = PacketId::parse(d).unwrap();
        assert_eq!(pid.0, 0x0001_2345);
    }

    #[test]
    fn packet_id_rejects_wrong_byte() {
        assert!(PacketId::parse(0x6000_0000_0000_0000).is_err());
    }
}

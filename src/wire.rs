//! The RAT wire format: an 8-byte header followed by an optional payload.
//!
//! ```text
//!  0               1               2               3
//!  +-------+-------+-------+-------+-------+-------+-------+-------+
//!  |        stream_id (16)         |        seq_num (16)           |
//!  +-------+-------+-------+-------+-------+-------+-------+-------+
//!  |        length (16)            | flags (8)     | offset (8)    |
//!  +-------+-------+-------+-------+-------+-------+-------+-------+
//!  |                      payload (length bytes)                    |
//!  +---------------------------------------------------------------+
//! ```
//!
//! All multi-byte fields are big-endian. The codec here is pure: no I/O,
//! no socket state, total functions only.

use crate::error::Error;

/// Length in bytes of a RAT header, exclusive of payload.
pub const HEADER_LEN: usize = 8;

bitflags::bitflags! {
    /// Header flag bits, MSB-to-LSB: ACK, NACK, SWIN, RST, ALI, HLO, BYE, EXP.
    ///
    /// The original implementation represented this field as an 8-character
    /// string of `'0'`/`'1'` built up flag-by-flag; here it is a constant-time
    /// bitset instead, so `Flags::ACK | Flags::HLO == Flags::HLO | Flags::ACK`
    /// holds by construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        const ACK  = 0b1000_0000;
        const NACK = 0b0100_0000;
        const SWIN = 0b0010_0000;
        const RST  = 0b0001_0000;
        const ALI  = 0b0000_1000;
        const HLO  = 0b0000_0100;
        const BYE  = 0b0000_0010;
        const EXP  = 0b0000_0001;
    }
}

/// A decoded RAT segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub stream_id: u16,
    pub seq_num: u16,
    pub length: u16,
    pub flags: Flags,
    pub offset: u8,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&self.stream_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6] = self.flags.bits();
        buf[7] = self.offset;
        buf
    }

    /// Decodes a header from exactly `HEADER_LEN` bytes.
    ///
    /// Any slice whose length is not exactly 8 is rejected as malformed;
    /// this is total and never panics.
    pub fn decode(bytes: &[u8]) -> Result<Header, Error> {
        if bytes.len() != HEADER_LEN {
            return Err(Error::MalformedHeader("header must be exactly 8 bytes"));
        }

        Ok(Header {
            stream_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            seq_num: u16::from_be_bytes([bytes[2], bytes[3]]),
            length: u16::from_be_bytes([bytes[4], bytes[5]]),
            flags: Flags::from_bits_truncate(bytes[6]),
            offset: bytes[7],
        })
    }
}

/// Packs a list of 16-bit auxiliary words (NACK sequence numbers, or the
/// single SWIN window-size word) into a big-endian byte payload.
pub fn encode_aux_words(words: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(words.len() * 2);
    for w in words {
        buf.extend_from_slice(&w.to_be_bytes());
    }
    buf
}

/// Unpacks a byte payload into a list of 16-bit auxiliary words.
///
/// Rejects any payload whose length is not a multiple of 2 bytes
/// (`Error::MisalignedAuxiliary`), per spec.md invariant 3.
pub fn decode_aux_words(bytes: &[u8]) -> Result<Vec<u16>, Error> {
    if bytes.len() % 2 != 0 {
        return Err(Error::MisalignedAuxiliary(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_well_formed_header() {
        let h = Header {
            stream_id: 4242,
            seq_num: 7,
            length: 33,
            flags: Flags::ACK,
            offset: 0,
        };
        let encoded = h.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        assert_eq!(Header::decode(&encoded).unwrap(), h);
    }

    #[test]
    fn flag_set_packing_is_order_independent() {
        assert_eq!(Flags::HLO | Flags::ACK, Flags::ACK | Flags::HLO);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(Header::decode(&[0u8; 7]).is_err());
        assert!(Header::decode(&[0u8; 9]).is_err());
    }

    #[test]
    fn control_only_segment_has_zero_length() {
        let h = Header {
            stream_id: 1,
            seq_num: 0,
            length: 0,
            flags: Flags::HLO,
            offset: 0,
        };
        assert_eq!(h.encode()[4..6], 0u16.to_be_bytes());
    }

    #[test]
    fn aux_words_roundtrip_and_offset_matches_word_count() {
        let words = vec![3u16, 9, 100];
        let bytes = encode_aux_words(&words);
        assert_eq!(bytes.len(), words.len() * 2);
        assert_eq!(decode_aux_words(&bytes).unwrap(), words);
    }

    #[test]
    fn misaligned_aux_payload_is_rejected() {
        assert!(decode_aux_words(&[0u8; 3]).is_err());
    }
}

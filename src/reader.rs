//! Typed primitive reads over a packet-framed byte source.
//!
//! [`WireReader`] is the only thing in this crate that touches raw bytes
//! directly; every other component reads through it. It normalizes
//! endianness, narrows collation-encoded strings to UTF-8, and supports a
//! one-byte pushback so the dispatcher can peek a token marker before
//! committing to a parse path.

use crate::collation::encoding_for_lcid;
use crate::error::ProtocolError;
use crate::prelude::*;

/// A source of already-depacketized protocol bytes.
///
/// This crate does not implement packet framing (length headers, packet
/// ids, `END_OF_MESSAGE` flags) — that belongs to the transport layer. A
/// `ByteSource` implementation is expected to block until `buf` is filled
/// or the connection is gone, transparently stitching together TDS packets
/// as needed.
pub trait ByteSource {
    /// Fill `buf` completely or fail. A short read at end of stream must be
    /// reported as [`ProtocolError::UnexpectedEof`], not a partial success.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError>;
}

/// Typed wire reader wrapping a [`ByteSource`].
pub struct WireReader<R> {
    src: R,
    pushback: Option<u8>,
    /// `true` when decoded multi-byte scalars must be byte-swapped to
    /// match host order (the source is big-endian and the host is not, or
    /// vice versa).
    pub swap_bytes: bool,
    /// `true` to apply the legacy "broken MS DATETIME" workaround: some
    /// old TDS dialects swap the two 4-byte halves of DATETIME/MONEY
    /// independently rather than as one 8-byte unit.
    pub broken_money_endian: bool,
}

impl<R: ByteSource> WireReader<R> {
    /// Wrap a byte source with default (no-op) endian handling.
    pub fn new(src: R) -> Self {
        Self {
            src,
            pushback: None,
            swap_bytes: false,
            broken_money_endian: false,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut offset = 0;
        if let Some(b) = self.pushback.take() {
            buf[0] = b;
            offset = 1;
        }
        if offset < buf.len() {
            self.src.read_exact(&mut buf[offset..])?;
        }
        Ok(())
    }

    /// Read one byte.
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        let mut b = [0u8; 1];
        self.fill(&mut b)?;
        Ok(b[0])
    }

    /// Push a byte back so the next [`get_u8`](Self::get_u8) or
    /// [`peek_u8`](Self::peek_u8) returns it again. Only one byte of
    /// pushback is supported, matching the original `unget_byte` contract.
    pub fn unget_byte(&mut self, b: u8) {
        self.pushback = Some(b);
    }

    /// Read the next byte without consuming it.
    pub fn peek_u8(&mut self) -> Result<u8, ProtocolError> {
        let b = self.get_u8()?;
        self.unget_byte(b);
        Ok(b)
    }

    /// Read a little-endian `i16`, honoring [`swap_bytes`](Self::swap_bytes).
    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.get_u16()? as i16)
    }

    /// Read a little-endian `u16`, honoring [`swap_bytes`](Self::swap_bytes).
    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        let mut b = [0u8; 2];
        self.fill(&mut b)?;
        let v = u16::from_le_bytes(b);
        Ok(if self.swap_bytes { v.swap_bytes() } else { v })
    }

    /// Read a little-endian `i32`, honoring [`swap_bytes`](Self::swap_bytes).
    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.get_u32()? as i32)
    }

    /// Read a little-endian `u32`, honoring [`swap_bytes`](Self::swap_bytes).
    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut b = [0u8; 4];
        self.fill(&mut b)?;
        let v = u32::from_le_bytes(b);
        Ok(if self.swap_bytes { v.swap_bytes() } else { v })
    }

    /// Read a little-endian `i64`, honoring [`swap_bytes`](Self::swap_bytes).
    pub fn get_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.get_u64()? as i64)
    }

    /// Read a little-endian `u64`, honoring [`swap_bytes`](Self::swap_bytes).
    pub fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        let mut b = [0u8; 8];
        self.fill(&mut b)?;
        let v = u64::from_le_bytes(b);
        Ok(if self.swap_bytes { v.swap_bytes() } else { v })
    }

    /// Read an 8-byte value stored as two independently-swapped 4-byte
    /// halves (MONEY, legacy DATETIME) when
    /// [`broken_money_endian`](Self::broken_money_endian) is set; otherwise
    /// falls back to a single 8-byte swap.
    pub fn get_paired_half(&mut self) -> Result<[u8; 8], ProtocolError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        if self.swap_bytes {
            if self.broken_money_endian {
                buf[0..4].reverse();
                buf[4..8].reverse();
            } else {
                buf.reverse();
            }
        }
        Ok(buf)
    }

    /// Read exactly `n` raw bytes with no endian adjustment.
    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read `n` raw bytes into a fixed-size array.
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read a 1-byte-length-prefixed character string. `unicode` selects
    /// UTF-16LE decoding (TDS 7+); otherwise the bytes are narrowed through
    /// `encoding` if a non-default `lcid` is given, else treated as Latin-1.
    pub fn get_b_varchar(&mut self, unicode: bool, lcid: u32) -> Result<String, ProtocolError> {
        let len = self.get_u8()? as usize;
        self.get_char_data(len, unicode, lcid)
    }

    /// Read a 2-byte-length-prefixed character string (TDS 7+ `US_VARCHAR`
    /// shape, length measured in characters).
    pub fn get_us_varchar(&mut self, unicode: bool, lcid: u32) -> Result<String, ProtocolError> {
        let len = self.get_u16()? as usize;
        self.get_char_data(len, unicode, lcid)
    }

    /// Read `char_count` characters of string data.
    pub fn get_char_data(
        &mut self,
        char_count: usize,
        unicode: bool,
        lcid: u32,
    ) -> Result<String, ProtocolError> {
        if unicode {
            let bytes = self.get_bytes(char_count * 2)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| ProtocolError::StringEncoding(narrow_err(e)))
        } else {
            let bytes = self.get_bytes(char_count)?;
            self.narrow(&bytes, lcid)
        }
    }

    /// Narrow a single-byte-per-character buffer to UTF-8 using the
    /// collation's code page, falling back to Latin-1 when the `encoding`
    /// feature is disabled or the LCID is unrecognized.
    fn narrow(&self, bytes: &[u8], lcid: u32) -> Result<String, ProtocolError> {
        #[cfg(feature = "encoding")]
        {
            if let Some(enc) = encoding_for_lcid(lcid) {
                let (s, _, had_errors) = enc.decode(bytes);
                if had_errors {
                    return Err(ProtocolError::StringEncoding(narrow_msg(
                        "invalid bytes for collation code page",
                    )));
                }
                return Ok(s.into_owned());
            }
        }
        #[cfg(not(feature = "encoding"))]
        {
            let _ = lcid;
        }
        Ok(bytes.iter().map(|&b| b as char).collect())
    }
}

#[cfg(feature = "std")]
fn narrow_err(e: std::string::FromUtf16Error) -> String {
    format!("{e}")
}
#[cfg(not(feature = "std"))]
fn narrow_err(_e: alloc::string::FromUtf16Error) -> &'static str {
    "invalid UTF-16 sequence"
}

#[cfg(feature = "std")]
fn narrow_msg(s: &str) -> String {
    s.to_string()
}
#[cfg(not(feature = "std"))]
fn narrow_msg(s: &'static str) -> &'static str {
    s
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct SliceSource<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> ByteSource for SliceSource<'a> {
        fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
            if self.pos + buf.len() > self.data.len() {
                return Err(ProtocolError::UnexpectedEof);
            }
            buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
            self.pos += buf.len();
            Ok(())
        }
    }

    fn reader(data: &[u8]) -> WireReader<SliceSource<'_>> {
        WireReader::new(SliceSource { data, pos: 0 })
    }

    #[test]
    fn test_unget_byte_roundtrip() {
        let mut r = reader(&[0x01, 0x02]);
        let first = r.get_u8().unwrap();
        r.unget_byte(first);
        assert_eq!(r.get_u8().unwrap(), first);
        assert_eq!(r.get_u8().unwrap(), 0x02);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut r = reader(&[0xAA, 0xBB]);
        assert_eq!(r.peek_u8().unwrap(), 0xAA);
        assert_eq!(r.get_u8().unwrap(), 0xAA);
        assert_eq!(r.get_u8().unwrap(), 0xBB);
    }

    #[test]
    fn test_swap_bytes_u32() {
        let mut r = reader(&0x0102_0304u32.to_le_bytes());
        r.swap_bytes = true;
        assert_eq!(r.get_u32().unwrap(), 0x0403_0201);
    }

    #[test]
    fn test_paired_half_independent_swap() {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        let mut r = reader(&bytes);
        r.swap_bytes = true;
        r.broken_money_endian = true;
        let swapped = r.get_paired_half().unwrap();
        assert_eq!(u32::from_be_bytes(swapped[0..4].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(swapped[4..8].try_into().unwrap()), 2);
    }

    #[test]
    fn test_get_b_varchar_ascii() {
        let mut data = vec![5u8];
        data.extend_from_slice(b"hello");
        let mut r = reader(&data);
        assert_eq!(r.get_b_varchar(false, 0).unwrap(), "hello");
    }

    #[test]
    fn test_get_b_varchar_unicode() {
        let s = "hi";
        let mut data = vec![s.chars().count() as u8];
        for c in s.encode_utf16() {
            data.extend_from_slice(&c.to_le_bytes());
        }
        let mut r = reader(&data);
        assert_eq!(r.get_b_varchar(true, 0).unwrap(), "hi");
    }

    #[test]
    fn test_unexpected_eof() {
        let mut r = reader(&[0x01]);
        assert!(matches!(r.get_u32(), Err(ProtocolError::UnexpectedEof)));
    }
}

//! Low-level helpers for binary data processing.
//!
//! This module provides the primitives shared by every decoder:
//! - Endian-aware scalar reads (using byteorder for optimal codegen)
//! - SIMD-accelerated NUL searches (via memchr)
//! - Bounds-checked LEB128 decoding

use byteorder::{BigEndian, ByteOrder, LittleEndian};

// =============================================================================
// Endian-Aware Reads
// =============================================================================

/// Reads a u32 in the given byte order from the start of `data`.
///
/// Returns `None` if fewer than four bytes are available.
#[inline(always)]
pub fn read_u32(data: &[u8], big_endian: bool) -> Option<u32> {
    let bytes = data.get(..4)?;
    Some(if big_endian {
        BigEndian::read_u32(bytes)
    } else {
        LittleEndian::read_u32(bytes)
    })
}

// =============================================================================
// SIMD-Accelerated Byte Search
// =============================================================================

/// Finds the position of the first null byte in a slice.
///
/// Returns the slice length when no terminator is present.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Returns the bytes of a NUL-terminated string starting at `data[0]`.
///
/// The second element is true when a terminator was found.
#[inline]
pub fn c_str_bytes(data: &[u8]) -> (&[u8], bool) {
    match memchr::memchr(0, data) {
        Some(end) => (&data[..end], true),
        None => (data, false),
    }
}

/// Decodes a NUL-padded fixed-size name (segment and section names).
pub fn fixed_name(raw: &[u8]) -> &str {
    let end = memchr_null(raw);
    std::str::from_utf8(&raw[..end]).unwrap_or("")
}

/// Reads a NUL-terminated string at `offset` inside a load command payload.
///
/// Out-of-range offsets and invalid UTF-8 are decoded lossily; load command
/// strings are advisory and never abort the surrounding command.
pub fn lc_str(data: &[u8], offset: u32) -> String {
    match data.get(offset as usize..) {
        Some(tail) => String::from_utf8_lossy(c_str_bytes(tail).0).into_owned(),
        None => String::new(),
    }
}

/// Formats a UUID in the canonical 8-4-4-4-12 upper-case form.
pub fn uuid_string(uuid: &[u8; 16]) -> String {
    let hex: String = uuid.iter().map(|b| format!("{b:02X}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// =============================================================================
// LEB128
// =============================================================================

/// Reads an unsigned LEB128 value with fast paths for common cases.
///
/// Returns `(value, bytes_consumed)`, or `None` when the encoding runs off the
/// end of `data` or overflows 64 bits.
#[inline(always)]
pub fn read_uleb128(data: &[u8]) -> Option<(u64, usize)> {
    let b0 = *data.first()?;

    // Fast path: single byte (0-127)
    if b0 < 0x80 {
        return Some((b0 as u64, 1));
    }

    let b1 = *data.get(1)?;

    // Fast path: two bytes (128-16383)
    if b1 < 0x80 {
        let value = ((b0 & 0x7F) as u64) | ((b1 as u64) << 7);
        return Some((value, 2));
    }

    let mut result: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte < 0x80 {
            return Some((result, i + 1));
        }
    }

    None
}

/// Reads a signed LEB128 value.
///
/// Same contract as [`read_uleb128`].
#[inline(always)]
pub fn read_sleb128(data: &[u8]) -> Option<(i64, usize)> {
    let b0 = *data.first()?;

    // Fast path: single byte
    if b0 < 0x80 {
        let value = if (b0 & 0x40) != 0 {
            (b0 as i64) | !0x7F_i64
        } else {
            b0 as i64
        };
        return Some((value, 1));
    }

    let mut result: i64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }

        result |= ((byte & 0x7F) as i64) << shift;
        shift += 7;

        if byte < 0x80 {
            if shift < 64 && (byte & 0x40) != 0 {
                result |= !0_i64 << shift;
            }
            return Some((result, i + 1));
        }
    }

    None
}

// =============================================================================
// Cursor
// =============================================================================

/// A forward-only reader over an opcode or trie byte stream.
///
/// All reads are bounds-checked and report the offset at which they failed.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor at `pos`.
    #[inline]
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Returns true once every byte has been consumed.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads one byte.
    #[inline]
    pub fn u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Reads a ULEB128 value.
    #[inline]
    pub fn uleb(&mut self) -> Option<u64> {
        let (value, len) = read_uleb128(self.data.get(self.pos..)?)?;
        self.pos += len;
        Some(value)
    }

    /// Reads an SLEB128 value.
    #[inline]
    pub fn sleb(&mut self) -> Option<i64> {
        let (value, len) = read_sleb128(self.data.get(self.pos..)?)?;
        self.pos += len;
        Some(value)
    }

    /// Reads a NUL-terminated byte string, consuming the terminator.
    ///
    /// Fails when the terminator is missing.
    pub fn c_str(&mut self) -> Option<&'a [u8]> {
        let (bytes, terminated) = c_str_bytes(self.data.get(self.pos..)?);
        if !terminated {
            return None;
        }
        self.pos += bytes.len() + 1;
        Some(bytes)
    }

    /// Skips `n` bytes.
    #[inline]
    pub fn skip(&mut self, n: usize) -> Option<()> {
        let end = self.pos.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        self.pos = end;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_string() {
        let mut uuid = [0u8; 16];
        uuid[0] = 0xde;
        uuid[15] = 0x01;
        assert_eq!(uuid_string(&uuid), "DE000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn test_read_u32() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u32(&data, false), Some(0x04030201));
        assert_eq!(read_u32(&data, true), Some(0x01020304));
        assert_eq!(read_u32(&data[..3], true), None);
    }

    #[test]
    fn test_memchr_null() {
        assert_eq!(memchr_null(b"hello\0world"), 5);
        assert_eq!(memchr_null(b"\0"), 0);
        assert_eq!(memchr_null(b"hello"), 5);
    }

    #[test]
    fn test_fixed_name() {
        assert_eq!(fixed_name(b"__TEXT\0\0\0\0\0\0\0\0\0\0"), "__TEXT");
        assert_eq!(fixed_name(b"0123456789abcdef"), "0123456789abcdef");
    }

    #[test]
    fn test_uleb128() {
        assert_eq!(read_uleb128(&[0x00]), Some((0, 1)));
        assert_eq!(read_uleb128(&[0x7F]), Some((127, 1)));
        assert_eq!(read_uleb128(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(read_uleb128(&[0xE5, 0x8E, 0x26]), Some((624485, 3)));
    }

    #[test]
    fn test_uleb128_truncated() {
        assert_eq!(read_uleb128(&[]), None);
        assert_eq!(read_uleb128(&[0x80]), None);
        assert_eq!(read_uleb128(&[0x80, 0x80, 0x80]), None);
        assert_eq!(read_uleb128(&[0xFF; 11]), None);
    }

    #[test]
    fn test_sleb128() {
        assert_eq!(read_sleb128(&[0x00]), Some((0, 1)));
        assert_eq!(read_sleb128(&[0x7F]), Some((-1, 1)));
        assert_eq!(read_sleb128(&[0x40]), Some((-64, 1)));
        assert_eq!(read_sleb128(&[0x80, 0x7F]), Some((-128, 2)));
        assert_eq!(read_sleb128(&[0x80]), None);
    }

    #[test]
    fn test_cursor() {
        let data = b"\x05_foo\0\x81\x01";
        let mut cursor = Cursor::new(data, 0);
        assert_eq!(cursor.u8(), Some(5));
        assert_eq!(cursor.c_str(), Some(&b"_foo"[..]));
        assert_eq!(cursor.uleb(), Some(129));
        assert!(cursor.is_at_end());
        assert_eq!(cursor.u8(), None);
    }

    #[test]
    fn test_cursor_unterminated_string() {
        let mut cursor = Cursor::new(b"_foo", 0);
        assert_eq!(cursor.c_str(), None);
        assert_eq!(cursor.pos(), 0);
    }
}

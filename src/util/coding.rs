//! Encoding utilities for fixed-width and variable-length integers.

use bytes::{Buf, BufMut, BytesMut};

/// Maximum bytes needed to encode a varint64.
pub const MAX_VARINT64_LEN: usize = 10;

/// Encode a 64-bit unsigned integer as a varint.
///
/// Returns the number of bytes written.
pub fn encode_varint64(buf: &mut BytesMut, mut value: u64) -> usize {
    let mut count = 0;
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
        count += 1;
    }
    buf.put_u8(value as u8);
    count + 1
}

/// Decode a 64-bit varint from a buffer.
///
/// Returns None if the buffer is too short or the varint is malformed.
pub fn decode_varint64(buf: &mut &[u8]) -> Option<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    for _ in 0..MAX_VARINT64_LEN {
        if buf.is_empty() {
            return None;
        }

        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some(result);
        }

        shift += 7;
    }

    None // Varint too long
}

/// Encode a fixed 32-bit little-endian integer.
pub fn encode_fixed32(buf: &mut BytesMut, value: u32) {
    buf.put_u32_le(value);
}

/// Decode a fixed 32-bit little-endian integer.
pub fn decode_fixed32(buf: &mut &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    Some(buf.get_u32_le())
}

/// Encode a fixed 64-bit little-endian integer.
///
/// This is the codec used for cache keys derived from file numbers.
pub fn encode_fixed64(buf: &mut BytesMut, value: u64) {
    buf.put_u64_le(value);
}

/// Decode a fixed 64-bit little-endian integer.
pub fn decode_fixed64(buf: &mut &[u8]) -> Option<u64> {
    if buf.len() < 8 {
        return None;
    }
    Some(buf.get_u64_le())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint64_roundtrip() {
        let test_values = [
            0u64,
            1,
            127,
            128,
            255,
            256,
            16383,
            16384,
            (1 << 21) - 1,
            1 << 21,
            (1 << 28) - 1,
            1 << 28,
            (1 << 35) - 1,
            1 << 35,
            u64::MAX >> 1,
            u64::MAX,
        ];

        for &val in &test_values {
            let mut buf = BytesMut::new();
            let written = encode_varint64(&mut buf, val);
            assert_eq!(written, buf.len());

            let mut slice: &[u8] = &buf;
            let decoded = decode_varint64(&mut slice).unwrap();

            assert_eq!(val, decoded, "Failed for value {}", val);
            assert!(slice.is_empty(), "Buffer not fully consumed");
        }
    }

    #[test]
    fn test_fixed32_roundtrip() {
        let test_values = [0u32, 1, 255, 256, u32::MAX];

        for &val in &test_values {
            let mut buf = BytesMut::new();
            encode_fixed32(&mut buf, val);
            assert_eq!(buf.len(), 4);

            let mut slice: &[u8] = &buf;
            assert_eq!(decode_fixed32(&mut slice).unwrap(), val);
        }
    }

    #[test]
    fn test_fixed64_roundtrip() {
        let test_values = [0u64, 1, 255, 256, u64::MAX];

        for &val in &test_values {
            let mut buf = BytesMut::new();
            encode_fixed64(&mut buf, val);
            assert_eq!(buf.len(), 8);

            let mut slice: &[u8] = &buf;
            assert_eq!(decode_fixed64(&mut slice).unwrap(), val);
        }
    }

    #[test]
    fn test_fixed64_is_little_endian() {
        let mut buf = BytesMut::new();
        encode_fixed64(&mut buf, 0x0102030405060708);
        assert_eq!(&buf[..], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_decode_truncated() {
        let mut empty: &[u8] = &[];
        assert!(decode_varint64(&mut empty).is_none());
        assert!(decode_fixed32(&mut empty).is_none());
        assert!(decode_fixed64(&mut empty).is_none());

        let short: &[u8] = &[0x80, 0x80]; // Incomplete varint
        let mut slice = short;
        assert!(decode_varint64(&mut slice).is_none());
    }
}

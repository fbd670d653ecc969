/// Magic value opening every frame header, matching the source's
/// `TCP_HEAD_MAGIC`.
pub(crate) const MAGIC: u32 = 0xA5A5_A5A5;

/// Header is a bare magic + big-endian length, 8 bytes total. The source
/// also carries this as a fixed two-`u32` struct with no version or
/// timestamp field; a later revision of this driver family added a
/// timestamp, but that's not part of what this wire format specifies.
pub(crate) const HEADER_LEN: usize = 8;

pub(crate) fn encode_header(payload_len: u32) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
    buf[4..8].copy_from_slice(&payload_len.to_be_bytes());
    buf
}

/// Parses a header at the front of `buf`, returning `(HEADER_LEN, payload_len)`.
///
/// Returns `None` both when `buf` is too short to hold a header yet and
/// when the magic doesn't match. The caller treats both cases identically:
/// stop consuming and wait for more bytes. A bad magic is not distinguished
/// from a short read here because the byte stream's framing has already
/// been lost either way; the connection is left open rather than torn
/// down, matching the source's behavior of silently dropping unparseable
/// headers instead of closing the socket.
pub(crate) fn parse_head(buf: &[u8]) -> Option<(usize, u32)> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let magic = u32::from_be_bytes(buf[0..4].try_into().ok()?);
    if magic != MAGIC {
        return None;
    }
    let len = u32::from_be_bytes(buf[4..8].try_into().ok()?);
    Some((HEADER_LEN, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_header() {
        let header = encode_header(42);
        assert_eq!(parse_head(&header), Some((HEADER_LEN, 42)));
    }

    #[test]
    fn rejects_short_buffers() {
        let header = encode_header(42);
        assert_eq!(parse_head(&header[..7]), None);
        assert_eq!(parse_head(&[]), None);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut header = encode_header(42);
        header[0] ^= 0xFF;
        assert_eq!(parse_head(&header), None);
    }
}

//! Length-prefixed RCON framing.
//!
//! ```text
//! size:int32 | id:int32 | type:int32 | body:bytes | 0x00 | 0x00
//! ```
//!
//! `size` counts everything after itself. Sizes outside `[10, 65536]` are
//! treated as out-of-spec server output and surfaced verbatim.

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;

pub const MIN_PACKET_SIZE: i32 = 10;
pub const MAX_PACKET_SIZE: i32 = 65536;

pub fn encode_packet(id: i32, ptype: i32, body: &str) -> Vec<u8> {
    let size = (4 + 4 + body.len() + 2) as i32;
    let mut out = Vec::with_capacity(size as usize + 4);
    out.extend(size.to_le_bytes());
    out.extend(id.to_le_bytes());
    out.extend(ptype.to_le_bytes());
    out.extend(body.as_bytes());
    out.push(0);
    out.push(0);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame { id: i32, ptype: i32, body: String },
    /// Malformed framing: the whole buffered payload as text.
    Raw(String),
    Incomplete,
}

/// Decodes one packet off the front of `buf`, draining consumed bytes.
pub fn decode_packet(buf: &mut Vec<u8>) -> Decoded {
    if buf.len() < 4 {
        return Decoded::Incomplete;
    }
    let size = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
        let text = String::from_utf8_lossy(buf).into_owned();
        buf.clear();
        return Decoded::Raw(text);
    }
    let total = 4 + size as usize;
    if buf.len() < total {
        return Decoded::Incomplete;
    }
    let id = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let ptype = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let body_len = size as usize - 10;
    let body = String::from_utf8_lossy(&buf[12..12 + body_len]).into_owned();
    buf.drain(..total);
    Decoded::Frame { id, ptype, body }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut buf = encode_packet(7, SERVERDATA_EXECCOMMAND, "list");
        let decoded = decode_packet(&mut buf);
        assert_eq!(
            decoded,
            Decoded::Frame {
                id: 7,
                ptype: SERVERDATA_EXECCOMMAND,
                body: "list".into()
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_body_is_min_size() {
        let buf = encode_packet(1, 0, "");
        assert_eq!(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 10);
    }

    #[test]
    fn undersized_packet_flushes_as_raw_text() {
        let mut buf = 5i32.to_le_bytes().to_vec();
        buf.extend(b"hello");
        let decoded = decode_packet(&mut buf);
        let Decoded::Raw(text) = decoded else {
            panic!("expected raw");
        };
        assert!(text.contains("hello"));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_packet_flushes_as_raw_text() {
        let mut buf = (MAX_PACKET_SIZE + 1).to_le_bytes().to_vec();
        buf.extend(b"big");
        assert!(matches!(decode_packet(&mut buf), Decoded::Raw(_)));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_packet_waits_for_more() {
        let full = encode_packet(3, 0, "partial");
        let mut buf = full[..6].to_vec();
        assert_eq!(decode_packet(&mut buf), Decoded::Incomplete);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn two_packets_decode_in_order() {
        let mut buf = encode_packet(1, 0, "a");
        buf.extend(encode_packet(2, 0, "b"));
        let Decoded::Frame { id: first, .. } = decode_packet(&mut buf) else {
            panic!()
        };
        let Decoded::Frame { id: second, .. } = decode_packet(&mut buf) else {
            panic!()
        };
        assert_eq!((first, second), (1, 2));
    }
}

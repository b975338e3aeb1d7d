use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Strings longer than this are assumed to be a misread of binary data.
const MAX_STRING_LEN: i64 = 65536;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("unexpected end of buffer at offset {offset} (wanted {wanted} bytes, {left} left)")]
    UnexpectedEof {
        offset: usize,
        wanted: usize,
        left: usize,
    },
    #[error("string length {len} out of range at offset {offset}")]
    MalformedString { offset: usize, len: i32 },
}

/// Offset-tracked decoder over a byte buffer.
///
/// All primitive reads are little-endian and advance a monotonically
/// non-decreasing cursor. The only way to move backwards is the explicit
/// [`BinaryReader::restore`] entrypoint used during speculative parses.
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Remember the current cursor for a later [`BinaryReader::restore`].
    pub fn mark(&self) -> usize {
        self.pos
    }

    pub fn restore(&mut self, mark: usize) {
        self.pos = mark.min(self.data.len());
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReaderError> {
        self.take(n)?;
        Ok(())
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReaderError> {
        if self.remaining() < n {
            return Err(ReaderError::UnexpectedEof {
                offset: self.pos,
                wanted: n,
                left: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ReaderError> {
        self.take(n)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ReaderError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, ReaderError> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ReaderError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ReaderError> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, ReaderError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, ReaderError> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// 16 raw bytes rendered as lowercase hex.
    pub fn read_guid(&mut self) -> Result<String, ReaderError> {
        let raw = self.take(16)?;
        let mut s = String::with_capacity(32);
        for b in raw {
            s.push_str(&format!("{:02x}", b));
        }
        Ok(s)
    }

    /// Length-prefixed Unreal FString.
    ///
    /// Positive length is UTF-8, negative is UTF-16LE code units; both carry
    /// a trailing null terminator that is dropped. Lengths at or beyond
    /// 65536 code units fail with the cursor left at the length field.
    pub fn read_fstring(&mut self) -> Result<String, ReaderError> {
        let start = self.pos;
        let len = self.read_i32()?;
        if len == 0 {
            return Ok(String::new());
        }
        if (len as i64).abs() >= MAX_STRING_LEN {
            self.pos = start;
            return Err(ReaderError::MalformedString { offset: start, len });
        }
        if len > 0 {
            let bytes = match self.take(len as usize) {
                Ok(b) => b,
                Err(err) => {
                    self.pos = start;
                    return Err(err);
                }
            };
            // drop the null terminator
            Ok(String::from_utf8_lossy(&bytes[..bytes.len() - 1]).into_owned())
        } else {
            let units = (-len) as usize;
            let bytes = match self.take(units * 2) {
                Ok(b) => b,
                Err(err) => {
                    self.pos = start;
                    return Err(err);
                }
            };
            let mut utf16 = Vec::with_capacity(units - 1);
            for i in 0..units - 1 {
                utf16.push(LittleEndian::read_u16(&bytes[i * 2..]));
            }
            Ok(String::from_utf16_lossy(&utf16))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fstring_utf8(s: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(((s.len() + 1) as i32).to_le_bytes());
        out.extend(s.as_bytes());
        out.push(0);
        out
    }

    fn fstring_utf16(s: &str) -> Vec<u8> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut out = Vec::new();
        out.extend((-((units.len() + 1) as i32)).to_le_bytes());
        for u in units {
            out.extend(u.to_le_bytes());
        }
        out.extend(0u16.to_le_bytes());
        out
    }

    #[test]
    fn primitive_round_trip() {
        let mut buf = Vec::new();
        buf.extend(0xabu8.to_le_bytes());
        buf.extend(0xbeefu16.to_le_bytes());
        buf.extend(0xdeadbeefu32.to_le_bytes());
        buf.extend((-123456i32).to_le_bytes());
        buf.extend((-1234567890123i64).to_le_bytes());
        buf.extend(1.5f32.to_le_bytes());
        buf.extend((-2.25f64).to_le_bytes());

        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0xab);
        assert_eq!(r.read_u16().unwrap(), 0xbeef);
        assert_eq!(r.read_u32().unwrap(), 0xdeadbeef);
        assert_eq!(r.read_i32().unwrap(), -123456);
        assert_eq!(r.read_i64().unwrap(), -1234567890123);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), -2.25);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn fstring_utf8_round_trip() {
        let buf = fstring_utf8("SteamID");
        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_fstring().unwrap(), "SteamID");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn fstring_utf16_round_trip() {
        let buf = fstring_utf16("Straße über");
        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_fstring().unwrap(), "Straße über");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn fstring_empty_advances_four_bytes() {
        let buf = 0i32.to_le_bytes();
        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_fstring().unwrap(), "");
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn fstring_length_out_of_range_restores_cursor() {
        for len in [65536i32, 1 << 20, -65536, i32::MIN] {
            let mut buf = Vec::new();
            buf.extend(len.to_le_bytes());
            buf.extend([0u8; 16]);
            let mut r = BinaryReader::new(&buf);
            r.skip(0).unwrap();
            let err = r.read_fstring().unwrap_err();
            assert!(matches!(err, ReaderError::MalformedString { offset: 0, .. }));
            assert_eq!(r.position(), 0);
        }
    }

    #[test]
    fn guid_is_lowercase_hex() {
        let buf: Vec<u8> = (0..16u8).map(|v| v * 0x11).collect();
        let mut r = BinaryReader::new(&buf);
        assert_eq!(
            r.read_guid().unwrap(),
            "00112233445566778899aabbccddeeff"
        );
    }

    #[test]
    fn mark_restore_allows_speculative_reads() {
        let buf = 7u32.to_le_bytes();
        let mut r = BinaryReader::new(&buf);
        let mark = r.mark();
        assert_eq!(r.read_u32().unwrap(), 7);
        r.restore(mark);
        assert_eq!(r.read_u32().unwrap(), 7);
    }

    #[test]
    fn eof_reports_offset() {
        let buf = [1u8, 2];
        let mut r = BinaryReader::new(&buf);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            ReaderError::UnexpectedEof {
                offset: 0,
                wanted: 4,
                left: 2
            }
        ));
    }
}

use binary_reader::BinaryReader;

use crate::types::GvasError;

pub const GVAS_MAGIC: &[u8; 4] = b"GVAS";

#[derive(Debug, Clone, Default)]
pub struct GvasHeader {
    pub save_game_version: u32,
    pub package_version: u32,
    pub engine_major: u16,
    pub engine_minor: u16,
    pub engine_patch: u16,
    pub engine_build: u32,
    pub engine_branch: String,
    pub custom_version_format: u32,
    pub custom_versions: Vec<(String, i32)>,
    pub save_game_class: String,
}

pub fn read_header(r: &mut BinaryReader) -> Result<GvasHeader, GvasError> {
    let magic = r.read_bytes(4).map_err(|_| GvasError::NotGvas)?;
    if magic != GVAS_MAGIC {
        return Err(GvasError::NotGvas);
    }

    let save_game_version = r.read_u32()?;
    let package_version = r.read_u32()?;
    let engine_major = r.read_u16()?;
    let engine_minor = r.read_u16()?;
    let engine_patch = r.read_u16()?;
    let engine_build = r.read_u32()?;
    let engine_branch = r.read_fstring()?;
    let custom_version_format = r.read_u32()?;
    let custom_version_count = r.read_u32()?;
    let mut custom_versions = Vec::with_capacity(custom_version_count.min(1024) as usize);
    for _ in 0..custom_version_count {
        let guid = r.read_guid()?;
        let version = r.read_i32()?;
        custom_versions.push((guid, version));
    }
    let save_game_class = r.read_fstring()?;

    Ok(GvasHeader {
        save_game_version,
        package_version,
        engine_major,
        engine_minor,
        engine_patch,
        engine_build,
        engine_branch,
        custom_version_format,
        custom_versions,
        save_game_class,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    pub fn encode_fstring(s: &str) -> Vec<u8> {
        let mut out = Vec::new();
        if s.is_empty() {
            out.extend(0i32.to_le_bytes());
        } else {
            out.extend(((s.len() + 1) as i32).to_le_bytes());
            out.extend(s.as_bytes());
            out.push(0);
        }
        out
    }

    pub fn encode_header() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(b"GVAS");
        out.extend(2u32.to_le_bytes());
        out.extend(522u32.to_le_bytes());
        out.extend(4u16.to_le_bytes());
        out.extend(27u16.to_le_bytes());
        out.extend(2u16.to_le_bytes());
        out.extend(0u32.to_le_bytes());
        out.extend(encode_fstring("++UE4+Release-4.27"));
        out.extend(3u32.to_le_bytes());
        out.extend(1u32.to_le_bytes());
        out.extend([0u8; 16]);
        out.extend(7i32.to_le_bytes());
        out.extend(encode_fstring("TSWGameSave_C"));
        out
    }

    #[test]
    fn header_round_trip() {
        let buf = encode_header();
        let mut r = BinaryReader::new(&buf);
        let header = read_header(&mut r).unwrap();
        assert_eq!(header.save_game_version, 2);
        assert_eq!(header.engine_major, 4);
        assert_eq!(header.engine_minor, 27);
        assert_eq!(header.engine_branch, "++UE4+Release-4.27");
        assert_eq!(header.custom_versions.len(), 1);
        assert_eq!(header.custom_versions[0].1, 7);
        assert_eq!(header.save_game_class, "TSWGameSave_C");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn bad_magic_is_not_gvas() {
        let buf = b"SAVE".to_vec();
        let mut r = BinaryReader::new(&buf);
        assert!(matches!(read_header(&mut r), Err(GvasError::NotGvas)));
    }
}

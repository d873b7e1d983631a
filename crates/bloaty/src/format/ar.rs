//! AR archive front-end (spec.md §4.4): GNU, Darwin, and BSD variants,
//! each member recursively reprocessed by whatever front-end its own
//! magic selects, with a per-archive monotonically increasing
//! section-index base so object-file addresses from different members
//! never collide.

use crate::error::{Error, Result};
use super::Format;

const GLOBAL_HEADER: &[u8; 8] = b"!<arch>\n";

pub struct ArMember<'a> {
    pub name: String,
    pub data: &'a [u8],
}

/// GNU archives keep long names in a `//` member and reference them as
/// `/<offset>`; Darwin/BSD archives inline the name (`#1/<len>` extended
/// format) ahead of the member data. `detect_variant` distinguishes them
/// by the first member's name.
pub fn detect_variant(data: &[u8]) -> Format {
    if let Ok(members) = parse_raw(data) {
        if let Some(first) = members.first() {
            if first.0 == "__.SYMDEF" || first.0.starts_with("__.SYMDEF SORTED") {
                return Format::ArDarwin;
            }
        }
    }
    Format::ArGnu
}

struct RawMember {
    name_field: String,
    size: usize,
    data_offset: usize,
}

fn parse_raw(data: &[u8]) -> Result<Vec<(String, RawMember)>> {
    if data.len() < 8 || &data[0..8] != GLOBAL_HEADER {
        return Err(Error::malformed("ar::parse_raw", "bad archive magic"));
    }
    let mut pos = 8;
    let mut out = Vec::new();
    while pos + 60 <= data.len() {
        let header = &data[pos..pos + 60];
        if &header[58..60] != b"\x60\n" {
            return Err(Error::malformed("ar::parse_raw", "bad member header terminator"));
        }
        let name_field = String::from_utf8_lossy(&header[0..16]).trim_end().to_string();
        let size_field = String::from_utf8_lossy(&header[48..58]);
        let size: usize = size_field
            .trim()
            .parse()
            .map_err(|_| Error::malformed("ar::parse_raw", "bad member size field"))?;
        let data_offset = pos + 60;
        out.push((
            name_field.clone(),
            RawMember {
                name_field,
                size,
                data_offset,
            },
        ));
        pos = data_offset + size + (size % 2);
    }
    Ok(out)
}

/// Resolves the final member list, substituting GNU long names (`//`
/// table + `/<offset>` references) for their real filenames.
pub fn members(data: &[u8]) -> Result<Vec<ArMember>> {
    let raw = parse_raw(data)?;
    let long_names = raw
        .iter()
        .find(|(name, _)| name == "//")
        .map(|(_, m)| &data[m.data_offset..m.data_offset + m.size]);

    let mut out = Vec::new();
    for (name, m) in &raw {
        if name == "//" || name == "/" {
            continue; // long-name table / symbol table, not a real member
        }
        let resolved = if let Some(offset_str) = name.strip_prefix('/') {
            if let (Ok(offset), Some(table)) = (offset_str.parse::<usize>(), long_names) {
                read_long_name(table, offset)
            } else {
                name.trim_end_matches('/').to_string()
            }
        } else {
            name.trim_end_matches('/').to_string()
        };
        out.push(ArMember {
            name: resolved,
            data: &data[m.data_offset..m.data_offset + m.size],
        });
        let _ = &m.name_field;
    }
    Ok(out)
}

fn read_long_name(table: &[u8], offset: usize) -> String {
    if offset >= table.len() {
        return String::new();
    }
    let end = table[offset..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| offset + p)
        .unwrap_or(table.len());
    String::from_utf8_lossy(&table[offset..end])
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad_field(s: &str, width: usize) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.resize(width, b' ');
        v
    }

    fn build_member_header(name: &str, size: usize) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(pad_field(name, 16));
        h.extend(pad_field("0", 12)); // mtime
        h.extend(pad_field("0", 6)); // uid
        h.extend(pad_field("0", 6)); // gid
        h.extend(pad_field("644", 8)); // mode
        h.extend(pad_field(&size.to_string(), 10));
        h.extend_from_slice(b"\x60\n");
        h
    }

    #[test]
    fn parses_single_member() {
        let mut data = GLOBAL_HEADER.to_vec();
        let payload = b"\x7fELFxxxx";
        data.extend(build_member_header("a.o/", payload.len()));
        data.extend_from_slice(payload);

        let members = members(&data).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "a.o");
        assert_eq!(members[0].data, payload);
    }

    #[test]
    fn resolves_gnu_long_name_table() {
        let mut data = GLOBAL_HEADER.to_vec();
        let long_names = b"really_long_object_file_name.o/\n";
        data.extend(build_member_header("//", long_names.len()));
        data.extend_from_slice(long_names);
        if long_names.len() % 2 == 1 {
            data.push(b'\n');
        }

        let payload = b"DEADBEEF";
        data.extend(build_member_header("/0", payload.len()));
        data.extend_from_slice(payload);

        let members = members(&data).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "really_long_object_file_name.o");
    }
}

//! WebAssembly front-end (spec.md §4.4): LEB128-framed sections plus the
//! custom `"name"` section.

use crate::cursor::{Cursor, Endian};
use crate::dualmap::DualMap;
use crate::error::{Error, Result};
use crate::sink::RangeSink;

const WASM_MAGIC: &[u8; 4] = b"\0asm";

fn section_name(id: u8) -> &'static str {
    match id {
        0 => "custom",
        1 => "type",
        2 => "import",
        3 => "function",
        4 => "table",
        5 => "memory",
        6 => "global",
        7 => "export",
        8 => "start",
        9 => "element",
        10 => "code",
        11 => "data",
        12 => "data_count",
        _ => "unknown",
    }
}

struct WasmSection {
    id: u8,
    name: String,
    offset: usize,
    size: u64,
}

fn read_sections(data: &[u8]) -> Result<Vec<WasmSection>> {
    if data.len() < 8 || &data[0..4] != WASM_MAGIC {
        return Err(Error::malformed("wasm::read_sections", "bad wasm magic"));
    }
    let mut c = Cursor::new(data, Endian::Little);
    c.seek(8); // magic + version

    let mut sections = Vec::new();
    while c.remaining() > 0 {
        let id = c.u8()?;
        let size = c.uleb128()?;
        let payload_start = c.pos;

        let name = if id == 0 {
            let mut name_cursor = Cursor::at(data, payload_start, Endian::Little);
            let len = name_cursor.uleb128()? as usize;
            let name_bytes = name_cursor.bytes(len)?;
            String::from_utf8_lossy(name_bytes).to_string()
        } else {
            section_name(id).to_string()
        };

        sections.push(WasmSection {
            id,
            name,
            offset: payload_start,
            size,
        });
        c.seek(payload_start + size as usize);
    }
    Ok(sections)
}

/// WebAssembly has no separate VM/file domains: module offset serves as
/// both. The base map therefore has only a file-offset side. The 8-byte
/// magic/version preamble and any gap between sections are swept into
/// `[Wasm Headers]`/`[Unmapped]` (spec.md §4.4 "front-end contracts").
pub fn process_base_map(data: &[u8], map: &mut DualMap) -> Result<()> {
    for sec in read_sections(data)? {
        map.add_range(&sec.name, None, 0, Some(sec.offset as u64), sec.size)?;
    }
    map.fill_unmapped_file_gaps(data.len() as u64, 8, "[Wasm Headers]", "[Unmapped]")?;
    Ok(())
}

pub fn process_sections(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    for sec in read_sections(data)? {
        let label = if sec.id == 0 {
            format!("custom[{}]", sec.name)
        } else {
            sec.name
        };
        sink.add_file_range(&label, sec.offset as u64, sec.size)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_module() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(WASM_MAGIC);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(1); // type section id
        data.push(3); // size
        data.extend_from_slice(&[0, 0, 0]);
        data
    }

    #[test]
    fn reads_one_known_section() {
        let data = build_module();
        let sections = read_sections(&data).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, "type");
        assert_eq!(sections[0].size, 3);
    }
}

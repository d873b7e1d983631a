//! Mach-O front-end (spec.md §4.4): load commands, fat/universal
//! binaries, Darwin AR members, and `__zdebug_*` zlib-compressed DWARF
//! sections.

use crate::cursor::{Cursor, Endian};
use crate::dualmap::DualMap;
use crate::error::{Error, Result};
use crate::sink::RangeSink;

const LC_SEGMENT: u32 = 0x01;
const LC_SEGMENT_64: u32 = 0x19;
const LC_SYMTAB: u32 = 0x02;
const VM_PROT_NONE: i32 = 0;
const N_STAB: u8 = 0xe0;
const N_TYPE: u8 = 0x0e;
const N_SECT: u8 = 0x0e;

struct MachHeader {
    is64: bool,
    endian: Endian,
    ncmds: u32,
    header_size: usize,
}

fn parse_header(data: &[u8]) -> Result<MachHeader> {
    if data.len() < 8 {
        return Err(Error::malformed("macho::parse_header", "file too short"));
    }
    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let (is64, endian) = match magic {
        0xfeedface => (false, Endian::Big),
        0xcefaedfe => (false, Endian::Little),
        0xfeedfacf => (true, Endian::Big),
        0xcffaedfe => (true, Endian::Little),
        _ => return Err(Error::malformed("macho::parse_header", "bad Mach-O magic")),
    };
    let mut c = Cursor::at(data, 4, endian);
    let _cputype = c.u32()?;
    let _cpusubtype = c.u32()?;
    let _filetype = c.u32()?;
    let ncmds = c.u32()?;
    let _sizeofcmds = c.u32()?;
    let _flags = c.u32()?;
    if is64 {
        c.u32()?; // reserved
    }
    Ok(MachHeader {
        is64,
        endian,
        ncmds,
        header_size: c.pos,
    })
}

struct Segment {
    name: String,
    vmaddr: u64,
    vmsize: u64,
    fileoff: u64,
    filesize: u64,
    maxprot: i32,
}

fn read_segments(data: &[u8], h: &MachHeader) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut pos = h.header_size;
    for _ in 0..h.ncmds {
        let mut c = Cursor::at(data, pos, h.endian);
        let cmd = c.u32()?;
        let cmdsize = c.u32()?;
        if cmd == LC_SEGMENT || cmd == LC_SEGMENT_64 {
            let name_bytes = c.bytes(16)?;
            let name = String::from_utf8_lossy(name_bytes)
                .trim_end_matches('\0')
                .to_string();
            let (vmaddr, vmsize, fileoff, filesize) = if cmd == LC_SEGMENT_64 {
                (c.u64()?, c.u64()?, c.u64()?, c.u64()?)
            } else {
                (c.u32()? as u64, c.u32()? as u64, c.u32()? as u64, c.u32()? as u64)
            };
            let maxprot = c.u32()? as i32;
            segments.push(Segment {
                name,
                vmaddr,
                vmsize,
                fileoff,
                filesize,
                maxprot,
            });
        }
        pos += cmdsize as usize;
    }
    Ok(segments)
}

/// Builds the base map from `LC_SEGMENT[_64]` commands. A segment with
/// `maxprot == VM_PROT_NONE` is file-only (spec.md §4.4). The load
/// commands themselves and any byte no segment claims are swept into
/// `[Mach-O Headers]`/`[Unmapped]` so the base map fully covers
/// `[0, filesize)`.
pub fn process_base_map(data: &[u8], map: &mut DualMap) -> Result<()> {
    let h = parse_header(data)?;
    for seg in read_segments(data, &h)? {
        if seg.maxprot == VM_PROT_NONE {
            map.add_range(&seg.name, None, 0, Some(seg.fileoff), seg.filesize)?;
        } else {
            map.add_range(&seg.name, Some(seg.vmaddr), seg.vmsize, Some(seg.fileoff), seg.filesize)?;
        }
    }
    let header_end = commands_end(data, &h)? as u64;
    map.fill_unmapped_file_gaps(data.len() as u64, header_end, "[Mach-O Headers]", "[Unmapped]")?;
    Ok(())
}

pub fn process_segments(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let h = parse_header(data)?;
    for seg in read_segments(data, &h)? {
        if seg.maxprot == VM_PROT_NONE {
            sink.add_file_range(&seg.name, seg.fileoff, seg.filesize)?;
        } else {
            sink.add_range(&seg.name, Some(seg.vmaddr), seg.vmsize, Some(seg.fileoff), seg.filesize)?;
        }
    }
    Ok(())
}

/// Byte offset just past the last load command — the end of the region
/// `process_base_map` attributes to `[Mach-O Headers]`.
fn commands_end(data: &[u8], h: &MachHeader) -> Result<usize> {
    let mut pos = h.header_size;
    for _ in 0..h.ncmds {
        let mut c = Cursor::at(data, pos, h.endian);
        let _cmd = c.u32()?;
        let cmdsize = c.u32()?;
        pos += cmdsize as usize;
    }
    Ok(pos)
}

struct MachoSection {
    name: String,
    addr: u64,
    size: u64,
    offset: u64,
}

fn read_sections(data: &[u8], h: &MachHeader) -> Result<Vec<MachoSection>> {
    let mut sections = Vec::new();
    let mut pos = h.header_size;
    for _ in 0..h.ncmds {
        let mut c = Cursor::at(data, pos, h.endian);
        let cmd = c.u32()?;
        let cmdsize = c.u32()?;
        if cmd == LC_SEGMENT || cmd == LC_SEGMENT_64 {
            c.bytes(16)?; // segname
            if cmd == LC_SEGMENT_64 {
                c.u64()?;
                c.u64()?;
                c.u64()?;
                c.u64()?;
            } else {
                c.u32()?;
                c.u32()?;
                c.u32()?;
                c.u32()?;
            }
            c.u32()?; // maxprot
            c.u32()?; // initprot
            let nsects = c.u32()?;
            let _flags = c.u32()?;
            for _ in 0..nsects {
                let sectname = c.bytes(16)?;
                let name = String::from_utf8_lossy(sectname).trim_end_matches('\0').to_string();
                c.bytes(16)?; // segname
                let (addr, size) = if cmd == LC_SEGMENT_64 {
                    (c.u64()?, c.u64()?)
                } else {
                    (c.u32()? as u64, c.u32()? as u64)
                };
                let offset = c.u32()? as u64;
                c.u32()?; // align
                c.u32()?; // reloff
                c.u32()?; // nreloc
                c.u32()?; // flags
                c.u32()?; // reserved1
                c.u32()?; // reserved2
                if cmd == LC_SEGMENT_64 {
                    c.u32()?; // reserved3
                }
                sections.push(MachoSection { name, addr, size, offset });
            }
        }
        pos += cmdsize as usize;
    }
    Ok(sections)
}

/// Populates the `sections` data source from sections embedded in
/// `LC_SEGMENT[_64]` commands (spec.md §4.4).
pub fn process_sections(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let h = parse_header(data)?;
    for sec in read_sections(data, &h)? {
        if sec.size == 0 {
            continue;
        }
        if sec.addr != 0 {
            sink.add_vm_range(sec.addr, sec.size, &sec.name)?;
        } else {
            sink.add_file_range(&sec.name, sec.offset, sec.size)?;
        }
    }
    Ok(())
}

struct SymtabCommand {
    symoff: u32,
    nsyms: u32,
    stroff: u32,
}

fn find_symtab(data: &[u8], h: &MachHeader) -> Result<Option<SymtabCommand>> {
    let mut pos = h.header_size;
    for _ in 0..h.ncmds {
        let mut c = Cursor::at(data, pos, h.endian);
        let cmd = c.u32()?;
        let cmdsize = c.u32()?;
        if cmd == LC_SYMTAB {
            let symoff = c.u32()?;
            let nsyms = c.u32()?;
            let stroff = c.u32()?;
            let _strsize = c.u32()?;
            return Ok(Some(SymtabCommand { symoff, nsyms, stroff }));
        }
        pos += cmdsize as usize;
    }
    Ok(None)
}

/// Populates the `symbols` data source from the `LC_SYMTAB` string/nlist
/// tables, skipping stabs and anything not defined relative to a section
/// (spec.md §4.4).
pub fn process_symbols(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let h = parse_header(data)?;
    let Some(symtab) = find_symtab(data, &h)? else {
        return Ok(());
    };
    let entsize: usize = if h.is64 { 16 } else { 12 };
    for i in 0..symtab.nsyms as usize {
        let pos = symtab.symoff as usize + i * entsize;
        let mut c = Cursor::at(data, pos, h.endian);
        let n_strx = c.u32()?;
        let n_type = c.u8()?;
        let _n_sect = c.u8()?;
        let _n_desc = c.u16()?;
        let n_value = c.uword(h.is64)?;
        if n_type & N_STAB != 0 || n_type & N_TYPE != N_SECT {
            continue;
        }
        if n_strx == 0 {
            continue;
        }
        let name = crate::cursor::cstr_at(data, symtab.stroff as usize + n_strx as usize)?;
        if name.is_empty() {
            continue;
        }
        sink.add_vm_range_allow_alias(n_value, 1, name)?;
    }
    Ok(())
}

/// Detects a zlib-compressed `__zdebug_*` DWARF section by its `"ZLIB"`
/// header plus 8-byte big-endian uncompressed length (spec.md §4.4, §9).
pub fn zdebug_uncompressed_len(section_data: &[u8]) -> Option<u64> {
    if section_data.len() < 12 || &section_data[0..4] != b"ZLIB" {
        return None;
    }
    Some(u64::from_be_bytes(section_data[4..12].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zdebug_header_is_recognized() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ZLIB");
        data.extend_from_slice(&1234u64.to_be_bytes());
        data.extend_from_slice(&[0u8; 4]);
        assert_eq!(zdebug_uncompressed_len(&data), Some(1234));
    }

    #[test]
    fn non_zdebug_section_returns_none() {
        assert_eq!(zdebug_uncompressed_len(b"not compressed data"), None);
    }
}

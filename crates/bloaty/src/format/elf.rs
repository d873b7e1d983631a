//! ELF front-end (spec.md §4.4): segments, sections, symbols, object-file
//! addressing, and AR members.

use rangemap_core::{pack_section_offset, Address};

use crate::cursor::{Cursor, Endian};
use crate::dualmap::DualMap;
use crate::error::{Error, Result};
use crate::sink::RangeSink;

const PT_LOAD: u32 = 1;
const SHT_NOBITS: u32 = 8;
const SHT_SYMTAB: u32 = 2;
const SHT_DYNSYM: u32 = 11;
const SHN_UNDEF: u16 = 0;
const SHN_ABS: u16 = 0xfff1;
const STT_FILE: u8 = 4;
const STT_SECTION: u8 = 3;
const STT_NOTYPE: u8 = 0;
const STT_TLS: u8 = 6;

struct ElfHeader {
    is64: bool,
    endian: Endian,
    e_type: u16,
    phoff: u64,
    phentsize: u16,
    phnum: u16,
    shoff: u64,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

fn parse_header(data: &[u8]) -> Result<ElfHeader> {
    if data.len() < 20 || &data[0..4] != b"\x7fELF" {
        return Err(Error::malformed("elf::parse_header", "bad ELF magic"));
    }
    let is64 = match data[4] {
        1 => false,
        2 => true,
        _ => return Err(Error::malformed("elf::parse_header", "invalid EI_CLASS")),
    };
    let endian = match data[5] {
        1 => Endian::Little,
        2 => Endian::Big,
        _ => return Err(Error::malformed("elf::parse_header", "invalid EI_DATA")),
    };

    let mut c = Cursor::at(data, 16, endian);
    let e_type = c.u16()?;
    let _e_machine = c.u16()?;
    let _e_version = c.u32()?;
    let _e_entry = c.uword(is64)?;
    let phoff = c.uword(is64)?;
    let shoff = c.uword(is64)?;
    let _e_flags = c.u32()?;
    let _e_ehsize = c.u16()?;
    let phentsize = c.u16()?;
    let phnum = c.u16()?;
    let shentsize = c.u16()?;
    let shnum = c.u16()?;
    let shstrndx = c.u16()?;

    Ok(ElfHeader {
        is64,
        endian,
        e_type,
        phoff,
        phentsize,
        phnum,
        shoff,
        shentsize,
        shnum,
        shstrndx,
    })
}

struct Segment {
    flags: u32,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
    offset: u64,
}

fn read_segments(data: &[u8], h: &ElfHeader) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    for i in 0..h.phnum as u64 {
        let pos = h.phoff as usize + (i * h.phentsize as u64) as usize;
        let mut c = Cursor::at(data, pos, h.endian);
        let (p_type, flags, offset, vaddr, _paddr, filesz, memsz) = if h.is64 {
            let p_type = c.u32()?;
            let flags = c.u32()?;
            let offset = c.u64()?;
            let vaddr = c.u64()?;
            let paddr = c.u64()?;
            let filesz = c.u64()?;
            let memsz = c.u64()?;
            (p_type, flags, offset, vaddr, paddr, filesz, memsz)
        } else {
            let p_type = c.u32()?;
            let offset = c.u32()? as u64;
            let vaddr = c.u32()? as u64;
            let paddr = c.u32()? as u64;
            let filesz = c.u32()? as u64;
            let memsz = c.u32()? as u64;
            let flags = c.u32()?;
            (p_type, flags, offset, vaddr, paddr, filesz, memsz)
        };
        if p_type == PT_LOAD {
            segments.push(Segment {
                flags,
                vaddr,
                filesz,
                memsz,
                offset,
            });
        }
    }
    Ok(segments)
}

struct Section {
    name_off: u32,
    sh_type: u32,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
}

fn read_sections(data: &[u8], h: &ElfHeader) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    for i in 0..h.shnum as u64 {
        let pos = h.shoff as usize + (i * h.shentsize as u64) as usize;
        let mut c = Cursor::at(data, pos, h.endian);
        let name_off = c.u32()?;
        let sh_type = c.u32()?;
        let _flags = c.uword(h.is64)?;
        let addr = c.uword(h.is64)?;
        let offset = c.uword(h.is64)?;
        let size = c.uword(h.is64)?;
        let link = c.u32()?;
        sections.push(Section {
            name_off,
            sh_type,
            addr,
            offset,
            size,
            link,
        });
    }
    Ok(sections)
}

fn segment_label(flags: u32) -> String {
    let r = if flags & 0x4 != 0 { "R" } else { "" };
    let w = if flags & 0x2 != 0 { "W" } else { "" };
    let x = if flags & 0x1 != 0 { "X" } else { "" };
    format!("LOAD [{r}{w}{x}]")
}

fn section_name<'a>(data: &'a [u8], sections: &[Section], shstrndx: u16, sec: &Section) -> Result<&'a str> {
    let strtab = &sections[shstrndx as usize];
    crate::cursor::cstr_at(data, strtab.offset as usize + sec.name_off as usize)
}

/// Populates the base `DualMap` from `PT_LOAD` segments (spec.md §4.4).
/// In object files (`ET_REL`, no segments), synthesizes one flag-based
/// segment per section using the 24/40-bit `(section_index, offset)`
/// addressing scheme instead of a real virtual address. Either way, the
/// header/program-header/section-header region and any remaining gap
/// are swept into `[ELF Headers]`/`[Unmapped]` so the base map fully
/// covers `[0, filesize)` (spec.md §4.4 "front-end contracts").
pub fn process_base_map(data: &[u8], map: &mut DualMap) -> Result<()> {
    let h = parse_header(data)?;
    let segments = read_segments(data, &h)?;

    if !segments.is_empty() {
        for seg in &segments {
            if seg.memsz == 0 {
                continue;
            }
            map.add_range(
                &segment_label(seg.flags),
                Some(seg.vaddr),
                seg.memsz,
                Some(seg.offset),
                seg.filesz,
            )?;
        }
    } else {
        // object-file mode: one synthetic segment per section, addressed by
        // (section_index, offset) packing.
        let sections = read_sections(data, &h)?;
        for (idx, sec) in sections.iter().enumerate() {
            if sec.size == 0 || idx == 0 {
                continue;
            }
            let synth_vaddr: Address = pack_section_offset(idx as u32, 0);
            let filesize = if sec.sh_type == SHT_NOBITS { 0 } else { sec.size };
            map.add_range("LOAD [synthetic]", Some(synth_vaddr), sec.size, Some(sec.offset), filesize)?;
        }
    }

    map.fill_unmapped_file_gaps(data.len() as u64, header_end(&h), "[ELF Headers]", "[Unmapped]")?;
    Ok(())
}

/// End of the ELF header plus whatever program/section header tables it
/// points at — the leading metadata region no section's own bytes claim.
fn header_end(h: &ElfHeader) -> u64 {
    let ehdr_size = if h.is64 { 64 } else { 52 };
    let phdr_end = h.phoff + h.phnum as u64 * h.phentsize as u64;
    let shdr_end = h.shoff + h.shnum as u64 * h.shentsize as u64;
    ehdr_size.max(phdr_end).max(shdr_end)
}

pub fn process_segments(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let h = parse_header(data)?;
    for seg in read_segments(data, &h)? {
        if seg.memsz == 0 {
            continue;
        }
        sink.add_range(&segment_label(seg.flags), Some(seg.vaddr), seg.memsz, Some(seg.offset), seg.filesz)?;
    }
    Ok(())
}

pub fn process_sections(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let h = parse_header(data)?;
    let sections = read_sections(data, &h)?;
    for sec in &sections {
        if sec.addr == 0 && sec.sh_type != SHT_NOBITS && sec.size == 0 {
            continue;
        }
        let name = section_name(data, &sections, h.shstrndx, sec).unwrap_or("[unknown section]");
        let filesize = if sec.sh_type == SHT_NOBITS { 0 } else { sec.size };
        if sec.addr != 0 {
            sink.add_vm_range(sec.addr, sec.size, name)?;
        } else {
            sink.add_file_range(name, sec.offset, filesize)?;
        }
    }
    Ok(())
}

struct Sym<'a> {
    name: &'a str,
    value: u64,
    size: u64,
    info: u8,
    shndx: u16,
}

fn read_symtab<'a>(data: &'a [u8], h: &ElfHeader, symtab: &Section, sections: &[Section]) -> Result<Vec<Sym<'a>>> {
    let strtab = &sections[symtab.link as usize];
    let entsize: u64 = if h.is64 { 24 } else { 16 };
    let count = symtab.size / entsize;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let pos = symtab.offset as usize + (i * entsize) as usize;
        let mut c = Cursor::at(data, pos, h.endian);
        let (name_off, info, shndx, value, size) = if h.is64 {
            let name_off = c.u32()?;
            let info = c.u8()?;
            let _other = c.u8()?;
            let shndx = c.u16()?;
            let value = c.u64()?;
            let size = c.u64()?;
            (name_off, info, shndx, value, size)
        } else {
            let name_off = c.u32()?;
            let value = c.u32()? as u64;
            let size = c.u32()? as u64;
            let info = c.u8()?;
            let _other = c.u8()?;
            let shndx = c.u16()?;
            (name_off, info, shndx, value, size)
        };
        let name = crate::cursor::cstr_at(data, strtab.offset as usize + name_off as usize)?;
        out.push(Sym {
            name,
            value,
            size,
            info,
            shndx,
        });
    }
    Ok(out)
}

/// Looks up a section by name (e.g. `.debug_info`), for the DWARF reader
/// to locate its input sections without duplicating the section-table
/// walk (spec.md §4.5).
pub fn find_section_by_name<'a>(data: &'a [u8], name: &str) -> Result<&'a [u8]> {
    let h = parse_header(data)?;
    let sections = read_sections(data, &h)?;
    for sec in &sections {
        if section_name(data, &sections, h.shstrndx, sec).unwrap_or("") == name {
            let start = sec.offset as usize;
            let end = start + sec.size as usize;
            if end > data.len() {
                return Err(Error::malformed("elf::find_section_by_name", "section extends past end of file"));
            }
            return Ok(&data[start..end]);
        }
    }
    Ok(&[])
}

/// Populates the `symbols` data source (spec.md §4.4: skips `STT_FILE`,
/// `STT_SECTION`, `SHN_UNDEF`, `SHN_ABS`, `NOTYPE`, `TLS`, empty names;
/// duplicates at the same address are aliased).
pub fn process_symbols(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let h = parse_header(data)?;
    let sections = read_sections(data, &h)?;
    let Some(symtab) = sections.iter().find(|s| s.sh_type == SHT_SYMTAB || s.sh_type == SHT_DYNSYM) else {
        return Ok(());
    };
    for sym in read_symtab(data, &h, symtab, &sections)? {
        let stype = sym.info & 0xf;
        if stype == STT_FILE || stype == STT_SECTION || stype == STT_NOTYPE || stype == STT_TLS {
            continue;
        }
        if sym.shndx == SHN_UNDEF || sym.shndx == SHN_ABS {
            continue;
        }
        if sym.name.is_empty() {
            continue;
        }
        if sym.size > 0 {
            sink.add_vm_range_allow_alias(sym.value, sym.size, sym.name)?;
        } else {
            sink.add_vm_range_allow_alias(sym.value, 1, sym.name)?;
        }
    }
    Ok(())
}

/// Name → (address, size) pairs for every named, defined symbol — used
/// by the DWARF reader to resolve DIEs that carry only a linkage name
/// (spec.md §4.5 "cross-references the symbol table passed in").
pub fn symbol_table<'a>(data: &'a [u8]) -> Result<Vec<(&'a str, u64, u64)>> {
    let h = parse_header(data)?;
    let sections = read_sections(data, &h)?;
    let Some(symtab) = sections.iter().find(|s| s.sh_type == SHT_SYMTAB || s.sh_type == SHT_DYNSYM) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for sym in read_symtab(data, &h, symtab, &sections)? {
        if sym.name.is_empty() {
            continue;
        }
        out.push((sym.name, sym.value, sym.size));
    }
    Ok(out)
}

/// Reads `.note.gnu.build-id`'s descriptor bytes, for matching a
/// stripped binary against a `--debug-file` companion (spec.md §4.6).
pub fn build_id(data: &[u8]) -> Result<Option<Vec<u8>>> {
    let note = find_section_by_name(data, ".note.gnu.build-id")?;
    if note.len() < 12 {
        return Ok(None);
    }
    let mut c = Cursor::at(note, 0, Endian::Little);
    let namesz = c.u32()? as usize;
    let descsz = c.u32()? as usize;
    let _note_type = c.u32()?;
    let name_padded = (namesz + 3) & !3;
    c.seek(c.pos + name_padded);
    let desc = c.bytes(descsz)?;
    Ok(Some(desc.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_elf64() -> Vec<u8> {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(b"\x7fELF");
        data[4] = 2; // 64-bit
        data[5] = 1; // little endian
        let mut c = vec![0u8; 0];
        c.extend_from_slice(&1u16.to_le_bytes()); // e_type (ET_REL)
        c.extend_from_slice(&0u16.to_le_bytes()); // e_machine
        c.extend_from_slice(&1u32.to_le_bytes()); // e_version
        c.extend_from_slice(&0u64.to_le_bytes()); // e_entry
        c.extend_from_slice(&0u64.to_le_bytes()); // phoff
        c.extend_from_slice(&64u64.to_le_bytes()); // shoff
        c.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        c.extend_from_slice(&64u16.to_le_bytes()); // ehsize
        c.extend_from_slice(&0u16.to_le_bytes()); // phentsize
        c.extend_from_slice(&0u16.to_le_bytes()); // phnum
        c.extend_from_slice(&64u16.to_le_bytes()); // shentsize
        c.extend_from_slice(&1u16.to_le_bytes()); // shnum (just null section)
        c.extend_from_slice(&0u16.to_le_bytes()); // shstrndx
        data[16..16 + c.len()].copy_from_slice(&c);

        // one null section header (all zero) at offset 64
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    #[test]
    fn parses_minimal_header() {
        let data = build_minimal_elf64();
        let h = parse_header(&data).unwrap();
        assert!(h.is64);
        assert_eq!(h.e_type, 1);
        assert_eq!(h.shnum, 1);
    }

    #[test]
    fn object_mode_base_map_is_empty_with_no_sized_sections() {
        let data = build_minimal_elf64();
        let mut map = DualMap::new();
        process_base_map(&data, &mut map).unwrap();
        assert!(map.vm_map.is_empty());
    }
}

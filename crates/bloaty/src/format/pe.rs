//! PE/COFF front-end (spec.md §4.4): DOS header, PE header, sections.

use crate::cursor::{Cursor, Endian};
use crate::dualmap::DualMap;
use crate::error::{Error, Result};
use crate::sink::RangeSink;

struct PeSection {
    name: String,
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

fn pe_header_offset(data: &[u8]) -> Result<usize> {
    if data.len() < 0x40 || &data[0..2] != b"MZ" {
        return Err(Error::malformed("pe::pe_header_offset", "bad DOS magic"));
    }
    let mut c = Cursor::at(data, 0x3c, Endian::Little);
    Ok(c.u32()? as usize)
}

fn read_sections(data: &[u8]) -> Result<Vec<PeSection>> {
    let pe_off = pe_header_offset(data)?;
    if data.len() < pe_off + 4 || &data[pe_off..pe_off + 4] != b"PE\0\0" {
        return Err(Error::malformed("pe::read_sections", "bad PE signature"));
    }
    let mut c = Cursor::at(data, pe_off + 4, Endian::Little);
    let _machine = c.u16()?;
    let num_sections = c.u16()?;
    let _timestamp = c.u32()?;
    let _symtab_ptr = c.u32()?;
    let _num_symbols = c.u32()?;
    let opt_header_size = c.u16()?;
    let _characteristics = c.u16()?;

    let sections_offset = c.pos + opt_header_size as usize;
    let mut sections = Vec::with_capacity(num_sections as usize);
    for i in 0..num_sections as usize {
        let mut sc = Cursor::at(data, sections_offset + i * 40, Endian::Little);
        let name_bytes = sc.bytes(8)?;
        let name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();
        let virtual_size = sc.u32()?;
        let virtual_address = sc.u32()?;
        let raw_size = sc.u32()?;
        let raw_offset = sc.u32()?;
        sections.push(PeSection {
            name,
            virtual_address,
            virtual_size,
            raw_offset,
            raw_size,
        });
    }
    Ok(sections)
}

/// Byte offset just past the section table — the end of the DOS
/// stub/PE header/section-table region `process_base_map` attributes to
/// `[PE Headers]`.
fn header_end(data: &[u8]) -> Result<u64> {
    let pe_off = pe_header_offset(data)?;
    let mut c = Cursor::at(data, pe_off + 4, Endian::Little);
    let _machine = c.u16()?;
    let num_sections = c.u16()?;
    let _timestamp = c.u32()?;
    let _symtab_ptr = c.u32()?;
    let _num_symbols = c.u32()?;
    let opt_header_size = c.u16()?;
    let _characteristics = c.u16()?;
    let sections_offset = c.pos + opt_header_size as usize;
    Ok((sections_offset + num_sections as usize * 40) as u64)
}

pub fn process_base_map(data: &[u8], map: &mut DualMap) -> Result<()> {
    for sec in read_sections(data)? {
        map.add_range(
            &sec.name,
            Some(sec.virtual_address as u64),
            sec.virtual_size as u64,
            Some(sec.raw_offset as u64),
            sec.raw_size as u64,
        )?;
    }
    map.fill_unmapped_file_gaps(data.len() as u64, header_end(data)?, "[PE Headers]", "[Unmapped]")?;
    Ok(())
}

pub fn process_sections(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    for sec in read_sections(data)? {
        sink.add_range(
            &sec.name,
            Some(sec.virtual_address as u64),
            sec.virtual_size as u64,
            Some(sec.raw_offset as u64),
            sec.raw_size as u64,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_minimal_pe() -> Vec<u8> {
        let mut data = vec![0u8; 0x40 + 4];
        data[0..2].copy_from_slice(b"MZ");
        data[0x3c..0x40].copy_from_slice(&(0x40u32).to_le_bytes());
        data[0x40..0x44].copy_from_slice(b"PE\0\0");

        let mut coff = Vec::new();
        coff.extend_from_slice(&0x8664u16.to_le_bytes()); // machine
        coff.extend_from_slice(&1u16.to_le_bytes()); // num sections
        coff.extend_from_slice(&0u32.to_le_bytes());
        coff.extend_from_slice(&0u32.to_le_bytes());
        coff.extend_from_slice(&0u32.to_le_bytes());
        coff.extend_from_slice(&0u16.to_le_bytes()); // opt header size = 0
        coff.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&coff);

        let mut section = Vec::new();
        section.extend_from_slice(b".text\0\0\0");
        section.extend_from_slice(&0x1000u32.to_le_bytes()); // virtual size
        section.extend_from_slice(&0x1000u32.to_le_bytes()); // virtual address
        section.extend_from_slice(&0x200u32.to_le_bytes()); // raw size
        section.extend_from_slice(&0x400u32.to_le_bytes()); // raw offset
        section.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&section);
        data
    }

    #[test]
    fn reads_one_section() {
        let data = build_minimal_pe();
        let sections = read_sections(&data).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, ".text");
        assert_eq!(sections[0].virtual_address, 0x1000);
    }
}

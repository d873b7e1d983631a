//! Compile-unit headers (spec.md §4.5: "parses version, unit length
//! (32/64-bit variant switch on 0xffffffff), address size, unit type for
//! v5 ... and per-CU bases").

use crate::cursor::{Cursor, Endian};
use crate::error::{Error, Result};

pub const DW_UT_COMPILE: u8 = 0x01;
pub const DW_UT_SKELETON: u8 = 0x04;
pub const DW_UT_SPLIT_COMPILE: u8 = 0x05;
pub const DW_UT_TYPE: u8 = 0x02;
pub const DW_UT_SPLIT_TYPE: u8 = 0x06;

#[derive(Clone, Copy, Debug)]
pub struct CuHeader {
    /// Offset, within `.debug_info`, of this CU's header.
    pub offset: usize,
    /// Offset of the first DIE following the header.
    pub die_offset: usize,
    /// Offset one past the end of this CU.
    pub end_offset: usize,
    pub version: u16,
    pub is64: bool,
    pub address_size: u8,
    pub abbrev_offset: u64,
    pub unit_type: u8,
    pub addr_base: u64,
    pub str_offsets_base: u64,
    pub range_lists_base: u64,
}

impl CuHeader {
    /// Parses one CU header at `offset` in `.debug_info`. Does not resolve
    /// `addr_base`/`str_offsets_base`/`range_lists_base` — those are only
    /// known once the root DIE's attributes (`DW_AT_addr_base` etc.) are
    /// read, so callers patch them in afterward via `with_bases`.
    pub fn parse(debug_info: &[u8], offset: usize) -> Result<CuHeader> {
        let mut c = Cursor::at(debug_info, offset, Endian::Little);
        let initial_length = c.u32()?;
        let (is64, unit_length) = if initial_length == 0xffff_ffff {
            (true, c.u64()?)
        } else {
            (false, initial_length as u64)
        };
        let end_offset = c.pos + unit_length as usize;

        let version = c.u16()?;
        let (unit_type, address_size, abbrev_offset) = if version >= 5 {
            let unit_type = c.u8()?;
            let address_size = c.u8()?;
            let abbrev_offset = c.uword(is64)?;
            (unit_type, address_size, abbrev_offset)
        } else {
            let abbrev_offset = c.uword(is64)?;
            let address_size = c.u8()?;
            (DW_UT_COMPILE, address_size, abbrev_offset)
        };

        if version < 2 || version > 5 {
            return Err(Error::malformed("CuHeader::parse", "unsupported DWARF version"));
        }

        Ok(CuHeader {
            offset,
            die_offset: c.pos,
            end_offset,
            version,
            is64,
            address_size,
            abbrev_offset,
            unit_type,
            addr_base: 0,
            str_offsets_base: 0,
            range_lists_base: 0,
        })
    }

    pub fn with_bases(mut self, addr_base: u64, str_offsets_base: u64, range_lists_base: u64) -> Self {
        self.addr_base = addr_base;
        self.str_offsets_base = str_offsets_base;
        self.range_lists_base = range_lists_base;
        self
    }
}

/// Iterates CU headers across the whole `.debug_info` section.
pub fn iter_cus(debug_info: &[u8]) -> impl Iterator<Item = Result<CuHeader>> + '_ {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        if offset >= debug_info.len() {
            return None;
        }
        match CuHeader::parse(debug_info, offset) {
            Ok(cu) => {
                offset = cu.end_offset;
                Some(Ok(cu))
            }
            Err(e) => {
                offset = debug_info.len();
                Some(Err(e))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_cu() -> Vec<u8> {
        let mut data = Vec::new();
        // placeholder length, patched below
        data.extend_from_slice(&0u32.to_le_bytes());
        let body_start = data.len();
        data.extend_from_slice(&4u16.to_le_bytes()); // version 4
        data.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
        data.push(8); // address size
        data.push(0x01); // one DIE byte (abbrev code 1)
        let body_len = (data.len() - body_start) as u32;
        data[0..4].copy_from_slice(&body_len.to_le_bytes());
        data
    }

    #[test]
    fn parses_dwarf4_header() {
        let data = v4_cu();
        let cu = CuHeader::parse(&data, 0).unwrap();
        assert_eq!(cu.version, 4);
        assert_eq!(cu.address_size, 8);
        assert_eq!(cu.unit_type, DW_UT_COMPILE);
        assert_eq!(cu.end_offset, data.len());
    }

    fn v5_cu() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes());
        let body_start = data.len();
        data.extend_from_slice(&5u16.to_le_bytes()); // version 5
        data.push(DW_UT_COMPILE); // unit_type
        data.push(8); // address size
        data.extend_from_slice(&0u32.to_le_bytes()); // abbrev offset
        data.push(0x01);
        let body_len = (data.len() - body_start) as u32;
        data[0..4].copy_from_slice(&body_len.to_le_bytes());
        data
    }

    #[test]
    fn parses_dwarf5_header_field_order() {
        let data = v5_cu();
        let cu = CuHeader::parse(&data, 0).unwrap();
        assert_eq!(cu.version, 5);
        assert_eq!(cu.unit_type, DW_UT_COMPILE);
        assert_eq!(cu.address_size, 8);
    }

    #[test]
    fn iter_cus_walks_multiple_units() {
        let mut data = v4_cu();
        data.extend(v4_cu());
        let cus: Vec<_> = iter_cus(&data).collect::<Result<_>>().unwrap();
        assert_eq!(cus.len(), 2);
    }
}

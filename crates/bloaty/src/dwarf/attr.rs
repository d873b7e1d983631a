//! `DW_FORM_*` attribute-value dispatch (spec.md §4.5 "ParseAttr").
//!
//! Unresolved `strx`/`addrx` values are returned as raw indices
//! (`AttrValue::StrIndex`/`AddrIndex`) since resolving them requires the
//! CU's `str_offsets_base`/`addr_base`, which aren't known until the root
//! DIE has been read — callers resolve lazily via `resolve_strx`/
//! `resolve_addrx`.

use crate::cursor::{Cursor, Endian};
use crate::dwarf::abbrev::AttrSpec;
use crate::dwarf::cu::CuHeader;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue<'a> {
    U64(u64),
    I64(i64),
    Str(&'a str),
    StrIndex(u64),
    AddrIndex(u64),
    Block(&'a [u8]),
    Flag(bool),
    SecOffset(u64),
    Ref(u64),
}

impl<'a> AttrValue<'a> {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::U64(n) | AttrValue::SecOffset(n) | AttrValue::Ref(n) => Some(*n),
            AttrValue::I64(n) => Some(*n as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

// A representative subset of DW_FORM_* constants; every value §4.5 lists
// dispatches below.
const DW_FORM_ADDR: u64 = 0x01;
const DW_FORM_BLOCK2: u64 = 0x03;
const DW_FORM_BLOCK4: u64 = 0x04;
const DW_FORM_DATA2: u64 = 0x05;
const DW_FORM_DATA4: u64 = 0x06;
const DW_FORM_DATA8: u64 = 0x07;
const DW_FORM_STRING: u64 = 0x08;
const DW_FORM_BLOCK: u64 = 0x09;
const DW_FORM_BLOCK1: u64 = 0x0a;
const DW_FORM_DATA1: u64 = 0x0b;
const DW_FORM_FLAG: u64 = 0x0c;
const DW_FORM_SDATA: u64 = 0x0d;
const DW_FORM_STRP: u64 = 0x0e;
const DW_FORM_UDATA: u64 = 0x0f;
const DW_FORM_REF_ADDR: u64 = 0x10;
const DW_FORM_REF1: u64 = 0x11;
const DW_FORM_REF2: u64 = 0x12;
const DW_FORM_REF4: u64 = 0x13;
const DW_FORM_REF8: u64 = 0x14;
const DW_FORM_REF_UDATA: u64 = 0x15;
const DW_FORM_INDIRECT: u64 = 0x16;
const DW_FORM_SEC_OFFSET: u64 = 0x17;
const DW_FORM_EXPRLOC: u64 = 0x18;
const DW_FORM_FLAG_PRESENT: u64 = 0x19;
const DW_FORM_STRX: u64 = 0x1a;
const DW_FORM_ADDRX: u64 = 0x1b;
const DW_FORM_REF_SUP4: u64 = 0x1c;
const DW_FORM_STRP_SUP: u64 = 0x1d;
const DW_FORM_DATA16: u64 = 0x1e;
const DW_FORM_LINE_STRP: u64 = 0x1f;
const DW_FORM_REF_SIG8: u64 = 0x20;
const DW_FORM_IMPLICIT_CONST: u64 = 0x21;
const DW_FORM_LOCLISTX: u64 = 0x22;
const DW_FORM_RNGLISTX: u64 = 0x23;
const DW_FORM_STRX1: u64 = 0x25;
const DW_FORM_STRX2: u64 = 0x26;
const DW_FORM_STRX3: u64 = 0x27;
const DW_FORM_STRX4: u64 = 0x28;
const DW_FORM_ADDRX1: u64 = 0x29;
const DW_FORM_ADDRX2: u64 = 0x2a;
const DW_FORM_ADDRX3: u64 = 0x2b;
const DW_FORM_ADDRX4: u64 = 0x2c;

/// Parses the value for `spec`, advancing `cursor` past it.
pub fn parse_attr<'a>(
    cursor: &mut Cursor<'a>,
    spec: &AttrSpec,
    cu: &CuHeader,
    debug_str: &'a [u8],
    debug_line_str: &'a [u8],
) -> Result<AttrValue<'a>> {
    if let Some(v) = spec.implicit_const {
        return Ok(AttrValue::I64(v));
    }
    Ok(match spec.form {
        DW_FORM_ADDR => AttrValue::U64(cursor.uword(cu.address_size == 8)?),
        DW_FORM_BLOCK2 => {
            let len = cursor.u16()? as usize;
            AttrValue::Block(cursor.bytes(len)?)
        }
        DW_FORM_BLOCK4 => {
            let len = cursor.u32()? as usize;
            AttrValue::Block(cursor.bytes(len)?)
        }
        DW_FORM_DATA2 => AttrValue::U64(cursor.u16()? as u64),
        DW_FORM_DATA4 => AttrValue::U64(cursor.u32()? as u64),
        DW_FORM_DATA8 => AttrValue::U64(cursor.u64()?),
        DW_FORM_DATA16 => AttrValue::Block(cursor.bytes(16)?),
        DW_FORM_STRING => AttrValue::Str(cursor.cstr()?),
        DW_FORM_BLOCK => {
            let len = cursor.uleb128()? as usize;
            AttrValue::Block(cursor.bytes(len)?)
        }
        DW_FORM_BLOCK1 => {
            let len = cursor.u8()? as usize;
            AttrValue::Block(cursor.bytes(len)?)
        }
        DW_FORM_DATA1 => AttrValue::U64(cursor.u8()? as u64),
        DW_FORM_FLAG => AttrValue::Flag(cursor.u8()? != 0),
        DW_FORM_SDATA => AttrValue::I64(cursor.sleb128()?),
        DW_FORM_STRP => {
            let off = cursor.uword(cu.is64)?;
            AttrValue::Str(crate::cursor::cstr_at(debug_str, off as usize)?)
        }
        DW_FORM_LINE_STRP => {
            let off = cursor.uword(cu.is64)?;
            AttrValue::Str(crate::cursor::cstr_at(debug_line_str, off as usize)?)
        }
        DW_FORM_UDATA => AttrValue::U64(cursor.uleb128()?),
        DW_FORM_REF_ADDR => AttrValue::Ref(cursor.uword(cu.is64)?),
        DW_FORM_REF1 => AttrValue::Ref(cursor.u8()? as u64),
        DW_FORM_REF2 => AttrValue::Ref(cursor.u16()? as u64),
        DW_FORM_REF4 => AttrValue::Ref(cursor.u32()? as u64),
        DW_FORM_REF8 | DW_FORM_REF_SIG8 => AttrValue::Ref(cursor.u64()?),
        DW_FORM_REF_SUP4 => AttrValue::Ref(cursor.u32()? as u64),
        DW_FORM_REF_UDATA => AttrValue::Ref(cursor.uleb128()?),
        DW_FORM_INDIRECT => {
            let real_form = cursor.uleb128()?;
            let real_spec = AttrSpec {
                attr: spec.attr,
                form: real_form,
                implicit_const: None,
            };
            return parse_attr(cursor, &real_spec, cu, debug_str, debug_line_str);
        }
        DW_FORM_SEC_OFFSET => AttrValue::SecOffset(cursor.uword(cu.is64)?),
        DW_FORM_EXPRLOC => {
            let len = cursor.uleb128()? as usize;
            AttrValue::Block(cursor.bytes(len)?)
        }
        DW_FORM_FLAG_PRESENT => AttrValue::Flag(true),
        DW_FORM_STRX => AttrValue::StrIndex(cursor.uleb128()?),
        DW_FORM_STRX1 => AttrValue::StrIndex(cursor.u8()? as u64),
        DW_FORM_STRX2 => AttrValue::StrIndex(cursor.u16()? as u64),
        DW_FORM_STRX3 => {
            let b = cursor.bytes(3)?;
            AttrValue::StrIndex(u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64)
        }
        DW_FORM_STRX4 => AttrValue::StrIndex(cursor.u32()? as u64),
        DW_FORM_ADDRX => AttrValue::AddrIndex(cursor.uleb128()?),
        DW_FORM_ADDRX1 => AttrValue::AddrIndex(cursor.u8()? as u64),
        DW_FORM_ADDRX2 => AttrValue::AddrIndex(cursor.u16()? as u64),
        DW_FORM_ADDRX3 => {
            let b = cursor.bytes(3)?;
            AttrValue::AddrIndex(u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64)
        }
        DW_FORM_ADDRX4 => AttrValue::AddrIndex(cursor.u32()? as u64),
        DW_FORM_STRP_SUP => AttrValue::SecOffset(cursor.uword(cu.is64)?),
        DW_FORM_LOCLISTX | DW_FORM_RNGLISTX => AttrValue::U64(cursor.uleb128()?),
        DW_FORM_IMPLICIT_CONST => unreachable!("handled above via spec.implicit_const"),
        other => {
            return Err(Error::malformed(
                "parse_attr",
                format!("unsupported DW_FORM 0x{other:x}"),
            ))
        }
    })
}

/// Resolves a `DW_FORM_strx*` index against `.debug_str_offsets`, once
/// `cu.str_offsets_base` is known.
pub fn resolve_strx(
    cu: &CuHeader,
    debug_str_offsets: &[u8],
    debug_str: &[u8],
    index: u64,
) -> Result<String> {
    let entry_size = if cu.is64 { 8 } else { 4 };
    let pos = cu.str_offsets_base as usize + index as usize * entry_size;
    let mut c = Cursor::at(debug_str_offsets, pos, Endian::Little);
    let off = c.uword(cu.is64)?;
    crate::cursor::cstr_at(debug_str, off as usize).map(|s| s.to_string())
}

/// Resolves a `DW_FORM_addrx*` index against `.debug_addr`, once
/// `cu.addr_base` is known.
pub fn resolve_addrx(cu: &CuHeader, debug_addr: &[u8], index: u64) -> Result<u64> {
    let entry_size = cu.address_size as usize;
    let pos = cu.addr_base as usize + index as usize * entry_size;
    let mut c = Cursor::at(debug_addr, pos, Endian::Little);
    c.uword(entry_size == 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::abbrev::AttrSpec;

    fn cu32() -> CuHeader {
        CuHeader {
            offset: 0,
            die_offset: 0,
            end_offset: 0,
            version: 4,
            is64: false,
            address_size: 8,
            abbrev_offset: 0,
            unit_type: 0,
            addr_base: 0,
            str_offsets_base: 0,
            range_lists_base: 0,
        }
    }

    #[test]
    fn data4_form_reads_four_bytes() {
        let data = 0x11223344u32.to_le_bytes();
        let mut c = Cursor::new(&data, Endian::Little);
        let spec = AttrSpec {
            attr: 0,
            form: DW_FORM_DATA4,
            implicit_const: None,
        };
        let v = parse_attr(&mut c, &spec, &cu32(), &[], &[]).unwrap();
        assert_eq!(v.as_u64(), Some(0x11223344));
    }

    #[test]
    fn strp_form_reads_through_debug_str() {
        let debug_str = b"hello\0world\0";
        let offset = 6u32.to_le_bytes();
        let mut c = Cursor::new(&offset, Endian::Little);
        let spec = AttrSpec {
            attr: 0,
            form: DW_FORM_STRP,
            implicit_const: None,
        };
        let v = parse_attr(&mut c, &spec, &cu32(), debug_str, &[]).unwrap();
        assert_eq!(v.as_str(), Some("world"));
    }

    #[test]
    fn flag_present_consumes_nothing() {
        let data: [u8; 0] = [];
        let mut c = Cursor::new(&data, Endian::Little);
        let spec = AttrSpec {
            attr: 0,
            form: DW_FORM_FLAG_PRESENT,
            implicit_const: None,
        };
        let v = parse_attr(&mut c, &spec, &cu32(), &[], &[]).unwrap();
        assert_eq!(v, AttrValue::Flag(true));
    }
}

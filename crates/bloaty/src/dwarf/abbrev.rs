//! `.debug_abbrev` tables (spec.md §4.5): one table per CU offset, parsed
//! lazily and cached since many CUs in a single module share the same
//! table.

use std::collections::HashMap;

use crate::cursor::{Cursor, Endian};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttrSpec {
    pub attr: u64,
    pub form: u64,
    pub implicit_const: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct AbbrevDecl {
    pub code: u64,
    pub tag: u64,
    pub has_children: bool,
    pub attrs: Vec<AttrSpec>,
}

#[derive(Clone, Debug, Default)]
pub struct AbbrevTable {
    by_code: HashMap<u64, AbbrevDecl>,
}

impl AbbrevTable {
    pub fn get(&self, code: u64) -> Option<&AbbrevDecl> {
        self.by_code.get(&code)
    }

    /// Parses the table starting at `offset` in `.debug_abbrev`, reading
    /// until the terminating zero-code entry.
    pub fn parse(debug_abbrev: &[u8], offset: usize) -> Result<AbbrevTable> {
        let mut c = Cursor::at(debug_abbrev, offset, Endian::Little);
        let mut by_code = HashMap::new();
        loop {
            let code = c.uleb128()?;
            if code == 0 {
                break;
            }
            let tag = c.uleb128()?;
            let has_children = c.u8()? != 0;
            let mut attrs = Vec::new();
            loop {
                let attr = c.uleb128()?;
                let form = c.uleb128()?;
                if attr == 0 && form == 0 {
                    break;
                }
                let implicit_const = if form == DW_FORM_IMPLICIT_CONST {
                    Some(c.sleb128()?)
                } else {
                    None
                };
                attrs.push(AttrSpec {
                    attr,
                    form,
                    implicit_const,
                });
            }
            by_code.insert(
                code,
                AbbrevDecl {
                    code,
                    tag,
                    has_children,
                    attrs,
                },
            );
        }
        Ok(AbbrevTable { by_code })
    }
}

pub const DW_FORM_IMPLICIT_CONST: u64 = 0x21;

pub const DW_TAG_COMPILE_UNIT: u64 = 0x11;
pub const DW_TAG_SUBPROGRAM: u64 = 0x2e;
pub const DW_TAG_INLINED_SUBROUTINE: u64 = 0x1d;

pub const DW_AT_NAME: u64 = 0x03;
pub const DW_AT_LOW_PC: u64 = 0x11;
pub const DW_AT_HIGH_PC: u64 = 0x12;
pub const DW_AT_LINKAGE_NAME: u64 = 0x6e;
pub const DW_AT_ABSTRACT_ORIGIN: u64 = 0x31;
pub const DW_AT_CALL_FILE: u64 = 0x58;
pub const DW_AT_CALL_LINE: u64 = 0x59;
pub const DW_AT_STMT_LIST: u64 = 0x10;

pub fn require_decl(table: &AbbrevTable, code: u64) -> Result<&AbbrevDecl> {
    table
        .get(code)
        .ok_or_else(|| Error::malformed("AbbrevTable::get", "unknown abbreviation code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_decl_with_attrs() {
        // code=1, tag=DW_TAG_compile_unit(0x11), has_children=1,
        // attr DW_AT_name(0x03)/DW_FORM_string(0x08), terminator, table terminator.
        let data = [
            0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, 0x00,
        ];
        let table = AbbrevTable::parse(&data, 0).unwrap();
        let decl = table.get(1).unwrap();
        assert_eq!(decl.tag, DW_TAG_COMPILE_UNIT);
        assert!(decl.has_children);
        assert_eq!(decl.attrs.len(), 1);
        assert_eq!(decl.attrs[0].attr, DW_AT_NAME);
    }

    #[test]
    fn implicit_const_form_reads_sleb_value() {
        let mut data = vec![0x01, 0x2e, 0x00, 0x03, DW_FORM_IMPLICIT_CONST as u8];
        data.push(0x05); // sleb128(5)
        data.extend_from_slice(&[0x00, 0x00, 0x00]);
        let table = AbbrevTable::parse(&data, 0).unwrap();
        let decl = table.get(1).unwrap();
        assert_eq!(decl.attrs[0].implicit_const, Some(5));
    }
}

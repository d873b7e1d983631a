//! `.debug_aranges`: direct VM-range → CU-offset table, authoritative for
//! compile-unit attribution when present (spec.md §4.5).

use crate::cursor::{Cursor, Endian};
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArangesEntry {
    pub cu_offset: u64,
    pub start: u64,
    pub length: u64,
}

/// Parses every set in `.debug_aranges`, each describing the address
/// ranges belonging to one compile unit (`debug_info_offset` in the set
/// header).
pub fn parse(debug_aranges: &[u8]) -> Result<Vec<ArangesEntry>> {
    let mut out = Vec::new();
    let mut c = Cursor::new(debug_aranges, Endian::Little);

    while c.remaining() > 0 {
        let set_start = c.pos;
        let initial_length = c.u32()?;
        let (is64, unit_length) = if initial_length == 0xffff_ffff {
            (true, c.u64()?)
        } else {
            (false, initial_length as u64)
        };
        let set_end = c.pos + unit_length as usize;

        let _version = c.u16()?;
        let cu_offset = c.uword(is64)?;
        let address_size = c.u8()?;
        let _segment_selector_size = c.u8()?;

        // Tuples are aligned to a multiple of 2 * address_size from the
        // start of the set (DWARF5 §6.1.2): pad to that boundary.
        let tuple_size = 2 * address_size as usize;
        if tuple_size > 0 {
            let header_len = c.pos - set_start;
            let pad = (tuple_size - header_len % tuple_size) % tuple_size;
            c.seek(c.pos + pad);
        }

        loop {
            let start = c.uword(address_size == 8)?;
            let length = c.uword(address_size == 8)?;
            if start == 0 && length == 0 {
                break;
            }
            out.push(ArangesEntry {
                cu_offset,
                start,
                length,
            });
        }
        c.seek(set_end);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_set(cu_offset: u32, entries: &[(u64, u64)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes()); // version
        body.extend_from_slice(&cu_offset.to_le_bytes()); // cu offset (32-bit)
        body.push(8); // address size
        body.push(0); // segment selector size
        // header so far = 2+4+1+1 = 8, tuple_size = 16, already aligned
        for (start, len) in entries {
            body.extend_from_slice(&start.to_le_bytes());
            body.extend_from_slice(&len.to_le_bytes());
        }
        body.extend_from_slice(&0u64.to_le_bytes());
        body.extend_from_slice(&0u64.to_le_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_one_set_with_two_tuples() {
        let data = build_set(0x40, &[(0x1000, 0x10), (0x2000, 0x20)]);
        let entries = parse(&data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ArangesEntry { cu_offset: 0x40, start: 0x1000, length: 0x10 });
        assert_eq!(entries[1].start, 0x2000);
    }
}

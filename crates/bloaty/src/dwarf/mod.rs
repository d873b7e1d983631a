//! DWARF 2–5 debug-info reader (spec.md §4.5): `compileunits` and
//! `inlines` data sources, built from `.debug_abbrev`/`.debug_info`/
//! `.debug_aranges`/`.debug_line`.

pub mod abbrev;
pub mod aranges;
pub mod attr;
pub mod cu;
pub mod line;

use std::collections::HashMap;

use crate::cursor::{Cursor, Endian};
use crate::error::Result;
use crate::sink::RangeSink;

use abbrev::{
    AbbrevTable, DW_AT_HIGH_PC, DW_AT_LINKAGE_NAME, DW_AT_LOW_PC, DW_AT_NAME, DW_AT_STMT_LIST,
    DW_TAG_SUBPROGRAM,
};
use attr::{parse_attr, AttrValue};
use cu::CuHeader;

/// Maps a mangled/linkage name to its `(address, size)` from the symbol
/// table, for compile units whose DIEs carry `DW_AT_linkage_name` but no
/// `DW_AT_low_pc`/`DW_AT_high_pc` of their own (spec.md §4.5, cross
/// reference against the object's symbol table).
#[derive(Default)]
pub struct SymbolTable<'a> {
    by_name: HashMap<&'a str, (u64, u64)>,
}

impl<'a> SymbolTable<'a> {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (&'a str, u64, u64)>) -> Self {
        Self {
            by_name: pairs.into_iter().map(|(n, a, s)| (n, (a, s))).collect(),
        }
    }

    pub fn find(&self, name: &str) -> Option<(u64, u64)> {
        self.by_name.get(name).copied()
    }
}

/// Every section the DWARF reader draws from, borrowed from whatever
/// front-end (ELF/Mach-O) located them (spec.md §4.5; `__zdebug_*`
/// sections are decompressed by the caller before being passed in here).
#[derive(Clone, Copy, Default)]
pub struct DwarfSections<'a> {
    pub debug_info: &'a [u8],
    pub debug_abbrev: &'a [u8],
    pub debug_str: &'a [u8],
    pub debug_line: &'a [u8],
    pub debug_line_str: &'a [u8],
    pub debug_aranges: &'a [u8],
}

/// One DIE's attributes relevant to compile-unit/inline attribution. The
/// root DIE (`DW_TAG_compile_unit`) is always `dies[0]`.
struct DieInfo {
    tag: u64,
    name: Option<String>,
    linkage_name: Option<String>,
    low_pc: Option<u64>,
    high_pc: Option<u64>,
    stmt_list: Option<u64>,
}

/// Walks every DIE in a CU (spec.md §4.5: "walk all DIEs in a CU, not
/// just the root"), decoding the handful of attributes compile-unit and
/// inline attribution need from each.
fn walk_cu_dies(sections: &DwarfSections, cu: &CuHeader, abbrev: &AbbrevTable) -> Result<Vec<DieInfo>> {
    let mut c = Cursor::at(sections.debug_info, cu.die_offset, Endian::Little);
    let mut dies = Vec::new();

    while c.pos < cu.end_offset {
        let code = c.uleb128()?;
        if code == 0 {
            continue;
        }
        let decl = match abbrev.get(code) {
            Some(d) => d,
            None => break,
        };

        let mut name = None;
        let mut linkage_name = None;
        let mut low_pc = None;
        let mut high_pc_raw: Option<AttrValue> = None;
        let mut stmt_list = None;

        for spec in &decl.attrs {
            let value = parse_attr(&mut c, spec, cu, sections.debug_str, sections.debug_line_str)?;
            match spec.attr {
                DW_AT_NAME => name = value.as_str().map(|s| s.to_string()),
                DW_AT_LINKAGE_NAME => linkage_name = value.as_str().map(|s| s.to_string()),
                DW_AT_LOW_PC => low_pc = value.as_u64(),
                DW_AT_HIGH_PC => high_pc_raw = Some(value),
                DW_AT_STMT_LIST => stmt_list = value.as_u64(),
                _ => {}
            }
        }

        // DW_AT_high_pc may be a true address (DW_FORM_addr) or an offset
        // from low_pc (any constant form) — spec.md §4.5 "which may be
        // offset-form".
        let high_pc = resolve_high_pc(low_pc, high_pc_raw);

        dies.push(DieInfo {
            tag: decl.tag,
            name,
            linkage_name,
            low_pc,
            high_pc,
            stmt_list,
        });
    }
    Ok(dies)
}

/// Walks every CU in `.debug_info`, preferring `.debug_aranges` for
/// compile-unit VM-range attribution when present and falling back to
/// the CU's DIEs otherwise: the root DIE's own `DW_AT_low_pc`/
/// `DW_AT_high_pc` if set, else the union of every `DW_TAG_subprogram`
/// child's range, cross-referencing `symtab` for subprograms that carry
/// only a `DW_AT_linkage_name` (spec.md §4.5, §9 Open Question:
/// "`.debug_aranges` is authoritative when present").
pub fn populate_compile_units(
    sections: &DwarfSections,
    symtab: &SymbolTable,
    sink: &mut RangeSink,
) -> Result<()> {
    let aranges = if sections.debug_aranges.is_empty() {
        Vec::new()
    } else {
        aranges::parse(sections.debug_aranges)?
    };

    let mut abbrev_cache: HashMap<u64, AbbrevTable> = HashMap::new();

    for cu_result in cu::iter_cus(sections.debug_info) {
        let cu = cu_result?;
        let abbrev = abbrev_cache
            .entry(cu.abbrev_offset)
            .or_insert(AbbrevTable::parse(sections.debug_abbrev, cu.abbrev_offset as usize)?);

        let dies = walk_cu_dies(sections, &cu, abbrev)?;
        let Some(root) = dies.first() else { continue };
        let name = root
            .name
            .clone()
            .unwrap_or_else(|| format!("[CU at offset {:#x}]", cu.offset));

        let matching: Vec<&aranges::ArangesEntry> = aranges
            .iter()
            .filter(|e| e.cu_offset as usize == cu.offset)
            .collect();

        if !matching.is_empty() {
            for entry in matching {
                sink.add_vm_range(entry.start, entry.length, &name)?;
            }
        } else if let (Some(low), Some(high)) = (root.low_pc, root.high_pc) {
            sink.add_vm_range(low, high.saturating_sub(low), &name)?;
        } else {
            for die in dies.iter().skip(1).filter(|d| d.tag == DW_TAG_SUBPROGRAM) {
                if let (Some(low), Some(high)) = (die.low_pc, die.high_pc) {
                    sink.add_vm_range(low, high.saturating_sub(low), &name)?;
                } else if let Some(linkage) = &die.linkage_name {
                    if let Some((addr, size)) = symtab.find(linkage) {
                        sink.add_vm_range(addr, size, &name)?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Drives `.debug_line`'s state machine off each CU's `DW_AT_stmt_list`
/// and emits one range per contiguous `(file[:line])` run, labeled
/// `<dir>/<file>[:line]` (spec.md §4.5, "inlines" data source).
pub fn populate_inlines(sections: &DwarfSections, sink: &mut RangeSink) -> Result<()> {
    let mut abbrev_cache: HashMap<u64, AbbrevTable> = HashMap::new();

    for cu_result in cu::iter_cus(sections.debug_info) {
        let cu = cu_result?;
        let abbrev = abbrev_cache
            .entry(cu.abbrev_offset)
            .or_insert(AbbrevTable::parse(sections.debug_abbrev, cu.abbrev_offset as usize)?);

        let dies = walk_cu_dies(sections, &cu, abbrev)?;
        let Some(stmt_list) = dies.first().and_then(|d| d.stmt_list) else {
            continue;
        };

        let header = line::parse_header(
            sections.debug_line,
            stmt_list as usize,
            sections.debug_str,
            sections.debug_line_str,
        )?;
        for run in line::run_program(sections.debug_line, &header)? {
            let path = line::file_path(&header, run.file);
            let label = if run.line > 0 {
                format!("{path}:{}", run.line)
            } else {
                path
            };
            sink.add_vm_range(run.address, run.end_address - run.address, &label)?;
        }
    }
    Ok(())
}

fn resolve_high_pc(low_pc: Option<u64>, high_pc_raw: Option<AttrValue>) -> Option<u64> {
    match (low_pc, high_pc_raw) {
        (Some(low), Some(val)) => val.as_u64().map(|n| if n > low { n } else { low + n }),
        _ => None,
    }
}

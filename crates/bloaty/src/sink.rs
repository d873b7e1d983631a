use std::io::Read;

use rangemap_core::{Address, RangeMap, Size};

use crate::dualmap::DualMap;
use crate::error::{Error, Result};
use crate::munger::NameMunger;

/// One named level in the rollup hierarchy (spec.md §6 "Built-in data
/// sources"). Custom sources (§6 "Custom data sources") carry their own
/// name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataSource {
    Segments,
    Sections,
    Symbols,
    RawSymbols,
    ShortSymbols,
    FullSymbols,
    ArMembers,
    CompileUnits,
    Inlines,
    InputFiles,
    Custom(String),
}

impl DataSource {
    pub fn parse(name: &str) -> Option<DataSource> {
        Some(match name {
            "segments" => DataSource::Segments,
            "sections" => DataSource::Sections,
            "symbols" => DataSource::Symbols,
            "rawsymbols" => DataSource::RawSymbols,
            "shortsymbols" => DataSource::ShortSymbols,
            "fullsymbols" => DataSource::FullSymbols,
            "armembers" => DataSource::ArMembers,
            "compileunits" => DataSource::CompileUnits,
            "inlines" => DataSource::Inlines,
            "inputfiles" => DataSource::InputFiles,
            _ => return None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            DataSource::Segments => "segments",
            DataSource::Sections => "sections",
            DataSource::Symbols => "symbols",
            DataSource::RawSymbols => "rawsymbols",
            DataSource::ShortSymbols => "shortsymbols",
            DataSource::FullSymbols => "fullsymbols",
            DataSource::ArMembers => "armembers",
            DataSource::CompileUnits => "compileunits",
            DataSource::Inlines => "inlines",
            DataSource::InputFiles => "inputfiles",
            DataSource::Custom(name) => name,
        }
    }

    /// Symbols-family sources require a symbol table; compile-unit/inline
    /// sources require DWARF info. Neither exists in a plain object file
    /// the way segments/sections do (spec.md §8 scenario 1).
    pub fn requires_debug_info(&self) -> bool {
        matches!(self, DataSource::CompileUnits | DataSource::Inlines)
    }
}

/// One output a `RangeSink` writes into: a `DualMap` plus the
/// `NameMunger` that rewrites labels before they're inserted (spec.md
/// §4.2).
pub struct SinkOutput<'a> {
    pub map: &'a mut DualMap,
    pub munger: &'a NameMunger,
}

/// The write-side façade binary front-ends push labeled ranges into.
/// Owns the input file bytes, the active data source, an optional
/// translator `DualMap` (the base map, for everything but base-map
/// construction itself), and the output maps to fan out into.
pub struct RangeSink<'a> {
    data: &'a [u8],
    source: DataSource,
    translator: Option<&'a DualMap>,
    outputs: Vec<SinkOutput<'a>>,
}

impl<'a> RangeSink<'a> {
    pub fn new(
        data: &'a [u8],
        source: DataSource,
        translator: Option<&'a DualMap>,
        outputs: Vec<SinkOutput<'a>>,
    ) -> Self {
        Self {
            data,
            source,
            translator,
            outputs,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn data_source(&self) -> &DataSource {
        &self.source
    }

    fn translator(&self, context: &'static str) -> Result<&'a DualMap> {
        self.translator
            .ok_or_else(|| Error::semantic(context, "sink has no translator bound"))
    }

    /// Inserts into the base map only: the common entry point used while
    /// populating the base `DualMap` itself (no translator, no munging).
    pub fn add_range(
        &mut self,
        label: &str,
        vmaddr: Option<Address>,
        vmsize: u64,
        fileoff: Option<Address>,
        filesize: u64,
    ) -> Result<()> {
        for out in &mut self.outputs {
            let munged = out.munger.apply(label);
            out.map.add_range(&munged, vmaddr, vmsize, fileoff, filesize)?;
        }
        Ok(())
    }

    /// Inserts into `vm_map` directly, and into `file_map` via the
    /// translator (vm → file).
    pub fn add_vm_range(&mut self, vmaddr: Address, vmsize: u64, label: &str) -> Result<()> {
        self.add_vm_range_impl(vmaddr, vmsize, label, DuplicatePolicy::Warn)
    }

    pub fn add_vm_range_ignore_duplicate(
        &mut self,
        vmaddr: Address,
        vmsize: u64,
        label: &str,
    ) -> Result<()> {
        self.add_vm_range_impl(vmaddr, vmsize, label, DuplicatePolicy::Skip)
    }

    pub fn add_vm_range_allow_alias(
        &mut self,
        vmaddr: Address,
        vmsize: u64,
        label: &str,
    ) -> Result<()> {
        self.add_vm_range_impl(vmaddr, vmsize, label, DuplicatePolicy::Silent)
    }

    fn add_vm_range_impl(
        &mut self,
        vmaddr: Address,
        vmsize: u64,
        label: &str,
        policy: DuplicatePolicy,
    ) -> Result<()> {
        let translator = self.translator;
        for out in &mut self.outputs {
            if policy == DuplicatePolicy::Skip && out.map.vm_map.covers_range(vmaddr, vmsize) {
                continue;
            }
            if policy == DuplicatePolicy::Warn
                && out.map.vm_map.try_get_label(vmaddr).is_some()
            {
                log::warn!("duplicate vm range at {vmaddr:#x}, keeping first-writer label");
            }
            let munged = out.munger.apply(label);
            out.map.vm_map.add_range(vmaddr, Size::Known(vmsize), &munged)?;
            if let Some(translator) = translator {
                let mut scratch = RangeMap::new();
                scratch.add_range_with_translation(
                    vmaddr,
                    vmsize,
                    &munged,
                    &translator.vm_map,
                    &mut out.map.file_map,
                )?;
            }
        }
        Ok(())
    }

    /// Inserts into `file_map` directly, and into `vm_map` via the
    /// translator (file → vm).
    pub fn add_file_range(&mut self, label: &str, fileoff: Address, filesize: u64) -> Result<()> {
        let translator = self.translator;
        for out in &mut self.outputs {
            let munged = out.munger.apply(label);
            out.map.file_map.add_range(fileoff, Size::Known(filesize), &munged)?;
            if let Some(translator) = translator {
                let mut scratch = RangeMap::new();
                scratch.add_range_with_translation(
                    fileoff,
                    filesize,
                    &munged,
                    &translator.file_map,
                    &mut out.map.vm_map,
                )?;
            }
        }
        Ok(())
    }

    /// Inserts `file_range` into both maps, with the label inherited
    /// from whatever the translator's `vm_map` calls `label_from_vmaddr`.
    pub fn add_file_range_for_vm_addr(
        &mut self,
        label_from_vmaddr: Address,
        file_range: (Address, u64),
    ) -> Result<()> {
        let translator = self.translator("RangeSink::add_file_range_for_vm_addr")?;
        let label = translator
            .vm_map
            .try_get_label(label_from_vmaddr)
            .unwrap_or("")
            .to_string();
        self.add_file_range(&label, file_range.0, file_range.1)
    }

    /// Like `add_file_range_for_vm_addr`, but the label comes from the
    /// translator's `file_map` entry covering `from_file_range`.
    pub fn add_file_range_for_file_range(
        &mut self,
        from_file_range: Address,
        file_range: (Address, u64),
    ) -> Result<()> {
        let translator = self.translator("RangeSink::add_file_range_for_file_range")?;
        let label = translator
            .file_map
            .try_get_label(from_file_range)
            .unwrap_or("")
            .to_string();
        self.add_file_range(&label, file_range.0, file_range.1)
    }

    /// Inserts `[addr, addr+size)` into both maps, with the label
    /// inherited from the translator's `vm_map` entry at
    /// `label_from_vmaddr` rather than at `addr` itself — used to group
    /// several VM ranges (e.g. inlined-line runs) under one canonical
    /// owning label.
    pub fn add_vm_range_for_vm_addr(
        &mut self,
        label_from_vmaddr: Address,
        addr: Address,
        size: u64,
    ) -> Result<()> {
        let translator = self.translator("RangeSink::add_vm_range_for_vm_addr")?;
        let label = translator
            .vm_map
            .try_get_label(label_from_vmaddr)
            .unwrap_or("")
            .to_string();
        self.add_vm_range(addr, size, &label)
    }

    /// Decompresses a zlib-compressed slice (e.g. Mach-O `__zdebug_*`
    /// sections), an external collaborator per spec.md §1.
    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = flate2::read::ZlibDecoder::new(compressed);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::resource("RangeSink::decompress", e.to_string()))?;
        Ok(out)
    }

    /// Computes the byte offset of `sub` within the sink's input data,
    /// for front-ends that hand around sub-slices instead of plain
    /// offsets.
    pub fn file_offset_of(&self, sub: &[u8]) -> usize {
        let base = self.data.as_ptr() as usize;
        let ptr = sub.as_ptr() as usize;
        ptr.saturating_sub(base)
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum DuplicatePolicy {
    Warn,
    Skip,
    Silent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_vm_range_translates_via_base_map() {
        let mut base = DualMap::new();
        base.add_range("seg", Some(0x1000), 0x100, Some(0x10), 0x100)
            .unwrap();

        let mut out_map = DualMap::new();
        let munger = NameMunger::new();
        {
            let mut sink = RangeSink::new(
                &[],
                DataSource::Symbols,
                Some(&base),
                vec![SinkOutput {
                    map: &mut out_map,
                    munger: &munger,
                }],
            );
            sink.add_vm_range(0x1000, 16, "func").unwrap();
        }
        assert_eq!(out_map.vm_map.try_get_label(0x1000), Some("func"));
        assert_eq!(out_map.file_map.try_get_label(0x10), Some("func"));
    }

    #[test]
    fn add_file_range_translates_via_base_map() {
        let mut base = DualMap::new();
        base.add_range("seg", Some(0x1000), 0x100, Some(0x10), 0x100)
            .unwrap();

        let mut out_map = DualMap::new();
        let munger = NameMunger::new();
        {
            let mut sink = RangeSink::new(
                &[],
                DataSource::Sections,
                Some(&base),
                vec![SinkOutput {
                    map: &mut out_map,
                    munger: &munger,
                }],
            );
            sink.add_file_range(".text", 0x10, 16).unwrap();
        }
        assert_eq!(out_map.file_map.try_get_label(0x10), Some(".text"));
        assert_eq!(out_map.vm_map.try_get_label(0x1000), Some(".text"));
    }

    #[test]
    fn name_munger_applies_before_insert() {
        let mut base = DualMap::new();
        base.add_range("seg", Some(0x1000), 0x10, Some(0x10), 0x10).unwrap();
        let mut out_map = DualMap::new();
        let munger = NameMunger::with_rule(r"^_Z\d+(\w+)", "$1").unwrap();
        {
            let mut sink = RangeSink::new(
                &[],
                DataSource::Symbols,
                Some(&base),
                vec![SinkOutput {
                    map: &mut out_map,
                    munger: &munger,
                }],
            );
            sink.add_vm_range(0x1000, 4, "_Z3foov").unwrap();
        }
        assert_eq!(out_map.vm_map.try_get_label(0x1000), Some("foov"));
    }
}

//! Scan driver: one worker thread per input file pulling from a shared
//! atomic index, merging per-file rollups commutatively on the main
//! thread (spec.md §5).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use memmap2::Mmap;

use crate::dualmap::DualMap;
use crate::dwarf::{self, DwarfSections};
use crate::error::{Error, Result};
use crate::format::{self, Format};
use crate::munger::NameMunger;
use crate::rollup::{Rollup, RollupRow};
use crate::sink::{DataSource, RangeSink, SinkOutput};

/// One input file's memory-mapped bytes, kept alive for the duration of
/// the scan (spec.md §5 "input file bytes are immutable shared
/// memory-maps").
pub struct MappedFile {
    pub path: PathBuf,
    mmap: Mmap,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<MappedFile> {
        let file = std::fs::File::open(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(MappedFile {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }
}

/// Per-file scan output: one `DualMap` built per requested data source,
/// keyed by source so the rollup stage can pair them with the right
/// level, plus the base map itself (the lockstep-walk authority every
/// source's ranges fall within).
pub struct FileResult {
    pub path: PathBuf,
    pub maps: Vec<(DataSource, DualMap)>,
    pub base: DualMap,
}

/// Scans one non-archive file through every requested data source,
/// building the base map first and then each level's `DualMap` against
/// it (spec.md §4.4 "process_base_map(sink)` and `process_file(sinks)`").
pub fn scan_file(data: &[u8], sources: &[DataSource], munger: &NameMunger) -> Result<FileResult> {
    scan_file_with_debug(data, None, sources, munger)
}

/// Like [`scan_file`], but for any source that came back empty, reparses
/// the same source from `debug_data` — a `--debug-file` companion whose
/// symbols/DWARF were stripped from `data` — against `data`'s own base
/// map (spec.md §4.6 point 7, §8 scenario 4). The companion is assumed
/// to share `data`'s VM layout.
pub fn scan_file_with_debug(
    data: &[u8],
    debug_data: Option<&[u8]>,
    sources: &[DataSource],
    munger: &NameMunger,
) -> Result<FileResult> {
    let fmt = format::detect(data)?;

    let mut base = DualMap::new();
    match fmt {
        Format::Elf => format::elf::process_base_map(data, &mut base)?,
        Format::MachO => format::macho::process_base_map(data, &mut base)?,
        Format::Pe => format::pe::process_base_map(data, &mut base)?,
        Format::Wasm => format::wasm::process_base_map(data, &mut base)?,
        Format::MachOFat | Format::ArGnu | Format::ArDarwin | Format::ArBsd => {
            return Err(Error::semantic("scan::scan_file", "archive/fat inputs are scanned member-by-member"))
        }
    }
    base.compress();

    if let Some(debug_data) = debug_data {
        check_build_id_match(data, debug_data)?;
    }

    let mut maps = Vec::new();
    for source in sources {
        let mut out_map = DualMap::new();
        {
            let mut sink = RangeSink::new(
                data,
                source.clone(),
                Some(&base),
                vec![SinkOutput {
                    map: &mut out_map,
                    munger,
                }],
            );
            populate_source(fmt, data, source, &mut sink)?;
        }
        if out_map.vm_map.is_empty() {
            if let Some(debug_data) = debug_data {
                let debug_fmt = format::detect(debug_data)?;
                let mut sink = RangeSink::new(
                    debug_data,
                    source.clone(),
                    Some(&base),
                    vec![SinkOutput {
                        map: &mut out_map,
                        munger,
                    }],
                );
                populate_source(debug_fmt, debug_data, source, &mut sink)?;
            }
        }
        out_map.compress();
        maps.push((source.clone(), out_map));
    }

    Ok(FileResult {
        path: PathBuf::new(),
        maps,
        base,
    })
}

/// Errors if both `stripped` and `debug` carry an ELF build-id note and
/// they disagree; proceeds if either lacks one or the format isn't ELF
/// (spec.md §4.6 point 7).
fn check_build_id_match(stripped: &[u8], debug: &[u8]) -> Result<()> {
    if format::detect(stripped)? != Format::Elf || format::detect(debug)? != Format::Elf {
        return Ok(());
    }
    if let (Some(a), Some(b)) = (format::elf::build_id(stripped)?, format::elf::build_id(debug)?) {
        if a != b {
            return Err(Error::semantic(
                "scan::check_build_id_match",
                "--debug-file build-id does not match the stripped binary",
            ));
        }
    }
    Ok(())
}

fn populate_source(fmt: Format, data: &[u8], source: &DataSource, sink: &mut RangeSink) -> Result<()> {
    match (fmt, source) {
        (Format::Elf, DataSource::Segments) => format::elf::process_segments(data, sink),
        (Format::Elf, DataSource::Sections) => format::elf::process_sections(data, sink),
        (Format::Elf, DataSource::Symbols | DataSource::FullSymbols | DataSource::ShortSymbols | DataSource::RawSymbols) => {
            format::elf::process_symbols(data, sink)
        }
        (Format::MachO, DataSource::Segments) => format::macho::process_segments(data, sink),
        (Format::MachO, DataSource::Sections) => format::macho::process_sections(data, sink),
        (Format::MachO, DataSource::Symbols | DataSource::FullSymbols | DataSource::ShortSymbols | DataSource::RawSymbols) => {
            format::macho::process_symbols(data, sink)
        }
        (Format::Pe, DataSource::Sections) => format::pe::process_sections(data, sink),
        (Format::Wasm, DataSource::Sections) => format::wasm::process_sections(data, sink),
        (_, DataSource::CompileUnits) => populate_dwarf_compile_units(data, sink),
        (_, DataSource::Inlines) => populate_dwarf_inlines(data, sink),
        _ => Ok(()),
    }
}

fn locate_dwarf_sections<'a>(fmt: Format, data: &'a [u8]) -> Result<DwarfSections<'a>> {
    // Mach-O keeps the same sections inside __DWARF and may zlib-compress
    // them (__zdebug_*); ELF front-ends carry them uncompressed. Only ELF
    // lookup is wired here since it's the front-end with real section
    // infrastructure so far.
    let mut sections = DwarfSections::default();
    if fmt != Format::Elf {
        return Ok(sections);
    }
    sections.debug_info = format::elf::find_section_by_name(data, ".debug_info")?;
    sections.debug_abbrev = format::elf::find_section_by_name(data, ".debug_abbrev")?;
    sections.debug_str = format::elf::find_section_by_name(data, ".debug_str")?;
    sections.debug_line = format::elf::find_section_by_name(data, ".debug_line")?;
    sections.debug_line_str = format::elf::find_section_by_name(data, ".debug_line_str")?;
    sections.debug_aranges = format::elf::find_section_by_name(data, ".debug_aranges")?;
    Ok(sections)
}

fn populate_dwarf_compile_units(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let fmt = format::detect(data)?;
    let sections = locate_dwarf_sections(fmt, data)?;
    let symtab = if fmt == Format::Elf {
        dwarf::SymbolTable::from_pairs(format::elf::symbol_table(data)?)
    } else {
        dwarf::SymbolTable::default()
    };
    dwarf::populate_compile_units(&sections, &symtab, sink)
}

fn populate_dwarf_inlines(data: &[u8], sink: &mut RangeSink) -> Result<()> {
    let fmt = format::detect(data)?;
    let sections = locate_dwarf_sections(fmt, data)?;
    dwarf::populate_inlines(&sections, sink)
}

/// Routes `data` to the right scan path: archive/fat formats are scanned
/// member-by-member via [`scan_archive`], everything else through
/// [`scan_file_with_debug`], then built up into a merged vm+file rollup
/// tree against the true base map (spec.md §4.3, §4.4).
pub fn scan_bytes(
    data: &[u8],
    debug_data: Option<&[u8]>,
    sources: &[DataSource],
    munger: &NameMunger,
) -> Result<Rollup> {
    let fmt = format::detect(data)?;
    if matches!(fmt, Format::MachOFat | Format::ArGnu | Format::ArDarwin | Format::ArBsd) {
        let Some((first, rest)) = sources.split_first() else {
            return Ok(Rollup::default());
        };
        if *first != DataSource::ArMembers {
            return Err(Error::semantic(
                "scan::scan_bytes",
                "archive inputs require 'armembers' as the first data source",
            ));
        }
        return scan_archive(data, rest, munger);
    }

    let result = scan_file_with_debug(data, debug_data, sources, munger)?;
    let refs: Vec<&DualMap> = result.maps.iter().map(|(_, m)| m).collect();
    let vm_level = Rollup::build_level(&result.base, &refs, true)?;
    let file_level = Rollup::build_level(&result.base, &refs, false)?;
    let mut merged = vm_level;
    merged.merge_file_level(&file_level);
    Ok(merged)
}

/// Scans an archive's members, one row per member holding its file size;
/// if `remaining_sources` is non-empty, each member is recursively
/// rescanned for them as its own object file (spec.md §6, §8 scenario 3
/// "-d armembers,symbols").
fn scan_archive(data: &[u8], remaining_sources: &[DataSource], munger: &NameMunger) -> Result<Rollup> {
    let mut rollup = Rollup::default();
    for member in format::ar::members(data)? {
        let file_size = member.data.len() as i64;
        let children = if remaining_sources.is_empty() {
            None
        } else {
            scan_bytes(member.data, None, remaining_sources, munger).ok()
        };
        rollup.rows.push(RollupRow {
            label: member.name,
            vm_size: 0,
            file_size,
            children,
            diff_status: None,
        });
        rollup.file_total += file_size as u64;
    }
    Ok(rollup)
}

/// Runs the full scan across `paths`: one worker thread per CPU pulling
/// file indices from a shared atomic counter, the first error winning
/// and aborting the rest (spec.md §5). `debug_file`, when set, is
/// memory-mapped once and consulted for every input that comes back
/// missing a requested source (spec.md §4.6 point 7).
pub fn scan_all(
    paths: &[PathBuf],
    sources: &[DataSource],
    munger: &NameMunger,
    debug_file: Option<&Path>,
) -> Result<Rollup> {
    let debug_mapped = debug_file.map(MappedFile::open).transpose()?;
    let debug_data = debug_mapped.as_ref().map(|m| m.data());

    let next_index = AtomicUsize::new(0);
    let error_slot: Mutex<Option<Error>> = Mutex::new(None);
    let results: Mutex<Vec<Rollup>> = Mutex::new(Vec::new());

    let worker_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(paths.len().max(1));

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                let idx = next_index.fetch_add(1, Ordering::SeqCst);
                if idx >= paths.len() {
                    return;
                }
                if error_slot.lock().unwrap().is_some() {
                    return;
                }
                match scan_one_path(&paths[idx], sources, munger, debug_data) {
                    Ok(rollup) => results.lock().unwrap().push(rollup),
                    Err(e) => {
                        let mut slot = error_slot.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        next_index.store(paths.len(), Ordering::SeqCst);
                    }
                }
            });
        }
    });

    if let Some(e) = error_slot.into_inner().unwrap() {
        return Err(e);
    }

    let per_file = results.into_inner().unwrap();
    Ok(merge_rollups(per_file))
}

fn scan_one_path(
    path: &Path,
    sources: &[DataSource],
    munger: &NameMunger,
    debug_data: Option<&[u8]>,
) -> Result<Rollup> {
    let mapped = MappedFile::open(path)?;
    scan_bytes(mapped.data(), debug_data, sources, munger)
}

/// Merges per-file rollups by summing matching labels, recursing into
/// matching children so nested levels stay merged too (spec.md §5
/// "recursive add", "order-independent"); unmatched labels pass through.
fn merge_rollups(rollups: Vec<Rollup>) -> Rollup {
    let mut acc = Rollup::default();
    for r in rollups {
        merge_rollup_into(&mut acc, r);
    }
    acc
}

fn merge_rollup_into(acc: &mut Rollup, other: Rollup) {
    for row in other.rows {
        match acc.rows.iter_mut().find(|e| e.label == row.label) {
            Some(existing) => {
                existing.vm_size += row.vm_size;
                existing.file_size += row.file_size;
                match (&mut existing.children, row.children) {
                    (Some(ec), Some(rc)) => merge_rollup_into(ec, rc),
                    (None, Some(rc)) => existing.children = Some(rc),
                    _ => {}
                }
            }
            None => acc.rows.push(row),
        }
    }
    acc.vm_total += other.vm_total;
    acc.file_total += other.file_total;
}

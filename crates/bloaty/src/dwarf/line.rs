//! `.debug_line` state machine (spec.md §4.5 "LineInfoReader"): standard,
//! special, and extended opcodes, `DW_LNE_set_address` "shadow" handling
//! (rows preceding the first `set_address` in a unit belong to stripped
//! code and are discarded), and the DWARF5 `directories`/`file_names`
//! entry-format tables.

use crate::cursor::{Cursor, Endian};
use crate::error::{Error, Result};

const DW_LNS_COPY: u8 = 0x01;
const DW_LNS_ADVANCE_PC: u8 = 0x02;
const DW_LNS_ADVANCE_LINE: u8 = 0x03;
const DW_LNS_SET_FILE: u8 = 0x04;
const DW_LNS_SET_COLUMN: u8 = 0x05;
const DW_LNS_NEGATE_STMT: u8 = 0x06;
const DW_LNS_SET_BASIC_BLOCK: u8 = 0x07;
const DW_LNS_CONST_ADD_PC: u8 = 0x08;
const DW_LNS_FIXED_ADVANCE_PC: u8 = 0x09;
const DW_LNS_SET_PROLOGUE_END: u8 = 0x0a;
const DW_LNS_SET_EPILOGUE_BEGIN: u8 = 0x0b;
const DW_LNS_SET_ISA: u8 = 0x0c;

const DW_LNE_END_SEQUENCE: u8 = 0x01;
const DW_LNE_SET_ADDRESS: u8 = 0x02;
const DW_LNE_DEFINE_FILE: u8 = 0x03;

const DW_LNCT_PATH: u64 = 0x1;
const DW_LNCT_DIRECTORY_INDEX: u64 = 0x2;

/// One row of the `directories`/`file_names` entry-format tables.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub name: String,
    pub dir_index: u64,
}

#[derive(Clone, Debug)]
pub struct LineProgramHeader {
    pub version: u16,
    pub is64: bool,
    pub address_size: u8,
    pub minimum_instruction_length: u8,
    pub maximum_operations_per_instruction: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub standard_opcode_lengths: Vec<u8>,
    pub directories: Vec<String>,
    pub file_names: Vec<FileEntry>,
    pub program_offset: usize,
    pub end_offset: usize,
}

/// Resolves a line-table file index to a `dir/file` path (spec.md §4.5,
/// the `file[:line]` label). DWARF5 indexes `directories`/`file_names`
/// directly; DWARF2-4 reserve index 0 (file: unused, directory: the
/// compilation directory) and index from 1.
pub fn file_path(header: &LineProgramHeader, file_index: u64) -> String {
    let entry = if header.version >= 5 {
        header.file_names.get(file_index as usize)
    } else {
        file_index
            .checked_sub(1)
            .and_then(|i| header.file_names.get(i as usize))
    };
    let Some(entry) = entry else {
        return format!("[unknown file {file_index}]");
    };
    let dir = if header.version >= 5 {
        header.directories.get(entry.dir_index as usize)
    } else {
        entry
            .dir_index
            .checked_sub(1)
            .and_then(|i| header.directories.get(i as usize))
    };
    match dir {
        Some(d) if !d.is_empty() => format!("{d}/{}", entry.name),
        _ => entry.name.clone(),
    }
}

/// One emitted row: a contiguous `(file, line)` run, spec.md §4.5 "emits
/// one range per contiguous (file[:line]) run".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRun {
    pub address: u64,
    pub end_address: u64,
    pub file: u64,
    pub line: u32,
}

struct Registers {
    address: u64,
    file: u64,
    line: u32,
    is_stmt: bool,
}

impl Registers {
    fn reset(default_is_stmt: bool) -> Self {
        Self {
            address: 0,
            file: 1,
            line: 1,
            is_stmt: default_is_stmt,
        }
    }
}

pub fn parse_header(
    debug_line: &[u8],
    offset: usize,
    debug_str: &[u8],
    debug_line_str: &[u8],
) -> Result<LineProgramHeader> {
    let mut c = Cursor::at(debug_line, offset, Endian::Little);
    let initial_length = c.u32()?;
    let (is64, unit_length) = if initial_length == 0xffff_ffff {
        (true, c.u64()?)
    } else {
        (false, initial_length as u64)
    };
    let end_offset = c.pos + unit_length as usize;

    let version = c.u16()?;
    let address_size = if version >= 5 {
        let addr_size = c.u8()?;
        let _seg_sel_size = c.u8()?;
        addr_size
    } else {
        8
    };

    let header_length = c.uword(is64)?;
    let program_offset = c.pos + header_length as usize;

    let minimum_instruction_length = c.u8()?;
    let maximum_operations_per_instruction = if version >= 4 { c.u8()? } else { 1 };
    let default_is_stmt = c.u8()? != 0;
    let line_base = c.u8()? as i8;
    let line_range = c.u8()?;
    let opcode_base = c.u8()?;
    let mut standard_opcode_lengths = Vec::with_capacity(opcode_base as usize - 1);
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(c.u8()?);
    }

    let (directories, file_names) = if version >= 5 {
        let dirs = read_v5_entry_table(&mut c, is64, debug_str, debug_line_str)?;
        let files = read_v5_entry_table(&mut c, is64, debug_str, debug_line_str)?;
        (
            dirs.into_iter().map(|e| e.name).collect(),
            files,
        )
    } else {
        let mut directories = Vec::new();
        while c.u8()? != 0 {
            c.pos -= 1;
            directories.push(c.cstr()?.to_string());
        }
        let mut file_names = Vec::new();
        loop {
            let name = c.cstr()?;
            if name.is_empty() {
                break;
            }
            let name = name.to_string();
            let dir_index = c.uleb128()?;
            c.uleb128()?; // mtime
            c.uleb128()?; // length
            file_names.push(FileEntry { name, dir_index });
        }
        (directories, file_names)
    };

    Ok(LineProgramHeader {
        version,
        is64,
        address_size,
        minimum_instruction_length,
        maximum_operations_per_instruction: maximum_operations_per_instruction.max(1),
        default_is_stmt,
        line_base,
        line_range,
        opcode_base,
        standard_opcode_lengths,
        directories,
        file_names,
        program_offset,
        end_offset,
    })
}

fn read_v5_entry_table(
    c: &mut Cursor,
    is64: bool,
    debug_str: &[u8],
    debug_line_str: &[u8],
) -> Result<Vec<FileEntry>> {
    let format_count = c.u8()?;
    let mut formats = Vec::with_capacity(format_count as usize);
    for _ in 0..format_count {
        let content_type = c.uleb128()?;
        let form = c.uleb128()?;
        formats.push((content_type, form));
    }
    let count = c.uleb128()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut name = String::new();
        let mut dir_index = 0u64;
        for (content_type, form) in &formats {
            match *content_type {
                DW_LNCT_PATH => {
                    name = read_form_string(c, *form, is64, debug_str, debug_line_str)?;
                }
                DW_LNCT_DIRECTORY_INDEX => {
                    dir_index = read_form_uint(c, *form)?;
                }
                _ => skip_form(c, *form, is64)?,
            }
        }
        entries.push(FileEntry { name, dir_index });
    }
    Ok(entries)
}

fn read_form_string(
    c: &mut Cursor,
    form: u64,
    is64: bool,
    debug_str: &[u8],
    debug_line_str: &[u8],
) -> Result<String> {
    Ok(match form {
        0x08 => c.cstr()?.to_string(), // DW_FORM_string
        0x1f => {
            let off = c.uword(is64)?;
            crate::cursor::cstr_at(debug_line_str, off as usize)?.to_string()
        } // DW_FORM_line_strp
        0x0e => {
            let off = c.uword(is64)?;
            crate::cursor::cstr_at(debug_str, off as usize)?.to_string()
        } // DW_FORM_strp
        other => {
            return Err(Error::malformed(
                "read_form_string",
                format!("unsupported v5 line-table path form 0x{other:x}"),
            ))
        }
    })
}

fn read_form_uint(c: &mut Cursor, form: u64) -> Result<u64> {
    Ok(match form {
        0x0b => c.u8()? as u64,   // DW_FORM_data1
        0x05 => c.u16()? as u64,  // DW_FORM_data2
        0x06 => c.u32()? as u64,  // DW_FORM_data4
        0x07 => c.u64()?,         // DW_FORM_data8
        0x0f => c.uleb128()?,     // DW_FORM_udata
        other => {
            return Err(Error::malformed(
                "read_form_uint",
                format!("unsupported v5 line-table index form 0x{other:x}"),
            ))
        }
    })
}

fn skip_form(c: &mut Cursor, form: u64, is64: bool) -> Result<()> {
    match form {
        0x08 => {
            c.cstr()?;
        } // DW_FORM_string
        0x1f | 0x0e => {
            c.uword(is64)?;
        } // DW_FORM_line_strp / strp
        0x1e => {
            c.bytes(16)?;
        } // DW_FORM_data16 (MD5)
        0x0b => {
            c.u8()?;
        } // DW_FORM_data1
        0x05 => {
            c.u16()?;
        } // DW_FORM_data2
        0x06 => {
            c.u32()?;
        } // DW_FORM_data4
        0x07 => {
            c.u64()?;
        } // DW_FORM_data8
        0x0f => {
            c.uleb128()?;
        } // DW_FORM_udata
        other => {
            return Err(Error::malformed(
                "skip_form",
                format!("unsupported v5 line-table form 0x{other:x}"),
            ))
        }
    }
    Ok(())
}

/// Runs the line-number program, collecting `LineRun`s. Rows emitted
/// before the unit's first `DW_LNE_set_address` belong to code that was
/// stripped from the final binary and are discarded.
pub fn run_program(debug_line: &[u8], header: &LineProgramHeader) -> Result<Vec<LineRun>> {
    let mut c = Cursor::at(debug_line, header.program_offset, Endian::Little);
    let mut runs = Vec::new();
    let mut regs = Registers::reset(header.default_is_stmt);
    let mut pending_start: Option<(u64, u64, u32)> = None; // (address, file, line)
    let mut seen_set_address = false;

    let flush = |runs: &mut Vec<LineRun>, pending: &mut Option<(u64, u64, u32)>, end_addr: u64| {
        if let Some((start, file, line)) = pending.take() {
            if end_addr > start {
                runs.push(LineRun {
                    address: start,
                    end_address: end_addr,
                    file,
                    line,
                });
            }
        }
    };

    while c.pos < header.end_offset {
        let opcode = c.u8()?;
        if opcode == 0 {
            let len = c.uleb128()? as usize;
            let ext_start = c.pos;
            let ext_op = c.u8()?;
            match ext_op {
                DW_LNE_END_SEQUENCE => {
                    flush(&mut runs, &mut pending_start, regs.address);
                    regs = Registers::reset(header.default_is_stmt);
                    seen_set_address = false;
                }
                DW_LNE_SET_ADDRESS => {
                    flush(&mut runs, &mut pending_start, regs.address);
                    regs.address = c.uword(header.address_size == 8)?;
                    seen_set_address = true;
                    pending_start = Some((regs.address, regs.file, regs.line));
                }
                DW_LNE_DEFINE_FILE => {
                    c.cstr()?;
                    c.uleb128()?;
                    c.uleb128()?;
                    c.uleb128()?;
                }
                _ => {}
            }
            c.seek(ext_start + len);
        } else if opcode < header.opcode_base {
            match opcode {
                DW_LNS_COPY => {
                    if seen_set_address {
                        flush(&mut runs, &mut pending_start, regs.address);
                        pending_start = Some((regs.address, regs.file, regs.line));
                    }
                }
                DW_LNS_ADVANCE_PC => {
                    regs.address += c.uleb128()? * header.minimum_instruction_length as u64;
                }
                DW_LNS_ADVANCE_LINE => {
                    regs.line = (regs.line as i64 + c.sleb128()?) as u32;
                }
                DW_LNS_SET_FILE => {
                    regs.file = c.uleb128()?;
                }
                DW_LNS_SET_COLUMN => {
                    c.uleb128()?;
                }
                DW_LNS_NEGATE_STMT => {
                    regs.is_stmt = !regs.is_stmt;
                }
                DW_LNS_SET_BASIC_BLOCK => {}
                DW_LNS_CONST_ADD_PC => {
                    let adjusted = 255 - header.opcode_base;
                    regs.address +=
                        (adjusted / header.line_range) as u64 * header.minimum_instruction_length as u64;
                }
                DW_LNS_FIXED_ADVANCE_PC => {
                    regs.address += c.u16()? as u64;
                }
                DW_LNS_SET_PROLOGUE_END | DW_LNS_SET_EPILOGUE_BEGIN => {}
                DW_LNS_SET_ISA => {
                    c.uleb128()?;
                }
                other => {
                    let nargs = header
                        .standard_opcode_lengths
                        .get(other as usize - 1)
                        .copied()
                        .unwrap_or(0);
                    for _ in 0..nargs {
                        c.uleb128()?;
                    }
                }
            }
        } else {
            // special opcode
            let adjusted = opcode - header.opcode_base;
            let addr_advance = (adjusted / header.line_range) as u64
                * header.minimum_instruction_length as u64;
            let line_advance = header.line_base as i32 + (adjusted % header.line_range) as i32;
            if seen_set_address {
                flush(&mut runs, &mut pending_start, regs.address);
            }
            regs.address += addr_advance;
            regs.line = (regs.line as i32 + line_advance) as u32;
            if seen_set_address {
                pending_start = Some((regs.address, regs.file, regs.line));
            }
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_header_and_program(program: &[u8]) -> Vec<u8> {
        let mut header_body = Vec::new();
        header_body.extend_from_slice(&4u16.to_le_bytes()); // version
        let header_len_pos = header_body.len();
        header_body.extend_from_slice(&0u32.to_le_bytes()); // header_length placeholder
        let header_start = header_body.len();
        header_body.push(1); // minimum_instruction_length
        header_body.push(1); // maximum_operations_per_instruction
        header_body.push(1); // default_is_stmt
        header_body.push((-5i8) as u8); // line_base
        header_body.push(14); // line_range
        header_body.push(13); // opcode_base
        header_body.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]); // 12 std opcode lengths
        header_body.push(0); // include_directories terminator
        header_body.push(0); // file_names terminator (empty name ends list)
        let header_len = (header_body.len() - header_start) as u32;
        header_body[header_len_pos..header_len_pos + 4].copy_from_slice(&header_len.to_le_bytes());

        header_body.extend_from_slice(program);

        let mut out = Vec::new();
        out.extend_from_slice(&(header_body.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_body);
        out
    }

    #[test]
    fn set_address_then_copy_then_end_sequence_emits_one_run() {
        let mut program = Vec::new();
        // DW_LNE_set_address 0x1000
        program.extend_from_slice(&[0x00, 0x09, DW_LNE_SET_ADDRESS]);
        program.extend_from_slice(&0x1000u64.to_le_bytes());
        // DW_LNS_advance_pc 16
        program.extend_from_slice(&[DW_LNS_ADVANCE_PC, 16]);
        // DW_LNS_copy
        program.push(DW_LNS_COPY);
        // DW_LNE_end_sequence (advances address implicitly by advance_pc already done; reuse 16 more)
        program.extend_from_slice(&[DW_LNS_ADVANCE_PC, 16]);
        program.extend_from_slice(&[0x00, 0x01, DW_LNE_END_SEQUENCE]);

        let data = v4_header_and_program(&program);
        let header = parse_header(&data, 0, &[], &[]).unwrap();
        let runs = run_program(&data, &header).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].address, 0x1000);
        assert_eq!(runs[0].end_address, 0x1000 + 32);
        assert_eq!(runs[0].line, 1);
    }

    #[test]
    fn rows_before_set_address_are_discarded() {
        let mut program = Vec::new();
        // DW_LNS_copy with no prior set_address: must not emit anything.
        program.push(DW_LNS_COPY);
        program.extend_from_slice(&[0x00, 0x01, DW_LNE_END_SEQUENCE]);

        let data = v4_header_and_program(&program);
        let header = parse_header(&data, 0, &[], &[]).unwrap();
        let runs = run_program(&data, &header).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn file_path_joins_directory_and_name_pre_v5() {
        let header = LineProgramHeader {
            version: 4,
            is64: false,
            address_size: 8,
            minimum_instruction_length: 1,
            maximum_operations_per_instruction: 1,
            default_is_stmt: true,
            line_base: -5,
            line_range: 14,
            opcode_base: 13,
            standard_opcode_lengths: Vec::new(),
            directories: vec!["/src".to_string()],
            file_names: vec![FileEntry {
                name: "main.c".to_string(),
                dir_index: 1,
            }],
            program_offset: 0,
            end_offset: 0,
        };
        assert_eq!(file_path(&header, 1), "/src/main.c");
    }

    #[test]
    fn file_path_indexes_from_zero_in_v5() {
        let header = LineProgramHeader {
            version: 5,
            is64: false,
            address_size: 8,
            minimum_instruction_length: 1,
            maximum_operations_per_instruction: 1,
            default_is_stmt: true,
            line_base: -5,
            line_range: 14,
            opcode_base: 13,
            standard_opcode_lengths: Vec::new(),
            directories: vec!["/src".to_string()],
            file_names: vec![FileEntry {
                name: "main.c".to_string(),
                dir_index: 0,
            }],
            program_offset: 0,
            end_offset: 0,
        };
        assert_eq!(file_path(&header, 0), "/src/main.c");
    }
}

//! The line-oriented textual assembler.
//!
//! One line is either a directive (`.fun`, `.mem`, `.data`, …) or an
//! opcode mnemonic followed by symbolic operands. Directives are
//! dispatched by name; opcode
//! lines are resolved against the target ISA's opcode table and
//! assembled immediately, with symbolic (non-register, non-immediate)
//! operands turned into a pending relocation rather than a literal
//! value.

use crate::elf::reloc::RelocType;
use crate::elf::unit::{AssemblerUnit, SEC_TEXT};
use crate::ir::cpu_reg::RegBankKind;
use crate::isa::encoding::{EncOperand, EncodedInsn, OperandSpec};
use crate::isa::registers::RegBank;
use crate::isa::Isa;
use crate::result::{CodegenError, CodegenResult};

/// Parse `input` as a symbolic assembly stream targeting `isa`,
/// returning the filled-in unit ready for `elf::writer::link_and_write`.
pub fn parse(isa: Isa, input: &str) -> CodegenResult<AssemblerUnit> {
    let mut unit = AssemblerUnit::new(isa);
    let nop = nop_bytes(isa);
    for (line_no0, raw_line) in input.lines().enumerate() {
        let line_no = line_no0 + 1;
        let line = strip_comment(raw_line);
        let tokens = tokenize(line);
        let head = match tokens.first() {
            Some(h) => h.as_str(),
            None => continue,
        };
        if let Some(dot) = head.strip_prefix('.') {
            handle_directive(&mut unit, line_no, dot, &tokens[1..], &nop)?;
        } else {
            handle_opcode(&mut unit, line_no, head, &tokens[1..])?;
        }
    }
    Ok(unit)
}

/// Parse `input` as an IR textual form for structural checking only
/// (no target ISA given). Directive structure, region nesting,
/// and symbol definitions are validated exactly as in `parse`; opcode
/// lines are checked only for carrying a mnemonic, since resolving one
/// against a concrete encoding table requires an `Isa` `lint` doesn't
/// have.
pub fn lint(input: &str) -> CodegenResult<()> {
    let mut unit = AssemblerUnit::new(Isa::Aarch64);
    let nop = [0u8; 4];
    for (line_no0, raw_line) in input.lines().enumerate() {
        let line_no = line_no0 + 1;
        let line = strip_comment(raw_line);
        let tokens = tokenize(line);
        let head = match tokens.first() {
            Some(h) => h.as_str(),
            None => continue,
        };
        if let Some(dot) = head.strip_prefix('.') {
            handle_directive(&mut unit, line_no, dot, &tokens[1..], &nop)?;
        } else {
            unit.emit_instruction(&nop);
        }
    }
    Ok(())
}

/// The byte encoding of a single-instruction no-op for `isa`, used to
/// pad `.text` to a `.fun`/`.bbl` alignment boundary.
fn nop_bytes(isa: Isa) -> Vec<u8> {
    match isa {
        Isa::Aarch64 => 0xD503_201Fu32.to_le_bytes().to_vec(),
        Isa::Aarch32 => 0xE320_F000u32.to_le_bytes().to_vec(),
        Isa::X86_64 => vec![0x90],
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            cur.push(c);
            if c == '\\' {
                if let Some(n) = chars.next() {
                    cur.push(n);
                }
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        if in_brackets {
            cur.push(c);
            if c == ']' {
                in_brackets = false;
                out.push(std::mem::take(&mut cur));
            }
            continue;
        }
        if c == '"' {
            in_quotes = true;
            cur.push(c);
        } else if c == '[' {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            in_brackets = true;
            cur.push(c);
        } else if c == ',' {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
        } else if c.is_whitespace() {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
        } else {
            cur.push(c);
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Parse an integer literal: `0x…`/`0X…` hex, or decimal, either
/// signed.
fn parse_int(tok: &str) -> Option<i64> {
    let (neg, body) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    let v = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    Some(if neg { -v } else { v })
}

/// Unescape a `"…"` quoted string literal (`\n`, `\t`, `\\`, `\"`,
/// `\0`, `\xHH`) into raw bytes, for `.data`.
fn parse_quoted_bytes(tok: &str, line_no: usize) -> CodegenResult<Vec<u8>> {
    let inner = tok
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| CodegenError::parse(line_no, format!("expected a quoted string, got `{}`", tok)))?;
    let mut out = Vec::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('"') => out.push(b'"'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let hex: String = [hi, lo].into_iter().flatten().collect();
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|_| CodegenError::parse(line_no, "invalid \\x escape in string literal"))?;
                out.push(byte);
            }
            other => {
                return Err(CodegenError::parse(
                    line_no,
                    format!("invalid escape `\\{}` in string literal", other.unwrap_or(' ')),
                ))
            }
        }
    }
    Ok(out)
}

fn parse_reg_list(tok: &str, bank: &RegBank, line_no: usize) -> CodegenResult<u32> {
    let inner = tok
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| CodegenError::parse(line_no, format!("expected a bracketed register list, got `{}`", tok)))?;
    let mut mask = 0u32;
    if inner.is_empty() {
        return Ok(mask);
    }
    for name in inner.split(',') {
        let reg = bank
            .by_name(name)
            .ok_or_else(|| CodegenError::parse(line_no, format!("unknown register `{}`", name)))?;
        mask |= 1 << reg.no();
    }
    Ok(mask)
}

fn need(args: &[String], n: usize, line_no: usize, directive: &str) -> CodegenResult<()> {
    if args.len() != n {
        return Err(CodegenError::parse(
            line_no,
            format!("`.{}` expects {} argument(s), got {}", directive, n, args.len()),
        ));
    }
    Ok(())
}

fn abs_reloc_kind(isa: Isa) -> RelocType {
    match isa {
        Isa::Aarch32 => RelocType::Abs32,
        Isa::Aarch64 | Isa::X86_64 => RelocType::Abs64,
    }
}

fn handle_directive(
    unit: &mut AssemblerUnit,
    line_no: usize,
    directive: &str,
    args: &[String],
    nop: &[u8],
) -> CodegenResult<()> {
    match directive {
        "fun" => {
            need(args, 2, line_no, "fun")?;
            let align = parse_int(&args[1])
                .ok_or_else(|| CodegenError::parse(line_no, "bad alignment"))? as u64;
            unit.fun_start(&args[0], align, nop)
        }
        "endfun" => {
            need(args, 0, line_no, "endfun")?;
            unit.fun_end()
        }
        "bbl" => {
            need(args, 2, line_no, "bbl")?;
            let align = parse_int(&args[1])
                .ok_or_else(|| CodegenError::parse(line_no, "bad alignment"))? as u64;
            unit.bbl_label(&args[0], align, nop)
        }
        "mem" => {
            need(args, 3, line_no, "mem")?;
            let align = parse_int(&args[1])
                .ok_or_else(|| CodegenError::parse(line_no, "bad alignment"))? as u64;
            let rw = match args[2].as_str() {
                "RW" => true,
                "RO" => false,
                other => {
                    return Err(CodegenError::parse(line_no, format!("expected RO or RW, got `{}`", other)))
                }
            };
            unit.mem_start(&args[0], align, rw, false)
        }
        "localmem" => {
            need(args, 2, line_no, "localmem")?;
            let align = parse_int(&args[1])
                .ok_or_else(|| CodegenError::parse(line_no, "bad alignment"))? as u64;
            unit.mem_start(&args[0], align, true, true)
        }
        "endmem" => {
            need(args, 0, line_no, "endmem")?;
            unit.mem_end()
        }
        "data" => {
            need(args, 2, line_no, "data")?;
            let size = parse_int(&args[0]).ok_or_else(|| CodegenError::parse(line_no, "bad size"))? as usize;
            let bytes = parse_quoted_bytes(&args[1], line_no)?;
            unit.add_data(size, bytes)
        }
        "addr.fun" | "addr.bbl" => {
            need(args, 2, line_no, directive)?;
            let offset = parse_int(&args[0]).ok_or_else(|| CodegenError::parse(line_no, "bad offset"))? as u64;
            unit.add_addr(offset, &args[1], 0, abs_reloc_kind(unit.isa()))
        }
        "addr.mem" => {
            need(args, 3, line_no, "addr.mem")?;
            let offset = parse_int(&args[0]).ok_or_else(|| CodegenError::parse(line_no, "bad offset"))? as u64;
            let addend = parse_int(&args[2]).ok_or_else(|| CodegenError::parse(line_no, "bad addend"))?;
            unit.add_addr(offset, &args[1], addend, abs_reloc_kind(unit.isa()))
        }
        other => Err(CodegenError::parse(line_no, format!("unknown directive `.{}`", other))),
    }
}

fn handle_opcode(unit: &mut AssemblerUnit, line_no: usize, mnemonic: &str, toks: &[String]) -> CodegenResult<()> {
    match unit.isa() {
        Isa::Aarch64 => assemble_fixed(
            unit,
            line_no,
            mnemonic,
            toks,
            &crate::isa::aarch64::opcodes::OPCODES,
            &crate::isa::aarch64::registers::REG_INFO,
            aarch64_reloc_kind,
        ),
        Isa::Aarch32 => assemble_fixed(
            unit,
            line_no,
            mnemonic,
            toks,
            &crate::isa::aarch32::opcodes::OPCODES,
            &crate::isa::aarch32::registers::REG_INFO,
            aarch32_reloc_kind,
        ),
        Isa::X86_64 => assemble_x86_64(unit, line_no, mnemonic, toks),
    }
}

fn aarch64_reloc_kind(mnemonic: &str, line_no: usize) -> CodegenResult<RelocType> {
    match mnemonic {
        "bl" => Ok(RelocType::Aarch64Call26),
        "b" => Ok(RelocType::Aarch64Jump26),
        "cbz_x" => Ok(RelocType::Aarch64CondBr19),
        _ => Err(CodegenError::parse(
            line_no,
            format!("`{}` cannot take a symbolic operand", mnemonic),
        )),
    }
}

fn aarch32_reloc_kind(mnemonic: &str, line_no: usize) -> CodegenResult<RelocType> {
    match mnemonic {
        "bl" => Ok(RelocType::Arm32Call24),
        "b" => Ok(RelocType::Arm32Jump24),
        _ => Err(CodegenError::parse(
            line_no,
            format!("`{}` cannot take a symbolic operand", mnemonic),
        )),
    }
}

/// Shared assembly path for the two fixed-width ISAs: look up the
/// mnemonic, classify each operand token against its `OperandSpec`,
/// assemble the word, and record a relocation if any operand named a
/// symbol rather than a literal.
fn assemble_fixed(
    unit: &mut AssemblerUnit,
    line_no: usize,
    mnemonic: &str,
    toks: &[String],
    table: &'static [crate::isa::encoding::FixedOpcode],
    reg_info: &crate::isa::registers::RegInfo,
    reloc_kind: impl Fn(&str, usize) -> CodegenResult<RelocType>,
) -> CodegenResult<()> {
    let idx = table
        .iter()
        .position(|o| o.mnemonic == mnemonic)
        .ok_or_else(|| CodegenError::UnknownOpcode(mnemonic.to_string()))?;
    let spec = &table[idx];
    if spec.operands.len() != toks.len() {
        return Err(CodegenError::parse(
            line_no,
            format!(
                "`{}` expects {} operand(s), got {}",
                mnemonic,
                spec.operands.len(),
                toks.len()
            ),
        ));
    }
    let int_bank = reg_info
        .bank(RegBankKind::Integer)
        .expect("every ISA register table has an integer bank");

    let mut operands = Vec::with_capacity(toks.len());
    let mut symbolic: Option<String> = None;
    for (tok, opspec) in toks.iter().zip(spec.operands) {
        let operand = match opspec {
            OperandSpec::Reg(_) => {
                let r = int_bank
                    .by_name(tok)
                    .ok_or_else(|| CodegenError::parse(line_no, format!("unknown register `{}`", tok)))?;
                EncOperand::Reg(r.no())
            }
            OperandSpec::RegList(_) => EncOperand::RegListMask(parse_reg_list(tok, int_bank, line_no)?),
            OperandSpec::UImm { .. } | OperandSpec::SImm { .. } => match parse_int(tok) {
                Some(v) => EncOperand::Imm(v),
                None => {
                    symbolic = Some(tok.clone());
                    EncOperand::Imm(0)
                }
            },
        };
        operands.push(operand);
    }

    let ins = EncodedInsn { opcode: idx, operands };
    let word = crate::isa::encoding::assemble(table, &ins)
        .ok_or_else(|| CodegenError::parse(line_no, format!("operands don't fit `{}`'s encoding", mnemonic)))?;
    let start = unit.emit_instruction(&word.to_le_bytes());
    if let Some(sym) = symbolic {
        let kind = reloc_kind(mnemonic, line_no)?;
        unit.add_reloc_at(SEC_TEXT, start, &sym, kind);
    }
    Ok(())
}

fn assemble_x86_64(unit: &mut AssemblerUnit, line_no: usize, mnemonic: &str, toks: &[String]) -> CodegenResult<()> {
    use crate::isa::x86_64::opcodes::{OperandRole, OPCODES};

    let idx = OPCODES
        .iter()
        .position(|t| t.mnemonic == mnemonic)
        .ok_or_else(|| CodegenError::UnknownOpcode(mnemonic.to_string()))?;
    let template = &OPCODES[idx];
    if template.operands.len() != toks.len() {
        return Err(CodegenError::parse(
            line_no,
            format!(
                "`{}` expects {} operand(s), got {}",
                mnemonic,
                template.operands.len(),
                toks.len()
            ),
        ));
    }
    let int_bank = crate::isa::x86_64::registers::REG_INFO
        .bank(RegBankKind::Integer)
        .expect("x86-64 has an integer bank");

    let mut operands = Vec::with_capacity(toks.len());
    let mut symbolic: Option<String> = None;
    for (tok, role) in toks.iter().zip(template.operands) {
        let operand = match role {
            OperandRole::ModrmReg | OperandRole::ModrmRm | OperandRole::OpcodeReg => {
                let r = int_bank
                    .by_name(tok)
                    .ok_or_else(|| CodegenError::parse(line_no, format!("unknown register `{}`", tok)))?;
                EncOperand::Reg(r.no())
            }
            OperandRole::Imm | OperandRole::Disp => match parse_int(tok) {
                Some(v) => EncOperand::Imm(v),
                None => {
                    symbolic = Some(tok.clone());
                    EncOperand::Imm(0)
                }
            },
        };
        operands.push(operand);
    }

    let ins = EncodedInsn { opcode: idx, operands };
    let bytes = crate::isa::x86_64::opcodes::Table::new()
        .assemble(&ins)
        .ok_or_else(|| CodegenError::parse(line_no, format!("operands don't fit `{}`'s encoding", mnemonic)))?;
    let start = unit.emit_instruction(&bytes);
    if let Some(sym) = symbolic {
        let kind = match mnemonic {
            "call_rel32" | "jmp_rel32" => RelocType::X86Pc32,
            _ => {
                return Err(CodegenError::parse(
                    line_no,
                    format!("`{}` cannot take a symbolic operand", mnemonic),
                ))
            }
        };
        let imm_pos = template.imm.expect("symbolic x86-64 operand implies an immediate field").pos;
        let base: usize = if template.rex_w { 1 } else { 0 };
        unit.add_reloc_at(SEC_TEXT, start + (base + imm_pos) as u64, &sym, kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::unit::SEC_RODATA;

    #[test]
    fn parses_minimal_aarch64_program() {
        let src = "\
.fun _start 4
add_x_imm x1, x1, 1
ret
.endfun
";
        let unit = parse(Isa::Aarch64, src).unwrap();
        assert!(unit.symbol_id("_start").is_some());
        assert_eq!(unit.section(SEC_TEXT).data.len(), 8);
    }

    #[test]
    fn s5_round_trip_word() {
        let src = ".fun f 4\nadd_x_imm x1, x1, 1\n.endfun\n";
        let unit = parse(Isa::Aarch64, src).unwrap();
        let word = u32::from_le_bytes(unit.section(SEC_TEXT).data[..4].try_into().unwrap());
        assert_eq!(word, 0x9100_0421);
    }

    #[test]
    fn s6_x86_64_mov_imm32() {
        let src = ".fun f 1\nmov_r32_imm32 rax, 0x11223344\n.endfun\n";
        let unit = parse(Isa::X86_64, src).unwrap();
        assert_eq!(unit.section(SEC_TEXT).data, vec![0xB8, 0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn s6_x86_64_mov_imm64_has_rex_w() {
        let src = ".fun f 1\nmov_r64_imm64 rax, 0x1122334455667788\n.endfun\n";
        let unit = parse(Isa::X86_64, src).unwrap();
        let data = &unit.section(SEC_TEXT).data;
        assert_eq!(data[0], 0x48);
        assert_eq!(data[1], 0xB8);
        assert_eq!(data.len(), 10);
    }

    #[test]
    fn unknown_opcode_reports_line_error() {
        let err = parse(Isa::Aarch64, "bogus_mnemonic x1\n").unwrap_err();
        match err {
            CodegenError::UnknownOpcode(name) => assert_eq!(name, "bogus_mnemonic"),
            other => panic!("expected UnknownOpcode, got {:?}", other),
        }
    }

    #[test]
    fn symbolic_branch_target_records_relocation() {
        let src = ".fun f 4\nbl callee\nret\n.endfun\n";
        let unit = parse(Isa::Aarch64, src).unwrap();
        assert_eq!(unit.relocs().len(), 1);
        assert_eq!(unit.relocs()[0].kind, RelocType::Aarch64Call26);
    }

    #[test]
    fn lint_accepts_well_formed_program_regardless_of_opcode_validity() {
        let src = "\
.fun _start 4
totally_made_up_mnemonic x1, x1, 1
ret
.endfun
";
        lint(src).unwrap();
    }

    #[test]
    fn lint_still_catches_directive_contract_violations() {
        let err = lint(".endfun\n").unwrap_err();
        match err {
            CodegenError::Contract(_) => {}
            other => panic!("expected Contract, got {:?}", other),
        }
    }

    #[test]
    fn mem_and_addr_fun_directives() {
        let src = "\
.fun f 4
ret
.endfun
.mem table 8 RW
.addr.fun 0 f
.endmem
";
        let unit = parse(Isa::Aarch64, src).unwrap();
        assert_eq!(unit.relocs().len(), 1);
        assert_eq!(unit.relocs()[0].kind, RelocType::Abs64);
        let _ = SEC_RODATA;
    }
}

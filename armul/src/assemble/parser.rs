//! Tokeniser and per-line parser turning assembly text into [`AsmLine`]s.

use crate::bits::ShiftKind;
use crate::instr::{Cond, DataOp, Register};

use super::syntax::{
    AddressingMode, AsmInstr, AsmLine, Expression, Operand2Src, ShiftAmountSrc, ShiftSrc,
    TransferOffsetSrc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LineError {}

fn err(line: usize, message: impl Into<String>) -> LineError {
    LineError { line, message: message.into() }
}

/// Splits an instruction's operand text into a flat token stream: words are
/// separated by commas and whitespace, while `[` and `]` are emitted as
/// their own single-character tokens so addressing modes can be matched
/// without tracking comma-nesting.
fn tokenize(rest: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    };
    for c in rest.chars() {
        match c {
            ',' | ' ' | '\t' => flush(&mut current, &mut tokens),
            '[' | ']' => {
                flush(&mut current, &mut tokens);
                tokens.push(c.to_string());
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn parse_register(line: usize, tok: &str) -> Result<Register, LineError> {
    let upper = tok.to_ascii_uppercase();
    match upper.as_str() {
        "PC" | "R15" => Ok(Register::Pc),
        _ if upper.starts_with('R') => {
            let n: u8 = upper[1..].parse().map_err(|_| err(line, format!("bad register {tok:?}")))?;
            num_traits::FromPrimitive::from_u8(n).ok_or_else(|| err(line, format!("bad register {tok:?}")))
        }
        _ => Err(err(line, format!("expected register, found {tok:?}"))),
    }
}

fn parse_number(line: usize, tok: &str) -> Result<i64, LineError> {
    let (negative, tok) = if let Some(rest) = tok.strip_prefix('-') { (true, rest) } else { (false, tok) };
    let value = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(hex) = tok.strip_prefix('&') {
        i64::from_str_radix(hex, 16)
    } else {
        tok.parse::<i64>()
    }
    .map_err(|_| err(line, format!("bad number {tok:?}")))?;
    Ok(if negative { -value } else { value })
}

fn parse_expression(line: usize, tok: &str) -> Result<Expression, LineError> {
    let tok = tok.strip_prefix('#').unwrap_or(tok);
    let tok = tok.strip_prefix('=').unwrap_or(tok);
    if tok.starts_with(|c: char| c.is_ascii_digit()) || tok.starts_with('-') {
        Ok(Expression::Literal(parse_number(line, tok)?))
    } else {
        Ok(Expression::Label(tok.to_string()))
    }
}

fn shift_kind_from_name(name: &str) -> Option<ShiftKind> {
    match name {
        "LSL" => Some(ShiftKind::Lsl),
        "LSR" => Some(ShiftKind::Lsr),
        "ASR" => Some(ShiftKind::Asr),
        "ROR" => Some(ShiftKind::Ror),
        _ => None,
    }
}

fn parse_cond_and_s(remainder: &str) -> Option<(Cond, bool)> {
    let (cond_part, set_flags) = match remainder.strip_suffix('S') {
        Some(stripped) => (stripped, true),
        None => (remainder, false),
    };
    let cond = if cond_part.is_empty() { Cond::Al } else { cond_part.parse::<Cond>().ok()? };
    Some((cond, set_flags))
}

fn parse_cond_only(remainder: &str) -> Option<Cond> {
    if remainder.is_empty() { Some(Cond::Al) } else { remainder.parse::<Cond>().ok() }
}

const DATA_OPS: &[(&str, DataOp)] = &[
    ("AND", DataOp::And),
    ("EOR", DataOp::Eor),
    ("SUB", DataOp::Sub),
    ("RSB", DataOp::Rsb),
    ("ADD", DataOp::Add),
    ("TST", DataOp::Tst),
    ("TEQ", DataOp::Teq),
    ("CMP", DataOp::Cmp),
    ("ORR", DataOp::Orr),
    ("MOV", DataOp::Mov),
];

/// Parses the operand-2 shift suffix of a data-processing instruction
/// starting at `tokens[idx]`, if one is present.
fn parse_op2_shift(line: usize, tokens: &[String], idx: usize) -> Result<Option<ShiftSrc>, LineError> {
    let Some(tok) = tokens.get(idx) else { return Ok(None) };
    let Some(kind) = shift_kind_from_name(&tok.to_ascii_uppercase()) else { return Ok(None) };
    let amount_tok = tokens.get(idx + 1).ok_or_else(|| err(line, "missing shift amount"))?;
    let amount = if let Ok(r) = parse_register(line, amount_tok) {
        ShiftAmountSrc::Register(r)
    } else {
        let n = parse_number(line, amount_tok)?;
        ShiftAmountSrc::Constant(n as u8)
    };
    Ok(Some(ShiftSrc { kind, amount }))
}

fn parse_operand2(line: usize, tokens: &[String], idx: usize) -> Result<Operand2Src, LineError> {
    let tok = tokens.get(idx).ok_or_else(|| err(line, "missing operand 2"))?;
    if tok.starts_with('#') {
        return Ok(Operand2Src::Immediate(parse_expression(line, tok)?));
    }
    let reg = parse_register(line, tok)?;
    if let Some(shift) = parse_op2_shift(line, tokens, idx + 1)? {
        Ok(Operand2Src::ShiftedRegister(reg, shift))
    } else {
        Ok(Operand2Src::Register(reg))
    }
}

fn parse_data(
    line: usize,
    op: DataOp,
    cond: Cond,
    set_flags: bool,
    tokens: &[String],
) -> Result<AsmInstr, LineError> {
    if op == DataOp::Mov {
        let rd = parse_register(line, tokens.first().ok_or_else(|| err(line, "missing Rd"))?)?;
        let op2 = parse_operand2(line, tokens, 1)?;
        return Ok(AsmInstr::Data { op, cond, set_flags, rd, rn: Register::R0, op2 });
    }
    if matches!(op, DataOp::Tst | DataOp::Teq | DataOp::Cmp) {
        let rn = parse_register(line, tokens.first().ok_or_else(|| err(line, "missing Rn"))?)?;
        let op2 = parse_operand2(line, tokens, 1)?;
        return Ok(AsmInstr::Data { op, cond, set_flags, rd: Register::R0, rn, op2 });
    }
    let rd = parse_register(line, tokens.first().ok_or_else(|| err(line, "missing Rd"))?)?;
    let rn = parse_register(line, tokens.get(1).ok_or_else(|| err(line, "missing Rn"))?)?;
    let op2 = parse_operand2(line, tokens, 2)?;
    Ok(AsmInstr::Data { op, cond, set_flags, rd, rn, op2 })
}

fn parse_multiply(line: usize, accumulate: bool, cond: Cond, set_flags: bool, tokens: &[String]) -> Result<AsmInstr, LineError> {
    let rd = parse_register(line, tokens.first().ok_or_else(|| err(line, "missing Rd"))?)?;
    let rm = parse_register(line, tokens.get(1).ok_or_else(|| err(line, "missing Rm"))?)?;
    let rs = parse_register(line, tokens.get(2).ok_or_else(|| err(line, "missing Rs"))?)?;
    let rn = if accumulate {
        parse_register(line, tokens.get(3).ok_or_else(|| err(line, "missing Rn"))?)?
    } else {
        Register::R0
    };
    Ok(AsmInstr::Multiply { accumulate, cond, set_flags, rd, rm, rs, rn })
}

fn parse_transfer_offset(line: usize, tok: &str) -> Result<TransferOffsetSrc, LineError> {
    if tok.starts_with('#') || tok.starts_with('-') || tok.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Ok(TransferOffsetSrc::Immediate(parse_expression(line, tok)?))
    } else {
        Ok(TransferOffsetSrc::Register(parse_register(line, tok)?))
    }
}

/// Parses `LDR`/`STR`'s addressing mode, expecting `tokens[idx]` to be `[`.
fn parse_addressing_mode(line: usize, tokens: &[String], idx: usize) -> Result<AddressingMode, LineError> {
    if tokens.get(idx).map(String::as_str) != Some("[") {
        return Err(err(line, "expected '['"));
    }
    let base = parse_register(line, tokens.get(idx + 1).ok_or_else(|| err(line, "missing base register"))?)?;
    let mut pos = idx + 2;

    if tokens.get(pos).map(String::as_str) == Some("]") {
        // `[Rn]`, optionally followed by a post-indexed offset.
        pos += 1;
        return match tokens.get(pos) {
            None => Ok(AddressingMode::PreIndexed { base, offset: None }),
            Some(tok) => {
                let (sign, tok) = tok.strip_prefix('-').map_or((true, tok.as_str()), |rest| (false, rest));
                Ok(AddressingMode::PostIndexed { base, sign, offset: parse_transfer_offset(line, tok)? })
            }
        };
    }

    let raw_tok = tokens.get(pos).ok_or_else(|| err(line, "missing offset"))?;
    let (sign, tok) = raw_tok.strip_prefix('-').map_or((true, raw_tok.as_str()), |rest| (false, rest));
    let mut offset = parse_transfer_offset(line, tok)?;
    pos += 1;

    if let TransferOffsetSrc::Register(r) = offset {
        if let Some(shift) = parse_op2_shift(line, tokens, pos)? {
            offset = match shift.amount {
                ShiftAmountSrc::Constant(n) => TransferOffsetSrc::ShiftedRegister(r, shift.kind, n),
                ShiftAmountSrc::Register(_) => {
                    return Err(err(line, "transfer offset shift amount must be a constant"));
                }
            };
            pos += 2;
        }
    }

    if tokens.get(pos).map(String::as_str) != Some("]") {
        return Err(err(line, "missing ']'"));
    }
    Ok(AddressingMode::PreIndexed { base, offset: Some((sign, offset)) })
}

fn parse_instr(line: usize, tokens: &[String]) -> Result<AsmInstr, LineError> {
    let mnemonic = tokens[0].to_ascii_uppercase();
    let operands = &tokens[1..];

    if mnemonic == "B" || (mnemonic.starts_with('B') && mnemonic.len() <= 3) {
        if let Some(cond) = parse_cond_only(&mnemonic[1..]) {
            let target = operands.first().ok_or_else(|| err(line, "missing branch target"))?.clone();
            return Ok(AsmInstr::Branch { cond, target });
        }
    }

    for prefix in ["LSL", "LSR", "ASR", "ROR"] {
        if let Some(rest) = mnemonic.strip_prefix(prefix) {
            if let Some((cond, set_flags)) = parse_cond_and_s(rest) {
                let kind = shift_kind_from_name(prefix).unwrap();
                let rd = parse_register(line, operands.first().ok_or_else(|| err(line, "missing Rd"))?)?;
                // `LSL Rd, #n` shifts Rd in place; `LSL Rd, Rm, #n` shifts Rm
                // into Rd. Both forms exist in the wild.
                let (rm, amount_idx) = if operands.len() >= 3 {
                    (parse_register(line, &operands[1])?, 2)
                } else {
                    (rd, 1)
                };
                let amount_tok = operands.get(amount_idx).ok_or_else(|| err(line, "missing shift amount"))?;
                let amount = if let Ok(r) = parse_register(line, amount_tok) {
                    ShiftAmountSrc::Register(r)
                } else {
                    ShiftAmountSrc::Constant(parse_number(line, amount_tok)? as u8)
                };
                let op2 = Operand2Src::ShiftedRegister(rm, ShiftSrc { kind, amount });
                return Ok(AsmInstr::Data { op: DataOp::Mov, cond, set_flags, rd, rn: Register::R0, op2 });
            }
        }
    }

    for &(name, op) in DATA_OPS {
        if let Some(rest) = mnemonic.strip_prefix(name) {
            if let Some((cond, set_flags)) = parse_cond_and_s(rest) {
                if op == DataOp::And && cond == Cond::Eq && !set_flags {
                    let regs: Result<Vec<_>, _> = operands.iter().map(|t| parse_register(line, t)).collect();
                    if let Ok(regs) = regs {
                        if regs.len() == 3 && regs.iter().all(|r| *r == Register::R0) {
                            return Ok(AsmInstr::Halt);
                        }
                    }
                }
                return parse_data(line, op, cond, set_flags, operands);
            }
        }
    }

    for (name, accumulate) in [("MLA", true), ("MUL", false)] {
        if let Some(rest) = mnemonic.strip_prefix(name) {
            if let Some((cond, set_flags)) = parse_cond_and_s(rest) {
                return parse_multiply(line, accumulate, cond, set_flags, operands);
            }
        }
    }

    for (name, load) in [("LDR", true), ("STR", false)] {
        if let Some(rest) = mnemonic.strip_prefix(name) {
            if let Some(cond) = parse_cond_only(rest) {
                let rd = parse_register(line, operands.first().ok_or_else(|| err(line, "missing Rd"))?)?;
                if load {
                    if let Some(lit) = operands.get(1).and_then(|t| t.strip_prefix('=')) {
                        let value = parse_expression(line, lit)?;
                        return Ok(AsmInstr::LoadLiteral { cond, rd, value });
                    }
                }
                let mode = parse_addressing_mode(line, operands, 1)?;
                return Ok(AsmInstr::Transfer { load, cond, rd, mode });
            }
        }
    }

    Err(err(line, format!("unrecognised mnemonic {:?}", tokens[0])))
}

/// Splits off a leading `label:` from a source line, if present.
fn split_label(text: &str) -> (Option<String>, &str) {
    if let Some(colon) = text.find(':') {
        let candidate = &text[..colon];
        if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return (Some(candidate.to_string()), text[colon + 1..].trim_start());
        }
    }
    (None, text)
}

/// Parses one line of source text (1-indexed for diagnostics).
pub fn parse_line(line_no: usize, raw: &str) -> Result<AsmLine, LineError> {
    let without_comment = raw.split(';').next().unwrap_or("");
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        return Ok(AsmLine { label: None, instr: None });
    }
    let (label, rest) = split_label(trimmed);
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(AsmLine { label, instr: None });
    }
    let tokens = tokenize(rest);
    if tokens.is_empty() {
        return Ok(AsmLine { label, instr: None });
    }
    let instr = parse_instr(line_no, &tokens)?;
    Ok(AsmLine { label, instr: Some(instr) })
}

/// Parses a full program, one [`AsmLine`] per source line.
pub fn parse(source: &str) -> Result<Vec<AsmLine>, LineError> {
    source.lines().enumerate().map(|(i, line)| parse_line(i + 1, line)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_label_and_mov() {
        let line = parse_line(1, "start: MOV R0, #5").unwrap();
        assert_eq!(line.label, Some("start".to_string()));
        assert!(matches!(line.instr, Some(AsmInstr::Data { op: DataOp::Mov, .. })));
    }

    #[test]
    fn parses_andeq_halt() {
        let line = parse_line(1, "ANDEQ R0, R0, R0").unwrap();
        assert_eq!(line.instr, Some(AsmInstr::Halt));
    }

    #[test]
    fn parses_conditional_and_flag_setting_suffix() {
        let line = parse_line(1, "ADDEQS R0, R1, R2").unwrap();
        match line.instr {
            Some(AsmInstr::Data { op: DataOp::Add, cond: Cond::Eq, set_flags: true, .. }) => {}
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_ldr_literal_pseudo() {
        let line = parse_line(1, "LDR R0, =0x12345678").unwrap();
        assert!(matches!(line.instr, Some(AsmInstr::LoadLiteral { .. })));
    }

    #[test]
    fn parses_pre_and_post_indexed_transfer() {
        let pre = parse_line(1, "LDR R0, [R1, #4]").unwrap();
        assert!(matches!(
            pre.instr,
            Some(AsmInstr::Transfer { mode: AddressingMode::PreIndexed { .. }, .. })
        ));
        let post = parse_line(1, "STR R0, [R1], #4").unwrap();
        assert!(matches!(
            post.instr,
            Some(AsmInstr::Transfer { mode: AddressingMode::PostIndexed { .. }, .. })
        ));
    }

    #[test]
    fn parses_branch_with_condition() {
        let line = parse_line(1, "BNE loop").unwrap();
        assert_eq!(line.instr, Some(AsmInstr::Branch { cond: Cond::Ne, target: "loop".to_string() }));
    }

    #[test]
    fn parses_shift_pseudo_mnemonic() {
        let line = parse_line(1, "LSL R0, R1, #4").unwrap();
        match line.instr {
            Some(AsmInstr::Data { op: DataOp::Mov, op2: Operand2Src::ShiftedRegister(..), .. }) => {}
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_mnemonic() {
        assert!(parse_line(1, "FROB R0").is_err());
    }
}

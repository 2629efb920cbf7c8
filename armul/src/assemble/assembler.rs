//! Two-pass assembly: resolve label addresses, then lower every
//! instruction-bearing line into a machine word, spilling large constants
//! into a literal pool appended after the program.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::bits;
use crate::instr::{self, Cond, Instr, Operand2, Register, RotatedImmediate, Shift, ShiftAmount, TransferOperand};

use super::parser::{self, LineError};
use super::syntax::{
    AddressingMode, AsmInstr, AsmLine, Expression, Operand2Src, ShiftAmountSrc, ShiftSrc, TransferOffsetSrc,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    Parse(LineError),
    UnknownLabel { line: usize, label: String },
    ImmediateNotEncodable { line: usize, value: u32 },
    Encode { line: usize, message: String },
}

impl std::fmt::Display for AssembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssembleError::Parse(e) => write!(f, "{e}"),
            AssembleError::UnknownLabel { line, label } => write!(f, "line {line}: unknown label {label:?}"),
            AssembleError::ImmediateNotEncodable { line, value } => {
                write!(f, "line {line}: immediate {value:#x} cannot be encoded as a rotated 8-bit constant")
            }
            AssembleError::Encode { line, message } => write!(f, "line {line}: {message}"),
        }
    }
}

impl std::error::Error for AssembleError {}

impl From<LineError> for AssembleError {
    fn from(value: LineError) -> Self {
        AssembleError::Parse(value)
    }
}

struct InstrLine {
    line_no: usize,
    instr: AsmInstr,
}

/// Assembles `source` into a flat sequence of 32-bit program words. Any
/// literal pool entries created by `LDR Rd, =expr` are appended after the
/// program's own instructions.
///
/// # Errors
///
/// Returns [`AssembleError`] on a syntax error, an unresolvable label
/// reference, an out-of-range encoding, or an immediate that cannot be
/// represented in any of this ISA's operand shapes.
pub fn assemble(source: &str) -> Result<Vec<u32>, AssembleError> {
    let lines = parser::parse(source)?;
    debug!(lines = lines.len(), "pass 1: resolving label addresses");
    let (labels, instr_lines) = resolve_labels(&lines);

    let instr_count = instr_lines.len() as u32;
    let mut words = Vec::with_capacity(instr_lines.len());
    let mut pool: Vec<u32> = Vec::new();

    debug!(instructions = instr_count, labels = labels.len(), "pass 2: lowering instructions");
    for (index, entry) in instr_lines.into_iter().enumerate() {
        let (built, cond) = lower(&entry, index as u32, instr_count, &labels, &mut pool)?;
        let word = instr::encode(built, cond).map_err(|e| AssembleError::Encode {
            line: entry.line_no,
            message: e.to_string(),
        })?;
        words.push(word);
    }

    let pool_words = pool.len();
    words.extend(pool);
    info!(words = words.len(), pool_words, "assembly succeeded");
    Ok(words)
}

/// Walks every line once, assigning each instruction-bearing line the
/// address of its word and every label the address of whatever
/// instruction follows it (on the same line or a later one).
fn resolve_labels(lines: &[AsmLine]) -> (HashMap<String, u32>, Vec<InstrLine>) {
    let mut labels = HashMap::new();
    let mut instr_lines = Vec::new();
    let mut address = 0u32;

    for (i, line) in lines.iter().enumerate() {
        if let Some(label) = &line.label {
            labels.insert(label.clone(), address);
        }
        if let Some(instr) = &line.instr {
            instr_lines.push(InstrLine { line_no: i + 1, instr: instr.clone() });
            address += 4;
        }
    }

    (labels, instr_lines)
}

fn resolve_expression(line: usize, expr: &Expression, labels: &HashMap<String, u32>) -> Result<u32, AssembleError> {
    match expr {
        Expression::Literal(n) => Ok(*n as u32),
        Expression::Label(name) => labels
            .get(name)
            .copied()
            .ok_or_else(|| AssembleError::UnknownLabel { line, label: name.clone() }),
    }
}

fn lower_shift(shift: &ShiftSrc) -> Shift {
    let amount = match shift.amount {
        ShiftAmountSrc::Constant(n) => ShiftAmount::Constant(n),
        ShiftAmountSrc::Register(r) => ShiftAmount::Register(r),
    };
    Shift { kind: shift.kind, amount }
}

fn lower_operand2(line: usize, op2: &Operand2Src, labels: &HashMap<String, u32>) -> Result<Operand2, AssembleError> {
    match op2 {
        Operand2Src::Immediate(expr) => {
            let value = resolve_expression(line, expr, labels)?;
            let rotated = RotatedImmediate::encode(value)
                .ok_or(AssembleError::ImmediateNotEncodable { line, value })?;
            Ok(Operand2::Constant(rotated))
        }
        Operand2Src::Register(r) => {
            Ok(Operand2::Shifted(*r, Shift { kind: bits::ShiftKind::Lsl, amount: ShiftAmount::Constant(0) }))
        }
        Operand2Src::ShiftedRegister(r, shift) => Ok(Operand2::Shifted(*r, lower_shift(shift))),
    }
}

fn lower_transfer_offset(
    line: usize,
    offset: &TransferOffsetSrc,
    labels: &HashMap<String, u32>,
) -> Result<TransferOperand, AssembleError> {
    match offset {
        TransferOffsetSrc::Immediate(expr) => {
            let value = resolve_expression(line, expr, labels)?;
            Ok(TransferOperand::Constant(value as u16))
        }
        TransferOffsetSrc::Register(r) => Ok(TransferOperand::Shifted(*r, bits::ShiftKind::Lsl, 0)),
        TransferOffsetSrc::ShiftedRegister(r, kind, amount) => Ok(TransferOperand::Shifted(*r, *kind, *amount)),
    }
}

fn lower_load_literal(
    line: usize,
    index: u32,
    instr_count: u32,
    rd: Register,
    value: &Expression,
    labels: &HashMap<String, u32>,
    pool: &mut Vec<u32>,
) -> Result<Instr, AssembleError> {
    let value = resolve_expression(line, value, labels)?;

    if let Some(rotated) = RotatedImmediate::encode(value) {
        return Ok(Instr::Data {
            op: instr::DataOp::Mov,
            set_flags: false,
            rd,
            rn: Register::R0,
            op2: Operand2::Constant(rotated),
        });
    }

    let pool_index = pool.len() as u32;
    pool.push(value);
    let pool_address = instr_count * 4 + pool_index * 4;
    let signed_offset = pool_address as i32 - (index as i32 * 4 + 8);

    Ok(Instr::SingleTransfer {
        load: true,
        pre_index: true,
        add: signed_offset >= 0,
        rd,
        rn: Register::Pc,
        offset: TransferOperand::Constant(signed_offset.unsigned_abs() as u16),
    })
}

fn lower(
    entry: &InstrLine,
    index: u32,
    instr_count: u32,
    labels: &HashMap<String, u32>,
    pool: &mut Vec<u32>,
) -> Result<(Instr, Cond), AssembleError> {
    let line = entry.line_no;
    match &entry.instr {
        AsmInstr::Halt => Ok((Instr::Halt, Cond::Al)),
        AsmInstr::Data { op, cond, set_flags, rd, rn, op2 } => {
            // CMP/TST/TEQ always update flags; the textual S suffix (if
            // any) is meaningless for them and carries no extra effect.
            let set_flags = *set_flags || matches!(op, instr::DataOp::Tst | instr::DataOp::Teq | instr::DataOp::Cmp);
            let op2 = lower_operand2(line, op2, labels)?;
            Ok((Instr::Data { op: *op, set_flags, rd: *rd, rn: *rn, op2 }, *cond))
        }
        AsmInstr::Multiply { accumulate, cond, set_flags, rd, rm, rs, rn } => Ok((
            Instr::Multiply { accumulate: *accumulate, set_flags: *set_flags, rd: *rd, rm: *rm, rs: *rs, rn: *rn },
            *cond,
        )),
        AsmInstr::Transfer { load, cond, rd, mode } => {
            let (pre_index, add, rn, offset) = match mode {
                AddressingMode::PreIndexed { base, offset: None } => {
                    (true, true, *base, TransferOperand::Constant(0))
                }
                AddressingMode::PreIndexed { base, offset: Some((sign, offset)) } => {
                    (true, *sign, *base, lower_transfer_offset(line, offset, labels)?)
                }
                AddressingMode::PostIndexed { base, sign, offset } => {
                    (false, *sign, *base, lower_transfer_offset(line, offset, labels)?)
                }
            };
            Ok((Instr::SingleTransfer { load: *load, pre_index, add, rd: *rd, rn, offset }, *cond))
        }
        AsmInstr::LoadLiteral { cond, rd, value } => {
            Ok((lower_load_literal(line, index, instr_count, *rd, value, labels, pool)?, *cond))
        }
        AsmInstr::Branch { cond, target } => {
            let target_addr = labels
                .get(target)
                .copied()
                .ok_or_else(|| AssembleError::UnknownLabel { line, label: target.clone() })?;
            let offset = target_addr as i32 - (index as i32 * 4 + 8);
            Ok((Instr::Branch { offset }, *cond))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assembles_mov_and_halt() {
        let words = assemble("MOV R0, #5\nANDEQ R0,R0,R0\n").unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1], 0);
    }

    #[test]
    fn resolves_forward_branch_label() {
        let words = assemble("B skip\nMOV R0,#1\nskip: ANDEQ R0,R0,R0\n").unwrap();
        let (cond, decoded) = instr::decode(words[0]).unwrap();
        assert_eq!(cond, Cond::Al);
        assert_eq!(decoded, Some(Instr::Branch { offset: 0 }));
    }

    #[test]
    fn large_literal_spills_to_pool() {
        let words = assemble("LDR R0, =0x12345678\nANDEQ R0,R0,R0\n").unwrap();
        // One instruction word for the LDR, one for the halt, one pool word.
        assert_eq!(words.len(), 3);
        assert_eq!(words[2], 0x1234_5678);
    }

    #[test]
    fn unknown_label_is_an_error() {
        assert!(assemble("B missing\n").is_err());
    }

    #[test]
    fn unencodable_immediate_is_an_error() {
        assert!(assemble("MOV R0, #0x12345678\n").is_err());
    }
}

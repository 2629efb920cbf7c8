//! The instruction set: a sum type with one variant per class (DPI, MUL,
//! SDT, BRA, the all-zero halt sentinel), each carrying only the fields
//! meaningful to that class.

use std::fmt::Display;

use num_derive::FromPrimitive;
use serde_repr::Serialize_repr;

use crate::bits::ShiftKind;

/// One of the sixteen general registers. `Pc` doubles as the program
/// counter; CPSR is not addressable through this type (see
/// [`crate::registers::Registers`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, Serialize_repr)]
#[repr(u8)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    /// The program counter.
    Pc,
}

impl Register {
    pub fn from_u4(value: u32, offset: u32) -> Self {
        num_traits::FromPrimitive::from_u32((value >> offset) & 0xF).unwrap()
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Register::Pc {
            write!(f, "PC")
        } else {
            write!(f, "R{}", *self as u8)
        }
    }
}

/// A condition under which an instruction executes. The discriminants are
/// the real ARM condition-code encodings for the subset this ISA exposes;
/// the unused codes (`CS`, `CC`, `MI`, `PL`, `VS`, `VC`, `HI`, `LS`) are
/// simply never produced by the assembler or decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize_repr)]
#[repr(u8)]
pub enum Cond {
    Eq = 0,
    Ne = 1,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
    Al = 14,
}

impl Display for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cond::Al => Ok(()),
            Cond::Eq => write!(f, "EQ"),
            Cond::Ne => write!(f, "NE"),
            Cond::Ge => write!(f, "GE"),
            Cond::Lt => write!(f, "LT"),
            Cond::Gt => write!(f, "GT"),
            Cond::Le => write!(f, "LE"),
        }
    }
}

impl std::str::FromStr for Cond {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EQ" => Ok(Cond::Eq),
            "NE" => Ok(Cond::Ne),
            "GE" => Ok(Cond::Ge),
            "LT" => Ok(Cond::Lt),
            "GT" => Ok(Cond::Gt),
            "LE" => Ok(Cond::Le),
            "AL" | "" => Ok(Cond::Al),
            _ => Err(()),
        }
    }
}

/// The data-processing opcodes this ISA supports. Discriminants match the
/// real ARM encoding of the same mnemonics; the gaps (`ADC`, `SBC`, `RSC`,
/// `CMN`, `BIC`, `MVN`) are not implemented by this subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum DataOp {
    And = 0,
    Eor = 1,
    Sub = 2,
    Rsb = 3,
    Add = 4,
    Tst = 8,
    Teq = 9,
    Cmp = 10,
    Orr = 12,
    Mov = 13,
}

impl Display for DataOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataOp::And => "AND",
            DataOp::Eor => "EOR",
            DataOp::Sub => "SUB",
            DataOp::Rsb => "RSB",
            DataOp::Add => "ADD",
            DataOp::Tst => "TST",
            DataOp::Teq => "TEQ",
            DataOp::Cmp => "CMP",
            DataOp::Orr => "ORR",
            DataOp::Mov => "MOV",
        };
        write!(f, "{name}")
    }
}

impl DataOp {
    /// Whether this opcode writes its result to `rd`, as opposed to only
    /// updating condition codes (`TST`, `TEQ`, `CMP`).
    #[must_use]
    pub const fn writes_result(self) -> bool {
        !matches!(self, DataOp::Tst | DataOp::Teq | DataOp::Cmp)
    }

    /// Whether this opcode is logical (flags take the shifter's carry-out)
    /// as opposed to arithmetic (flags take the adder's carry-out).
    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, DataOp::And | DataOp::Eor | DataOp::Tst | DataOp::Teq | DataOp::Orr | DataOp::Mov)
    }
}

/// A shift applied to a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub kind: ShiftKind,
    pub amount: ShiftAmount,
}

impl Display for Shift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.amount == ShiftAmount::Constant(0) {
            return Ok(());
        }
        let kind = match self.kind {
            ShiftKind::Lsl => "LSL",
            ShiftKind::Lsr => "LSR",
            ShiftKind::Asr => "ASR",
            ShiftKind::Ror => "ROR",
        };
        write!(f, ",{kind} {}", self.amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftAmount {
    /// A shift amount fixed at assembly time, in `0..=31`.
    Constant(u8),
    /// A shift amount read from the bottom byte of a register at execution
    /// time. Only valid for DPI operand 2, never for SDT offsets.
    Register(Register),
}

impl Display for ShiftAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftAmount::Constant(n) => write!(f, "#{n}"),
            ShiftAmount::Register(r) => write!(f, "{r}"),
        }
    }
}

/// An 8-bit immediate rotated right by an even amount, the only constant
/// shape a DPI instruction can encode in its 12-bit operand-2 field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotatedImmediate {
    pub imm8: u8,
    /// The encoded word stores `half_rotate` directly; the actual rotation
    /// applied is `half_rotate * 2`.
    pub half_rotate: u8,
}

impl Display for RotatedImmediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl RotatedImmediate {
    /// Finds the smallest rotation that lets `value` be represented as an
    /// 8-bit immediate rotated right by an even amount. Returns `None` if no
    /// such rotation exists.
    #[must_use]
    pub fn encode(value: u32) -> Option<Self> {
        for half_rotate in 0..16u32 {
            let candidate = value.rotate_left(half_rotate * 2);
            if candidate <= 0xFF {
                return Some(Self {
                    imm8: candidate as u8,
                    half_rotate: half_rotate as u8,
                });
            }
        }
        None
    }

    /// Evaluates this constant, along with the barrel shifter's carry-out.
    #[must_use]
    pub fn value(self) -> u32 {
        (u32::from(self.imm8)).rotate_right(u32::from(self.half_rotate) * 2)
    }

    /// Carry-out as if this constant had been produced by the barrel
    /// shifter rotating `imm8` right by `half_rotate * 2`: a rotation of
    /// zero never sets carry, matching [`crate::bits::shift`]'s convention
    /// for a shift amount of zero.
    #[must_use]
    pub fn carry_out(self) -> bool {
        if self.half_rotate == 0 { false } else { crate::bits::is_negative(self.value()) }
    }
}

/// The second operand of a data-processing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand2 {
    Constant(RotatedImmediate),
    Shifted(Register, Shift),
}

impl Display for Operand2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand2::Constant(c) => write!(f, "#{c}"),
            Operand2::Shifted(r, shift) => write!(f, "{r}{shift}"),
        }
    }
}

impl Operand2 {
    #[must_use]
    pub const fn is_register_specified_shift(self) -> bool {
        matches!(
            self,
            Operand2::Shifted(_, Shift { amount: ShiftAmount::Register(_), .. })
        )
    }
}

/// The offset operand of a single-data-transfer instruction. Unlike
/// [`Operand2`], the shift amount can never be register-specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOperand {
    /// A 12-bit unsigned immediate offset.
    Constant(u16),
    Shifted(Register, ShiftKind, u8),
}

impl Display for TransferOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOperand::Constant(n) => write!(f, "#{n}"),
            TransferOperand::Shifted(r, kind, amount) => {
                let kind = match kind {
                    ShiftKind::Lsl => "LSL",
                    ShiftKind::Lsr => "LSR",
                    ShiftKind::Asr => "ASR",
                    ShiftKind::Ror => "ROR",
                };
                write!(f, "{r},{kind} #{amount}")
            }
        }
    }
}

/// A decoded instruction, one variant per class (spec §3's `DPI`, `MUL`,
/// `SDT`, `BRA`, `ZER`; `NUL` is represented by the inner `None` that
/// [`crate::instr::decode`] returns alongside a recognised condition code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Data {
        op: DataOp,
        set_flags: bool,
        /// Destination register. Unused (and conventionally `R0`) for
        /// `TST`/`TEQ`/`CMP`.
        rd: Register,
        /// First operand register. Unused (and conventionally `R0`) for
        /// `MOV`.
        rn: Register,
        op2: Operand2,
    },
    Multiply {
        /// `MLA` rather than `MUL`.
        accumulate: bool,
        set_flags: bool,
        rd: Register,
        rm: Register,
        rs: Register,
        /// Accumulate operand. Unused (and conventionally `R0`) for `MUL`.
        rn: Register,
    },
    SingleTransfer {
        load: bool,
        pre_index: bool,
        /// Add the offset (as opposed to subtract).
        add: bool,
        rd: Register,
        rn: Register,
        offset: TransferOperand,
    },
    /// A word-aligned PC-relative branch. `offset` is the signed byte
    /// displacement already biased for the pipeline (spec §4.F: includes
    /// the `-8` adjustment), so execution simply adds it to `PC`.
    Branch { offset: i32 },
    /// The all-zero halt sentinel (`ANDEQ R0,R0,R0` happens to encode to
    /// this exact bit pattern).
    Halt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rotated_immediate_round_trips_small_values() {
        for v in [0u32, 1, 255, 256, 0xFF00, 0xFF00_0000] {
            let encoded = RotatedImmediate::encode(v);
            if let Some(c) = encoded {
                assert_eq!(c.value(), v);
            }
        }
    }

    #[test]
    fn rotated_immediate_rejects_unencodable_values() {
        assert!(RotatedImmediate::encode(0x1234_5678).is_none());
    }

    #[test]
    fn rotated_immediate_picks_smallest_rotation() {
        // 0xFF fits with rotation 0.
        let c = RotatedImmediate::encode(0xFF).unwrap();
        assert_eq!(c.half_rotate, 0);
        assert_eq!(c.imm8, 0xFF);
    }
}

//! Disassembly: rendering a decoded [`Instr`] back to ARM-style assembly
//! text, used by the emulator's diagnostic output.

use std::fmt::Display;

use super::ty::{Cond, DataOp, Instr};

impl Instr {
    /// Renders this instruction under `cond` as assembly text, e.g.
    /// `ADDEQ R0,R1,#4`.
    #[must_use]
    pub fn to_asm(self, cond: Cond) -> String {
        match self {
            Instr::Halt => "ANDEQ R0,R0,R0".to_string(),
            Instr::Data { op, set_flags, rd, rn, op2 } => {
                let s = if set_flags { "S" } else { "" };
                if matches!(op, DataOp::Mov) {
                    format!("{op}{cond}{s} {rd},{op2}")
                } else if op.writes_result() {
                    format!("{op}{cond}{s} {rd},{rn},{op2}")
                } else {
                    format!("{op}{cond} {rn},{op2}")
                }
            }
            Instr::Multiply { accumulate, set_flags, rd, rm, rs, rn } => {
                let s = if set_flags { "S" } else { "" };
                if accumulate {
                    format!("MLA{cond}{s} {rd},{rm},{rs},{rn}")
                } else {
                    format!("MUL{cond}{s} {rd},{rm},{rs}")
                }
            }
            Instr::SingleTransfer { load, pre_index, add, rd, rn, offset } => {
                let op = if load { "LDR" } else { "STR" };
                let sign = if add { "" } else { "-" };
                if pre_index {
                    format!("{op}{cond} {rd},[{rn},{sign}{offset}]")
                } else {
                    format!("{op}{cond} {rd},[{rn}],{sign}{offset}")
                }
            }
            Instr::Branch { offset } => format!("B{cond} #{offset}"),
        }
    }
}

impl Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_asm(Cond::Al))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{DataOp as Op, Operand2, Register, RotatedImmediate};
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_mov_with_immediate() {
        let instr = Instr::Data {
            op: Op::Mov,
            set_flags: false,
            rd: Register::R0,
            rn: Register::R0,
            op2: Operand2::Constant(RotatedImmediate::encode(5).unwrap()),
        };
        assert_eq!(instr.to_asm(Cond::Al), "MOV R0,#5");
    }

    #[test]
    fn renders_halt() {
        assert_eq!(Instr::Halt.to_asm(Cond::Eq), "ANDEQ R0,R0,R0");
    }
}

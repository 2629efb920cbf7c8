//! Decoding 32-bit words into [`Instr`] values.

use num_traits::FromPrimitive;

use crate::bits::ShiftKind;

use super::ty::{Cond, DataOp, Instr, Operand2, Register, RotatedImmediate, Shift, ShiftAmount, TransferOperand};

fn shift_kind_from_bits(bits: u32) -> ShiftKind {
    match bits & 0b11 {
        0b00 => ShiftKind::Lsl,
        0b01 => ShiftKind::Lsr,
        0b10 => ShiftKind::Asr,
        _ => ShiftKind::Ror,
    }
}

fn decode_operand2(word: u32) -> Operand2 {
    if word & (1 << 25) != 0 {
        let half_rotate = ((word >> 8) & 0xF) as u8;
        let imm8 = (word & 0xFF) as u8;
        Operand2::Constant(RotatedImmediate { imm8, half_rotate })
    } else {
        let rm = Register::from_u4(word, 0);
        let kind = shift_kind_from_bits(word >> 5);
        let amount = if word & (1 << 4) != 0 {
            ShiftAmount::Register(Register::from_u4(word, 8))
        } else {
            ShiftAmount::Constant(((word >> 7) & 0x1F) as u8)
        };
        Operand2::Shifted(rm, Shift { kind, amount })
    }
}

fn decode_data(word: u32) -> Option<Instr> {
    let op = DataOp::from_u32((word >> 21) & 0xF)?;
    let set_flags = word & (1 << 20) != 0;
    let rn = Register::from_u4(word, 16);
    let rd = Register::from_u4(word, 12);
    let op2 = decode_operand2(word);
    Some(Instr::Data { op, set_flags, rd, rn, op2 })
}

fn decode_multiply(word: u32) -> Option<Instr> {
    // bits 27-22 == 0, bits 7-4 == 0b1001 identify MUL/MLA.
    if (word >> 22) & 0x3F != 0 || (word >> 4) & 0xF != 0b1001 {
        return None;
    }
    let accumulate = word & (1 << 21) != 0;
    let set_flags = word & (1 << 20) != 0;
    let rd = Register::from_u4(word, 16);
    let rn = Register::from_u4(word, 12);
    let rs = Register::from_u4(word, 8);
    let rm = Register::from_u4(word, 0);
    Some(Instr::Multiply { accumulate, set_flags, rd, rm, rs, rn })
}

fn decode_single_transfer(word: u32) -> Instr {
    let load = word & (1 << 20) != 0;
    let pre_index = word & (1 << 24) != 0;
    let add = word & (1 << 23) != 0;
    let rn = Register::from_u4(word, 16);
    let rd = Register::from_u4(word, 12);
    let offset = if word & (1 << 25) != 0 {
        let rm = Register::from_u4(word, 0);
        let kind = shift_kind_from_bits(word >> 5);
        let amount = ((word >> 7) & 0x1F) as u8;
        TransferOperand::Shifted(rm, kind, amount)
    } else {
        TransferOperand::Constant((word & 0xFFF) as u16)
    };
    Instr::SingleTransfer { load, pre_index, add, rd, rn, offset }
}

fn decode_branch(word: u32) -> Instr {
    let raw = word & 0x00FF_FFFF;
    // Sign-extend the 24-bit word offset, then scale to bytes.
    let signed = if raw & 0x0080_0000 != 0 { (raw | 0xFF00_0000) as i32 } else { raw as i32 };
    Instr::Branch { offset: signed * 4 }
}

/// Decodes a 32-bit instruction word.
///
/// Returns `Ok((cond, None))` for words this ISA leaves undefined (the
/// `NUL` class), and never fails outright: every 32-bit pattern either
/// decodes to an instruction or is recognised as undefined.
#[must_use]
pub fn decode(word: u32) -> Option<(Cond, Option<Instr>)> {
    // The halt sentinel must be checked before generic DPI decoding: it is
    // the literal all-zero word, which would otherwise decode as a
    // perfectly valid (if useless) `ANDEQ R0,R0,R0`.
    if word == 0 {
        return Some((Cond::Eq, Some(Instr::Halt)));
    }

    let cond = Cond::from_u32(word >> 28)?;
    let class_bits = (word >> 25) & 0b111;

    let instr = match class_bits {
        0b101 => Some(decode_branch(word)),
        0b010 | 0b011 => Some(decode_single_transfer(word)),
        0b000 | 0b001 => decode_multiply(word).or_else(|| decode_data(word)),
        _ => None,
    };

    Some((cond, instr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_word_decodes_to_halt() {
        assert_eq!(decode(0), Some((Cond::Eq, Some(Instr::Halt))));
    }

    #[test]
    fn branch_sign_extends_negative_offset() {
        let word = (0b1110 << 28) | (0b101 << 25) | 0x00FF_FFFF;
        let (cond, instr) = decode(word).unwrap();
        assert_eq!(cond, Cond::Al);
        assert_eq!(instr, Some(Instr::Branch { offset: -4 }));
    }
}

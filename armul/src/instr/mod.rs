//! Instruction representation, encoding and decoding.

mod decode;
mod display;
mod encode;
mod ty;

pub use decode::decode;
pub use encode::{EncodeError, encode};
pub use ty::{
    Cond, DataOp, Instr, Operand2, Register, RotatedImmediate, Shift, ShiftAmount, TransferOperand,
};

//! A two-pass assembler and pipelined emulator for a small fixed-width
//! 32-bit instruction set in the style of early ARM.

pub mod assemble;
pub mod bits;
pub mod instr;
pub mod memory;
pub mod mode;
pub mod processor;
pub mod registers;

/// End-to-end checks running a source string through [`assemble::assemble`]
/// and then to completion on a [`processor::Processor`].
#[cfg(test)]
mod end_to_end {
    use crate::mode::MemoryMode;
    use crate::processor::Processor;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Processor {
        let words = crate::assemble::assemble(source).unwrap();
        let mut proc = Processor::new(MemoryMode::Compliant, &words);
        proc.run().unwrap();
        proc
    }

    #[test]
    fn small_immediate_load() {
        let proc = run("mov r0, #5\nandeq r0,r0,r0\n");
        for i in 1u32..15 {
            assert_eq!(proc.registers.get(crate::instr::Register::from_u4(i, 0)), 0);
        }
        assert_eq!(proc.registers.get(crate::instr::Register::R0), 5);
        assert_eq!(proc.registers.pc(), 8);
        assert!(proc.memory.nonzero_words().next().is_none());
    }

    #[test]
    fn add_and_compare() {
        let proc = run(
            "mov r0, #3\nmov r1, #4\nadd r2, r0, r1\ncmp r2, #7\nandeq r0,r0,r0\n",
        );
        assert_eq!(proc.registers.get(crate::instr::Register::R0), 3);
        assert_eq!(proc.registers.get(crate::instr::Register::R1), 4);
        assert_eq!(proc.registers.get(crate::instr::Register::R2), 7);
        assert!(proc.registers.flags.zero);
    }

    #[test]
    fn ldr_with_literal_pool() {
        let words = crate::assemble::assemble("ldr r0, =0xDEADBEEF\nandeq r0,r0,r0\n").unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words[2], 0xDEAD_BEEF);
        let mut proc = Processor::new(MemoryMode::Compliant, &words);
        proc.run().unwrap();
        assert_eq!(proc.registers.get(crate::instr::Register::R0), 0xDEAD_BEEF);
    }

    #[test]
    fn backward_branch_loop() {
        let proc = run(
            "mov r0, #3\nloop:\nsub r0, r0, #1\ncmp r0, #0\nbne loop\nandeq r0,r0,r0\n",
        );
        assert_eq!(proc.registers.get(crate::instr::Register::R0), 0);
        assert!(proc.registers.flags.zero);
    }

    #[test]
    fn store_then_load() {
        let proc = run("mov r0, #42\nstr r0, [r1]\nldr r2, [r1]\nandeq r0,r0,r0\n");
        assert_eq!(proc.memory.read_word(0).unwrap(), 42);
        assert_eq!(proc.registers.get(crate::instr::Register::R2), 42);
    }

    #[test]
    fn shift_via_mov() {
        let proc = run("mov r0, #1\nlsl r0, #4\nandeq r0,r0,r0\n");
        assert_eq!(proc.registers.get(crate::instr::Register::R0), 16);
    }
}

//! `emulate` — loads an assembled image and runs it to completion, then
//! prints the final register and (non-zero) memory state.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use armul::mode::MemoryMode;
use armul::processor::Processor;
use clap::Parser;

/// Run an assembled instruction image to completion.
#[derive(Parser)]
struct Args {
    /// Assembled binary image, as written by the `assemble` binary.
    input: PathBuf,

    /// How to handle an out-of-bounds memory access.
    #[arg(long, default_value = "compliant")]
    memory_mode: MemoryMode,
}

fn load_words(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let bytes = fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let program = load_words(&bytes);

    let mut proc = Processor::new(args.memory_mode, &program);
    match proc.run() {
        Ok(()) => print_compliant(&proc),
        Err(e) => {
            eprintln!("{e}");
            print_strict(&proc);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Prints the final register file, one per line, in the format the
/// original toolchain's compliant-mode diagnostics used.
fn print_registers(proc: &Processor) {
    for i in 0u32..13 {
        let r = armul::instr::Register::from_u4(i, 0);
        let value = proc.registers.get(r);
        println!("${i:<2}: {value:10} ({value:#010x})");
    }
    println!("PC : {:10} ({:#010x})", proc.registers.pc(), proc.registers.pc());

    let f = proc.registers.flags;
    let cpsr = (u32::from(f.negative) << 31)
        | (u32::from(f.zero) << 30)
        | (u32::from(f.carry) << 29)
        | (u32::from(f.overflow) << 28);
    println!("CPSR: {cpsr:10} ({cpsr:#010x})");
}

fn print_memory(proc: &Processor) {
    for (address, value) in proc.memory.nonzero_words() {
        println!("{address:#010x}: {value:#010x}");
    }
}

fn print_compliant(proc: &Processor) {
    print_registers(proc);
    print_memory(proc);
}

fn print_strict(proc: &Processor) {
    eprintln!("-- fatal memory error, machine state at abort --");
    print_registers(proc);
    print_memory(proc);
}

//! `assemble` — compiles an assembly source file into a flat binary image
//! of little-endian 32-bit words, one per program instruction plus any
//! literal pool entries.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Assemble a source file into a raw instruction image.
#[derive(Parser)]
struct Args {
    /// Assembly source file.
    input: PathBuf,

    /// Where to write the assembled image.
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let words = armul::assemble::assemble(&source).map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in &words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    fs::write(&args.output, &bytes).with_context(|| format!("writing {}", args.output.display()))?;

    tracing::info!(words = words.len(), output = %args.output.display(), "assembled");
    Ok(())
}

//! `vela-dump` — list the contents of precompiled Vela chunks.
//!
//! ```text
//! vela-dump demo.velac          # one listing line per instruction
//! vela-dump --full demo.velac   # plus constant/local/upvalue tables
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use vela_bytecode::{disassemble, load_chunk, DisasmOptions, LoadOptions};
use vela_core::{Interner, MAX_LOAD_DEPTH};

#[derive(Parser)]
#[command(name = "vela-dump", version, about = "List precompiled Vela chunks")]
struct Args {
    /// Chunk files to list (.velac).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Also list the constant, local and upvalue tables.
    #[arg(short, long)]
    full: bool,

    /// Skip bytecode verification. Only for chunks this machine produced.
    #[arg(long)]
    trusted: bool,

    /// Cap on prototype nesting.
    #[arg(long, default_value_t = MAX_LOAD_DEPTH)]
    max_depth: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let options = LoadOptions { strict: !args.trusted, max_depth: args.max_depth };
    let listing = DisasmOptions { full: args.full };

    let mut pool = Interner::new();
    for path in &args.inputs {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let mut name = vec![b'@'];
        name.extend_from_slice(path.to_string_lossy().as_bytes());
        let proto = load_chunk(&bytes, &name, &mut pool, &options)
            .with_context(|| format!("loading {}", path.display()))?;
        print!("{}", disassemble(&proto, &listing));
    }
    Ok(())
}

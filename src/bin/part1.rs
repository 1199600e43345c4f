use std::time::Instant;

use anyhow::{Context, Result};
use chronospatial::{CLIArgs, Computer};
use clap::Parser;
use tracing::info;

fn main() -> Result<()> {
    chronospatial::init_logging();
    let args = CLIArgs::parse();
    let debug_info = chronospatial::read_debug_info(&args.input_path)
        .with_context(|| format!("failed to open given file({}).", args.input_path.display()))?;

    let start = Instant::now();
    let mut computer = Computer::from(debug_info);
    computer
        .run()
        .with_context(|| format!("Failed to run program({}).", computer.program_text()))?;
    info!(elapsed = ?start.elapsed(), "level 1 finished");

    println!(
        "After running given program, the computer outputs {}.",
        computer.output_text()
    );

    Ok(())
}

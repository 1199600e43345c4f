use std::time::Instant;

use anyhow::{Context, Result};
use chronospatial::{Computer, Optimizer, SearchCLIArgs, SearchConfig};
use clap::Parser;
use tracing::{info, warn};

fn main() -> Result<()> {
    chronospatial::init_logging();
    let args = SearchCLIArgs::parse();
    let debug_info = chronospatial::read_debug_info(&args.input_path)
        .with_context(|| format!("failed to open given file({}).", args.input_path.display()))?;

    let start = Instant::now();
    let computer = Computer::from(debug_info);
    let target = chronospatial::program_target(computer.program())
        .context("Program can't output a copy of itself.")?;
    let mut optimizer = Optimizer::seeded(computer, target, SearchConfig::from(&args))?;
    info!(config = ?optimizer.config(), "searching register A");
    let best = optimizer.run();
    info!(elapsed = ?start.elapsed(), loss = best.loss, "level 2 finished");

    if !best.is_exact() {
        warn!(
            candidate = %best.candidate,
            loss = best.loss,
            "best value found doesn't make the program output itself, try more digits or generations"
        );
    }
    println!(
        "The lowest value of register A found that makes the program output itself is {}.",
        best.value
    );

    Ok(())
}

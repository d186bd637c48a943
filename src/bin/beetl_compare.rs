//! `beetl-compare`: tumour/normal or splice-junction breakpoint detection
//! over a pair of BWTs walked in lockstep.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use beetl_rs::commands::{CompareCommand, CompareMode};
use beetl_rs::error::BeetlError;

#[derive(Parser)]
#[command(name = "beetl-compare")]
#[command(author = "Manish Kumar Bobbili")]
#[command(version)]
#[command(about = "Detect breakpoints between two BWTs walked in lockstep", long_about = None)]
struct Cli {
    /// Prefix of the first (tumour, or A-side) BWT
    #[arg(short = 'a', long)]
    prefix_a: PathBuf,

    /// Prefix of the second (normal, or B-side) BWT
    #[arg(short = 'b', long)]
    prefix_b: PathBuf,

    /// Comparison mode: "tumour-normal" or "splice"
    #[arg(short, long, default_value = "tumour-normal")]
    mode: String,

    /// Minimum occurrence count for a side to count as a real extension
    #[arg(long, default_value_t = 2)]
    min_occ: u64,

    /// Ratio applied to A's threshold when judging a non-shared path
    #[arg(long, default_value_t = 1.0)]
    fsize_ratio: f64,

    /// Output stream for BKPT/READ/INBS lines (`-` for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Pass-through hint asking the reader to memory-map BWT piles
    #[arg(long = "use-shm")]
    use_shm: bool,
}

fn main() {
    let cli = Cli::parse();

    let mode = match CompareMode::parse(&cli.mode) {
        Some(m) => m,
        None => {
            let err = BeetlError::BadConfig(format!(
                "unknown mode {:?} (expected tumour-normal or splice)",
                cli.mode
            ));
            eprintln!("Error: {err}");
            process::exit(err.exit_code());
        }
    };

    let cmd = CompareCommand::new(cli.prefix_a, cli.prefix_b, mode)
        .with_min_occ(cli.min_occ)
        .with_fsize_ratio(cli.fsize_ratio)
        .with_output(cli.output)
        .with_use_shared_mem(cli.use_shm);

    if let Err(e) = cmd.run() {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

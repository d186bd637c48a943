//! `beetl-correct`: flags minority letters within dominant BWT ranges as
//! likely sequencing errors and reports the correction for each.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use beetl_rs::commands::CorrectCommand;

#[derive(Parser)]
#[command(name = "beetl-correct")]
#[command(author = "Manish Kumar Bobbili")]
#[command(version)]
#[command(about = "Tag putative BWT read errors and their corrector letters", long_about = None)]
struct Cli {
    /// BWT prefix (piles are read from <PREFIX>-B00 .. <PREFIX>-B05)
    #[arg(short, long)]
    input: PathBuf,

    /// Minimum count for a letter to be considered the dominant path
    #[arg(long, default_value_t = 3)]
    min_occurrences: u64,

    /// Minimum cycle before a range is eligible for correction
    #[arg(long, default_value_t = 3)]
    min_witness_length: u64,

    /// Output stream for error records (`-` for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Pass-through hint asking the reader to memory-map BWT piles
    #[arg(long = "use-shm")]
    use_shm: bool,
}

fn main() {
    let cli = Cli::parse();

    let cmd = CorrectCommand::new(cli.input)
        .with_min_occurrences(cli.min_occurrences)
        .with_min_witness_length(cli.min_witness_length)
        .with_output(cli.output)
        .with_use_shared_mem(cli.use_shm);

    if let Err(e) = cmd.run() {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

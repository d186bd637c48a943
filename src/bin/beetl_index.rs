//! `beetl-index`: builds the `.idx` random-access sidecar for a BWT prefix.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use beetl_rs::commands::IndexCommand;

#[derive(Parser)]
#[command(name = "beetl-index")]
#[command(author = "Manish Kumar Bobbili")]
#[command(version)]
#[command(about = "Build the random-access .idx sidecar for a BWT prefix", long_about = None)]
struct Cli {
    /// BWT prefix (piles are read from <PREFIX>-B00 .. <PREFIX>-B05)
    #[arg(short, long)]
    input: PathBuf,

    /// Bytes of compressed BWT between index points
    #[arg(short, long, default_value_t = 2048)]
    block_size: u64,

    /// Overwrite an existing .idx file
    #[arg(short, long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();

    let cmd = IndexCommand::new(cli.input)
        .with_block_size(cli.block_size)
        .with_force(cli.force);

    if let Err(e) = cmd.run() {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

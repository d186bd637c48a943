//! `beetl-search`: locates every query k-mer's BWT interval and count.

use std::path::PathBuf;
use std::process;

use clap::Parser;

use beetl_rs::commands::SearchCommand;

#[derive(Parser)]
#[command(name = "beetl-search")]
#[command(author = "Manish Kumar Bobbili")]
#[command(version)]
#[command(about = "Locate k-mers in a BWT by backward search", long_about = None)]
struct Cli {
    /// BWT prefix (piles are read from <PREFIX>-B00 .. <PREFIX>-B05)
    #[arg(short, long)]
    input: PathBuf,

    /// File of whitespace-delimited kmers, one query per line
    #[arg(short = 'j', long = "kmers-input-file")]
    kmers_input_file: Option<PathBuf>,

    /// A single kmer given directly on the command line
    #[arg(short = 'k', long = "one-kmer-string")]
    one_kmer_string: Option<String>,

    /// Output stream for IntervalRecord lines (`-` for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Pass-through hint asking the reader to memory-map BWT piles
    #[arg(long = "use-shm")]
    use_shm: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut cmd = SearchCommand::new(cli.input)
        .with_output(cli.output)
        .with_use_shared_mem(cli.use_shm);

    if let Some(path) = cli.kmers_input_file {
        cmd = cmd.with_kmers_file(path);
    }
    if let Some(kmer) = cli.one_kmer_string {
        cmd = cmd.with_one_kmer_string(kmer);
    }

    if let Err(e) = cmd.run() {
        eprintln!("Error: {e}");
        process::exit(e.exit_code());
    }
}

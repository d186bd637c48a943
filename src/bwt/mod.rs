//! Compressed BWT pile I/O: sequential/random-access reading and the
//! `.idx` sidecar builder.

pub mod index;
pub mod reader;

pub use index::{BwtIndex, IndexBuilder, IndexEntry};
pub use reader::BwtReader;

use std::path::{Path, PathBuf};

use crate::alphabet::ALPHABET_SIZE;
use crate::error::Result;
use crate::letter_count::LetterCountEachPile;

/// Path of pile `digit` (0..6) given a BWT file prefix, following the
/// `<prefix>-B0<digit>` naming convention.
pub fn pile_path<P: AsRef<Path>>(prefix: P, digit: usize) -> PathBuf {
    let mut s = prefix.as_ref().as_os_str().to_os_string();
    s.push(format!("-B0{digit}"));
    PathBuf::from(s)
}

/// Opens every pile under `prefix` once, tallying each pile's total
/// letter counts. Used once at startup to seed the backward-search
/// cumulative-count table before any range has been read.
pub fn total_counts_per_pile<P: AsRef<Path>>(prefix: P, use_shared_mem: bool) -> Result<LetterCountEachPile> {
    let mut table = LetterCountEachPile::new();
    for pile in 0..ALPHABET_SIZE {
        let path = pile_path(prefix.as_ref(), pile);
        let mut reader = BwtReader::open(&path, use_shared_mem)?;
        reader.read_and_count_to_end(&mut table.piles[pile])?;
    }
    Ok(table)
}

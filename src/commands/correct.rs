//! `beetl-correct`: flags minority letters within dominant BWT ranges as
//! likely sequencing errors and reports the position of each.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use rayon::prelude::*;

use crate::alphabet::ALPHABET_SIZE;
use crate::backtracker::{merge_stats, run_cycle_for_pile, CycleStats};
use crate::bwt::{pile_path, total_counts_per_pile, BwtReader};
use crate::error::Result;
use crate::handlers::corrector::BwtCorrectorHandler;
use crate::range::{ErrorCorrectionPayload, Range, RangeBase};
use crate::range_store::RangeStore;

pub struct CorrectCommand {
    pub bwt_prefix: PathBuf,
    pub min_occurrences: u64,
    pub min_witness_length: u64,
    pub output: PathBuf,
    pub use_shared_mem: bool,
}

impl CorrectCommand {
    pub fn new(bwt_prefix: PathBuf) -> Self {
        Self {
            bwt_prefix,
            min_occurrences: 3,
            min_witness_length: 3,
            output: PathBuf::from("-"),
            use_shared_mem: false,
        }
    }

    pub fn with_min_occurrences(mut self, min_occurrences: u64) -> Self {
        self.min_occurrences = min_occurrences;
        self
    }

    pub fn with_min_witness_length(mut self, min_witness_length: u64) -> Self {
        self.min_witness_length = min_witness_length;
        self
    }

    pub fn with_output(mut self, path: PathBuf) -> Self {
        self.output = path;
        self
    }

    pub fn with_use_shared_mem(mut self, use_shared_mem: bool) -> Self {
        self.use_shared_mem = use_shared_mem;
        self
    }

    pub fn run(&self) -> Result<()> {
        let counts = total_counts_per_pile(&self.bwt_prefix, self.use_shared_mem)?;
        let total_reads = counts.piles[0].total();

        let store = Mutex::new(RangeStore::new("correct")?);
        {
            let mut guard = store.lock().unwrap();
            let seed = Range::ErrorCorrection(
                RangeBase::new(0, total_reads),
                ErrorCorrectionPayload::default(),
            );
            guard.add_range(&seed, 0, 0)?;
            guard.clear()?;
        }

        let handler = Mutex::new(BwtCorrectorHandler::new(
            self.min_occurrences,
            self.min_witness_length,
        ));
        let mut cycle = 1u64;
        loop {
            if !store.lock().unwrap().has_pending_ranges() {
                break;
            }

            let piles: Vec<usize> = if cycle == 1 {
                vec![0]
            } else {
                (1..ALPHABET_SIZE).collect()
            };

            let results: Vec<Result<CycleStats>> = piles
                .into_par_iter()
                .map(|pile| {
                    let mut reader = BwtReader::open(&pile_path(&self.bwt_prefix, pile), self.use_shared_mem)?;
                    let counts_at_pile_start = counts.cumulative_start_of_pile(pile);
                    run_cycle_for_pile(pile, &mut reader, &counts_at_pile_start, &store, &handler, cycle)
                })
                .collect();

            let mut stats = CycleStats::default();
            for r in results {
                merge_stats(&mut stats, r?);
            }

            store.lock().unwrap().clear()?;
            cycle += 1;
        }

        let handler = handler.into_inner().unwrap();
        self.write_output(&handler)
    }

    fn write_output(&self, handler: &BwtCorrectorHandler) -> Result<()> {
        let mut out: Box<dyn Write> = if self.output.as_os_str() == "-" {
            Box::new(std::io::stdout())
        } else {
            Box::new(fs::File::create(&self.output)?)
        };

        let mut positions: Vec<&u64> = handler.error_store.keys().collect();
        positions.sort_unstable();

        let mut num_buf = itoa::Buffer::new();
        for pos in positions {
            let info = &handler.error_store[pos];
            out.write_all(num_buf.format(*pos).as_bytes())?;
            out.write_all(b" ")?;
            out.write_all(num_buf.format(info.first_cycle).as_bytes())?;
            out.write_all(b" ")?;
            out.write_all(num_buf.format(info.last_cycle).as_bytes())?;
            out.write_all(b" ")?;
            out.write_all(info.corrector.as_bytes())?;
            out.write_all(b" ")?;
            match info.seq_num {
                Some(n) => out.write_all(num_buf.format(n).as_bytes())?,
                None => out.write_all(b"-")?,
            }
            out.write_all(b" ")?;
            match info.read_end {
                Some(n) => out.write_all(num_buf.format(n).as_bytes())?,
                None => out.write_all(b"-")?,
            }
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_documented_values() {
        let cmd = CorrectCommand::new(PathBuf::from("/tmp/x"));
        assert_eq!(cmd.min_occurrences, 3);
        assert_eq!(cmd.min_witness_length, 3);
    }
}

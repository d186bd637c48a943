//! `beetl-compare`: tumour/normal and splice-junction breakpoint detection
//! over a pair of BWTs walked in lockstep.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use rayon::prelude::*;

use crate::alphabet::ALPHABET_SIZE;
use crate::backtracker::{merge_stats, run_cycle_for_pile_paired, CycleStats};
use crate::bwt::{pile_path, total_counts_per_pile, BwtReader};
use crate::error::{BeetlError, Result};
use crate::handlers::splice::SpliceHandler;
use crate::handlers::tumour_normal::TumourNormalHandler;
use crate::handlers::PairedBwtHandler;
use crate::logging::{shared_stdout, wrap, SharedWriter};
use crate::range::{Range, RangeBase};
use crate::range_store::RangeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    TumourNormal,
    Splice,
}

impl CompareMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tumour-normal" => Some(CompareMode::TumourNormal),
            "splice" => Some(CompareMode::Splice),
            _ => None,
        }
    }
}

pub struct CompareCommand {
    pub prefix_a: PathBuf,
    pub prefix_b: PathBuf,
    pub mode: CompareMode,
    pub min_occ: u64,
    pub fsize_ratio: f64,
    pub output: PathBuf,
    pub use_shared_mem: bool,
}

impl CompareCommand {
    pub fn new(prefix_a: PathBuf, prefix_b: PathBuf, mode: CompareMode) -> Self {
        Self {
            prefix_a,
            prefix_b,
            mode,
            min_occ: 2,
            fsize_ratio: 1.0,
            output: PathBuf::from("-"),
            use_shared_mem: false,
        }
    }

    pub fn with_min_occ(mut self, min_occ: u64) -> Self {
        self.min_occ = min_occ;
        self
    }

    pub fn with_fsize_ratio(mut self, fsize_ratio: f64) -> Self {
        self.fsize_ratio = fsize_ratio;
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

    fn open_output(&self) -> Result<SharedWriter> {
        if self.output.as_os_str() == "-" {
            Ok(shared_stdout())
        } else {
            Ok(wrap(fs::File::create(&self.output)?))
        }
    }

    pub fn run(&self) -> Result<()> {
        let out = self.open_output()?;
        match self.mode {
            CompareMode::TumourNormal => {
                let handler = TumourNormalHandler::new(self.min_occ, self.fsize_ratio, out);
                run_comparator(self, handler)
            }
            CompareMode::Splice => {
                let handler = SpliceHandler::new(self.min_occ, out);
                run_comparator(self, handler)
            }
        }
    }
}

/// Seeds the single root range representing every read, before any
/// backward extension, into bucket `(0,0)` of both stores. Pile 0 holds
/// the last real character of every read, so a dedicated cycle 1 that
/// reads only pile 0 is the correct first backward-search step; cycles 2
/// onward fan out across piles 1..6 like any other cycle.
fn seed_root(store: &mut RangeStore, total_reads: u64) -> Result<()> {
    let seed = Range::Base(RangeBase::new(0, total_reads));
    store.add_range(&seed, 0, 0)?;
    store.clear()
}

fn run_comparator<H: PairedBwtHandler + Send>(cmd: &CompareCommand, handler: H) -> Result<()> {
    if !(0.0..).contains(&cmd.fsize_ratio) {
        return Err(BeetlError::BadConfig("fsize-ratio must be >= 0".to_string()));
    }

    let counts_a = total_counts_per_pile(&cmd.prefix_a, cmd.use_shared_mem)?;
    let counts_b = total_counts_per_pile(&cmd.prefix_b, cmd.use_shared_mem)?;

    let store_a = Mutex::new(RangeStore::new("compare-a")?);
    let store_b = Mutex::new(RangeStore::new("compare-b")?);
    seed_root(&mut store_a.lock().unwrap(), counts_a.piles[0].total())?;
    seed_root(&mut store_b.lock().unwrap(), counts_b.piles[0].total())?;

    let handler = Mutex::new(handler);
    let mut cycle = 1u64;
    loop {
        let pending_a = store_a.lock().unwrap().has_pending_ranges();
        let pending_b = store_b.lock().unwrap().has_pending_ranges();
        if !pending_a && !pending_b {
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
                let mut reader_a = BwtReader::open(&pile_path(&cmd.prefix_a, pile), cmd.use_shared_mem)?;
                let mut reader_b = BwtReader::open(&pile_path(&cmd.prefix_b, pile), cmd.use_shared_mem)?;
                let counts_start_a = counts_a.cumulative_start_of_pile(pile);
                let counts_start_b = counts_b.cumulative_start_of_pile(pile);
                run_cycle_for_pile_paired(
                    pile,
                    &mut reader_a,
                    &mut reader_b,
                    &counts_start_a,
                    &counts_start_b,
                    &store_a,
                    &store_b,
                    &handler,
                    cycle,
                )
            })
            .collect();

        let mut stats = CycleStats::default();
        for r in results {
            merge_stats(&mut stats, r?);
        }

        store_a.lock().unwrap().clear()?;
        store_b.lock().unwrap().clear()?;
        cycle += 1;
    }

    Ok(())
}

//! Tumour/normal comparator: flags BWT positions where one sample's reads
//! diverge from the other's, a proxy for somatic variants.

use crate::alphabet::{ALPHABET_SIZE, UNKNOWN_PILE};
use crate::handlers::{format_bkpt_line, format_single_trace, propagate_positive_counts, PairedBwtHandler, PairedOutcome};
use crate::letter_count::LetterCount;
use crate::logging::{write_line, SharedWriter};
use crate::range::Range;

/// Cycle at which the minimum-occurrence threshold starts adapting to the
/// local signal strength rather than staying fixed at `min_occ`.
const ADAPTIVE_THRESHOLD_CYCLE: u64 = 12;

pub struct TumourNormalHandler {
    pub min_occ: u64,
    pub fsize_ratio: f64,
    pub out: SharedWriter,
}

impl TumourNormalHandler {
    pub fn new(min_occ: u64, fsize_ratio: f64, out: SharedWriter) -> Self {
        Self {
            min_occ,
            fsize_ratio,
            out,
        }
    }

    fn current_min_occ(&self, counts_this_range: &LetterCount, cycle: u64) -> u64 {
        if cycle < ADAPTIVE_THRESHOLD_CYCLE {
            return self.min_occ;
        }
        let signal = (counts_this_range.count[1]
            + counts_this_range.count[2]
            + counts_this_range.count[3]
            + counts_this_range.count[5])
            / 10;
        signal.max(self.min_occ)
    }
}

impl PairedBwtHandler for TumourNormalHandler {
    fn found_in_both(
        &mut self,
        pile_num: usize,
        counts_this_range_a: &LetterCount,
        counts_this_range_b: &LetterCount,
        this_range_a: &Range,
        this_range_b: &Range,
        cycle: u64,
    ) -> PairedOutcome {
        let base_a = this_range_a.base();
        let base_b = this_range_b.base();

        let min_occ_a = self.current_min_occ(counts_this_range_a, cycle);
        let min_occ_b = self.current_min_occ(counts_this_range_b, cycle);

        let mut shared_paths_a = 0u64;
        let mut shared_paths_b = 0u64;
        let mut nonshared_paths = 0u64;

        for l in 1..ALPHABET_SIZE {
            if l == UNKNOWN_PILE {
                continue;
            }
            let ca = counts_this_range_a.count[l];
            let cb = counts_this_range_b.count[l];
            if ca > 1 {
                shared_paths_a += 1;
            }
            if cb > 1 {
                shared_paths_b += 1;
            }
            if (ca as f64 > min_occ_a as f64 * self.fsize_ratio && cb == 0)
                || (cb > min_occ_b && ca == 0)
            {
                nonshared_paths += 1;
            }
        }

        let entirely_terminator = counts_this_range_a.count[0] == base_a.num
            || counts_this_range_b.count[0] == base_b.num;
        if entirely_terminator {
            nonshared_paths = 0;
        }

        let mut outcome = PairedOutcome {
            propagate_a: [false; ALPHABET_SIZE],
            propagate_b: [false; ALPHABET_SIZE],
            breakpoint: false,
        };

        if nonshared_paths > 0 && shared_paths_a < 3 && shared_paths_b < 3 {
            outcome.breakpoint = true;
            for l in 1..ALPHABET_SIZE {
                let ca = counts_this_range_a.count[l];
                let cb = counts_this_range_b.count[l];
                outcome.propagate_a[l] = ca >= min_occ_a && cb == 0;
                outcome.propagate_b[l] = cb >= min_occ_b && ca == 0;
            }
            let line = format_bkpt_line(
                pile_num,
                cycle,
                &base_b.word,
                counts_this_range_a,
                counts_this_range_b,
                base_a.pos,
                base_b.pos,
                base_a.num,
                base_b.num,
            );
            let _ = write_line(&self.out, &line);
        } else {
            for l in 1..ALPHABET_SIZE {
                outcome.propagate_a[l] = counts_this_range_a.count[l] >= min_occ_a;
                outcome.propagate_b[l] = counts_this_range_b.count[l] >= min_occ_b;
            }
        }

        outcome.propagate_a[UNKNOWN_PILE] = false;
        outcome.propagate_b[UNKNOWN_PILE] = false;
        outcome
    }

    fn found_in_a_only(
        &mut self,
        pile_num: usize,
        counts_so_far_a: &LetterCount,
        counts_this_range_a: &LetterCount,
        this_range_a: &Range,
        _cycle: u64,
    ) -> [bool; ALPHABET_SIZE] {
        if counts_this_range_a.count[0] > 0 {
            let base = this_range_a.base();
            let line = format_single_trace(
                "READ",
                pile_num,
                &base.word,
                base.pos,
                counts_this_range_a,
                counts_so_far_a.count[0],
            );
            let _ = write_line(&self.out, &line);
        }
        propagate_positive_counts(counts_this_range_a)
    }

    fn found_in_b_only(
        &mut self,
        pile_num: usize,
        counts_so_far_b: &LetterCount,
        counts_this_range_b: &LetterCount,
        this_range_b: &Range,
        _cycle: u64,
    ) -> [bool; ALPHABET_SIZE] {
        if counts_this_range_b.count[0] > 0 {
            let base = this_range_b.base();
            let line = format_single_trace(
                "INBS",
                pile_num,
                &base.word,
                base.pos,
                counts_this_range_b,
                counts_so_far_b.count[0],
            );
            let _ = write_line(&self.out, &line);
        }
        propagate_positive_counts(counts_this_range_b)
    }
}

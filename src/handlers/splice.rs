//! Splice-junction comparator: flags BWT positions where one sample's
//! reads branch away from the other with no shared continuation, a
//! signature of a splice junction rather than a point variant.

use crate::alphabet::{ALPHABET_SIZE, UNKNOWN_PILE};
use crate::handlers::{format_bkpt_line, format_single_trace, propagate_positive_counts, PairedBwtHandler, PairedOutcome};
use crate::letter_count::LetterCount;
use crate::logging::{write_line, SharedWriter};
use crate::range::Range;

pub struct SpliceHandler {
    pub min_occ: u64,
    pub out: SharedWriter,
}

impl SpliceHandler {
    pub fn new(min_occ: u64, out: SharedWriter) -> Self {
        Self { min_occ, out }
    }
}

impl PairedBwtHandler for SpliceHandler {
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

        let mut shared_path = false;
        let mut max_signal_a_only = 0u64;
        let mut max_signal_b_only = 0u64;

        for l in 1..ALPHABET_SIZE {
            let ca = counts_this_range_a.count[l];
            let cb = counts_this_range_b.count[l];
            if ca > 0 && cb > 0 {
                shared_path = true;
            }
            if cb == 0 {
                max_signal_a_only = max_signal_a_only.max(ca);
            }
            if ca == 0 {
                max_signal_b_only = max_signal_b_only.max(cb);
            }
        }

        let mut outcome = PairedOutcome {
            propagate_a: [false; ALPHABET_SIZE],
            propagate_b: [false; ALPHABET_SIZE],
            breakpoint: false,
        };

        for l in 1..ALPHABET_SIZE {
            outcome.propagate_a[l] = counts_this_range_a.count[l] >= self.min_occ;
            outcome.propagate_b[l] = outcome.propagate_a[l];
        }

        if !shared_path && max_signal_a_only >= self.min_occ && max_signal_b_only >= self.min_occ {
            outcome.breakpoint = true;
            for l in 1..ALPHABET_SIZE {
                outcome.propagate_b[l] = outcome.propagate_a[l] && counts_this_range_b.count[l] >= self.min_occ;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::which_pile;
    use crate::logging::wrap;
    use crate::range::RangeBase;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    struct RecordingWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn recording_handler(min_occ: u64) -> (SpliceHandler, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let out = wrap(RecordingWriter(buf.clone()));
        (SpliceHandler::new(min_occ, out), buf)
    }

    fn counts(letter: u8, n: u64) -> LetterCount {
        let mut c = LetterCount::new();
        c.count[which_pile(letter)] = n;
        c
    }

    #[test]
    fn no_shared_child_with_strong_signal_on_both_sides_fires_breakpoint() {
        let (mut handler, buf) = recording_handler(2);
        let counts_a = counts(b'G', 3);
        let counts_b = counts(b'A', 3);
        let range_a = Range::Base(RangeBase::new(1, 3));
        let range_b = Range::Base(RangeBase::new(2, 3));

        let outcome = handler.found_in_both(1, &counts_a, &counts_b, &range_a, &range_b, 3);

        assert!(outcome.breakpoint);
        assert!(outcome.propagate_a[which_pile(b'G')]);
        assert!(!outcome.propagate_a[which_pile(b'A')]);
        // B's own A-only signal is dropped: A-side never extends on 'A',
        // and B propagation is restricted to letters A also passes.
        assert!(!outcome.propagate_b[which_pile(b'A')]);
        assert!(!outcome.propagate_b[which_pile(b'G')]);

        let written = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("BKPT "), "expected a BKPT line, got {written:?}");
    }

    #[test]
    fn any_shared_child_suppresses_the_breakpoint() {
        let (mut handler, buf) = recording_handler(2);
        let counts_a = counts(b'G', 3);
        let counts_b = counts(b'G', 3);
        let range_a = Range::Base(RangeBase::new(1, 3));
        let range_b = Range::Base(RangeBase::new(2, 3));

        let outcome = handler.found_in_both(1, &counts_a, &counts_b, &range_a, &range_b, 3);

        assert!(!outcome.breakpoint);
        assert!(outcome.propagate_a[which_pile(b'G')]);
        assert!(outcome.propagate_b[which_pile(b'G')]);
        assert!(buf.lock().unwrap().is_empty());
    }

    #[test]
    fn b_only_range_emits_inbs_trace_when_it_contains_a_terminator() {
        let (mut handler, buf) = recording_handler(2);
        let mut counts_b = counts(b'C', 2);
        counts_b.count[0] = 1;
        let range_b = Range::Base(RangeBase::new(9, 3));

        let propagate = handler.found_in_b_only(1, &LetterCount::new(), &counts_b, &range_b, 3);

        assert!(propagate[which_pile(b'C')]);
        let written = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("INBS "), "expected an INBS line, got {written:?}");
    }
}

//! K-mer locator: finds the BWT interval of every query k-mer and reports
//! its `(position, count)`.

use crate::alphabet::which_pile;
use crate::handlers::{ChildPayload, HandlerOutcome, SingleBwtHandler};
use crate::letter_count::LetterCount;
use crate::range::{KmerSearchPayload, Range};

/// One query k-mer, stored reversed (backward search consumes the query
/// from its last character first) together with enough bookkeeping to
/// report results in the caller's original input order.
#[derive(Debug, Clone)]
pub struct KmerSearchItem {
    pub kmer_reversed: Vec<u8>,
    pub position: u64,
    pub count: u64,
    pub original_index: usize,
}

/// Classifies ranges against a sorted list of reversed query k-mers,
/// narrowing each query's slice of the list as the matched prefix grows
/// and recording `(position, count)` once a query's full length has been
/// consumed.
pub struct KmerLocatorHandler {
    pub kmer_items: Vec<KmerSearchItem>,
}

impl KmerLocatorHandler {
    pub fn new(kmer_items: Vec<KmerSearchItem>) -> Self {
        Self { kmer_items }
    }
}

impl SingleBwtHandler for KmerLocatorHandler {
    fn found_in_a_only(
        &mut self,
        pile_num: usize,
        _counts_so_far: &LetterCount,
        _counts_this_range: &LetterCount,
        _bwt_substring: &[u8],
        this_range: &Range,
        cycle: u64,
    ) -> HandlerOutcome {
        let (base, payload) = match this_range {
            Range::KmerSearch(base, payload) => (base, *payload),
            _ => return HandlerOutcome::none(),
        };

        let mut outcome = HandlerOutcome::none();
        let mut last_pile = 0usize;
        let mut last_pile_end = payload.start;

        for k in payload.start..payload.end {
            let item = &mut self.kmer_items[k];
            debug_assert_eq!(which_pile(item.kmer_reversed[(cycle - 1) as usize]), pile_num);

            if item.kmer_reversed.len() as u64 == cycle {
                item.position = base.pos;
                item.count = base.num;
                last_pile_end = k + 1;
                continue;
            }

            let next_letter = item.kmer_reversed[cycle as usize];
            let pile = which_pile(next_letter);
            outcome.propagate[pile] = true;

            let sub = match &mut outcome.child_payload[pile] {
                Some(ChildPayload::KmerSearch(p)) => p,
                _ => {
                    outcome.child_payload[pile] = Some(ChildPayload::KmerSearch(KmerSearchPayload {
                        start: last_pile_end,
                        end: last_pile_end,
                    }));
                    match outcome.child_payload[pile].as_mut().unwrap() {
                        ChildPayload::KmerSearch(p) => p,
                        _ => unreachable!(),
                    }
                }
            };
            if pile != last_pile {
                sub.start = last_pile_end;
            }
            sub.end = k + 1;
            last_pile = pile;
            last_pile_end = k + 1;
        }

        outcome
    }
}

/// Sorts queries lexicographically by reversed k-mer and builds the
/// initial per-`(toPile, fromPile)` seed ranges, matching the sentinel's
/// cumulative-count row at cycle 1.
pub fn build_kmer_items(queries: &[(Vec<u8>, usize)]) -> Vec<KmerSearchItem> {
    let mut items: Vec<KmerSearchItem> = queries
        .iter()
        .map(|(kmer, original_index)| {
            let mut reversed = kmer.clone();
            reversed.reverse();
            KmerSearchItem {
                kmer_reversed: reversed,
                position: 0,
                count: 0,
                original_index: *original_index,
            }
        })
        .collect();
    items.sort_by(|a, b| a.kmer_reversed.cmp(&b.kmer_reversed));
    items
}

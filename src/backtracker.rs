//! Drives one backward-search cycle over a pile, pulling ranges from a
//! [`RangeStore`] in position order and handing each one to a handler for
//! classification.
//!
//! Two flavours: [`run_cycle_for_pile`] walks a single BWT (the k-mer
//! locator and error corrector), [`run_cycle_for_pile_paired`] walks two
//! BWTs in lockstep (the tumour/normal and splice comparators).
//!
//! The range store and the handler are shared across piles running in
//! parallel (see `commands::search`/`compare`/`correct`), so both are
//! taken behind a [`Mutex`] here and locked only for the duration of each
//! individual operation — decoding BWT runs and classifying a range
//! happen outside the lock, so piles still make progress concurrently.

use std::sync::Mutex;

use crate::alphabet::{pile_letter, ALPHABET_SIZE};
use crate::bwt::BwtReader;
use crate::error::Result;
use crate::handlers::{ChildPayload, PairedBwtHandler, SingleBwtHandler};
use crate::letter_count::LetterCount;
use crate::range::{Range, RangeBase};
use crate::range_store::RangeStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub num_ranges: u64,
    pub num_singleton_ranges: u64,
}

impl CycleStats {
    pub fn merge(&mut self, other: CycleStats) {
        self.num_ranges += other.num_ranges;
        self.num_singleton_ranges += other.num_singleton_ranges;
    }
}

/// Folds one pile's stats into the cycle-wide total, as each of the
/// parallel per-pile results comes back from `rayon`'s `into_par_iter`.
pub fn merge_stats(total: &mut CycleStats, other: CycleStats) {
    total.merge(other);
}

fn extend_word(extend: bool, parent_word: &[u8], letter: usize) -> Vec<u8> {
    if !extend {
        return Vec::new();
    }
    let mut word = Vec::with_capacity(parent_word.len() + 1);
    word.push(pile_letter(letter));
    word.extend_from_slice(parent_word);
    word
}

fn child_range(
    base_pos: u64,
    base_num: u64,
    parent: &RangeBase,
    letter: usize,
    extend: bool,
    payload: Option<&ChildPayload>,
) -> Range {
    let mut base = RangeBase::new(base_pos, base_num);
    base.is_bkpt_extension = parent.is_bkpt_extension;
    base.word = extend_word(extend, &parent.word, letter);
    match payload {
        None => Range::Base(base),
        Some(ChildPayload::KmerSearch(p)) => Range::KmerSearch(base, *p),
        Some(ChildPayload::ErrorCorrection(p)) => Range::ErrorCorrection(base, p.clone()),
    }
}

fn decode_bwt_substring(
    reader: &mut BwtReader,
    target_pos: u64,
    len: u64,
    counts_so_far: &mut LetterCount,
) -> Result<Vec<u8>> {
    reader.skip_to(target_pos, counts_so_far)?;
    let mut buf = Vec::with_capacity(len as usize);
    reader.read(&mut buf, len)?;
    Ok(buf)
}

/// Adds a propagated child to `store` under `(letter, from_pile)`,
/// consulting the dedup set first.
fn propagate_child(
    store: &Mutex<RangeStore>,
    child: &Range,
    letter: usize,
    from_pile: usize,
) -> Result<()> {
    let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
    let known = guard.is_range_known(letter, from_pile, child.base().pos, child.base().num);
    if !known {
        guard.add_range(child, letter, from_pile)?;
    }
    Ok(())
}

/// Runs one backward-search cycle for a single BWT's pile `from_pile`,
/// across every parent-tag bucket feeding it, reusing one rewound pass of
/// the reader and one running `countsSoFar` for the whole pile.
pub fn run_cycle_for_pile<H: SingleBwtHandler>(
    from_pile: usize,
    reader: &mut BwtReader,
    counts_at_pile_start: &LetterCount,
    store: &Mutex<RangeStore>,
    handler: &Mutex<H>,
    cycle: u64,
) -> Result<CycleStats> {
    reader.rewind();
    let mut counts_so_far = *counts_at_pile_start;
    let mut stats = CycleStats::default();

    for parent_tag in 0..ALPHABET_SIZE {
        store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_portion(from_pile, parent_tag)?;

        loop {
            let this_range = {
                let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
                guard.get_range()?
            };
            let this_range = match this_range {
                Some(r) => r,
                None => break,
            };

            let base = this_range.base();
            let bwt_substring =
                decode_bwt_substring(reader, base.pos, base.num, &mut counts_so_far)?;
            let mut counts_this_range = LetterCount::new();
            counts_this_range.add_bwt_substring(&bwt_substring);

            let outcome = {
                let mut h = handler.lock().unwrap_or_else(|e| e.into_inner());
                h.found_in_a_only(
                    from_pile,
                    &counts_so_far,
                    &counts_this_range,
                    &bwt_substring,
                    &this_range,
                    cycle,
                )
            };

            let mut has_child = false;
            for l in 1..ALPHABET_SIZE {
                if !outcome.propagate[l] {
                    continue;
                }
                has_child = true;
                let child = child_range(
                    counts_so_far.count[l],
                    counts_this_range.count[l],
                    base,
                    l,
                    outcome.extend_word,
                    outcome.child_payload[l].as_ref(),
                );
                propagate_child(store, &child, l, from_pile)?;
            }
            if !has_child {
                stats.num_singleton_ranges += 1;
            }

            counts_so_far += counts_this_range;
            stats.num_ranges += 1;
        }
    }

    Ok(stats)
}

/// Runs one backward-search cycle jointly over a pair of BWTs' pile
/// `from_pile`. Ranges from both stores are consumed in lockstep: while
/// both sides still have ranges in the current bucket, `found_in_both`
/// classifies them together; once one side runs dry, the remainder of the
/// other is drained through its single-sided callback.
#[allow(clippy::too_many_arguments)]
pub fn run_cycle_for_pile_paired<H: PairedBwtHandler>(
    from_pile: usize,
    reader_a: &mut BwtReader,
    reader_b: &mut BwtReader,
    counts_at_pile_start_a: &LetterCount,
    counts_at_pile_start_b: &LetterCount,
    store_a: &Mutex<RangeStore>,
    store_b: &Mutex<RangeStore>,
    handler: &Mutex<H>,
    cycle: u64,
) -> Result<CycleStats> {
    reader_a.rewind();
    reader_b.rewind();
    let mut counts_so_far_a = *counts_at_pile_start_a;
    let mut counts_so_far_b = *counts_at_pile_start_b;
    let mut stats = CycleStats::default();

    for parent_tag in 0..ALPHABET_SIZE {
        store_a
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_portion(from_pile, parent_tag)?;
        store_b
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set_portion(from_pile, parent_tag)?;

        loop {
            let range_a = store_a.lock().unwrap_or_else(|e| e.into_inner()).get_range()?;
            let range_b = store_b.lock().unwrap_or_else(|e| e.into_inner()).get_range()?;

            match (range_a, range_b) {
                (None, None) => break,
                (Some(ra), Some(rb)) => {
                    let base_a = ra.base().clone();
                    let base_b = rb.base().clone();
                    let substring_a =
                        decode_bwt_substring(reader_a, base_a.pos, base_a.num, &mut counts_so_far_a)?;
                    let substring_b =
                        decode_bwt_substring(reader_b, base_b.pos, base_b.num, &mut counts_so_far_b)?;
                    let mut counts_this_range_a = LetterCount::new();
                    counts_this_range_a.add_bwt_substring(&substring_a);
                    let mut counts_this_range_b = LetterCount::new();
                    counts_this_range_b.add_bwt_substring(&substring_b);

                    let outcome = {
                        let mut h = handler.lock().unwrap_or_else(|e| e.into_inner());
                        h.found_in_both(
                            from_pile,
                            &counts_this_range_a,
                            &counts_this_range_b,
                            &ra,
                            &rb,
                            cycle,
                        )
                    };

                    for l in 1..ALPHABET_SIZE {
                        if outcome.propagate_a[l] {
                            let child = child_range(
                                counts_so_far_a.count[l],
                                counts_this_range_a.count[l],
                                &base_a,
                                l,
                                true,
                                None,
                            );
                            propagate_child(store_a, &child, l, from_pile)?;
                        }
                        if outcome.propagate_b[l] {
                            let child = child_range(
                                counts_so_far_b.count[l],
                                counts_this_range_b.count[l],
                                &base_b,
                                l,
                                true,
                                None,
                            );
                            propagate_child(store_b, &child, l, from_pile)?;
                        }
                    }

                    counts_so_far_a += counts_this_range_a;
                    counts_so_far_b += counts_this_range_b;
                    stats.num_ranges += 1;
                }
                (Some(ra), None) => {
                    let base_a = ra.base().clone();
                    let substring_a =
                        decode_bwt_substring(reader_a, base_a.pos, base_a.num, &mut counts_so_far_a)?;
                    let mut counts_this_range_a = LetterCount::new();
                    counts_this_range_a.add_bwt_substring(&substring_a);

                    let propagate = {
                        let mut h = handler.lock().unwrap_or_else(|e| e.into_inner());
                        h.found_in_a_only(
                            from_pile,
                            &counts_so_far_a,
                            &counts_this_range_a,
                            &ra,
                            cycle,
                        )
                    };
                    for l in 1..ALPHABET_SIZE {
                        if propagate[l] {
                            let child = child_range(
                                counts_so_far_a.count[l],
                                counts_this_range_a.count[l],
                                &base_a,
                                l,
                                true,
                                None,
                            );
                            propagate_child(store_a, &child, l, from_pile)?;
                        }
                    }
                    counts_so_far_a += counts_this_range_a;
                    stats.num_ranges += 1;
                }
                (None, Some(rb)) => {
                    let base_b = rb.base().clone();
                    let substring_b =
                        decode_bwt_substring(reader_b, base_b.pos, base_b.num, &mut counts_so_far_b)?;
                    let mut counts_this_range_b = LetterCount::new();
                    counts_this_range_b.add_bwt_substring(&substring_b);

                    let propagate = {
                        let mut h = handler.lock().unwrap_or_else(|e| e.into_inner());
                        h.found_in_b_only(
                            from_pile,
                            &counts_so_far_b,
                            &counts_this_range_b,
                            &rb,
                            cycle,
                        )
                    };
                    for l in 1..ALPHABET_SIZE {
                        if propagate[l] {
                            let child = child_range(
                                counts_so_far_b.count[l],
                                counts_this_range_b.count[l],
                                &base_b,
                                l,
                                true,
                                None,
                            );
                            propagate_child(store_b, &child, l, from_pile)?;
                        }
                    }
                    counts_so_far_b += counts_this_range_b;
                    stats.num_ranges += 1;
                }
            }
        }
    }

    Ok(stats)
}

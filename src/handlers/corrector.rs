//! BWT error corrector: flags minority letters within an otherwise
//! dominant range as likely sequencing errors, and records which letter
//! should replace them.

use rustc_hash::FxHashMap;

use crate::alphabet::{which_pile, ALPHABET_SIZE, SENTINEL_PILE};
use crate::handlers::{ChildPayload, HandlerOutcome, SingleBwtHandler};
use crate::letter_count::LetterCount;
use crate::range::{ErrorCorrectionPayload, IntervalType, Range};

/// What is known about one putative sequencing error, keyed by its
/// absolute BWT position at the cycle it was first observed.
#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    pub first_cycle: u64,
    pub last_cycle: u64,
    /// Letters nominated as the correction, appended to in arrival order;
    /// usually a single character once a corrector pile dominates.
    pub corrector: String,
    pub seq_num: Option<u64>,
    pub read_end: Option<u64>,
}

/// If exactly one non-sentinel letter occurs at least `min_occurrences`
/// times and at least one other occurs at all, that letter is the
/// consensus and every other occurrence is an error. Ties (more than one
/// letter past the threshold) disqualify the range.
fn default_determine_errors(counts: &LetterCount, min_occurrences: u64) -> Option<usize> {
    let mut correct = None;
    let mut has_errors = false;
    for l in 1..ALPHABET_SIZE {
        if counts.count[l] >= min_occurrences {
            if correct.is_some() {
                return None;
            }
            correct = Some(l);
        } else if counts.count[l] > 0 {
            has_errors = true;
        }
    }
    if has_errors {
        correct
    } else {
        None
    }
}

pub struct BwtCorrectorHandler {
    pub min_occurrences: u64,
    pub min_witness_length: u64,
    pub error_store: FxHashMap<u64, ErrorInfo>,
}

impl BwtCorrectorHandler {
    pub fn new(min_occurrences: u64, min_witness_length: u64) -> Self {
        Self {
            min_occurrences,
            min_witness_length,
            error_store: FxHashMap::default(),
        }
    }
}

impl SingleBwtHandler for BwtCorrectorHandler {
    fn found_in_a_only(
        &mut self,
        _pile_num: usize,
        counts_so_far: &LetterCount,
        counts_this_range: &LetterCount,
        bwt_substring: &[u8],
        this_range: &Range,
        cycle: u64,
    ) -> HandlerOutcome {
        let (base, payload) = match this_range {
            Range::ErrorCorrection(base, payload) => (base, payload.clone()),
            _ => (this_range.base(), ErrorCorrectionPayload::default()),
        };

        let mut outcome = HandlerOutcome::none();
        for l in 1..ALPHABET_SIZE {
            outcome.propagate[l] = counts_this_range.count[l] > 0;
        }

        if payload.interval_type == IntervalType::Default && base.num <= self.min_occurrences {
            outcome.propagate = [false; ALPHABET_SIZE];
            return outcome;
        }

        if cycle < self.min_witness_length {
            return outcome;
        }

        if payload.interval_type == IntervalType::Error {
            let mut dollar_count = 0u64;
            for (rel_pos, &c) in bwt_substring.iter().enumerate() {
                let letter = which_pile(c);
                if letter == SENTINEL_PILE {
                    for &tag in &payload.error_bwt_positions {
                        let info = self.error_store.entry(tag).or_default();
                        if info.seq_num.is_none() {
                            info.seq_num = Some(counts_so_far.count[SENTINEL_PILE] + dollar_count);
                            info.read_end = Some(cycle);
                        }
                    }
                    dollar_count += 1;
                    continue;
                }
                for &tag in &payload.error_bwt_positions {
                    outcome.child_payload[letter]
                        .get_or_insert_with(|| {
                            ChildPayload::ErrorCorrection(ErrorCorrectionPayload {
                                interval_type: IntervalType::Error,
                                ..Default::default()
                            })
                        });
                    if let Some(ChildPayload::ErrorCorrection(p)) = &mut outcome.child_payload[letter]
                    {
                        let _ = rel_pos;
                        p.error_bwt_positions.push(tag);
                    }
                }
            }
            return outcome;
        }

        if payload.interval_type == IntervalType::Default {
            if let Some(correct_letter) =
                default_determine_errors(counts_this_range, self.min_occurrences)
            {
                let total_before_range = counts_so_far.total();
                for (rel_pos, &c) in bwt_substring.iter().enumerate() {
                    let letter = which_pile(c);
                    if letter == SENTINEL_PILE || letter == correct_letter {
                        continue;
                    }
                    let err_bwt_pos = total_before_range + rel_pos as u64;
                    match self.error_store.get_mut(&err_bwt_pos) {
                        Some(info) => {
                            info.last_cycle = cycle;
                        }
                        None => {
                            self.error_store.insert(
                                err_bwt_pos,
                                ErrorInfo {
                                    first_cycle: cycle,
                                    last_cycle: cycle,
                                    corrector: (crate::alphabet::pile_letter(correct_letter)
                                        as char)
                                        .to_string(),
                                    seq_num: None,
                                    read_end: None,
                                },
                            );
                            tag_child(&mut outcome, letter, IntervalType::Error, err_bwt_pos, false);
                            tag_child(
                                &mut outcome,
                                correct_letter,
                                IntervalType::Corrector,
                                err_bwt_pos,
                                true,
                            );
                        }
                    }
                }
            }
        }

        if payload.interval_type == IntervalType::Corrector {
            let range_length = counts_this_range.non_terminator_total();
            let mut dominator = None;
            for l in 1..ALPHABET_SIZE {
                if counts_this_range.count[l] >= self.min_occurrences {
                    dominator = Some(l);
                }
            }
            if let Some(dominator) = dominator {
                if range_length > 0 {
                    outcome.child_payload[dominator]
                        .get_or_insert_with(|| {
                            ChildPayload::ErrorCorrection(ErrorCorrectionPayload {
                                interval_type: IntervalType::Corrector,
                                ..Default::default()
                            })
                        });
                    for &tag in &payload.correction_bwt_positions {
                        if let Some(info) = self.error_store.get_mut(&tag) {
                            info.corrector
                                .push(crate::alphabet::pile_letter(dominator) as char);
                        }
                        if let Some(ChildPayload::ErrorCorrection(p)) =
                            &mut outcome.child_payload[dominator]
                        {
                            p.correction_bwt_positions.push(tag);
                        }
                    }
                }
            }
        }

        outcome
    }
}

fn tag_child(
    outcome: &mut HandlerOutcome,
    letter: usize,
    interval_type: IntervalType,
    bwt_pos: u64,
    is_corrector: bool,
) {
    outcome.child_payload[letter].get_or_insert_with(|| {
        ChildPayload::ErrorCorrection(ErrorCorrectionPayload {
            interval_type,
            ..Default::default()
        })
    });
    if let Some(ChildPayload::ErrorCorrection(p)) = &mut outcome.child_payload[letter] {
        if is_corrector {
            p.correction_bwt_positions.push(bwt_pos);
        } else {
            p.error_bwt_positions.push(bwt_pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::which_pile;
    use crate::range::RangeBase;

    fn counts_for(substring: &[u8]) -> LetterCount {
        let mut c = LetterCount::new();
        c.add_bwt_substring(substring);
        c
    }

    #[test]
    fn default_interval_flags_minority_letter_as_error() {
        let mut handler = BwtCorrectorHandler::new(3, 3);
        let substring = b"AAAT";
        let counts_this_range = counts_for(substring);
        let counts_so_far = LetterCount::new();
        let range = Range::ErrorCorrection(RangeBase::new(0, 4), ErrorCorrectionPayload::default());

        let outcome = handler.found_in_a_only(0, &counts_so_far, &counts_this_range, substring, &range, 3);

        let err_pos = 3u64; // T at relative offset 3, counts_so_far empty
        let info = handler.error_store.get(&err_pos).expect("error recorded");
        assert_eq!(info.first_cycle, 3);
        assert_eq!(info.last_cycle, 3);
        assert_eq!(info.corrector, "A");

        assert!(outcome.propagate[which_pile(b'A')]);
        assert!(outcome.propagate[which_pile(b'T')]);
        assert!(!outcome.propagate[which_pile(b'C')]);

        match &outcome.child_payload[which_pile(b'T')] {
            Some(ChildPayload::ErrorCorrection(p)) => {
                assert_eq!(p.interval_type, IntervalType::Error);
                assert_eq!(p.error_bwt_positions, vec![err_pos]);
            }
            other => panic!("expected Error payload on T child, got {other:?}"),
        }
        match &outcome.child_payload[which_pile(b'A')] {
            Some(ChildPayload::ErrorCorrection(p)) => {
                assert_eq!(p.interval_type, IntervalType::Corrector);
                assert_eq!(p.correction_bwt_positions, vec![err_pos]);
            }
            other => panic!("expected Corrector payload on A child, got {other:?}"),
        }
    }

    #[test]
    fn re_sighting_the_same_error_updates_last_cycle_only() {
        let mut handler = BwtCorrectorHandler::new(3, 3);
        let substring = b"AAAT";
        let counts_this_range = counts_for(substring);
        let counts_so_far = LetterCount::new();
        let range = Range::ErrorCorrection(RangeBase::new(0, 4), ErrorCorrectionPayload::default());

        handler.found_in_a_only(0, &counts_so_far, &counts_this_range, substring, &range, 3);
        handler.found_in_a_only(0, &counts_so_far, &counts_this_range, substring, &range, 4);

        assert_eq!(handler.error_store.len(), 1);
        let info = handler.error_store.get(&3u64).unwrap();
        assert_eq!(info.first_cycle, 3);
        assert_eq!(info.last_cycle, 4);
    }

    #[test]
    fn error_interval_records_seq_num_and_read_end_at_terminator() {
        let mut handler = BwtCorrectorHandler::new(3, 3);
        handler.error_store.insert(
            3,
            ErrorInfo {
                first_cycle: 2,
                last_cycle: 2,
                corrector: "A".to_string(),
                seq_num: None,
                read_end: None,
            },
        );

        let payload = ErrorCorrectionPayload {
            interval_type: IntervalType::Error,
            correction_bwt_positions: vec![],
            error_bwt_positions: vec![3],
        };
        let range = Range::ErrorCorrection(RangeBase::new(10, 2), payload);
        let substring = b"$A";
        let counts_this_range = counts_for(substring);
        let mut counts_so_far = LetterCount::new();
        counts_so_far.count[0] = 5;

        let outcome = handler.found_in_a_only(0, &counts_so_far, &counts_this_range, substring, &range, 3);

        let info = handler.error_store.get(&3u64).unwrap();
        assert_eq!(info.seq_num, Some(5));
        assert_eq!(info.read_end, Some(3));

        match &outcome.child_payload[which_pile(b'A')] {
            Some(ChildPayload::ErrorCorrection(p)) => {
                assert_eq!(p.interval_type, IntervalType::Error);
                assert_eq!(p.error_bwt_positions, vec![3]);
            }
            other => panic!("expected Error payload forwarded to A child, got {other:?}"),
        }
    }

    #[test]
    fn corrector_interval_appends_letter_and_forwards_tag() {
        let mut handler = BwtCorrectorHandler::new(2, 3);
        handler.error_store.insert(
            3,
            ErrorInfo {
                first_cycle: 2,
                last_cycle: 2,
                corrector: "A".to_string(),
                seq_num: None,
                read_end: None,
            },
        );

        let payload = ErrorCorrectionPayload {
            interval_type: IntervalType::Corrector,
            correction_bwt_positions: vec![3],
            error_bwt_positions: vec![],
        };
        let range = Range::ErrorCorrection(RangeBase::new(20, 2), payload);
        let mut counts_this_range = LetterCount::new();
        counts_this_range.count[which_pile(b'C')] = 2;
        let counts_so_far = LetterCount::new();

        let outcome = handler.found_in_a_only(0, &counts_so_far, &counts_this_range, b"", &range, 3);

        let info = handler.error_store.get(&3u64).unwrap();
        assert_eq!(info.corrector, "AC");

        match &outcome.child_payload[which_pile(b'C')] {
            Some(ChildPayload::ErrorCorrection(p)) => {
                assert_eq!(p.interval_type, IntervalType::Corrector);
                assert_eq!(p.correction_bwt_positions, vec![3]);
            }
            other => panic!("expected Corrector payload forwarded to C child, got {other:?}"),
        }
    }

    #[test]
    fn corrector_interval_with_minority_letter_does_not_register_new_error() {
        // A Corrector interval whose substring still contains a stray
        // minority letter must only extend the corrector (the block above)
        // and never fall into the Default error-detection path, which
        // would register a brand-new, independent ErrorInfo for it.
        let mut handler = BwtCorrectorHandler::new(2, 3);
        handler.error_store.insert(
            3,
            ErrorInfo {
                first_cycle: 2,
                last_cycle: 2,
                corrector: "A".to_string(),
                seq_num: None,
                read_end: None,
            },
        );

        let payload = ErrorCorrectionPayload {
            interval_type: IntervalType::Corrector,
            correction_bwt_positions: vec![3],
            error_bwt_positions: vec![],
        };
        let range = Range::ErrorCorrection(RangeBase::new(20, 3), payload);
        let substring = b"CCT";
        let counts_this_range = counts_for(substring);
        let counts_so_far = LetterCount::new();

        let outcome = handler.found_in_a_only(0, &counts_so_far, &counts_this_range, substring, &range, 3);

        assert_eq!(handler.error_store.len(), 1);
        match &outcome.child_payload[which_pile(b'T')] {
            None => {}
            other => panic!("Default error path must not fire on a Corrector interval, got {other:?}"),
        }
    }
}

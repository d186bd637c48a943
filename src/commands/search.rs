//! `beetl-search`: locates every query k-mer's BWT interval.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use rayon::prelude::*;

use crate::alphabet::{is_alphabet_char, which_pile, ALPHABET_SIZE};
use crate::backtracker::{merge_stats, run_cycle_for_pile, CycleStats};
use crate::bwt::{pile_path, total_counts_per_pile, BwtReader};
use crate::error::{BeetlError, Result};
use crate::handlers::kmer::{build_kmer_items, KmerLocatorHandler, KmerSearchItem};
use crate::range::{KmerSearchPayload, Range, RangeBase};
use crate::range_store::RangeStore;

pub struct SearchCommand {
    pub bwt_prefix: PathBuf,
    pub kmers_file: Option<PathBuf>,
    pub one_kmer_string: Option<String>,
    pub output: PathBuf,
    pub use_shared_mem: bool,
}

impl SearchCommand {
    pub fn new(bwt_prefix: PathBuf) -> Self {
        Self {
            bwt_prefix,
            kmers_file: None,
            one_kmer_string: None,
            output: PathBuf::from("-"),
            use_shared_mem: false,
        }
    }

    pub fn with_kmers_file(mut self, path: PathBuf) -> Self {
        self.kmers_file = Some(path);
        self
    }

    pub fn with_one_kmer_string(mut self, kmer: String) -> Self {
        self.one_kmer_string = Some(kmer);
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

    fn validate_kmer(token: &str) -> Result<Vec<u8>> {
        let bytes = token.as_bytes();
        for &c in bytes {
            if !is_alphabet_char(c) || c == b'$' {
                return Err(BeetlError::BadInput(format!(
                    "kmer {token:?} contains letter outside the alphabet"
                )));
            }
        }
        Ok(bytes.to_vec())
    }

    fn collect_queries(&self) -> Result<Vec<Vec<u8>>> {
        match (&self.kmers_file, &self.one_kmer_string) {
            (Some(_), Some(_)) => Err(BeetlError::BadConfig(
                "--kmers-input-file and --one-kmer-string are mutually exclusive".to_string(),
            )),
            (None, None) => Err(BeetlError::BadConfig(
                "one of --kmers-input-file or --one-kmer-string is required".to_string(),
            )),
            (Some(path), None) => {
                let contents = fs::read_to_string(path).map_err(|e| BeetlError::MissingFile {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                let mut queries = Vec::new();
                for line in contents.lines() {
                    let token = match line.split_whitespace().next() {
                        Some(t) => t,
                        None => continue,
                    };
                    if token.len() < 2 {
                        continue;
                    }
                    queries.push(Self::validate_kmer(token)?);
                }
                Ok(queries)
            }
            (None, Some(kmer)) => {
                if kmer.len() < 2 {
                    return Ok(Vec::new());
                }
                Ok(vec![Self::validate_kmer(kmer)?])
            }
        }
    }

    pub fn run(&self) -> Result<()> {
        let queries = self.collect_queries()?;
        let indexed: Vec<(Vec<u8>, usize)> = queries.into_iter().enumerate().map(|(i, q)| (q, i)).collect();
        let num_queries = indexed.len();
        let items = build_kmer_items(&indexed);

        let counts_per_pile = total_counts_per_pile(&self.bwt_prefix, self.use_shared_mem)?;

        let store = Mutex::new(RangeStore::new("search")?);
        {
            let mut guard = store.lock().unwrap();
            let mut start = 0usize;
            while start < items.len() {
                let letter = which_pile(items[start].kmer_reversed[0]);
                let mut end = start + 1;
                while end < items.len() && which_pile(items[end].kmer_reversed[0]) == letter {
                    end += 1;
                }
                // `pos` is local to pile `letter`'s own reader (every
                // child range the backtracker produces is local to its
                // destination pile too — see `backtracker::child_range`),
                // and pile `letter` at cycle 1 is matched in full.
                let pos = 0u64;
                let num = counts_per_pile.piles[letter].total();
                if num > 0 {
                    let seed = Range::KmerSearch(
                        RangeBase::new(pos, num),
                        KmerSearchPayload { start, end },
                    );
                    guard.add_range(&seed, letter, 0)?;
                }
                start = end;
            }
            guard.clear()?;
        }

        let handler = Mutex::new(KmerLocatorHandler::new(items));
        let mut cycle = 1u64;
        loop {
            let pending = store.lock().unwrap().has_pending_ranges();
            if !pending {
                break;
            }

            let results: Vec<Result<CycleStats>> = (1..ALPHABET_SIZE)
                .into_par_iter()
                .map(|pile| {
                    let path = pile_path(&self.bwt_prefix, pile);
                    let mut reader = BwtReader::open(&path, self.use_shared_mem)?;
                    let counts_at_pile_start = counts_per_pile.cumulative_start_of_pile(pile);
                    run_cycle_for_pile(pile, &mut reader, &counts_at_pile_start, &store, &handler, cycle)
                })
                .collect();

            let mut stats = CycleStats::default();
            for r in results {
                merge_stats(&mut stats, r?);
            }
            if stats.num_ranges > 0 {
                eprintln!(
                    "cycle {cycle}: {} ranges, {} singleton",
                    stats.num_ranges, stats.num_singleton_ranges
                );
            }

            store.lock().unwrap().clear()?;
            cycle += 1;
        }

        let handler = handler.into_inner().unwrap();
        let mut items = handler.kmer_items;
        items.sort_by_key(|item| item.original_index);
        debug_assert_eq!(items.len(), num_queries);

        self.write_output(&items)
    }

    fn write_output(&self, items: &[KmerSearchItem]) -> Result<()> {
        let mut out: Box<dyn Write> = if self.output.as_os_str() == "-" {
            Box::new(std::io::stdout())
        } else {
            Box::new(fs::File::create(&self.output)?)
        };

        let mut num_buf = itoa::Buffer::new();
        for item in items {
            let mut original = item.kmer_reversed.clone();
            original.reverse();
            out.write_all(&original)?;
            out.write_all(b" ")?;
            out.write_all(num_buf.format(item.position).as_bytes())?;
            out.write_all(b" ")?;
            out.write_all(num_buf.format(item.count).as_bytes())?;
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
    fn rejects_conflicting_query_sources() {
        let mut cmd = SearchCommand::new(PathBuf::from("/tmp/nonexistent"));
        cmd = cmd.with_kmers_file(PathBuf::from("a")).with_one_kmer_string("ACG".into());
        assert!(cmd.collect_queries().is_err());
    }

    #[test]
    fn rejects_missing_query_source() {
        let cmd = SearchCommand::new(PathBuf::from("/tmp/nonexistent"));
        assert!(cmd.collect_queries().is_err());
    }

    #[test]
    fn rejects_letters_outside_alphabet() {
        let cmd = SearchCommand::new(PathBuf::from("/tmp/nonexistent"))
            .with_one_kmer_string("ACGTx".into());
        assert!(cmd.collect_queries().is_err());
    }

    #[test]
    fn single_letter_query_is_silently_dropped() {
        let cmd = SearchCommand::new(PathBuf::from("/tmp/nonexistent"))
            .with_one_kmer_string("A".into());
        assert_eq!(cmd.collect_queries().unwrap().len(), 0);
    }

    /// A single run of length 1 per character is the trivial case of the
    /// run-length format: header byte `(1 << 4) | letter`.
    fn encode_one_char_per_run(chars: &[u8]) -> Vec<u8> {
        chars
            .iter()
            .map(|&c| (1u8 << 4) | crate::alphabet::which_pile(c) as u8)
            .collect()
    }

    /// The BWT of the single sequence `ACGT$`: sorted suffixes are
    /// `$, ACGT$, CGT$, GT$, T$`, so the pile per suffix's first letter
    /// holds, in order, `T, $, A, C, G` — pile N is empty.
    fn write_acgt_dollar_fixture(prefix: &std::path::Path) {
        let piles: [&[u8]; 6] = [b"T", b"$", b"A", b"C", b"", b"G"];
        for (pile, content) in piles.iter().enumerate() {
            let path = crate::bwt::pile_path(prefix, pile);
            fs::write(&path, encode_one_char_per_run(content)).unwrap();
        }
    }

    #[test]
    fn locates_kmer_and_reports_its_bwt_position_and_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = dir.path().join("sample");
        write_acgt_dollar_fixture(&prefix);

        let out_path = dir.path().join("out.txt");
        let cmd = SearchCommand::new(prefix)
            .with_one_kmer_string("ACG".into())
            .with_output(out_path.clone());
        cmd.run().unwrap();

        let output = fs::read_to_string(&out_path).unwrap();
        assert_eq!(output, "ACG 0 1\n");
    }

    #[test]
    fn absent_kmer_reports_zero_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = dir.path().join("sample");
        write_acgt_dollar_fixture(&prefix);

        let out_path = dir.path().join("out.txt");
        let cmd = SearchCommand::new(prefix)
            .with_one_kmer_string("GGG".into())
            .with_output(out_path.clone());
        cmd.run().unwrap();

        let output = fs::read_to_string(&out_path).unwrap();
        assert_eq!(output, "GGG 0 0\n");
    }

    #[test]
    fn results_come_back_in_original_query_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = dir.path().join("sample");
        write_acgt_dollar_fixture(&prefix);

        let queries_path = dir.path().join("queries.txt");
        fs::write(&queries_path, "ACG\nGGG\n").unwrap();

        let out_path = dir.path().join("out.txt");
        let cmd = SearchCommand::new(prefix)
            .with_kmers_file(queries_path)
            .with_output(out_path.clone());
        cmd.run().unwrap();

        let output = fs::read_to_string(&out_path).unwrap();
        assert_eq!(output, "ACG 0 1\nGGG 0 0\n");
    }
}

//! Sequential + random-access reader for one run-length compressed BWT
//! pile file.

use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::bwt::index::{BwtIndex, IndexBuilder};
use crate::error::{BeetlError, Result};
use crate::letter_count::LetterCount;

/// The header byte `0xFF` cannot occur in the run-length encoding (it
/// would encode letter code 15, outside 0..5), so it is reserved as the
/// first byte of a pile file to mark the plain-ASCII fallback.
const PLAIN_ASCII_MARKER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BwtFormat {
    RunLength,
    PlainAscii,
}

enum BwtBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for BwtBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            BwtBytes::Mapped(m) => m,
            BwtBytes::Owned(v) => v,
        }
    }
}

/// Reads a single compressed BWT pile, sequentially or via `skipTo` backed
/// by an optional `.idx` sidecar.
pub struct BwtReader {
    path: PathBuf,
    bytes: BwtBytes,
    format: BwtFormat,
    data_start: usize,
    /// Byte offset of the *next* unread run header, relative to the start
    /// of the file (including the plain-ASCII marker byte if present).
    byte_cursor: usize,
    /// Current BWT position within this pile, 0-based.
    logical_pos: u64,
    /// Remaining unread characters in the run currently being decoded.
    run_letter: Option<usize>,
    run_remaining: u64,
    index: Option<BwtIndex>,
}

impl BwtReader {
    pub fn open<P: AsRef<Path>>(path: P, use_shared_mem: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| BeetlError::MissingFile {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let bytes = if use_shared_mem {
            let mmap = unsafe { Mmap::map(&file)? };
            BwtBytes::Mapped(mmap)
        } else {
            use std::io::Read;
            let mut v = Vec::new();
            let mut f = file;
            f.read_to_end(&mut v)?;
            BwtBytes::Owned(v)
        };

        let (format, data_start) = if bytes.first() == Some(&PLAIN_ASCII_MARKER) {
            (BwtFormat::PlainAscii, 1)
        } else {
            (BwtFormat::RunLength, 0)
        };

        let idx_path = Self::index_path(&path);
        let index = if idx_path.exists() {
            Some(BwtIndex::open(&idx_path)?)
        } else {
            None
        };

        Ok(Self {
            path,
            bytes,
            format,
            data_start,
            byte_cursor: data_start,
            logical_pos: 0,
            run_letter: None,
            run_remaining: 0,
            index,
        })
    }

    pub fn index_path(prefix_pile_path: &Path) -> PathBuf {
        let mut s = prefix_pile_path.as_os_str().to_os_string();
        s.push(".idx");
        PathBuf::from(s)
    }

    pub fn logical_pos(&self) -> u64 {
        self.logical_pos
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_cursor(&self) -> usize {
        self.byte_cursor
    }

    /// Decodes the next run, advancing `byte_cursor`. Returns `None` at
    /// end of file.
    fn decode_next_run(&mut self) -> Result<Option<(usize, u64)>> {
        if self.byte_cursor >= self.bytes.len() {
            return Ok(None);
        }
        match self.format {
            BwtFormat::PlainAscii => {
                let c = self.bytes[self.byte_cursor];
                self.byte_cursor += 1;
                Ok(Some((crate::alphabet::which_pile(c), 1)))
            }
            BwtFormat::RunLength => {
                let header = self.bytes[self.byte_cursor];
                self.byte_cursor += 1;
                let letter = (header & 0x0F) as usize;
                if letter >= crate::alphabet::ALPHABET_SIZE {
                    return Err(BeetlError::CorruptBwt {
                        path: self.path.clone(),
                        reason: format!("invalid letter code {letter} in run header"),
                    });
                }
                let mut run = (header >> 4) as u64;
                if run == 15 {
                    loop {
                        if self.byte_cursor >= self.bytes.len() {
                            return Err(BeetlError::CorruptBwt {
                                path: self.path.clone(),
                                reason: "truncated run-length continuation".to_string(),
                            });
                        }
                        let b = self.bytes[self.byte_cursor];
                        self.byte_cursor += 1;
                        run += b as u64;
                        if b != 255 {
                            break;
                        }
                    }
                }
                Ok(Some((letter, run)))
            }
        }
    }

    /// Ensures `run_remaining > 0` or returns `false` at true end of pile.
    fn refill_run(&mut self) -> Result<bool> {
        while self.run_remaining == 0 {
            match self.decode_next_run()? {
                Some((letter, run)) => {
                    self.run_letter = Some(letter);
                    self.run_remaining = run;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Advances exactly `n` BWT positions, optionally writing the decoded
    /// characters into `out` and always accumulating letter counts into
    /// `counts`.
    fn advance(&mut self, n: u64, mut out: Option<&mut Vec<u8>>, counts: &mut LetterCount) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            if !self.refill_run()? {
                return Err(BeetlError::CorruptBwt {
                    path: self.path.clone(),
                    reason: format!(
                        "pile exhausted with {remaining} positions still requested"
                    ),
                });
            }
            let take = remaining.min(self.run_remaining);
            let letter = self.run_letter.expect("refill_run guarantees a letter");
            counts.count[letter] += take;
            if let Some(buf) = out.as_deref_mut() {
                let c = crate::alphabet::pile_letter(letter);
                buf.extend(std::iter::repeat(c).take(take as usize));
            }
            self.run_remaining -= take;
            remaining -= take;
            self.logical_pos += take;
        }
        Ok(())
    }

    /// Advances sequentially by exactly `n` positions, tallying letters
    /// into `counts` without materialising the decoded characters.
    pub fn read_and_count(&mut self, counts: &mut LetterCount, n: u64) -> Result<()> {
        self.advance(n, None, counts)
    }

    /// Advances sequentially by exactly `n` positions, appending the
    /// decoded characters to `out`. Does not accumulate a separate count;
    /// callers that need counts call [`LetterCount::add_bwt_substring`] on
    /// the returned slice.
    pub fn read(&mut self, out: &mut Vec<u8>, n: u64) -> Result<()> {
        let mut discard = LetterCount::new();
        self.advance(n, Some(out), &mut discard)
    }

    /// Reads and tallies every remaining run in the pile, with no
    /// predetermined length. Used once at startup to learn the total
    /// per-letter counts of a pile before any range has been seeded.
    pub fn read_and_count_to_end(&mut self, counts: &mut LetterCount) -> Result<()> {
        while self.refill_run()? {
            let take = self.run_remaining;
            let letter = self.run_letter.expect("refill_run guarantees a letter");
            counts.count[letter] += take;
            self.run_remaining = 0;
            self.logical_pos += take;
        }
        Ok(())
    }

    /// Scans the whole pile once, writing a `.idx` sidecar with one record
    /// every `block_size` compressed bytes (plus one at the start), and
    /// returns the pile's total per-letter counts.
    pub fn build_index(path: &Path, idx_path: &Path, block_size: u64) -> Result<LetterCount> {
        let mut reader = Self::open(path, false)?;
        let mut builder = IndexBuilder::create(idx_path, block_size)?;
        let mut counts = LetterCount::new();

        loop {
            let offset_before = reader.byte_cursor;
            let pos_before = reader.logical_pos;
            builder.observe(pos_before, offset_before as u64, counts)?;
            match reader.decode_next_run()? {
                Some((letter, run)) => {
                    counts.count[letter] += run;
                    reader.logical_pos += run;
                }
                None => break,
            }
        }

        builder.finish()?;
        Ok(counts)
    }

    pub fn rewind(&mut self) {
        self.byte_cursor = self.data_start;
        self.logical_pos = 0;
        self.run_letter = None;
        self.run_remaining = 0;
    }

    /// Repositions to `pos`, updating `counts_out` in place so that, on
    /// return, it equals the cumulative letter count over `[0, pos)` of
    /// this pile — assuming `counts_out` already held the correct
    /// cumulative count for `[0, logical_pos)` on entry (true by
    /// induction, since callers only ever move forward).
    pub fn skip_to(&mut self, pos: u64, counts_out: &mut LetterCount) -> Result<()> {
        if pos < self.logical_pos {
            return Err(BeetlError::CorruptBwt {
                path: self.path.clone(),
                reason: format!(
                    "skipTo target {pos} precedes current position {}",
                    self.logical_pos
                ),
            });
        }

        if let Some(index) = &self.index {
            if let Some(entry) = index.floor_entry(pos) {
                if entry.bwt_pos > self.logical_pos {
                    self.byte_cursor = self.data_start + entry.compressed_offset as usize;
                    self.logical_pos = entry.bwt_pos;
                    self.run_letter = None;
                    self.run_remaining = 0;
                    *counts_out = entry.counts;
                }
            }
        }

        let remaining = pos - self.logical_pos;
        if remaining > 0 {
            self.advance(remaining, None, counts_out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Encodes a raw BWT string into the run-length format described in
    /// the module doc comment, for use as test fixtures.
    pub fn encode_rle(chars: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let mut run = 1u64;
            while i + (run as usize) < chars.len() && chars[i + run as usize] == c {
                run += 1;
            }
            let letter = crate::alphabet::which_pile(c) as u8;
            if run < 15 {
                out.push(((run as u8) << 4) | letter);
            } else {
                out.push((15u8 << 4) | letter);
                let mut rem = run - 15;
                while rem >= 255 {
                    out.push(255);
                    rem -= 255;
                }
                out.push(rem as u8);
            }
            i += run as usize;
        }
        out
    }

    fn write_fixture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn decodes_simple_runs_sequentially() {
        let encoded = encode_rle(b"AAACGT$$");
        let file = write_fixture(&encoded);
        let mut reader = BwtReader::open(file.path(), false).unwrap();

        let mut buf = Vec::new();
        reader.read(&mut buf, 8).unwrap();
        assert_eq!(&buf, b"AAACGT$$");
    }

    #[test]
    fn read_and_count_tallies_without_buffer() {
        let encoded = encode_rle(b"AAACGT$$");
        let file = write_fixture(&encoded);
        let mut reader = BwtReader::open(file.path(), false).unwrap();

        let mut counts = LetterCount::new();
        reader.read_and_count(&mut counts, 8).unwrap();
        assert_eq!(counts.count[crate::alphabet::which_pile(b'A')], 3);
        assert_eq!(counts.count[crate::alphabet::which_pile(b'$')], 2);
    }

    #[test]
    fn plain_ascii_fallback_decodes_correctly() {
        let mut bytes = vec![PLAIN_ASCII_MARKER];
        bytes.extend_from_slice(b"ACGT$N");
        let file = write_fixture(&bytes);
        let mut reader = BwtReader::open(file.path(), false).unwrap();

        let mut buf = Vec::new();
        reader.read(&mut buf, 6).unwrap();
        assert_eq!(&buf, b"ACGT$N");
    }

    #[test]
    fn long_runs_use_continuation_bytes() {
        let long_run: Vec<u8> = std::iter::repeat(b'A').take(300).collect();
        let encoded = encode_rle(&long_run);
        let file = write_fixture(&encoded);
        let mut reader = BwtReader::open(file.path(), false).unwrap();

        let mut counts = LetterCount::new();
        reader.read_and_count(&mut counts, 300).unwrap();
        assert_eq!(counts.count[crate::alphabet::which_pile(b'A')], 300);
    }

    #[test]
    fn skip_to_matches_naive_prefix_count() {
        let raw = b"AACGTACGTNN$$AACC";
        let encoded = encode_rle(raw);
        let file = write_fixture(&encoded);
        let mut reader = BwtReader::open(file.path(), false).unwrap();

        for &x in &[0u64, 1, 5, 10, raw.len() as u64] {
            reader.rewind();
            let mut counts = LetterCount::new();
            reader.skip_to(x, &mut counts).unwrap();

            let mut naive = LetterCount::new();
            naive.add_bwt_substring(&raw[..x as usize]);
            assert_eq!(counts, naive, "mismatch at x={x}");
        }
    }

    #[test]
    fn rewind_resets_to_start() {
        let encoded = encode_rle(b"ACGT");
        let file = write_fixture(&encoded);
        let mut reader = BwtReader::open(file.path(), false).unwrap();
        let mut buf = Vec::new();
        reader.read(&mut buf, 2).unwrap();
        reader.rewind();
        buf.clear();
        reader.read(&mut buf, 4).unwrap();
        assert_eq!(&buf, b"ACGT");
    }

    #[test]
    fn read_and_count_to_end_tallies_whole_pile() {
        let raw = b"AACGTACGTNN$$AACC";
        let encoded = encode_rle(raw);
        let file = write_fixture(&encoded);
        let mut reader = BwtReader::open(file.path(), false).unwrap();

        let mut counts = LetterCount::new();
        reader.read_and_count_to_end(&mut counts).unwrap();

        let mut naive = LetterCount::new();
        naive.add_bwt_substring(raw);
        assert_eq!(counts, naive);
        assert_eq!(reader.logical_pos(), raw.len() as u64);
    }

    #[test]
    fn corrupt_letter_code_is_reported() {
        // run-length nibble 15 paired with an out-of-range low nibble
        // that is not the reserved all-ones marker byte.
        let bytes = vec![0xF6u8]; // high nibble 15 (continuation), low nibble 6: invalid letter
        let file = write_fixture(&bytes);
        let mut reader = BwtReader::open(file.path(), false).unwrap();
        let mut counts = LetterCount::new();
        assert!(reader.read_and_count(&mut counts, 1).is_err());
    }
}

//! External, on-disk queue of pending ranges, double-buffered between the
//! current cycle and the next one.
//!
//! Buckets are keyed by `(toPile, fromPile)`. During cycle `c` the store
//! reads bucket files belonging to cycle `c` and appends to bucket files
//! belonging to cycle `c+1`; [`RangeStore::clear`] deletes the former and
//! renames the latter into place, advancing the cycle counter.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use rustc_hash::FxHashSet;
use tempfile::TempDir;

use crate::alphabet::ALPHABET_SIZE;
use crate::config;
use crate::error::Result;
use crate::range::Range;

type Bucket = (usize, usize);

struct BucketReader {
    reader: BufReader<File>,
    prev_pos: u64,
}

/// Dedup key: which bucket a range would land in, plus its position and
/// width, i.e. everything that makes two ranges "the same interval".
type KnownKey = (usize, usize, u64, u64);

pub struct RangeStore {
    _dir: TempDir,
    dir_path: PathBuf,
    label: String,
    cycle: u64,
    write_files: HashMap<Bucket, BufWriter<File>>,
    write_prev_pos: HashMap<Bucket, u64>,
    read_state: HashMap<Bucket, BucketReader>,
    current_portion: Option<Bucket>,
    known_ranges: FxHashSet<KnownKey>,
}

impl RangeStore {
    /// `label` distinguishes independently-driven stores sharing one
    /// process (e.g. the A and B sides of a comparator run) in their spill
    /// file names; pass the same label consistently for one logical
    /// store's lifetime.
    pub fn new(label: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let dir_path = dir.path().to_path_buf();
        Ok(Self {
            _dir: dir,
            dir_path,
            label: label.to_string(),
            cycle: 0,
            write_files: HashMap::new(),
            write_prev_pos: HashMap::new(),
            read_state: HashMap::new(),
            current_portion: None,
            known_ranges: FxHashSet::default(),
        })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn set_cycle_num(&mut self, cycle: u64) {
        self.cycle = cycle;
    }

    fn bucket_path(&self, cycle: u64, to_pile: usize, from_pile: usize) -> PathBuf {
        self.dir_path.join(format!(
            "{}_{cycle}_{to_pile}_{from_pile}.rangestore",
            self.label
        ))
    }

    /// Returns `true` if this exact `(toPile, fromPile, pos, num)` range
    /// has already been added this cycle. Only tracks state when
    /// deduplication is configured on; otherwise always reports "not
    /// known" so callers always add the range, matching the source
    /// default of skipping the check.
    pub fn is_range_known(&mut self, to_pile: usize, from_pile: usize, pos: u64, num: u64) -> bool {
        if !config::should_check_known_range() {
            return false;
        }
        !self.known_ranges.insert((to_pile, from_pile, pos, num))
    }

    /// Appends `range` to the next cycle's `(toPile, fromPile)` bucket.
    pub fn add_range(&mut self, range: &Range, to_pile: usize, from_pile: usize) -> Result<()> {
        let bucket = (to_pile, from_pile);
        let next_cycle = self.cycle + 1;
        let prev_pos = *self.write_prev_pos.get(&bucket).unwrap_or(&0);
        let pos = range.base().pos;

        let writer = match self.write_files.get_mut(&bucket) {
            Some(w) => w,
            None => {
                let path = self.bucket_path(next_cycle, to_pile, from_pile);
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                self.write_files.insert(bucket, BufWriter::new(file));
                self.write_files.get_mut(&bucket).unwrap()
            }
        };
        range.write_to(writer, prev_pos)?;
        self.write_prev_pos.insert(bucket, pos);
        Ok(())
    }

    /// Selects bucket `(to_pile, from_pile)` of the *current* cycle for
    /// reading via [`RangeStore::get_range`].
    pub fn set_portion(&mut self, to_pile: usize, from_pile: usize) -> Result<()> {
        let bucket = (to_pile, from_pile);
        if !self.read_state.contains_key(&bucket) {
            let path = self.bucket_path(self.cycle, to_pile, from_pile);
            match File::open(&path) {
                Ok(file) => {
                    self.read_state.insert(
                        bucket,
                        BucketReader {
                            reader: BufReader::new(file),
                            prev_pos: 0,
                        },
                    );
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Empty bucket: leave unset, get_range will see no
                    // entry and report end-of-bucket immediately.
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.current_portion = Some(bucket);
        Ok(())
    }

    /// Reads the next range from the portion selected by
    /// [`RangeStore::set_portion`], in ascending `pos` order. Returns
    /// `None` at end of bucket.
    pub fn get_range(&mut self) -> Result<Option<Range>> {
        let bucket = match self.current_portion {
            Some(b) => b,
            None => return Ok(None),
        };
        let state = match self.read_state.get_mut(&bucket) {
            Some(s) => s,
            None => return Ok(None),
        };
        match Range::read_from(&mut state.reader, state.prev_pos) {
            Ok(range) => {
                state.prev_pos = range.base().pos;
                Ok(Some(range))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Flushes pending writes, deletes all cycle-`c` bucket files, and
    /// advances the cycle pointer so cycle-`(c+1)` files become the new
    /// current cycle.
    pub fn clear(&mut self) -> Result<()> {
        for (_, mut writer) in self.write_files.drain() {
            writer.flush()?;
        }
        self.read_state.clear();
        self.current_portion = None;
        self.known_ranges.clear();

        for to_pile in 0..ALPHABET_SIZE {
            for from_pile in 0..ALPHABET_SIZE {
                let path = self.bucket_path(self.cycle, to_pile, from_pile);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        self.cycle += 1;
        Ok(())
    }

    /// Whether *any* bucket of the current cycle has at least one pending
    /// range, i.e. whether another cycle should run.
    pub fn has_pending_ranges(&self) -> bool {
        for to_pile in 0..ALPHABET_SIZE {
            for from_pile in 0..ALPHABET_SIZE {
                let path = self.bucket_path(self.cycle, to_pile, from_pile);
                if path.exists() {
                    if let Ok(meta) = fs::metadata(&path) {
                        if meta.len() > 0 {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

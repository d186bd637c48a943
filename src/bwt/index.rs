//! Block-offset `.idx` sidecar: lets a run-length compressed BWT pile be
//! seeked to an arbitrary position without a full linear scan.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{BeetlError, Result};
use crate::letter_count::LetterCount;

/// One `.idx` record: the BWT position and cumulative letter counts as of
/// `compressed_offset` bytes into the compressed pile file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub bwt_pos: u64,
    pub compressed_offset: u64,
    pub counts: LetterCount,
}

const RECORD_LEN: usize = 8 + 8 + 8 * crate::alphabet::ALPHABET_SIZE;

impl IndexEntry {
    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.bwt_pos.to_le_bytes())?;
        w.write_all(&self.compressed_offset.to_le_bytes())?;
        for c in self.counts.count {
            w.write_all(&c.to_le_bytes())?;
        }
        Ok(())
    }

    fn read_from(buf: &[u8]) -> Self {
        let bwt_pos = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let compressed_offset = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let mut counts = LetterCount::new();
        for i in 0..crate::alphabet::ALPHABET_SIZE {
            let start = 16 + i * 8;
            counts.count[i] = u64::from_le_bytes(buf[start..start + 8].try_into().unwrap());
        }
        Self {
            bwt_pos,
            compressed_offset,
            counts,
        }
    }
}

/// Appends index records to a `.idx` file as the caller scans a pile.
pub struct IndexBuilder {
    writer: BufWriter<File>,
    block_size: u64,
    last_snapshot_offset: u64,
    wrote_any: bool,
}

impl IndexBuilder {
    pub fn create<P: AsRef<Path>>(path: P, block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(BeetlError::BadConfig(
                "block size must be > 0".to_string(),
            ));
        }
        let file = File::create(path.as_ref())?;
        Ok(Self {
            writer: BufWriter::new(file),
            block_size,
            last_snapshot_offset: 0,
            wrote_any: false,
        })
    }

    /// Called by the index-building scan after decoding more of the pile.
    /// Emits a record if `compressed_offset` has advanced by at least
    /// `block_size` since the last one, or if no record has been written
    /// yet (always emit one record at position 0).
    pub fn observe(
        &mut self,
        bwt_pos: u64,
        compressed_offset: u64,
        counts: LetterCount,
    ) -> Result<()> {
        let should_emit = !self.wrote_any
            || compressed_offset >= self.last_snapshot_offset + self.block_size;
        if should_emit {
            IndexEntry {
                bwt_pos,
                compressed_offset,
                counts,
            }
            .write_to(&mut self.writer)?;
            self.last_snapshot_offset = compressed_offset;
            self.wrote_any = true;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read-only, memory-mapped view over a `.idx` file.
pub struct BwtIndex {
    mmap: Mmap,
}

impl BwtIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| BeetlError::MissingFile {
            path: path.as_ref().to_path_buf(),
            reason: e.to_string(),
        })?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len() / RECORD_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, i: usize) -> IndexEntry {
        let start = i * RECORD_LEN;
        IndexEntry::read_from(&self.mmap[start..start + RECORD_LEN])
    }

    /// The entry with the greatest `bwt_pos` that is `<= pos`, if any.
    /// Entries are ordered by `compressed_offset`, which is monotone with
    /// `bwt_pos`, so a binary search applies.
    pub fn floor_entry(&self, pos: u64) -> Option<IndexEntry> {
        if self.is_empty() {
            return None;
        }
        let mut lo = 0usize;
        let mut hi = self.len(); // exclusive
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.entry(mid).bwt_pos <= pos {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            None
        } else {
            Some(self.entry(lo - 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn builder_always_emits_first_record() {
        let file = NamedTempFile::new().unwrap();
        let mut builder = IndexBuilder::create(file.path(), 1024).unwrap();
        builder.observe(0, 0, LetterCount::new()).unwrap();
        builder.finish().unwrap();

        let index = BwtIndex::open(file.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entry(0).bwt_pos, 0);
    }

    #[test]
    fn floor_entry_finds_the_nearest_boundary_at_or_below() {
        let file = NamedTempFile::new().unwrap();
        let mut builder = IndexBuilder::create(file.path(), 1).unwrap();
        builder.observe(0, 0, LetterCount::new()).unwrap();
        builder.observe(10, 5, LetterCount::new()).unwrap();
        builder.observe(20, 10, LetterCount::new()).unwrap();
        builder.finish().unwrap();

        let index = BwtIndex::open(file.path()).unwrap();
        assert_eq!(index.floor_entry(15).unwrap().bwt_pos, 10);
        assert_eq!(index.floor_entry(0).unwrap().bwt_pos, 0);
        assert_eq!(index.floor_entry(25).unwrap().bwt_pos, 20);
    }

    #[test]
    fn rejects_zero_block_size() {
        let file = NamedTempFile::new().unwrap();
        assert!(IndexBuilder::create(file.path(), 0).is_err());
    }
}

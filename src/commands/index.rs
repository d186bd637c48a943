//! `beetl-index`: builds the `.idx` sidecar for every pile of a BWT prefix.

use crate::alphabet::ALPHABET_SIZE;
use crate::bwt::{pile_path, BwtReader};
use crate::error::{BeetlError, Result};

pub struct IndexCommand {
    pub bwt_prefix: std::path::PathBuf,
    pub block_size: u64,
    pub force: bool,
}

impl IndexCommand {
    pub fn new(bwt_prefix: std::path::PathBuf) -> Self {
        Self {
            bwt_prefix,
            block_size: 2048,
            force: false,
        }
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn run(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(BeetlError::BadConfig("block size must be > 0".to_string()));
        }

        for pile in 0..ALPHABET_SIZE {
            let path = pile_path(&self.bwt_prefix, pile);
            let idx_path = BwtReader::index_path(&path);
            if idx_path.exists() && !self.force {
                return Err(BeetlError::Conflict(format!(
                    "{} already exists, pass --force to overwrite",
                    idx_path.display()
                )));
            }
            BwtReader::build_index(&path, &idx_path, self.block_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    /// A single-run-per-letter encoding is all these tests need; a run of
    /// length 1 per character keeps the fixture trivially decodable.
    fn encode_one_char_per_run(chars: &[u8]) -> Vec<u8> {
        chars
            .iter()
            .map(|&c| (1u8 << 4) | crate::alphabet::which_pile(c) as u8)
            .collect()
    }

    #[test]
    fn builds_one_idx_per_pile() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = dir.path().join("sample");
        for pile in 0..ALPHABET_SIZE {
            let path = pile_path(&prefix, pile);
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(&encode_one_char_per_run(b"AACGT")).unwrap();
        }

        let cmd = IndexCommand::new(prefix.clone()).with_block_size(1);
        cmd.run().unwrap();

        for pile in 0..ALPHABET_SIZE {
            let path = pile_path(&prefix, pile);
            assert!(BwtReader::index_path(&path).exists());
        }
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = dir.path().join("sample");
        for pile in 0..ALPHABET_SIZE {
            let path = pile_path(&prefix, pile);
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(&encode_one_char_per_run(b"AACGT")).unwrap();
        }

        IndexCommand::new(prefix.clone()).run().unwrap();
        let err = IndexCommand::new(prefix.clone()).run().unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}

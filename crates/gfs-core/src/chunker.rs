//! C3 — splitting a file into an ordered sequence of fixed-size plaintext blocks.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

/// Fixed plaintext block size. Placement receipts are keyed by
/// `block_sequence_number`, so this constant is part of the wire contract
/// and must never change without a migration plan.
pub const BLOCK_SIZE: usize = 16_384;

/// Number of 16 KiB blocks needed to cover a file of `size` bytes.
///
/// A zero-byte file still yields one (empty) block.
pub fn block_count(size: u64) -> u64 {
    if size == 0 {
        return 1;
    }
    size.div_ceil(BLOCK_SIZE as u64)
}

/// A lazy, ordered sequence of plaintext blocks read from a file.
///
/// Never holds more than one block's worth of plaintext in memory at a
/// time; blocks are numbered 1-based to match `block_sequence_number`.
pub struct Chunker {
    reader: BufReader<File>,
    next_sequence: u64,
    total_blocks: u64,
    file_size: u64,
}

impl Chunker {
    /// Open `path` and prepare to iterate its blocks in order.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::with_capacity(BLOCK_SIZE, file),
            next_sequence: 1,
            total_blocks: block_count(file_size),
            file_size,
        })
    }

    /// Total number of blocks this file will produce.
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Read the next block, or `None` once every block has been returned.
    ///
    /// Returns `(sequence_number, plaintext)`. Every block but the last is
    /// exactly [`BLOCK_SIZE`] bytes; the last block holds the remainder,
    /// which may be empty only when the file itself is empty.
    pub fn next_block(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        if self.next_sequence > self.total_blocks {
            return Ok(None);
        }
        let seq = self.next_sequence;
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut filled = 0usize;
        while filled < BLOCK_SIZE {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.next_sequence += 1;
        Ok(Some((seq, buf)))
    }
}

impl Iterator for Chunker {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn block_count_formula() {
        assert_eq!(block_count(0), 1);
        assert_eq!(block_count(5), 1);
        assert_eq!(block_count(BLOCK_SIZE as u64), 1);
        assert_eq!(block_count(BLOCK_SIZE as u64 + 1), 2);
        assert_eq!(block_count(40_000), 3);
    }

    #[test]
    fn single_small_file_one_block() {
        let f = write_temp(b"Hello");
        let mut c = Chunker::open(f.path()).unwrap();
        assert_eq!(c.total_blocks(), 1);
        let (seq, data) = c.next_block().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(data, b"Hello");
        assert!(c.next_block().unwrap().is_none());
    }

    #[test]
    fn multi_block_sizes_match_s3_scenario() {
        let data = vec![0xAAu8; 40_000];
        let f = write_temp(&data);
        let mut c = Chunker::open(f.path()).unwrap();
        assert_eq!(c.total_blocks(), 3);
        let (seq1, b1) = c.next_block().unwrap().unwrap();
        let (seq2, b2) = c.next_block().unwrap().unwrap();
        let (seq3, b3) = c.next_block().unwrap().unwrap();
        assert_eq!((seq1, b1.len()), (1, BLOCK_SIZE));
        assert_eq!((seq2, b2.len()), (2, BLOCK_SIZE));
        assert_eq!((seq3, b3.len()), (3, 40_000 - 2 * BLOCK_SIZE));
        assert!(c.next_block().unwrap().is_none());
    }

    #[test]
    fn empty_file_one_empty_block() {
        let f = write_temp(b"");
        let mut c = Chunker::open(f.path()).unwrap();
        assert_eq!(c.total_blocks(), 1);
        let (seq, data) = c.next_block().unwrap().unwrap();
        assert_eq!(seq, 1);
        assert!(data.is_empty());
    }
}

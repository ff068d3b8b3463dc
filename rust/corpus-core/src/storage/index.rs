// rust/corpus-core/src/storage/index.rs

//! Offset index over a memory-mapped, newline-delimited file.
//!
//! The index is built by a single forward scan and keeps only the start
//! offset of every record, so memory use grows with the record count and not
//! with the file size. Record bytes are read from the mapping on demand.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{CorpusError, Result};

const RECORD_TERMINATOR: u8 = b'\n';

/// Random access to the records of one file.
#[derive(Debug)]
pub struct RecordIndex {
    path: PathBuf,
    /// `None` for zero-length files, which cannot be mapped portably.
    mmap: Option<Mmap>,
    offsets: Vec<u64>,
}

impl RecordIndex {
    /// Maps `path` and scans it for record boundaries.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| CorpusError::io_with_source(path, "failed to open file", e))?;

        let size = file
            .metadata()
            .map_err(|e| CorpusError::io_with_source(path, "failed to read file metadata", e))?
            .len();

        let mmap = if size == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and the mapping is owned by
            // this index for its whole lifetime.
            let mmap = unsafe { Mmap::map(&file) }
                .map_err(|e| CorpusError::io_with_source(path, "failed to memory-map file", e))?;
            Some(mmap)
        };

        let offsets = scan_offsets(mmap.as_deref().unwrap_or(&[]));
        tracing::debug!(
            path = %path.display(),
            records = offsets.len(),
            bytes = size,
            "indexed corpus file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            offsets,
        })
    }

    /// Number of records in the file.
    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }

    /// Returns the bytes of record `index`, without its terminator.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `index >= record_count()`.
    pub fn read(&self, index: usize) -> Result<&[u8]> {
        let data = self.data();
        let start = match self.offsets.get(index) {
            Some(&offset) => offset as usize,
            None => {
                return Err(CorpusError::out_of_range(
                    "record",
                    index as i64,
                    self.offsets.len(),
                ))
            }
        };

        let end = match self.offsets.get(index + 1) {
            // The next record starts right after this record's terminator.
            Some(&next) => next as usize - 1,
            None if data.last() == Some(&RECORD_TERMINATOR) => data.len() - 1,
            None => data.len(),
        };

        Ok(&data[start..end])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the indexed file in bytes.
    pub fn byte_len(&self) -> u64 {
        self.data().len() as u64
    }

    fn data(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

/// Start offsets of every record in `data`.
///
/// A trailing terminator does not open an extra empty record.
fn scan_offsets(data: &[u8]) -> Vec<u64> {
    let mut offsets = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        offsets.push(pos as u64);
        match data[pos..].iter().position(|&b| b == RECORD_TERMINATOR) {
            Some(rel) => pos += rel + 1,
            None => break,
        }
    }

    offsets
}

/// Splits `data` into records the same way [`RecordIndex`] does.
pub(crate) fn split_records(data: &[u8]) -> Vec<Vec<u8>> {
    let mut records: Vec<Vec<u8>> = data
        .split(|&b| b == RECORD_TERMINATOR)
        .map(<[u8]>::to_vec)
        .collect();

    // `split` yields one trailing empty piece after a final terminator and one
    // empty piece for empty input; neither is a record.
    if data.is_empty() || data.last() == Some(&RECORD_TERMINATOR) {
        records.pop();
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_scan_offsets() {
        assert_eq!(scan_offsets(b"ab\ncd\n"), vec![0, 3]);
        assert_eq!(scan_offsets(b"ab\ncd"), vec![0, 3]);
        assert_eq!(scan_offsets(b"\n\nx"), vec![0, 1, 2]);
        assert!(scan_offsets(b"").is_empty());
    }

    #[test]
    fn test_read_records() {
        let file = write_file(b"first\nsecond line\nthird\n");
        let index = RecordIndex::open(file.path()).unwrap();

        assert_eq!(index.record_count(), 3);
        assert_eq!(index.read(0).unwrap(), b"first");
        assert_eq!(index.read(1).unwrap(), b"second line");
        assert_eq!(index.read(2).unwrap(), b"third");
    }

    #[test]
    fn test_last_record_without_terminator() {
        let file = write_file(b"one\ntwo");
        let index = RecordIndex::open(file.path()).unwrap();

        assert_eq!(index.record_count(), 2);
        assert_eq!(index.read(1).unwrap(), b"two");
    }

    #[test]
    fn test_empty_lines_are_records() {
        let file = write_file(b"a\n\n\nb\n");
        let index = RecordIndex::open(file.path()).unwrap();

        assert_eq!(index.record_count(), 4);
        assert_eq!(index.read(1).unwrap(), b"");
        assert_eq!(index.read(2).unwrap(), b"");
        assert_eq!(index.read(3).unwrap(), b"b");
    }

    #[test]
    fn test_empty_file() {
        let file = write_file(b"");
        let index = RecordIndex::open(file.path()).unwrap();

        assert_eq!(index.record_count(), 0);
        assert_eq!(index.byte_len(), 0);
        assert!(index.read(0).is_err());
    }

    #[test]
    fn test_read_out_of_range() {
        let file = write_file(b"only\n");
        let index = RecordIndex::open(file.path()).unwrap();

        let err = index.read(1).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::OutOfRange { what: "record", index: 1, len: 1 }
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let err = RecordIndex::open("/nonexistent/corpus.txt").unwrap_err();
        assert!(matches!(err, CorpusError::Io { .. }));
    }

    #[test]
    fn test_split_records_matches_index() {
        for content in [
            &b"a\nbb\nccc"[..],
            b"a\nbb\nccc\n",
            b"\n",
            b"",
            b"x\n\ny\n",
        ] {
            let file = write_file(content);
            let index = RecordIndex::open(file.path()).unwrap();
            let mapped: Vec<Vec<u8>> = (0..index.record_count())
                .map(|i| index.read(i).unwrap().to_vec())
                .collect();

            assert_eq!(split_records(content), mapped, "content {:?}", content);
        }
    }
}

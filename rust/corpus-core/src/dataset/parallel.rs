// rust/corpus-core/src/dataset/parallel.rs

//! Aligned multi-file corpora.
//!
//! A parallel corpus is N files whose line `i` belong together, such as a
//! source text and its translation. Records are yielded as one
//! [`ParallelRecord`] holding line `i` of every file, in file order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CorpusError, Result};
use crate::storage::{split_records, RecordIndex};

use super::traits::{ParallelRecord, ReadMode, Record, RecordSource, TraversalOrder};

/// An aligned corpus loaded fully into memory.
#[derive(Debug, Clone)]
pub struct InMemoryParallelText {
    paths: Vec<PathBuf>,
    /// One entry per line, each holding that line of every file.
    records: Vec<ParallelRecord>,
    order: TraversalOrder,
}

impl InMemoryParallelText {
    /// Reads every file of the corpus into memory.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `paths` is empty, `Io` if a file cannot be read
    /// and `MisalignedCorpus` if the files have different line counts.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        check_arity(paths)?;

        let mut columns = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let data = fs::read(path)
                .map_err(|e| CorpusError::io_with_source(path, "failed to read file", e))?;
            columns.push(split_records(&data));
        }

        let lens: Vec<usize> = columns.iter().map(Vec::len).collect();
        check_alignment(paths, &lens)?;

        let len = lens[0];
        let mut iters: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
        let records: Vec<ParallelRecord> = (0..len)
            .map(|_| iters.iter_mut().filter_map(|column| column.next()).collect())
            .collect();

        tracing::debug!(files = paths.len(), records = len, "loaded parallel corpus");
        Ok(Self {
            paths: paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            records,
            order: TraversalOrder::new(len),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of aligned files.
    pub fn arity(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl RecordSource for InMemoryParallelText {
    type Record = ParallelRecord;

    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        self.order.reset(self.records.len(), shuffle, seed);
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<ParallelRecord>> {
        Ok(self
            .order
            .next_index()
            .map(|index| self.records[index].clone()))
    }
}

/// An aligned corpus read through one mapping per file.
#[derive(Debug)]
pub struct MappedParallelText {
    indexes: Vec<RecordIndex>,
    order: TraversalOrder,
}

impl MappedParallelText {
    /// Maps and indexes every file of the corpus.
    ///
    /// # Errors
    ///
    /// Same as [`InMemoryParallelText::open`].
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        check_arity(paths)?;

        let indexes = paths
            .iter()
            .map(|path| RecordIndex::open(path))
            .collect::<Result<Vec<_>>>()?;

        let lens: Vec<usize> = indexes.iter().map(RecordIndex::record_count).collect();
        check_alignment(paths, &lens)?;

        let order = TraversalOrder::new(lens[0]);
        Ok(Self { indexes, order })
    }

    pub fn len(&self) -> usize {
        self.indexes[0].record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn arity(&self) -> usize {
        self.indexes.len()
    }

    fn read(&self, index: usize) -> Result<ParallelRecord> {
        self.indexes
            .iter()
            .map(|file| file.read(index).map(<[u8]>::to_vec))
            .collect()
    }
}

impl RecordSource for MappedParallelText {
    type Record = ParallelRecord;

    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        self.order.reset(self.len(), shuffle, seed);
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<ParallelRecord>> {
        match self.order.next_index() {
            Some(index) => Ok(Some(self.read(index)?)),
            None => Ok(None),
        }
    }
}

/// An aligned corpus, read in memory or through mappings.
#[derive(Debug)]
pub enum ParallelCorpus {
    InMemory(InMemoryParallelText),
    Mapped(MappedParallelText),
}

impl ParallelCorpus {
    /// Opens the aligned files `paths`.
    ///
    /// With [`ReadMode::Auto`] the corpus is mapped when its largest file
    /// reaches the threshold.
    pub fn open<P: AsRef<Path>>(paths: &[P], mode: ReadMode) -> Result<Self> {
        let mut mapped = false;
        for path in paths {
            mapped |= mode.maps_file(path.as_ref())?;
        }

        if mapped {
            Ok(Self::Mapped(MappedParallelText::open(paths)?))
        } else {
            Ok(Self::InMemory(InMemoryParallelText::open(paths)?))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::InMemory(text) => text.len(),
            Self::Mapped(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::InMemory(text) => text.arity(),
            Self::Mapped(text) => text.arity(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl RecordSource for ParallelCorpus {
    type Record = ParallelRecord;

    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        match self {
            Self::InMemory(text) => text.reset(shuffle, seed),
            Self::Mapped(text) => text.reset(shuffle, seed),
        }
    }

    fn next_record(&mut self) -> Result<Option<Vec<Record>>> {
        match self {
            Self::InMemory(text) => text.next_record(),
            Self::Mapped(text) => text.next_record(),
        }
    }
}

fn check_arity<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    if paths.is_empty() {
        return Err(CorpusError::config(
            "a parallel corpus needs at least one file",
        ));
    }
    Ok(())
}

fn check_alignment<P: AsRef<Path>>(paths: &[P], lens: &[usize]) -> Result<()> {
    let expected = lens[0];
    for (path, &len) in paths.iter().zip(lens) {
        if len != expected {
            return Err(CorpusError::misaligned(format!(
                "'{}' has {} lines but '{}' has {}",
                path.as_ref().display(),
                len,
                paths[0].as_ref().display(),
                expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_corpus(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn drain(corpus: &mut ParallelCorpus) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Some(record) = corpus.next_record().unwrap() {
            out.push(
                record
                    .into_iter()
                    .map(|field| String::from_utf8(field).unwrap())
                    .collect(),
            );
        }
        out
    }

    #[test]
    fn test_yields_aligned_tuples() {
        let en = write_corpus("hello\nworld\n");
        let de = write_corpus("hallo\nwelt\n");

        for mode in [ReadMode::InMemory, ReadMode::Mapped] {
            let mut corpus = ParallelCorpus::open(&[en.path(), de.path()], mode).unwrap();
            assert_eq!(corpus.len(), 2);
            assert_eq!(corpus.arity(), 2);
            assert_eq!(
                drain(&mut corpus),
                vec![vec!["hello", "hallo"], vec!["world", "welt"]]
            );
        }
    }

    #[test]
    fn test_shuffle_keeps_alignment() {
        let left: String = (0..40).map(|i| format!("{}\n", i)).collect();
        let right: String = (0..40).map(|i| format!("r{}\n", i)).collect();
        let a = write_corpus(&left);
        let b = write_corpus(&right);

        for mode in [ReadMode::InMemory, ReadMode::Mapped] {
            let mut corpus = ParallelCorpus::open(&[a.path(), b.path()], mode).unwrap();
            corpus.reset(true, 11).unwrap();

            let records = drain(&mut corpus);
            assert_eq!(records.len(), 40);
            for record in records {
                assert_eq!(format!("r{}", record[0]), record[1]);
            }
        }
    }

    #[test]
    fn test_mismatched_line_counts() {
        let a = write_corpus("one\ntwo\nthree\n");
        let b = write_corpus("eins\nzwei\n");

        for mode in [ReadMode::InMemory, ReadMode::Mapped] {
            let err = ParallelCorpus::open(&[a.path(), b.path()], mode).unwrap_err();
            assert!(matches!(err, CorpusError::MisalignedCorpus { .. }));
        }
    }

    #[test]
    fn test_no_files_is_config_error() {
        let paths: [&Path; 0] = [];
        let err = ParallelCorpus::open(&paths, ReadMode::InMemory).unwrap_err();
        assert!(matches!(err, CorpusError::Config { .. }));
    }

    #[test]
    fn test_single_file_corpus() {
        let a = write_corpus("x\ny\n");
        let mut corpus = ParallelCorpus::open(&[a.path()], ReadMode::Mapped).unwrap();
        assert_eq!(drain(&mut corpus), vec![vec!["x"], vec!["y"]]);
    }

    #[test]
    fn test_auto_mode_maps_when_any_file_is_large() {
        let small = write_corpus("a\n");
        let large = write_corpus("a much longer line\n");

        let corpus = ParallelCorpus::open(
            &[small.path(), large.path()],
            ReadMode::Auto { threshold: 8 },
        )
        .unwrap();
        assert!(corpus.is_mapped());
    }
}

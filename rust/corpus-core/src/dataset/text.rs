// rust/corpus-core/src/dataset/text.rs

//! Single-file corpus readers.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CorpusError, Result};
use crate::storage::{split_records, RecordIndex};

use super::traits::{ReadMode, Record, RecordSource, TraversalOrder};

/// A corpus file loaded fully into memory.
#[derive(Debug, Clone)]
pub struct InMemoryText {
    path: PathBuf,
    records: Vec<Record>,
    order: TraversalOrder,
}

impl InMemoryText {
    /// Reads every record of `path` into memory.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the file cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            fs::read(path).map_err(|e| CorpusError::io_with_source(path, "failed to read file", e))?;
        let records = split_records(&data);
        tracing::debug!(
            path = %path.display(),
            records = records.len(),
            "loaded corpus into memory"
        );
        Ok(Self::from_records(path, records))
    }

    /// Wraps records that are already in memory.
    pub fn from_records(path: impl Into<PathBuf>, records: Vec<Record>) -> Self {
        let order = TraversalOrder::new(records.len());
        Self {
            path: path.into(),
            records,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns record `index` in on-disk order.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        self.records
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| CorpusError::out_of_range("record", index as i64, self.records.len()))
    }
}

impl RecordSource for InMemoryText {
    type Record = Record;

    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        self.order.reset(self.records.len(), shuffle, seed);
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        Ok(self
            .order
            .next_index()
            .map(|index| self.records[index].clone()))
    }
}

/// A memory-mapped corpus file.
///
/// Only record offsets are held in memory; record bytes are copied out of
/// the mapping as they are yielded.
#[derive(Debug)]
pub struct MappedText {
    index: RecordIndex,
    order: TraversalOrder,
}

impl MappedText {
    /// Maps `path` and indexes its records.
    ///
    /// # Errors
    ///
    /// Returns an `Io` error if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let index = RecordIndex::open(path)?;
        let order = TraversalOrder::new(index.record_count());
        Ok(Self { index, order })
    }

    pub fn len(&self) -> usize {
        self.index.record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        self.index.path()
    }

    /// Returns record `index` in on-disk order.
    pub fn get(&self, index: usize) -> Result<&[u8]> {
        self.index.read(index)
    }
}

impl RecordSource for MappedText {
    type Record = Record;

    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        self.order.reset(self.index.record_count(), shuffle, seed);
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.order.next_index() {
            Some(index) => Ok(Some(self.index.read(index)?.to_vec())),
            None => Ok(None),
        }
    }
}

/// A single corpus file, read in memory or through a mapping.
#[derive(Debug)]
pub enum TextCorpus {
    InMemory(InMemoryText),
    Mapped(MappedText),
}

impl TextCorpus {
    /// Opens `path` with the strategy chosen by `mode`.
    pub fn open(path: impl AsRef<Path>, mode: ReadMode) -> Result<Self> {
        let path = path.as_ref();
        if mode.maps_file(path)? {
            Ok(Self::Mapped(MappedText::open(path)?))
        } else {
            Ok(Self::InMemory(InMemoryText::open(path)?))
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

    pub fn path(&self) -> &Path {
        match self {
            Self::InMemory(text) => text.path(),
            Self::Mapped(text) => text.path(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    pub fn get(&self, index: usize) -> Result<&[u8]> {
        match self {
            Self::InMemory(text) => text.get(index),
            Self::Mapped(text) => text.get(index),
        }
    }
}

impl RecordSource for TextCorpus {
    type Record = Record;

    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        match self {
            Self::InMemory(text) => text.reset(shuffle, seed),
            Self::Mapped(text) => text.reset(shuffle, seed),
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        match self {
            Self::InMemory(text) => text.next_record(),
            Self::Mapped(text) => text.next_record(),
        }
    }
}

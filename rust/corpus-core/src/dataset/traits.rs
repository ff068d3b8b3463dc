// rust/corpus-core/src/dataset/traits.rs

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{CorpusError, Result};

/// One line of a corpus file, without its terminator.
pub type Record = Vec<u8>;

/// One line from each file of an aligned corpus, all from the same line number.
pub type ParallelRecord = Vec<Record>;

/// A resettable stream of records.
///
/// Every corpus reader implements this: single files (in memory or mapped),
/// aligned parallel files, and sharded collections of either.
pub trait RecordSource {
    type Record;

    /// Starts a new epoch.
    ///
    /// With `shuffle` the records are visited in a permutation derived from
    /// `seed`; otherwise in on-disk order.
    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()>;

    /// Returns the next record, or `Ok(None)` once the epoch is exhausted.
    fn next_record(&mut self) -> Result<Option<Self::Record>>;
}

/// Chooses between loading a file eagerly and memory-mapping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read the whole file into memory at construction.
    InMemory,
    /// Map the file and keep only record offsets.
    Mapped,
    /// Map files whose size is at least `threshold` bytes.
    Auto { threshold: u64 },
}

impl Default for ReadMode {
    fn default() -> Self {
        Self::Auto {
            threshold: 1024 * 1024,
        }
    }
}

impl ReadMode {
    /// Whether a file of `size` bytes should be mapped.
    pub fn maps(&self, size: u64) -> bool {
        match *self {
            Self::InMemory => false,
            Self::Mapped => true,
            Self::Auto { threshold } => size >= threshold,
        }
    }

    pub(crate) fn maps_file(&self, path: &Path) -> Result<bool> {
        match self {
            Self::InMemory => Ok(false),
            Self::Mapped => Ok(true),
            Self::Auto { .. } => {
                let size = std::fs::metadata(path)
                    .map_err(|e| CorpusError::io_with_source(path, "failed to read metadata", e))?
                    .len();
                Ok(self.maps(size))
            }
        }
    }
}

/// Queue of record indices for the current epoch.
#[derive(Debug, Clone, Default)]
pub(crate) struct TraversalOrder {
    indices: Vec<usize>,
    pos: usize,
}

impl TraversalOrder {
    /// Identity order over `len` records.
    pub(crate) fn new(len: usize) -> Self {
        let mut order = Self::default();
        order.reset(len, false, 0);
        order
    }

    pub(crate) fn reset(&mut self, len: usize, shuffle: bool, seed: u64) {
        self.indices = (0..len).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            self.indices.shuffle(&mut rng);
        }
        self.pos = 0;
    }

    pub(crate) fn next_index(&mut self) -> Option<usize> {
        let index = self.indices.get(self.pos).copied()?;
        self.pos += 1;
        Some(index)
    }
}

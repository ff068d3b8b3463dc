// rust/corpus-core/src/dataset/sharding.rs

//! Corpora split across many shard files.
//!
//! A sharded corpus holds at most one shard open at a time. An epoch visits
//! every shard once, in a fixed or permuted order, and within each shard
//! every record once. When the open shard is exhausted the next one is
//! opened transparently, so consumers see a single record stream.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::storage::{discover_aligned_shards, discover_shards};

use super::parallel::ParallelCorpus;
use super::text::TextCorpus;
use super::traits::{ReadMode, RecordSource};

/// A corpus source that can be opened from a shard location.
pub trait Shard: RecordSource + Sized {
    /// What identifies one shard: a path, or an aligned tuple of paths.
    type Location: Clone + Debug;

    fn open_shard(location: &Self::Location, mode: ReadMode) -> Result<Self>;
}

impl Shard for TextCorpus {
    type Location = PathBuf;

    fn open_shard(location: &PathBuf, mode: ReadMode) -> Result<Self> {
        TextCorpus::open(location, mode)
    }
}

impl Shard for ParallelCorpus {
    type Location = Vec<PathBuf>;

    fn open_shard(location: &Vec<PathBuf>, mode: ReadMode) -> Result<Self> {
        ParallelCorpus::open(location, mode)
    }
}

/// A corpus spread over several shards of type `S`.
#[derive(Debug)]
pub struct Sharded<S: Shard> {
    shards: Vec<S::Location>,
    mode: ReadMode,
    shuffle_shards: bool,
    /// Shard visiting order for the current epoch.
    order: Vec<usize>,
    /// Position in `order` of the next shard to open.
    next_shard: usize,
    active: Option<S>,
    shuffle: bool,
    /// Draws the record-order seed of each shard opened this epoch.
    rng: StdRng,
}

/// Single-file shards selected by one pattern.
pub type ShardedText = Sharded<TextCorpus>;

/// Aligned shard tuples selected by one pattern per side.
pub type ShardedParallelText = Sharded<ParallelCorpus>;

impl ShardedText {
    /// Opens every shard matched by `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no file matches, or any error from opening the
    /// first shard.
    pub fn open(pattern: impl AsRef<Path>, mode: ReadMode, shuffle_shards: bool) -> Result<Self> {
        let shards = discover_shards(pattern)?;
        Self::from_shards(shards, mode, shuffle_shards)
    }
}

impl ShardedParallelText {
    /// Opens the aligned shard tuples matched by `patterns`.
    ///
    /// # Errors
    ///
    /// Returns `MisalignedCorpus` if the shard lists cannot be paired or a
    /// shard tuple has unequal line counts.
    pub fn open<P: AsRef<Path>>(
        patterns: &[P],
        mode: ReadMode,
        shuffle_shards: bool,
    ) -> Result<Self> {
        let shards = discover_aligned_shards(patterns)?;
        Self::from_shards(shards, mode, shuffle_shards)
    }
}

impl<S: Shard> Sharded<S> {
    /// Builds a sharded corpus over explicit shard locations.
    ///
    /// The result is reset in base order with its first shard open.
    pub fn from_shards(shards: Vec<S::Location>, mode: ReadMode, shuffle_shards: bool) -> Result<Self> {
        let mut sharded = Self {
            order: (0..shards.len()).collect(),
            shards,
            mode,
            shuffle_shards,
            next_shard: 0,
            active: None,
            shuffle: false,
            rng: StdRng::seed_from_u64(0),
        };
        sharded.reset(false, 0)?;
        Ok(sharded)
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn shards(&self) -> &[S::Location] {
        &self.shards
    }

    /// Location of the shard currently being read.
    pub fn current_shard(&self) -> Option<&S::Location> {
        if self.active.is_none() {
            return None;
        }
        self.order
            .get(self.next_shard.checked_sub(1)?)
            .map(|&index| &self.shards[index])
    }

    /// Opens the next shard of the epoch.
    ///
    /// Returns `false` once every shard has been visited.
    fn open_next_shard(&mut self) -> Result<bool> {
        self.active = None;

        let Some(&index) = self.order.get(self.next_shard) else {
            return Ok(false);
        };
        self.next_shard += 1;
        let location = &self.shards[index];

        let mut shard = S::open_shard(location, self.mode)?;
        shard.reset(self.shuffle, self.rng.gen())?;
        tracing::debug!(
            shard = ?location,
            position = self.next_shard,
            total = self.shards.len(),
            "opened shard"
        );

        self.active = Some(shard);
        Ok(true)
    }
}

impl<S: Shard> RecordSource for Sharded<S> {
    type Record = S::Record;

    /// Starts a new epoch at the first shard.
    ///
    /// The shard order is permuted only when `shuffle` is requested and
    /// shard shuffling is enabled. One generator seeded from `seed` supplies
    /// both the shard permutation and each shard's record-order seed.
    fn reset(&mut self, shuffle: bool, seed: u64) -> Result<()> {
        self.rng = StdRng::seed_from_u64(seed);
        self.order = (0..self.shards.len()).collect();
        if shuffle && self.shuffle_shards {
            self.order.shuffle(&mut self.rng);
        }

        self.shuffle = shuffle;
        self.next_shard = 0;
        self.open_next_shard()?;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<S::Record>> {
        loop {
            let Some(shard) = self.active.as_mut() else {
                return Ok(None);
            };
            if let Some(record) = shard.next_record()? {
                return Ok(Some(record));
            }
            // Exhausted shard; empty ones fall through to the next.
            if !self.open_next_shard()? {
                return Ok(None);
            }
        }
    }
}

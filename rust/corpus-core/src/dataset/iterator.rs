// rust/corpus-core/src/dataset/iterator.rs

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{CorpusError, Result};

use super::traits::RecordSource;

/// Default multiple of the batch size used as the cache size.
const DEFAULT_CACHE_BATCHES: usize = 20;

/// Configuration for the bucket iterator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    /// Maximum records per batch
    pub batch_size: usize,
    /// Records buffered before sorting and splitting into batches
    pub cache_size: usize,
    /// Shuffle records, length-sort each cache and shuffle batch order
    pub shuffle: bool,
    /// Base seed; epoch `e` uses `seed + e`. Random per epoch when unset.
    pub seed: Option<u64>,
}

impl BucketConfig {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            cache_size: batch_size.saturating_mul(DEFAULT_CACHE_BATCHES),
            shuffle: false,
            seed: None,
        }
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CorpusError::config("batch_size must be greater than 0"));
        }
        if self.cache_size == 0 {
            return Err(CorpusError::config("cache_size must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self::new(32)
    }
}

type Transform<'a, R, T> = Box<dyn FnMut(R) -> Result<T> + 'a>;
type SortKey<'a, T> = Box<dyn Fn(&T) -> usize + 'a>;
type Pack<'a, T, B> = Box<dyn FnMut(Vec<T>) -> Result<B> + 'a>;

/// Groups records of similar length into batches.
///
/// Records are pulled from the source into a cache of `cache_size` entries.
/// When shuffling, each cache is stably sorted by the sort key so that
/// records of similar length share a batch, split into runs of
/// `batch_size`, and the runs are shuffled. Without shuffling records keep
/// source order. Every batch is passed through the pack function when it
/// is yielded.
///
/// An epoch starts with [`reset`](Self::reset), or implicitly on the first
/// call to [`next_batch`](Self::next_batch).
pub struct BucketIterator<'a, S: RecordSource, T, B> {
    source: &'a mut S,
    config: BucketConfig,
    transform: Transform<'a, S::Record, T>,
    sort_key: Option<SortKey<'a, T>>,
    pack: Pack<'a, T, B>,
    /// Records of the cache window being filled. Survives a failed refill.
    cache: Vec<T>,
    pending: VecDeque<Vec<T>>,
    started: bool,
    end_of_epoch: bool,
    /// Index of the next epoch to start.
    epoch: u64,
    rng: StdRng,
}

impl<'a, S: RecordSource> BucketIterator<'a, S, S::Record, Vec<S::Record>> {
    /// Creates an iterator yielding batches of raw records.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the batch or cache size is zero.
    pub fn new(source: &'a mut S, config: BucketConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            transform: Box::new(Ok),
            sort_key: None,
            pack: Box::new(Ok),
            cache: Vec::new(),
            pending: VecDeque::new(),
            started: false,
            end_of_epoch: false,
            epoch: 0,
            rng: StdRng::seed_from_u64(0),
        })
    }
}

impl<'a, S: RecordSource, T, B> BucketIterator<'a, S, T, B> {
    /// Replaces the record transform.
    ///
    /// The sort key and pack function depend on the record type, so they are
    /// cleared; set them again after this call.
    pub fn with_transform<U: 'a>(
        self,
        transform: impl FnMut(S::Record) -> Result<U> + 'a,
    ) -> BucketIterator<'a, S, U, Vec<U>> {
        BucketIterator {
            source: self.source,
            config: self.config,
            transform: Box::new(transform),
            sort_key: None,
            pack: Box::new(Ok),
            cache: Vec::new(),
            pending: VecDeque::new(),
            started: self.started,
            end_of_epoch: self.end_of_epoch,
            epoch: self.epoch,
            rng: self.rng,
        }
    }

    /// Sets the key used to length-sort each cache when shuffling.
    pub fn with_sort_key(mut self, sort_key: impl Fn(&T) -> usize + 'a) -> Self {
        self.sort_key = Some(Box::new(sort_key));
        self
    }

    /// Replaces the function that turns a batch of records into `C`.
    pub fn with_pack<C>(
        self,
        pack: impl FnMut(Vec<T>) -> Result<C> + 'a,
    ) -> BucketIterator<'a, S, T, C> {
        BucketIterator {
            source: self.source,
            config: self.config,
            transform: self.transform,
            sort_key: self.sort_key,
            pack: Box::new(pack),
            cache: self.cache,
            pending: self.pending,
            started: self.started,
            end_of_epoch: self.end_of_epoch,
            epoch: self.epoch,
            rng: self.rng,
        }
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Index of the epoch the next [`reset`](Self::reset) will start.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Makes the next reset start epoch `epoch`, replaying its order when a
    /// seed is configured.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    pub fn is_end_of_epoch(&self) -> bool {
        self.end_of_epoch && self.pending.is_empty()
    }

    /// Starts a new epoch.
    ///
    /// Discards pending batches and resets the source. The epoch seed seeds
    /// both the source's record order and the batch shuffle.
    pub fn reset(&mut self) -> Result<()> {
        let epoch_seed = match self.config.seed {
            Some(seed) => seed.wrapping_add(self.epoch),
            None => rand::random(),
        };
        let mut rng = StdRng::seed_from_u64(epoch_seed);
        let source_seed = rng.gen();

        tracing::debug!(
            epoch = self.epoch,
            seed = epoch_seed,
            shuffle = self.config.shuffle,
            "starting epoch"
        );

        self.rng = rng;
        self.epoch += 1;
        self.cache.clear();
        self.pending.clear();
        self.end_of_epoch = false;
        self.started = true;
        self.source.reset(self.config.shuffle, source_seed)
    }

    /// Returns the next batch, or `Ok(None)` once the epoch is exhausted.
    ///
    /// After the end of an epoch this keeps returning `Ok(None)` until
    /// [`reset`](Self::reset) is called.
    pub fn next_batch(&mut self) -> Result<Option<B>> {
        if !self.started {
            self.reset()?;
        }

        loop {
            if let Some(batch) = self.pending.pop_front() {
                return (self.pack)(batch).map(Some);
            }
            if self.end_of_epoch {
                return Ok(None);
            }
            self.refill()?;
        }
    }

    /// Pulls up to one cache of records and splits it into pending batches.
    ///
    /// A source or transform error leaves the records already pulled in the
    /// cache, so the next call resumes filling the same window.
    fn refill(&mut self) -> Result<()> {
        while self.cache.len() < self.config.cache_size {
            match self.source.next_record()? {
                Some(record) => {
                    let item = (self.transform)(record)?;
                    self.cache.push(item);
                }
                None => {
                    self.end_of_epoch = true;
                    break;
                }
            }
        }
        let mut cache = std::mem::take(&mut self.cache);

        if self.config.shuffle {
            if let Some(key) = &self.sort_key {
                // Stable, so equal-length records keep their shuffled order.
                cache.sort_by_key(|record| key(record));
            }
        }

        let batch_size = self.config.batch_size;
        let num_batches = cache.len().div_ceil(batch_size);
        let mut records = cache.into_iter();
        let mut batches = Vec::with_capacity(num_batches);
        for _ in 0..num_batches {
            let batch: Vec<T> = records.by_ref().take(batch_size).collect();
            assert!(!batch.is_empty(), "bucket split produced an empty batch");
            batches.push(batch);
        }

        if self.config.shuffle {
            batches.shuffle(&mut self.rng);
        }

        tracing::trace!(
            batches = batches.len(),
            end_of_epoch = self.end_of_epoch,
            "refilled bucket cache"
        );
        self.pending.extend(batches);
        Ok(())
    }
}

impl<'a, S: RecordSource, T, B> Iterator for BucketIterator<'a, S, T, B> {
    type Item = Result<B>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// rust/corpus-core/src/dataset/mod.rs

//! Corpus readers and length-bucketed batching.
//!
//! This module turns newline-delimited text corpora into padded id batches.
//! It is organised in three layers:
//!
//! - Sources implement [`RecordSource`]: [`TextCorpus`] for one file,
//!   [`ParallelCorpus`] for aligned files, and [`ShardedText`] /
//!   [`ShardedParallelText`] for corpora split across shard files.
//! - [`BucketIterator`] buffers records from a source, groups records of
//!   similar length and yields batches.
//! - Transforms ([`binarize`], [`shared_fields`], [`separate_fields`]) and
//!   packers ([`pack_ids`], [`pack_symbols`], [`pack_fields`]) plug into the
//!   iterator to encode records and pad batches.
//!
//! # Example
//!
//! ```no_run
//! use corpus_core::dataset::{
//!     binarize, pack_ids, BucketConfig, BucketIterator, PackConfig, ReadMode, TextCorpus,
//! };
//! use corpus_core::vocab::{SymbolCounts, Vocab};
//!
//! let mut corpus = TextCorpus::open("train.txt", ReadMode::default())?;
//! let vocab = Vocab::build(&SymbolCounts::from_source(&mut corpus)?, Some(30_000), 1);
//! let pack = PackConfig::new(vocab.pad()).with_mask();
//!
//! let config = BucketConfig::new(64).with_shuffle(Some(1234));
//! let batches = BucketIterator::new(&mut corpus, config)?
//!     .with_transform(binarize(&vocab))
//!     .with_sort_key(|ids: &Vec<i64>| ids.len())
//!     .with_pack(|batch| Ok(pack_ids(&batch, &pack)));
//!
//! for batch in batches {
//!     let batch = batch?;
//!     println!("{:?}", batch.shape());
//! }
//! # Ok::<(), corpus_core::CorpusError>(())
//! ```

mod iterator;
mod pack;
mod parallel;
mod sharding;
mod text;
mod traits;
mod transform;

pub use iterator::{BucketConfig, BucketIterator};
pub use pack::{pack_fields, pack_ids, pack_symbols, PackConfig, PackedBatch};
pub use parallel::{InMemoryParallelText, MappedParallelText, ParallelCorpus};
pub use sharding::{Shard, Sharded, ShardedParallelText, ShardedText};
pub use text::{InMemoryText, MappedText, TextCorpus};
pub use traits::{ParallelRecord, ReadMode, Record, RecordSource};
pub use transform::{binarize, separate_fields, shared_fields, split_line, FieldTransform};

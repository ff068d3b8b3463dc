// rust/corpus-core/src/lib.rs

//! Bucketed text corpus pipeline - core library
//!
//! This crate turns large newline-delimited text corpora into padded batches
//! of symbol ids for sequence-model training. It provides memory-mapped and
//! in-memory corpus readers, sharded and parallel (aligned) corpora, a
//! symbol vocabulary, and a bucket iterator that groups records of similar
//! length to reduce padding.

pub mod config;
pub mod error;
pub mod storage;
pub mod vocab;

// Re-export commonly used types for convenience
pub use config::PipelineConfig;
pub use error::{CorpusError, Result};
pub use storage::{discover_aligned_shards, discover_shards, RecordIndex};
pub use vocab::{SymbolCounts, SymbolId, Vocab};

pub mod dataset;
pub use dataset::{
    BucketConfig, BucketIterator, PackConfig, PackedBatch, ParallelCorpus, ReadMode,
    RecordSource, ShardedParallelText, ShardedText, TextCorpus,
};

pub mod pipeline;
pub use pipeline::Pipeline;

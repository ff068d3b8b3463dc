// rust/corpus-core/src/storage/mod.rs

//! File access for corpus readers.
//!
//! This module provides the two filesystem primitives the corpus sources are
//! built on:
//!
//! - [`RecordIndex`]: a memory-mapped file plus the start offset of every
//!   newline-delimited record, giving O(1) random access to any record.
//! - Shard discovery: [`discover_shards`] and [`discover_aligned_shards`]
//!   enumerate the files selected by a path-prefix pattern.
//!
//! # Example
//!
//! ```no_run
//! use corpus_core::storage::{discover_shards, RecordIndex};
//!
//! for shard in discover_shards("data/train.").unwrap() {
//!     let index = RecordIndex::open(&shard).unwrap();
//!     println!("{}: {} records", shard.display(), index.record_count());
//! }
//! ```

mod index;
mod shards;

pub use index::RecordIndex;
pub use shards::{discover_aligned_shards, discover_shards};

pub(crate) use index::split_records;

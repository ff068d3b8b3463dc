// rust/corpus-core/src/pipeline.rs

//! Configured entry point for the corpus pipeline.
//!
//! [`Pipeline`] holds a validated [`PipelineConfig`] and wires corpus
//! readers, vocabulary construction and the bucket iterator together with
//! the configured read mode, batching and packing options.
//!
//! # Example
//!
//! ```no_run
//! use corpus_core::Pipeline;
//!
//! let pipeline = Pipeline::from_config_file("corpus.toml")?;
//! let mut corpus = pipeline.open_sharded("data/train.")?;
//! let vocab = pipeline.build_vocab(&mut corpus)?;
//!
//! for batch in pipeline.id_batches(&mut corpus, &vocab)? {
//!     let batch = batch?;
//!     println!("{:?}", batch.shape());
//! }
//! # Ok::<(), corpus_core::CorpusError>(())
//! ```

use std::path::Path;

use crate::config::PipelineConfig;
use crate::dataset::{
    binarize, pack_fields, pack_ids, separate_fields, split_line, BucketConfig, BucketIterator,
    FieldTransform, PackedBatch, ParallelCorpus, ParallelRecord, Record, RecordSource,
    ShardedParallelText, ShardedText, TextCorpus,
};
use crate::error::{CorpusError, Result};
use crate::vocab::{SymbolCounts, SymbolId, Vocab};

/// Batches of id sequences, one per record.
pub type IdBatches<'a, S> = BucketIterator<'a, S, Vec<SymbolId>, PackedBatch>;

/// Batches of parallel records, packed field by field.
pub type ParallelIdBatches<'a, S> = BucketIterator<'a, S, Vec<Vec<SymbolId>>, Vec<PackedBatch>>;

/// The configured pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline with default configuration.
    pub fn new() -> Result<Self> {
        Self::from_config(PipelineConfig::default())
    }

    /// Creates a pipeline from a TOML configuration file.
    ///
    /// Environment variable overrides are applied after loading the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = PipelineConfig::from_file(path)?.with_env_overrides();
        Self::from_config(config)
    }

    /// Creates a pipeline from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            batch_size = config.batching.batch_size,
            cache_size = config.batching.effective_cache_size(),
            shuffle = config.batching.shuffle,
            seed = ?config.batching.seed,
            read_mode = ?config.reader.read_mode(),
            "pipeline configured"
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Opens a single corpus file.
    pub fn open_text(&self, path: impl AsRef<Path>) -> Result<TextCorpus> {
        let corpus = TextCorpus::open(path, self.config.reader.read_mode())?;
        tracing::info!(
            path = %corpus.path().display(),
            records = corpus.len(),
            mapped = corpus.is_mapped(),
            "opened corpus"
        );
        Ok(corpus)
    }

    /// Opens the shards matched by `pattern`.
    pub fn open_sharded(&self, pattern: impl AsRef<Path>) -> Result<ShardedText> {
        let pattern = pattern.as_ref();
        let corpus = ShardedText::open(
            pattern,
            self.config.reader.read_mode(),
            self.config.batching.shuffle_shards,
        )?;
        tracing::info!(
            pattern = %pattern.display(),
            shards = corpus.num_shards(),
            "opened sharded corpus"
        );
        Ok(corpus)
    }

    /// Opens aligned files as one parallel corpus.
    pub fn open_parallel<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ParallelCorpus> {
        let corpus = ParallelCorpus::open(paths, self.config.reader.read_mode())?;
        tracing::info!(
            files = corpus.arity(),
            records = corpus.len(),
            mapped = corpus.is_mapped(),
            "opened parallel corpus"
        );
        Ok(corpus)
    }

    /// Opens aligned shard sets, one pattern per side.
    pub fn open_sharded_parallel<P: AsRef<Path>>(
        &self,
        patterns: &[P],
    ) -> Result<ShardedParallelText> {
        let corpus = ShardedParallelText::open(
            patterns,
            self.config.reader.read_mode(),
            self.config.batching.shuffle_shards,
        )?;
        tracing::info!(
            sides = patterns.len(),
            shards = corpus.num_shards(),
            "opened sharded parallel corpus"
        );
        Ok(corpus)
    }

    /// Counts the symbols of `source` and builds a vocabulary with the
    /// configured limits.
    pub fn build_vocab<S>(&self, source: &mut S) -> Result<Vocab>
    where
        S: RecordSource<Record = Record>,
    {
        let counts = SymbolCounts::from_source(source)?;
        let vocab = Vocab::from_config(&counts, &self.config.vocab);
        tracing::info!(symbols = counts.len(), size = vocab.len(), "built vocabulary");
        Ok(vocab)
    }

    /// Builds one vocabulary per field of a parallel source.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a record does not have `arity` fields.
    pub fn build_field_vocabs<S>(&self, source: &mut S, arity: usize) -> Result<Vec<Vocab>>
    where
        S: RecordSource<Record = ParallelRecord>,
    {
        let mut counts = vec![SymbolCounts::new(); arity];
        source.reset(false, 0)?;
        while let Some(record) = source.next_record()? {
            if record.len() != arity {
                return Err(CorpusError::config(format!(
                    "record has {} fields, expected {}",
                    record.len(),
                    arity
                )));
            }
            for (field, table) in record.iter().zip(counts.iter_mut()) {
                table.add_all(split_line(field));
            }
        }

        let vocabs: Vec<Vocab> = counts
            .iter()
            .map(|table| Vocab::from_config(table, &self.config.vocab))
            .collect();
        tracing::info!(
            sizes = ?vocabs.iter().map(Vocab::len).collect::<Vec<_>>(),
            "built field vocabularies"
        );
        Ok(vocabs)
    }

    /// Batches raw records with the configured batching options.
    pub fn batches<'a, S: RecordSource>(
        &self,
        source: &'a mut S,
    ) -> Result<BucketIterator<'a, S, S::Record, Vec<S::Record>>> {
        BucketIterator::new(source, self.bucket_config())
    }

    /// Encodes records with `vocab`, buckets them by length and packs each
    /// batch with the configured packing options.
    pub fn id_batches<'a, S>(&self, source: &'a mut S, vocab: &'a Vocab) -> Result<IdBatches<'a, S>>
    where
        S: RecordSource<Record = Record>,
    {
        let pack = self.config.packing.with_pad(vocab.pad());
        Ok(self
            .batches(source)?
            .with_transform(binarize(vocab))
            .with_sort_key(|ids: &Vec<SymbolId>| ids.len())
            .with_pack(move |batch| Ok(pack_ids(&batch, &pack))))
    }

    /// Encodes field `i` of every record with `vocabs[i]`, buckets records by
    /// their longest field and packs every field separately.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `vocabs` is empty. Records whose field count
    /// differs from `vocabs.len()` fail when they are read.
    pub fn parallel_id_batches<'a, S>(
        &self,
        source: &'a mut S,
        vocabs: &'a [Vocab],
    ) -> Result<ParallelIdBatches<'a, S>>
    where
        S: RecordSource<Record = ParallelRecord>,
    {
        let pad = vocabs
            .first()
            .map(Vocab::pad)
            .ok_or_else(|| CorpusError::config("at least one vocabulary is required"))?;
        let pack = self.config.packing.with_pad(pad);

        let transforms: Vec<FieldTransform<'a, Vec<SymbolId>>> = vocabs
            .iter()
            .map(|vocab| Box::new(binarize(vocab)) as FieldTransform<'a, Vec<SymbolId>>)
            .collect();

        Ok(self
            .batches(source)?
            .with_transform(separate_fields(transforms))
            .with_sort_key(|fields: &Vec<Vec<SymbolId>>| {
                fields.iter().map(Vec::len).max().unwrap_or(0)
            })
            .with_pack(move |batch| pack_fields(&batch, &pack)))
    }

    fn bucket_config(&self) -> BucketConfig {
        BucketConfig::from(&self.config.batching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchingConfig;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }

    fn pipeline(batch_size: usize, shuffle: bool) -> Pipeline {
        let mut config = PipelineConfig::default();
        config.batching = BatchingConfig {
            batch_size,
            shuffle,
            seed: Some(17),
            ..BatchingConfig::default()
        };
        config.packing.create_mask = true;
        Pipeline::from_config(config).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = PipelineConfig::default();
        config.batching.batch_size = 0;
        assert!(matches!(
            Pipeline::from_config(config),
            Err(CorpusError::Config { .. })
        ));
    }

    #[test]
    fn test_from_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.toml");
        fs::write(
            &path,
            "[reader]\nmmap_threshold = 4096\n\n[batching]\nshuffle_shards = false\n\n[vocab]\nmax_size = 100\n",
        )
        .unwrap();

        let pipeline = Pipeline::from_config_file(&path).unwrap();
        assert_eq!(pipeline.config().reader.mmap_threshold, 4096);
        assert!(!pipeline.config().batching.shuffle_shards);
        assert_eq!(pipeline.config().vocab.max_size, Some(100));
    }

    #[test]
    fn test_id_batches_end_to_end() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "train.txt", &["the cat", "a dog ran", "the", "cat sat", "dog"]);

        let pipeline = pipeline(2, false);
        let mut corpus = pipeline.open_text(&path).unwrap();
        let vocab = pipeline.build_vocab(&mut corpus).unwrap();
        assert_eq!(vocab.len(), 2 + 6);

        let batches: Vec<PackedBatch> = pipeline
            .id_batches(&mut corpus, &vocab)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].shape(), (3, 2));
        assert_eq!(
            batches[0].column(0),
            vec![vocab.encode("the"), vocab.encode("cat"), vocab.pad()]
        );
        assert_eq!(batches[2].shape(), (1, 1));

        let mask = batches[0].mask().unwrap();
        assert_eq!(mask.iter().filter(|&&m| m == 1.0).count(), 5);
    }

    #[test]
    fn test_shuffled_batches_are_reproducible() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (0..30).map(|i| "w ".repeat(i % 5 + 1)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_file(&dir, "train.txt", &refs);

        let run = || {
            let pipeline = pipeline(4, true);
            let mut corpus = pipeline.open_text(&path).unwrap();
            let vocab = pipeline.build_vocab(&mut corpus).unwrap();
            let shapes: Vec<(usize, usize)> = pipeline
                .id_batches(&mut corpus, &vocab)
                .unwrap()
                .map(|batch| batch.unwrap().shape())
                .collect();
            shapes
        };

        let first = run();
        assert_eq!(first, run());
        assert_eq!(first.iter().map(|&(_, b)| b).sum::<usize>(), 30);
    }

    #[test]
    fn test_sharded_epoch_covers_all_shards() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "part.0", &["a b", "c"]);
        write_file(&dir, "part.1", &["d", "e f g"]);
        write_file(&dir, "part.2", &["h"]);

        let pipeline = pipeline(2, true);
        let mut corpus = pipeline.open_sharded(dir.path().join("part.")).unwrap();
        let vocab = pipeline.build_vocab(&mut corpus).unwrap();
        assert_eq!(vocab.len(), 2 + 8);

        let records: usize = pipeline
            .id_batches(&mut corpus, &vocab)
            .unwrap()
            .map(|batch| batch.unwrap().batch_size())
            .sum();
        assert_eq!(records, 5);
    }

    #[test]
    fn test_parallel_id_batches() {
        let dir = TempDir::new().unwrap();
        let src = write_file(&dir, "train.en", &["hello world", "good day", "bye"]);
        let tgt = write_file(&dir, "train.de", &["hallo welt", "guten tag", "tschuss"]);

        let pipeline = pipeline(2, false);
        let mut corpus = pipeline.open_parallel(&[src, tgt]).unwrap();
        let vocabs = pipeline.build_field_vocabs(&mut corpus, 2).unwrap();
        assert_eq!(vocabs.len(), 2);

        let batches: Vec<Vec<PackedBatch>> = pipeline
            .parallel_id_batches(&mut corpus, &vocabs)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        for fields in &batches {
            assert_eq!(fields.len(), 2);
            assert_eq!(fields[0].batch_size(), fields[1].batch_size());
        }
        assert_eq!(batches[0][1].column(0), vec![
            vocabs[1].encode("hallo"),
            vocabs[1].encode("welt"),
        ]);
    }

    #[test]
    fn test_sharded_parallel_corpus() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "src.0", &["a", "b"]);
        write_file(&dir, "src.1", &["c"]);
        write_file(&dir, "tgt.0", &["x", "y"]);
        write_file(&dir, "tgt.1", &["z"]);

        let pipeline = pipeline(8, true);
        let mut corpus = pipeline
            .open_sharded_parallel(&[dir.path().join("src."), dir.path().join("tgt.")])
            .unwrap();
        let vocabs = pipeline.build_field_vocabs(&mut corpus, 2).unwrap();

        let records: usize = pipeline
            .parallel_id_batches(&mut corpus, &vocabs)
            .unwrap()
            .map(|fields| fields.unwrap()[0].batch_size())
            .sum();
        assert_eq!(records, 3);
    }

    #[test]
    fn test_parallel_requires_vocabs() {
        let dir = TempDir::new().unwrap();
        let src = write_file(&dir, "a", &["x"]);
        let pipeline = pipeline(2, false);
        let mut corpus = pipeline.open_parallel(&[src]).unwrap();

        assert!(pipeline.parallel_id_batches(&mut corpus, &[]).is_err());
    }

    #[test]
    fn test_early_drop_releases_source() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "train.txt", &["a", "b", "c", "d", "e"]);

        let pipeline = pipeline(1, false);
        let mut corpus = pipeline.open_text(&path).unwrap();
        {
            let mut batches = pipeline.batches(&mut corpus).unwrap();
            assert!(batches.next().is_some());
        }

        let batches: Vec<Vec<Record>> = pipeline
            .batches(&mut corpus)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(batches.len(), 5);
    }
}

// rust/corpus-core/src/config.rs

//! Configuration management for the corpus pipeline.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::dataset::{BucketConfig, PackConfig, ReadMode};
use crate::error::{CorpusError, Result};
use crate::vocab::SymbolId;

// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reader: ReaderConfig,
    pub batching: BatchingConfig,
    pub packing: PackingConfig,
    pub vocab: VocabConfig,
}

/// How corpus files are brought into memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Whether to memory-map large files instead of loading them eagerly.
    pub use_mmap: bool,
    // File size threshold (bytes) at or above which a file is mapped.
    pub mmap_threshold: u64,
}

/// Batch builder options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    // Number of records per batch.
    pub batch_size: usize,
    // Records pulled per cache window; defaults to `batch_size * 20`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<usize>,
    // Whether to shuffle records, bucket by length and shuffle batch order.
    pub shuffle: bool,
    // Whether sharded corpora permute their shard order each epoch.
    pub shuffle_shards: bool,
    // Optional seed for reproducible shuffling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Packing options for id batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackingConfig {
    /// Emit a 0/1 validity mask alongside the ids.
    pub create_mask: bool,
    /// Reverse every sequence before copying it into the batch.
    pub reverse: bool,
    /// Align sequences to the end of the time axis instead of the start.
    pub align_right: bool,
}

/// Vocabulary construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabConfig {
    /// Maximum number of non-sentinel symbols.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    /// Minimum frequency a symbol needs to enter the vocabulary.
    pub min_freq: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            cache_size: None,
            shuffle: false,
            shuffle_shards: true,
            seed: None,
        }
    }
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            max_size: None,
            min_freq: 1,
        }
    }
}

impl ReaderConfig {
    /// Read mode implied by this configuration.
    pub fn read_mode(&self) -> ReadMode {
        if self.use_mmap {
            ReadMode::Auto {
                threshold: self.mmap_threshold,
            }
        } else {
            ReadMode::InMemory
        }
    }
}

impl BatchingConfig {
    /// Effective cache window size.
    pub fn effective_cache_size(&self) -> usize {
        self.cache_size
            .unwrap_or(self.batch_size.saturating_mul(20))
    }
}

impl From<&BatchingConfig> for BucketConfig {
    fn from(config: &BatchingConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            cache_size: config.effective_cache_size(),
            shuffle: config.shuffle,
            seed: config.seed,
        }
    }
}

impl PackingConfig {
    /// Builds packing options around an explicit padding id.
    pub fn with_pad(&self, pad_id: SymbolId) -> PackConfig {
        PackConfig {
            pad_id,
            create_mask: self.create_mask,
            reverse: self.reverse,
            align_right: self.align_right,
        }
    }
}

impl FromStr for PipelineConfig {
    type Err = CorpusError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| CorpusError::config_with_source("failed to parse TOML config", e))
    }
}

impl PipelineConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CorpusError::io_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `CORPUS_` and use underscores
    // to separate nested fields. For example:
    // - `CORPUS_READER_USE_MMAP` overrides `reader.use_mmap`
    // - `CORPUS_BATCHING_BATCH_SIZE` overrides `batching.batch_size`
    // - `CORPUS_BATCHING_SEED` overrides `batching.seed`
    // - `CORPUS_VOCAB_MIN_FREQ` overrides `vocab.min_freq`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Reader overrides
        if let Ok(val) = std::env::var("CORPUS_READER_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.reader.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_READER_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.reader.mmap_threshold = v;
            }
        }

        // Batching overrides
        if let Ok(val) = std::env::var("CORPUS_BATCHING_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.batching.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_BATCHING_CACHE_SIZE") {
            if let Ok(v) = val.parse() {
                self.batching.cache_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("CORPUS_BATCHING_SHUFFLE") {
            if let Ok(v) = val.parse() {
                self.batching.shuffle = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_BATCHING_SHUFFLE_SHARDS") {
            if let Ok(v) = val.parse() {
                self.batching.shuffle_shards = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_BATCHING_SEED") {
            if let Ok(v) = val.parse() {
                self.batching.seed = Some(v);
            }
        }

        // Packing overrides
        if let Ok(val) = std::env::var("CORPUS_PACKING_CREATE_MASK") {
            if let Ok(v) = val.parse() {
                self.packing.create_mask = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_PACKING_REVERSE") {
            if let Ok(v) = val.parse() {
                self.packing.reverse = v;
            }
        }
        if let Ok(val) = std::env::var("CORPUS_PACKING_ALIGN_RIGHT") {
            if let Ok(v) = val.parse() {
                self.packing.align_right = v;
            }
        }

        // Vocab overrides
        if let Ok(val) = std::env::var("CORPUS_VOCAB_MAX_SIZE") {
            if let Ok(v) = val.parse() {
                self.vocab.max_size = Some(v);
            }
        }
        if let Ok(val) = std::env::var("CORPUS_VOCAB_MIN_FREQ") {
            if let Ok(v) = val.parse() {
                self.vocab.min_freq = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.batching.batch_size == 0 {
            return Err(CorpusError::config(
                "batching.batch_size must be greater than 0",
            ));
        }

        if let Some(cache_size) = self.batching.cache_size {
            if cache_size == 0 {
                return Err(CorpusError::config(
                    "batching.cache_size must be greater than 0",
                ));
            }
            if cache_size < self.batching.batch_size {
                return Err(CorpusError::config(format!(
                    "batching.cache_size ({}) must be at least batching.batch_size ({})",
                    cache_size, self.batching.batch_size
                )));
            }
        }

        if self.vocab.max_size == Some(0) {
            tracing::warn!("vocab.max_size is 0; only the reserved symbols will be kept");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();

        assert!(config.reader.use_mmap);
        assert_eq!(config.reader.mmap_threshold, 1024 * 1024);

        assert_eq!(config.batching.batch_size, 32);
        assert!(config.batching.cache_size.is_none());
        assert_eq!(config.batching.effective_cache_size(), 640);
        assert!(!config.batching.shuffle);
        assert!(config.batching.shuffle_shards);
        assert!(config.batching.seed.is_none());

        assert!(!config.packing.create_mask);
        assert!(!config.packing.reverse);
        assert!(!config.packing.align_right);

        assert!(config.vocab.max_size.is_none());
        assert_eq!(config.vocab.min_freq, 1);
    }

    #[test]
    fn test_default_validates() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_empty() {
        let config: PipelineConfig = "".parse().unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_partial() {
        let toml = r#"
            [batching]
            batch_size = 64
            shuffle = true
        "#;
        let config: PipelineConfig = toml.parse().unwrap();

        assert_eq!(config.batching.batch_size, 64);
        assert!(config.batching.shuffle);
        // Other batching fields should be defaults
        assert!(config.batching.shuffle_shards);
        assert_eq!(config.batching.effective_cache_size(), 64 * 20);
        // Other sections should be defaults
        assert!(config.reader.use_mmap);
    }

    #[test]
    fn test_from_str_full() {
        let toml = r#"
            [reader]
            use_mmap = false
            mmap_threshold = 4096

            [batching]
            batch_size = 16
            cache_size = 160
            shuffle = true
            shuffle_shards = false
            seed = 42

            [packing]
            create_mask = true
            reverse = true
            align_right = true

            [vocab]
            max_size = 30000
            min_freq = 3
        "#;

        let config: PipelineConfig = toml.parse().unwrap();

        assert!(!config.reader.use_mmap);
        assert_eq!(config.reader.mmap_threshold, 4096);
        assert_eq!(config.reader.read_mode(), ReadMode::InMemory);

        assert_eq!(config.batching.batch_size, 16);
        assert_eq!(config.batching.cache_size, Some(160));
        assert!(config.batching.shuffle);
        assert!(!config.batching.shuffle_shards);
        assert_eq!(config.batching.seed, Some(42));

        assert!(config.packing.create_mask);
        assert!(config.packing.reverse);
        assert!(config.packing.align_right);

        assert_eq!(config.vocab.max_size, Some(30000));
        assert_eq!(config.vocab.min_freq, 3);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result: std::result::Result<PipelineConfig, _> = "invalid = [".parse();
        assert!(matches!(result, Err(CorpusError::Config { .. })));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [batching]
            batch_size = 8
            "#
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.batching.batch_size, 8);
    }

    #[test]
    fn test_from_file_not_found() {
        let result = PipelineConfig::from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(CorpusError::Io { .. })));
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let mut config = PipelineConfig::default();
        config.batching.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_cache_size() {
        let mut config = PipelineConfig::default();
        config.batching.cache_size = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_cache_smaller_than_batch() {
        let mut config = PipelineConfig::default();
        config.batching.batch_size = 10;
        config.batching.cache_size = Some(5);
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cache_size"));
    }

    #[test]
    fn test_read_mode_from_reader_config() {
        let config = ReaderConfig::default();
        assert_eq!(
            config.read_mode(),
            ReadMode::Auto {
                threshold: 1024 * 1024
            }
        );
    }

    #[test]
    fn test_bucket_config_from_batching() {
        let batching = BatchingConfig {
            batch_size: 4,
            shuffle: true,
            seed: Some(7),
            ..Default::default()
        };
        let bucket = BucketConfig::from(&batching);

        assert_eq!(bucket.batch_size, 4);
        assert_eq!(bucket.cache_size, 80);
        assert!(bucket.shuffle);
        assert_eq!(bucket.seed, Some(7));
    }

    #[test]
    fn test_effective_cache_size_saturates() {
        let batching = BatchingConfig {
            batch_size: usize::MAX / 2,
            ..Default::default()
        };
        assert_eq!(batching.effective_cache_size(), usize::MAX);
    }

    #[test]
    fn test_packing_with_pad() {
        let packing = PackingConfig {
            create_mask: true,
            ..Default::default()
        };
        let pack = packing.with_pad(1);
        assert_eq!(pack.pad_id, 1);
        assert!(pack.create_mask);
        assert!(!pack.align_right);
    }

    // Helper to clear all CORPUS_ environment variables for test isolation
    fn clear_corpus_env_vars() {
        for (key, _) in std::env::vars() {
            if key.starts_with("CORPUS_") {
                std::env::remove_var(&key);
            }
        }
    }

    // Environment variable tests are combined into a single test to avoid
    // race conditions when tests run in parallel, since env vars are global state.
    #[test]
    fn test_env_overrides() {
        clear_corpus_env_vars();

        std::env::set_var("CORPUS_READER_USE_MMAP", "false");
        std::env::set_var("CORPUS_BATCHING_BATCH_SIZE", "128");
        std::env::set_var("CORPUS_BATCHING_SHUFFLE", "true");
        std::env::set_var("CORPUS_BATCHING_SEED", "12345");
        std::env::set_var("CORPUS_PACKING_CREATE_MASK", "true");
        std::env::set_var("CORPUS_VOCAB_MIN_FREQ", "2");

        let config = PipelineConfig::default().with_env_overrides();

        assert!(!config.reader.use_mmap);
        assert_eq!(config.batching.batch_size, 128);
        assert!(config.batching.shuffle);
        assert_eq!(config.batching.seed, Some(12345));
        assert!(config.packing.create_mask);
        assert_eq!(config.vocab.min_freq, 2);

        clear_corpus_env_vars();

        // Invalid values should be ignored (keep defaults)
        std::env::set_var("CORPUS_BATCHING_BATCH_SIZE", "not_a_number");

        let config = PipelineConfig::default().with_env_overrides();
        assert_eq!(config.batching.batch_size, 32);

        clear_corpus_env_vars();
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut original = PipelineConfig::default();
        original.batching.seed = Some(9);
        let toml_str = toml::to_string(&original).unwrap();
        let parsed: PipelineConfig = toml_str.parse().unwrap();

        assert_eq!(original.reader.use_mmap, parsed.reader.use_mmap);
        assert_eq!(original.batching.batch_size, parsed.batching.batch_size);
        assert_eq!(original.batching.seed, parsed.batching.seed);
        assert_eq!(original.vocab.min_freq, parsed.vocab.min_freq);
    }
}

//! Corpus batch runner
//!
//! This binary opens a text corpus, builds a vocabulary from it and runs
//! bucketed batch epochs over it, logging batch and padding statistics.
//!
//! # Usage
//!
//! ```bash
//! # One epoch over a single file
//! corpus-batches data/train.txt
//!
//! # Shuffled epochs over a sharded corpus
//! corpus-batches --sharded --shuffle --seed 1234 --epochs 3 data/train.
//!
//! # Parallel corpus with a configuration file
//! corpus-batches --config corpus.toml data/train.en data/train.de
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corpus_core::dataset::{ParallelRecord, Record};
use corpus_core::{PackedBatch, Pipeline, PipelineConfig, RecordSource, Vocab};

/// Bucketed batch runner for text corpora
#[derive(Parser, Debug)]
#[command(name = "corpus-batches")]
#[command(about = "Run bucketed batch epochs over a text corpus")]
struct Args {
    /// Corpus files, or shard prefixes with --sharded. Several values form
    /// an aligned parallel corpus.
    #[arg(required = true)]
    patterns: Vec<String>,

    /// Treat each pattern as a shard prefix
    #[arg(long)]
    sharded: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Records per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Records buffered per bucketing window
    #[arg(long)]
    cache_size: Option<usize>,

    /// Shuffle records and batch order
    #[arg(long)]
    shuffle: bool,

    /// Seed for reproducible shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Emit validity masks with each batch
    #[arg(long)]
    mask: bool,

    /// Number of epochs to run
    #[arg(short, long, default_value = "1")]
    epochs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Default)]
struct EpochStats {
    batches: usize,
    records: usize,
    tokens: usize,
    padding: usize,
}

impl EpochStats {
    fn add(&mut self, batch: &PackedBatch) {
        self.tokens += batch.lengths().iter().sum::<usize>();
        self.padding += batch.padding();
    }

    fn log(&self, epoch: u64) {
        let cells = self.tokens + self.padding;
        let padding_ratio = if cells == 0 {
            0.0
        } else {
            self.padding as f64 / cells as f64
        };
        tracing::info!(
            epoch,
            batches = self.batches,
            records = self.records,
            tokens = self.tokens,
            padding = self.padding,
            padding_ratio,
            "epoch complete"
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pipeline = Pipeline::from_config(load_config(&args)?)?;

    match (args.patterns.len(), args.sharded) {
        (1, false) => {
            let mut corpus = pipeline.open_text(&args.patterns[0])?;
            run_epochs(&pipeline, &mut corpus, args.epochs)?;
        }
        (1, true) => {
            let mut corpus = pipeline.open_sharded(&args.patterns[0])?;
            run_epochs(&pipeline, &mut corpus, args.epochs)?;
        }
        (arity, false) => {
            let mut corpus = pipeline.open_parallel(&args.patterns)?;
            run_parallel_epochs(&pipeline, &mut corpus, arity, args.epochs)?;
        }
        (arity, true) => {
            let mut corpus = pipeline.open_sharded_parallel(&args.patterns)?;
            run_parallel_epochs(&pipeline, &mut corpus, arity, args.epochs)?;
        }
    }

    Ok(())
}

/// Loads the configuration file, if any, then applies environment and
/// command-line overrides in that order.
fn load_config(args: &Args) -> corpus_core::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides();

    if let Some(batch_size) = args.batch_size {
        config.batching.batch_size = batch_size;
    }
    if args.cache_size.is_some() {
        config.batching.cache_size = args.cache_size;
    }
    if args.shuffle {
        config.batching.shuffle = true;
    }
    if args.seed.is_some() {
        config.batching.seed = args.seed;
    }
    if args.mask {
        config.packing.create_mask = true;
    }

    Ok(config)
}

fn run_epochs<S>(pipeline: &Pipeline, corpus: &mut S, epochs: u64) -> corpus_core::Result<()>
where
    S: RecordSource<Record = Record>,
{
    let vocab = pipeline.build_vocab(corpus)?;
    let mut batches = pipeline.id_batches(corpus, &vocab)?;

    for epoch in 0..epochs {
        if epoch > 0 {
            batches.reset()?;
        }

        let mut stats = EpochStats::default();
        while let Some(batch) = batches.next_batch()? {
            stats.batches += 1;
            stats.records += batch.batch_size();
            stats.add(&batch);
        }
        stats.log(epoch);
    }

    Ok(())
}

fn run_parallel_epochs<S>(
    pipeline: &Pipeline,
    corpus: &mut S,
    arity: usize,
    epochs: u64,
) -> corpus_core::Result<()>
where
    S: RecordSource<Record = ParallelRecord>,
{
    let vocabs: Vec<Vocab> = pipeline.build_field_vocabs(corpus, arity)?;
    let mut batches = pipeline.parallel_id_batches(corpus, &vocabs)?;

    for epoch in 0..epochs {
        if epoch > 0 {
            batches.reset()?;
        }

        let mut stats = EpochStats::default();
        while let Some(fields) = batches.next_batch()? {
            stats.batches += 1;
            stats.records += fields.first().map_or(0, PackedBatch::batch_size);
            for field in &fields {
                stats.add(field);
            }
        }
        stats.log(epoch);
    }

    Ok(())
}

// rust/corpus-core/src/vocab.rs

//! Symbol vocabulary with reserved padding and unknown ids.
//!
//! A [`Vocab`] is built once from a [`SymbolCounts`] table and is immutable
//! afterwards. Ids are dense and contiguous; `<unk>` is always id 0 and
//! `<pad>` is always id 1.

use std::collections::HashMap;

use crate::config::VocabConfig;
use crate::dataset::RecordSource;
use crate::error::{CorpusError, Result};

/// Integer id of a vocabulary symbol.
pub type SymbolId = i64;

/// Symbol reserved for out-of-vocabulary input.
pub const UNK_SYMBOL: &str = "<unk>";
/// Symbol reserved for padding positions.
pub const PAD_SYMBOL: &str = "<pad>";

const UNK_ID: SymbolId = 0;
const PAD_ID: SymbolId = 1;

/// Insertion-ordered symbol frequency table.
#[derive(Debug, Clone, Default)]
pub struct SymbolCounts {
    entries: Vec<(String, u64)>,
    positions: HashMap<String, usize>,
}

impl SymbolCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of `symbol`.
    pub fn add(&mut self, symbol: &str) {
        self.add_count(symbol, 1);
    }

    /// Adds `count` occurrences of `symbol`.
    pub fn add_count(&mut self, symbol: &str, count: u64) {
        match self.positions.get(symbol) {
            Some(&pos) => self.entries[pos].1 += count,
            None => {
                self.positions.insert(symbol.to_string(), self.entries.len());
                self.entries.push((symbol.to_string(), count));
            }
        }
    }

    /// Adds one occurrence of every symbol in `symbols`.
    pub fn add_all<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for symbol in symbols {
            self.add(symbol.as_ref());
        }
    }

    /// Counts the whitespace-separated symbols of every record in `source`.
    ///
    /// The source is reset in on-disk order and left exhausted.
    pub fn from_source<S>(source: &mut S) -> Result<Self>
    where
        S: RecordSource<Record = Vec<u8>>,
    {
        let mut counts = Self::new();
        source.reset(false, 0)?;
        while let Some(record) = source.next_record()? {
            counts.add_all(crate::dataset::split_line(&record));
        }
        tracing::debug!(symbols = counts.len(), "counted corpus symbols");
        Ok(counts)
    }

    pub fn get(&self, symbol: &str) -> u64 {
        self.positions
            .get(symbol)
            .map(|&pos| self.entries[pos].1)
            .unwrap_or(0)
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by descending count; ties keep first-seen order.
    pub fn most_common(&self) -> Vec<(&str, u64)> {
        let mut sorted: Vec<(&str, u64)> = self
            .entries
            .iter()
            .map(|(symbol, count)| (symbol.as_str(), *count))
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted
    }
}

/// Maps symbols to ids and back.
#[derive(Debug, Clone)]
pub struct Vocab {
    id_to_sym: Vec<String>,
    sym_to_id: HashMap<String, SymbolId>,
}

impl Vocab {
    /// Builds a vocabulary from symbol frequencies.
    ///
    /// Symbols are added in descending-frequency order until `max_size`
    /// non-reserved entries exist or a symbol falls below `min_freq`.
    pub fn build(counts: &SymbolCounts, max_size: Option<usize>, min_freq: u64) -> Self {
        let mut vocab = Self {
            id_to_sym: Vec::new(),
            sym_to_id: HashMap::new(),
        };
        vocab.push(UNK_SYMBOL);
        vocab.push(PAD_SYMBOL);

        let limit = max_size.unwrap_or(usize::MAX);
        let mut added = 0;
        for (symbol, freq) in counts.most_common() {
            if added >= limit || freq < min_freq {
                break;
            }
            if vocab.sym_to_id.contains_key(symbol) {
                continue;
            }
            vocab.push(symbol);
            added += 1;
        }

        tracing::debug!(size = vocab.len(), "built vocabulary");
        vocab
    }

    /// Builds a vocabulary using the limits in `config`.
    pub fn from_config(counts: &SymbolCounts, config: &VocabConfig) -> Self {
        Self::build(counts, config.max_size, config.min_freq)
    }

    fn push(&mut self, symbol: &str) {
        let id = self.id_to_sym.len() as SymbolId;
        self.id_to_sym.push(symbol.to_string());
        self.sym_to_id.insert(symbol.to_string(), id);
    }

    pub fn unk(&self) -> SymbolId {
        UNK_ID
    }

    pub fn pad(&self) -> SymbolId {
        PAD_ID
    }

    /// Returns the id of `symbol`, or the unknown id.
    pub fn encode(&self, symbol: &str) -> SymbolId {
        self.sym_to_id.get(symbol).copied().unwrap_or(UNK_ID)
    }

    pub fn encode_all<I, S>(&self, symbols: I) -> Vec<SymbolId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        symbols
            .into_iter()
            .map(|symbol| self.encode(symbol.as_ref()))
            .collect()
    }

    /// Returns the symbol for `id`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when `id` is negative or not below `len()`.
    pub fn decode(&self, id: SymbolId) -> Result<&str> {
        if id < 0 || id as usize >= self.id_to_sym.len() {
            return Err(CorpusError::out_of_range("vocabulary", id, self.len()));
        }
        Ok(&self.id_to_sym[id as usize])
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.sym_to_id.contains_key(symbol)
    }

    /// Total number of ids, reserved symbols included.
    pub fn len(&self) -> usize {
        self.id_to_sym.len()
    }

    /// Always false: the reserved symbols are present in every vocabulary.
    pub fn is_empty(&self) -> bool {
        self.id_to_sym.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &str)> {
        self.id_to_sym
            .iter()
            .enumerate()
            .map(|(id, symbol)| (id as SymbolId, symbol.as_str()))
    }
}

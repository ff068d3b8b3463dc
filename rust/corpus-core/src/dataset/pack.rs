// rust/corpus-core/src/dataset/pack.rs

//! Padding variable-length id sequences into dense batches.
//!
//! A packed batch is time-major: row `t` holds position `t` of every
//! sequence, and column `b` holds sequence `b`. Positions past the end of a
//! shorter sequence are filled with the pad id.

use crate::config::PackingConfig;
use crate::error::{CorpusError, Result};
use crate::vocab::{SymbolId, Vocab};

/// How sequences are laid out in a packed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackConfig {
    pub pad_id: SymbolId,
    /// Emit a mask marking real (1.0) and padded (0.0) positions.
    pub create_mask: bool,
    /// Write each sequence back to front.
    pub reverse: bool,
    /// Place sequences at the end of their column.
    pub align_right: bool,
}

impl PackConfig {
    pub fn new(pad_id: SymbolId) -> Self {
        Self {
            pad_id,
            create_mask: false,
            reverse: false,
            align_right: false,
        }
    }

    pub fn with_mask(mut self) -> Self {
        self.create_mask = true;
        self
    }
}

/// A dense `(max_len, batch_size)` block of symbol ids.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBatch {
    /// Row-major ids; row `t` is position `t` of every sequence.
    data: Vec<SymbolId>,
    mask: Option<Vec<f32>>,
    lengths: Vec<usize>,
    max_len: usize,
}

impl PackedBatch {
    /// `(max_len, batch_size)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.max_len, self.batch_size())
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn data(&self) -> &[SymbolId] {
        &self.data
    }

    pub fn mask(&self) -> Option<&[f32]> {
        self.mask.as_deref()
    }

    /// Unpadded length of every sequence, in column order.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// The id at position `t` of sequence `b`.
    pub fn get(&self, t: usize, b: usize) -> Option<SymbolId> {
        if t >= self.max_len || b >= self.batch_size() {
            return None;
        }
        Some(self.data[t * self.batch_size() + b])
    }

    /// Column `b`, padding included.
    pub fn column(&self, b: usize) -> Vec<SymbolId> {
        (0..self.max_len).filter_map(|t| self.get(t, b)).collect()
    }

    /// Number of padded positions.
    pub fn padding(&self) -> usize {
        self.data.len() - self.lengths.iter().sum::<usize>()
    }

    pub fn into_parts(self) -> (Vec<SymbolId>, Option<Vec<f32>>) {
        (self.data, self.mask)
    }
}

/// Packs id sequences into one padded batch.
pub fn pack_ids<S: AsRef<[SymbolId]>>(batch: &[S], config: &PackConfig) -> PackedBatch {
    let batch_size = batch.len();
    let lengths: Vec<usize> = batch.iter().map(|seq| seq.as_ref().len()).collect();
    let max_len = lengths.iter().copied().max().unwrap_or(0);

    let mut data = vec![config.pad_id; max_len * batch_size];
    let mut mask = config.create_mask.then(|| vec![0.0; max_len * batch_size]);

    for (b, seq) in batch.iter().enumerate() {
        let seq = seq.as_ref();
        let offset = if config.align_right {
            max_len - seq.len()
        } else {
            0
        };

        for i in 0..seq.len() {
            let id = if config.reverse {
                seq[seq.len() - 1 - i]
            } else {
                seq[i]
            };
            let cell = (offset + i) * batch_size + b;
            data[cell] = id;
            if let Some(mask) = mask.as_mut() {
                mask[cell] = 1.0;
            }
        }
    }

    PackedBatch {
        data,
        mask,
        lengths,
        max_len,
    }
}

/// Encodes symbol sequences with `vocab` and packs them, padding with the
/// vocabulary's pad id.
pub fn pack_symbols<S: AsRef<str>>(
    batch: &[Vec<S>],
    vocab: &Vocab,
    config: &PackingConfig,
) -> PackedBatch {
    let encoded: Vec<Vec<SymbolId>> = batch
        .iter()
        .map(|symbols| vocab.encode_all(symbols))
        .collect();
    pack_ids(&encoded, &config.with_pad(vocab.pad()))
}

/// Packs each field of multi-field records into its own batch.
///
/// # Errors
///
/// Returns `Config` if the records do not all have the same number of fields.
pub fn pack_fields(batch: &[Vec<Vec<SymbolId>>], config: &PackConfig) -> Result<Vec<PackedBatch>> {
    let Some(first) = batch.first() else {
        return Ok(Vec::new());
    };
    let arity = first.len();

    if let Some(record) = batch.iter().find(|record| record.len() != arity) {
        return Err(CorpusError::config(format!(
            "record has {} fields, expected {}",
            record.len(),
            arity
        )));
    }

    Ok((0..arity)
        .map(|field| {
            let column: Vec<&[SymbolId]> =
                batch.iter().map(|record| record[field].as_slice()).collect();
            pack_ids(&column, config)
        })
        .collect())
}

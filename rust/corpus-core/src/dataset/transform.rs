// rust/corpus-core/src/dataset/transform.rs

//! Record transforms applied before bucketing.

use crate::error::{CorpusError, Result};
use crate::vocab::{SymbolId, Vocab};

use super::traits::{ParallelRecord, Record};

/// A boxed per-field transform.
pub type FieldTransform<'a, T> = Box<dyn FnMut(Record) -> Result<T> + 'a>;

/// Splits a record into whitespace-separated symbols.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub fn split_line(record: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(record)
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Returns a transform that splits a record and encodes it with `vocab`.
pub fn binarize(vocab: &Vocab) -> impl Fn(Record) -> Result<Vec<SymbolId>> + '_ {
    move |record| Ok(vocab.encode_all(split_line(&record)))
}

/// Applies the same transform to every field of a parallel record.
pub fn shared_fields<T, F>(mut transform: F) -> impl FnMut(ParallelRecord) -> Result<Vec<T>>
where
    F: FnMut(Record) -> Result<T>,
{
    move |record| record.into_iter().map(&mut transform).collect()
}

/// Applies `transforms[i]` to field `i` of a parallel record.
///
/// The returned transform fails with `Config` on records whose field count
/// differs from the number of transforms.
pub fn separate_fields<'a, T>(
    mut transforms: Vec<FieldTransform<'a, T>>,
) -> impl FnMut(ParallelRecord) -> Result<Vec<T>> + 'a
where
    T: 'a,
{
    move |record| {
        if record.len() != transforms.len() {
            return Err(CorpusError::config(format!(
                "record has {} fields but {} transforms were given",
                record.len(),
                transforms.len()
            )));
        }
        record
            .into_iter()
            .zip(transforms.iter_mut())
            .map(|(field, transform)| transform(field))
            .collect()
    }
}

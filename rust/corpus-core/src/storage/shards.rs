// rust/corpus-core/src/storage/shards.rs

//! Shard discovery by path prefix.
//!
//! A shard pattern such as `data/train.en.` selects every regular file in
//! `data/` whose name starts with `train.en.`. A pattern ending in a path
//! separator selects every file in that directory. Results are sorted so the
//! shard set has a stable base order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CorpusError, Result};

/// Lists the shard files selected by `pattern`.
///
/// # Errors
///
/// Returns an `Io` error if the directory cannot be read and a `Config`
/// error if no file matches.
pub fn discover_shards(pattern: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let (_, shards) = discover(pattern.as_ref())?;
    Ok(shards)
}

/// Lists aligned shard tuples for several patterns.
///
/// Shard `k` of every pattern is paired positionally. The lists must have the
/// same length and each tuple must share the file-name suffix that follows
/// its pattern's prefix (`train.en.003` pairs with `train.de.003`).
///
/// # Errors
///
/// Returns `MisalignedCorpus` if the shard lists cannot be paired.
pub fn discover_aligned_shards<P: AsRef<Path>>(patterns: &[P]) -> Result<Vec<Vec<PathBuf>>> {
    if patterns.is_empty() {
        return Err(CorpusError::config("at least one shard pattern is required"));
    }

    let mut listings = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        listings.push(discover(pattern.as_ref())?);
    }

    let shard_count = listings[0].1.len();
    for (pattern, (_, shards)) in patterns.iter().zip(&listings) {
        if shards.len() != shard_count {
            return Err(CorpusError::misaligned(format!(
                "pattern '{}' matches {} shards, expected {}",
                pattern.as_ref().display(),
                shards.len(),
                shard_count
            )));
        }
    }

    let mut tuples = Vec::with_capacity(shard_count);
    for k in 0..shard_count {
        let (first_prefix, first_shards) = &listings[0];
        let expected = shard_suffix(&first_shards[k], first_prefix);

        let mut tuple = Vec::with_capacity(listings.len());
        for (prefix, shards) in &listings {
            let suffix = shard_suffix(&shards[k], prefix);
            if suffix != expected {
                return Err(CorpusError::misaligned(format!(
                    "shard '{}' does not correspond to '{}'",
                    shards[k].display(),
                    first_shards[k].display()
                )));
            }
            tuple.push(shards[k].clone());
        }
        tuples.push(tuple);
    }

    Ok(tuples)
}

fn discover(pattern: &Path) -> Result<(String, Vec<PathBuf>)> {
    let (dir, prefix) = split_pattern(pattern);

    let mut shards = Vec::new();
    for entry in fs::read_dir(&dir)
        .map_err(|e| CorpusError::io_with_source(&dir, "failed to read directory", e))?
    {
        let entry = entry.map_err(|e| {
            CorpusError::io_with_source(&dir, "failed to read directory entry", e)
        })?;

        let path = entry.path();
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&prefix));
        if matches && path.is_file() {
            shards.push(path);
        }
    }

    if shards.is_empty() {
        return Err(CorpusError::config(format!(
            "no shard files match pattern '{}'",
            pattern.display()
        )));
    }

    shards.sort();
    tracing::debug!(
        pattern = %pattern.display(),
        shards = shards.len(),
        "discovered shards"
    );
    Ok((prefix, shards))
}

/// Splits a pattern into the directory to list and the file-name prefix.
fn split_pattern(pattern: &Path) -> (PathBuf, String) {
    let raw = pattern.to_string_lossy();
    if raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) {
        return (pattern.to_path_buf(), String::new());
    }

    let prefix = pattern
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = match pattern.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (dir, prefix)
}

fn shard_suffix<'a>(path: &'a Path, prefix: &str) -> &'a str {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(prefix))
        .unwrap_or("")
}

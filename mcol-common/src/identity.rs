//! # Metric Identity
//!
//! Derive a `MetricId` from `(namespace, name, tags)`.
//!
//! Each string is hashed with djb2 (seed 5381, `hash * 33 + byte`, wrapping at
//! 32 bits) and the hashes are XOR-combined, so any permutation of the tags
//! yields the same id. The id is only 32 bits wide: two different metrics can
//! collide, and the registry treats a collision exactly like a duplicate.

use crate::error::{CollectorError, CollectorResult};
use crate::types::MetricId;

const DJB2_SEED: u32 = 5381;

/// djb2 hash over raw bytes.
#[inline]
pub fn djb2(data: &[u8]) -> u32 {
    data.iter().fold(DJB2_SEED, |hash, &byte| {
        hash.wrapping_mul(33).wrapping_add(byte as u32)
    })
}

/// Computes the metric id for a namespace, name, and tag set.
///
/// # Errors
/// Returns `CollectorError::InvalidName` if `namespace` or `name` is empty.
pub fn metric_id<I, S>(namespace: &str, name: &str, tags: I) -> CollectorResult<MetricId>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if namespace.is_empty() || name.is_empty() {
        return Err(CollectorError::InvalidName);
    }

    let id = tags
        .into_iter()
        .fold(djb2(namespace.as_bytes()) ^ djb2(name.as_bytes()), |acc, tag| {
            acc ^ djb2(tag.as_ref().as_bytes())
        });
    Ok(MetricId(id))
}

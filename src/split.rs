//! Remainder-fair partition of one submitter's records across several managers.
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("split count must be positive, got {0}")]
    InvalidCount(i64),
    #[error("split index {index} out of range for {count} slices")]
    IndexOutOfRange { index: i64, count: i64 },
}

/// Return the contiguous slice owned by `split_index` out of `split_count`
/// owners. The first `len % split_count` owners get one extra item, so slice
/// lengths never differ by more than one and concatenating all slices in index
/// order reproduces `items`.
pub fn split<T>(items: &[T], split_index: i64, split_count: i64) -> Result<&[T], SplitError> {
    if split_count <= 0 {
        return Err(SplitError::InvalidCount(split_count));
    }
    if split_index < 0 || split_index >= split_count {
        return Err(SplitError::IndexOutOfRange {
            index: split_index,
            count: split_count,
        });
    }

    let index = split_index as usize;
    let count = split_count as usize;
    let base = items.len() / count;
    let remainder = items.len() % count;

    let start = index * base + index.min(remainder);
    let end = start + base + usize::from(index < remainder);
    Ok(&items[start..end])
}

/// Every slice for `split_count` owners, in owner order.
pub fn split_all<T>(items: &[T], split_count: i64) -> Result<Vec<&[T]>, SplitError> {
    if split_count <= 0 {
        return Err(SplitError::InvalidCount(split_count));
    }
    (0..split_count).map(|i| split(items, i, split_count)).collect()
}

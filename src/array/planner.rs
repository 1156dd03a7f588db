use crate::error::{ClusterError, Result};
use std::ops::Range;

/// Splits `[0, total_size)` into at most `parts` contiguous ranges.
///
/// Part `i` gets `total_size / parts` elements, plus one more while
/// `i < total_size % parts`. Empty parts are left out, so fewer than `parts`
/// ranges come back when `total_size < parts`.
///
/// The coordinator uses this to cut arrays into segments (one part per live
/// worker) and the compute engine uses it to cut a segment into chunks.
pub fn plan_segments(total_size: usize, parts: usize) -> Result<Vec<Range<usize>>> {
    if parts == 0 {
        return Err(ClusterError::InvalidInput(
            "segment planning needs at least one part".to_string(),
        ));
    }

    let base = total_size / parts;
    let remainder = total_size % parts;

    let mut ranges = Vec::with_capacity(parts.min(total_size));
    let mut start = 0;
    for i in 0..parts {
        let size = base + usize::from(i < remainder);
        if size == 0 {
            continue;
        }
        ranges.push(start..start + size);
        start += size;
    }

    Ok(ranges)
}

//! Fragment resolution
//!
//! Maps merged frame intervals to storage-level offsets for one stream. All
//! boundary frames of all intervals go through a single batched lookup; the
//! response is verified against the request before pairing, so a reordering
//! or dropping index service surfaces as an error instead of misaligned
//! fragments.

use crate::error::{QueryError, QueryResult};
use crate::services::fragments::Interval;
use crate::services::index::VectorIndex;

/// Storage byte range for one merged interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRange {
    pub start: u64,
    pub end: u64,
}

/// Clamp an interval to the stream's valid frame ids.
///
/// The interval must intersect `[0, max_valid_index]`; merged intervals always
/// do because their hits come from the stream's own collection. A disjoint
/// interval would clamp to an inverted range.
pub fn clamp_interval(interval: Interval, max_valid_index: i64) -> Interval {
    let clamped = Interval {
        start: interval.start.max(0),
        end: interval.end.min(max_valid_index),
    };
    debug_assert!(
        clamped.start <= clamped.end,
        "interval ({}, {}) lies outside [0, {}]",
        interval.start,
        interval.end,
        max_valid_index
    );
    clamped
}

/// Resolve merged intervals to storage offsets, preserving interval order.
///
/// One lookup round trip per stream: the boundary frames of every interval are
/// clamped and batched into a single `get_offsets` call.
pub async fn resolve_offsets(
    index: &dyn VectorIndex,
    stream_id: &str,
    intervals: &[Interval],
    max_valid_index: i64,
) -> QueryResult<Vec<OffsetRange>> {
    if intervals.is_empty() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::with_capacity(intervals.len() * 2);
    for interval in intervals {
        let clamped = clamp_interval(*interval, max_valid_index);
        ids.push(clamped.start);
        ids.push(clamped.end);
    }

    let entries = index.get_offsets(stream_id, &ids).await?;

    if entries.len() != ids.len() {
        return Err(QueryError::lookup(
            stream_id,
            format!(
                "requested {} boundary frames, lookup returned {}",
                ids.len(),
                entries.len()
            ),
        ));
    }
    for (requested, entry) in ids.iter().zip(entries.iter()) {
        if entry.frame != *requested {
            return Err(QueryError::lookup(
                stream_id,
                format!(
                    "lookup out of order: requested frame {}, got {}",
                    requested, entry.frame
                ),
            ));
        }
    }

    Ok(entries
        .chunks_exact(2)
        .map(|pair| OffsetRange {
            start: pair[0].offset,
            end: pair[1].offset,
        })
        .collect())
}

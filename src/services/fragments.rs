//! Interval merging
//!
//! Turns threshold-filtered per-frame hits into the minimal set of contiguous
//! frame ranges. Pure geometry: clamping to valid storage bounds happens later
//! in the resolver.

use serde::Serialize;

/// Inclusive frame range, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

/// Merge per-frame hits into intervals.
///
/// Hits scoring below `threshold` are dropped, each survivor is padded to
/// `[frame - pad, frame + pad]`, and overlapping or touching padded intervals
/// are merged in one sweep over the sorted starts. Starts may be negative
/// here; the resolver clamps them.
pub fn merge_intervals(hits: &[(i64, f32)], threshold: f32, pad: i64) -> Vec<Interval> {
    let mut padded: Vec<Interval> = hits
        .iter()
        .filter(|(_, score)| *score >= threshold)
        .map(|(frame, _)| Interval {
            start: frame - pad,
            end: frame + pad,
        })
        .collect();

    padded.sort_by_key(|interval| interval.start);

    let mut merged: Vec<Interval> = Vec::new();
    for interval in padded {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }

    merged
}

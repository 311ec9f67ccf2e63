//! Candidate ranking
//!
//! The global collection returns per-frame hits, so the same stream usually
//! appears many times. Ranking keeps the best score per distinct stream and
//! cuts to the top k.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::services::index::SearchHit;

/// Deduplicate per-frame hits by stream, keeping the maximum score per
/// stream, then return the top `k` stream ids by descending score. Ties keep
/// first-seen order.
pub fn rank_candidates(hits: &[SearchHit], k: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<&str, f32> = HashMap::new();

    for hit in hits {
        match best.get_mut(hit.stream.as_str()) {
            Some(score) => {
                if hit.score > *score {
                    *score = hit.score;
                }
            }
            None => {
                best.insert(hit.stream.as_str(), hit.score);
                order.push(hit.stream.clone());
            }
        }
    }

    let mut ranked: Vec<(String, f32)> = order
        .into_iter()
        .map(|stream| {
            let score = best[stream.as_str()];
            (stream, score)
        })
        .collect();

    // Stable sort keeps first-seen order for equal scores
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k);
    ranked.into_iter().map(|(stream, _)| stream).collect()
}

//! Reciprocal Rank Fusion

use std::collections::HashMap;

/// Standard RRF constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Fuse ranked id lists: `score(id) = Σ 1 / (k + rank)` with 1-based ranks.
///
/// Best first; ties keep the order in which ids were first seen. An id
/// repeated within one list only counts at its best rank.
pub fn reciprocal_rank_fusion(lists: &[Vec<String>], k: f64) -> Vec<(String, f64)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut fused: Vec<(String, f64)> = Vec::new();

    for list in lists {
        let mut seen_in_list = std::collections::HashSet::new();
        for (rank, id) in list.iter().enumerate() {
            if !seen_in_list.insert(id.as_str()) {
                continue;
            }
            let contribution = 1.0 / (k + (rank + 1) as f64);
            match positions.get(id.as_str()) {
                Some(&pos) => fused[pos].1 += contribution,
                None => {
                    positions.insert(id.as_str(), fused.len());
                    fused.push((id.clone(), contribution));
                }
            }
        }
    }

    // stable sort keeps first-seen order for equal scores
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

//! Top-k candidate selection.
//!
//! Each step selects `k` candidates out of `beam slots x vocabulary` joint
//! scores. Vocabularies are tens of thousands of entries, so a full sort per
//! step is too slow. Selection partitions with `select_nth_unstable_by`
//! (expected linear time) and then sorts only the `k` survivors, so callers
//! get the best candidate first.

use std::cmp::Ordering;

/// A selected candidate in a flattened score slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Flat index: `row * vocabulary_size + column`.
    pub index: usize,
    /// Joint score at that index.
    pub score: f32,
}

impl Candidate {
    /// Row (beam slot) of the candidate.
    pub fn row(&self, vocabulary_size: usize) -> usize {
        self.index / vocabulary_size
    }

    /// Column (word) of the candidate.
    pub fn column(&self, vocabulary_size: usize) -> usize {
        self.index % vocabulary_size
    }
}

// NaN ranks below every number.
fn rank(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

/// Return the `k` best entries of `scores`, best first.
///
/// Ties are broken by lower index. If `k` exceeds the number of entries,
/// every entry is returned.
pub fn top_k(scores: &[f32], k: usize) -> Vec<Candidate> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }

    let best_first = |a: &usize, b: &usize| -> Ordering {
        rank(scores[*b])
            .total_cmp(&rank(scores[*a]))
            .then(a.cmp(b))
    };

    let mut keys: Vec<usize> = (0..scores.len()).collect();
    if k < keys.len() {
        keys.select_nth_unstable_by(k - 1, best_first);
        keys.truncate(k);
    }
    keys.sort_unstable_by(best_first);

    keys.into_iter()
        .map(|index| Candidate {
            index,
            score: scores[index],
        })
        .collect()
}

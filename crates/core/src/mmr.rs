//! Similarity helpers for retrieval.

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Maximal marginal relevance selection.
///
/// Returns indices into `candidates` in selection order. The first pick is the
/// candidate closest to `query`; each later pick maximizes
/// `lambda * sim(query, c) - (1 - lambda) * max(sim(c, already picked))`.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[Vec<f32>],
    lambda: f32,
    k: usize,
) -> Vec<usize> {
    let target = k.min(candidates.len());
    if target == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();

    let mut first = 0;
    for (index, score) in relevance.iter().enumerate() {
        if *score > relevance[first] {
            first = index;
        }
    }

    let mut selected = vec![first];
    // Highest similarity of each candidate to anything selected so far.
    let mut redundancy: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(candidate, &candidates[first]))
        .collect();

    while selected.len() < target {
        let mut best: Option<(usize, f32)> = None;
        for (index, query_score) in relevance.iter().enumerate() {
            if selected.contains(&index) {
                continue;
            }
            let score = lambda * query_score - (1.0 - lambda) * redundancy[index];
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }

        let Some((pick, _)) = best else {
            break;
        };
        selected.push(pick);
        for (index, candidate) in candidates.iter().enumerate() {
            let similarity = cosine_similarity(candidate, &candidates[pick]);
            if similarity > redundancy[index] {
                redundancy[index] = similarity;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pure_relevance_orders_by_similarity() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.9, 0.1]];
        assert_eq!(
            maximal_marginal_relevance(&query, &candidates, 1.0, 3),
            vec![1, 2, 0]
        );
    }

    #[test]
    fn low_lambda_skips_near_duplicates() {
        let query = vec![1.0, 0.2];
        let candidates = vec![
            vec![1.0, 0.2],
            vec![1.0, 0.21],
            vec![0.3, 1.0],
        ];

        assert_eq!(
            maximal_marginal_relevance(&query, &candidates, 1.0, 2),
            vec![0, 1]
        );
        assert_eq!(
            maximal_marginal_relevance(&query, &candidates, 0.3, 2),
            vec![0, 2]
        );
    }

    #[test]
    fn selection_is_capped_by_candidates() {
        let candidates = vec![vec![1.0, 0.0]];
        assert_eq!(
            maximal_marginal_relevance(&[1.0, 0.0], &candidates, 0.5, 10),
            vec![0]
        );
        assert!(maximal_marginal_relevance(&[1.0, 0.0], &[], 0.5, 10).is_empty());
        assert!(maximal_marginal_relevance(&[1.0, 0.0], &candidates, 0.5, 0).is_empty());
    }
}

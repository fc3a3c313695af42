//! Similarity scoring: Levenshtein ratio, hybrid composite, shared tokens.

use std::collections::HashSet;

use crate::lang::tokenizer::{tokenize, TokenizationMode};

/// Default Jaccard share of the hybrid score.
pub const DEFAULT_JACCARD_WEIGHT: f64 = 0.4;

/// Edit distance between two strings, by character.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row dynamic programming.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Levenshtein similarity ratio in `[0, 100]`:
/// `100 * (1 - distance / max(len_a, len_b))`. Two empty strings score 100.
pub fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100.0;
    }
    100.0 * (1.0 - edit_distance(a, b) as f64 / max_len as f64)
}

/// Combine Jaccard (0..1) and Levenshtein (0..100) into one 0..100 score.
///
/// `jaccard_weight` controls the balance: 0.0 is pure Levenshtein, 1.0 is
/// pure Jaccard.
pub fn hybrid_score(jaccard: f64, levenshtein: f64, jaccard_weight: f64) -> f64 {
    100.0 * (jaccard_weight * jaccard + (1.0 - jaccard_weight) * levenshtein / 100.0)
}

/// Count of distinct normalized tokens present in both snippets.
pub fn shared_tokens(code_a: &str, code_b: &str) -> usize {
    let tokens_a: HashSet<String> =
        tokenize(code_a, TokenizationMode::Generalize).into_iter().collect();
    let tokens_b: HashSet<String> =
        tokenize(code_b, TokenizationMode::Generalize).into_iter().collect();
    tokens_a.intersection(&tokens_b).count()
}

/// Full pairwise comparison between two stored snippets.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComparisonReport {
    /// MinHash-estimated Jaccard similarity, 0..1
    pub jaccard: f64,
    /// Levenshtein ratio over the raw code, 0..100
    pub levenshtein: f64,
    /// Weighted composite, 0..100
    pub hybrid: f64,
    /// Approximate control-flow similarity, 0..1
    pub cfg_similarity: f64,
    /// Distinct normalized tokens present in both snippets
    pub shared_tokens: usize,
}

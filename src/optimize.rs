//! Hyperparameter re-estimation.

use crate::corpus::Document;
use crate::math::digamma;

/// Inner fixed-point rounds per optimization pass.
const ROUNDS: usize = 10;

/// Positivity floor for every concentration parameter.
const ALPHA_FLOOR: f64 = 1e-5;

/// Re-estimate the per-topic Dirichlet concentrations in place with
/// Minka's fixed-point update:
///
/// `alpha_k <- alpha_k * sum_d [ψ(n_dk + alpha_k) - ψ(alpha_k)]
///                     / sum_d [ψ(n_d + alpha_sum) - ψ(alpha_sum)]`
///
/// Reads only the document-level statistics; the topic-word table is
/// untouched.
pub(crate) fn optimize_alpha(alpha: &mut [f64], docs: &[Document]) {
    if docs.is_empty() {
        return;
    }
    for _ in 0..ROUNDS {
        let alpha_sum: f64 = alpha.iter().sum();
        let denom: f64 = docs
            .iter()
            .map(|d| digamma(d.total_weight() + alpha_sum) - digamma(alpha_sum))
            .sum();
        if !denom.is_finite() || denom <= 0.0 {
            return;
        }
        for (k, a) in alpha.iter_mut().enumerate() {
            let numer: f64 = docs
                .iter()
                .map(|d| digamma(d.topic_counts[k] + *a) - digamma(*a))
                .sum();
            *a = (*a * numer / denom).max(ALPHA_FLOOR);
        }
    }
}

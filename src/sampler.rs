//! The collapsed Gibbs sampling core.
//!
//! `sample_token` is the single update rule everything else drives: pull
//! one token's weight out of the sufficient statistics, form the
//! conditional over topics, draw by inverse CDF over the prefix sum, and
//! push the weight back under the drawn topic. The execution schemes
//! differ only in which view of the statistics a worker holds, expressed
//! through [`SamplerState`].

use std::ops::Range;

use rand::rngs::StdRng;
use rand::Rng;

use crate::corpus::Document;
use crate::error::{Result, TematicaError};
use crate::prior::EtaPrior;
use crate::state::ModelState;

/// The view of the sufficient statistics a sampling worker may touch.
///
/// Word ids are always global vocabulary ids; chunked views translate
/// internally.
pub(crate) trait SamplerState {
    fn count(&self, k: usize, v: u32) -> f64;
    fn add(&mut self, k: usize, v: u32, w: f64);
    fn total(&self, k: usize) -> f64;
    fn add_total(&mut self, k: usize, w: f64);
}

/// Full exclusive access to a [`ModelState`]: the sequential and
/// copy-and-merge view.
pub(crate) struct ExclusiveState<'a> {
    pub state: &'a mut ModelState,
}

impl SamplerState for ExclusiveState<'_> {
    #[inline]
    fn count(&self, k: usize, v: u32) -> f64 {
        self.state.count(k, v)
    }

    #[inline]
    fn add(&mut self, k: usize, v: u32, w: f64) {
        self.state.add(k, v, w);
    }

    #[inline]
    fn total(&self, k: usize) -> f64 {
        self.state.total(k)
    }

    #[inline]
    fn add_total(&mut self, k: usize, w: f64) {
        self.state.add_total(k, w);
    }
}

/// Resample the topic of one token.
///
/// For each topic k the unnormalized conditional is
/// `(n_dk + alpha_k) * (n_kv + eta_kv) / (n_k + eta_sum_k)` with the
/// token's own weight removed. The draw takes the first prefix-sum index
/// exceeding a uniform value in `[0, total)`.
pub(crate) fn sample_token<S: SamplerState>(
    doc: &mut Document,
    pos: usize,
    state: &mut S,
    alpha: &[f64],
    eta: &EtaPrior,
    probs: &mut [f64],
    rng: &mut StdRng,
) -> Result<()> {
    let v = doc.words[pos];
    let old = doc.topics[pos] as usize;
    let w = doc.weights[pos];

    doc.topic_counts[old] -= w;
    state.add(old, v, -w);
    state.add_total(old, -w);

    let num_topics = alpha.len();
    let mut cum = 0.0;
    for (k, slot) in probs.iter_mut().enumerate() {
        cum += (doc.topic_counts[k] + alpha[k]) * (state.count(k, v) + eta.eta(k, v))
            / (state.total(k) + eta.eta_sum(k));
        *slot = cum;
    }
    let total = probs[num_topics - 1];
    if !total.is_finite() || total <= 0.0 {
        // restore the removed weight so recovery sees consistent counts
        doc.topic_counts[old] += w;
        state.add(old, v, w);
        state.add_total(old, w);
        return Err(TematicaError::inconsistency(format!(
            "sampling mass for word {v} is {total}"
        )));
    }

    let draw = rng.gen::<f64>() * total;
    let new = probs
        .iter()
        .position(|&c| c > draw)
        .unwrap_or(num_topics - 1);

    doc.topic_counts[new] += w;
    state.add(new, v, w);
    state.add_total(new, w);
    doc.topics[pos] = new as u32;
    Ok(())
}

/// Resample every token of `doc` in `range`, ascending.
pub(crate) fn sample_document<S: SamplerState>(
    doc: &mut Document,
    range: Range<usize>,
    state: &mut S,
    alpha: &[f64],
    eta: &EtaPrior,
    probs: &mut [f64],
    rng: &mut StdRng,
) -> Result<()> {
    for pos in range {
        sample_token(doc, pos, state, alpha, eta, probs, rng)?;
    }
    Ok(())
}

/// Draw an index proportional to `weights` (used when initializing topics
/// from a per-word prior column).
pub(crate) fn sample_from_weights(weights: &[f64], rng: &mut StdRng) -> Result<usize> {
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(TematicaError::inconsistency(format!(
            "discrete distribution with mass {total}"
        )));
    }
    let draw = rng.gen::<f64>() * total;
    let mut cum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cum += w;
        if cum > draw {
            return Ok(i);
        }
    }
    Ok(weights.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const K: usize = 3;

    /// A two-document toy setup with consistent counts.
    fn setup() -> (Vec<Document>, ModelState) {
        let mut docs = vec![
            Document::new(vec![0, 1, 2, 2], 0),
            Document::new(vec![0, 0, 3], 0),
        ];
        let mut state = ModelState::new(K, 4);
        for (i, doc) in docs.iter_mut().enumerate() {
            doc.sort_words();
            doc.init_counts(K);
            for pos in 0..doc.words.len() {
                let k = (pos + i) % K;
                doc.topics[pos] = k as u32;
                doc.topic_counts[k] += doc.weights[pos];
                state.add(k, doc.words[pos], doc.weights[pos]);
                state.add_total(k, doc.weights[pos]);
            }
        }
        (docs, state)
    }

    fn assert_consistent(docs: &[Document], state: &ModelState) {
        for doc in docs {
            let total: f64 = doc.topic_counts.iter().sum();
            assert!((total - doc.total_weight()).abs() < 1e-9);
        }
        for k in 0..K {
            let row: f64 = (0..4).map(|v| state.count(k, v as u32)).sum();
            assert!((row - state.total(k)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sample_token_preserves_count_invariants() {
        let (mut docs, mut state) = setup();
        let alpha = [0.1; K];
        let eta = EtaPrior::symmetric(0.01, 4);
        let mut probs = [0.0; K];
        let mut rng = StdRng::seed_from_u64(7);

        for pos in 0..docs[0].words.len() {
            let mut view = ExclusiveState { state: &mut state };
            sample_token(
                &mut docs[0],
                pos,
                &mut view,
                &alpha,
                &eta,
                &mut probs,
                &mut rng,
            )
            .expect("sampling should succeed");
            assert!(docs[0].topics[pos] < K as u32);
        }
        assert_consistent(&docs, &state);
    }

    #[test]
    fn test_sample_document_is_deterministic_for_a_seed() {
        let alpha = [0.1; K];
        let eta = EtaPrior::symmetric(0.01, 4);

        let run = || {
            let (mut docs, mut state) = setup();
            let mut probs = [0.0; K];
            let mut rng = StdRng::seed_from_u64(99);
            for doc in &mut docs {
                let len = doc.words.len();
                let mut view = ExclusiveState { state: &mut state };
                sample_document(doc, 0..len, &mut view, &alpha, &eta, &mut probs, &mut rng)
                    .expect("sampling should succeed");
            }
            docs.iter().map(|d| d.topics.clone()).collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_prefix_sum_draw_lands_on_positive_mass() {
        // With all mass on one topic the draw must pick it every time.
        let mut doc = Document::new(vec![0], 0);
        doc.sort_words();
        doc.init_counts(K);
        doc.topics[0] = 1;
        doc.topic_counts[1] = 1.0;
        let mut state = ModelState::new(K, 1);
        state.add(1, 0, 1.0);
        state.add_total(1, 1.0);

        // alpha zero except topic 1 forces p(0) = p(2) = 0.
        let alpha = [0.0, 5.0, 0.0];
        let eta = EtaPrior::symmetric(0.01, 1);
        let mut probs = [0.0; K];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let mut view = ExclusiveState { state: &mut state };
            sample_token(&mut doc, 0, &mut view, &alpha, &eta, &mut probs, &mut rng)
                .expect("sampling should succeed");
            assert_eq!(doc.topics[0], 1);
        }
    }

    #[test]
    fn test_sample_from_weights_respects_support() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let i = sample_from_weights(&[0.0, 0.0, 2.0, 0.0], &mut rng)
                .expect("mass is positive");
            assert_eq!(i, 2);
        }
        assert!(sample_from_weights(&[0.0, 0.0], &mut rng).is_err());
    }
}

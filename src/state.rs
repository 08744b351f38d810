//! Shared sufficient statistics for the sampler.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TematicaError};

/// Per-topic totals plus the topic × vocabulary co-occurrence table.
///
/// The table is stored word-major (`counts[v * K + k]`) so a vocabulary
/// chunk `[b, e)` is one contiguous slice, which is what lets the
/// partitioned execution scheme hand workers disjoint mutable borrows.
///
/// Invariant (restored after every merge): `topic_totals[k]` equals the
/// sum of `count(k, v)` over all `v`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    num_topics: usize,
    vocab_size: usize,
    pub(crate) topic_totals: Vec<f64>,
    pub(crate) topic_word: Vec<f64>,
}

impl ModelState {
    /// Zero-initialized state for `num_topics` topics over `vocab_size`
    /// words.
    #[must_use]
    pub fn new(num_topics: usize, vocab_size: usize) -> Self {
        Self {
            num_topics,
            vocab_size,
            topic_totals: vec![0.0; num_topics],
            topic_word: vec![0.0; num_topics * vocab_size],
        }
    }

    /// Number of topics K.
    #[must_use]
    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    /// Vocabulary size V.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Co-occurrence weight of topic `k` with word `v`.
    #[inline]
    #[must_use]
    pub fn count(&self, k: usize, v: u32) -> f64 {
        self.topic_word[v as usize * self.num_topics + k]
    }

    #[inline]
    pub(crate) fn add(&mut self, k: usize, v: u32, w: f64) {
        self.topic_word[v as usize * self.num_topics + k] += w;
    }

    /// Total weight assigned to topic `k`.
    #[inline]
    #[must_use]
    pub fn total(&self, k: usize) -> f64 {
        self.topic_totals[k]
    }

    #[inline]
    pub(crate) fn add_total(&mut self, k: usize, w: f64) {
        self.topic_totals[k] += w;
    }

    /// Recompute `topic_totals` as row sums of the table.
    pub(crate) fn recompute_totals(&mut self) {
        self.topic_totals.iter_mut().for_each(|t| *t = 0.0);
        for v in 0..self.vocab_size {
            let row = &self.topic_word[v * self.num_topics..(v + 1) * self.num_topics];
            for (t, &c) in self.topic_totals.iter_mut().zip(row.iter()) {
                *t += c;
            }
        }
    }

    /// Clamp every table entry at zero (overlapping copy-merge deltas can
    /// legally drive an entry negative).
    pub(crate) fn clamp_negative(&mut self) {
        for c in &mut self.topic_word {
            if *c < 0.0 {
                *c = 0.0;
            }
        }
    }

    /// Check the statistics for numerical damage beyond the expected
    /// clamp case: non-finite entries anywhere, or totals that went
    /// negative past floating-point noise.
    pub(crate) fn validate(&self) -> Result<()> {
        for (k, &t) in self.topic_totals.iter().enumerate() {
            if !t.is_finite() || t < -1e-6 {
                return Err(TematicaError::inconsistency(format!(
                    "topic total {k} is {t}"
                )));
            }
        }
        for (i, &c) in self.topic_word.iter().enumerate() {
            if !c.is_finite() || c < -1e-6 {
                let v = i / self.num_topics;
                let k = i % self.num_topics;
                return Err(TematicaError::inconsistency(format!(
                    "count for topic {k}, word {v} is {c}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing_round_trip() {
        let mut state = ModelState::new(3, 4);
        state.add(1, 2, 2.5);
        state.add_total(1, 2.5);
        assert_eq!(state.count(1, 2), 2.5);
        assert_eq!(state.count(1, 3), 0.0);
        assert_eq!(state.total(1), 2.5);
        assert_eq!(state.total(0), 0.0);
    }

    #[test]
    fn test_recompute_totals_matches_row_sums() {
        let mut state = ModelState::new(2, 3);
        state.add(0, 0, 1.0);
        state.add(0, 2, 2.0);
        state.add(1, 1, 4.0);
        state.recompute_totals();
        assert!((state.total(0) - 3.0).abs() < 1e-12);
        assert!((state.total(1) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_negative_only_touches_negatives() {
        let mut state = ModelState::new(2, 2);
        state.add(0, 0, -1.5);
        state.add(1, 1, 2.0);
        state.clamp_negative();
        assert_eq!(state.count(0, 0), 0.0);
        assert_eq!(state.count(1, 1), 2.0);
    }

    #[test]
    fn test_validate_rejects_nan_and_negative_totals() {
        let mut state = ModelState::new(2, 2);
        assert!(state.validate().is_ok());

        state.topic_word[1] = f64::NAN;
        assert!(state.validate().is_err());
        state.topic_word[1] = 0.0;

        state.topic_totals[0] = -1.0;
        assert!(state.validate().is_err());
    }
}

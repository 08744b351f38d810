//! Corpus containers: vocabulary interning, documents, term weighting.
//!
//! Tokenization and stop-word filtering are the caller's business; this
//! module only interns the tokens it is handed and keeps the per-document
//! arrays the sampler mutates in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Token weighting scheme applied once before the first sweep.
///
/// Weighted schemes scale each token's contribution to the sufficient
/// statistics, downweighting uninformative tokens (Wilson & Chew, 2010).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermWeight {
    /// Every token counts 1.
    One,
    /// Inverse document frequency: `ln(D / df(v))`.
    Idf,
    /// Averaged idf variant: `(idf(v) + 1) / 2`.
    IdfOne,
    /// Pointwise mutual information between the token and its document,
    /// clamped at zero.
    Pmi,
}

impl Default for TermWeight {
    fn default() -> Self {
        TermWeight::One
    }
}

/// Maps token strings to dense integer ids.
///
/// # Examples
///
/// ```
/// use tematica::corpus::Vocabulary;
///
/// let mut vocab = Vocabulary::new();
/// let a = vocab.intern("apple");
/// assert_eq!(vocab.intern("apple"), a);
/// assert_eq!(vocab.id("apple"), Some(a));
/// assert_eq!(vocab.word(a), "apple");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Create an empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a token, returning its dense id.
    pub fn intern(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.index.get(token) {
            return id;
        }
        let id = self.words.len() as u32;
        self.words.push(token.to_string());
        self.index.insert(token.to_string(), id);
        id
    }

    /// Look up the id of a token, if it has been interned.
    #[must_use]
    pub fn id(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    /// The token string for a dense id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never interned.
    #[must_use]
    pub fn word(&self, id: u32) -> &str {
        &self.words[id as usize]
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the vocabulary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One tokenized document with its current topic assignments.
///
/// Token ids are sorted ascending at prepare time (the partitioned
/// scheme's chunk ranges require it); the permutation back to the
/// caller's original token order is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub(crate) words: Vec<u32>,
    pub(crate) order: Vec<u32>,
    pub(crate) topics: Vec<u32>,
    pub(crate) weights: Vec<f64>,
    pub(crate) topic_counts: Vec<f64>,
    pub(crate) total_weight: f64,
    pub(crate) skipped: usize,
}

impl Document {
    pub(crate) fn new(words: Vec<u32>, skipped: usize) -> Self {
        let n = words.len();
        Self {
            words,
            order: Vec::new(),
            topics: Vec::new(),
            weights: vec![1.0; n],
            topic_counts: Vec::new(),
            total_weight: 0.0,
            skipped,
        }
    }

    /// Sort token ids ascending, recording the permutation back to the
    /// source order.
    pub(crate) fn sort_words(&mut self) {
        let mut perm: Vec<u32> = (0..self.words.len() as u32).collect();
        perm.sort_by_key(|&i| self.words[i as usize]);
        self.words = perm.iter().map(|&i| self.words[i as usize]).collect();
        self.order = perm;
    }

    /// Allocate the topic array and per-topic counters for `num_topics`.
    pub(crate) fn init_counts(&mut self, num_topics: usize) {
        self.topics = vec![0; self.words.len()];
        self.topic_counts = vec![0.0; num_topics];
        self.total_weight = self.weights.iter().sum();
    }

    /// Number of in-vocabulary tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the document has no in-vocabulary tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Tokens that were outside the vocabulary and dropped when the
    /// document was built (only non-zero for inference documents).
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Total token weight (equals `len()` under `TermWeight::One`).
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Current topic assignments, parallel to the sorted token ids.
    #[must_use]
    pub fn topics(&self) -> &[u32] {
        &self.topics
    }

    /// Token ids in sorted order.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Topic assignments permuted back to the caller's original token
    /// order.
    #[must_use]
    pub fn topics_in_source_order(&self) -> Vec<u32> {
        let mut out = vec![0u32; self.topics.len()];
        for (sorted_pos, &src_pos) in self.order.iter().enumerate() {
            out[src_pos as usize] = self.topics[sorted_pos];
        }
        out
    }
}

/// Per-word document frequencies (how many documents contain each word).
pub(crate) fn document_frequencies(docs: &[Document], vocab_size: usize) -> Vec<u32> {
    let mut df = vec![0u32; vocab_size];
    let mut seen = vec![u32::MAX; vocab_size];
    for (d, doc) in docs.iter().enumerate() {
        for &w in &doc.words {
            if seen[w as usize] != d as u32 {
                seen[w as usize] = d as u32;
                df[w as usize] += 1;
            }
        }
    }
    df
}

/// Per-word total occurrence counts over the corpus.
pub(crate) fn corpus_frequencies(docs: &[Document], vocab_size: usize) -> Vec<u64> {
    let mut cf = vec![0u64; vocab_size];
    for doc in docs {
        for &w in &doc.words {
            cf[w as usize] += 1;
        }
    }
    cf
}

/// Per-word weighting table for the chosen scheme, computed once from
/// corpus statistics. Empty under `TermWeight::One`.
pub(crate) fn vocab_weights(
    scheme: TermWeight,
    docs: &[Document],
    vocab_size: usize,
) -> Vec<f64> {
    match scheme {
        TermWeight::One => Vec::new(),
        TermWeight::Idf | TermWeight::IdfOne => {
            let df = document_frequencies(docs, vocab_size);
            let num_docs = docs.len() as f64;
            df.iter()
                .map(|&d| if d == 0 { 0.0 } else { (num_docs / f64::from(d)).ln() })
                .collect()
        }
        TermWeight::Pmi => {
            let cf = corpus_frequencies(docs, vocab_size);
            let total: u64 = cf.iter().sum();
            cf.iter()
                .map(|&c| if total == 0 { 0.0 } else { c as f64 / total as f64 })
                .collect()
        }
    }
}

/// Fill a document's per-token weights from the weighting table.
pub(crate) fn apply_token_weights(scheme: TermWeight, doc: &mut Document, table: &[f64]) {
    match scheme {
        TermWeight::One => {
            doc.weights.iter_mut().for_each(|w| *w = 1.0);
        }
        TermWeight::Idf => {
            for (w, &v) in doc.weights.iter_mut().zip(doc.words.iter()) {
                *w = table[v as usize];
            }
        }
        TermWeight::IdfOne => {
            for (w, &v) in doc.weights.iter_mut().zip(doc.words.iter()) {
                *w = (table[v as usize] + 1.0) / 2.0;
            }
        }
        TermWeight::Pmi => {
            let len = doc.words.len() as f64;
            let mut tf: HashMap<u32, f64> = HashMap::new();
            for &v in &doc.words {
                *tf.entry(v).or_insert(0.0) += 1.0;
            }
            for (w, &v) in doc.weights.iter_mut().zip(doc.words.iter()) {
                let p_v = table[v as usize];
                *w = if p_v > 0.0 {
                    (tf[&v] / p_v / len).ln().max(0.0)
                } else {
                    0.0
                };
            }
        }
    }
}

#[cfg(test)]
mod tests;

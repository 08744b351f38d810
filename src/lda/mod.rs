//! Latent Dirichlet Allocation trained with collapsed Gibbs sampling.
//!
//! This module provides the training and inference engine:
//! - Collapsed Gibbs sweeps over the corpus under three execution schemes
//! - Periodic Minka re-estimation of the topic concentrations
//! - Inference over unseen documents against frozen statistics
//!
//! # Quick Start
//!
//! ```
//! use tematica::prelude::*;
//!
//! let mut model = LdaModel::new(2, 0.1, 0.01).unwrap().with_seed(42);
//! model.add_document(&["apple", "banana", "apple", "cherry"]).unwrap();
//! model.add_document(&["banana", "banana", "cherry"]).unwrap();
//! model.add_document(&["apple", "cherry", "cherry"]).unwrap();
//!
//! model.train(50, 1, ParallelScheme::Sequential).unwrap();
//! assert!(model.perplexity().unwrap().is_finite());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::corpus::{self, Document, TermWeight, Vocabulary};
use crate::error::{Result, TematicaError};
use crate::math::ln_gamma;
use crate::optimize::optimize_alpha;
use crate::parallel::{
    effective_workers, sweep_copy_merge, sweep_partition, sweep_sequential, ParallelScheme,
    WorkerSet,
};
use crate::prior::{DefaultPrior, EtaPrior, PriorProvider};
use crate::sampler::{sample_document, sample_from_weights, ExclusiveState};
use crate::state::ModelState;

/// Default optimizer cadence (in sweeps); 0 disables re-estimation.
const DEFAULT_OPTIM_INTERVAL: usize = 10;

/// Options for [`LdaModel::infer`].
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Gibbs sweeps to run over each unseen document.
    pub iterations: usize,
    /// Worker threads for per-document inference (each document gets its
    /// own private state copy, so documents parallelize freely).
    pub workers: usize,
    /// Pool the whole batch into one perturbed state and report a single
    /// combined log-likelihood instead of one per document.
    pub together: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            iterations: 100,
            workers: 1,
            together: false,
        }
    }
}

/// Everything the persistence layer needs to rebuild a trained model.
///
/// The engine is agnostic to the on-disk format; encode this with any
/// serde backend and feed it back through [`LdaModel::restore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub num_topics: usize,
    pub alpha: Vec<f64>,
    pub eta: f64,
    pub term_weight: TermWeight,
    pub burn_in: usize,
    pub optim_interval: usize,
    pub seed: u64,
    pub iterated: usize,
    pub vocab: Vocabulary,
    pub word_priors: BTreeMap<String, Vec<f64>>,
    pub vocab_weights: Vec<f64>,
    pub state: ModelState,
    pub docs: Vec<Document>,
}

/// The last successfully merged position, used to discard a damaged sweep.
struct RecoveryPoint {
    state: ModelState,
    topics: Vec<Vec<u32>>,
    counts: Vec<Vec<f64>>,
    alpha: Vec<f64>,
}

/// Latent Dirichlet Allocation model.
///
/// Documents are added token-by-token (the caller owns tokenization and
/// stop-word policy), then [`train`](LdaModel::train) prepares the corpus
/// on first use and runs collapsed Gibbs sweeps under the requested
/// execution scheme. All counts live in one authoritative [`ModelState`];
/// concurrent schemes reconcile into it at every sweep barrier.
///
/// # Examples
///
/// ```
/// use tematica::prelude::*;
///
/// let mut model = LdaModel::new(2, 0.1, 0.01).unwrap().with_seed(7);
/// model.add_document(&["rust", "memory", "safety"]).unwrap();
/// model.add_document(&["rust", "thread", "safety"]).unwrap();
/// model.train(20, 1, ParallelScheme::Sequential).unwrap();
///
/// let top = model.top_words(2).unwrap();
/// assert_eq!(top.len(), 2);
/// ```
pub struct LdaModel {
    num_topics: usize,
    alpha: Vec<f64>,
    eta: f64,
    term_weight: TermWeight,
    burn_in: usize,
    optim_interval: usize,
    seed: u64,
    vocab: Vocabulary,
    word_priors: BTreeMap<String, Vec<f64>>,
    docs: Vec<Document>,
    state: ModelState,
    eta_prior: EtaPrior,
    vocab_weights: Vec<f64>,
    vocab_freq: Vec<u64>,
    prior: Box<dyn PriorProvider>,
    rng: StdRng,
    iterated: usize,
    prepared: bool,
    workers: Option<WorkerSet>,
    recovery: Option<RecoveryPoint>,
}

impl fmt::Debug for LdaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdaModel")
            .field("num_topics", &self.num_topics)
            .field("eta", &self.eta)
            .field("term_weight", &self.term_weight)
            .field("num_docs", &self.docs.len())
            .field("vocab_size", &self.vocab.len())
            .field("iterated", &self.iterated)
            .field("prepared", &self.prepared)
            .finish()
    }
}

impl LdaModel {
    /// Create a model with `num_topics` topics, symmetric document-topic
    /// prior `alpha` and topic-word prior `eta`.
    ///
    /// Hyperparameters are validated here, before any corpus is touched.
    ///
    /// # Errors
    ///
    /// Returns [`TematicaError::InvalidHyperparameter`] when `num_topics`
    /// is zero or does not fit 32 bits, or when `alpha` or `eta` is not
    /// strictly positive.
    pub fn new(num_topics: usize, alpha: f64, eta: f64) -> Result<Self> {
        if num_topics == 0 || num_topics > u32::MAX as usize {
            return Err(TematicaError::InvalidHyperparameter {
                param: "num_topics".to_string(),
                value: format!("{num_topics}"),
                constraint: "0 < K <= u32::MAX".to_string(),
            });
        }
        if !(alpha > 0.0) || !alpha.is_finite() {
            return Err(TematicaError::bad_param("alpha", alpha, "alpha > 0"));
        }
        if !(eta > 0.0) || !eta.is_finite() {
            return Err(TematicaError::bad_param("eta", eta, "eta > 0"));
        }
        let seed = 42;
        Ok(Self {
            num_topics,
            alpha: vec![alpha; num_topics],
            eta,
            term_weight: TermWeight::One,
            burn_in: 0,
            optim_interval: DEFAULT_OPTIM_INTERVAL,
            seed,
            vocab: Vocabulary::new(),
            word_priors: BTreeMap::new(),
            docs: Vec::new(),
            state: ModelState::new(num_topics, 0),
            eta_prior: EtaPrior::symmetric(eta, 0),
            vocab_weights: Vec::new(),
            vocab_freq: Vec::new(),
            prior: Box::new(DefaultPrior),
            rng: StdRng::seed_from_u64(seed),
            iterated: 0,
            prepared: false,
            workers: None,
            recovery: None,
        })
    }

    /// Set the random seed (the default is 42).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Set the token weighting scheme (the default is [`TermWeight::One`]).
    #[must_use]
    pub fn with_term_weight(mut self, scheme: TermWeight) -> Self {
        self.term_weight = scheme;
        self
    }

    /// Sweeps to run before hyperparameter optimization starts.
    #[must_use]
    pub fn with_burn_in(mut self, sweeps: usize) -> Self {
        self.burn_in = sweeps;
        self
    }

    /// Optimizer cadence in sweeps; 0 disables alpha re-estimation.
    #[must_use]
    pub fn with_optim_interval(mut self, interval: usize) -> Self {
        self.optim_interval = interval;
        self
    }

    /// Inject a document-level prior provider (metadata-regression style
    /// variants); the default passes the base alpha vector through.
    #[must_use]
    pub fn with_prior_provider(mut self, provider: Box<dyn PriorProvider>) -> Self {
        self.prior = provider;
        self
    }

    /// Add a tokenized training document, returning its document id.
    ///
    /// # Errors
    ///
    /// Fails once the corpus has been prepared.
    pub fn add_document(&mut self, tokens: &[&str]) -> Result<usize> {
        if self.prepared {
            return Err(TematicaError::Other(
                "documents cannot be added after the corpus is prepared".to_string(),
            ));
        }
        let ids: Vec<u32> = tokens.iter().map(|t| self.vocab.intern(t)).collect();
        self.docs.push(Document::new(ids, 0));
        Ok(self.docs.len() - 1)
    }

    /// Register an asymmetric topic prior for one word, switching the
    /// topic-word prior to a per-word table at prepare time.
    ///
    /// # Errors
    ///
    /// Fails when the vector length differs from K, any entry is
    /// negative, the mass is zero, or the corpus is already prepared.
    pub fn set_word_prior(&mut self, word: &str, priors: &[f64]) -> Result<()> {
        if self.prepared {
            return Err(TematicaError::Other(
                "word priors must be set before the corpus is prepared".to_string(),
            ));
        }
        if priors.len() != self.num_topics {
            return Err(TematicaError::DimensionMismatch {
                expected: format!("K={}", self.num_topics),
                actual: format!("{}", priors.len()),
            });
        }
        if priors.iter().any(|&p| !(p >= 0.0) || !p.is_finite()) {
            return Err(TematicaError::Other(format!(
                "word prior for {word:?} must be non-negative and finite"
            )));
        }
        if priors.iter().sum::<f64>() <= 0.0 {
            return Err(TematicaError::Other(format!(
                "word prior for {word:?} has zero mass"
            )));
        }
        self.vocab.intern(word);
        self.word_priors.insert(word.to_string(), priors.to_vec());
        Ok(())
    }

    /// The registered prior for a word, if any (resolved against the
    /// dense table once prepared).
    #[must_use]
    pub fn word_prior(&self, word: &str) -> Option<Vec<f64>> {
        if self.prepared {
            let v = self.vocab.id(word)?;
            self.eta_prior
                .init_column(v)
                .map(<[f64]>::to_vec)
        } else {
            self.word_priors.get(word).cloned()
        }
    }

    /// Freeze the vocabulary, compute term weights, and initialize every
    /// token's topic. Called implicitly by the first [`train`](Self::train).
    ///
    /// # Errors
    ///
    /// Fails when the corpus or vocabulary is empty.
    pub fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        if self.docs.is_empty() {
            return Err(TematicaError::Other(
                "corpus is empty; add documents before training".to_string(),
            ));
        }
        if self.vocab.is_empty() {
            return Err(TematicaError::Other(
                "vocabulary is empty; documents contain no tokens".to_string(),
            ));
        }

        let vocab_size = self.vocab.len();
        self.vocab_freq = corpus::corpus_frequencies(&self.docs, vocab_size);
        self.vocab_weights = corpus::vocab_weights(self.term_weight, &self.docs, vocab_size);
        self.eta_prior = if self.word_priors.is_empty() {
            EtaPrior::symmetric(self.eta, vocab_size)
        } else {
            let vocab = &self.vocab;
            let entries = self
                .word_priors
                .iter()
                .filter_map(|(word, priors)| vocab.id(word).map(|v| (v, priors.as_slice())));
            EtaPrior::by_word(self.eta, self.num_topics, vocab_size, entries)
        };
        self.state = ModelState::new(self.num_topics, vocab_size);

        let LdaModel {
            ref mut docs,
            ref mut state,
            ref mut rng,
            ref eta_prior,
            ref vocab_weights,
            num_topics,
            term_weight,
            ..
        } = *self;
        for doc in docs.iter_mut() {
            doc.sort_words();
            corpus::apply_token_weights(term_weight, doc, vocab_weights);
            doc.init_counts(num_topics);
            for pos in 0..doc.words.len() {
                let v = doc.words[pos];
                let k = match eta_prior.init_column(v) {
                    Some(column) => sample_from_weights(column, rng)?,
                    None => rng.gen_range(0..num_topics),
                };
                doc.topics[pos] = k as u32;
                doc.topic_counts[k] += doc.weights[pos];
                state.add(k, v, doc.weights[pos]);
                state.add_total(k, doc.weights[pos]);
            }
        }

        self.prepared = true;
        self.capture_recovery();
        debug!(
            "prepared corpus: {} docs, {} words, vocabulary {}",
            self.docs.len(),
            self.num_words(),
            self.vocab.len()
        );
        Ok(())
    }

    /// Run `iterations` Gibbs sweeps with `workers` threads under the
    /// requested execution scheme.
    ///
    /// A worker count of 1 (or one that the scheme caps down to 1) runs
    /// sequentially; unreasonable worker counts are silently capped. A
    /// sweep that damages the statistics is retried once from the last
    /// successfully merged state before the error surfaces.
    ///
    /// # Errors
    ///
    /// Returns [`TematicaError::TrainingError`] when a consistency
    /// violation survives the retry, or corpus errors from
    /// [`prepare`](Self::prepare).
    pub fn train(
        &mut self,
        iterations: usize,
        workers: usize,
        scheme: ParallelScheme,
    ) -> Result<()> {
        self.prepare()?;

        let mut scheme = if workers <= 1 {
            ParallelScheme::Sequential
        } else {
            scheme
        };
        let effective =
            effective_workers(scheme, workers.max(1), self.vocab.len(), self.docs.len());
        if effective <= 1 {
            scheme = ParallelScheme::Sequential;
        }
        if scheme != ParallelScheme::Sequential {
            self.ensure_workers(effective, scheme)?;
        }

        for _ in 0..iterations {
            if let Err(err) = self.sweep_once(scheme) {
                warn!(
                    "sweep {} failed ({err}); restoring last merged state and retrying",
                    self.iterated
                );
                self.restore_recovery()?;
                self.sweep_once(scheme)?;
            }
            self.capture_recovery();
            self.iterated += 1;
            if self.iterated >= self.burn_in
                && self.optim_interval > 0
                && self.iterated % self.optim_interval == 0
            {
                optimize_alpha(&mut self.alpha, &self.docs);
                debug!("re-estimated alpha at sweep {}", self.iterated);
            }
        }
        Ok(())
    }

    fn ensure_workers(&mut self, workers: usize, scheme: ParallelScheme) -> Result<()> {
        let rebuild = self
            .workers
            .as_ref()
            .map_or(true, |ws| ws.workers != workers);
        if rebuild {
            self.workers = Some(WorkerSet::new(workers, &mut self.rng)?);
        }
        if scheme == ParallelScheme::Partition {
            if let Some(ws) = self.workers.as_mut() {
                ws.ensure_plan(&self.vocab_freq, &self.docs);
            }
        }
        Ok(())
    }

    fn sweep_once(&mut self, scheme: ParallelScheme) -> Result<()> {
        match scheme {
            ParallelScheme::Sequential => sweep_sequential(
                &mut self.docs,
                &mut self.state,
                &self.alpha,
                &self.eta_prior,
                &*self.prior,
                &mut self.rng,
            )?,
            ParallelScheme::Partition => {
                let ws = self
                    .workers
                    .as_mut()
                    .ok_or_else(|| TematicaError::Other("worker pool not built".to_string()))?;
                sweep_partition(
                    &mut self.docs,
                    &mut self.state,
                    &self.alpha,
                    &self.eta_prior,
                    &*self.prior,
                    ws,
                )?;
            }
            ParallelScheme::CopyMerge => {
                let ws = self
                    .workers
                    .as_mut()
                    .ok_or_else(|| TematicaError::Other("worker pool not built".to_string()))?;
                sweep_copy_merge(
                    &mut self.docs,
                    &mut self.state,
                    &self.alpha,
                    &self.eta_prior,
                    &*self.prior,
                    ws,
                )?;
            }
        }
        self.state.validate()
    }

    fn capture_recovery(&mut self) {
        self.recovery = Some(RecoveryPoint {
            state: self.state.clone(),
            topics: self.docs.iter().map(|d| d.topics.clone()).collect(),
            counts: self.docs.iter().map(|d| d.topic_counts.clone()).collect(),
            alpha: self.alpha.clone(),
        });
    }

    fn restore_recovery(&mut self) -> Result<()> {
        let recovery = self.recovery.as_ref().ok_or_else(|| {
            TematicaError::inconsistency("no recovery snapshot available")
        })?;
        self.state.clone_from(&recovery.state);
        self.alpha.clone_from(&recovery.alpha);
        for ((doc, topics), counts) in self
            .docs
            .iter_mut()
            .zip(&recovery.topics)
            .zip(&recovery.counts)
        {
            doc.topics.clone_from(topics);
            doc.topic_counts.clone_from(counts);
        }
        Ok(())
    }

    fn require_prepared(&self) -> Result<()> {
        if self.prepared {
            Ok(())
        } else {
            Err(TematicaError::Other(
                "model not prepared; call train() or prepare() first".to_string(),
            ))
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
        self.vocab.len()
    }

    /// Number of training documents.
    #[must_use]
    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    /// Total number of training tokens.
    #[must_use]
    pub fn num_words(&self) -> usize {
        self.docs.iter().map(Document::len).sum()
    }

    /// Total training token weight (equals `num_words()` under
    /// [`TermWeight::One`]).
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.docs.iter().map(Document::total_weight).sum()
    }

    /// Completed training sweeps.
    #[must_use]
    pub fn iterated(&self) -> usize {
        self.iterated
    }

    /// Current per-topic concentration parameters.
    #[must_use]
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    /// The scalar topic-word prior.
    #[must_use]
    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// A training document by id.
    #[must_use]
    pub fn doc(&self, doc_id: usize) -> Option<&Document> {
        self.docs.get(doc_id)
    }

    fn ll_docs<'a>(&self, docs: impl Iterator<Item = &'a Document>) -> f64 {
        let alpha_sum: f64 = self.alpha.iter().sum();
        let lg_alpha_sum = ln_gamma(alpha_sum);
        let lg_alpha: Vec<f64> = self.alpha.iter().map(|&a| ln_gamma(a)).collect();
        let mut ll = 0.0;
        for doc in docs {
            ll -= ln_gamma(doc.total_weight() + alpha_sum) - lg_alpha_sum;
            for (k, &a) in self.alpha.iter().enumerate() {
                ll += ln_gamma(doc.topic_counts[k] + a) - lg_alpha[k];
            }
        }
        ll
    }

    fn ll_rest(&self, state: &ModelState) -> f64 {
        let mut ll = 0.0;
        for k in 0..self.num_topics {
            let eta_sum = self.eta_prior.eta_sum(k);
            ll += ln_gamma(eta_sum) - ln_gamma(state.total(k) + eta_sum);
            for v in 0..state.vocab_size() {
                let count = state.count(k, v as u32);
                if count > 0.0 {
                    let eta = self.eta_prior.eta(k, v as u32);
                    ll += ln_gamma(count + eta) - ln_gamma(eta);
                }
            }
        }
        ll
    }

    /// Joint log-likelihood of the corpus under the current assignments.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared.
    pub fn log_likelihood(&self) -> Result<f64> {
        self.require_prepared()?;
        Ok(self.ll_docs(self.docs.iter()) + self.ll_rest(&self.state))
    }

    /// Log-likelihood per unit of token weight.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared or the corpus weight is zero.
    pub fn log_likelihood_per_word(&self) -> Result<f64> {
        self.require_prepared()?;
        let total = self.total_weight();
        if total <= 0.0 {
            return Err(TematicaError::Other(
                "corpus has zero token weight".to_string(),
            ));
        }
        Ok(self.log_likelihood()? / total)
    }

    /// Corpus perplexity, `exp(-log_likelihood / total_weight)`.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared or the corpus weight is zero.
    pub fn perplexity(&self) -> Result<f64> {
        Ok((-self.log_likelihood_per_word()?).exp())
    }

    /// Smoothed word distribution of one topic,
    /// `(n_kv + eta_kv) / (n_k + eta_sum_k)`.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared or `topic >= K`.
    pub fn topic_word_distribution(&self, topic: usize) -> Result<Vec<f64>> {
        self.require_prepared()?;
        if topic >= self.num_topics {
            return Err(TematicaError::Other(format!(
                "topic index {topic} out of bounds (K={})",
                self.num_topics
            )));
        }
        let denom = self.state.total(topic) + self.eta_prior.eta_sum(topic);
        Ok((0..self.vocab.len() as u32)
            .map(|v| (self.state.count(topic, v) + self.eta_prior.eta(topic, v)) / denom)
            .collect())
    }

    /// Smoothed topic distribution of one training document,
    /// `(n_dk + alpha_k) / (|d| + alpha_sum)`.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared or the id is unknown.
    pub fn doc_topic_distribution(&self, doc_id: usize) -> Result<Vec<f64>> {
        self.require_prepared()?;
        let doc = self.docs.get(doc_id).ok_or_else(|| {
            TematicaError::Other(format!("document id {doc_id} out of bounds"))
        })?;
        let alpha_sum: f64 = self.alpha.iter().sum();
        let denom = doc.total_weight() + alpha_sum;
        Ok(doc
            .topic_counts
            .iter()
            .zip(self.alpha.iter())
            .map(|(&c, &a)| (c + a) / denom)
            .collect())
    }

    /// Number of tokens currently assigned to each topic.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared.
    pub fn count_by_topic(&self) -> Result<Vec<usize>> {
        self.require_prepared()?;
        let mut counts = vec![0usize; self.num_topics];
        for doc in &self.docs {
            for &t in &doc.topics {
                counts[t as usize] += 1;
            }
        }
        Ok(counts)
    }

    /// Top `n` words per topic with their smoothed probabilities.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared.
    pub fn top_words(&self, n: usize) -> Result<Vec<Vec<(String, f64)>>> {
        self.require_prepared()?;
        let mut result = Vec::with_capacity(self.num_topics);
        for topic in 0..self.num_topics {
            let dist = self.topic_word_distribution(topic)?;
            let mut scored: Vec<(String, f64)> = dist
                .into_iter()
                .enumerate()
                .map(|(v, p)| (self.vocab.word(v as u32).to_string(), p))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(n);
            result.push(scored);
        }
        Ok(result)
    }

    /// Build an inference document against the frozen vocabulary.
    ///
    /// Unknown tokens are skipped (recorded on the document and logged),
    /// never fatal; the effective length is what remains.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared.
    pub fn make_doc(&self, tokens: &[&str]) -> Result<Document> {
        self.require_prepared()?;
        let mut ids = Vec::with_capacity(tokens.len());
        let mut skipped = 0;
        for token in tokens {
            match self.vocab.id(token) {
                Some(id) => ids.push(id),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("skipped {skipped} unknown token(s) while building inference document");
        }
        let mut doc = Document::new(ids, skipped);
        doc.sort_words();
        corpus::apply_token_weights(self.term_weight, &mut doc, &self.vocab_weights);
        doc.init_counts(self.num_topics);
        Ok(doc)
    }

    fn init_inference_doc(
        &self,
        doc: &mut Document,
        state: &mut ModelState,
        rng: &mut StdRng,
    ) -> Result<()> {
        doc.topic_counts.iter_mut().for_each(|c| *c = 0.0);
        for pos in 0..doc.words.len() {
            let v = doc.words[pos];
            let k = match self.eta_prior.init_column(v) {
                Some(column) => sample_from_weights(column, rng)?,
                None => rng.gen_range(0..self.num_topics),
            };
            doc.topics[pos] = k as u32;
            doc.topic_counts[k] += doc.weights[pos];
            state.add(k, v, doc.weights[pos]);
            state.add_total(k, doc.weights[pos]);
        }
        Ok(())
    }

    fn infer_one(
        &self,
        doc_index: usize,
        doc: &mut Document,
        iterations: usize,
        base_rest: f64,
    ) -> Result<f64> {
        let mut perturbed = self.state.clone();
        let mut rng = StdRng::seed_from_u64(
            self.seed ^ (doc_index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
        self.init_inference_doc(doc, &mut perturbed, &mut rng)?;
        let mut probs = vec![0.0; self.num_topics];
        let mut alpha_buf = vec![0.0; self.num_topics];
        self.prior.doc_alpha(doc_index, &self.alpha, &mut alpha_buf);
        for _ in 0..iterations {
            let len = doc.words.len();
            let mut view = ExclusiveState {
                state: &mut perturbed,
            };
            sample_document(
                doc,
                0..len,
                &mut view,
                &alpha_buf,
                &self.eta_prior,
                &mut probs,
                &mut rng,
            )?;
        }
        Ok(self.ll_rest(&perturbed) - base_rest + self.ll_docs(std::iter::once(&*doc)))
    }

    /// Run Gibbs inference over unseen documents against a private copy
    /// of the trained statistics; the trained model is never mutated.
    ///
    /// Returns one log-likelihood change per document, or a single pooled
    /// value when [`InferenceOptions::together`] is set.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared or sampling hits a
    /// consistency error.
    pub fn infer(&self, docs: &mut [Document], options: &InferenceOptions) -> Result<Vec<f64>> {
        self.require_prepared()?;
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let base_rest = self.ll_rest(&self.state);

        if options.together {
            let mut perturbed = self.state.clone();
            let mut rng = StdRng::seed_from_u64(self.seed ^ 0x9E37_79B9_7F4A_7C15);
            for doc in docs.iter_mut() {
                self.init_inference_doc(doc, &mut perturbed, &mut rng)?;
            }
            let mut probs = vec![0.0; self.num_topics];
            let mut alpha_buf = vec![0.0; self.num_topics];
            for _ in 0..options.iterations {
                for (doc_index, doc) in docs.iter_mut().enumerate() {
                    self.prior.doc_alpha(doc_index, &self.alpha, &mut alpha_buf);
                    let len = doc.words.len();
                    let mut view = ExclusiveState {
                        state: &mut perturbed,
                    };
                    sample_document(
                        doc,
                        0..len,
                        &mut view,
                        &alpha_buf,
                        &self.eta_prior,
                        &mut probs,
                        &mut rng,
                    )?;
                }
            }
            let ll = self.ll_rest(&perturbed) - base_rest + self.ll_docs(docs.iter());
            return Ok(vec![ll]);
        }

        let workers = options.workers.min(docs.len()).max(1);
        if workers == 1 {
            docs.iter_mut()
                .enumerate()
                .map(|(i, doc)| self.infer_one(i, doc, options.iterations, base_rest))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| {
                    TematicaError::Other(format!("failed to build inference pool: {e}"))
                })?;
            pool.install(|| {
                docs.par_iter_mut()
                    .enumerate()
                    .map(|(i, doc)| self.infer_one(i, doc, options.iterations, base_rest))
                    .collect()
            })
        }
    }

    /// Snapshot everything a persistence layer needs to rebuild the model.
    ///
    /// # Errors
    ///
    /// Fails when the model is not prepared.
    pub fn snapshot(&self) -> Result<ModelSnapshot> {
        self.require_prepared()?;
        Ok(ModelSnapshot {
            num_topics: self.num_topics,
            alpha: self.alpha.clone(),
            eta: self.eta,
            term_weight: self.term_weight,
            burn_in: self.burn_in,
            optim_interval: self.optim_interval,
            seed: self.seed,
            iterated: self.iterated,
            vocab: self.vocab.clone(),
            word_priors: self.word_priors.clone(),
            vocab_weights: self.vocab_weights.clone(),
            state: self.state.clone(),
            docs: self.docs.clone(),
        })
    }

    /// Rebuild a model from a snapshot, revalidating invariants. Training
    /// can resume where the snapshot left off.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot's dimensions or statistics are inconsistent.
    pub fn restore(snapshot: ModelSnapshot) -> Result<Self> {
        let ModelSnapshot {
            num_topics,
            alpha,
            eta,
            term_weight,
            burn_in,
            optim_interval,
            seed,
            iterated,
            vocab,
            word_priors,
            vocab_weights,
            state,
            docs,
        } = snapshot;

        if num_topics == 0 || alpha.len() != num_topics {
            return Err(TematicaError::DimensionMismatch {
                expected: format!("alpha length K={num_topics}"),
                actual: format!("{}", alpha.len()),
            });
        }
        if alpha.iter().any(|&a| !(a > 0.0) || !a.is_finite()) {
            return Err(TematicaError::Serialization(
                "snapshot alpha must be strictly positive".to_string(),
            ));
        }
        if !(eta > 0.0) || !eta.is_finite() {
            return Err(TematicaError::Serialization(
                "snapshot eta must be strictly positive".to_string(),
            ));
        }
        if state.num_topics() != num_topics || state.vocab_size() != vocab.len() {
            return Err(TematicaError::DimensionMismatch {
                expected: format!("state {num_topics}x{}", vocab.len()),
                actual: format!("{}x{}", state.num_topics(), state.vocab_size()),
            });
        }
        state.validate()?;
        for (doc_id, doc) in docs.iter().enumerate() {
            if doc.topic_counts.len() != num_topics
                || doc.topics.len() != doc.words.len()
                || doc.topics.iter().any(|&t| t as usize >= num_topics)
            {
                return Err(TematicaError::Serialization(format!(
                    "snapshot document {doc_id} has inconsistent topic data"
                )));
            }
        }

        let vocab_size = vocab.len();
        let vocab_freq = corpus::corpus_frequencies(&docs, vocab_size);
        let eta_prior = if word_priors.is_empty() {
            EtaPrior::symmetric(eta, vocab_size)
        } else {
            let entries = word_priors
                .iter()
                .filter_map(|(word, priors)| vocab.id(word).map(|v| (v, priors.as_slice())));
            EtaPrior::by_word(eta, num_topics, vocab_size, entries)
        };

        let mut model = Self {
            num_topics,
            alpha,
            eta,
            term_weight,
            burn_in,
            optim_interval,
            seed,
            vocab,
            word_priors,
            docs,
            state,
            eta_prior,
            vocab_weights,
            vocab_freq,
            prior: Box::new(DefaultPrior),
            rng: StdRng::seed_from_u64(seed.wrapping_add(iterated as u64)),
            iterated,
            prepared: true,
            workers: None,
            recovery: None,
        };
        model.capture_recovery();
        Ok(model)
    }
}

#[cfg(test)]
mod tests;

//! Concurrent execution schemes and the merge protocol.
//!
//! A training sweep runs under one of three schemes:
//!
//! - [`ParallelScheme::Sequential`]: one worker mutates the authoritative
//!   state directly.
//! - [`ParallelScheme::Partition`]: the vocabulary is split into
//!   frequency-balanced chunks, one per worker. A sweep is `P` staggered
//!   rounds; in each round a worker exclusively holds one document class
//!   and its own chunk of the topic-word table, while the per-topic
//!   totals are shared and updated with atomic adds.
//! - [`ParallelScheme::CopyMerge`]: every worker samples a disjoint
//!   document subset against a full private copy of the state with no
//!   synchronization at all; the copies drift during the sweep and are
//!   reconciled additively afterwards, clamping any overlap that drove a
//!   count negative.
//!
//! The sweep is a barrier: all workers finish before merge starts, and
//! merge finishes before the next sweep or optimizer pass.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::corpus::Document;
use crate::error::{Result, TematicaError};
use crate::prior::{EtaPrior, PriorProvider};
use crate::sampler::{sample_document, ExclusiveState, SamplerState};
use crate::state::ModelState;

/// How a training sweep is spread across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelScheme {
    /// Single worker, authoritative state, bitwise reproducible.
    Sequential,
    /// Vocabulary-partitioned workers with staggered document rounds.
    Partition,
    /// Private state copies per worker, reconciled after the sweep.
    CopyMerge,
}

/// Partitioning finer than this many distinct words per chunk degenerates.
const MIN_WORDS_PER_CHUNK: usize = 4;

/// Spawning more copy-merge workers than half the corpus degenerates.
const MIN_DOCS_PER_SHARD: usize = 2;

/// Cap a requested worker count to what the scheme can sensibly use.
///
/// Unreasonable requests are silently capped rather than rejected.
pub(crate) fn effective_workers(
    scheme: ParallelScheme,
    requested: usize,
    vocab_size: usize,
    num_docs: usize,
) -> usize {
    let cap = match scheme {
        ParallelScheme::Sequential => 1,
        ParallelScheme::Partition => vocab_size / MIN_WORDS_PER_CHUNK,
        ParallelScheme::CopyMerge => num_docs / MIN_DOCS_PER_SHARD,
    };
    requested.min(cap).max(1)
}

/// An `f64` cell updated with compare-exchange adds, for the shared
/// topic totals of the partitioned scheme.
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn add(&self, w: f64) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + w).to_bits();
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

/// A worker's view under the partitioned scheme: exclusive chunk of the
/// topic-word table plus the shared atomic totals.
pub(crate) struct ChunkState<'a> {
    /// First vocabulary id of the chunk.
    pub begin: u32,
    pub num_topics: usize,
    /// Word-major slice covering `[begin, end)`.
    pub chunk: &'a mut [f64],
    pub totals: &'a [AtomicF64],
}

impl SamplerState for ChunkState<'_> {
    #[inline]
    fn count(&self, k: usize, v: u32) -> f64 {
        self.chunk[(v - self.begin) as usize * self.num_topics + k]
    }

    #[inline]
    fn add(&mut self, k: usize, v: u32, w: f64) {
        self.chunk[(v - self.begin) as usize * self.num_topics + k] += w;
    }

    #[inline]
    fn total(&self, k: usize) -> f64 {
        self.totals[k].load()
    }

    #[inline]
    fn add_total(&mut self, k: usize, w: f64) {
        self.totals[k].add(w);
    }
}

/// Vocabulary split for the partitioned scheme.
///
/// Chunk boundaries balance total token occurrence counts, not raw id
/// counts; `doc_breaks` caches, per document, where its sorted token ids
/// cross each boundary. Rebuilt when the worker count changes, persistent
/// otherwise.
#[derive(Debug, Clone)]
pub struct PartitionPlan {
    /// Exclusive end id per chunk; the last entry equals V.
    bounds: Vec<u32>,
    /// Per document: `chunks + 1` token-index boundaries.
    doc_breaks: Vec<Vec<u32>>,
}

impl PartitionPlan {
    pub(crate) fn build(chunks: usize, vocab_freq: &[u64], docs: &[Document]) -> Self {
        let vocab_size = vocab_freq.len() as u32;
        let total: u64 = vocab_freq.iter().sum();
        let mut bounds: Vec<u32> = Vec::with_capacity(chunks);
        let mut cum = 0u64;
        for (i, &f) in vocab_freq.iter().enumerate() {
            cum += f;
            if bounds.len() < chunks && cum * chunks as u64 >= total * (bounds.len() as u64 + 1)
            {
                bounds.push(i as u32 + 1);
            }
        }
        while bounds.len() < chunks {
            bounds.push(vocab_size);
        }
        if let Some(last) = bounds.last_mut() {
            *last = vocab_size;
        }

        let doc_breaks = docs
            .iter()
            .map(|doc| {
                let mut breaks = Vec::with_capacity(chunks + 1);
                breaks.push(0u32);
                let mut g = 0;
                for (j, &w) in doc.words.iter().enumerate() {
                    while g < chunks && w >= bounds[g] {
                        breaks.push(j as u32);
                        g += 1;
                    }
                }
                while breaks.len() < chunks + 1 {
                    breaks.push(doc.words.len() as u32);
                }
                breaks
            })
            .collect();

        Self { bounds, doc_breaks }
    }

    /// Number of vocabulary chunks.
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.bounds.len()
    }

    /// Vocabulary range `[begin, end)` of chunk `p`.
    #[must_use]
    pub fn chunk_range(&self, p: usize) -> (u32, u32) {
        let begin = if p == 0 { 0 } else { self.bounds[p - 1] };
        (begin, self.bounds[p])
    }

    /// Token-index range of `doc` whose ids fall in chunk `p`.
    pub(crate) fn token_range(&self, p: usize, doc_id: usize) -> Range<usize> {
        let breaks = &self.doc_breaks[doc_id];
        breaks[p] as usize..breaks[p + 1] as usize
    }
}

/// A fixed-size worker pool reused across the whole training run, with
/// per-worker RNG streams and the scheme-specific scratch state.
pub(crate) struct WorkerSet {
    pub(crate) workers: usize,
    pool: rayon::ThreadPool,
    rngs: Vec<StdRng>,
    pub(crate) plan: Option<PartitionPlan>,
    locals: Vec<ModelState>,
}

impl WorkerSet {
    pub(crate) fn new(workers: usize, seed_rng: &mut StdRng) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| TematicaError::Other(format!("failed to build worker pool: {e}")))?;
        let rngs = (0..workers)
            .map(|_| StdRng::seed_from_u64(seed_rng.gen()))
            .collect();
        Ok(Self {
            workers,
            pool,
            rngs,
            plan: None,
            locals: Vec::new(),
        })
    }

    pub(crate) fn ensure_plan(&mut self, vocab_freq: &[u64], docs: &[Document]) {
        let rebuild = self
            .plan
            .as_ref()
            .map_or(true, |p| p.num_chunks() != self.workers);
        if rebuild {
            self.plan = Some(PartitionPlan::build(self.workers, vocab_freq, docs));
        }
    }
}

fn record_failure(slot: &Mutex<Option<TematicaError>>, err: TematicaError) {
    let mut guard = match slot.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    if guard.is_none() {
        *guard = Some(err);
    }
}

fn take_failure(slot: Mutex<Option<TematicaError>>) -> Result<()> {
    let inner = match slot.into_inner() {
        Ok(v) => v,
        Err(poisoned) => poisoned.into_inner(),
    };
    match inner {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// One full sequential sweep over all documents.
pub(crate) fn sweep_sequential(
    docs: &mut [Document],
    state: &mut ModelState,
    alpha: &[f64],
    eta: &EtaPrior,
    prior: &dyn PriorProvider,
    rng: &mut StdRng,
) -> Result<()> {
    let num_topics = state.num_topics();
    let mut probs = vec![0.0; num_topics];
    let mut alpha_buf = vec![0.0; num_topics];
    for (doc_id, doc) in docs.iter_mut().enumerate() {
        prior.doc_alpha(doc_id, alpha, &mut alpha_buf);
        let len = doc.words.len();
        let mut view = ExclusiveState { state: &mut *state };
        sample_document(doc, 0..len, &mut view, &alpha_buf, eta, &mut probs, rng)?;
    }
    Ok(())
}

/// One vocabulary-partitioned sweep: `P` staggered rounds, each a barrier.
///
/// In round `r`, worker `p` holds exactly the documents whose index is
/// congruent to `(r + p) mod P`, so a document's counters have a single
/// owner per round and ownership moves between workers only across round
/// barriers. Topic totals are genuinely concurrent and go through
/// [`AtomicF64`]. The merge is implicit for the table (workers write
/// their authoritative chunk slices in place); totals are recomputed as
/// row sums afterwards, which also refreshes every worker's view for the
/// next sweep.
pub(crate) fn sweep_partition(
    docs: &mut [Document],
    state: &mut ModelState,
    alpha: &[f64],
    eta: &EtaPrior,
    prior: &dyn PriorProvider,
    ws: &mut WorkerSet,
) -> Result<()> {
    let WorkerSet {
        workers,
        ref pool,
        ref mut rngs,
        ref plan,
        ..
    } = *ws;
    let plan = plan
        .as_ref()
        .ok_or_else(|| TematicaError::Other("partition plan was not built".to_string()))?;
    let num_topics = state.num_topics();

    let totals: Vec<AtomicF64> = state
        .topic_totals
        .iter()
        .map(|&t| AtomicF64::new(t))
        .collect();
    let failure: Mutex<Option<TematicaError>> = Mutex::new(None);

    for round in 0..workers {
        let mut chunks: Vec<(u32, &mut [f64])> = Vec::with_capacity(workers);
        {
            let mut rest: &mut [f64] = state.topic_word.as_mut_slice();
            let mut begin = 0u32;
            for p in 0..workers {
                let (chunk_begin, chunk_end) = plan.chunk_range(p);
                debug_assert_eq!(chunk_begin, begin);
                let (head, tail) = rest.split_at_mut((chunk_end - begin) as usize * num_topics);
                chunks.push((begin, head));
                rest = tail;
                begin = chunk_end;
            }
        }

        let mut buckets: Vec<Vec<(usize, &mut Document)>> =
            (0..workers).map(|_| Vec::new()).collect();
        for (doc_id, doc) in docs.iter_mut().enumerate() {
            let class = doc_id % workers;
            let p = (class + workers - round) % workers;
            buckets[p].push((doc_id, doc));
        }

        let totals_ref: &[AtomicF64] = &totals;
        let failure_ref = &failure;
        pool.scope(|s| {
            for (p, (((begin, chunk), bucket), rng)) in chunks
                .into_iter()
                .zip(buckets.into_iter())
                .zip(rngs.iter_mut())
                .enumerate()
            {
                s.spawn(move |_| {
                    let mut view = ChunkState {
                        begin,
                        num_topics,
                        chunk,
                        totals: totals_ref,
                    };
                    let mut probs = vec![0.0; num_topics];
                    let mut alpha_buf = vec![0.0; num_topics];
                    for (doc_id, doc) in bucket {
                        prior.doc_alpha(doc_id, alpha, &mut alpha_buf);
                        let range = plan.token_range(p, doc_id);
                        if let Err(err) = sample_document(
                            doc,
                            range,
                            &mut view,
                            &alpha_buf,
                            eta,
                            &mut probs,
                            rng,
                        ) {
                            record_failure(failure_ref, err);
                            return;
                        }
                    }
                });
            }
        });
    }

    take_failure(failure)?;
    state.recompute_totals();
    Ok(())
}

/// One copy-and-merge sweep: workers sample private full copies, then the
/// deltas against the pre-sweep base are combined and clamped.
pub(crate) fn sweep_copy_merge(
    docs: &mut [Document],
    state: &mut ModelState,
    alpha: &[f64],
    eta: &EtaPrior,
    prior: &dyn PriorProvider,
    ws: &mut WorkerSet,
) -> Result<()> {
    let WorkerSet {
        workers,
        ref pool,
        ref mut rngs,
        ref mut locals,
        ..
    } = *ws;
    let num_topics = state.num_topics();

    if locals.len() != workers {
        *locals = vec![ModelState::new(num_topics, state.vocab_size()); workers];
    }
    for local in locals.iter_mut() {
        local.clone_from(state);
    }

    let mut buckets: Vec<Vec<(usize, &mut Document)>> =
        (0..workers).map(|_| Vec::new()).collect();
    for (doc_id, doc) in docs.iter_mut().enumerate() {
        buckets[doc_id % workers].push((doc_id, doc));
    }

    let failure: Mutex<Option<TematicaError>> = Mutex::new(None);
    let failure_ref = &failure;
    pool.scope(|s| {
        for ((local, bucket), rng) in locals
            .iter_mut()
            .zip(buckets.into_iter())
            .zip(rngs.iter_mut())
        {
            s.spawn(move |_| {
                let mut view = ExclusiveState { state: local };
                let mut probs = vec![0.0; num_topics];
                let mut alpha_buf = vec![0.0; num_topics];
                for (doc_id, doc) in bucket {
                    prior.doc_alpha(doc_id, alpha, &mut alpha_buf);
                    let len = doc.words.len();
                    if let Err(err) =
                        sample_document(doc, 0..len, &mut view, &alpha_buf, eta, &mut probs, rng)
                    {
                        record_failure(failure_ref, err);
                        return;
                    }
                }
            });
        }
    });

    take_failure(failure)?;
    merge_copy(state, locals);
    Ok(())
}

/// Fold the workers' private copies back into the shared state.
///
/// `global` must still hold the pre-sweep base. The merged table is
/// `local[0] + sum_{i>0}(local[i] - base)`; overlapping deltas can drive
/// an entry below zero, so every entry is clamped before the totals are
/// recomputed as row sums.
pub(crate) fn merge_copy(global: &mut ModelState, locals: &[ModelState]) {
    let (first, rest) = match locals.split_first() {
        Some(split) => split,
        None => return,
    };
    for (idx, slot) in global.topic_word.iter_mut().enumerate() {
        let base = *slot;
        let mut merged = first.topic_word[idx];
        for local in rest {
            merged += local.topic_word[idx] - base;
        }
        *slot = if merged < 0.0 { 0.0 } else { merged };
    }
    global.recompute_totals();
}

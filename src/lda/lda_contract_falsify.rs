//! LDA Engine Contract Falsification Tests
//!
//! Popperian falsification of the sampling-engine contracts:
//!   - Sufficient statistics stay exactly consistent under every scheme
//!   - Topic assignments never leave [0, K)
//!   - Sequential runs are bitwise reproducible for a fixed seed
//!   - Merged counts are non-negative after the copy-merge clamp
//!   - Concentration parameters stay strictly positive through optimization
//!   - Inference never mutates the trained statistics
//!   - Perplexity is exp(-ll/weight), finite and positive

use super::*;

fn assert_statistics_consistent(model: &LdaModel) {
    let snapshot = model.snapshot().expect("model is prepared");
    let k_count = snapshot.state.num_topics();

    for k in 0..k_count {
        let row: f64 = (0..snapshot.state.vocab_size())
            .map(|v| snapshot.state.count(k, v as u32))
            .sum();
        assert!(
            (row - snapshot.state.total(k)).abs() < 1e-6,
            "FALSIFIED: topic {k} total {} != row sum {row}",
            snapshot.state.total(k)
        );
        assert!(
            snapshot.state.total(k) >= -1e-9,
            "FALSIFIED: topic {k} total is negative"
        );
    }

    // Rebuild the table from the document assignments; it must agree.
    let mut rebuilt = crate::state::ModelState::new(k_count, snapshot.state.vocab_size());
    for doc in &snapshot.docs {
        let weight_sum: f64 = doc.weights.iter().sum();
        assert!(
            (weight_sum - doc.total_weight).abs() < 1e-9,
            "FALSIFIED: cached document weight drifted"
        );
        let counts_sum: f64 = doc.topic_counts.iter().sum();
        assert!(
            (counts_sum - doc.total_weight).abs() < 1e-9,
            "FALSIFIED: document topic counts do not sum to its weight"
        );
        for (pos, &t) in doc.topics.iter().enumerate() {
            assert!((t as usize) < k_count, "FALSIFIED: topic out of range");
            rebuilt.add(t as usize, doc.words[pos], doc.weights[pos]);
        }
    }
    for k in 0..k_count {
        for v in 0..snapshot.state.vocab_size() {
            let expected = rebuilt.count(k, v as u32);
            let actual = snapshot.state.count(k, v as u32);
            assert!(
                (expected - actual).abs() < 1e-6,
                "FALSIFIED: count(topic {k}, word {v}) is {actual}, assignments say {expected}"
            );
        }
    }
}

// ============================================================================
// FALSIFY-LDA-001: statistics consistency under every execution scheme
// ============================================================================

#[test]
fn falsify_lda_001_sequential_statistics_consistent() {
    let mut model = tiny_model(101);
    model
        .train(25, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    assert_statistics_consistent(&model);
}

#[test]
fn falsify_lda_001_partition_statistics_consistent() {
    let mut model = two_group_model(103);
    model
        .train(25, 2, ParallelScheme::Partition)
        .expect("training should succeed");
    assert_statistics_consistent(&model);
}

#[test]
fn falsify_lda_001_copy_merge_statistics_consistent() {
    let mut model = two_group_model(107);
    model
        .train(25, 3, ParallelScheme::CopyMerge)
        .expect("training should succeed");
    assert_statistics_consistent(&model);
}

// ============================================================================
// FALSIFY-LDA-002: sequential determinism
// ============================================================================

#[test]
fn falsify_lda_002_sequential_bitwise_reproducible() {
    let run = || {
        let mut model = two_group_model(109);
        model
            .train(30, 1, ParallelScheme::Sequential)
            .expect("training should succeed");
        let snapshot = model.snapshot().expect("model is prepared");
        (
            snapshot.docs.iter().map(|d| d.topics.clone()).collect::<Vec<_>>(),
            snapshot.alpha,
        )
    };
    let (topics_a, alpha_a) = run();
    let (topics_b, alpha_b) = run();
    assert_eq!(topics_a, topics_b, "FALSIFIED: assignments diverged");
    assert_eq!(alpha_a, alpha_b, "FALSIFIED: alphas diverged");
}

// ============================================================================
// FALSIFY-LDA-003: optimizer positivity
// ============================================================================

#[test]
fn falsify_lda_003_alpha_stays_positive_through_optimization() {
    let mut model = two_group_model(113).with_optim_interval(5);
    model
        .train(50, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    for (k, &a) in model.alpha().iter().enumerate() {
        assert!(
            a > 0.0 && a.is_finite(),
            "FALSIFIED: alpha[{k}] = {a} left the positive reals"
        );
    }
}

// ============================================================================
// FALSIFY-LDA-004: inference is read-only on the trained model
// ============================================================================

#[test]
fn falsify_lda_004_inference_leaves_model_bitwise_unchanged() {
    let mut model = two_group_model(127);
    model
        .train(30, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    let before = model.snapshot().expect("model is prepared");

    let mut unseen = vec![
        model.make_doc(&["w0", "w1"]).expect("tokens are known"),
        model.make_doc(&["w5", "w6", "w7"]).expect("tokens are known"),
    ];
    model
        .infer(&mut unseen, &InferenceOptions::default())
        .expect("inference should succeed");

    let after = model.snapshot().expect("model is prepared");
    for k in 0..before.state.num_topics() {
        assert_eq!(before.state.total(k), after.state.total(k));
        for v in 0..before.state.vocab_size() {
            assert_eq!(
                before.state.count(k, v as u32),
                after.state.count(k, v as u32),
                "FALSIFIED: inference touched count(topic {k}, word {v})"
            );
        }
    }
    assert_eq!(before.iterated, after.iterated);
}

// ============================================================================
// FALSIFY-LDA-005: perplexity definition and finiteness
// ============================================================================

#[test]
fn falsify_lda_005_perplexity_is_exp_of_negative_llpw() {
    let mut model = tiny_model(131);
    model
        .train(20, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    let llpw = model.log_likelihood_per_word().expect("llpw is defined");
    let perplexity = model.perplexity().expect("perplexity is defined");
    assert!(perplexity.is_finite() && perplexity > 0.0);
    assert!(
        ((-llpw).exp() - perplexity).abs() < 1e-9,
        "FALSIFIED: perplexity {perplexity} != exp(-{llpw})"
    );
}

// ============================================================================
// FALSIFY-LDA-006: weighted schemes keep the invariants too
// ============================================================================

#[test]
fn falsify_lda_006_idf_weighted_training_consistent() {
    let mut model = LdaModel::new(2, 0.1, 0.01)
        .expect("hyperparameters are valid")
        .with_seed(137)
        .with_term_weight(TermWeight::Idf);
    // Two word groups so the document frequencies stay below the corpus
    // size and the idf weights stay strictly positive.
    for d in 0..8 {
        let group = (d % 2) * 4;
        let tokens: Vec<String> = (0..6).map(|j| format!("w{}", group + (d + j) % 4)).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        model.add_document(&refs).expect("corpus is open");
    }
    model
        .train(20, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    assert_statistics_consistent(&model);
    assert!(model.perplexity().expect("perplexity is defined").is_finite());
}

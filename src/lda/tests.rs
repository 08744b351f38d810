pub(crate) use super::*;

/// The 3-document corpus used throughout: "a b a c", "b b c", "a c c".
pub(crate) fn tiny_model(seed: u64) -> LdaModel {
    let mut model = LdaModel::new(2, 0.1, 0.01)
        .expect("hyperparameters are valid")
        .with_seed(seed);
    model
        .add_document(&["a", "b", "a", "c"])
        .expect("corpus is open");
    model.add_document(&["b", "b", "c"]).expect("corpus is open");
    model.add_document(&["a", "c", "c"]).expect("corpus is open");
    model
}

/// 24 documents drawn from two disjoint word groups of four words each.
pub(crate) fn two_group_model(seed: u64) -> LdaModel {
    let mut model = LdaModel::new(2, 0.1, 0.01)
        .expect("hyperparameters are valid")
        .with_seed(seed);
    for d in 0..24 {
        let group = (d % 2) * 4;
        let tokens: Vec<String> = (0..12).map(|j| format!("w{}", group + (d + j) % 4)).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        model.add_document(&refs).expect("corpus is open");
    }
    model
}

#[test]
fn test_new_rejects_zero_topics() {
    let err = LdaModel::new(0, 0.1, 0.01).unwrap_err();
    assert!(err.to_string().contains("num_topics"));
}

#[test]
fn test_new_rejects_non_positive_alpha() {
    assert!(LdaModel::new(2, 0.0, 0.01).is_err());
    assert!(LdaModel::new(2, -0.5, 0.01).is_err());
    assert!(LdaModel::new(2, f64::NAN, 0.01).is_err());
}

#[test]
fn test_new_rejects_non_positive_eta() {
    assert!(LdaModel::new(2, 0.1, 0.0).is_err());
    assert!(LdaModel::new(2, 0.1, -0.01).is_err());
}

#[test]
fn test_add_document_after_prepare_fails() {
    let mut model = tiny_model(1);
    model.prepare().expect("prepare should succeed");
    let err = model.add_document(&["a"]).unwrap_err();
    assert!(err.to_string().contains("prepared"));
}

#[test]
fn test_prepare_rejects_empty_corpus() {
    let mut model = LdaModel::new(2, 0.1, 0.01).expect("hyperparameters are valid");
    assert!(model.prepare().is_err());
}

#[test]
fn test_set_word_prior_validation() {
    let mut model = tiny_model(1);
    // wrong length
    assert!(model.set_word_prior("a", &[0.5]).is_err());
    // negative entry
    assert!(model.set_word_prior("a", &[0.5, -0.1]).is_err());
    // zero mass
    assert!(model.set_word_prior("a", &[0.0, 0.0]).is_err());
    // valid
    model
        .set_word_prior("a", &[0.9, 0.1])
        .expect("prior is valid");
    model.prepare().expect("prepare should succeed");
    assert!(model.set_word_prior("b", &[0.5, 0.5]).is_err());
}

#[test]
fn test_queries_before_prepare_fail() {
    let model = tiny_model(1);
    assert!(model.log_likelihood().is_err());
    assert!(model.perplexity().is_err());
    assert!(model.top_words(2).is_err());
    assert!(model.doc_topic_distribution(0).is_err());
    assert!(model.make_doc(&["a"]).is_err());
    assert!(model.snapshot().is_err());
}

#[test]
fn test_end_to_end_perplexity_improves_over_sequential_sweeps() {
    let mut model = tiny_model(42);
    model.prepare().expect("prepare should succeed");
    let initial = model.perplexity().expect("perplexity after prepare");
    assert!(initial.is_finite());

    let mut trajectory = Vec::with_capacity(100);
    for _ in 0..100 {
        model
            .train(1, 1, ParallelScheme::Sequential)
            .expect("training should succeed");
        let p = model.perplexity().expect("perplexity is defined");
        assert!(p.is_finite() && p > 0.0);
        trajectory.push(p);
    }

    // Decreasing on average over the first 50 sweeps relative to the
    // random initialization.
    let early: f64 = trajectory[..50].iter().sum::<f64>() / 50.0;
    assert!(early < initial, "mean {early} should beat initial {initial}");

    // Every token carries a topic in {0, 1}.
    for d in 0..model.num_docs() {
        for &t in model.doc(d).expect("doc exists").topics() {
            assert!(t < 2);
        }
    }
    assert_eq!(model.iterated(), 100);
}

#[test]
fn test_sequential_runs_are_bitwise_identical() {
    let run = |seed| {
        let mut model = tiny_model(seed);
        model
            .train(40, 1, ParallelScheme::Sequential)
            .expect("training should succeed");
        (0..model.num_docs())
            .map(|d| model.doc(d).expect("doc exists").topics().to_vec())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(7), run(7));
    // A different seed is allowed to differ (and virtually always does
    // somewhere over 40 sweeps of 10 tokens).
    let _ = run(8);
}

#[test]
fn test_scheme_equivalence_sequential_vs_partition() {
    // Tunable, not a hard guarantee: the copy-merge/partition clamp bias
    // is uncharacterized, so the bound is deliberately loose.
    const TOLERANCE: f64 = 0.5;

    let mut sequential = two_group_model(3);
    sequential
        .train(150, 1, ParallelScheme::Sequential)
        .expect("training should succeed");

    let mut partitioned = two_group_model(3);
    partitioned
        .train(150, 2, ParallelScheme::Partition)
        .expect("training should succeed");

    let a = sequential
        .log_likelihood_per_word()
        .expect("llpw is defined");
    let b = partitioned
        .log_likelihood_per_word()
        .expect("llpw is defined");
    assert!(a.is_finite() && b.is_finite());
    assert!((a - b).abs() < TOLERANCE, "llpw diverged: {a} vs {b}");
}

#[test]
fn test_copy_merge_training_stays_consistent() {
    let mut model = two_group_model(9);
    model
        .train(60, 4, ParallelScheme::CopyMerge)
        .expect("training should succeed");

    let snapshot = model.snapshot().expect("model is prepared");
    for k in 0..snapshot.state.num_topics() {
        let row: f64 = (0..snapshot.state.vocab_size())
            .map(|v| snapshot.state.count(k, v as u32))
            .sum();
        assert!((row - snapshot.state.total(k)).abs() < 1e-6);
        assert!(snapshot.state.total(k) >= 0.0);
    }
    assert!(model.perplexity().expect("perplexity is defined").is_finite());
}

#[test]
fn test_make_doc_skips_unknown_tokens() {
    let mut model = tiny_model(1);
    model.prepare().expect("prepare should succeed");
    let doc = model
        .make_doc(&["a", "zzz", "b", "qqq"])
        .expect("model is prepared");
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.skipped(), 2);
}

#[test]
fn test_inference_returns_one_value_and_leaves_training_state_alone() {
    let mut model = tiny_model(42);
    model
        .train(100, 1, ParallelScheme::Sequential)
        .expect("training should succeed");

    let before = model.snapshot().expect("model is prepared");
    let mut unseen = vec![model.make_doc(&["a", "b"]).expect("tokens are known")];
    let lls = model
        .infer(&mut unseen, &InferenceOptions::default())
        .expect("inference should succeed");

    assert_eq!(lls.len(), 1);
    assert!(lls[0].is_finite());
    for &t in unseen[0].topics() {
        assert!(t < 2);
    }

    let after = model.snapshot().expect("model is prepared");
    for k in 0..2 {
        assert_eq!(before.state.total(k), after.state.total(k));
        for v in 0..model.vocab_size() {
            assert_eq!(
                before.state.count(k, v as u32),
                after.state.count(k, v as u32)
            );
        }
    }
}

#[test]
fn test_doc_topic_distribution_is_a_distribution() {
    let mut model = tiny_model(5);
    model
        .train(10, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    for d in 0..model.num_docs() {
        let dist = model.doc_topic_distribution(d).expect("doc exists");
        assert_eq!(dist.len(), 2);
        let sum: f64 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(dist.iter().all(|&p| p > 0.0));
    }
    assert!(model.doc_topic_distribution(99).is_err());
}

#[test]
fn test_count_by_topic_accounts_for_every_token() {
    let mut model = tiny_model(5);
    model
        .train(10, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    let counts = model.count_by_topic().expect("model is prepared");
    assert_eq!(counts.iter().sum::<usize>(), model.num_words());
}

#[test]
fn test_top_words_shape_and_ordering() {
    let mut model = tiny_model(5);
    model
        .train(10, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    let top = model.top_words(2).expect("model is prepared");
    assert_eq!(top.len(), 2);
    for words in &top {
        assert_eq!(words.len(), 2);
        assert!(words[0].1 >= words[1].1);
    }
}

#[path = "lda_contract_falsify.rs"]
mod lda_contract_falsify;
#[path = "tests_part_02.rs"]
mod tests_part_02;

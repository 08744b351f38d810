use super::*;

#[test]
fn test_word_prior_resolves_against_dense_table_after_prepare() {
    let mut model = tiny_model(11);
    model
        .set_word_prior("a", &[0.9, 0.1])
        .expect("prior is valid");
    assert_eq!(model.word_prior("a"), Some(vec![0.9, 0.1]));

    model.prepare().expect("prepare should succeed");
    assert_eq!(model.word_prior("a"), Some(vec![0.9, 0.1]));
    // Unregistered words fall back to the scalar eta column.
    assert_eq!(model.word_prior("b"), Some(vec![0.01, 0.01]));
    assert_eq!(model.word_prior("zzz"), None);
}

#[test]
fn test_zero_prior_entry_locks_word_out_of_topic() {
    // With eta(1, "a") = 0 the word "a" can never enter topic 1: its
    // initial draw comes from the prior column and the sampling mass for
    // topic 1 stays zero afterwards.
    let mut model = tiny_model(13);
    model
        .set_word_prior("a", &[0.7, 0.0])
        .expect("prior is valid");
    model
        .train(50, 1, ParallelScheme::Sequential)
        .expect("training should succeed");

    let a_id = 0; // "a" was interned first
    for d in 0..model.num_docs() {
        let doc = model.doc(d).expect("doc exists");
        for (pos, &w) in doc.words().iter().enumerate() {
            if w == a_id {
                assert_eq!(doc.topics()[pos], 0, "word 'a' leaked into topic 1");
            }
        }
    }
}

#[test]
fn test_burn_in_defers_alpha_optimization() {
    let mut deferred = tiny_model(17).with_burn_in(1000);
    deferred
        .train(30, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    assert_eq!(deferred.alpha(), &[0.1, 0.1]);

    let mut disabled = tiny_model(17).with_optim_interval(0);
    disabled
        .train(30, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    assert_eq!(disabled.alpha(), &[0.1, 0.1]);

    let mut active = tiny_model(17);
    active
        .train(30, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    // Re-estimation ran at sweeps 10, 20, 30 and must keep positivity.
    assert!(active.alpha().iter().all(|&a| a > 0.0 && a.is_finite()));
}

#[test]
fn test_unreasonable_worker_counts_are_capped_silently() {
    // 6 distinct words cannot feed 64 partitions, and 3 documents cannot
    // feed 64 copy-merge shards; both must cap (down to sequential here)
    // instead of failing.
    let mut model = tiny_model(19);
    model
        .train(5, 64, ParallelScheme::Partition)
        .expect("training should be capped, not fail");
    let mut model = tiny_model(19);
    model
        .train(5, 64, ParallelScheme::CopyMerge)
        .expect("training should be capped, not fail");
    assert_eq!(model.iterated(), 5);
}

#[test]
fn test_changing_worker_count_rebuilds_the_plan() {
    let mut model = two_group_model(23);
    model
        .train(10, 2, ParallelScheme::Partition)
        .expect("training should succeed");
    // vocab is 8 words, so 2 chunks both times; dropping to sequential
    // and back must still hold the invariants.
    model
        .train(10, 1, ParallelScheme::Partition)
        .expect("training should succeed");
    model
        .train(10, 2, ParallelScheme::Partition)
        .expect("training should succeed");

    let snapshot = model.snapshot().expect("model is prepared");
    for k in 0..2 {
        let row: f64 = (0..snapshot.state.vocab_size())
            .map(|v| snapshot.state.count(k, v as u32))
            .sum();
        assert!((row - snapshot.state.total(k)).abs() < 1e-6);
    }
}

#[test]
fn test_snapshot_round_trips_through_serde_and_resumes() {
    let mut model = two_group_model(29);
    model
        .train(40, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    let before = model.perplexity().expect("perplexity is defined");

    let encoded = serde_json::to_string(&model.snapshot().expect("model is prepared"))
        .expect("snapshot should encode");
    let decoded: ModelSnapshot =
        serde_json::from_str(&encoded).expect("snapshot should decode");
    let mut restored = LdaModel::restore(decoded).expect("snapshot is consistent");

    assert_eq!(restored.iterated(), 40);
    assert_eq!(restored.num_docs(), model.num_docs());
    let after = restored.perplexity().expect("perplexity is defined");
    assert!((before - after).abs() < 1e-9);

    // Training resumes from the restored counts.
    restored
        .train(10, 1, ParallelScheme::Sequential)
        .expect("training should resume");
    assert_eq!(restored.iterated(), 50);
}

#[test]
fn test_restore_rejects_inconsistent_snapshots() {
    let mut model = tiny_model(31);
    model
        .train(5, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    let snapshot = model.snapshot().expect("model is prepared");

    let mut bad = snapshot.clone();
    bad.alpha = vec![0.1]; // wrong length
    assert!(LdaModel::restore(bad).is_err());

    let mut bad = snapshot.clone();
    bad.alpha[0] = -1.0;
    assert!(LdaModel::restore(bad).is_err());

    let mut bad = snapshot.clone();
    bad.eta = 0.0;
    assert!(LdaModel::restore(bad).is_err());

    let mut bad = snapshot.clone();
    bad.docs[0].topics[0] = 99; // out of range
    assert!(LdaModel::restore(bad).is_err());

    let mut bad = snapshot;
    bad.state = crate::state::ModelState::new(3, 1); // wrong dims
    assert!(LdaModel::restore(bad).is_err());
}

#[test]
fn test_pooled_inference_returns_single_value() {
    let mut model = tiny_model(37);
    model
        .train(50, 1, ParallelScheme::Sequential)
        .expect("training should succeed");

    let mut unseen = vec![
        model.make_doc(&["a", "b"]).expect("tokens are known"),
        model.make_doc(&["c", "c", "b"]).expect("tokens are known"),
    ];
    let options = InferenceOptions {
        iterations: 30,
        together: true,
        ..InferenceOptions::default()
    };
    let lls = model.infer(&mut unseen, &options).expect("inference should succeed");
    assert_eq!(lls.len(), 1);
    assert!(lls[0].is_finite());
}

#[test]
fn test_parallel_inference_matches_serial_inference() {
    // Per-document RNG streams are derived from (seed, doc index), so
    // the worker count must not change the result.
    let mut model = two_group_model(41);
    model
        .train(50, 1, ParallelScheme::Sequential)
        .expect("training should succeed");

    let make_batch = |model: &LdaModel| {
        vec![
            model.make_doc(&["w0", "w1", "w2"]).expect("tokens are known"),
            model.make_doc(&["w4", "w5"]).expect("tokens are known"),
            model.make_doc(&["w0", "w7"]).expect("tokens are known"),
        ]
    };

    let mut serial_docs = make_batch(&model);
    let serial = model
        .infer(&mut serial_docs, &InferenceOptions::default())
        .expect("inference should succeed");

    let mut parallel_docs = make_batch(&model);
    let options = InferenceOptions {
        workers: 3,
        ..InferenceOptions::default()
    };
    let parallel = model
        .infer(&mut parallel_docs, &options)
        .expect("inference should succeed");

    assert_eq!(serial.len(), 3);
    assert_eq!(serial, parallel);
}

#[test]
fn test_inference_of_empty_document_is_finite() {
    let mut model = tiny_model(43);
    model
        .train(20, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    // Every token unknown: the document is effectively empty but not fatal.
    let mut unseen = vec![model.make_doc(&["xx", "yy"]).expect("model is prepared")];
    assert_eq!(unseen[0].len(), 0);
    assert_eq!(unseen[0].skipped(), 2);
    let lls = model
        .infer(&mut unseen, &InferenceOptions::default())
        .expect("inference should succeed");
    assert_eq!(lls.len(), 1);
    assert!(lls[0].is_finite());
}

#[test]
fn test_topics_in_source_order_follow_sorting_permutation() {
    let mut model = tiny_model(47);
    model
        .train(5, 1, ParallelScheme::Sequential)
        .expect("training should succeed");
    // doc 0 was added as "a b a c"; sorted storage is [a, a, b, c].
    let doc = model.doc(0).expect("doc exists");
    let source = doc.topics_in_source_order();
    assert_eq!(source.len(), 4);
    let sorted = doc.topics();
    // Multisets must match between the two orderings.
    let mut x = source.clone();
    let mut y = sorted.to_vec();
    x.sort_unstable();
    y.sort_unstable();
    assert_eq!(x, y);
}

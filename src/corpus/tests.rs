pub(crate) use super::*;

fn doc(words: &[u32]) -> Document {
    Document::new(words.to_vec(), 0)
}

#[test]
fn test_vocabulary_intern_is_idempotent() {
    let mut vocab = Vocabulary::new();
    let a = vocab.intern("apple");
    let b = vocab.intern("banana");
    assert_ne!(a, b);
    assert_eq!(vocab.intern("apple"), a);
    assert_eq!(vocab.len(), 2);
}

#[test]
fn test_vocabulary_lookup_round_trip() {
    let mut vocab = Vocabulary::new();
    for token in ["uno", "dos", "tres"] {
        let id = vocab.intern(token);
        assert_eq!(vocab.id(token), Some(id));
        assert_eq!(vocab.word(id), token);
    }
    assert_eq!(vocab.id("cuatro"), None);
}

#[test]
fn test_sort_words_preserves_multiset_and_order() {
    let mut d = doc(&[3, 0, 2, 0, 1]);
    d.sort_words();
    assert_eq!(d.words, vec![0, 0, 1, 2, 3]);

    // Assign a distinct topic per sorted position and check the
    // permutation carries them back to the source positions.
    d.init_counts(5);
    for (i, t) in d.topics.iter_mut().enumerate() {
        *t = i as u32;
    }
    let source = d.topics_in_source_order();
    // source token ids were [3, 0, 2, 0, 1]; sorted ids [0, 0, 1, 2, 3].
    assert_eq!(source.len(), 5);
    assert_eq!(source[0], 4); // id 3 is sorted position 4
    assert_eq!(source[2], 3); // id 2 is sorted position 3
    assert_eq!(source[4], 2); // id 1 is sorted position 2
    // The two id-0 tokens occupy sorted positions 0 and 1 in source order.
    let mut zeros = vec![source[1], source[3]];
    zeros.sort_unstable();
    assert_eq!(zeros, vec![0, 1]);
}

#[test]
fn test_document_frequencies_count_docs_not_tokens() {
    let docs = vec![doc(&[0, 0, 1]), doc(&[1, 2]), doc(&[2])];
    let df = document_frequencies(&docs, 3);
    assert_eq!(df, vec![1, 2, 2]);
}

#[test]
fn test_corpus_frequencies() {
    let docs = vec![doc(&[0, 0, 1]), doc(&[1, 2]), doc(&[2])];
    let cf = corpus_frequencies(&docs, 3);
    assert_eq!(cf, vec![2, 2, 2]);
}

#[test]
fn test_idf_weights() {
    let docs = vec![doc(&[0, 1]), doc(&[0])];
    let table = vocab_weights(TermWeight::Idf, &docs, 2);
    // word 0 appears in both docs: ln(2/2) = 0; word 1 in one: ln(2/1).
    assert!((table[0] - 0.0).abs() < 1e-12);
    assert!((table[1] - 2.0f64.ln()).abs() < 1e-12);

    let mut d = doc(&[0, 1]);
    apply_token_weights(TermWeight::Idf, &mut d, &table);
    assert!((d.weights[0] - 0.0).abs() < 1e-12);
    assert!((d.weights[1] - 2.0f64.ln()).abs() < 1e-12);
}

#[test]
fn test_idf_one_weights_average_toward_one() {
    let docs = vec![doc(&[0, 1]), doc(&[0])];
    let table = vocab_weights(TermWeight::IdfOne, &docs, 2);
    let mut d = doc(&[0, 1]);
    apply_token_weights(TermWeight::IdfOne, &mut d, &table);
    assert!((d.weights[0] - 0.5).abs() < 1e-12);
    assert!((d.weights[1] - (2.0f64.ln() + 1.0) / 2.0).abs() < 1e-12);
}

#[test]
fn test_pmi_weights_clamp_at_zero() {
    // Corpus: word 0 dominates; inside a doc made only of word 0 the
    // pmi is ln(1 / p(0)) which is positive, while a rare word spread
    // thin gets clamped at zero.
    let docs = vec![doc(&[0, 0, 0]), doc(&[0, 1])];
    let table = vocab_weights(TermWeight::Pmi, &docs, 2);
    assert!((table[0] - 0.8).abs() < 1e-12);
    assert!((table[1] - 0.2).abs() < 1e-12);

    let mut d = doc(&[0, 0, 0]);
    apply_token_weights(TermWeight::Pmi, &mut d, &table);
    // tf/p/len = 3 / 0.8 / 3 = 1.25 -> ln(1.25) > 0
    for w in &d.weights {
        assert!((*w - 1.25f64.ln()).abs() < 1e-12);
    }

    let mut d2 = doc(&[0, 1]);
    apply_token_weights(TermWeight::Pmi, &mut d2, &table);
    // word 0: 1 / 0.8 / 2 < 1 -> clamped to 0
    assert_eq!(d2.weights[0], 0.0);
    // word 1: 1 / 0.2 / 2 = 2.5
    assert!((d2.weights[1] - 2.5f64.ln()).abs() < 1e-12);
}

#[test]
fn test_one_weights_are_unit() {
    let mut d = doc(&[4, 4, 2]);
    d.weights = vec![0.5, 0.5, 0.5];
    apply_token_weights(TermWeight::One, &mut d, &[]);
    assert_eq!(d.weights, vec![1.0, 1.0, 1.0]);
    d.init_counts(2);
    assert!((d.total_weight() - 3.0).abs() < 1e-12);
}

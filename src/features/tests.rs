use super::*;
use tempfile::tempdir;

fn registry(phrases: &[&str]) -> PhraseRegistry {
    let mut reg = PhraseRegistry::new();
    for p in phrases {
        reg.add_phrase(p, true);
    }
    reg
}

#[test]
fn test_left_context_only_at_sentence_end() {
    let reg = registry(&["b c"]);
    let extractor = FeatureExtractor::new(&reg, 1, 2, 2);
    extractor.extract_lines(["a b c"]);
    let space = extractor.finish().unwrap();

    let phrase = reg.phrase_id("b c").unwrap() as usize;
    let a_left = space.vocab.get("a", ContextSide::Left).unwrap() as usize;
    assert_eq!(space.matrix.coeff(phrase, a_left), 1.0);
    assert_eq!(space.matrix.row_nnz(phrase), 1);
    assert_eq!(space.vocab.len(), 1);
    assert_eq!(space.vocab.resolve(a_left as u32), Some("a_L"));
    assert_eq!(space.occurrences, vec![1]);
}

#[test]
fn test_window_clipped_and_counts_summed() {
    let reg = registry(&["big dog", "small cat"]);
    let extractor = FeatureExtractor::new(&reg, 2, 2, 2);
    extractor.extract_lines(["the big dog barks", "a big dog barks loudly", "the small cat"]);
    let space = extractor.finish().unwrap();

    let dog = reg.phrase_id("big dog").unwrap() as usize;
    let barks_r = space.vocab.get("barks", ContextSide::Right).unwrap() as usize;
    let loudly_r = space.vocab.get("loudly", ContextSide::Right).unwrap() as usize;
    assert_eq!(space.matrix.coeff(dog, barks_r), 2.0);
    assert_eq!(space.matrix.coeff(dog, loudly_r), 1.0);
    assert_eq!(space.occurrences, vec![2, 1]);

    // "the" on the left of both phrases shares one feature id
    let the_l = space.vocab.get("the", ContextSide::Left).unwrap();
    let bucket: Vec<u32> = space.index.bucket(the_l).unwrap().iter().copied().collect();
    assert_eq!(bucket, vec![0, 1]);
    // Sides are distinct features
    assert!(space.vocab.get("the", ContextSide::Right).is_none());
}

#[test]
fn test_stopword_features_stay_in_matrix_but_not_index() {
    let reg = registry(&["big dog"]);
    let stop = Stopwords::from_tokens(["the"]);
    let extractor = FeatureExtractor::new(&reg, 1, 2, 2).with_stopwords(&stop);
    extractor.extract_lines(["the big dog barks"]);
    let space = extractor.finish().unwrap();

    let the_l = space.vocab.get("the", ContextSide::Left).unwrap();
    let barks_r = space.vocab.get("barks", ContextSide::Right).unwrap();
    assert_eq!(space.matrix.coeff(0, the_l as usize), 1.0);
    assert!(space.index.bucket(the_l).is_none());
    assert!(space.index.bucket(barks_r).is_some());
}

#[test]
fn test_phrase_without_occurrences_has_empty_row() {
    let reg = registry(&["big dog", "red fox"]);
    let extractor = FeatureExtractor::new(&reg, 1, 2, 2);
    extractor.extract_lines(["the big dog"]);
    let space = extractor.finish().unwrap();
    assert_eq!(space.matrix.rows(), 2);
    assert!(space.matrix.row(1).is_empty());
    assert_eq!(space.occurrences[1], 0);
}

#[test]
fn test_order_range_matches_shorter_phrases() {
    let mut reg = PhraseRegistry::new();
    reg.add_phrase("dog", false);
    reg.add_phrase("big dog", false);
    let extractor = FeatureExtractor::new(&reg, 1, 1, 2);
    extractor.extract_lines(["a big dog"]);
    let space = extractor.finish().unwrap();
    assert_eq!(space.occurrences, vec![1, 1]);
    let big_l = space.vocab.get("big", ContextSide::Left).unwrap() as usize;
    let a_l = space.vocab.get("a", ContextSide::Left).unwrap() as usize;
    assert_eq!(space.matrix.coeff(0, big_l), 1.0);
    assert_eq!(space.matrix.coeff(1, a_l), 1.0);
}

#[test]
fn test_extract_files_in_parallel_with_progress() {
    let dir = tempdir().unwrap();
    let mut files = Vec::new();
    for i in 0..4 {
        let path = dir.path().join(format!("{}.txt", i));
        std::fs::write(&path, "the big dog barks\n").unwrap();
        files.push(path);
    }
    let reg = registry(&["big dog"]);
    let calls = std::sync::Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let extractor = FeatureExtractor::new(&reg, 1, 2, 2)
        .with_progress_callback(Box::new(move |_, total| {
            assert_eq!(total, 4);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
    extractor.extract_files(&files).unwrap();
    let space = extractor.finish().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(space.occurrences, vec![4]);
    assert_eq!(space.matrix.nnz(), 2);
    assert_eq!(space.matrix.sum(), 8.0);
}

#[test]
fn test_missing_corpus_file_is_fatal() {
    let dir = tempdir().unwrap();
    let reg = registry(&["big dog"]);
    let extractor = FeatureExtractor::new(&reg, 1, 2, 2);
    let err = extractor
        .extract_files(&[dir.path().join("missing.txt")])
        .unwrap_err();
    assert!(matches!(err, PropError::Io { .. }));
}

#[test]
fn test_write_id2feature_and_roundtrip_artifacts() {
    let dir = tempdir().unwrap();
    let reg = registry(&["big dog"]);
    let extractor = FeatureExtractor::new(&reg, 1, 2, 2);
    extractor.extract_lines(["the big dog barks"]);
    let space = extractor.finish().unwrap();

    let id2f = dir.path().join("id2feature.txt");
    space.vocab.write_id2feature(&id2f).unwrap();
    let text = std::fs::read_to_string(&id2f).unwrap();
    assert_eq!(text, "the_L\t0\nbarks_R\t1\n");

    let mpath = dir.path().join("features.mtx");
    let ipath = dir.path().join("features.index");
    save_features(&space.matrix, &space.index, &mpath, &ipath).unwrap();
    let (matrix, index) = load_features(&mpath, &ipath).unwrap();
    assert_eq!(matrix, space.matrix);
    assert_eq!(index, space.index);
}

#[test]
fn test_gzipped_corpus_matches_plain_text() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let dir = tempdir().unwrap();
    let plain = dir.path().join("part-000.txt");
    let gz = dir.path().join("part-000.gz");
    let first = "the big dog barks\na big dog sleeps\n";
    let second = "the small cat sleeps\n";
    std::fs::write(&plain, format!("{}{}", first, second)).unwrap();

    // Two gzip members back to back, as produced by `cat a.gz b.gz`
    let mut bytes = Vec::new();
    for chunk in [first, second] {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(chunk.as_bytes()).unwrap();
        bytes.extend(enc.finish().unwrap());
    }
    std::fs::write(&gz, bytes).unwrap();

    let reg = registry(&["big dog", "small cat"]);
    let run = |path: &std::path::Path| {
        let extractor = FeatureExtractor::new(&reg, 2, 2, 2);
        extractor.extract_files(&[path.to_path_buf()]).unwrap();
        extractor.finish().unwrap()
    };
    let from_plain = run(&plain);
    let from_gz = run(&gz);

    assert_eq!(from_gz.matrix, from_plain.matrix);
    assert_eq!(from_gz.index, from_plain.index);
    assert_eq!(from_gz.occurrences, vec![2, 1]);
    assert_eq!(from_gz.occurrences, from_plain.occurrences);
}

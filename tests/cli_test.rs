//! Runs the compiled binary through every stage

use std::path::Path;
use std::process::{Command, Output};

fn phrasegraph_bin() -> String {
    env!("CARGO_BIN_EXE_phrasegraph").to_string()
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(phrasegraph_bin())
        .args(["--config", "phrasegraph.toml", "--workers", "2"])
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write_inputs(dir: &Path) {
    let files = [
        (
            "pt.txt",
            "der hund ||| the dog ||| 0.8 0.7\n\
             der hund ||| a dog ||| 0.2 0.3\n\
             die katze ||| the cat ||| 0.9 0.9\n",
        ),
        ("eval.txt", "ein hund bellt\n"),
        (
            "mono.src",
            "ich sehe der hund heute\n\
             ich sehe ein hund heute\n\
             ich sehe die katze morgen\n\
             er mag hund bellt laut\n\
             nichts zu sehen\n",
        ),
        (
            "mono.tgt",
            "i see the dog today\n\
             i see a dog today\n\
             i see the cat tomorrow\n",
        ),
        (
            "lex.txt",
            "ein the 0.5 0.5\nein a 0.6 0.6\nhund dog 0.9 0.9\nkatze cat 0.9 0.9\n",
        ),
        (
            "phrasegraph.toml",
            r#"
phrase_table = "pt.txt"
evaluation_corpus = "eval.txt"
unlabeled_phrase_ids = "unlabeled.ids"
analyze_unlabeled = true
source_monolingual = "mono.src"
target_monolingual = "mono.tgt"
source_filtered_monolingual = "mono.filtered.src"
target_filtered_monolingual = "mono.filtered.tgt"
target_phrase_ids = "target.ids"
source_feature_matrix = "features.src.mtx"
source_inverted_index = "index.src.json"
target_feature_matrix = "features.tgt.mtx"
target_inverted_index = "index.tgt.json"
id2feature_source = "id2feature.src"
source_similarity_matrix = "sim.src.mtx"
target_similarity_matrix = "sim.tgt.mtx"
k_nearest_neighbors = 10
lexical_model = "lex.txt"
iterations = 2
output = "expanded.txt"
"#,
        ),
    ];
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

#[test]
fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_inputs(root);

    assert_ok(&run(root, &["select-unlabeled"]));
    let ids = std::fs::read_to_string(root.join("unlabeled.ids")).unwrap();
    assert_eq!(ids, "ein hund ||| 2\nhund bellt ||| 3\n");

    assert_ok(&run(root, &["select-corpus", "--side", "source"]));
    let filtered = std::fs::read_to_string(root.join("mono.filtered.src")).unwrap();
    assert_eq!(filtered.lines().count(), 4);
    assert!(!filtered.contains("nichts"));
    // Labeled phrases need contexts too, so their sentences are kept
    assert!(filtered.contains("ich sehe die katze morgen"));

    assert_ok(&run(root, &["select-corpus", "--side", "target"]));
    assert!(root.join("target.ids").exists());

    for side in ["source", "target"] {
        assert_ok(&run(root, &["extract-features", "--side", side]));
        assert_ok(&run(root, &["build-graph", "--side", side]));
    }
    assert!(root.join("id2feature.src").exists());
    let header = std::fs::read_to_string(root.join("sim.src.mtx")).unwrap();
    assert!(header.starts_with("%%MatrixMarket matrix coordinate real general"));

    let output = run(root, &["propagate"]);
    assert_ok(&output);
    let expanded = std::fs::read_to_string(root.join("expanded.txt")).unwrap();
    assert!(expanded
        .lines()
        .next()
        .unwrap()
        .starts_with("ein hund ||| the dog ||| "));
}

#[test]
fn test_missing_parameters_fail_before_work() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("phrasegraph.toml"), "iterations = 2\n").unwrap();
    let output = run(dir.path(), &["select-unlabeled"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("phrase_table"), "stderr: {}", stderr);
    assert!(stderr.contains("evaluation_corpus"), "stderr: {}", stderr);
}

#[test]
fn test_init_writes_loadable_config() {
    let dir = tempfile::tempdir().unwrap();
    assert_ok(&run(dir.path(), &["init"]));
    let written = std::fs::read_to_string(dir.path().join("phrasegraph.toml")).unwrap();
    assert!(phrasegraph::config::PipelineConfig::from_toml_str(&written).is_ok());

    // A second init leaves the file alone
    std::fs::write(dir.path().join("phrasegraph.toml"), "iterations = 7\n").unwrap();
    assert_ok(&run(dir.path(), &["init"]));
    let kept = std::fs::read_to_string(dir.path().join("phrasegraph.toml")).unwrap();
    assert_eq!(kept, "iterations = 7\n");
}

#[test]
fn test_workers_out_of_range_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(phrasegraph_bin())
        .args(["--workers", "0", "init"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
}

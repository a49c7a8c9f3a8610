//! End-to-end library run on a toy corpus
//!
//! "ein hund" is unknown to the phrase table but occurs in exactly the
//! contexts of "der hund", so it should inherit "the dog" as its best
//! translation.

use std::path::{Path, PathBuf};

use phrasegraph::features::{prune_by_count, rescale_to_pmi, FeatureExtractor, FeatureSpace};
use phrasegraph::graph::{DynamicGraph, KnnBuilder, SimilarityGraph};
use phrasegraph::lexical::LexicalTable;
use phrasegraph::phrases::{
    add_unlabeled_from_corpus, load_mbest, load_phrase_table, write_expanded_table, PhraseRegistry,
};
use phrasegraph::propagation::{init_labels_with_lex_score, Algorithm, Propagator, SeedOptions};

const EPSILON: f64 = 1e-9;

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
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
                 er mag hund bellt laut\n",
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
            ("mbest.txt", "hund bellt ||| dog barks\n"),
        ];
        for (name, content) in files {
            std::fs::write(root.join(name), content).unwrap();
        }
        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn registry(fx: &Fixture) -> PhraseRegistry {
    let mut reg = PhraseRegistry::new();
    load_phrase_table(&mut reg, &fx.path("pt.txt"), 2).unwrap();
    add_unlabeled_from_corpus(&mut reg, &fx.path("eval.txt"), 2).unwrap();
    reg.normalize_label_distributions();
    reg
}

fn features(reg: &PhraseRegistry, corpus: &Path, min_order: usize, max_order: usize) -> FeatureSpace {
    let extractor = FeatureExtractor::new(reg, 2, min_order, max_order);
    extractor.extract_files(&[corpus.to_path_buf()]).unwrap();
    let mut space = extractor.finish().unwrap();
    prune_by_count(&mut space.matrix, 0.0);
    rescale_to_pmi(&mut space.matrix).unwrap();
    space
}

fn seeded(fx: &Fixture) -> (PhraseRegistry, SimilarityGraph) {
    let mut reg = registry(fx);
    let space = features(&reg, &fx.path("mono.src"), 2, 2);
    let (graph, stats) = KnnBuilder::new(10).build(&space.matrix, &space.index).unwrap();
    assert_eq!(stats.featureless, 1);

    let lexical = LexicalTable::load(&fx.path("lex.txt")).unwrap();
    let feed = load_mbest(&fx.path("mbest.txt")).unwrap();
    let options = SeedOptions {
        max_candidates: 50,
        ..Default::default()
    };
    init_labels_with_lex_score(&mut reg, &graph, &feed, &lexical, &options).unwrap();
    (reg, graph)
}

#[test]
fn test_registry_ids() {
    let fx = Fixture::new();
    let reg = registry(&fx);
    assert_eq!(reg.labeled_ids(), vec![0, 1]);
    assert_eq!(reg.phrase_id("ein hund"), Some(2));
    assert_eq!(reg.phrase_id("hund bellt"), Some(3));
    assert_eq!(reg.num_labels(), 3);
}

#[test]
fn test_graph_connects_shared_contexts() {
    let fx = Fixture::new();
    let reg = registry(&fx);
    let space = features(&reg, &fx.path("mono.src"), 2, 2);
    let (graph, _) = KnnBuilder::new(10).build(&space.matrix, &space.index).unwrap();

    let ein = reg.phrase_id("ein hund").unwrap();
    let der = reg.phrase_id("der hund").unwrap();
    let katze = reg.phrase_id("die katze").unwrap();
    let bellt = reg.phrase_id("hund bellt").unwrap();

    assert!(graph.weight(ein, der) > graph.weight(ein, katze));
    assert!(graph.weight(ein, katze) > 0.0);
    assert!(!graph.has_neighbors(bellt));
    for s in graph.matrix().row_sums() {
        assert!((s - 1.0).abs() < EPSILON);
    }
}

#[test]
fn test_label_prop_end_to_end() {
    let fx = Fixture::new();
    let (mut reg, graph) = seeded(&fx);

    let ein = reg.phrase_id("ein hund").unwrap();
    assert_eq!(reg.phrase(ein).unwrap().label_distribution.len(), 3);
    assert!(reg.phrase(reg.phrase_id("hund bellt").unwrap())
        .unwrap()
        .label_distribution
        .is_empty());

    Propagator::new(&graph, Algorithm::LabelProp)
        .run(&mut reg, 2)
        .unwrap();

    let dist = &reg.phrase(ein).unwrap().label_distribution;
    let total: f64 = dist.values().sum();
    assert!((total - 1.0).abs() < EPSILON);
    let the_dog = reg.label_id("the dog").unwrap();
    let a_dog = reg.label_id("a dog").unwrap();
    assert!(dist[&the_dog] > dist[&a_dog]);

    let out = fx.path("expanded.txt");
    assert_eq!(write_expanded_table(&reg, &out).unwrap(), 3);
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.lines().next().unwrap().starts_with("ein hund ||| the dog ||| "));
}

#[test]
fn test_struct_label_prop_with_dynamic_target_graph() {
    let fx = Fixture::new();
    let (mut reg, graph) = seeded(&fx);
    let target = reg.target_side();
    let target_space = features(&target, &fx.path("mono.tgt"), 1, 5);
    assert_eq!(target_space.matrix.rows(), reg.num_labels());
    let oracle = DynamicGraph::new(target_space.matrix);

    let ein = reg.phrase_id("ein hund").unwrap();
    let keys_before: Vec<u32> = reg.phrase(ein).unwrap().labels().collect();
    Propagator::new(&graph, Algorithm::StructLabelProp)
        .with_label_oracle(&oracle)
        .run(&mut reg, 2)
        .unwrap();

    let phrase = reg.phrase(ein).unwrap();
    assert_eq!(phrase.labels().collect::<Vec<_>>(), keys_before);
    let total: f64 = phrase.label_distribution.values().sum();
    assert!((total - 1.0).abs() < EPSILON);
    assert!(oracle.cached_pairs() > 0);
}

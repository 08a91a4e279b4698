use super::*;
use crate::oracle::{ScoredText, ScoringOracle};
use crate::settings::SubstitutionConfig;
use crate::substitution::SubstitutionError;
use crate::tags::Tagger;
use crate::testutil::{test_tagger, FailingOracle, PrefixHashOracle, StubCache, TargetOracle};
use crate::variants::VariantIndex;

fn index(text: &str, start: usize, length: usize, replacement: &str) -> VariantIndex {
    VariantIndex::new(&test_tagger(), text, start, length, replacement).unwrap()
}

fn config(relax_count: usize, pool_factor: usize, lp_alpha: f64) -> SubstitutionConfig {
    SubstitutionConfig {
        relax_count,
        pool_factor,
        lp_alpha,
        ..SubstitutionConfig::default()
    }
}

// --- Score keys ---

#[test]
fn test_nlp_key_is_raw_score() {
    let node: SearchNode<StubCache> = SearchNode {
        text: "x".into(),
        score: 3.5,
        num_forms: 4,
        cache: None,
    };
    assert_eq!(nlp_key(&node), 3.5);
    assert_eq!(ScoreKey::Surprisal.key(&node), 3.5);
}

#[test]
fn test_lp_key_length_penalty() {
    let mut node: SearchNode<StubCache> = SearchNode {
        text: String::new(),
        score: 6.0,
        num_forms: 1,
        cache: None,
    };
    assert!((lp_key(&node, 1.0) - 6.0).abs() < 1e-12);
    node.num_forms = 7;
    assert!((lp_key(&node, 1.0) - 3.0).abs() < 1e-12);
    node.num_forms = 19;
    assert!((lp_key(&node, 0.5) - 3.0).abs() < 1e-12);
    // alpha 0 is the raw score
    assert!((lp_key(&node, 0.0) - 6.0).abs() < 1e-12);
    assert_eq!(ScoreKey::LengthPenalty(1.0).key(&node), lp_key(&node, 1.0));
}

#[test]
fn test_strategy_parse_and_display() {
    assert_eq!("cache".parse::<Strategy>(), Ok(Strategy::Cache));
    assert_eq!("batch".parse::<Strategy>(), Ok(Strategy::Batch));
    assert!("fast".parse::<Strategy>().is_err());
    assert_eq!(Strategy::Batch.to_string(), "batch");
    assert_eq!(Strategy::default(), Strategy::Cache);
}

#[test]
fn test_node_cache_len() {
    let mut node: SearchNode<StubCache> = SearchNode::start();
    assert_eq!(node.cache_len(), 0);
    node.cache = Some(StubCache { len: 7 });
    assert_eq!(node.cache_len(), 7);
}

// --- Engine ---

#[test]
fn test_literal_replacement_wins() {
    let index = index("Mám pro tebe překvapení.", 8, 4, "vás");
    let mut oracle = TargetOracle::new("Mám pro vás překvapení.");
    let outcome = SearchEngine::new(&mut oracle, &SubstitutionConfig::default())
        .run(&index)
        .unwrap();
    assert_eq!(outcome.text, "Mám pro vás překvapení.");
    assert_eq!(outcome.score, 0.0);
    assert_eq!(outcome.oracle_calls, oracle.calls);
    assert_eq!(outcome.scored_nodes, oracle.batch_sizes.iter().sum::<usize>());
}

#[test]
fn test_first_round_scores_all_start_extensions() {
    let index = index("Mám pro tebe překvapení.", 8, 4, "vás");
    let mut oracle = TargetOracle::new("Mám pro vás překvapení.");
    SearchEngine::new(&mut oracle, &SubstitutionConfig::default())
        .run(&index)
        .unwrap();
    // six forms of "mít" for the first position
    assert_eq!(oracle.batch_sizes[0], 6);
}

#[test]
fn test_same_answer_for_every_config() {
    let index = index("Vidím malého psa.", 13, 3, "kočku");
    for strategy in [Strategy::Cache, Strategy::Batch] {
        for min_variants in [2, 3, 10] {
            for relax_count in [1, 2, 3, 8] {
                for pool_factor in [1, 2, 5] {
                    for lp_alpha in [0.0, 0.5, 1.0] {
                        let config = SubstitutionConfig {
                            min_variants,
                            relax_count,
                            pool_factor,
                            lp_alpha,
                            strategy,
                        };
                        let outcome = SearchEngine::new(TargetOracle::new("Vidím malou kočku."), &config)
                            .run(&index)
                            .unwrap();
                        assert_eq!(outcome.text, "Vidím malou kočku.", "{config:?}");
                    }
                }
            }
        }
    }
}

/// Every complete rewrite of the index, with its total cost.
fn all_rewrites(index: &VariantIndex) -> Vec<(String, f64)> {
    let mut texts = vec![String::new()];
    for i in 0..index.num_forms() {
        texts = texts
            .iter()
            .flat_map(|prefix| index.variants(i).iter().map(move |v| format!("{prefix}{v}")))
            .collect();
    }
    texts
        .into_iter()
        .map(|text| {
            let cost = PrefixHashOracle::surprisal_from(&text, 0);
            (text, cost)
        })
        .collect()
}

#[test]
fn test_search_matches_exhaustive_enumeration() {
    let cases = [
        index("Vidím malého psa.", 13, 3, "kočku"),
        index("Mám pro tebe překvapení.", 8, 4, "vás"),
        index("Mám malého psa.", 11, 3, "kočku"),
    ];
    for index in &cases {
        let rewrites = all_rewrites(index);
        assert!(rewrites.len() > 1);
        let optimum = rewrites
            .iter()
            .map(|(_, cost)| *cost)
            .fold(f64::INFINITY, f64::min);

        for strategy in [Strategy::Cache, Strategy::Batch] {
            for min_variants in [2, 3, 7] {
                for relax_count in [1, 2, 3, 8] {
                    for pool_factor in [1, 5] {
                        let config = SubstitutionConfig {
                            min_variants,
                            relax_count,
                            pool_factor,
                            lp_alpha: 0.0,
                            strategy,
                        };
                        let outcome = SearchEngine::new(PrefixHashOracle, &config)
                            .run(index)
                            .unwrap();
                        assert!(
                            rewrites.iter().any(|(text, _)| *text == outcome.text),
                            "{:?} is not a rewrite ({config:?})",
                            outcome.text
                        );
                        assert!(
                            (outcome.score - optimum).abs() < 1e-9,
                            "score {} but optimum {optimum} ({config:?})",
                            outcome.score
                        );
                        let text_cost = PrefixHashOracle::surprisal_from(&outcome.text, 0);
                        assert!((text_cost - optimum).abs() < 1e-9, "{config:?}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_output_keeps_forms_and_replacement() {
    let tagger = test_tagger();
    let index = index("Vidím malého psa.", 13, 3, "kočku");
    // the cheapest text is not a full sentence of the index; the engine
    // still returns a rewrite that keeps every position
    for target in ["Vidíš malé kočky.", "", "Vidí"] {
        let outcome = SearchEngine::new(TargetOracle::new(target), &config(3, 2, 0.0))
            .run(&index)
            .unwrap();
        let forms = tagger.tag(&outcome.text);
        assert_eq!(forms.len(), index.num_forms(), "target {target:?}");
        assert_eq!(forms[4].form, "kočku");
        for (i, form) in forms.iter().enumerate() {
            assert!(
                index.variants(i).contains(&form.form),
                "{:?} is not a variant of position {i}",
                form.form
            );
        }
    }
}

#[test]
fn test_cheapest_complete_text_is_returned() {
    // "Vidíš malé kočky." is not reachable ("kočky" is not the replacement);
    // the closest reachable text shares the longest prefix with it
    let index = index("Vidím malého psa.", 13, 3, "kočku");
    let outcome = SearchEngine::new(TargetOracle::new("Vidíš malé kočky."), &config(8, 5, 0.0))
        .run(&index)
        .unwrap();
    assert_eq!(outcome.text, "Vidíš malé kočku.");
    assert_eq!(outcome.score, 2.0);
}

#[test]
fn test_cache_strategy_reuses_caches() {
    let index = index("Vidím malého psa.", 13, 3, "kočku");
    let mut oracle = TargetOracle::new("Vidím malou kočku.");
    let cached = SubstitutionConfig::default();
    SearchEngine::new(&mut oracle, &cached).run(&index).unwrap();
    assert!(oracle.cached_inputs > 0);

    let mut oracle = TargetOracle::new("Vidím malou kočku.");
    let batch = SubstitutionConfig {
        strategy: Strategy::Batch,
        ..SubstitutionConfig::default()
    };
    SearchEngine::new(&mut oracle, &batch).run(&index).unwrap();
    assert_eq!(oracle.cached_inputs, 0);
}

#[test]
fn test_empty_sentence_needs_no_oracle() {
    let index = VariantIndex::from_parts(Vec::new(), Vec::new());
    let mut oracle = TargetOracle::new("");
    let outcome = SearchEngine::new(&mut oracle, &SubstitutionConfig::default())
        .run(&index)
        .unwrap();
    assert_eq!(outcome.text, "");
    assert_eq!(outcome.iterations, 0);
    assert_eq!(oracle.calls, 0);
}

#[test]
fn test_oracle_failure_propagates() {
    let index = index("Mám pro tebe překvapení.", 8, 4, "vás");
    let err = SearchEngine::new(FailingOracle, &SubstitutionConfig::default())
        .run(&index)
        .unwrap_err();
    match err {
        SubstitutionError::Oracle(e) => assert_eq!(e.to_string(), "model is unavailable"),
        other => panic!("expected oracle error, got {other:?}"),
    }
}

/// Oracle that drops the last result of every batch.
struct ShortOracle;

impl ScoringOracle for ShortOracle {
    type Cache = StubCache;

    fn score(
        &mut self,
        texts: &[String],
        _caches: &[Option<StubCache>],
    ) -> anyhow::Result<Vec<ScoredText<StubCache>>> {
        Ok(texts
            .iter()
            .skip(1)
            .map(|_| ScoredText {
                surprisal: 0.0,
                cache: None,
            })
            .collect())
    }
}

#[test]
fn test_short_oracle_batch_is_rejected() {
    let index = index("Mám pro tebe překvapení.", 8, 4, "vás");
    let err = SearchEngine::new(ShortOracle, &SubstitutionConfig::default())
        .run(&index)
        .unwrap_err();
    assert!(matches!(
        err,
        SubstitutionError::OracleBatch {
            expected: 6,
            actual: 5
        }
    ));
}

#[test]
fn test_wider_rounds_use_fewer_calls() {
    let index = index("Vidím malého psa.", 13, 3, "kočku");
    let mut narrow = TargetOracle::new("Vidíš malé kočky.");
    SearchEngine::new(&mut narrow, &config(1, 1, 0.0))
        .run(&index)
        .unwrap();
    let mut wide = TargetOracle::new("Vidíš malé kočky.");
    SearchEngine::new(&mut wide, &config(8, 5, 0.0))
        .run(&index)
        .unwrap();
    assert!(wide.calls <= narrow.calls);
}

use tracing::{debug, debug_span};

use super::select::{nsmallest, select_nodes_to_relax};
use super::{ScoreKey, SearchNode, Strategy};
use crate::oracle::{CacheLen, ScoringOracle};
use crate::settings::SubstitutionConfig;
use crate::substitution::SubstitutionError;
use crate::variants::VariantIndex;

/// Result of one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub text: String,
    pub score: f64,
    /// Relaxation rounds, one oracle call each.
    pub iterations: usize,
    pub oracle_calls: usize,
    /// Children scored over the whole run.
    pub scored_nodes: usize,
}

/// Best-first search driven by a scoring oracle.
pub struct SearchEngine<O> {
    oracle: O,
    key: ScoreKey,
    strategy: Strategy,
    min_variants: usize,
    relax_count: usize,
    pool_size: usize,
}

impl<O: ScoringOracle> SearchEngine<O> {
    pub fn new(oracle: O, config: &SubstitutionConfig) -> Self {
        Self {
            oracle,
            key: config.score_key(),
            strategy: config.strategy,
            min_variants: config.min_variants,
            relax_count: config.relax_count.max(1),
            pool_size: config.pool_size().max(1),
        }
    }

    /// Find the cheapest complete rewrite of the indexed sentence.
    pub fn run(&mut self, index: &VariantIndex) -> Result<SearchOutcome, SubstitutionError> {
        let total = index.num_forms();
        let _span = debug_span!("search", forms = total, strategy = %self.strategy).entered();

        let mut open: Vec<SearchNode<O::Cache>> = vec![SearchNode::start()];
        let mut iterations = 0;
        let mut scored_nodes = 0;

        loop {
            let best = self.argmin(&open);
            if open[best].num_forms == total {
                let node = open.swap_remove(best);
                debug!(iterations, scored_nodes, score = node.score, "search finished");
                return Ok(SearchOutcome {
                    text: node.text,
                    score: node.score,
                    iterations,
                    oracle_calls: iterations,
                    scored_nodes,
                });
            }

            let best_key = self.key.key(&open[best]);
            let unfinished: Vec<usize> = (0..open.len())
                .filter(|&i| open[i].num_forms < total)
                .collect();
            let mut selected = match self.strategy {
                Strategy::Cache => select_nodes_to_relax(
                    &open,
                    best,
                    &unfinished,
                    self.relax_count,
                    self.pool_size,
                    self.key,
                ),
                Strategy::Batch => nsmallest(&open, &unfinished, self.relax_count, self.key),
            };

            // remove from the back so earlier indices stay valid
            selected.sort_unstable_by(|a, b| b.cmp(a));
            let to_relax: Vec<SearchNode<O::Cache>> =
                selected.into_iter().map(|i| open.swap_remove(i)).collect();

            debug!(
                iteration = iterations,
                open = open.len() + to_relax.len(),
                best = best_key,
                relaxed = to_relax.len(),
                cache_lens = ?to_relax.iter().map(SearchNode::cache_len).collect::<Vec<_>>(),
                "relaxing"
            );
            let children = self.relax_nodes(index, to_relax)?;
            iterations += 1;
            scored_nodes += children.len();
            open.extend(children);
        }
    }

    /// Index of the cheapest open node; the first one on ties.
    fn argmin(&self, open: &[SearchNode<O::Cache>]) -> usize {
        let mut best = 0;
        let mut best_key = f64::INFINITY;
        for (i, node) in open.iter().enumerate() {
            let key = self.key.key(node);
            if i == 0 || key.total_cmp(&best_key).is_lt() {
                best = i;
                best_key = key;
            }
        }
        best
    }

    /// Extend every node by all of its extensions and score the children
    /// in a single oracle call.
    fn relax_nodes(
        &mut self,
        index: &VariantIndex,
        nodes: Vec<SearchNode<O::Cache>>,
    ) -> Result<Vec<SearchNode<O::Cache>>, SubstitutionError> {
        let mut to_score: Vec<SearchNode<O::Cache>> = Vec::new();
        for node in nodes {
            let extensions = index.get_extensions(node.num_forms, self.min_variants)?;
            if extensions.end <= node.num_forms {
                return Err(SubstitutionError::Stalled {
                    position: node.num_forms,
                });
            }
            let cache = match self.strategy {
                Strategy::Cache => node.cache,
                Strategy::Batch => None,
            };
            to_score.extend(extensions.texts.iter().map(|ext| SearchNode {
                text: format!("{}{ext}", node.text),
                score: node.score,
                num_forms: extensions.end,
                cache: cache.clone(),
            }));
        }

        let texts: Vec<String> = to_score.iter().map(|n| n.text.clone()).collect();
        let caches: Vec<Option<O::Cache>> = to_score.iter().map(|n| n.cache.clone()).collect();
        let scored = self
            .oracle
            .score(&texts, &caches)
            .map_err(SubstitutionError::Oracle)?;
        if scored.len() != to_score.len() {
            return Err(SubstitutionError::OracleBatch {
                expected: to_score.len(),
                actual: scored.len(),
            });
        }

        let keep_cache = self.strategy == Strategy::Cache;
        Ok(to_score
            .into_iter()
            .zip(scored)
            .map(|(node, result)| {
                // without a cache the oracle scored the whole text
                let base = if node.cache.is_some() { node.score } else { 0.0 };
                SearchNode {
                    text: node.text,
                    score: base + result.surprisal,
                    num_forms: node.num_forms,
                    cache: if keep_cache { result.cache } else { None },
                }
            })
            .collect())
    }
}

//! Best-first search over sentence rewrites.
//!
//! Nodes are partial rewrites of a sentence. The start node is the empty
//! text; relaxing a node appends every extension the [`VariantIndex`]
//! offers at its position and scores the children with a
//! [`ScoringOracle`](crate::oracle::ScoringOracle). Because surprisal only
//! grows under extension, the first complete node that is cheapest in the
//! open set is optimal.
//!
//! [`VariantIndex`]: crate::variants::VariantIndex

mod engine;
mod node;
mod select;
#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use engine::{SearchEngine, SearchOutcome};
pub use node::SearchNode;
pub use select::{nsmallest, select_nodes_to_relax};

/// Ranking applied to the open set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreKey {
    /// Raw cumulative surprisal.
    Surprisal,
    /// Surprisal scaled by `((5 + 1) / (5 + num_forms))^alpha`.
    LengthPenalty(f64),
}

impl ScoreKey {
    pub fn key<C>(&self, node: &SearchNode<C>) -> f64 {
        match *self {
            ScoreKey::Surprisal => nlp_key(node),
            ScoreKey::LengthPenalty(alpha) => lp_key(node, alpha),
        }
    }
}

pub fn nlp_key<C>(node: &SearchNode<C>) -> f64 {
    node.score
}

pub fn lp_key<C>(node: &SearchNode<C>, alpha: f64) -> f64 {
    let factor = ((5.0 + 1.0) / (5.0 + node.num_forms as f64)).powf(alpha);
    node.score * factor
}

/// How the engine picks and scores the nodes of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Cache-aware selection; children resume from their parent's cache.
    #[default]
    Cache,
    /// The cheapest unfinished nodes; every child is scored from scratch.
    Batch,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Cache => write!(f, "cache"),
            Strategy::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache" => Ok(Strategy::Cache),
            "batch" => Ok(Strategy::Batch),
            other => Err(format!("unknown strategy: {other} (expected cache or batch)")),
        }
    }
}

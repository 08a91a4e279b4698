//! Scoring oracle boundary.
//!
//! The search engine never talks to a model directly. It hands a batch of
//! candidate texts, each optionally paired with the cache of an already
//! scored prefix, to a [`ScoringOracle`] and gets back incremental
//! surprisal plus a cache covering each whole text.

/// Anything that remembers how many prefix tokens were already scored.
pub trait CacheLen {
    fn cache_len(&self) -> usize;
}

/// Result of scoring one text of a batch.
#[derive(Debug, Clone)]
pub struct ScoredText<C> {
    /// Surprisal of the tokens beyond the supplied cache.
    pub surprisal: f64,
    /// Cache covering the whole text. Absent when the text has no scorable
    /// prefix (the empty text).
    pub cache: Option<C>,
}

/// Batched surprisal model.
///
/// A batch is processed atomically in a single call; results are returned
/// in input order. Failures propagate to the caller unchanged.
pub trait ScoringOracle {
    type Cache: CacheLen + Clone;

    fn score(
        &mut self,
        texts: &[String],
        caches: &[Option<Self::Cache>],
    ) -> anyhow::Result<Vec<ScoredText<Self::Cache>>>;
}

impl<O: ScoringOracle + ?Sized> ScoringOracle for &mut O {
    type Cache = O::Cache;

    fn score(
        &mut self,
        texts: &[String],
        caches: &[Option<Self::Cache>],
    ) -> anyhow::Result<Vec<ScoredText<Self::Cache>>> {
        (**self).score(texts, caches)
    }
}

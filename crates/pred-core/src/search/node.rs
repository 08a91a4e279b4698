use crate::oracle::CacheLen;

/// A (partial) rewrite of the sentence.
///
/// Nodes are values: relaxation creates new nodes and never touches the
/// parent. Two nodes with the same text are still distinct when their
/// caches differ.
#[derive(Debug, Clone)]
pub struct SearchNode<C> {
    pub text: String,
    /// Cumulative surprisal of `text`.
    pub score: f64,
    /// Word positions consumed so far.
    pub num_forms: usize,
    pub cache: Option<C>,
}

impl<C> SearchNode<C> {
    pub fn start() -> Self {
        Self {
            text: String::new(),
            score: 0.0,
            num_forms: 0,
            cache: None,
        }
    }
}

impl<C: CacheLen> SearchNode<C> {
    /// Tokens covered by the cache, 0 without one.
    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, CacheLen::cache_len)
    }
}

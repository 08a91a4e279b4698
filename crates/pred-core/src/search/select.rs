//! Choosing which open nodes to relax together.
//!
//! Joined caches are truncated to their shortest member, so a batch mixing
//! short and long caches throws away work already done for the long ones.
//! Cache-aware selection trades a little score order for batches of
//! similar cache length.

use std::cmp::Ordering;

use super::{ScoreKey, SearchNode};
use crate::oracle::CacheLen;

fn by_key<C>(nodes: &[SearchNode<C>], key: ScoreKey, a: usize, b: usize) -> Ordering {
    key.key(&nodes[a])
        .total_cmp(&key.key(&nodes[b]))
        .then(a.cmp(&b))
}

/// The `n` cheapest of `candidates` (indices into `nodes`), cheapest first.
/// Equal keys keep index order.
pub fn nsmallest<C>(
    nodes: &[SearchNode<C>],
    candidates: &[usize],
    n: usize,
    key: ScoreKey,
) -> Vec<usize> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|&a, &b| by_key(nodes, key, a, b));
    sorted.truncate(n);
    sorted
}

/// Pick up to `relax_count` unfinished nodes to relax in one oracle call.
///
/// `best` is always included. The others come from the `pool_size`
/// cheapest unfinished nodes and are chosen so that the cache lengths of
/// the batch are as uniform as possible.
pub fn select_nodes_to_relax<C: CacheLen>(
    nodes: &[SearchNode<C>],
    best: usize,
    unfinished: &[usize],
    relax_count: usize,
    pool_size: usize,
    key: ScoreKey,
) -> Vec<usize> {
    let mut pool = nsmallest(nodes, unfinished, pool_size, key);
    if pool.len() <= relax_count {
        return pool;
    }
    sort_pool(nodes, &mut pool, best, key);
    let Some(best_index) = pool.iter().position(|&i| i == best) else {
        pool.truncate(relax_count);
        return pool;
    };

    // every run of relax_count inside this window contains best
    let lo = (best_index + 1).saturating_sub(relax_count);
    let hi = (best_index + relax_count).min(pool.len());
    let window = &pool[lo..hi];
    let lengths: Vec<usize> = window.iter().map(|&i| nodes[i].cache_len()).collect();
    let start = find_most_similar_subarray(&lengths, relax_count);
    window[start..start + relax_count].to_vec()
}

/// Order by cache length. Within one length, nodes cheaper than `best`'s
/// neighbours sit closer to it: descending key on the shorter side,
/// ascending key on the longer side.
fn sort_pool<C: CacheLen>(nodes: &[SearchNode<C>], pool: &mut Vec<usize>, best: usize, key: ScoreKey) {
    let best_len = nodes[best].cache_len();
    let (mut shorter, mut longer): (Vec<usize>, Vec<usize>) =
        pool.iter().partition(|&&i| nodes[i].cache_len() <= best_len);
    shorter.sort_by(|&a, &b| {
        nodes[a]
            .cache_len()
            .cmp(&nodes[b].cache_len())
            .then_with(|| key.key(&nodes[b]).total_cmp(&key.key(&nodes[a])))
    });
    longer.sort_by(|&a, &b| {
        nodes[a]
            .cache_len()
            .cmp(&nodes[b].cache_len())
            .then_with(|| key.key(&nodes[a]).total_cmp(&key.key(&nodes[b])))
    });
    pool.clear();
    pool.extend(shorter);
    pool.extend(longer);
}

/// Start of the run of `length` values whose sum is closest to its minimum
/// times `length`. The first such run wins.
fn find_most_similar_subarray(array: &[usize], length: usize) -> usize {
    let mut min_diff: usize = array.iter().sum();
    let mut start = 0;
    if length == 0 || length > array.len() {
        return start;
    }
    for (i, run) in array.windows(length).enumerate() {
        let sum: usize = run.iter().sum();
        let min = run.iter().copied().min().unwrap_or(0);
        let diff = sum - min * length;
        if diff < min_diff {
            min_diff = diff;
            start = i;
        }
    }
    start
}

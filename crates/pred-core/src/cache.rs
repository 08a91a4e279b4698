//! Attention (key/value) cache snapshots.
//!
//! A [`KvCache`] holds one `(keys, values)` pair per transformer layer, each
//! shaped `[batch, heads, seq, head_dim]`. `len` is the number of prefix
//! tokens the cache is valid for; it may be shorter than the physical `seq`
//! when the batch that produced it was right-padded.
//!
//! Caches are values: joining, splitting and trimming build new tensors or
//! views and never modify an existing snapshot.

use candle_core::{Result, Tensor};

use crate::oracle::CacheLen;

const BATCH_DIM: usize = 0;
const SEQ_DIM: usize = 2;

/// Keys and values of one layer.
pub type KvLayer = (Tensor, Tensor);

#[derive(Debug, Clone)]
pub struct KvCache {
    layers: Vec<KvLayer>,
    len: usize,
}

impl KvCache {
    /// Wrap per-layer tensors valid for the first `len` positions.
    pub fn new(layers: Vec<KvLayer>, len: usize) -> Result<Self> {
        for (i, (k, v)) in layers.iter().enumerate() {
            if k.dims() != v.dims() {
                candle_core::bail!(
                    "layer {i}: key shape {:?} differs from value shape {:?}",
                    k.dims(),
                    v.dims()
                );
            }
            let seq = k.dim(SEQ_DIM)?;
            if len > seq {
                candle_core::bail!("layer {i}: cache length {len} exceeds sequence length {seq}");
            }
        }
        Ok(Self { layers, len })
    }

    /// Number of valid prefix positions.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn batch_size(&self) -> Result<usize> {
        match self.layers.first() {
            Some((k, _)) => k.dim(BATCH_DIM),
            None => Ok(0),
        }
    }

    pub fn layers(&self) -> &[KvLayer] {
        &self.layers
    }

    /// Concatenate caches along the batch dimension.
    ///
    /// Every member is truncated to the shortest member's length first, since
    /// a batched forward pass needs the same history length for all rows.
    pub fn join(caches: &[&KvCache]) -> Result<KvCache> {
        let Some(first) = caches.first() else {
            candle_core::bail!("cannot join an empty list of caches");
        };
        let num_layers = first.num_layers();
        if let Some(bad) = caches.iter().find(|c| c.num_layers() != num_layers) {
            candle_core::bail!(
                "cannot join caches with {} and {} layers",
                num_layers,
                bad.num_layers()
            );
        }
        let len = caches.iter().map(|c| c.len).min().unwrap_or(0);

        let mut layers = Vec::with_capacity(num_layers);
        for layer in 0..num_layers {
            let keys = caches
                .iter()
                .map(|c| c.layers[layer].0.narrow(SEQ_DIM, 0, len))
                .collect::<Result<Vec<_>>>()?;
            let values = caches
                .iter()
                .map(|c| c.layers[layer].1.narrow(SEQ_DIM, 0, len))
                .collect::<Result<Vec<_>>>()?;
            layers.push((
                Tensor::cat(&keys, BATCH_DIM)?,
                Tensor::cat(&values, BATCH_DIM)?,
            ));
        }
        Ok(KvCache { layers, len })
    }

    /// Join caches, or `None` if any of them is missing (or there are none).
    ///
    /// A missing cache forces the whole batch to be recomputed from scratch.
    pub fn join_optional(caches: &[Option<&KvCache>]) -> Result<Option<KvCache>> {
        let present: Option<Vec<&KvCache>> = caches.iter().copied().collect();
        match present {
            Some(all) if !all.is_empty() => Ok(Some(Self::join(&all)?)),
            _ => Ok(None),
        }
    }

    /// Split along the batch dimension into single-row caches.
    pub fn split(&self) -> Result<Vec<KvCache>> {
        let batch = self.batch_size()?;
        (0..batch)
            .map(|row| {
                let layers = self
                    .layers
                    .iter()
                    .map(|(k, v)| Ok((k.narrow(BATCH_DIM, row, 1)?, v.narrow(BATCH_DIM, row, 1)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(KvCache {
                    layers,
                    len: self.len,
                })
            })
            .collect()
    }

    /// Shorten the cache to the first `len` positions. Never grows it.
    pub fn trim(&self, len: usize) -> Result<KvCache> {
        let len = len.min(self.len);
        let layers = self
            .layers
            .iter()
            .map(|(k, v)| Ok((k.narrow(SEQ_DIM, 0, len)?, v.narrow(SEQ_DIM, 0, len)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(KvCache { layers, len })
    }
}

impl CacheLen for KvCache {
    fn cache_len(&self) -> usize {
        self.len
    }
}

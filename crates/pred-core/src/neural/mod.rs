//! Neural scoring oracle backed by a GGUF GPT-2.
//!
//! Every text is scored as `<|endoftext|>` followed by its tokens; the
//! surprisal of a text is the sum of `-log p(token | prefix)` over its
//! tokens. Batches resume from the caches of already scored prefixes so
//! that a search only pays for the tokens it appends.

mod gpt2;
mod tokenizer;

use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use tracing::{debug, debug_span};

use crate::cache::KvCache;
use crate::oracle::{CacheLen, ScoredText, ScoringOracle};

pub use gpt2::QuantizedGpt2;
pub use tokenizer::{BpeTokenizer, END_OF_TEXT};

/// Token id used to right-pad shorter rows of a batch.
const PAD_ID: u32 = 0;

pub struct NeuralScorer {
    model: QuantizedGpt2,
    tokenizer: BpeTokenizer,
    device: Device,
}

impl NeuralScorer {
    /// Load a neural scorer from a GGUF model file.
    pub fn open(model_path: &Path) -> anyhow::Result<Self> {
        let device = Device::Cpu;

        // Read GGUF content for both model weights and tokenizer metadata
        let mut file = std::fs::File::open(model_path)?;
        let content = candle_core::quantized::gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow::anyhow!("failed to read GGUF: {e}"))?;

        let tokenizer = BpeTokenizer::from_gguf(&content)?;
        let model = QuantizedGpt2::from_content(&content, &mut file, &device)?;
        debug!(
            path = %model_path.display(),
            model = %model.config_summary(),
            vocab = tokenizer.vocab_size(),
            "neural scorer loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    pub fn from_parts(model: QuantizedGpt2, tokenizer: BpeTokenizer) -> Self {
        Self {
            model,
            tokenizer,
            device: Device::Cpu,
        }
    }

    /// Surprisal of a whole text, scored from scratch.
    pub fn surprisal(&mut self, text: &str) -> anyhow::Result<f64> {
        let scored = self.score(&[text.to_string()], &[None])?;
        scored
            .first()
            .map(|s| s.surprisal)
            .ok_or_else(|| anyhow::anyhow!("empty scoring result"))
    }

    /// Get model configuration summary.
    pub fn config_summary(&self) -> String {
        self.model.config_summary()
    }

    pub fn tokenizer(&self) -> &BpeTokenizer {
        &self.tokenizer
    }

    fn encode_with_eos(&self, text: &str) -> Vec<u32> {
        let mut ids = vec![self.tokenizer.eos_token()];
        ids.extend(self.tokenizer.encode(text));
        ids
    }
}

impl ScoringOracle for NeuralScorer {
    type Cache = KvCache;

    fn score(
        &mut self,
        texts: &[String],
        caches: &[Option<KvCache>],
    ) -> anyhow::Result<Vec<ScoredText<KvCache>>> {
        anyhow::ensure!(
            texts.len() == caches.len(),
            "got {} texts but {} caches",
            texts.len(),
            caches.len()
        );
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let _span = debug_span!("score_batch", batch = texts.len()).entered();

        // The last token only needs to be predicted, never fed in, so each
        // row runs over `ids[..n]` with `n = ids.len() - 1`.
        let ids: Vec<Vec<u32>> = texts.iter().map(|t| self.encode_with_eos(t)).collect();
        let lens: Vec<usize> = ids.iter().map(|ids| ids.len() - 1).collect();
        let starts: Vec<usize> = caches
            .iter()
            .map(|c| c.as_ref().map_or(0, CacheLen::cache_len))
            .collect();
        for (i, (&start, &n)) in starts.iter().zip(&lens).enumerate() {
            anyhow::ensure!(
                start <= n,
                "cache of text {i} covers {start} tokens but the text has {n}"
            );
        }

        let cache_refs: Vec<Option<&KvCache>> = caches.iter().map(Option::as_ref).collect();
        let past = KvCache::join_optional(&cache_refs)
            .map_err(|e| anyhow::anyhow!("joining caches failed: {e}"))?
            .filter(|c| !c.is_empty());
        let past_len = past.as_ref().map_or(0, KvCache::len);
        let max_len = lens.iter().copied().max().unwrap_or(0);
        let seq_len = max_len - past_len;

        if seq_len == 0 {
            // every text is already fully cached
            return Ok(caches
                .iter()
                .map(|cache| ScoredText {
                    surprisal: 0.0,
                    cache: cache.clone(),
                })
                .collect());
        }

        let batch = texts.len();
        let mut input = Vec::with_capacity(batch * seq_len);
        let mut targets = Vec::with_capacity(batch * seq_len);
        for (ids, &n) in ids.iter().zip(&lens) {
            for p in past_len..max_len {
                let (token, target) = if p < n {
                    (ids[p], ids[p + 1])
                } else {
                    (PAD_ID, PAD_ID)
                };
                input.push(token);
                targets.push(target);
            }
        }
        let input = Tensor::from_vec(input, (batch, seq_len), &self.device)?;
        let targets = Tensor::from_vec(targets, (batch, seq_len, 1), &self.device)?;

        let (logits, layers) = self
            .model
            .forward(&input, past.as_ref())
            .map_err(|e| anyhow::anyhow!("forward pass failed: {e}"))?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)
            .map_err(|e| anyhow::anyhow!("log_softmax failed: {e}"))?;
        let picked: Vec<Vec<f32>> = log_probs
            .gather(&targets, 2)?
            .squeeze(2)?
            .to_dtype(DType::F32)?
            .to_vec2()?;

        let joined = KvCache::new(layers, max_len)?;
        let pieces = joined.split()?;

        let mut scored = Vec::with_capacity(batch);
        for (i, piece) in pieces.into_iter().enumerate() {
            let (start, n) = (starts[i], lens[i]);
            let surprisal: f64 = picked[i][start - past_len..n - past_len]
                .iter()
                .map(|&lp| -(lp as f64))
                .sum();
            let cache = if n == 0 { None } else { Some(piece.trim(n)?) };
            scored.push(ScoredText { surprisal, cache });
        }
        debug!(
            past = past_len,
            seq = seq_len,
            recomputed = past.is_none() && caches.iter().any(Option::is_some),
            "batch scored"
        );
        Ok(scored)
    }
}

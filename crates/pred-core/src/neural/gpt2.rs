//! Quantized GPT-2 model loaded from GGUF format.
//!
//! Architecture: GPT-2 with LayerNorm, learned position embeddings,
//! weight tying (wte == lm_head^T), and gelu_new activation.
//!
//! GGUF tensor names follow the llama.cpp convention for GPT-2.
//!
//! The model keeps no decoding state: every call takes the previous
//! keys/values explicitly and returns the extended ones, so one loaded
//! model can score many independent prefixes in a single batch.

use std::path::Path;

use candle_core::quantized::gguf_file;
use candle_core::quantized::QMatMul;
use candle_core::{Device, IndexOp, Module, Result, Tensor};
use candle_nn::{Embedding, LayerNorm};

use crate::cache::{KvCache, KvLayer};

// ---- Configuration ----

#[derive(Debug, Clone)]
pub(crate) struct Gpt2Config {
    pub n_embd: usize,
    pub n_head: usize,
    pub n_layer: usize,
    pub n_positions: usize,
    pub vocab_size: usize,
}

impl Gpt2Config {
    fn from_gguf(content: &gguf_file::Content) -> Self {
        let get_u32 = |key: &str, default: u32| -> usize {
            content
                .metadata
                .get(key)
                .and_then(|v| v.to_u32().ok())
                .unwrap_or(default) as usize
        };
        Self {
            n_embd: get_u32("gpt2.embedding_length", 768),
            n_head: get_u32("gpt2.attention.head_count", 12),
            n_layer: get_u32("gpt2.block_count", 12),
            n_positions: get_u32("gpt2.context_length", 1024),
            vocab_size: get_u32("gpt2.vocab_size", 50257),
        }
    }

    fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }
}

// ---- Attention ----

struct Attention {
    qkv: QMatMul,
    qkv_bias: Tensor,
    out_proj: QMatMul,
    out_bias: Tensor,
    n_head: usize,
    head_dim: usize,
}

impl Attention {
    /// Attend over `past` followed by `x`; returns the output and the
    /// concatenated keys/values.
    fn forward(&self, x: &Tensor, past: Option<&KvLayer>, mask: &Tensor) -> Result<(Tensor, KvLayer)> {
        let (batch, seq_len, n_embd) = x.dims3()?;
        let head_dim = self.head_dim;
        let n_head = self.n_head;

        // QKV projection: [batch, seq, 3*n_embd]
        let qkv = self.qkv.forward(x)?.broadcast_add(&self.qkv_bias)?;
        let qkv = qkv.reshape((batch, seq_len, 3, n_head, head_dim))?;

        // Split Q, K, V: each [batch, n_head, seq, head_dim]
        let q = qkv.i((.., .., 0))?.transpose(1, 2)?.contiguous()?;
        let k = qkv.i((.., .., 1))?.transpose(1, 2)?.contiguous()?;
        let v = qkv.i((.., .., 2))?.transpose(1, 2)?.contiguous()?;

        // Past keys/values: concatenate along the sequence dimension
        let (k, v) = match past {
            Some((prev_k, prev_v)) => (
                Tensor::cat(&[prev_k, &k], 2)?.contiguous()?,
                Tensor::cat(&[prev_v, &v], 2)?.contiguous()?,
            ),
            None => (k, v),
        };

        // Scaled dot-product attention
        let scale = (head_dim as f64).sqrt();
        let attn_weights = (q.matmul(&k.t()?)? / scale)?;
        let attn_weights = attn_weights.broadcast_add(mask)?;
        let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;
        let attn_out = attn_weights.matmul(&v)?;

        // Reshape back: [batch, seq, n_embd]
        let attn_out = attn_out
            .transpose(1, 2)?
            .reshape((batch, seq_len, n_embd))?;

        let out = self
            .out_proj
            .forward(&attn_out)?
            .broadcast_add(&self.out_bias)?;
        Ok((out, (k, v)))
    }
}

/// Additive mask letting query `i` (at absolute position `i + offset`) see
/// keys `0..=i + offset`.
fn create_causal_mask(seq_len: usize, total_len: usize, device: &Device) -> Result<Tensor> {
    let offset = total_len - seq_len;
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..total_len).map(move |j| {
                if j <= i + offset {
                    0.0f32
                } else {
                    f32::NEG_INFINITY
                }
            })
        })
        .collect();
    Tensor::from_vec(mask, (1, 1, seq_len, total_len), device)
}

// ---- MLP ----

struct Mlp {
    fc: QMatMul,
    fc_bias: Tensor,
    proj: QMatMul,
    proj_bias: Tensor,
}

impl Mlp {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.fc.forward(x)?.broadcast_add(&self.fc_bias)?;
        let h = gelu_new(&h)?;
        self.proj.forward(&h)?.broadcast_add(&self.proj_bias)
    }
}

/// GPT-2's gelu_new activation: 0.5 * x * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3)))
fn gelu_new(x: &Tensor) -> Result<Tensor> {
    let x3 = x.powf(3.0)?;
    let inner = ((x + (x3 * 0.044715)?)? * (2.0f64 / std::f64::consts::PI).sqrt())?;
    let tanh_inner = inner.tanh()?;
    (x * (tanh_inner + 1.0)?)? * 0.5
}

// ---- Transformer Block ----

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn forward(&self, x: &Tensor, past: Option<&KvLayer>, mask: &Tensor) -> Result<(Tensor, KvLayer)> {
        // Pre-norm attention
        let h = self.ln_1.forward(x)?;
        let (h, kv) = self.attn.forward(&h, past, mask)?;
        let x = (x + h)?;

        // Pre-norm MLP
        let h = self.ln_2.forward(&x)?;
        let h = self.mlp.forward(&h)?;
        Ok(((x + h)?, kv))
    }
}

// ---- Full GPT-2 Model ----

pub struct QuantizedGpt2 {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    lm_head: Option<QMatMul>,
    config: Gpt2Config,
}

/// Load and dequantize a tensor from GGUF.
fn load_tensor(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    name: &str,
    device: &Device,
) -> anyhow::Result<Tensor> {
    let qt = content
        .tensor(file, name, device)
        .map_err(|e| anyhow::anyhow!("failed to load tensor {name}: {e}"))?;
    qt.dequantize(device)
        .map_err(|e| anyhow::anyhow!("failed to dequantize {name}: {e}"))
}

/// Load a quantized tensor as QMatMul from GGUF.
fn load_qmatmul(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    name: &str,
    device: &Device,
) -> anyhow::Result<QMatMul> {
    let qt = content
        .tensor(file, name, device)
        .map_err(|e| anyhow::anyhow!("failed to load tensor {name}: {e}"))?;
    QMatMul::from_qtensor(qt)
        .map_err(|e| anyhow::anyhow!("failed to create QMatMul for {name}: {e}"))
}

fn load_layer_norm(
    content: &gguf_file::Content,
    file: &mut std::fs::File,
    prefix: &str,
    device: &Device,
) -> anyhow::Result<LayerNorm> {
    Ok(LayerNorm::new(
        load_tensor(content, file, &format!("{prefix}.weight"), device)?,
        load_tensor(content, file, &format!("{prefix}.bias"), device)?,
        1e-5,
    ))
}

impl QuantizedGpt2 {
    /// Load a quantized GPT-2 model from a GGUF file.
    pub fn from_gguf(path: &Path, device: &Device) -> anyhow::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow::anyhow!("failed to read GGUF: {e}"))?;
        Self::from_content(&content, &mut file, device)
    }

    pub(crate) fn from_content(
        content: &gguf_file::Content,
        file: &mut std::fs::File,
        device: &Device,
    ) -> anyhow::Result<Self> {
        let config = Gpt2Config::from_gguf(content);
        if config.n_head == 0 || config.n_embd % config.n_head != 0 {
            anyhow::bail!(
                "embedding length {} is not divisible by {} heads",
                config.n_embd,
                config.n_head
            );
        }

        // Embeddings (typically F16/F32 in GGUF, not quantized)
        let wte = Embedding::new(
            load_tensor(content, file, "token_embd.weight", device)?,
            config.n_embd,
        );
        let wpe = Embedding::new(
            load_tensor(content, file, "position_embd.weight", device)?,
            config.n_embd,
        );

        let mut blocks = Vec::with_capacity(config.n_layer);
        for i in 0..config.n_layer {
            let blk = format!("blk.{i}");
            let attn = Attention {
                qkv: load_qmatmul(content, file, &format!("{blk}.attn_qkv.weight"), device)?,
                qkv_bias: load_tensor(content, file, &format!("{blk}.attn_qkv.bias"), device)?,
                out_proj: load_qmatmul(content, file, &format!("{blk}.attn_output.weight"), device)?,
                out_bias: load_tensor(content, file, &format!("{blk}.attn_output.bias"), device)?,
                n_head: config.n_head,
                head_dim: config.head_dim(),
            };
            let mlp = Mlp {
                fc: load_qmatmul(content, file, &format!("{blk}.ffn_up.weight"), device)?,
                fc_bias: load_tensor(content, file, &format!("{blk}.ffn_up.bias"), device)?,
                proj: load_qmatmul(content, file, &format!("{blk}.ffn_down.weight"), device)?,
                proj_bias: load_tensor(content, file, &format!("{blk}.ffn_down.bias"), device)?,
            };
            blocks.push(Block {
                ln_1: load_layer_norm(content, file, &format!("{blk}.attn_norm"), device)?,
                attn,
                ln_2: load_layer_norm(content, file, &format!("{blk}.ffn_norm"), device)?,
                mlp,
            });
        }

        let ln_f = load_layer_norm(content, file, "output_norm", device)?;

        // lm_head: may be absent if weight tying (use wte instead)
        let lm_head = if content.tensor_infos.contains_key("output.weight") {
            Some(load_qmatmul(content, file, "output.weight", device)?)
        } else {
            None
        };

        Ok(Self {
            wte,
            wpe,
            blocks,
            ln_f,
            lm_head,
            config,
        })
    }

    /// Run the model over a right-padded batch of token ids.
    ///
    /// `tokens`: `[batch, seq]` u32 ids continuing the prefix in `past`
    /// (which must have the same batch size).
    ///
    /// Returns logits `[batch, seq, vocab]` and, per layer, the keys and
    /// values of `past` followed by the new positions.
    pub fn forward(&self, tokens: &Tensor, past: Option<&KvCache>) -> Result<(Tensor, Vec<KvLayer>)> {
        let device = self.wte.embeddings().device().clone();
        let (_batch, seq_len) = tokens.dims2()?;
        let past = past.filter(|p| !p.is_empty());
        let past_len = past.map_or(0, KvCache::len);
        let total_len = past_len + seq_len;
        if total_len > self.config.n_positions {
            candle_core::bail!(
                "sequence of {total_len} tokens exceeds the context length {}",
                self.config.n_positions
            );
        }
        if let Some(past) = past {
            if past.num_layers() != self.blocks.len() {
                candle_core::bail!(
                    "cache has {} layers, model has {}",
                    past.num_layers(),
                    self.blocks.len()
                );
            }
        }

        // Token IDs → embedding: [batch, seq, n_embd]
        let token_embd = self.wte.forward(tokens)?;

        // Position IDs continue after the cached prefix: [seq, n_embd]
        let pos_ids = Tensor::arange(past_len as u32, total_len as u32, &device)?;
        let pos_embd = self.wpe.forward(&pos_ids)?;

        let mut h = token_embd.broadcast_add(&pos_embd)?;
        let mask = create_causal_mask(seq_len, total_len, &device)?;

        let mut layers = Vec::with_capacity(self.blocks.len());
        for (i, block) in self.blocks.iter().enumerate() {
            let layer_past = match past {
                Some(past) => {
                    let (k, v) = &past.layers()[i];
                    Some((k.narrow(2, 0, past_len)?, v.narrow(2, 0, past_len)?))
                }
                None => None,
            };
            let (out, kv) = block.forward(&h, layer_past.as_ref(), &mask)?;
            h = out;
            layers.push(kv);
        }

        h = self.ln_f.forward(&h)?;

        let logits = match &self.lm_head {
            Some(lm_head) => lm_head.forward(&h)?,
            // Weight tying: logits = h @ wte.T
            None => h.broadcast_matmul(&self.wte.embeddings().t()?)?,
        };
        Ok((logits, layers))
    }

    pub fn context_length(&self) -> usize {
        self.config.n_positions
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    /// Get model configuration summary.
    pub fn config_summary(&self) -> String {
        format!(
            "GPT-2: {}L/{}H/{}E, vocab={}, ctx={}",
            self.config.n_layer,
            self.config.n_head,
            self.config.n_embd,
            self.config.vocab_size,
            self.config.n_positions,
        )
    }
}

/// A tiny model with formula-generated weights, for tests.
#[cfg(test)]
pub(crate) fn tiny_model(config: Gpt2Config, device: &Device) -> Result<QuantizedGpt2> {
    use candle_core::DType;

    let mut seed = 0u32;
    // Smooth, deterministic pseudo-random weights in [-scale, scale].
    let mut weights = |shape: &[usize], scale: f64| -> Result<Tensor> {
        let n: usize = shape.iter().product();
        seed += 1;
        Tensor::arange(0u32, n as u32, device)?
            .to_dtype(DType::F32)?
            .affine(0.37 + 0.11 * seed as f64, 0.5 * seed as f64)?
            .sin()?
            .affine(scale, 0.0)?
            .reshape(shape)
    };
    let e = config.n_embd;

    let wte = Embedding::new(weights(&[config.vocab_size, e], 0.5)?, e);
    let wpe = Embedding::new(weights(&[config.n_positions, e], 0.1)?, e);
    let layer_norm = |weights: &mut dyn FnMut(&[usize], f64) -> Result<Tensor>| -> Result<LayerNorm> {
        Ok(LayerNorm::new(
            (weights(&[e], 0.1)? + 1.0)?,
            weights(&[e], 0.05)?,
            1e-5,
        ))
    };

    let mut blocks = Vec::with_capacity(config.n_layer);
    for _ in 0..config.n_layer {
        let ln_1 = layer_norm(&mut weights)?;
        let attn = Attention {
            qkv: QMatMul::Tensor(weights(&[3 * e, e], 0.3)?),
            qkv_bias: weights(&[3 * e], 0.05)?,
            out_proj: QMatMul::Tensor(weights(&[e, e], 0.3)?),
            out_bias: weights(&[e], 0.05)?,
            n_head: config.n_head,
            head_dim: config.head_dim(),
        };
        let ln_2 = layer_norm(&mut weights)?;
        let mlp = Mlp {
            fc: QMatMul::Tensor(weights(&[4 * e, e], 0.3)?),
            fc_bias: weights(&[4 * e], 0.05)?,
            proj: QMatMul::Tensor(weights(&[e, 4 * e], 0.3)?),
            proj_bias: weights(&[e], 0.05)?,
        };
        blocks.push(Block {
            ln_1,
            attn,
            ln_2,
            mlp,
        });
    }
    let ln_f = layer_norm(&mut weights)?;

    Ok(QuantizedGpt2 {
        wte,
        wpe,
        blocks,
        ln_f,
        lm_head: None,
        config,
    })
}

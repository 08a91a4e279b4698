//! BPE tokenizer for GPT-2, loaded from GGUF metadata.
//!
//! The GGUF file embeds `tokenizer.ggml.tokens` and `tokenizer.ggml.merges`
//! which we parse to build a GPT-2-style **byte-level** BPE encoder.
//!
//! GPT-2 BPE encodes text as UTF-8 bytes, then maps each byte to a
//! displayable Unicode character via a fixed table. BPE merges operate
//! on these mapped characters, within the chunks produced by GPT-2's
//! pre-tokenization (words with their leading space, digit runs,
//! punctuation runs, whitespace).

use std::collections::HashMap;

use candle_core::quantized::gguf_file;
use fancy_regex::Regex;
use tracing::warn;

/// GPT-2's end-of-text token; also used as the start-of-text marker.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Special token strings that should be matched atomically.
const SPECIAL_TOKENS: &[&str] = &[END_OF_TEXT];

/// GPT-2's pre-tokenization pattern: contractions, letter, digit and
/// other-symbol runs with an optional leading space, then whitespace. A
/// whitespace run followed by a word leaves its last character to that word.
const SPLIT_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

pub struct BpeTokenizer {
    /// token string → token ID
    token_to_id: HashMap<String, u32>,
    /// token ID → token string
    id_to_token: Vec<String>,
    /// (left, right) → merge rank, lower merges first
    merge_ranks: HashMap<(String, String), usize>,
    /// byte value → GPT-2 mapped character
    byte_to_char: [char; 256],
    /// GPT-2 mapped character → byte value
    char_to_byte: HashMap<char, u8>,
    split_pattern: Regex,
    eos_id: u32,
}

impl BpeTokenizer {
    /// Build the tokenizer from GGUF metadata.
    pub fn from_gguf(content: &gguf_file::Content) -> anyhow::Result<Self> {
        let tokens = get_string_array(&content.metadata, "tokenizer.ggml.tokens")?;
        let merge_strs = get_string_array(&content.metadata, "tokenizer.ggml.merges")?;

        let merges: Vec<(String, String)> = merge_strs
            .iter()
            .filter_map(|line| {
                let (left, right) = line.split_once(' ')?;
                Some((left.to_string(), right.to_string()))
            })
            .collect();

        let eos_id = match content
            .metadata
            .get("tokenizer.ggml.eos_token_id")
            .and_then(|v| v.to_u32().ok())
        {
            Some(id) => id,
            None => tokens
                .iter()
                .position(|t| t == END_OF_TEXT)
                .map(|i| i as u32)
                .ok_or_else(|| anyhow::anyhow!("GGUF has no EOS token"))?,
        };

        Self::from_parts(tokens, merges, eos_id)
    }

    /// Build the tokenizer from a vocabulary (indexed by id) and ordered merges.
    pub fn from_parts(
        tokens: Vec<String>,
        merges: Vec<(String, String)>,
        eos_id: u32,
    ) -> anyhow::Result<Self> {
        if eos_id as usize >= tokens.len() {
            anyhow::bail!("EOS id {eos_id} outside vocabulary of {}", tokens.len());
        }
        let token_to_id = tokens
            .iter()
            .enumerate()
            .map(|(i, tok)| (tok.clone(), i as u32))
            .collect();
        let merge_ranks = merges
            .into_iter()
            .enumerate()
            .map(|(rank, pair)| (pair, rank))
            .collect();
        let (byte_to_char, char_to_byte) = build_byte_mapping();
        let split_pattern = Regex::new(SPLIT_PATTERN)
            .map_err(|e| anyhow::anyhow!("invalid pre-tokenization pattern: {e}"))?;

        Ok(Self {
            token_to_id,
            id_to_token: tokens,
            merge_ranks,
            byte_to_char,
            char_to_byte,
            split_pattern,
            eos_id,
        })
    }

    /// Encode text into token IDs using GPT-2 byte-level BPE.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut all_ids = Vec::new();
        for segment in split_special_tokens(text) {
            if SPECIAL_TOKENS.contains(&segment) {
                if let Some(&id) = self.token_to_id.get(segment) {
                    all_ids.push(id);
                    continue;
                }
            }
            for chunk in pretokenize(&self.split_pattern, segment) {
                self.bpe_encode_chunk(chunk, &mut all_ids);
            }
        }
        all_ids
    }

    /// Decode token IDs back to text.
    ///
    /// Reverses the byte-level mapping: concatenates token strings,
    /// then converts the GPT-2 mapped characters back to UTF-8 bytes.
    pub fn decode(&self, tokens: &[u32]) -> String {
        let mut bytes = Vec::new();
        for token in tokens
            .iter()
            .filter_map(|&id| self.id_to_token.get(id as usize))
        {
            if SPECIAL_TOKENS.contains(&token.as_str()) {
                bytes.extend_from_slice(token.as_bytes());
                continue;
            }
            bytes.extend(
                token
                    .chars()
                    .map(|c| self.char_to_byte.get(&c).copied().unwrap_or(b'?')),
            );
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn eos_token(&self) -> u32 {
        self.eos_id
    }

    /// Vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.id_to_token.len()
    }

    /// BPE encode one pre-tokenized chunk.
    fn bpe_encode_chunk(&self, chunk: &str, out: &mut Vec<u32>) {
        let mut symbols: Vec<String> = chunk
            .bytes()
            .map(|b| self.byte_to_char[b as usize].to_string())
            .collect();

        // Merge the lowest-ranked adjacent pair until none is mergeable.
        loop {
            let best = symbols
                .windows(2)
                .enumerate()
                .filter_map(|(i, pair)| {
                    self.merge_ranks
                        .get(&(pair[0].clone(), pair[1].clone()))
                        .map(|&rank| (rank, i))
                })
                .min();
            let Some((rank, _)) = best else {
                break;
            };
            let mut merged = Vec::with_capacity(symbols.len());
            let mut i = 0;
            while i < symbols.len() {
                if i + 1 < symbols.len()
                    && self.merge_ranks.get(&(symbols[i].clone(), symbols[i + 1].clone()))
                        == Some(&rank)
                {
                    merged.push(format!("{}{}", symbols[i], symbols[i + 1]));
                    i += 2;
                } else {
                    merged.push(symbols[i].clone());
                    i += 1;
                }
            }
            symbols = merged;
        }

        for symbol in &symbols {
            match self.token_to_id.get(symbol) {
                Some(&id) => out.push(id),
                None => warn!(symbol = %symbol, "symbol missing from vocabulary"),
            }
        }
    }
}

/// Build the GPT-2 byte-to-unicode mapping table.
///
/// GPT-2 maps bytes 0-255 to displayable Unicode characters:
/// - Printable ASCII (33-126), Latin-1 supplement (161-172, 174-255)
///   are mapped to themselves.
/// - All other bytes (0-32, 127-160, 173) are mapped to U+0100..U+0143
///   to avoid control characters in the token vocabulary.
pub(crate) fn build_byte_mapping() -> ([char; 256], HashMap<char, u8>) {
    let mut byte_to_char = ['\0'; 256];
    let mut char_to_byte = HashMap::new();

    let mut direct: Vec<u8> = Vec::new();
    direct.extend(33u8..=126);
    direct.extend(161u8..=172);
    direct.extend(174u8..=255);

    for &b in &direct {
        let c = b as char;
        byte_to_char[b as usize] = c;
        char_to_byte.insert(c, b);
    }

    let mut remap_idx: u32 = 256; // U+0100
    for b in 0u16..=255 {
        let b = b as u8;
        if byte_to_char[b as usize] == '\0' {
            let c = char::from_u32(remap_idx).unwrap_or('\0');
            byte_to_char[b as usize] = c;
            char_to_byte.insert(c, b);
            remap_idx += 1;
        }
    }

    (byte_to_char, char_to_byte)
}

/// Split text into segments, isolating special tokens as separate items.
fn split_special_tokens(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let earliest = SPECIAL_TOKENS
            .iter()
            .filter_map(|&special| remaining.find(special).map(|pos| (pos, special)))
            .min_by_key(|&(pos, _)| pos);

        match earliest {
            Some((pos, special)) => {
                if pos > 0 {
                    segments.push(&remaining[..pos]);
                }
                segments.push(special);
                remaining = &remaining[pos + special.len()..];
            }
            None => {
                segments.push(remaining);
                break;
            }
        }
    }

    segments
}

/// Split text into GPT-2 pre-tokenized chunks; BPE merges never cross them.
fn pretokenize<'a>(pattern: &Regex, text: &'a str) -> Vec<&'a str> {
    let mut chunks = Vec::new();
    let mut end = 0;
    for found in pattern.find_iter(text) {
        match found {
            Ok(m) => {
                chunks.push(m.as_str());
                end = m.end();
            }
            Err(e) => {
                warn!(error = %e, "pre-tokenization stopped early");
                break;
            }
        }
    }
    // keep the text covered even if matching stopped
    if end < text.len() {
        chunks.push(&text[end..]);
    }
    chunks
}

/// Extract a string array from GGUF metadata.
fn get_string_array(
    metadata: &HashMap<String, gguf_file::Value>,
    key: &str,
) -> anyhow::Result<Vec<String>> {
    let value = metadata
        .get(key)
        .ok_or_else(|| anyhow::anyhow!("missing GGUF metadata key: {key}"))?;
    let arr = value
        .to_vec()
        .map_err(|e| anyhow::anyhow!("metadata key {key} is not an array: {e}"))?;
    arr.iter()
        .map(|v| {
            v.to_string()
                .cloned()
                .map_err(|e| anyhow::anyhow!("non-string element in {key}: {e}"))
        })
        .collect()
}

/// A byte-level vocabulary: the 256 byte tokens (id = byte value), then
/// `<|endoftext|>`, then one token per merge.
#[cfg(test)]
pub(crate) fn byte_tokenizer(merges: &[(&str, &str)]) -> BpeTokenizer {
    let (byte_to_char, _) = build_byte_mapping();
    let mut tokens: Vec<String> = byte_to_char.iter().map(|c| c.to_string()).collect();
    tokens.push(END_OF_TEXT.to_string());
    tokens.extend(merges.iter().map(|(l, r)| format!("{l}{r}")));
    let merges = merges
        .iter()
        .map(|(l, r)| (l.to_string(), r.to_string()))
        .collect();
    BpeTokenizer::from_parts(tokens, merges, 256).unwrap()
}

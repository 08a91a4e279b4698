use crate::oracle::{CacheLen, ScoredText, ScoringOracle};
use crate::tags::LexiconTagger;

const TEST_LEXICON: &[(&str, &str, &str)] = &[
    ("mám", "mít", "VB-S---1P-AA---"),
    ("máš", "mít", "VB-S---2P-AA---"),
    ("má", "mít", "VB-S---3P-AA---"),
    ("máme", "mít", "VB-P---1P-AA---"),
    ("máte", "mít", "VB-P---2P-AA---"),
    ("mají", "mít", "VB-P---3P-AA---"),
    ("vidím", "vidět", "VB-S---1P-AA---"),
    ("vidíš", "vidět", "VB-S---2P-AA---"),
    ("vidí", "vidět", "VB-S---3P-AA---"),
    ("pro", "pro", "RR--4----------"),
    ("tebe", "ty", "PP-S4--2-------"),
    ("ty", "ty", "PP-S1--2-------"),
    ("vás", "vy", "PP-P4--2-------"),
    ("překvapení", "překvapení", "NNNS4-----A----"),
    ("překvapení", "překvapení", "NNNP4-----A----"),
    ("malý", "malý", "AAMS1----1A----"),
    ("malá", "malý", "AAFS1----1A----"),
    ("malí", "malý", "AAMP1----1A----"),
    ("malého", "malý", "AAMS4----1A----"),
    ("malého", "malý", "AAMS2----1A----"),
    ("malou", "malý", "AAFS4----1A----"),
    ("malé", "malý", "AAFP4----1A----"),
    ("pes", "pes", "NNMS1-----A----"),
    ("psa", "pes", "NNMS4-----A----"),
    ("psy", "pes", "NNMP4-----A----"),
    ("kočka", "kočka", "NNFS1-----A----"),
    ("kočku", "kočka", "NNFS4-----A----"),
    ("kočky", "kočka", "NNFP4-----A----"),
];

/// A small Czech lexicon covering the sentences used in tests.
pub fn test_tagger() -> LexiconTagger {
    LexiconTagger::from_entries(TEST_LEXICON.iter().copied())
}

/// Cache stand-in: remembers how many characters were already scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCache {
    pub len: usize,
}

impl CacheLen for StubCache {
    fn cache_len(&self) -> usize {
        self.len
    }
}

/// Oracle that likes exactly one text.
///
/// Every character costs 0 while the text is still a prefix of `target` and
/// 1 afterwards, so surprisal is additive over characters and only the
/// target itself scores 0. Characters count as tokens.
pub struct TargetOracle {
    target: Vec<char>,
    pub calls: usize,
    pub batch_sizes: Vec<usize>,
    pub cached_inputs: usize,
}

impl TargetOracle {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.chars().collect(),
            calls: 0,
            batch_sizes: Vec::new(),
            cached_inputs: 0,
        }
    }

    /// Surprisal of the characters of `text` from index `start` on.
    pub fn surprisal_from(&self, text: &str, start: usize) -> f64 {
        let chars: Vec<char> = text.chars().collect();
        let matching = chars
            .iter()
            .zip(&self.target)
            .take_while(|(a, b)| a == b)
            .count();
        (start..chars.len()).filter(|&i| i >= matching).count() as f64
    }
}

impl ScoringOracle for TargetOracle {
    type Cache = StubCache;

    fn score(
        &mut self,
        texts: &[String],
        caches: &[Option<StubCache>],
    ) -> anyhow::Result<Vec<ScoredText<StubCache>>> {
        anyhow::ensure!(texts.len() == caches.len(), "texts and caches differ in length");
        self.calls += 1;
        self.batch_sizes.push(texts.len());
        self.cached_inputs += caches.iter().filter(|c| c.is_some()).count();
        Ok(texts
            .iter()
            .zip(caches)
            .map(|(text, cache)| {
                let start = cache.as_ref().map_or(0, |c| c.len);
                ScoredText {
                    surprisal: self.surprisal_from(text, start),
                    cache: Some(StubCache {
                        len: text.chars().count(),
                    }),
                }
            })
            .collect())
    }
}

/// Oracle that always fails.
pub struct FailingOracle;

impl ScoringOracle for FailingOracle {
    type Cache = StubCache;

    fn score(
        &mut self,
        _texts: &[String],
        _caches: &[Option<StubCache>],
    ) -> anyhow::Result<Vec<ScoredText<StubCache>>> {
        anyhow::bail!("model is unavailable")
    }
}

/// Oracle whose cost for each character depends on the whole prefix ending
/// there, so every path carries a nonzero cost.
///
/// Each character costs between 1 and 11, drawn from an FNV-1a hash of the
/// prefix. Surprisal stays additive over characters.
pub struct PrefixHashOracle;

impl PrefixHashOracle {
    fn char_cost(prefix: &str) -> f64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in prefix.bytes() {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        1.0 + (hash % 1000) as f64 / 100.0
    }

    /// Cost of the characters of `text` from index `start` on.
    pub fn surprisal_from(text: &str, start: usize) -> f64 {
        text.char_indices()
            .skip(start)
            .map(|(i, c)| Self::char_cost(&text[..i + c.len_utf8()]))
            .sum()
    }
}

impl ScoringOracle for PrefixHashOracle {
    type Cache = StubCache;

    fn score(
        &mut self,
        texts: &[String],
        caches: &[Option<StubCache>],
    ) -> anyhow::Result<Vec<ScoredText<StubCache>>> {
        anyhow::ensure!(texts.len() == caches.len(), "texts and caches differ in length");
        Ok(texts
            .iter()
            .zip(caches)
            .map(|(text, cache)| ScoredText {
                surprisal: Self::surprisal_from(text, cache.as_ref().map_or(0, |c| c.len)),
                cache: Some(StubCache {
                    len: text.chars().count(),
                }),
            })
            .collect())
    }
}

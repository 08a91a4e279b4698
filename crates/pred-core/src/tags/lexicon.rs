//! Dictionary-driven tagger.
//!
//! The lexicon is a tab-separated list of `form  lemma  tag` triples, one per
//! line, in the order of preference: when a form has several analyses the
//! first one is used for tagging. Every entry also contributes to the
//! paradigm of its lemma, which is what [`Tagger::generate`] searches.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::Path;

use tracing::debug;

use super::{TagPattern, TaggedForm, Tagger};

const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '…'];

#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct LexiconTagger {
    /// lowercased form → (lemma, tag) of its preferred analysis
    analyses: HashMap<String, (String, String)>,
    /// lemma → (form, tag) in lexicon order
    paradigms: HashMap<String, Vec<(String, String)>>,
    entry_count: usize,
}

impl LexiconTagger {
    pub fn open(path: &Path) -> Result<Self, LexiconError> {
        let content = fs::read_to_string(path)?;
        let tagger = Self::parse(&content)?;
        debug!(
            path = %path.display(),
            entries = tagger.entry_count,
            lemmas = tagger.paradigms.len(),
            "lexicon loaded"
        );
        Ok(tagger)
    }

    pub fn parse(content: &str) -> Result<Self, LexiconError> {
        let mut tagger = Self::default();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                return Err(LexiconError::Parse {
                    line: i + 1,
                    reason: format!("expected 3 tab-separated fields, got {}", fields.len()),
                });
            }
            if fields.iter().any(|f| f.is_empty()) {
                return Err(LexiconError::Parse {
                    line: i + 1,
                    reason: "empty field".to_string(),
                });
            }
            tagger.insert(fields[0], fields[1], fields[2]);
        }
        Ok(tagger)
    }

    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut tagger = Self::default();
        for (form, lemma, tag) in entries {
            tagger.insert(form, lemma, tag);
        }
        tagger
    }

    fn insert(&mut self, form: &str, lemma: &str, tag: &str) {
        self.analyses
            .entry(form.to_lowercase())
            .or_insert_with(|| (lemma.to_string(), tag.to_string()));
        self.paradigms
            .entry(lemma.to_string())
            .or_default()
            .push((form.to_string(), tag.to_string()));
        self.entry_count += 1;
    }

    /// Number of lexicon entries.
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}

impl Tagger for LexiconTagger {
    fn tag(&self, text: &str) -> Vec<TaggedForm> {
        segment(text)
            .into_iter()
            .map(|seg| {
                let form = &text[seg.range.clone()];
                if seg.kind != SegmentKind::Word {
                    return TaggedForm::fixed(form);
                }
                match self.analyses.get(&form.to_lowercase()) {
                    Some((lemma, tag)) => TaggedForm::new(lemma.as_str(), tag.as_str(), form),
                    None => TaggedForm::fixed(form),
                }
            })
            .collect()
    }

    fn split_sentences(&self, text: &str) -> Vec<String> {
        split_sentences(text)
    }

    fn generate(&self, lemma: &str, wildcard: &str) -> Vec<String> {
        let Some(paradigm) = self.paradigms.get(lemma) else {
            return Vec::new();
        };
        let pattern = TagPattern::parse(wildcard);
        let mut forms: Vec<String> = Vec::new();
        for (form, tag) in paradigm {
            if pattern.matches(tag) && !forms.contains(form) {
                forms.push(form.clone());
            }
        }
        forms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Word,
    Punct,
    Space,
}

#[derive(Debug, Clone)]
struct Segment {
    kind: SegmentKind,
    range: Range<usize>,
}

/// Split text into word runs, single punctuation chars and whitespace runs.
fn segment(text: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for (i, c) in text.char_indices() {
        let kind = if c.is_whitespace() {
            SegmentKind::Space
        } else if c.is_alphanumeric() {
            SegmentKind::Word
        } else {
            SegmentKind::Punct
        };
        let end = i + c.len_utf8();
        match segments.last_mut() {
            Some(last) if last.kind == kind && kind != SegmentKind::Punct => last.range.end = end,
            _ => segments.push(Segment {
                kind,
                range: i..end,
            }),
        }
    }
    segments
}

fn is_terminator(text: &str, seg: &Segment) -> bool {
    seg.kind == SegmentKind::Punct
        && text[seg.range.clone()]
            .chars()
            .all(|c| SENTENCE_TERMINATORS.contains(&c))
}

/// Split text into sentences, keeping the gaps between them as separate items.
fn split_sentences(text: &str) -> Vec<String> {
    let segments = segment(text);
    let mut result = Vec::new();
    let mut pos = 0;
    let mut sentence_start: Option<usize> = None;

    for (i, seg) in segments.iter().enumerate() {
        if seg.kind == SegmentKind::Space {
            continue;
        }
        let start = *sentence_start.get_or_insert(seg.range.start);
        let next_is_boundary = segments
            .get(i + 1)
            .map_or(true, |next| next.kind == SegmentKind::Space);
        if is_terminator(text, seg) && next_is_boundary {
            if start > pos {
                result.push(text[pos..start].to_string());
            }
            result.push(text[start..seg.range.end].to_string());
            pos = seg.range.end;
            sentence_start = None;
        }
    }

    if let Some(start) = sentence_start {
        // unterminated final sentence ends at its last token
        let end = segments
            .iter()
            .rev()
            .find(|s| s.kind != SegmentKind::Space)
            .map_or(text.len(), |s| s.range.end);
        if start > pos {
            result.push(text[pos..start].to_string());
        }
        result.push(text[start..end].to_string());
        pos = end;
    }
    if pos < text.len() {
        result.push(text[pos..].to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_tagger;

    fn forms(tagged: &[TaggedForm]) -> Vec<&str> {
        tagged.iter().map(|f| f.form.as_str()).collect()
    }

    #[test]
    fn test_tag_covers_text() {
        let tagger = test_tagger();
        let text = "Mám pro tebe překvapení.";
        let tagged = tagger.tag(text);
        assert_eq!(
            forms(&tagged),
            vec!["Mám", " ", "pro", " ", "tebe", " ", "překvapení", "."]
        );
        assert_eq!(tagged.iter().map(|f| f.form.as_str()).collect::<String>(), text);
    }

    #[test]
    fn test_tag_lookup_is_case_insensitive() {
        let tagger = test_tagger();
        let tagged = tagger.tag("Mám");
        assert_eq!(tagged[0].lemma.as_deref(), Some("mít"));
        assert_eq!(tagged[0].form, "Mám");
    }

    #[test]
    fn test_unknown_and_punctuation_are_fixed() {
        let tagger = test_tagger();
        let tagged = tagger.tag("xyz, 42!");
        assert_eq!(forms(&tagged), vec!["xyz", ",", " ", "42", "!"]);
        assert!(tagged.iter().all(|f| !f.is_taggable()));
    }

    #[test]
    fn test_punctuation_chars_are_separate_tokens() {
        let tagger = test_tagger();
        assert_eq!(forms(&tagger.tag("ano?!")), vec!["ano", "?", "!"]);
    }

    #[test]
    fn test_split_sentences() {
        let text = "Ahoj Pepo! Mám pro tebe překvapení. Hádej, co to je.";
        assert_eq!(
            split_sentences(text),
            vec![
                "Ahoj Pepo!",
                " ",
                "Mám pro tebe překvapení.",
                " ",
                "Hádej, co to je."
            ]
        );
    }

    #[test]
    fn test_split_sentences_reconstructs_text() {
        for text in [
            "  Leading space. And trailing  ",
            "No terminator here",
            "Dvě věty?! Ano… Konec.\n",
            "",
            "   ",
        ] {
            assert_eq!(split_sentences(text).concat(), text, "text: {text:?}");
        }
    }

    #[test]
    fn test_split_sentences_inner_punctuation() {
        // a dot not followed by whitespace does not end the sentence
        assert_eq!(split_sentences("Verze 1.5 je hotová."), vec!["Verze 1.5 je hotová."]);
    }

    #[test]
    fn test_generate_filters_by_wildcard() {
        let tagger = test_tagger();
        let forms = tagger.generate("malý", "AA??1???-1A---[-1]");
        assert_eq!(forms, vec!["malý", "malá", "malí"]);
        assert!(tagger.generate("neznámé", "?").is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let err = LexiconTagger::parse("dům\tdům\n").unwrap_err();
        assert!(matches!(err, LexiconError::Parse { line: 1, .. }));

        let err = LexiconTagger::parse("# comment\n\ndům\t\tNNIS1-----A----\n").unwrap_err();
        assert!(matches!(err, LexiconError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.tsv");
        fs::write(&path, "# form\tlemma\ttag\ndům\tdům\tNNIS1-----A----\n").unwrap();
        let tagger = LexiconTagger::open(&path).unwrap();
        assert_eq!(tagger.len(), 1);
        assert_eq!(tagger.tag("dům")[0].tag.as_deref(), Some("NNIS1-----A----"));
    }
}

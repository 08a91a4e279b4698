//! Morphological tagging boundary.
//!
//! The engine consumes tagged text through the [`Tagger`] trait: the text is
//! segmented into [`TaggedForm`]s whose concatenation reproduces it verbatim,
//! and every taggable form can be re-generated in other grammatical shapes
//! of the same lemma. [`LexiconTagger`] is a dictionary-driven implementation
//! used by the CLI and the tests.

mod lexicon;
mod pattern;

use std::collections::BTreeSet;

pub use lexicon::{LexiconError, LexiconTagger};
pub use pattern::TagPattern;

/// One token-level unit of tagged text.
///
/// A `None` lemma or tag marks a form that is never re-inflected:
/// whitespace, punctuation, unknown words and the forced replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedForm {
    pub lemma: Option<String>,
    pub tag: Option<String>,
    pub form: String,
}

impl TaggedForm {
    pub fn new(lemma: impl Into<String>, tag: impl Into<String>, form: impl Into<String>) -> Self {
        Self {
            lemma: Some(lemma.into()),
            tag: Some(tag.into()),
            form: form.into(),
        }
    }

    /// A form that must surface verbatim.
    pub fn fixed(form: impl Into<String>) -> Self {
        Self {
            lemma: None,
            tag: None,
            form: form.into(),
        }
    }

    pub fn is_taggable(&self) -> bool {
        self.lemma.is_some() && self.tag.is_some()
    }

    /// Whether the form is a whitespace-only gap between tokens.
    pub fn is_whitespace(&self) -> bool {
        self.form.trim().is_empty()
    }

    /// Length of the surface form in characters.
    pub fn char_len(&self) -> usize {
        self.form.chars().count()
    }
}

/// Tagger and morphological generator.
///
/// Implementations must be deterministic for identical input.
pub trait Tagger: Send + Sync {
    /// Segment and tag `text`. Concatenating the forms reproduces `text`.
    fn tag(&self, text: &str) -> Vec<TaggedForm>;

    /// Split `text` into sentences and the gaps between them.
    /// Concatenating the items reproduces `text`.
    fn split_sentences(&self, text: &str) -> Vec<String>;

    /// All surface forms of `lemma` whose tag matches `wildcard`.
    fn generate(&self, lemma: &str, wildcard: &str) -> Vec<String>;
}

/// Positions (1-based) of the positional tag that may change during
/// re-inflection: gender, number, possessor's gender, possessor's number
/// and person.
const RELAXED_POSITIONS: [usize; 5] = [3, 4, 6, 7, 8];
const AGGREGATE_POSITION: usize = 14;
const VARIANT_POSITION: usize = 15;

/// Build the tag wildcard used to generate alternative forms of a word.
///
/// Agreement categories become `?`, the aggregate position is relaxed unless
/// it is `-`, and the variant position is restricted to standard or first
/// variants (`[-1]`). Positions missing from a short tag are left alone.
pub fn tag_wildcard(tag: &str) -> String {
    let mut parts: Vec<String> = tag.chars().map(|c| c.to_string()).collect();
    for pos in RELAXED_POSITIONS {
        if let Some(part) = parts.get_mut(pos - 1) {
            *part = "?".to_string();
        }
    }
    if let Some(part) = parts.get_mut(AGGREGATE_POSITION - 1) {
        if part != "-" {
            *part = "?".to_string();
        }
    }
    if let Some(part) = parts.get_mut(VARIANT_POSITION - 1) {
        *part = "[-1]".to_string();
    }
    parts.concat()
}

/// Copy the capitalisation of `reference` onto `word`.
pub fn copy_case(word: &str, reference: &str) -> String {
    if is_upper(reference) {
        return word.to_uppercase();
    }
    match reference.chars().next() {
        Some(first) if first.is_uppercase() => capitalize(word),
        _ => word.to_string(),
    }
}

/// True if `s` has at least one cased character and all of them are uppercase.
fn is_upper(s: &str) -> bool {
    let mut cased = s.chars().filter(|c| c.is_uppercase() || c.is_lowercase());
    let mut any = false;
    let all_upper = cased.all(|c| {
        any = true;
        c.is_uppercase()
    });
    any && all_upper
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The surface forms a tagged form may take during substitution.
///
/// Untaggable forms only surface as themselves. Taggable forms add every
/// form of their lemma matching the relaxed tag, with the original
/// capitalisation. The original form is always included.
pub fn word_variations(tagger: &dyn Tagger, original: &TaggedForm) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    result.insert(original.form.clone());
    let (Some(lemma), Some(tag)) = (&original.lemma, &original.tag) else {
        return result;
    };
    let wildcard = tag_wildcard(tag);
    for form in tagger.generate(lemma, &wildcard) {
        result.insert(copy_case(&form, &original.form));
    }
    result
}

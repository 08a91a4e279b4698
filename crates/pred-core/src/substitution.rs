//! Substitution entry points.
//!
//! A substitution replaces one token of a longer text. Only the sentence
//! holding the token is searched; the sentences around it are copied
//! through untouched.

use tracing::{debug, debug_span};

use crate::oracle::ScoringOracle;
use crate::search::{SearchEngine, SearchOutcome};
use crate::settings::SubstitutionConfig;
use crate::tags::Tagger;
use crate::variants::VariantIndex;

#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("span at {start} of length {length} is not exactly one token")]
    Alignment { start: usize, length: usize },

    #[error("no sentence contains offset {offset}")]
    SentenceNotFound { offset: usize },

    #[error("no extension available at position {position}")]
    Stalled { position: usize },

    #[error("extension start {begin} is past the last position ({num_forms} forms)")]
    ExtensionOutOfRange { begin: usize, num_forms: usize },

    #[error("oracle returned {actual} results for {expected} texts")]
    OracleBatch { expected: usize, actual: usize },

    #[error("scoring failed: {0}")]
    Oracle(anyhow::Error),
}

/// A text cut around the sentence holding the replaced token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceSplit {
    pub previous: String,
    pub sentence: String,
    pub next: String,
}

/// Locate the sentence of `before + old + after` in which `old` starts.
pub fn find_sentence_with_old(
    tagger: &dyn Tagger,
    before: &str,
    old: &str,
    after: &str,
) -> Result<SentenceSplit, SubstitutionError> {
    let text = format!("{before}{old}{after}");
    let sentences = tagger.split_sentences(&text);

    let mut end = 0;
    let target = sentences.iter().position(|s| {
        end += s.len();
        end > before.len()
    });
    let Some(target) = target else {
        return Err(SubstitutionError::SentenceNotFound {
            offset: before.chars().count(),
        });
    };
    Ok(SentenceSplit {
        previous: sentences[..target].concat(),
        sentence: sentences[target].clone(),
        next: sentences[target + 1..].concat(),
    })
}

/// Replace `old` with `replacement` and re-inflect the rest of its sentence.
///
/// Returns the whole text with only that sentence changed.
pub fn replace<O: ScoringOracle>(
    oracle: O,
    tagger: &dyn Tagger,
    before: &str,
    old: &str,
    after: &str,
    replacement: &str,
    config: &SubstitutionConfig,
) -> Result<String, SubstitutionError> {
    replace_with_outcome(oracle, tagger, before, old, after, replacement, config)
        .map(|(text, _)| text)
}

/// [`replace`], also returning the search statistics of the rewritten sentence.
pub fn replace_with_outcome<O: ScoringOracle>(
    oracle: O,
    tagger: &dyn Tagger,
    before: &str,
    old: &str,
    after: &str,
    replacement: &str,
    config: &SubstitutionConfig,
) -> Result<(String, SearchOutcome), SubstitutionError> {
    let _span = debug_span!("substitution", old, replacement).entered();
    let split = find_sentence_with_old(tagger, before, old, after)?;
    if split.next.len() > after.len() {
        // old runs into the following sentence
        return Err(SubstitutionError::Alignment {
            start: before.chars().count(),
            length: old.chars().count(),
        });
    }
    let outcome = replace_sentence(
        oracle,
        tagger,
        &before[split.previous.len()..],
        old,
        &after[..after.len() - split.next.len()],
        replacement,
        config,
    )?;
    let text = format!("{}{}{}", split.previous, outcome.text, split.next);
    Ok((text, outcome))
}

/// [`replace`] addressed by a character span of `text`.
pub fn replace_in_text<O: ScoringOracle>(
    oracle: O,
    tagger: &dyn Tagger,
    text: &str,
    start: usize,
    length: usize,
    replacement: &str,
    config: &SubstitutionConfig,
) -> Result<String, SubstitutionError> {
    let (before, old, after) = split_span(text, start, length)?;
    replace(oracle, tagger, before, old, after, replacement, config)
}

/// Cut `text` into the parts before, inside and after a character span.
pub fn split_span(
    text: &str,
    start: usize,
    length: usize,
) -> Result<(&str, &str, &str), SubstitutionError> {
    let (Some(old_start), Some(old_end)) = (
        char_to_byte(text, start),
        start.checked_add(length).and_then(|end| char_to_byte(text, end)),
    ) else {
        return Err(SubstitutionError::Alignment { start, length });
    };
    Ok((
        &text[..old_start],
        &text[old_start..old_end],
        &text[old_end..],
    ))
}

/// Search one sentence, `before + old + after`, for the best rewrite with
/// `old` replaced.
pub fn replace_sentence<O: ScoringOracle>(
    oracle: O,
    tagger: &dyn Tagger,
    before: &str,
    old: &str,
    after: &str,
    replacement: &str,
    config: &SubstitutionConfig,
) -> Result<SearchOutcome, SubstitutionError> {
    let sentence = format!("{before}{old}{after}");
    let index = VariantIndex::new(
        tagger,
        &sentence,
        before.chars().count(),
        old.chars().count(),
        replacement,
    )?;
    let outcome = SearchEngine::new(oracle, config).run(&index)?;
    debug!(
        sentence = %sentence,
        output = %outcome.text,
        iterations = outcome.iterations,
        scored = outcome.scored_nodes,
        "sentence replaced"
    );
    Ok(outcome)
}

/// Byte offset of the `chars`-th character; the text length for one past the end.
fn char_to_byte(text: &str, chars: usize) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(chars)
}

//! Morphological variant index.
//!
//! Tags one sentence, forces the replacement into it and precomputes the
//! set of surface forms every word position may take. The search consumes
//! it through [`VariantIndex::get_extensions`], which groups consecutive
//! positions into one extension step.

use std::collections::BTreeSet;

use tracing::trace;

use crate::substitution::SubstitutionError;
use crate::tags::{word_variations, TaggedForm, Tagger};

/// Candidate continuations spanning positions `begin..end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extensions {
    /// Distinct extension strings in lexicographic order.
    pub texts: Vec<String>,
    /// Exclusive end position of every extension.
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct VariantIndex {
    forms: Vec<TaggedForm>,
    variants: Vec<Vec<String>>,
}

impl VariantIndex {
    /// Tag `text` and force `replacement` over the form at `start..start + length`.
    ///
    /// `start` and `length` are character offsets and must cover exactly one
    /// tagged form.
    pub fn new(
        tagger: &dyn Tagger,
        text: &str,
        start: usize,
        length: usize,
        replacement: &str,
    ) -> Result<Self, SubstitutionError> {
        let mut forms = tagger.tag(text);
        force_replacement(&mut forms, start, length, replacement)?;
        let variants = forms
            .iter()
            .map(|form| word_variations(tagger, form).into_iter().collect())
            .collect();
        Ok(Self { forms, variants })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(forms: Vec<TaggedForm>, variants: Vec<Vec<String>>) -> Self {
        assert_eq!(forms.len(), variants.len());
        Self { forms, variants }
    }

    /// Total number of word positions.
    pub fn num_forms(&self) -> usize {
        self.forms.len()
    }

    pub fn forms(&self) -> &[TaggedForm] {
        &self.forms
    }

    /// Surface alternatives of position `i`.
    pub fn variants(&self, i: usize) -> &[String] {
        &self.variants[i]
    }

    /// The sentence with the replacement applied and nothing re-inflected.
    pub fn literal_text(&self) -> String {
        self.forms.iter().map(|f| f.form.as_str()).collect()
    }

    /// Build the extensions of a prefix that ends before position `begin`.
    ///
    /// At least `min_variants` (clamped to 2) alternatives are produced unless
    /// the end of the sentence comes first.
    pub fn get_extensions(
        &self,
        begin: usize,
        min_variants: usize,
    ) -> Result<Extensions, SubstitutionError> {
        if begin >= self.num_forms() {
            return Err(SubstitutionError::ExtensionOutOfRange {
                begin,
                num_forms: self.num_forms(),
            });
        }
        let min_variants = min_variants.max(2);
        let end = self.extension_end(begin, min_variants);

        let mut extensions: BTreeSet<String> = BTreeSet::from([String::new()]);
        for variants in &self.variants[begin..end] {
            extensions = extensions
                .iter()
                .flat_map(|prefix| variants.iter().map(move |v| format!("{prefix}{v}")))
                .collect();
        }
        if extensions.is_empty() {
            return Err(SubstitutionError::Stalled { position: begin });
        }
        trace!(begin, end, count = extensions.len(), "extensions");
        Ok(Extensions {
            texts: extensions.into_iter().collect(),
            end,
        })
    }

    /// Exclusive end of the extension starting at `begin`.
    ///
    /// Once `min_variants` alternatives are reached, positions keep being
    /// absorbed while they do not multiply the count. The extension then
    /// stops after its last non-whitespace position so that it never ends
    /// with a gap.
    fn extension_end(&self, begin: usize, min_variants: usize) -> usize {
        let mut last_non_whitespace = begin;
        let mut total: usize = 1;
        for i in begin..self.variants.len() {
            let here = self.variants[i].len();
            if total >= min_variants && here > 1 {
                return last_non_whitespace + 1;
            }
            total = total.saturating_mul(here);
            if !self.forms[i].is_whitespace() {
                last_non_whitespace = i;
            }
        }
        self.forms.len()
    }
}

/// Overwrite the form at char offset `start` with a fixed `replacement`.
fn force_replacement(
    forms: &mut [TaggedForm],
    start: usize,
    length: usize,
    replacement: &str,
) -> Result<(), SubstitutionError> {
    let mut pos = 0;
    for form in forms.iter_mut() {
        let len = form.char_len();
        if pos == start && len == length {
            *form = TaggedForm::fixed(replacement);
            return Ok(());
        } else if pos < start {
            pos += len;
        } else {
            break;
        }
    }
    Err(SubstitutionError::Alignment { start, length })
}

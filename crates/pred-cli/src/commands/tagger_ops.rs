use pred_core::tags::{word_variations, Tagger};

use super::{die, Resources};

pub fn variants(resources: &Resources, text: &str) {
    let tagger = die!(resources.load_tagger(), "Error loading lexicon: {:#}");
    for line in render_variants(&tagger, text) {
        println!("{line}");
    }
}

pub fn sentences(resources: &Resources, text: &str) {
    let tagger = die!(resources.load_tagger(), "Error loading lexicon: {:#}");
    for line in render_sentences(&tagger, text) {
        println!("{line}");
    }
}

/// One line per non-whitespace form: form, lemma, tag and its variant set.
pub fn render_variants(tagger: &dyn Tagger, text: &str) -> Vec<String> {
    tagger
        .tag(text)
        .iter()
        .filter(|form| !form.is_whitespace())
        .map(|form| match (&form.lemma, &form.tag) {
            (Some(lemma), Some(tag)) => {
                let variants: Vec<String> = word_variations(tagger, form).into_iter().collect();
                format!("{}\t{lemma}\t{tag}\t{}", form.form, variants.join(", "))
            }
            _ => format!("{}\t-\t-", form.form),
        })
        .collect()
}

pub fn render_sentences(tagger: &dyn Tagger, text: &str) -> Vec<String> {
    tagger
        .split_sentences(text)
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{i:>3}: {item:?}"))
        .collect()
}

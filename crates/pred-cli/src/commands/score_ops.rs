use std::time::Instant;

use tracing::info;

use pred_core::oracle::ScoringOracle;

use super::{die, Resources};

/// Print the surprisal of each text, scored from scratch in one batch.
pub fn score(resources: &Resources, texts: &[String]) {
    let mut scorer = die!(resources.load_scorer(), "Error loading neural model: {:#}");
    println!("Model: {}", scorer.config_summary());

    let start = Instant::now();
    let caches = vec![None; texts.len()];
    let scored = die!(scorer.score(texts, &caches), "Error scoring: {:#}");
    let elapsed = start.elapsed();

    for (text, result) in texts.iter().zip(&scored) {
        let tokens = scorer.tokenizer().encode(text).len();
        println!("{:>10.4}  {tokens:>4} tok  {text}", result.surprisal);
    }
    info!(
        texts = texts.len(),
        latency_ms = elapsed.as_secs_f64() * 1000.0,
        "batch scored"
    );
}

use std::fs;
use std::io::{self, Read};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use pred_core::api::handle_json;
use pred_core::search::SearchOutcome;
use pred_core::substitution::{replace_with_outcome, split_span};

use super::{die, ConfigOverrides, Resources};

pub fn substitute(
    resources: &Resources,
    overrides: &ConfigOverrides,
    before: &str,
    old: &str,
    after: &str,
    replacement: &str,
) {
    let config = die!(overrides.resolve(), "Error: {}");
    let tagger = die!(resources.load_tagger(), "Error loading lexicon: {:#}");
    let mut scorer = die!(resources.load_scorer(), "Error loading neural model: {:#}");

    let start = Instant::now();
    let (output, outcome) = die!(
        replace_with_outcome(
            &mut scorer,
            &tagger,
            before,
            old,
            after,
            replacement,
            &config
        ),
        "Error: {}"
    );
    let elapsed = start.elapsed();

    println!("{output}");
    report_outcome(&outcome, elapsed);
}

pub fn substitute_span(
    resources: &Resources,
    overrides: &ConfigOverrides,
    text: &str,
    start: usize,
    length: usize,
    replacement: &str,
) {
    let (before, old, after) = die!(split_span(text, start, length), "Error: {}");
    substitute(resources, overrides, before, old, after, replacement);
}

/// Answer one JSON request the way a front end would.
pub fn request(resources: &Resources, input: &str) {
    let body = die!(read_input(input), "Error reading {input}: {}");
    let tagger = die!(resources.load_tagger(), "Error loading lexicon: {:#}");
    let mut scorer = die!(resources.load_scorer(), "Error loading neural model: {:#}");

    let start = Instant::now();
    let result = handle_json(&body, &mut scorer, &tagger);
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    match result {
        Ok(response) => {
            info!(latency_ms, "request handled");
            println!("{}", die!(serde_json::to_string(&response), "Error: {}"));
        }
        Err(error) => {
            warn!(latency_ms, status = error.status, error = %error.error, "request rejected");
            println!("{}", die!(serde_json::to_string(&error), "Error: {}"));
            std::process::exit(if error.is_client_error() { 2 } else { 1 });
        }
    }
}

/// Contents of `path`, or of stdin for `-`.
pub fn read_input(path: &str) -> io::Result<String> {
    if path == "-" {
        let mut body = String::new();
        io::stdin().read_to_string(&mut body)?;
        Ok(body)
    } else {
        fs::read_to_string(path)
    }
}

/// Log the statistics of a finished substitution.
pub fn report_outcome(outcome: &SearchOutcome, elapsed: Duration) {
    info!(
        sentence = %outcome.text,
        score = outcome.score,
        iterations = outcome.iterations,
        oracle_calls = outcome.oracle_calls,
        scored_nodes = outcome.scored_nodes,
        latency_ms = elapsed.as_secs_f64() * 1000.0,
        "substitution finished"
    );
}

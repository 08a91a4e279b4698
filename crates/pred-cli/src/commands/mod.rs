pub mod config_ops;
pub mod score_ops;
pub mod substitute_ops;
pub mod tagger_ops;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context};
use tracing::info;

use pred_core::neural::NeuralScorer;
use pred_core::search::Strategy;
use pred_core::settings::{self, SettingsError, SubstitutionConfig, LEXICON_PATH_ENV, MODEL_PATH_ENV};
use pred_core::tags::LexiconTagger;

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            std::process::exit(1);
        })
    };
}
pub(crate) use die;

/// Search parameters given on the command line; unset ones fall back to
/// the settings file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub min_variants: Option<usize>,
    pub relax_count: Option<usize>,
    pub pool_factor: Option<usize>,
    pub lp_alpha: Option<f64>,
    pub strategy: Option<Strategy>,
}

impl ConfigOverrides {
    pub fn apply(&self, base: &SubstitutionConfig) -> Result<SubstitutionConfig, SettingsError> {
        let config = SubstitutionConfig {
            min_variants: self.min_variants.unwrap_or(base.min_variants),
            relax_count: self.relax_count.unwrap_or(base.relax_count),
            pool_factor: self.pool_factor.unwrap_or(base.pool_factor),
            lp_alpha: self.lp_alpha.unwrap_or(base.lp_alpha),
            strategy: self.strategy.unwrap_or(base.strategy),
        };
        config.validate()?;
        Ok(config)
    }

    /// Overrides applied on top of the global settings.
    pub fn resolve(&self) -> Result<SubstitutionConfig, SettingsError> {
        self.apply(&settings::settings().substitution)
    }
}

/// Model and lexicon locations from the command line.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub model: Option<String>,
    pub lexicon: Option<String>,
}

impl Resources {
    pub fn model_path(&self) -> anyhow::Result<PathBuf> {
        pick_path(
            self.model.as_deref(),
            settings::settings().resources.model_path(),
            "model",
            MODEL_PATH_ENV,
        )
    }

    pub fn lexicon_path(&self) -> anyhow::Result<PathBuf> {
        pick_path(
            self.lexicon.as_deref(),
            settings::settings().resources.lexicon_path(),
            "lexicon",
            LEXICON_PATH_ENV,
        )
    }

    pub fn load_tagger(&self) -> anyhow::Result<LexiconTagger> {
        let path = self.lexicon_path()?;
        let start = Instant::now();
        let tagger =
            LexiconTagger::open(&path).with_context(|| format!("reading {}", path.display()))?;
        info!(
            path = %path.display(),
            entries = tagger.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "lexicon loaded"
        );
        Ok(tagger)
    }

    pub fn load_scorer(&self) -> anyhow::Result<NeuralScorer> {
        let path = self.model_path()?;
        let start = Instant::now();
        let scorer =
            NeuralScorer::open(&path).with_context(|| format!("loading {}", path.display()))?;
        info!(
            path = %path.display(),
            model = %scorer.config_summary(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "model loaded"
        );
        Ok(scorer)
    }
}

/// A path flag wins over the configured (or environment) location.
fn pick_path(
    flag: Option<&str>,
    configured: Option<PathBuf>,
    what: &str,
    env: &str,
) -> anyhow::Result<PathBuf> {
    flag.filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or(configured)
        .ok_or_else(|| anyhow!("no {what} given: pass --{what} or set {env}"))
}

//! Global settings loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`
//!
//! [`SubstitutionConfig`] doubles as the per-request configuration: every
//! field has a default, so a request body may carry any subset of them.

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::search::{ScoreKey, Strategy};

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

pub const MODEL_PATH_ENV: &str = "PREDITOR_MODEL_PATH";
pub const LEXICON_PATH_ENV: &str = "PREDITOR_LEXICON_PATH";

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub substitution: SubstitutionConfig,
    #[serde(default)]
    pub resources: ResourceSettings,
}

/// Search parameters of one substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubstitutionConfig {
    /// Minimum number of extensions generated per relaxed node (at least 2).
    pub min_variants: usize,
    /// Nodes relaxed per oracle call.
    pub relax_count: usize,
    /// Candidate pool for cache-aware selection, in multiples of `relax_count`.
    pub pool_factor: usize,
    /// Length-penalty exponent in `[0, 1]`.
    pub lp_alpha: f64,
    pub strategy: Strategy,
}

impl Default for SubstitutionConfig {
    fn default() -> Self {
        Self {
            min_variants: 2,
            relax_count: 8,
            pool_factor: 5,
            lp_alpha: 0.0,
            strategy: Strategy::Cache,
        }
    }
}

impl SubstitutionConfig {
    pub fn validate(&self) -> Result<(), SettingsError> {
        macro_rules! check_at_least {
            ($field:ident, $min:expr) => {
                if self.$field < $min {
                    return Err(SettingsError::InvalidValue {
                        field: stringify!($field).to_string(),
                        reason: format!("must be at least {}", $min),
                    });
                }
            };
        }

        check_at_least!(min_variants, 2);
        check_at_least!(relax_count, 1);
        check_at_least!(pool_factor, 1);
        if !(0.0..=1.0).contains(&self.lp_alpha) {
            return Err(SettingsError::InvalidValue {
                field: "lp_alpha".to_string(),
                reason: "must be between 0 and 1".to_string(),
            });
        }
        Ok(())
    }

    /// Number of cheapest unfinished nodes considered by cache-aware selection.
    pub fn pool_size(&self) -> usize {
        self.relax_count.saturating_mul(self.pool_factor)
    }

    /// The ranking key; an exponent of 0 ranks by raw surprisal.
    pub fn score_key(&self) -> ScoreKey {
        if self.lp_alpha == 0.0 {
            ScoreKey::Surprisal
        } else {
            ScoreKey::LengthPenalty(self.lp_alpha)
        }
    }
}

/// Locations of the model and lexicon files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub model_path: String,
    pub lexicon_path: String,
}

impl ResourceSettings {
    /// GGUF model path; the environment takes precedence over the file.
    pub fn model_path(&self) -> Option<PathBuf> {
        resolve_path(env::var(MODEL_PATH_ENV).ok(), &self.model_path)
    }

    pub fn lexicon_path(&self) -> Option<PathBuf> {
        resolve_path(env::var(LEXICON_PATH_ENV).ok(), &self.lexicon_path)
    }
}

fn resolve_path(from_env: Option<String>, configured: &str) -> Option<PathBuf> {
    from_env
        .filter(|p| !p.is_empty())
        .or_else(|| (!configured.is_empty()).then(|| configured.to_string()))
        .map(PathBuf::from)
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    s.substitution.validate().map_err(|e| match e {
        SettingsError::InvalidValue { field, reason } => SettingsError::InvalidValue {
            field: format!("substitution.{field}"),
            reason,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_toml() {
        let s = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert_eq!(s.substitution, SubstitutionConfig::default());
        assert_eq!(s.substitution.pool_size(), 40);
        assert_eq!(s.substitution.score_key(), ScoreKey::Surprisal);
        assert!(s.resources.model_path.is_empty());
        assert!(s.resources.lexicon_path.is_empty());
    }

    #[test]
    fn parse_valid_custom_toml() {
        let toml = r#"
[substitution]
min_variants = 4
relax_count = 2
pool_factor = 3
lp_alpha = 0.5
strategy = "batch"

[resources]
model_path = "/models/gpt2.gguf"
"#;
        let s = parse_settings_toml(toml).unwrap();
        assert_eq!(s.substitution.min_variants, 4);
        assert_eq!(s.substitution.pool_size(), 6);
        assert_eq!(s.substitution.strategy, Strategy::Batch);
        assert_eq!(s.substitution.score_key(), ScoreKey::LengthPenalty(0.5));
        assert_eq!(s.resources.model_path, "/models/gpt2.gguf");
        assert!(s.resources.lexicon_path.is_empty());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let s = parse_settings_toml("[substitution]\nrelax_count = 3\n").unwrap();
        assert_eq!(s.substitution.relax_count, 3);
        assert_eq!(s.substitution.min_variants, 2);
        assert_eq!(s.substitution.strategy, Strategy::Cache);
    }

    #[test]
    fn reject_out_of_range_values() {
        for (body, field) in [
            ("min_variants = 1", "substitution.min_variants"),
            ("relax_count = 0", "substitution.relax_count"),
            ("pool_factor = 0", "substitution.pool_factor"),
            ("lp_alpha = 1.5", "substitution.lp_alpha"),
            ("lp_alpha = -0.1", "substitution.lp_alpha"),
        ] {
            let toml = format!("[substitution]\n{body}\n");
            match parse_settings_toml(&toml) {
                Err(SettingsError::InvalidValue { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{body}: expected InvalidValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn reject_unknown_strategy_and_fields() {
        let err = parse_settings_toml("[substitution]\nstrategy = \"greedy\"\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
        let err = parse_settings_toml("[substitution]\nrelax = 3\n").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn reject_invalid_toml_syntax() {
        let err = parse_settings_toml("this is not valid toml [[[").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn config_from_json_request() {
        let config: SubstitutionConfig =
            serde_json::from_str(r#"{"relax_count": 1, "lp_alpha": 1.0}"#).unwrap();
        assert_eq!(config.relax_count, 1);
        assert_eq!(config.pool_factor, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_configured_path() {
        assert_eq!(
            resolve_path(Some("/env/model.gguf".into()), "/file/model.gguf"),
            Some(PathBuf::from("/env/model.gguf"))
        );
        assert_eq!(
            resolve_path(Some(String::new()), "/file/model.gguf"),
            Some(PathBuf::from("/file/model.gguf"))
        );
        assert_eq!(resolve_path(None, ""), None);
    }
}

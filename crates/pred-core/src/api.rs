//! Request/response types for front ends.
//!
//! Requests arrive as JSON. Malformed bodies, out-of-range configuration and
//! spans that do not address exactly one token come back as structured
//! `"Invalid request data"` errors; failures of the model itself as
//! `"Scoring failed"`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::oracle::ScoringOracle;
use crate::settings::{SettingsError, SubstitutionConfig};
use crate::substitution::{replace, replace_in_text, SubstitutionError};
use crate::tags::Tagger;

pub const INVALID_REQUEST: &str = "Invalid request data";
pub const SCORING_FAILED: &str = "Scoring failed";
pub const SUBSTITUTION_FAILED: &str = "Substitution failed";

/// Replace `old`, found between `before_old` and `after_old`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstitutionRequest {
    pub before_old: String,
    pub old: String,
    pub after_old: String,
    pub replacement: String,
    #[serde(default)]
    pub config: SubstitutionConfig,
}

/// Replace the `length` characters of `text` starting at character `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRequest {
    pub text: String,
    pub start: usize,
    pub length: usize,
    pub replacement: String,
    #[serde(default)]
    pub config: SubstitutionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    /// HTTP-style status: 400 for request errors, 500 otherwise.
    #[serde(skip)]
    pub status: u16,
}

impl ErrorResponse {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: INVALID_REQUEST.to_string(),
            details: vec![ErrorDetail {
                field: field.into(),
                message: message.into(),
            }],
            status: 400,
        }
    }

    fn internal(error: &str, message: String) -> Self {
        Self {
            error: error.to_string(),
            details: vec![ErrorDetail {
                field: String::new(),
                message,
            }],
            status: 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

impl From<SettingsError> for ErrorResponse {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::InvalidValue { field, reason } => {
                Self::invalid(format!("config.{field}"), reason)
            }
            other => Self::invalid("config", other.to_string()),
        }
    }
}

impl From<SubstitutionError> for ErrorResponse {
    fn from(e: SubstitutionError) -> Self {
        match e {
            SubstitutionError::Alignment { .. } | SubstitutionError::SentenceNotFound { .. } => {
                Self::invalid("old", e.to_string())
            }
            SubstitutionError::Oracle(_) | SubstitutionError::OracleBatch { .. } => {
                warn!(error = %e, "scoring failed");
                Self::internal(SCORING_FAILED, e.to_string())
            }
            SubstitutionError::Stalled { .. } | SubstitutionError::ExtensionOutOfRange { .. } => {
                warn!(error = %e, "substitution failed");
                Self::internal(SUBSTITUTION_FAILED, e.to_string())
            }
        }
    }
}

impl SubstitutionRequest {
    pub fn handle<O: ScoringOracle>(
        &self,
        oracle: O,
        tagger: &dyn Tagger,
    ) -> Result<Response, ErrorResponse> {
        self.config.validate()?;
        let output = replace(
            oracle,
            tagger,
            &self.before_old,
            &self.old,
            &self.after_old,
            &self.replacement,
            &self.config,
        )?;
        Ok(Response { output })
    }
}

impl SpanRequest {
    pub fn handle<O: ScoringOracle>(
        &self,
        oracle: O,
        tagger: &dyn Tagger,
    ) -> Result<Response, ErrorResponse> {
        self.config.validate()?;
        let output = replace_in_text(
            oracle,
            tagger,
            &self.text,
            self.start,
            self.length,
            &self.replacement,
            &self.config,
        )?;
        Ok(Response { output })
    }
}

/// Parse a JSON [`SubstitutionRequest`] and handle it.
pub fn handle_json<O: ScoringOracle>(
    body: &str,
    oracle: O,
    tagger: &dyn Tagger,
) -> Result<Response, ErrorResponse> {
    let request: SubstitutionRequest =
        serde_json::from_str(body).map_err(|e| ErrorResponse::invalid("body", e.to_string()))?;
    request.handle(oracle, tagger)
}

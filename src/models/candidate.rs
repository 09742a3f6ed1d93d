use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accepted p-value spellings: optional `<`, optional leading `0`, a point, digits
static P_VALUE_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<?0?\.\d+$").expect("Invalid p-value regex"));

/// Reasons a candidate fragment is rejected before verification
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("p-value {0:?} does not match the p-value grammar")]
    InvalidPValue(String),

    #[error("invalid candidate JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A p-value as reported in the text, kept verbatim (e.g. `0.03`, `<0.001`, `.05`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PValue(String);

impl PValue {
    pub fn parse(raw: impl Into<String>) -> Result<Self, CandidateError> {
        let raw = raw.into();
        if P_VALUE_GRAMMAR.is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(CandidateError::InvalidPValue(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PValue {
    type Error = CandidateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<PValue> for String {
    fn from(value: PValue) -> Self {
        value.0
    }
}

impl fmt::Display for PValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One p-value claim proposed by the model.
///
/// Only schema-valid candidates are constructed; whether the quotation really
/// occurs in the chunk is checked separately by [`crate::llm::verify_quote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Reported p-value
    pub p: PValue,
    /// Test statistic description; absent and `null` both mean "not provided"
    #[serde(default)]
    pub statistic: Option<String>,
    /// Verbatim excerpt from the chunk supporting the claim
    pub quotation: String,
}

impl Candidate {
    /// Strictly deserialize a single JSON object fragment
    pub fn from_json(fragment: &str) -> Result<Self, CandidateError> {
        Ok(serde_json::from_str(fragment)?)
    }
}

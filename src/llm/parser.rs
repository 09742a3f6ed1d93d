use once_cell::sync::Lazy;
use regex::{Match, Regex};
use tracing::{debug, error};

use super::validation::verify_quote;
use crate::models::Candidate;

/// Minimal `{ ... }` spans, newlines included
static OBJECT_FRAGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*?\}").expect("Invalid fragment regex"));

/// Brace-delimited fragments in order of appearance.
///
/// The model's reply has no guaranteed envelope, so every minimal
/// non-overlapping `{...}` span is treated as a possible object.
fn extract_fragments(raw: &str) -> impl Iterator<Item = Match<'_>> {
    OBJECT_FRAGMENT.find_iter(raw)
}

/// Schema-valid candidates from a raw model reply.
///
/// Fragments that fail to deserialize are logged with the reason and dropped.
pub fn parse_candidates(raw: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut consumed = 0;

    for fragment in extract_fragments(raw) {
        consumed = fragment.end();
        match Candidate::from_json(fragment.as_str()) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                error!(
                    "Failed to parse candidate from model response: {}, {}",
                    e,
                    fragment.as_str()
                );
            }
        }
    }

    if let Some(offset) = raw[consumed..].find('{') {
        let tail = &raw[consumed + offset..];
        error!("Unterminated object in model response: {}", tail);
    }

    candidates
}

/// Candidates that deserialize and whose quotation is verified against `source_text`
pub fn parse_response(raw: &str, source_text: &str) -> Vec<Candidate> {
    let candidates = parse_candidates(raw);
    let total = candidates.len();

    let verified: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| verify_quote(&c.quotation, c.p.as_str(), source_text))
        .collect();

    debug!(
        "Parsed {} candidates, {} verified against source",
        total,
        verified.len()
    );

    verified
}

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Quotations shorter than this (in characters) must match the source exactly
pub const SHORT_QUOTATION_CHARS: usize = 10;

/// Characters taken from each end of a long quotation for anchor matching
pub const ANCHOR_CHARS: usize = 5;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Collapse every run of whitespace (including newlines) to a single space
pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
    WHITESPACE_RUN.replace_all(text, " ")
}

/// Check that a model-supplied quotation substantiates its p-value claim.
///
/// 1. All three strings are whitespace-normalized.
/// 2. The p-value must occur in the quotation, optionally wrapped in
///    punctuation such as `(p = 0.03).`
/// 3. The quotation must occur in the source text: verbatim when shorter than
///    [`SHORT_QUOTATION_CHARS`], otherwise by anchoring on its first and last
///    [`ANCHOR_CHARS`] characters with anything in between.
///
/// Pure function: the result depends only on the arguments.
pub fn verify_quote(quotation: &str, p_value: &str, source_text: &str) -> bool {
    let quotation = normalize_whitespace(quotation);
    let p_value = normalize_whitespace(p_value);
    let source_text = normalize_whitespace(source_text);

    if quotation.is_empty() || p_value.is_empty() {
        return false;
    }

    if !quotation_mentions_p_value(&quotation, &p_value) {
        return false;
    }

    quotation_in_source(&quotation, &source_text)
}

fn quotation_mentions_p_value(quotation: &str, p_value: &str) -> bool {
    let pattern = format!(r"[^\w\s]*{}[^\w\s]*", regex::escape(p_value));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(quotation),
        Err(_) => false,
    }
}

fn quotation_in_source(quotation: &str, source_text: &str) -> bool {
    let char_count = quotation.chars().count();
    if char_count < SHORT_QUOTATION_CHARS {
        return source_text.contains(quotation);
    }

    let start: String = quotation.chars().take(ANCHOR_CHARS).collect();
    let end: String = quotation.chars().skip(char_count - ANCHOR_CHARS).collect();
    let pattern = format!("{}.*?{}", regex::escape(&start), regex::escape(&end));

    match RegexBuilder::new(&pattern).dot_matches_new_line(true).build() {
        Ok(re) => re.is_match(source_text),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "Participants improved markedly.\nThe effect was   significant\n\
                          (p = 0.03) in the treatment arm.";

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("a \n\t b  c"), "a b c");
        assert_eq!(normalize_whitespace("plain"), "plain");
    }

    #[test]
    fn test_exact_sentence_is_verified() {
        let source = "Overall, the effect was significant (p = 0.03) after adjustment.";
        assert!(verify_quote("the effect was significant (p = 0.03)", "0.03", source));
    }

    #[test]
    fn test_whitespace_differences_are_ignored() {
        assert!(verify_quote("The effect was significant (p = 0.03)", "0.03", SOURCE));
        assert!(verify_quote("The effect\nwas significant (p = 0.03)", "0.03", SOURCE));
    }

    #[test]
    fn test_p_value_must_appear_in_quotation() {
        assert!(!verify_quote("The effect was significant", "0.03", SOURCE));
        assert!(!verify_quote("The effect was significant (p = 0.03)", "0.04", SOURCE));
    }

    #[test]
    fn test_p_value_with_surrounding_punctuation() {
        let source = "Scores differed (p<0.001).";
        assert!(verify_quote("Scores differed (p<0.001).", "<0.001", source));
    }

    #[test]
    fn test_anchor_match_tolerates_reworded_middle() {
        let quotation = "p<0.001 was found in A very long passage with drift \
                         across many characters at the end here";
        let source = "Intro. p<0.001 was reported for a completely different \
                      middle section that ends at the end here. Outro.";
        assert!(verify_quote(quotation, "<0.001", source));
    }

    #[test]
    fn test_anchor_match_requires_both_ends() {
        let quotation = "p<0.001 was found in A very long passage with drift \
                         across many characters at the end here";
        let wrong_start =
            "Intro. q<0.001 was reported for a different middle section at the end here.";
        let wrong_end =
            "Intro. p<0.001 was reported for a different middle section at the end HERE.";
        assert!(!verify_quote(quotation, "<0.001", wrong_start));
        assert!(!verify_quote(quotation, "<0.001", wrong_end));
    }

    #[test]
    fn test_short_quotation_requires_exact_match() {
        let source = "value p=.05 noted";
        assert!(verify_quote("p=.05", ".05", source));
        // a short quotation gets no anchor tolerance
        assert!(!verify_quote("p=.05 n", ".05", "p=.05, noted"));
    }

    #[test]
    fn test_quotation_not_in_source() {
        assert!(!verify_quote(
            "Completely invented sentence (p = 0.03)",
            "0.03",
            SOURCE
        ));
    }

    #[test]
    fn test_empty_quotation_is_rejected() {
        assert!(!verify_quote("", "0.03", SOURCE));
        assert!(!verify_quote("   ", "0.03", SOURCE));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let source = "Group (A+B)* differed [p = .04] overall";
        assert!(verify_quote("(A+B)* differed [p = .04]", ".04", source));
        // `.` in the p-value must not match an arbitrary character
        assert!(!verify_quote("(A+B)* differed [p = x04]", ".04", "(A+B)* differed [p = x04]"));
    }

    #[test]
    fn test_multibyte_anchors() {
        let source = "Die Wirkung war signifikant – p < .05 – für alle Gruppen ≥ 3 Jahre";
        assert!(verify_quote(
            "Wirkung war signifikant – p < .05 – für alle Gruppen ≥ 3 Jahre",
            ".05",
            source
        ));
    }

    #[test]
    fn test_verify_is_deterministic() {
        let args = ("The effect was significant (p = 0.03)", "0.03", SOURCE);
        let first = verify_quote(args.0, args.1, args.2);
        let second = verify_quote(args.0, args.1, args.2);
        assert_eq!(first, second);
    }
}

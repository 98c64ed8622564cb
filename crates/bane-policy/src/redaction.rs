// redaction.rs — Span-based PII redaction.
//
// Spans are byte offsets into the original text and always fall on char
// boundaries (they come from regex matches). Applying redactions merges
// overlapping or touching spans first, so one region of text never yields
// two adjacent tokens.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::finding::{Finding, Verdict};

/// Label attached to every span this module produces.
pub const PII_LABEL: &str = "PII";

static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
static PHONE: OnceLock<Option<Regex>> = OnceLock::new();

/// Email-shaped text. `None` only if the pattern failed to compile.
pub fn email_regex() -> Option<&'static Regex> {
    EMAIL
        .get_or_init(|| Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").ok())
        .as_ref()
}

/// North-American phone-shaped text.
pub fn phone_regex() -> Option<&'static Regex> {
    PHONE
        .get_or_init(|| {
            Regex::new(r"\b(\+?1[\s-]?)?(\(?\d{3}\)?[\s-]?)\d{3}[\s-]?\d{4}\b").ok()
        })
        .as_ref()
}

/// A region of the input to be replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RedactionSpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl RedactionSpan {
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }
}

/// Email and phone spans in `text`, but only when some finding asks for
/// sanitization.
pub fn redactions_from_findings(text: &str, findings: &[Finding]) -> Vec<RedactionSpan> {
    if !findings.iter().any(|f| f.verdict == Verdict::Sanitize) {
        return Vec::new();
    }

    let mut spans: Vec<RedactionSpan> = [email_regex(), phone_regex()]
        .into_iter()
        .flatten()
        .flat_map(|re| re.find_iter(text))
        .map(|m| RedactionSpan::new(m.start(), m.end(), PII_LABEL))
        .collect();
    spans.sort_by_key(|s| (s.start, s.end));
    spans
}

/// Replace every merged span with `[REDACTED:<label>]`.
///
/// Text outside the spans is copied verbatim. Out-of-range or inverted spans
/// are clamped; spans that land inside a multi-byte char are widened to the
/// enclosing char boundaries.
pub fn apply_redactions(text: &str, spans: &[RedactionSpan]) -> String {
    let merged = merge_spans(text, spans);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in &merged {
        out.push_str(&text[cursor..span.start]);
        out.push_str("[REDACTED:");
        out.push_str(&span.label);
        out.push(']');
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Sort by (start, end) and fold overlapping or adjacent spans together.
/// The merged span keeps the label of its first member.
pub fn merge_spans(text: &str, spans: &[RedactionSpan]) -> Vec<RedactionSpan> {
    let mut sorted: Vec<RedactionSpan> = spans
        .iter()
        .filter_map(|s| {
            let start = floor_boundary(text, s.start.min(text.len()));
            let end = ceil_boundary(text, s.end.min(text.len()));
            (start < end).then(|| RedactionSpan::new(start, end, s.label.clone()))
        })
        .collect();
    sorted.sort_by_key(|s| (s.start, s.end));

    let mut merged: Vec<RedactionSpan> = Vec::with_capacity(sorted.len());
    for span in sorted {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    fn sanitize_finding() -> Finding {
        Finding::new(
            "PII_POSSIBLE",
            "pii",
            Severity::Medium,
            Verdict::Sanitize,
            "test",
        )
    }

    #[test]
    fn no_sanitize_finding_means_no_spans() {
        let deny = Finding::new("X", "x", Severity::High, Verdict::Deny, "test");
        assert!(redactions_from_findings("mail a@b.io", &[deny]).is_empty());
        assert!(redactions_from_findings("mail a@b.io", &[]).is_empty());
    }

    #[test]
    fn email_and_phone_are_redacted() {
        let text = "Contact jane@example.com or 555-123-4567 today.";
        let spans = redactions_from_findings(text, &[sanitize_finding()]);
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.label == "PII"));
        assert_eq!(
            apply_redactions(text, &spans),
            "Contact [REDACTED:PII] or [REDACTED:PII] today."
        );
    }

    #[test]
    fn overlapping_email_and_phone_yield_one_token() {
        // The digits inside the local part also match the phone pattern.
        let text = "send to 5551234567@example.com now";
        let spans = redactions_from_findings(text, &[sanitize_finding()]);
        assert!(spans.len() >= 2, "expected overlapping spans: {:?}", spans);

        let out = apply_redactions(text, &spans);
        assert_eq!(out, "send to [REDACTED:PII] now");
        assert_eq!(out.matches("[REDACTED:PII]").count(), 1);

        // Prefix + merged region + suffix reconstructs the original.
        let merged = merge_spans(text, &spans);
        assert_eq!(merged.len(), 1);
        let rebuilt = format!(
            "{}{}{}",
            &text[..merged[0].start],
            &text[merged[0].start..merged[0].end],
            &text[merged[0].end..]
        );
        assert_eq!(rebuilt, text);
        assert!(out.starts_with(&text[..merged[0].start]));
        assert!(out.ends_with(&text[merged[0].end..]));
    }

    #[test]
    fn adjacent_spans_merge() {
        let spans = vec![
            RedactionSpan::new(0, 3, "PII"),
            RedactionSpan::new(3, 6, "PII"),
        ];
        assert_eq!(apply_redactions("abcdefgh", &spans), "[REDACTED:PII]gh");
    }

    #[test]
    fn unsorted_and_out_of_range_spans_are_handled() {
        let spans = vec![
            RedactionSpan::new(6, 100, "PII"),
            RedactionSpan::new(0, 2, "PII"),
            RedactionSpan::new(4, 4, "PII"),
        ];
        assert_eq!(
            apply_redactions("abcdefgh", &spans),
            "[REDACTED:PII]cdef[REDACTED:PII]"
        );
    }

    #[test]
    fn non_ascii_text_is_preserved() {
        let text = "héllo, write to zoe@example.org ✓";
        let spans = redactions_from_findings(text, &[sanitize_finding()]);
        let out = apply_redactions(text, &spans);
        assert!(out.starts_with("héllo, write to "));
        assert!(out.ends_with(" ✓"));
        assert!(out.contains("[REDACTED:PII]"));
    }
}

//! Field extraction from the model's free-text reply.
//!
//! The reply is expected to follow the labelled layout requested by the
//! prompt, but nothing enforces it, so every extractor has a fallback.

use regex::Regex;
use std::sync::LazyLock;

/// Draft labels, highest priority first.
pub const DRAFT_LABELS: [&str; 3] = ["Drafted Email:", "Email Draft:", "Subject:"];

pub const DRAFT_FALLBACK: &str = "Could not extract specific draft. Please review the research below.";

pub const QUOTA_SENTINEL: &str = "QUOTA_EXCEEDED: The API quota has been reached. Stopping script.";

const GENERIC_ERROR: &str = "An unexpected error occurred";

static COMPANY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Company Name:?\s*(.*)").expect("valid company regex"));

fn strip_markup(s: &str) -> &str {
    s.trim().trim_start_matches('*').trim_end_matches('*').trim()
}

/// Company named on the `Company Name:` line, or the domain when the label is
/// missing or empty.
pub fn extract_company_name(text: &str, domain: &str) -> String {
    COMPANY_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| strip_markup(m.as_str()))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| domain.to_string())
}

/// Everything after the first draft label found (in priority order), or the
/// fallback placeholder.
pub fn extract_drafted_email(text: &str) -> String {
    for label in DRAFT_LABELS {
        if let Some(idx) = text.find(label) {
            let rest = &text[idx + label.len()..];
            return rest.trim().to_string();
        }
    }
    DRAFT_FALLBACK.to_string()
}

/// Map a collaborator failure message to what gets stored on the result.
pub fn normalize_error(message: &str) -> String {
    if message.to_lowercase().contains("quota") || message.contains("429") {
        QUOTA_SENTINEL.to_string()
    } else if message.trim().is_empty() {
        GENERIC_ERROR.to_string()
    } else {
        message.to_string()
    }
}

pub fn is_quota_error(message: &str) -> bool {
    message.contains("QUOTA_EXCEEDED")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_and_draft_from_labelled_reply() {
        let text = "Company Name: Acme Corp\nDrafted Email: Hi Mary, ...";
        assert_eq!(extract_company_name(text, "acme.com"), "Acme Corp");
        assert_eq!(extract_drafted_email(text), "Hi Mary, ...");
    }

    #[test]
    fn test_company_label_is_case_insensitive() {
        let text = "Research...\ncompany name: Globex\nMore";
        assert_eq!(extract_company_name(text, "globex.com"), "Globex");
    }

    #[test]
    fn test_company_label_without_colon_and_markdown() {
        assert_eq!(extract_company_name("Company Name Initech\n", "x.com"), "Initech");
        assert_eq!(extract_company_name("**Company Name:** Hooli\n", "x.com"), "Hooli");
    }

    #[test]
    fn test_company_falls_back_to_domain() {
        assert_eq!(extract_company_name("No labels at all", "stark.com"), "stark.com");
        assert_eq!(extract_company_name("Company Name:", "stark.com"), "stark.com");
    }

    #[test]
    fn test_company_value_stops_at_line_break() {
        let text = "Company Name: Umbrella\nResearch Summary: vaccines";
        assert_eq!(extract_company_name(text, "u.com"), "Umbrella");
    }

    #[test]
    fn test_draft_label_priority() {
        // "Drafted Email:" wins even though "Subject:" appears earlier
        let text = "Subject: ignored\nDrafted Email: Subject: Coffee?\nHi Sam";
        assert_eq!(extract_drafted_email(text), "Subject: Coffee?\nHi Sam");

        let text = "Research Summary: stuff\nEmail Draft:\n  Hi Sam  \n";
        assert_eq!(extract_drafted_email(text), "Hi Sam");

        let text = "Alignment...\nSubject: Coffee chat\nHi Sam";
        assert_eq!(extract_drafted_email(text), "Coffee chat\nHi Sam");
    }

    #[test]
    fn test_draft_labels_are_case_sensitive() {
        assert_eq!(extract_drafted_email("drafted email: Hi"), DRAFT_FALLBACK);
    }

    #[test]
    fn test_draft_fallback() {
        assert_eq!(extract_drafted_email("Company Name: Acme\nResearch Summary: ..."), DRAFT_FALLBACK);
    }

    #[test]
    fn test_draft_keeps_text_after_label_verbatim() {
        assert_eq!(extract_drafted_email("**Drafted Email:** Hi Ana\n"), "** Hi Ana");
    }

    #[test]
    fn test_normalize_error_quota() {
        assert_eq!(normalize_error("Gemini API error (status 429): busy"), QUOTA_SENTINEL);
        assert_eq!(normalize_error("You exceeded your current QUOTA"), QUOTA_SENTINEL);
        assert!(is_quota_error(&normalize_error("429")));
    }

    #[test]
    fn test_normalize_error_passthrough_and_generic() {
        assert_eq!(normalize_error("HTTP error: connection reset"), "HTTP error: connection reset");
        assert_eq!(normalize_error("  "), GENERIC_ERROR);
        assert!(!is_quota_error("HTTP error: connection reset"));
    }
}

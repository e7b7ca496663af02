//! Best-effort PII scrubbing applied before case text leaves the process.
//!
//! This is a fixed list of pattern substitutions, not a de-identification
//! guarantee: names outside a `Name:`/`Patient:` label, addresses, free-text
//! ages and many other identifiers pass through untouched.
//!
//! Placeholders are bracketed all-caps tags without digits, so no later rule
//! can match text an earlier rule inserted.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const EMAIL_PLACEHOLDER: &str = "[REDACTED_EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[REDACTED_PHONE]";
pub const ID_PLACEHOLDER: &str = "[REDACTED_ID]";
pub const DATE_PLACEHOLDER: &str = "[REDACTED_DATE]";
pub const NAME_PLACEHOLDER: &str = "[REDACTED_NAME]";

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("email regex"));
static RE_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d\s().-]{7,}\d").expect("phone regex"));
static RE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[0-9A-Z]{6,12}\b").expect("id regex"));
static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})\b").expect("date regex")
});
static RE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(Name|Patient)[ \t]*:[ \t]*[^\n]+").expect("name regex"));

/// Replace emails, phone numbers, ID-like tokens, dates and labeled names. Never fails.
pub fn redact(text: &str) -> String {
    let out = RE_EMAIL.replace_all(text, EMAIL_PLACEHOLDER);
    let out = RE_PHONE.replace_all(&out, PHONE_PLACEHOLDER);
    // Only tokens carrying a digit look like record numbers; plain words are kept.
    let out = RE_ID.replace_all(&out, |caps: &Captures| {
        let token = &caps[0];
        if token.bytes().any(|b| b.is_ascii_digit()) {
            ID_PLACEHOLDER.to_string()
        } else {
            token.to_string()
        }
    });
    let out = RE_DATE.replace_all(&out, DATE_PLACEHOLDER);
    let out = RE_NAME.replace_all(&out, format!("${{1}}: {NAME_PLACEHOLDER}").as_str());
    out.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_long_words_survive() {
        let s = "Patient reports substernal pressure, hyperlipidemia noted.";
        assert_eq!(redact(s), s);
    }

    #[test]
    fn placeholders_are_stable_under_a_second_pass() {
        let once = redact("Name: Jane Roe\nmail jane@ex.org, MRN AB12345, seen 3/14/2024");
        assert_eq!(redact(&once), once);
    }
}

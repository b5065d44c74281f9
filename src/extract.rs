//! Page extractor: keyword-anchored identifier and date extraction.
//!
//! Takes the OCR text of one page and an [`ExtractionProfile`] and returns
//! the identifier (if any) plus optional date and notice fields.
//! Intentionally simple: line/keyword/regex based, no layout or table
//! awareness. "No identifier found" is a normal terminal outcome for a page,
//! not an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::profile::{AnchorStrategy, ExtractionProfile, Matcher, NoticeTerm, TokenRule};

/// Separator characters stripped between the anchor keyword and the token.
const SEPARATORS: &[char] = &[' ', '.', ':', '_', '-', '='];

/// Punctuation removed from inside a matched token. OCR frequently inserts
/// stray periods and commas into case numbers.
const TOKEN_NOISE: &[char] = &['.', ','];

/// Fields extracted from one page of OCR text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFields {
    pub identifier: Option<String>,
    pub date: Option<String>,
    /// Notice label selected by the profile's notice terms, if any phrase
    /// was found on the page.
    pub notice: Option<String>,
}

/// Applies one profile's extraction rules to page text.
///
/// Constructed once per batch so the pattern regex (when the profile uses
/// one) is compiled once, not per page.
pub struct PageExtractor {
    profile: ExtractionProfile,
    pattern: Option<Regex>,
}

impl PageExtractor {
    pub fn new(profile: ExtractionProfile) -> Result<Self, regex::Error> {
        let pattern = match &profile.matcher {
            Matcher::Pattern { regex, .. } => Some(Regex::new(regex)?),
            Matcher::Anchored { .. } => None,
        };
        Ok(Self { profile, pattern })
    }

    pub fn profile(&self) -> &ExtractionProfile {
        &self.profile
    }

    /// Extract identifier and (optionally) date and notice fields from one
    /// page's OCR text.
    ///
    /// The three scans run independently: a date or notice may be returned
    /// even when no identifier is found, and vice versa.
    pub fn extract(&self, text: &str) -> PageFields {
        let identifier = match &self.profile.matcher {
            Matcher::Anchored {
                keywords,
                excluded_contexts,
            } => find_anchored(
                text,
                keywords,
                excluded_contexts,
                self.profile.anchor,
                &self.profile.token_rule,
            ),
            Matcher::Pattern { reject_tokens, .. } => self.find_pattern(text, reject_tokens),
        };

        let date = if self.profile.extract_date {
            find_date(text)
        } else {
            None
        };

        let notice = find_notice(text, &self.profile.notice_terms);

        PageFields {
            identifier,
            date,
            notice,
        }
    }

    /// First pattern match, scanning lines top to bottom. One candidate per
    /// line; a rejected candidate skips the whole line.
    fn find_pattern(&self, text: &str, reject_tokens: &[String]) -> Option<String> {
        let pattern = self.pattern.as_ref()?;
        for line in text.lines() {
            if let Some(m) = pattern.find(line) {
                let candidate = m.as_str();
                let rejected = reject_tokens
                    .iter()
                    .any(|t| candidate.eq_ignore_ascii_case(t));
                if !rejected {
                    return Some(candidate.to_string());
                }
            }
        }
        None
    }
}

/// Search for the first keyword variant (in profile order) that yields a
/// valid token. Within a line, the first token after the keyword wins; if
/// the same keyword appears several times, only the first occurrence in
/// scan order is considered. Lines containing an excluded context phrase
/// are skipped.
fn find_anchored(
    text: &str,
    keywords: &[String],
    excluded_contexts: &[String],
    strategy: AnchorStrategy,
    rule: &TokenRule,
) -> Option<String> {
    for keyword in keywords {
        let hit = match strategy {
            AnchorStrategy::LineScoped => text
                .lines()
                .filter(|line| !line_excluded(line, excluded_contexts))
                .find_map(|line| token_after_keyword(line, keyword, rule)),
            AnchorStrategy::WholeText => token_after_keyword(text, keyword, rule),
        };
        if hit.is_some() {
            return hit;
        }
    }
    None
}

fn line_excluded(line: &str, excluded_contexts: &[String]) -> bool {
    excluded_contexts
        .iter()
        .any(|phrase| find_ignore_ascii_case(line, phrase).is_some())
}

/// Take the substring after the first case-insensitive occurrence of
/// `keyword`, strip leading separators, and read the next token.
fn token_after_keyword(haystack: &str, keyword: &str, rule: &TokenRule) -> Option<String> {
    let start = find_ignore_ascii_case(haystack, keyword)?;
    let after = &haystack[start + keyword.len()..];
    let after = after.trim_start_matches(SEPARATORS);

    let mut token = String::new();
    for c in after.chars() {
        if c == ' ' && rule.stop_at_space {
            break;
        }
        // Spaces, periods and commas are OCR noise inside identifiers
        // ("24 00,12.34"); keep reading through them and squeeze them out
        // below.
        if c.is_ascii_alphanumeric()
            || c == ' '
            || TOKEN_NOISE.contains(&c)
            || rule.extra_chars.contains(&c)
        {
            token.push(c);
        } else {
            break;
        }
    }

    let cleaned: String = token
        .chars()
        .filter(|c| *c != ' ' && !TOKEN_NOISE.contains(c))
        .collect();
    let cleaned = cleaned.trim_matches('-').to_string();

    rule.accepts(&cleaned).then_some(cleaned)
}

/// Byte offset of the first case-insensitive occurrence of `needle`.
/// ASCII-only folding, which keyword variants are by construction; this
/// keeps byte offsets valid on the original string.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

/// First notice phrase found on the page selects its label. Lines are
/// scanned top to bottom; phrases in profile order within each line.
fn find_notice(text: &str, terms: &[NoticeTerm]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    for line in text.lines() {
        for term in terms {
            if find_ignore_ascii_case(line, &term.phrase).is_some() {
                return Some(term.label.clone());
            }
        }
    }
    None
}

/// Date shapes seen across judgement documents: day-first with `/`, `-` or
/// `.` separators, and ISO year-first forms.
fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b(\d{1,2}/\d{1,2}/\d{4})\b",
            r"\b(\d{1,2}-\d{1,2}-\d{4})\b",
            r"\b(\d{1,2}\.\d{1,2}\.\d{4})\b",
            r"\b(\d{4}-\d{1,2}-\d{1,2})\b",
            r"\b(\d{4}/\d{1,2}/\d{1,2})\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("date pattern is valid"))
        .collect()
    })
}

/// First date-shaped string on the page, scanning lines top to bottom.
fn find_date(text: &str) -> Option<String> {
    for line in text.lines() {
        for pattern in date_patterns() {
            if let Some(m) = pattern.find(line) {
                return Some(m.as_str().to_string());
            }
        }
    }
    None
}

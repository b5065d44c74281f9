//! Extraction profiles: per-document-type configuration.
//!
//! Each supported document type (dismissal notice, lien, judgement, …) is one
//! [`ExtractionProfile`]: the anchor keywords to look for, the rule a token
//! must pass to count as an identifier, which OCR backend to use, and how the
//! output file is named. Profiles are immutable once constructed and shared
//! by reference across every page of a batch.

use serde::{Deserialize, Serialize};

use crate::ocr::BackendKind;

/// How anchor keywords are searched in the OCR text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorStrategy {
    /// Search each OCR line independently; the identifier must sit on the
    /// same line as the keyword. Used with the structured backend, which
    /// preserves line layout well.
    LineScoped,
    /// Search the concatenated OCR output as one block. Used with the
    /// resilient backend, whose region ordering is less line-faithful.
    WholeText,
}

/// Validation rule an extracted token must pass.
///
/// Minimum lengths differ per document type (court case numbers are longer
/// than internal file numbers), and a few types legitimately contain dashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRule {
    /// Minimum character count after cleanup.
    pub min_len: usize,
    /// Whether the token must contain at least one ASCII digit.
    pub require_digit: bool,
    /// Characters allowed in addition to ASCII alphanumerics.
    pub extra_chars: Vec<char>,
    /// Stop the token at the first space instead of reading through spaces.
    /// E-file stipulations take only the first word after the keyword.
    #[serde(default)]
    pub stop_at_space: bool,
}

impl TokenRule {
    pub fn accepts(&self, token: &str) -> bool {
        if token.is_empty() || token.chars().count() < self.min_len {
            return false;
        }
        if self.require_digit && !token.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        true
    }
}

/// How the identifier is located on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Matcher {
    /// Keyword-anchored: the identifier follows one of the keyword variants.
    /// Variants are tried in declaration order; the first that yields a
    /// valid token wins. A line containing any of `excluded_contexts` is
    /// skipped entirely; short anchors like "case" need this to avoid
    /// boilerplate phrases ("further case", "case information").
    Anchored {
        keywords: Vec<String>,
        #[serde(default)]
        excluded_contexts: Vec<String>,
    },
    /// Fixed-shape: the identifier matches a known pattern anywhere on the
    /// page, with no anchor keyword (e.g. lien requests use `C` + 7 digits).
    /// A match equal (case-insensitively) to any of `reject_tokens` is
    /// discarded and the scan moves on; loose patterns pick up header words
    /// like "Court of" otherwise.
    Pattern {
        regex: String,
        #[serde(default)]
        reject_tokens: Vec<String>,
    },
}

/// Page phrase that selects a document-notice label for the output name.
/// E-file stipulation pages are named `<id>_Stipulation` or
/// `<id>_Judgment By Consent` depending on which phrase the page carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeTerm {
    /// Case-insensitive phrase searched line by line.
    pub phrase: String,
    /// Label used in the output file name when the phrase is found.
    pub label: String,
}

/// Per-document-type extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionProfile {
    /// Stable profile id, also used in log and report file names.
    pub id: String,
    /// Fixed document-type label appended to the identifier in output file
    /// names (e.g. `"Notice Of Dismissal"`). `None` = identifier only.
    pub label: Option<String>,
    pub matcher: Matcher,
    pub anchor: AnchorStrategy,
    pub token_rule: TokenRule,
    /// Phrase-selected labels; the first phrase found on the page wins and
    /// overrides the fixed label. Empty for most document types.
    #[serde(default)]
    pub notice_terms: Vec<NoticeTerm>,
    /// Which OCR backend this document type needs.
    pub backend: BackendKind,
    /// Rasterization resolution.
    pub dpi: u32,
    /// Whether to also scan for a date field (judgement-entry dates).
    pub extract_date: bool,
    /// Default case-insensitive filename substring filter applied when
    /// enumerating the input folder. `None` = process every PDF.
    pub filename_filter: Option<String>,
}

impl ExtractionProfile {
    /// Output base name for a page that extracted `identifier`. A notice
    /// label found on the page takes precedence over the fixed label.
    pub fn output_basename(&self, identifier: &str, notice: Option<&str>) -> String {
        match notice.or(self.label.as_deref()) {
            Some(label) => format!("{identifier}_{label}"),
            None => identifier.to_string(),
        }
    }

    /// Look up a builtin profile by id.
    pub fn builtin(id: &str) -> Option<Self> {
        builtin_profiles().into_iter().find(|p| p.id == id)
    }
}

/// Default rasterization resolution. High enough for reliable OCR on poor
/// quality scans; the resilient backend downscales its input separately.
pub const DEFAULT_DPI: u32 = 350;

fn anchored(keywords: &[&str]) -> Matcher {
    anchored_excluding(keywords, &[])
}

fn anchored_excluding(keywords: &[&str], excluded: &[&str]) -> Matcher {
    Matcher::Anchored {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        excluded_contexts: excluded.iter().map(|k| k.to_string()).collect(),
    }
}

fn rule(min_len: usize, require_digit: bool, extra_chars: &[char]) -> TokenRule {
    TokenRule {
        min_len,
        require_digit,
        extra_chars: extra_chars.to_vec(),
        stop_at_space: false,
    }
}

/// "case"-anchored judgement types share the exclusion list: the anchor is
/// one word, so every boilerplate phrase containing it must be skipped.
const CASE_ANCHOR_EXCLUSIONS: &[&str] = &[
    "further case",
    "case warrant",
    "case information",
    "case details",
    "case number",
];

/// The builtin document-type registry.
///
/// These mirror the document types the firm actually processes. Token rules
/// intentionally differ between profiles; downstream filing systems depend
/// on the exact shapes each type has historically produced, so the quirks
/// are preserved per profile rather than normalized.
pub fn builtin_profiles() -> Vec<ExtractionProfile> {
    vec![
        ExtractionProfile {
            id: "dismissal".into(),
            label: Some("Notice Of Dismissal".into()),
            matcher: anchored(&["file no", "fileno", "file number"]),
            anchor: AnchorStrategy::WholeText,
            token_rule: rule(4, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Resilient,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: Some("dismissal".into()),
        },
        ExtractionProfile {
            id: "lien".into(),
            label: None,
            matcher: anchored(&["case no", "caseno"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &[]),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: Some("lien".into()),
        },
        ExtractionProfile {
            id: "judgement".into(),
            label: None,
            matcher: anchored(&["case number", "case no"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(4, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: Some("judgement".into()),
        },
        ExtractionProfile {
            id: "md-judgements".into(),
            label: None,
            matcher: anchored(&["case number", "case no"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(4, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "va-judgements-lvnv".into(),
            label: None,
            matcher: anchored_excluding(&["case"], CASE_ANCHOR_EXCLUSIONS),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &[]),
            notice_terms: vec![],
            backend: BackendKind::Resilient,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "va-judgements-cava".into(),
            label: None,
            matcher: anchored_excluding(&["case"], CASE_ANCHOR_EXCLUSIONS),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &[]),
            notice_terms: vec![],
            backend: BackendKind::Resilient,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "judgements-mcm".into(),
            label: None,
            matcher: anchored_excluding(&["case"], CASE_ANCHOR_EXCLUSIONS),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &[]),
            notice_terms: vec![],
            backend: BackendKind::Resilient,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "update-dismissal-resurgent-cavalry".into(),
            label: None,
            matcher: anchored(&["case number", "number"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "update-lien-cac-cavalry".into(),
            label: None,
            matcher: anchored(&["number"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "update-service-md-garns".into(),
            label: None,
            matcher: anchored(&["number"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "md-lvnv".into(),
            label: None,
            matcher: anchored(&["number"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(3, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: true,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "order-satisfaction".into(),
            label: Some("Order_of_Satisfaction".into()),
            matcher: anchored(&["file no"]),
            anchor: AnchorStrategy::WholeText,
            token_rule: rule(4, true, &['-']),
            notice_terms: vec![],
            backend: BackendKind::Resilient,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "lien-req".into(),
            label: None,
            matcher: Matcher::Pattern {
                regex: r"\bC\d{7}\b".into(),
                reject_tokens: vec![],
            },
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(8, true, &[]),
            notice_terms: vec![],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "bus-rec".into(),
            label: Some("Business Records".into()),
            matcher: Matcher::Pattern {
                // C or R followed by any seven characters; the looseness is
                // what the reject list compensates for.
                regex: r"(?i)\b[CR].{7}\b".into(),
                reject_tokens: vec!["court of".into(), "records ".into()],
            },
            anchor: AnchorStrategy::LineScoped,
            token_rule: rule(8, false, &[]),
            notice_terms: vec![],
            backend: BackendKind::Resilient,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: None,
        },
        ExtractionProfile {
            id: "efile-stip".into(),
            label: None,
            matcher: anchored(&["file no"]),
            anchor: AnchorStrategy::LineScoped,
            token_rule: TokenRule {
                min_len: 1,
                require_digit: false,
                extra_chars: vec!['-'],
                stop_at_space: true,
            },
            notice_terms: vec![
                NoticeTerm {
                    phrase: "stipulation".into(),
                    label: "Stipulation".into(),
                },
                NoticeTerm {
                    phrase: "judgment".into(),
                    label: "Judgment By Consent".into(),
                },
            ],
            backend: BackendKind::Structured,
            dpi: DEFAULT_DPI,
            extract_date: false,
            filename_filter: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup_finds_known_profile() {
        let p = ExtractionProfile::builtin("lien").unwrap();
        assert_eq!(p.backend, BackendKind::Structured);
        assert!(matches!(p.matcher, Matcher::Anchored { .. }));
    }

    #[test]
    fn builtin_lookup_unknown_returns_none() {
        assert!(ExtractionProfile::builtin("no-such-type").is_none());
    }

    #[test]
    fn builtin_ids_are_unique() {
        let profiles = builtin_profiles();
        let mut ids: Vec<&str> = profiles.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), profiles.len());
    }

    #[test]
    fn registry_covers_all_document_types() {
        for id in [
            "dismissal",
            "lien",
            "judgement",
            "md-judgements",
            "va-judgements-lvnv",
            "va-judgements-cava",
            "judgements-mcm",
            "update-dismissal-resurgent-cavalry",
            "update-lien-cac-cavalry",
            "update-service-md-garns",
            "md-lvnv",
            "order-satisfaction",
            "lien-req",
            "bus-rec",
            "efile-stip",
        ] {
            assert!(ExtractionProfile::builtin(id).is_some(), "{id} missing");
        }
    }

    #[test]
    fn output_basename_appends_label() {
        let p = ExtractionProfile::builtin("dismissal").unwrap();
        assert_eq!(
            p.output_basename("24-001234", None),
            "24-001234_Notice Of Dismissal"
        );

        let p = ExtractionProfile::builtin("lien").unwrap();
        assert_eq!(p.output_basename("C1234567", None), "C1234567");
    }

    #[test]
    fn notice_label_overrides_fixed_label() {
        let p = ExtractionProfile::builtin("efile-stip").unwrap();
        assert_eq!(
            p.output_basename("24-001234", Some("Stipulation")),
            "24-001234_Stipulation"
        );
        assert_eq!(p.output_basename("24-001234", None), "24-001234");
    }

    #[test]
    fn case_anchored_profiles_carry_exclusions() {
        let p = ExtractionProfile::builtin("va-judgements-lvnv").unwrap();
        match &p.matcher {
            Matcher::Anchored {
                excluded_contexts, ..
            } => {
                assert!(excluded_contexts.contains(&"case number".to_string()));
                assert!(excluded_contexts.contains(&"further case".to_string()));
            }
            other => panic!("unexpected matcher: {other:?}"),
        }
    }

    #[test]
    fn token_rule_enforces_min_len_and_digit() {
        let rule = TokenRule {
            min_len: 4,
            require_digit: true,
            extra_chars: vec![],
            stop_at_space: false,
        };
        assert!(rule.accepts("AB12"));
        assert!(!rule.accepts("AB1"), "below minimum length");
        assert!(!rule.accepts("ABCD"), "no digit");
        assert!(!rule.accepts(""));
    }

    #[test]
    fn profiles_round_trip_through_json() {
        for profile in builtin_profiles() {
            let json = serde_json::to_string(&profile).unwrap();
            let back: ExtractionProfile = serde_json::from_str(&json).unwrap();
            assert_eq!(back.id, profile.id);
        }
    }
}

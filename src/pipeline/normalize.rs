//! Text normalisation: deterministic cleanup of raw OCR text.
//!
//! ## Why is normalisation necessary?
//!
//! OCR engines return text that is *readable* but noisy:
//!
//! - ligatures and compatibility glyphs (`ﬁ`, full-width digits, NBSP)
//! - ragged spacing, runs of blank lines between paragraphs
//! - recognition slips such as `12 . 5`, `co - operate` or `l.l` for `1.`
//!
//! The normaliser fixes these without touching the document's structure:
//! line breaks, paragraph breaks and page markers survive.
//!
//! ## Step Order
//!
//! Steps run in the configured order, by default:
//! 1. [`NormalizeStep::Unicode`]     NFKC + strip invisible characters
//! 2. [`NormalizeStep::Whitespace`]  collapse spaces, one blank line between paragraphs
//! 3. [`NormalizeStep::Corrections`] ordered regex correction table
//! 4. [`NormalizeStep::Structure`]   blank lines around headers and before clauses
//!
//! and the result is trimmed. Unicode must run first so the later regexes see
//! composed characters; whitespace must run before corrections because the
//! correction patterns only allow single spaces.

use crate::error::OcrError;
use crate::pipeline::pages::is_page_delimiter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use unicode_normalization::UnicodeNormalization;

/// Normalise `raw` with the default rule set.
///
/// Never fails; empty or whitespace-only input yields `""`.
pub fn normalize(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);

/// One stage of the normaliser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizeStep {
    Unicode,
    Whitespace,
    Corrections,
    Structure,
}

impl NormalizeStep {
    /// Every step, in the default order.
    pub const ALL: [NormalizeStep; 4] = [
        NormalizeStep::Unicode,
        NormalizeStep::Whitespace,
        NormalizeStep::Corrections,
        NormalizeStep::Structure,
    ];
}

/// A single `(pattern, replacement)` entry of the correction table.
///
/// The replacement uses `regex` syntax (`$1`, `${name}`). Rules are applied
/// to one line at a time, so a pattern never matches across a line break.
#[derive(Debug, Clone)]
pub struct CorrectionRule {
    pattern: Regex,
    replacement: String,
}

impl CorrectionRule {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, OcrError> {
        let pattern = Regex::new(pattern).map_err(|e| {
            OcrError::InvalidConfig(format!("invalid correction pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replace every match in `line`.
    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(line, self.replacement.as_str())
    }
}

// ── Default tables ───────────────────────────────────────────────────────────

static DEFAULT_RULES: Lazy<Vec<CorrectionRule>> = Lazy::new(|| {
    [
        // `l.l` / `l , l`: a stray `l` read for the digit one
        (r"l[ \t]?([^\w\s])[ \t]?l", "1$1"),
        // `12 . 5` → `12.5`; needs a gap so an already joined `1.2` never matches
        (r"(\d)(?:[ \t]+\.[ \t]*|\.[ \t]+)(\d)", "${1}.${2}"),
        // `co - operate` → `co-operate`; same gap requirement
        (r"(\p{Ll})(?:[ \t]+-[ \t]*|-[ \t]+)(\p{Ll})", "${1}-${2}"),
        ("\u{FB01}", "fi"),
        ("\u{FB02}", "fl"),
    ]
    .into_iter()
    .map(|(p, r)| CorrectionRule::new(p, r).unwrap())
    .collect()
});

/// Boilerplate header lines of Vietnamese administrative documents.
const DEFAULT_HEADER_KEYWORDS: &[&str] = &[
    "CỘNG HÒA XÃ HỘI CHỦ NGHĨA VIỆT NAM",
    "Độc lập - Tự do - Hạnh phúc",
    "QUYẾT ĐỊNH",
    "NGHỊ ĐỊNH",
    "THÔNG TƯ",
    "CHỈ THỊ",
    "NGHỊ QUYẾT",
    "LUẬT",
];

/// Words that open a numbered clause (`Điều 3.`, `Article 12.`).
const DEFAULT_CLAUSE_LABELS: &[&str] = &["Điều", "Chương", "Mục", "Article", "Section", "Clause"];

static RE_DEFAULT_CLAUSE: Lazy<Regex> = Lazy::new(|| clause_regex(DEFAULT_CLAUSE_LABELS).unwrap());

fn clause_regex<S: AsRef<str>>(labels: &[S]) -> Result<Regex, regex::Error> {
    let alternation = labels
        .iter()
        .map(|l| regex::escape(&nfkc(l.as_ref())))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"^(?:{alternation})[ \t]+\d+\."))
}

/// Zero-width and other invisible code points OCR engines leak into text.
const INVISIBLE_CHARS: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

/// Fixed-point bound for the correction table.
const MAX_CORRECTION_PASSES: usize = 8;

// ── Normalizer ───────────────────────────────────────────────────────────────

/// A configured text normaliser.
///
/// Immutable once built; share it freely across threads.
///
/// # Example
/// ```rust
/// use docscan_ocr::pipeline::normalize::{NormalizeStep, Normalizer};
///
/// let n = Normalizer::builder()
///     .without_step(NormalizeStep::Structure)
///     .rule(r"(\d)(?:[ \t]+,[ \t]*|,[ \t]+)(\d{3})", "${1},${2}")
///     .unwrap()
///     .build()
///     .unwrap();
/// assert_eq!(n.normalize("1 , 000 , 000   items"), "1,000,000 items");
/// ```
#[derive(Debug, Clone)]
pub struct Normalizer {
    steps: Vec<NormalizeStep>,
    rules: Vec<CorrectionRule>,
    header_keywords: Vec<String>,
    clause_pattern: Option<Regex>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            steps: NormalizeStep::ALL.to_vec(),
            rules: DEFAULT_RULES.clone(),
            header_keywords: DEFAULT_HEADER_KEYWORDS.iter().map(|k| nfkc(k)).collect(),
            clause_pattern: Some(RE_DEFAULT_CLAUSE.clone()),
        }
    }
}

impl Normalizer {
    /// Builder pre-loaded with the default steps and tables.
    pub fn builder() -> NormalizerBuilder {
        let defaults = Self::default();
        NormalizerBuilder {
            steps: defaults.steps,
            rules: defaults.rules,
            header_keywords: defaults.header_keywords,
            clause_labels: None,
        }
    }

    pub fn steps(&self) -> &[NormalizeStep] {
        &self.steps
    }

    pub fn rules(&self) -> &[CorrectionRule] {
        &self.rules
    }

    /// Run every configured step over `raw`, then trim.
    pub fn normalize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return String::new();
        }

        let mut text: Cow<'_, str> = Cow::Borrowed(raw);
        for step in &self.steps {
            text = Cow::Owned(match step {
                NormalizeStep::Unicode => unicode_compose(&text),
                NormalizeStep::Whitespace => collapse_whitespace(&text),
                NormalizeStep::Corrections => self.apply_corrections(&text),
                NormalizeStep::Structure => self.mark_structure(&text),
            });
        }
        text.trim().to_string()
    }

    // ── Step 3: Correction table ─────────────────────────────────────────────

    fn apply_corrections(&self, input: &str) -> String {
        if self.rules.is_empty() {
            return input.to_string();
        }
        input
            .split('\n')
            .map(|line| {
                if is_page_delimiter(line.trim()) {
                    Cow::Borrowed(line)
                } else {
                    Cow::Owned(self.correct_line(line))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Apply the table until the line stops changing, so a correction that
    /// consumed the context of a neighbouring match is picked up next pass.
    fn correct_line(&self, line: &str) -> String {
        let mut current = line.to_string();
        for _ in 0..MAX_CORRECTION_PASSES {
            let mut next = current.clone();
            for rule in &self.rules {
                let replaced = rule.apply(&next).into_owned();
                next = replaced;
            }
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    // ── Step 4: Structural hints ─────────────────────────────────────────────

    fn mark_structure(&self, input: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        let mut blank_after = false;

        for line in input.split('\n') {
            let trimmed = line.trim();
            let is_blank = trimmed.is_empty();

            if blank_after && !is_blank {
                ensure_blank_line(&mut out);
            }
            blank_after = false;

            if !is_blank && !is_page_delimiter(trimmed) {
                let is_header = self.header_keywords.iter().any(|k| k == trimmed);
                let is_clause = self
                    .clause_pattern
                    .as_ref()
                    .is_some_and(|re| re.is_match(trimmed));
                if is_header || is_clause {
                    ensure_blank_line(&mut out);
                }
                blank_after = is_header;
            }

            out.push(line);
        }

        out.join("\n")
    }
}

fn ensure_blank_line(out: &mut Vec<&str>) {
    if out.last().is_some_and(|l| !l.trim().is_empty()) {
        out.push("");
    }
}

/// Builder for [`Normalizer`].
#[derive(Debug)]
pub struct NormalizerBuilder {
    steps: Vec<NormalizeStep>,
    rules: Vec<CorrectionRule>,
    header_keywords: Vec<String>,
    clause_labels: Option<Vec<String>>,
}

impl NormalizerBuilder {
    /// Replace the step list. Duplicates are dropped, first occurrence wins.
    pub fn steps(mut self, steps: &[NormalizeStep]) -> Self {
        self.steps.clear();
        for step in steps {
            if !self.steps.contains(step) {
                self.steps.push(*step);
            }
        }
        self
    }

    pub fn without_step(mut self, step: NormalizeStep) -> Self {
        self.steps.retain(|s| *s != step);
        self
    }

    /// Append a correction rule to the end of the table.
    pub fn rule(mut self, pattern: &str, replacement: impl Into<String>) -> Result<Self, OcrError> {
        self.rules.push(CorrectionRule::new(pattern, replacement)?);
        Ok(self)
    }

    /// Replace the whole correction table.
    pub fn rules(mut self, rules: Vec<CorrectionRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn clear_rules(mut self) -> Self {
        self.rules.clear();
        self
    }

    /// Replace the header keyword list. Lines must match a keyword exactly.
    pub fn header_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.header_keywords = keywords.into_iter().map(|k| nfkc(k.as_ref())).collect();
        self
    }

    /// Replace the clause labels. An empty list disables clause detection.
    pub fn clause_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clause_labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<Normalizer, OcrError> {
        let clause_pattern = match self.clause_labels {
            None => Some(RE_DEFAULT_CLAUSE.clone()),
            Some(labels) if labels.is_empty() => None,
            Some(labels) => Some(clause_regex(labels.as_slice()).map_err(|e| {
                OcrError::InvalidConfig(format!("invalid clause labels: {e}"))
            })?),
        };
        Ok(Normalizer {
            steps: self.steps,
            rules: self.rules,
            header_keywords: self.header_keywords,
            clause_pattern,
        })
    }
}

// ── Step 1: Unicode composition ──────────────────────────────────────────────

fn nfkc(s: &str) -> String {
    s.nfkc().collect()
}

fn unicode_compose(input: &str) -> String {
    input
        .nfkc()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .collect()
}

// ── Step 2: Whitespace with structure preservation ───────────────────────────

fn collapse_whitespace(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");

    let mut paragraphs: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in unified.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(collapsed);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
        .iter()
        .map(|p| p.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_blank() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t\n  "), "");
    }

    #[test]
    fn test_whitespace_and_blank_lines() {
        assert_eq!(normalize("Hello   world\n\n\n\nBye"), "Hello world\n\nBye");
    }

    #[test]
    fn test_paragraph_lines_kept() {
        let input = "  line one  \nline\ttwo\n\n\npara two";
        assert_eq!(normalize(input), "line one\nline two\n\npara two");
    }

    #[test]
    fn test_crlf() {
        assert_eq!(collapse_whitespace("a\r\nb\r\rc"), "a\nb\n\nc");
    }

    #[test]
    fn test_ligature_expanded() {
        assert_eq!(normalize("\u{FB01}nance of\u{FB02}ow"), "finance offlow");
    }

    #[test]
    fn test_ligature_rule_without_unicode_step() {
        let n = Normalizer::builder()
            .without_step(NormalizeStep::Unicode)
            .build()
            .unwrap();
        assert_eq!(n.normalize("\u{FB01}le"), "file");
    }

    #[test]
    fn test_invisible_chars_removed() {
        assert_eq!(normalize("hel\u{200B}lo\u{FEFF}"), "hello");
    }

    #[test]
    fn test_decimal_rejoined() {
        assert!(normalize("12 . 5").contains("12.5"));
        assert_eq!(normalize("1 . 2 . 3"), "1.2.3");
    }

    #[test]
    fn test_hyphen_rejoined() {
        assert!(normalize("co - operate").contains("co-operate"));
        assert_eq!(normalize("a - b - c"), "a-b-c");
    }

    #[test]
    fn test_rejoin_rules_skip_joined_pairs() {
        let rules = Normalizer::default();
        assert_eq!(rules.normalize("1.2 . 3"), "1.2.3");
        assert_eq!(rules.normalize("a-b - c-d - e"), "a-b-c-d-e");
        assert_eq!(rules.normalize("3. 5 and 7 .9"), "3.5 and 7.9");
    }

    #[test]
    fn test_stray_l_becomes_one() {
        assert_eq!(normalize("l.l"), "1.");
        assert_eq!(normalize("l , l"), "1,");
    }

    #[test]
    fn test_no_correctable_pattern_passes_through() {
        assert_eq!(normalize("Plain text, nothing to fix."), "Plain text, nothing to fix.");
    }

    #[test]
    fn test_page_marker_untouched() {
        let input = "page one text\n\n--- Page 2/2 ---\npage two text";
        let out = normalize(input);
        assert!(out.contains("--- Page 2/2 ---"));
    }

    #[test]
    fn test_header_surrounded_by_blank_lines() {
        let input = "Số: 12/QĐ\nQUYẾT ĐỊNH\nVề việc ban hành";
        assert_eq!(normalize(input), "Số: 12/QĐ\n\nQUYẾT ĐỊNH\n\nVề việc ban hành");
    }

    #[test]
    fn test_clause_gets_blank_line_before() {
        let input = "Preamble text\nArticle 1. Scope\nArticle 2. Terms";
        assert_eq!(
            normalize(input),
            "Preamble text\n\nArticle 1. Scope\n\nArticle 2. Terms"
        );
    }

    #[test]
    fn test_clause_label_needs_number_and_period() {
        let input = "intro\nArticle about things";
        assert_eq!(normalize(input), "intro\nArticle about things");
    }

    #[test]
    fn test_structure_disabled() {
        let n = Normalizer::builder()
            .without_step(NormalizeStep::Structure)
            .build()
            .unwrap();
        assert_eq!(n.normalize("x\nArticle 1. Scope"), "x\nArticle 1. Scope");
    }

    #[test]
    fn test_custom_clause_labels() {
        let n = Normalizer::builder().clause_labels(["§"]).build().unwrap();
        assert_eq!(n.normalize("x\n§ 4. Rule"), "x\n\n§ 4. Rule");
        assert_eq!(n.normalize("x\nArticle 1. Scope"), "x\nArticle 1. Scope");
    }

    #[test]
    fn test_no_clause_labels() {
        let n = Normalizer::builder()
            .clause_labels(Vec::<String>::new())
            .build()
            .unwrap();
        assert_eq!(n.normalize("x\nArticle 1. Scope"), "x\nArticle 1. Scope");
    }

    #[test]
    fn test_custom_rule_appended() {
        let n = Normalizer::builder()
            .rule(r"\bteh\b", "the")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(n.normalize("teh end"), "the end");
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let err = Normalizer::builder().rule("(unclosed", "x").unwrap_err();
        assert!(matches!(err, OcrError::InvalidConfig(_)));
    }

    #[test]
    fn test_cleared_rules() {
        let n = Normalizer::builder().clear_rules().build().unwrap();
        assert_eq!(n.normalize("12 . 5"), "12 . 5");
    }

    #[test]
    fn test_steps_dedup() {
        let n = Normalizer::builder()
            .steps(&[NormalizeStep::Whitespace, NormalizeStep::Whitespace])
            .build()
            .unwrap();
        assert_eq!(n.steps(), &[NormalizeStep::Whitespace]);
    }

    #[test]
    fn test_idempotent_on_samples() {
        let samples = [
            "Hello   world\n\n\n\nBye",
            "co - operate on 12 . 5 items\nl.l.l",
            "CỘNG HÒA XÃ HỘI CHỦ NGHĨA VIỆT NAM\nĐộc lập - Tự do - Hạnh phúc\nĐiều 1. Phạm vi\nĐiều 2. Đối tượng",
            "--- Page 1/2 ---\nfirst\n\n--- Page 2/2 ---\nsecond",
            "\u{FB01}rst  \u{00A0} line\r\n\r\n\r\nsecond",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }
}

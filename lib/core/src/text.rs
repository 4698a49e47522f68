// Text utilities shared by feature building, bias analysis and job hashing
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MALE_TERMS: &[&str] = &[
    "he", "his", "him", "man", "men", "male", "father", "son", "brother", "uncle", "husband",
    "gentleman",
];

pub const FEMALE_TERMS: &[&str] = &[
    "she", "her", "hers", "woman", "women", "female", "mother", "daughter", "sister", "aunt",
    "wife", "lady",
];

/// Gendered word -> neutral replacement used by [`mitigate_gendered_language`]
pub const NEUTRAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("he", "they"),
    ("she", "they"),
    ("his", "their"),
    ("her", "their"),
    ("him", "them"),
    ("man", "person"),
    ("woman", "person"),
    ("boy", "child"),
    ("girl", "child"),
    ("male", "person"),
    ("female", "person"),
    ("father", "parent"),
    ("mother", "parent"),
    ("businessman", "businessperson"),
    ("businesswoman", "businessperson"),
    ("chairman", "chairperson"),
    ("chairwoman", "chairperson"),
    ("sir", "person"),
    ("madam", "person"),
    ("gentleman", "person"),
    ("lady", "person"),
    ("husband", "spouse"),
    ("wife", "spouse"),
    ("son", "child"),
    ("daughter", "child"),
];

/// Pronouns are left untouched by mitigation; rewriting them breaks agreement.
const PRONOUNS: &[&str] = &["he", "she", "his", "her", "him", "hers"];

pub const LOW_BIAS_THRESHOLD: f64 = 1.0;
pub const MODERATE_BIAS_THRESHOLD: f64 = 3.0;

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Tokenize text into lowercase words.
/// Splits on whitespace and ASCII punctuation.
#[inline]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Number of words in the text
pub fn word_count(text: &str) -> usize {
    tokenize(text).len()
}

/// Well-formed tags and comments only; a bare `<` or `>` is text.
static HTML_TAG: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[/!]?[A-Za-z][^<>]*>").ok());

/// Case-insensitive, whole-word matcher for one keyword, compiled once.
///
/// A word boundary sits between a word character and a non-word character, so
/// "java" does not match inside "javascript" while multi-word and punctuated
/// keywords ("machine learning", "ci/cd") still do.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keyword: String,
    pattern: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(keyword: &str) -> Result<Self> {
        let trimmed = keyword.trim();
        let pattern = if trimmed.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b{}\b", regex::escape(trimmed)))?)
        };
        Ok(Self {
            keyword: keyword.to_string(),
            pattern,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Non-overlapping occurrences in `text`; an empty keyword matches nothing
    pub fn count(&self, text: &str) -> usize {
        self.pattern
            .as_ref()
            .map_or(0, |re| re.find_iter(text).count())
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(text))
    }
}

/// One-off [`KeywordMatcher::count`]. Build a matcher when scanning many texts.
pub fn count_whole_word(text: &str, keyword: &str) -> usize {
    KeywordMatcher::new(keyword).map_or(0, |m| m.count(text))
}

/// Remove HTML tags, decode the common entities and collapse whitespace.
pub fn strip_html(text: &str) -> String {
    let untagged = match &*HTML_TAG {
        Some(re) => re.replace_all(text, " "),
        None => text.into(),
    };

    let decoded = untagged
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Gendered terms found in a text, with their frequencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderedTerms {
    pub male: BTreeMap<String, usize>,
    pub female: BTreeMap<String, usize>,
}

impl GenderedTerms {
    pub fn detect(text: &str) -> Self {
        let mut terms = Self::default();
        for token in tokenize(text) {
            if MALE_TERMS.contains(&token.as_str()) {
                *terms.male.entry(token).or_insert(0) += 1;
            } else if FEMALE_TERMS.contains(&token.as_str()) {
                *terms.female.entry(token).or_insert(0) += 1;
            }
        }
        terms
    }

    pub fn male_count(&self) -> usize {
        self.male.values().sum()
    }

    pub fn female_count(&self) -> usize {
        self.female.values().sum()
    }
}

/// Gender bias score: `|male - female| / (words + 1e-6) * 100`.
///
/// 0.0 means balanced (or no gendered language at all).
pub fn gender_bias_score(text: &str) -> f64 {
    let terms = GenderedTerms::detect(text);
    let diff = terms.male_count().abs_diff(terms.female_count()) as f64;
    diff / (word_count(text) as f64 + 1e-6) * 100.0
}

/// Recommendation tier for a bias score
pub fn bias_recommendation(score: f64) -> &'static str {
    if score < LOW_BIAS_THRESHOLD {
        "This resume uses gender-neutral language effectively."
    } else if score < MODERATE_BIAS_THRESHOLD {
        "This resume has some gender-specific language, but is generally balanced."
    } else {
        "This resume shows significant gender imbalance in language usage."
    }
}

/// Rewrite gendered nouns to neutral forms, preserving whitespace,
/// punctuation and title-casing. Pronouns are kept.
pub fn mitigate_gendered_language(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();

    for c in text.chars() {
        if is_word_char(c) {
            word.push(c);
        } else {
            flush_word(&mut word, &mut out);
            out.push(c);
        }
    }
    flush_word(&mut word, &mut out);
    out
}

fn flush_word(word: &mut String, out: &mut String) {
    if !word.is_empty() {
        out.push_str(&neutral_form(word));
        word.clear();
    }
}

fn neutral_form(word: &str) -> String {
    let lower = word.to_lowercase();
    if PRONOUNS.contains(&lower.as_str()) {
        return word.to_string();
    }
    match NEUTRAL_REPLACEMENTS.iter().find(|(from, _)| *from == lower) {
        Some((_, replacement)) if is_title(word) => capitalize(replacement),
        Some((_, replacement)) => (*replacement).to_string(),
        None => word.to_string(),
    }
}

fn is_title(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.is_uppercase() && chars.all(|c| !c.is_uppercase()),
        None => false,
    }
}

/// First character uppercase, the rest lowercase
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

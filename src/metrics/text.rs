//! Lexical text utilities shared by the metric formulas and the lexical judge.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:[.,]\d+)*").expect("number pattern is valid")
});

/// `[1]`, `[Source 2]`, `[chunk:doc-9]`, `[1, 3]`.
pub(crate) static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[(?:(?:source|chunk|passage|ref)\s*[:#]?\s*)?([A-Za-z0-9_\-.]+(?:\s*,\s*[A-Za-z0-9_\-.]+)*)\]",
    )
    .expect("citation pattern is valid")
});

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "being", "but", "by", "can", "could", "did", "do", "does", "don", "for", "from", "had",
    "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "may", "me", "might", "more", "most", "much", "my", "of", "on", "one",
    "only", "or", "other", "our", "out", "over", "s", "she", "should", "so", "some", "such",
    "t", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "cannot", "neither", "nor", "none", "nobody", "nothing", "without",
    "isn", "aren", "wasn", "weren", "doesn", "didn", "don", "won", "couldn", "shouldn",
    "hasn", "haven", "hadn", "can't", "unable",
];

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// Tokens carrying content: no stopwords, no single letters.
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t) && (t.chars().count() > 1 || t.chars().all(|c| c.is_numeric())))
        .collect()
}

pub fn content_terms(text: &str) -> HashSet<String> {
    content_tokens(text).into_iter().collect()
}

/// Share of `needle` terms found in `haystack`; `0.0` for an empty needle.
pub fn coverage(needle: &HashSet<String>, haystack: &HashSet<String>) -> f64 {
    if needle.is_empty() {
        return 0.0;
    }
    needle.intersection(haystack).count() as f64 / needle.len() as f64
}

/// Jaccard index; `0.0` when both sets are empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Cosine similarity of content-term frequency vectors.
pub fn cosine_similarity(a: &str, b: &str) -> f64 {
    let freq = |text: &str| {
        let mut counts: HashMap<String, f64> = HashMap::new();
        for token in content_tokens(text) {
            *counts.entry(token).or_insert(0.0) += 1.0;
        }
        counts
    };
    let va = freq(a);
    let vb = freq(b);
    if va.is_empty() || vb.is_empty() {
        return 0.0;
    }

    let dot: f64 = va
        .iter()
        .filter_map(|(term, x)| vb.get(term).map(|y| x * y))
        .sum();
    let norm_a = va.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = vb.values().map(|x| x * x).sum::<f64>().sqrt();
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Harmonic mean of term precision and recall of `candidate` against `reference`.
pub fn token_f1(candidate: &str, reference: &str) -> f64 {
    let cand = content_terms(candidate);
    let refs = content_terms(reference);
    if cand.is_empty() || refs.is_empty() {
        return 0.0;
    }
    let overlap = cand.intersection(&refs).count() as f64;
    if overlap == 0.0 {
        return 0.0;
    }
    let precision = overlap / cand.len() as f64;
    let recall = overlap / refs.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Split text into sentences on terminal punctuation and line breaks.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            push_sentence(&mut out, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let next = chars.get(i + 1);
            let prev_is_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_is_digit = next.is_some_and(|n| n.is_ascii_digit());
            // "3.5" is a number, not a sentence boundary.
            if prev_is_digit && next_is_digit {
                continue;
            }
            if next.is_none_or(|n| n.is_whitespace()) {
                push_sentence(&mut out, &mut current);
            }
        }
    }
    push_sentence(&mut out, &mut current);
    out
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
        .trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Checkable factual statements: declarative sentences with at least two
/// content terms.
pub fn extract_claims(text: &str) -> Vec<String> {
    sentences(text)
        .into_iter()
        .filter(|s| !s.ends_with('?'))
        .filter(|s| content_terms(s).len() >= 2)
        .collect()
}

/// Numeric literals mentioned in the text, normalised.
pub fn numbers(text: &str) -> HashSet<String> {
    NUMBER
        .find_iter(text)
        .map(|m| m.as_str().replace(',', ""))
        .collect()
}

/// Text with citation markers removed, so marker numbers are not read as facts.
pub fn strip_citations(text: &str) -> String {
    CITATION.replace_all(text, "").into_owned()
}

pub fn is_negation(token: &str) -> bool {
    NEGATIONS.contains(&token)
}

pub fn is_negated(text: &str) -> bool {
    tokenize(text).iter().any(|t| is_negation(t))
}

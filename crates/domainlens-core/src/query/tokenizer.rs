//! Word splitting, phrase matching and token estimation.
//!
//! Identifiers and prose are split into lowercase words on non-alphanumerics,
//! underscores and camelCase boundaries, so `postGLEntry`, `post_gl_entry`
//! and "post GL entry" all yield `post gl entry`.

use std::sync::LazyLock;

use regex::Regex;

static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

static QUERY_TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_][A-Za-z0-9_]+").unwrap());

/// A lowercase word and its byte range in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn is_boundary(prev: char, current: char, next: Option<char>) -> bool {
    let lower_to_upper = (prev.is_lowercase() || prev.is_numeric()) && current.is_uppercase();
    let acronym_end =
        prev.is_uppercase() && current.is_uppercase() && next.is_some_and(char::is_lowercase);
    lower_to_upper || acronym_end
}

fn split_segment(segment: &str, offset: usize, out: &mut Vec<Word>) {
    let chars: Vec<(usize, char)> = segment.char_indices().collect();
    let mut start = 0;
    for i in 1..chars.len() {
        let next = chars.get(i + 1).map(|&(_, c)| c);
        if is_boundary(chars[i - 1].1, chars[i].1, next) {
            let (from, to) = (chars[start].0, chars[i].0);
            out.push(Word {
                text: segment[from..to].to_lowercase(),
                start: offset + from,
                end: offset + to,
            });
            start = i;
        }
    }
    if let Some(&(from, _)) = chars.get(start) {
        out.push(Word {
            text: segment[from..].to_lowercase(),
            start: offset + from,
            end: offset + segment.len(),
        });
    }
}

/// Split text into lowercase words with their byte offsets.
pub fn words(text: &str) -> Vec<Word> {
    let mut out = Vec::new();
    for segment in SEGMENT_RE.find_iter(text) {
        split_segment(segment.as_str(), segment.start(), &mut out);
    }
    out
}

/// Lowercase word sequence of a term (`gl_entry` -> `["gl", "entry"]`).
pub fn phrase(term: &str) -> Vec<String> {
    words(term).into_iter().map(|w| w.text).collect()
}

/// Byte range of the first occurrence of `phrase` as a contiguous word run.
pub fn find_phrase(haystack: &[Word], phrase: &[String]) -> Option<(usize, usize)> {
    if phrase.is_empty() || phrase.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(phrase.len())
        .find(|window| window.iter().zip(phrase).all(|(w, p)| w.text == *p))
        .map(|window| (window[0].start, window[window.len() - 1].end))
}

/// Distinct lowercase query terms of at least two characters, in query order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for m in QUERY_TERM_RE.find_iter(query) {
        let term = m.as_str().trim_matches('_').to_lowercase();
        if term.chars().count() >= 2 && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Rough token count for a chunk of text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    ((text.len() as f64 / 3.5) as usize).max(1)
}

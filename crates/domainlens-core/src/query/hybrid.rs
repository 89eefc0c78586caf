//! Relevance scoring for semantic search.
//!
//! `relevance = 0.6 * lexical + 0.3 * tag + 0.1 * context`, where lexical is
//! the share of query terms found in the entity name or docstring.

use crate::models::{DomainLabel, Entity};
use crate::query::guards::clamp_unit;
use crate::query::tokenizer::{find_phrase, phrase, words};

pub const LEXICAL_WEIGHT: f64 = 0.6;
pub const TAG_WEIGHT: f64 = 0.3;
pub const CONTEXT_WEIGHT: f64 = 0.1;

/// Query terms that occur as a whole word sequence in the name or docstring.
pub fn lexical_matches(terms: &[String], entity: &Entity) -> Vec<String> {
    let name_words = words(&entity.name);
    let doc_words = words(entity.docstring.as_deref().unwrap_or(""));
    terms
        .iter()
        .filter(|term| {
            let wanted = phrase(term);
            find_phrase(&name_words, &wanted).is_some() || find_phrase(&doc_words, &wanted).is_some()
        })
        .cloned()
        .collect()
}

pub fn lexical_score(matched: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    matched as f64 / total as f64
}

/// Entity labels named exactly by a query term.
pub fn tag_matches(terms: &[String], labels: &[DomainLabel]) -> Vec<DomainLabel> {
    labels
        .iter()
        .copied()
        .filter(|label| terms.iter().any(|t| t == label.as_str()))
        .collect()
}

pub fn rank(lexical: f64, tag_hit: bool, context: f64) -> f64 {
    let tag = if tag_hit { 1.0 } else { 0.0 };
    clamp_unit(
        LEXICAL_WEIGHT * clamp_unit(lexical) + TAG_WEIGHT * tag + CONTEXT_WEIGHT * clamp_unit(context),
    )
}

//! Free-text search over a built semantic index.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{SemanticError, SemanticResult};
use crate::models::{DomainLabel, Entity, EntityKey, EntityKind};
use crate::query::guards::{clamp_limit, truncate_query, MAX_SEARCH_LIMIT};
use crate::query::hybrid::{lexical_matches, lexical_score, rank, tag_matches};
use crate::query::tokenizer::query_terms;
use crate::semantic::index::{IndexedEntity, SemanticIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Cap `top_k` at `MAX_SEARCH_LIMIT`.
    pub bounded: bool,
    pub kind: Option<EntityKind>,
}

impl SearchOptions {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            bounded: false,
            kind: None,
        }
    }

    fn limit(&self) -> usize {
        if self.bounded {
            clamp_limit(self.top_k, MAX_SEARCH_LIMIT)
        } else {
            self.top_k
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub key: EntityKey,
    pub entity: Entity,
    pub relevance: f64,
    pub context_score: f64,
    pub matched_terms: Vec<String>,
    pub matched_tags: Vec<DomainLabel>,
    pub workflows: Vec<String>,
    pub explanation: String,
}

fn bracketed<T: AsRef<str>>(items: &[T]) -> String {
    let parts: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    format!("[{}]", parts.join(", "))
}

fn explain(hit_terms: &[String], hit_tags: &[DomainLabel], indexed: &IndexedEntity) -> String {
    let terms = if hit_terms.is_empty() {
        "no term match".to_string()
    } else {
        format!("matched terms {}", bracketed(hit_terms))
    };
    let tags = if hit_tags.is_empty() {
        "no tag match".to_string()
    } else {
        let labels: Vec<&str> = hit_tags.iter().map(DomainLabel::as_str).collect();
        format!("tag {}", bracketed(&labels))
    };
    let workflows = if indexed.workflows.is_empty() {
        "no workflows".to_string()
    } else {
        format!("workflows {}", bracketed(&indexed.workflows))
    };
    format!(
        "{terms}; {tags}; {workflows}; context {:.2} ({})",
        indexed.score.value,
        indexed.score.bucket.as_str()
    )
}

fn prepare_terms(query: &str) -> SemanticResult<Vec<String>> {
    let normalized = truncate_query(query);
    let terms = query_terms(&normalized);
    if terms.is_empty() {
        return Err(SemanticError::QueryInput(format!(
            "query {normalized:?} has no searchable terms"
        )));
    }
    Ok(terms)
}

fn score_entity(terms: &[String], indexed: &IndexedEntity) -> Option<QueryHit> {
    let hit_terms = lexical_matches(terms, &indexed.entity);
    let hit_tags = tag_matches(terms, &indexed.labels());
    if hit_terms.is_empty() && hit_tags.is_empty() {
        return None;
    }
    let relevance = rank(
        lexical_score(hit_terms.len(), terms.len()),
        !hit_tags.is_empty(),
        indexed.score.value,
    );
    Some(QueryHit {
        key: indexed.key.clone(),
        entity: indexed.entity.clone(),
        relevance,
        context_score: indexed.score.value,
        explanation: explain(&hit_terms, &hit_tags, indexed),
        matched_terms: hit_terms,
        matched_tags: hit_tags,
        workflows: indexed.workflows.clone(),
    })
}

/// Rank index entities against a free-text query.
///
/// Returns at most `top_k` hits, best first. A query without searchable
/// terms yields no hits.
pub fn search(index: &SemanticIndex, query: &str, top_k: usize) -> Vec<QueryHit> {
    search_with(index, query, &SearchOptions::new(top_k))
}

pub fn search_with(index: &SemanticIndex, query: &str, options: &SearchOptions) -> Vec<QueryHit> {
    let limit = options.limit();
    if limit == 0 {
        return Vec::new();
    }
    let terms = match prepare_terms(query) {
        Ok(terms) => terms,
        Err(err) => {
            warn!(error = %err, "rejected query");
            return Vec::new();
        }
    };

    let mut hits: Vec<QueryHit> = index
        .entities
        .values()
        .filter(|e| options.kind.map_or(true, |kind| e.entity.kind() == kind))
        .filter_map(|e| score_entity(&terms, e))
        .collect();
    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.context_score
                    .partial_cmp(&a.context_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.key.cmp(&b.key))
    });
    let matched = hits.len();
    hits.truncate(limit);
    debug!(
        terms = terms.len(),
        matched,
        returned = hits.len(),
        "search finished"
    );
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::indexer::pipeline::analyze_project;
    use std::collections::BTreeMap;

    const ETL: &str = "def load_data(path):\n    return open(path).read()\n\ndef process_data(rows):\n    \"\"\"Post rows to the ledger.\"\"\"\n    return load_data(rows)\n";

    const BOOKS: &str = "\
class Invoice:
    \"\"\"Customer invoice.\"\"\"


def record_journal(entry):
    \"\"\"Record a journal entry and post it.\"\"\"
    post_to_ledger(entry)


def post_to_ledger(entry):
    \"\"\"Write to the general ledger.\"\"\"
    return entry


def helper():
    pass
";

    fn index_of(files: &[(&str, &str)]) -> SemanticIndex {
        let sources: BTreeMap<String, String> = files
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect();
        analyze_project(&sources, &AnalysisConfig::default()).unwrap().index
    }

    fn names(hits: &[QueryHit]) -> Vec<&str> {
        hits.iter().map(|h| h.entity.name.as_str()).collect()
    }

    #[test]
    fn test_ledger_query_ranks_tagged_entity_first() {
        let index = index_of(&[("etl.py", ETL)]);
        let hits = search(&index, "ledger", 10);
        assert_eq!(names(&hits), vec!["process_data"]);
        let hit = &hits[0];
        assert_eq!(hit.matched_terms, vec!["ledger"]);
        assert_eq!(hit.matched_tags, vec![DomainLabel::Ledger]);
        assert!((hit.relevance - (0.6 + 0.3 + 0.1 * hit.context_score)).abs() < 1e-9);
        assert_eq!(
            hit.explanation,
            format!(
                "matched terms [ledger]; tag [ledger]; no workflows; context {:.2} (HIGH)",
                hit.context_score
            )
        );
    }

    #[test]
    fn test_top_k_bounds() {
        let index = index_of(&[("books.py", BOOKS), ("etl.py", ETL)]);
        assert!(search(&index, "ledger", 0).is_empty());

        let all = search(&index, "ledger journal invoice", 1_000);
        assert_eq!(all.len(), 4);
        assert!(!names(&all).contains(&"helper"));
        assert!(!names(&all).contains(&"load_data"));
        for hit in &all {
            assert!((0.0..=1.0).contains(&hit.relevance));
        }
        assert_eq!(search(&index, "ledger journal invoice", 2).len(), 2);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let index = index_of(&[("books.py", BOOKS), ("etl.py", ETL)]);
        let hits = search(&index, "ledger", 10);
        for pair in hits.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
        assert_eq!(hits, search(&index, "ledger", 10));
        assert_eq!(names(&hits)[0], "post_to_ledger");
    }

    #[test]
    fn test_workflows_cited_in_explanation() {
        let index = index_of(&[("books.py", BOOKS)]);
        let hits = search(&index, "journal", 5);
        let record = hits.iter().find(|h| h.entity.name == "record_journal").unwrap();
        assert_eq!(record.workflows, vec!["journal_to_ledger"]);
        assert!(record.explanation.contains("workflows [journal_to_ledger]"));
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let index = index_of(&[("etl.py", ETL)]);
        assert!(search(&index, "", 10).is_empty());
        assert!(search(&index, "  ? a ", 10).is_empty());
        assert!(search(&index, "unrelated words", 10).is_empty());
        assert!(matches!(prepare_terms("!!"), Err(SemanticError::QueryInput(_))));
    }

    #[test]
    fn test_options_filter_and_bound() {
        let index = index_of(&[("books.py", BOOKS)]);
        let options = SearchOptions {
            kind: Some(EntityKind::Class),
            ..SearchOptions::new(10)
        };
        assert_eq!(names(&search_with(&index, "invoice ledger", &options)), vec!["Invoice"]);

        let bounded = SearchOptions {
            bounded: true,
            ..SearchOptions::new(usize::MAX)
        };
        assert!(search_with(&index, "ledger journal invoice", &bounded).len() <= MAX_SEARCH_LIMIT);
    }
}

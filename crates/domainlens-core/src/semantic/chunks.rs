//! Chunk view: one deterministic text rendering per entity for embedding
//! collaborators, with a content digest so unchanged chunks can be skipped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::indexer::callgraph::CallGraph;
use crate::models::{DomainLabel, DomainTag, Entity, EntityId, EntityKey, FileAnalysis};
use crate::query::tokenizer::estimate_tokens;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChunk {
    pub key: EntityKey,
    pub text: String,
    /// SHA-256 hex of `text`.
    pub digest: String,
    pub estimated_tokens: usize,
}

fn distinct_labels(tags: &[DomainTag]) -> Vec<DomainLabel> {
    let mut labels: Vec<DomainLabel> = Vec::new();
    for tag in tags {
        if !labels.contains(&tag.label) {
            labels.push(tag.label);
        }
    }
    labels
}

fn render(entity: &Entity, tags: &[DomainTag], calls: &[&str], workflows: &[String]) -> String {
    let mut lines = vec![format!(
        "{} {} ({})",
        entity.kind_label(),
        entity.id,
        entity.location
    )];
    if let Some(doc) = entity.docstring.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(doc.trim().to_string());
    }
    let labels = distinct_labels(tags);
    if !labels.is_empty() {
        let names: Vec<&str> = labels.iter().map(DomainLabel::as_str).collect();
        lines.push(format!("Tags: {}", names.join(", ")));
    }
    if !calls.is_empty() {
        lines.push(format!("Calls: {}", calls.join(", ")));
    }
    if !workflows.is_empty() {
        lines.push(format!("Workflows: {}", workflows.join(", ")));
    }
    lines.join("\n")
}

/// Build the chunk for one entity. `calls` are callee qualified names.
pub fn entity_chunk(
    key: EntityKey,
    entity: &Entity,
    tags: &[DomainTag],
    calls: &[&str],
    workflows: &[String],
) -> EntityChunk {
    let text = render(entity, tags, calls, workflows);
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let estimated_tokens = estimate_tokens(&text);
    EntityChunk {
        key,
        text,
        digest,
        estimated_tokens,
    }
}

/// Chunks for every entity of one analyzed file, in document order.
pub fn file_chunks(
    analysis: &FileAnalysis,
    graph: &CallGraph,
    tags: &IndexMap<EntityId, Vec<DomainTag>>,
) -> Vec<EntityChunk> {
    analysis
        .entities
        .values()
        .map(|entity| {
            let calls: Vec<&str> = graph.callees(&entity.id).map(EntityId::as_str).collect();
            let entity_tags = tags.get(&entity.id).map(Vec::as_slice).unwrap_or(&[]);
            entity_chunk(
                EntityKey::new(&analysis.file_path, &entity.id),
                entity,
                entity_tags,
                &calls,
                &[],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::indexer::callgraph::resolve;
    use crate::indexer::extract::extract;
    use crate::semantic::tagger::{default_rules, DomainTagger};

    const SOURCE: &str = "def load_data(path):\n    return open(path).read()\n\ndef process_data(rows):\n    \"\"\"Post rows to the ledger.\"\"\"\n    return load_data(rows)\n";

    fn chunks_for(source: &str) -> Vec<EntityChunk> {
        let analysis = extract(source, "etl.py", &AnalysisConfig::default()).unwrap();
        let graph = resolve(&analysis);
        let tags = DomainTagger::new(&default_rules()).tag_file(&analysis);
        file_chunks(&analysis, &graph, &tags)
    }

    #[test]
    fn test_chunk_text_layout() {
        let chunks = chunks_for(SOURCE);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].key.as_str(), "etl.py::etl.load_data");
        assert_eq!(chunks[0].text, "Function etl.load_data (etl.py:1)");
        assert_eq!(
            chunks[1].text,
            "Function etl.process_data (etl.py:4)\nPost rows to the ledger.\nTags: ledger\nCalls: etl.load_data"
        );
        assert!(chunks[1].estimated_tokens > 0);
    }

    #[test]
    fn test_digest_tracks_content() {
        let first = chunks_for(SOURCE);
        let again = chunks_for(SOURCE);
        assert_eq!(first, again);
        assert_eq!(first[0].digest.len(), 64);

        let edited = chunks_for(&SOURCE.replace("Post rows", "Send rows"));
        assert_eq!(edited[0].digest, first[0].digest);
        assert_ne!(edited[1].digest, first[1].digest);
    }

    #[test]
    fn test_workflows_rendered_last() {
        let analysis = extract(SOURCE, "etl.py", &AnalysisConfig::default()).unwrap();
        let entity = &analysis.entities[1];
        let chunk = entity_chunk(
            EntityKey::new("etl.py", &entity.id),
            entity,
            &[],
            &[],
            &["journal_to_ledger".to_string()],
        );
        assert!(chunk.text.ends_with("\nWorkflows: journal_to_ledger"));
        assert!(!chunk.text.contains("Tags:"));
    }
}

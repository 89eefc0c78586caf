//! Semantic index construction.
//!
//! The builder is the one place where per-entity results of independent
//! stages are merged. It checks that every id referenced by the call graph,
//! tag map, workflow list and score map exists in the owning file, then keys
//! everything by `file_path::qualified_name` so files never collide.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::errors::{DanglingRef, SemanticError, SemanticResult};
use crate::indexer::callgraph::CallGraph;
use crate::models::{
    ContextScore, DomainLabel, DomainTag, Entity, EntityId, EntityKey, FileAnalysis,
    ParseDiagnostic, RelationKind, ScoreBucket, WorkflowInstance,
};
use crate::semantic::chunks::{entity_chunk, EntityChunk};

// ---------------------------------------------------------------------------
// Builder input
// ---------------------------------------------------------------------------

/// Everything the per-file pipeline produced for one file.
#[derive(Debug, Clone)]
pub struct FileArtifacts {
    pub analysis: FileAnalysis,
    pub graph: CallGraph,
    pub tags: IndexMap<EntityId, Vec<DomainTag>>,
    pub workflows: Vec<WorkflowInstance>,
    pub scores: IndexMap<EntityId, ContextScore>,
}

impl FileArtifacts {
    fn parts(&self) -> FileParts<'_> {
        FileParts {
            analysis: &self.analysis,
            graph: &self.graph,
            tags: &self.tags,
            workflows: &self.workflows,
            scores: &self.scores,
        }
    }
}

struct FileParts<'a> {
    analysis: &'a FileAnalysis,
    graph: &'a CallGraph,
    tags: &'a IndexMap<EntityId, Vec<DomainTag>>,
    workflows: &'a [WorkflowInstance],
    scores: &'a IndexMap<EntityId, ContextScore>,
}

impl FileParts<'_> {
    fn dangling(&self) -> Vec<DanglingRef> {
        let analysis = self.analysis;
        let mut missing = Vec::new();
        let mut check = |source: &str, id: &EntityId| {
            if !analysis.contains(id) {
                missing.push(DanglingRef {
                    file_path: analysis.file_path.clone(),
                    source: source.to_string(),
                    entity: id.to_string(),
                });
            }
        };
        for relationship in &self.graph.relationships {
            check("relationship", &relationship.source);
            check("relationship", &relationship.target);
        }
        for id in self.tags.keys() {
            check("tags", id);
        }
        for workflow in self.workflows {
            for id in workflow.entity_ids() {
                check("workflow", id);
            }
        }
        for id in self.scores.keys() {
            check("score", id);
        }
        missing
    }
}

// ---------------------------------------------------------------------------
// Index types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntity {
    pub key: EntityKey,
    pub file_path: String,
    pub entity: Entity,
    pub tags: Vec<DomainTag>,
    pub score: ContextScore,
    /// Ids of the workflow templates this entity takes part in.
    pub workflows: Vec<String>,
    /// Keys of resolved callees.
    pub calls: Vec<EntityKey>,
    /// Keys of same-file callers.
    #[serde(default)]
    pub called_by: Vec<EntityKey>,
}

impl IndexedEntity {
    pub fn has_label(&self, label: DomainLabel) -> bool {
        self.tags.iter().any(|t| t.label == label)
    }

    /// Distinct tag labels in first-seen order.
    pub fn labels(&self) -> Vec<DomainLabel> {
        let mut labels: Vec<DomainLabel> = Vec::new();
        for tag in &self.tags {
            if !labels.contains(&tag.label) {
                labels.push(tag.label);
            }
        }
        labels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRelationship {
    pub source: EntityKey,
    pub target: EntityKey,
    pub kind: RelationKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_path: String,
    pub module: String,
    pub entity_count: usize,
    /// Entities carrying each label, labels in vocabulary order.
    pub tag_counts: IndexMap<DomainLabel, usize>,
    pub primary_tag: Option<DomainLabel>,
    pub domain_path: bool,
    pub mean_score: f64,
    pub degraded: bool,
    #[serde(default)]
    pub call_edges: usize,
    #[serde(default)]
    pub import_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiagnostic {
    pub file_path: String,
    #[serde(flatten)]
    pub diagnostic: ParseDiagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub entities: usize,
    pub relationships: usize,
    pub workflows: usize,
    pub tagged_entities: usize,
    pub high_quality_entities: usize,
    pub degraded_files: usize,
}

/// Read-only, serializable result of a build.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemanticIndex {
    pub entities: IndexMap<EntityKey, IndexedEntity>,
    pub relationships: Vec<IndexedRelationship>,
    pub workflows: Vec<WorkflowInstance>,
    pub tag_index: IndexMap<DomainLabel, Vec<EntityKey>>,
    pub files: Vec<FileSummary>,
    pub diagnostics: Vec<FileDiagnostic>,
    pub stats: IndexStats,
}

impl SemanticIndex {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&IndexedEntity> {
        self.entities.get(key)
    }

    pub fn entities_with_label(&self, label: DomainLabel) -> impl Iterator<Item = &IndexedEntity> {
        self.tag_index
            .get(&label)
            .into_iter()
            .flatten()
            .filter_map(|key| self.entities.get(key))
    }

    pub fn file(&self, file_path: &str) -> Option<&FileSummary> {
        self.files.iter().find(|f| f.file_path == file_path)
    }

    pub fn to_json(&self) -> SemanticResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> SemanticResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// SHA-256 hex of the JSON form. Equal for equal builds.
    pub fn fingerprint(&self) -> SemanticResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json()?.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Chunk view of every entity, in index order.
    pub fn chunks(&self) -> Vec<EntityChunk> {
        self.entities
            .values()
            .map(|indexed| {
                let calls: Vec<&str> = indexed
                    .calls
                    .iter()
                    .filter_map(|key| self.entities.get(key))
                    .map(|callee| callee.entity.id.as_str())
                    .collect();
                entity_chunk(
                    indexed.key.clone(),
                    &indexed.entity,
                    &indexed.tags,
                    &calls,
                    &indexed.workflows,
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct IndexBuilder<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Build an index for a single file. Tags and scores may be partial.
    pub fn build(
        &self,
        analysis: &FileAnalysis,
        graph: &CallGraph,
        tags: &IndexMap<EntityId, Vec<DomainTag>>,
        workflows: &[WorkflowInstance],
        scores: &IndexMap<EntityId, ContextScore>,
    ) -> SemanticResult<SemanticIndex> {
        self.assemble(&[FileParts {
            analysis,
            graph,
            tags,
            workflows,
            scores,
        }])
    }

    /// Build one index over many files, in the given file order.
    pub fn build_project(&self, files: &[FileArtifacts]) -> SemanticResult<SemanticIndex> {
        let parts: Vec<FileParts<'_>> = files.iter().map(FileArtifacts::parts).collect();
        self.assemble(&parts)
    }

    fn assemble(&self, files: &[FileParts<'_>]) -> SemanticResult<SemanticIndex> {
        let mut seen = HashSet::new();
        for file in files {
            if !seen.insert(file.analysis.file_path.as_str()) {
                return Err(SemanticError::DuplicateFile(file.analysis.file_path.clone()));
            }
        }
        let dangling: Vec<DanglingRef> = files.iter().flat_map(FileParts::dangling).collect();
        if !dangling.is_empty() {
            return Err(SemanticError::BuildInvariant { dangling });
        }

        let mut index = SemanticIndex::default();
        for file in files {
            self.add_file(&mut index, file);
        }
        index.tag_index = tag_index(&index.entities);
        index.stats = IndexStats {
            files: index.files.len(),
            entities: index.entities.len(),
            relationships: index.relationships.len(),
            workflows: index.workflows.len(),
            tagged_entities: index.entities.values().filter(|e| !e.tags.is_empty()).count(),
            high_quality_entities: index
                .entities
                .values()
                .filter(|e| e.score.bucket == ScoreBucket::High)
                .count(),
            degraded_files: index.files.iter().filter(|f| f.degraded).count(),
        };
        info!(
            files = index.stats.files,
            entities = index.stats.entities,
            relationships = index.stats.relationships,
            workflows = index.stats.workflows,
            degraded = index.stats.degraded_files,
            "built semantic index"
        );
        Ok(index)
    }

    fn add_file(&self, index: &mut SemanticIndex, file: &FileParts<'_>) {
        let analysis = file.analysis;
        let path = analysis.file_path.as_str();
        let key_of = |id: &EntityId| EntityKey::new(path, id);

        let mut score_sum = 0.0;
        let mut tag_counts: BTreeMap<DomainLabel, usize> = BTreeMap::new();
        for entity in analysis.entities.values() {
            let tags = file.tags.get(&entity.id).cloned().unwrap_or_default();
            let score = file
                .scores
                .get(&entity.id)
                .cloned()
                .unwrap_or_else(ContextScore::unscored);
            let mut workflows: Vec<String> = Vec::new();
            for workflow in file.workflows {
                if workflow.entity_ids().any(|id| *id == entity.id)
                    && !workflows.contains(&workflow.template_id)
                {
                    workflows.push(workflow.template_id.clone());
                }
            }
            let calls: Vec<EntityKey> = file.graph.callees(&entity.id).map(key_of).collect();
            let called_by: Vec<EntityKey> = file.graph.callers(&entity.id).map(key_of).collect();

            score_sum += score.value;
            let indexed = IndexedEntity {
                key: key_of(&entity.id),
                file_path: path.to_string(),
                entity: entity.clone(),
                tags,
                score,
                workflows,
                calls,
                called_by,
            };
            for label in indexed.labels() {
                *tag_counts.entry(label).or_default() += 1;
            }
            index.entities.insert(indexed.key.clone(), indexed);
        }

        index
            .relationships
            .extend(file.graph.relationships.iter().map(|r| IndexedRelationship {
                source: key_of(&r.source),
                target: key_of(&r.target),
                kind: r.kind,
                line: r.line,
            }));
        index.workflows.extend(file.workflows.iter().cloned());
        index
            .diagnostics
            .extend(analysis.diagnostics.iter().map(|d| FileDiagnostic {
                file_path: path.to_string(),
                diagnostic: d.clone(),
            }));

        let entity_count = analysis.entities.len();
        let mut primary_tag = None;
        let mut best = 0;
        for (label, count) in &tag_counts {
            if *count > best {
                best = *count;
                primary_tag = Some(*label);
            }
        }
        index.files.push(FileSummary {
            file_path: path.to_string(),
            module: analysis.module.clone(),
            entity_count,
            tag_counts: tag_counts.into_iter().collect(),
            primary_tag,
            domain_path: self.config.is_domain_path(path),
            mean_score: if entity_count == 0 {
                0.0
            } else {
                score_sum / entity_count as f64
            },
            degraded: analysis.has_errors(),
            call_edges: file.graph.edges_of_kind(RelationKind::Calls).count(),
            import_edges: file.graph.edges_of_kind(RelationKind::Imports).count(),
        });
    }
}

fn tag_index(entities: &IndexMap<EntityKey, IndexedEntity>) -> IndexMap<DomainLabel, Vec<EntityKey>> {
    let mut by_label: BTreeMap<DomainLabel, Vec<EntityKey>> = BTreeMap::new();
    for indexed in entities.values() {
        for label in indexed.labels() {
            by_label.entry(label).or_default().push(indexed.key.clone());
        }
    }
    by_label.into_iter().collect()
}

//! Relationship resolution from raw references to a file-local graph.
//!
//! Resolution is cascading and precision-first, first match wins:
//! local receiver (drop) > module-level name > enclosing-class method >
//! import binding > drop. Base classes resolve against same-file classes
//! only. Nothing here guesses types or looks across files.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{
    Entity, EntityDetail, EntityId, FileAnalysis, RawReference, Receiver, ReferenceKind,
    RelationKind, Relationship,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    LocalReceiver,
    ExpressionReceiver,
    NoMatch,
}

/// A reference the resolver declined to turn into an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedReference {
    pub source: EntityId,
    pub name: String,
    pub receiver: Option<String>,
    pub line: u32,
    pub reason: UnresolvedReason,
}

/// Resolved relationships of one file, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub relationships: Vec<Relationship>,
    pub unresolved: Vec<UnresolvedReference>,
    /// Base class names that matched no class in the file, per class.
    pub unresolved_bases: IndexMap<EntityId, Vec<String>>,
    outgoing: HashMap<EntityId, Vec<usize>>,
    incoming: HashMap<EntityId, Vec<usize>>,
}

impl CallGraph {
    fn push(&mut self, relationship: Relationship) {
        let index = self.relationships.len();
        self.outgoing
            .entry(relationship.source.clone())
            .or_default()
            .push(index);
        self.incoming
            .entry(relationship.target.clone())
            .or_default()
            .push(index);
        self.relationships.push(relationship);
    }

    /// Outgoing edges of `id` with the given kind, in insertion order.
    pub fn outgoing(&self, id: &EntityId, kind: RelationKind) -> impl Iterator<Item = &Relationship> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.relationships[i])
            .filter(move |r| r.kind == kind)
    }

    pub fn callees(&self, id: &EntityId) -> impl Iterator<Item = &EntityId> {
        self.outgoing(id, RelationKind::Calls).map(|r| &r.target)
    }

    pub fn callers(&self, id: &EntityId) -> impl Iterator<Item = &EntityId> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.relationships[i])
            .filter(|r| r.kind == RelationKind::Calls)
            .map(|r| &r.source)
    }

    pub fn edges_of_kind(&self, kind: RelationKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Symbol lookups
// ---------------------------------------------------------------------------

struct Lookups<'a> {
    /// Module-level functions and classes by name. First definition wins.
    module_level: HashMap<&'a str, &'a EntityId>,
    /// Classes by path relative to the module (`Outer.Inner`).
    class_paths: HashMap<&'a str, &'a EntityId>,
    methods: HashMap<(&'a EntityId, &'a str), &'a EntityId>,
    imports: HashMap<&'a str, &'a EntityId>,
}

fn local_path<'a>(module: &str, id: &'a EntityId) -> &'a str {
    let full = id.as_str();
    if module.is_empty() {
        return full;
    }
    full.strip_prefix(module)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(full)
}

impl<'a> Lookups<'a> {
    fn new(analysis: &'a FileAnalysis) -> Self {
        let mut lookups = Lookups {
            module_level: HashMap::new(),
            class_paths: HashMap::new(),
            methods: HashMap::new(),
            imports: HashMap::new(),
        };
        for entity in analysis.entities.values() {
            match &entity.detail {
                EntityDetail::Function(function) => match &function.owner {
                    Some(owner) => {
                        lookups
                            .methods
                            .entry((owner, entity.name.as_str()))
                            .or_insert(&entity.id);
                    }
                    None => {
                        lookups
                            .module_level
                            .entry(entity.name.as_str())
                            .or_insert(&entity.id);
                    }
                },
                EntityDetail::Class(class) => {
                    if class.owner.is_none() {
                        lookups
                            .module_level
                            .entry(entity.name.as_str())
                            .or_insert(&entity.id);
                    }
                    lookups
                        .class_paths
                        .entry(local_path(&analysis.module, &entity.id))
                        .or_insert(&entity.id);
                }
                EntityDetail::Import(import) => {
                    lookups
                        .imports
                        .entry(import.bound_name())
                        .or_insert(&entity.id);
                }
            }
        }
        lookups
    }

    fn enclosing_method(&self, caller: &'a Entity, name: &'a str) -> Option<&'a EntityId> {
        let owner = match &caller.detail {
            EntityDetail::Function(function) => function.owner.as_ref()?,
            _ => return None,
        };
        self.methods.get(&(owner, name)).copied()
    }

    fn resolve_call(
        &self,
        reference: &'a RawReference,
        caller: &'a Entity,
    ) -> Result<(&'a EntityId, RelationKind), UnresolvedReason> {
        let name = reference.name.as_str();
        match &reference.receiver {
            Some(Receiver::Local(_)) => Err(UnresolvedReason::LocalReceiver),
            Some(Receiver::Expression(_)) => Err(UnresolvedReason::ExpressionReceiver),
            None => {
                if let Some(target) = self.module_level.get(name) {
                    return Ok((*target, RelationKind::Calls));
                }
                if let Some(target) = self.enclosing_method(caller, name) {
                    return Ok((target, RelationKind::Calls));
                }
                self.imports
                    .get(name)
                    .map(|target| (*target, RelationKind::Imports))
                    .ok_or(UnresolvedReason::NoMatch)
            }
            Some(Receiver::SelfRef(_)) => self
                .enclosing_method(caller, name)
                .map(|target| (target, RelationKind::Calls))
                .ok_or(UnresolvedReason::NoMatch),
            Some(Receiver::Name(receiver)) => self
                .imports
                .get(receiver.as_str())
                .map(|target| (*target, RelationKind::Imports))
                .ok_or(UnresolvedReason::NoMatch),
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Resolve the raw references of one file into relationships.
///
/// Every relationship endpoint is an entity of `analysis`. Duplicate
/// same-kind edges collapse onto the first occurrence.
pub fn resolve(analysis: &FileAnalysis) -> CallGraph {
    let lookups = Lookups::new(analysis);
    let mut graph = CallGraph::default();
    let mut seen: HashSet<(EntityId, EntityId, RelationKind)> = HashSet::new();

    for reference in &analysis.references {
        let Some(caller) = analysis.entity(&reference.source) else {
            continue;
        };

        let resolved = match reference.kind {
            ReferenceKind::Call => lookups.resolve_call(reference, caller),
            ReferenceKind::Base => match lookups.class_paths.get(reference.name.as_str()) {
                Some(target) if *target != &caller.id => Ok((*target, RelationKind::Inherits)),
                _ => {
                    graph
                        .unresolved_bases
                        .entry(caller.id.clone())
                        .or_default()
                        .push(reference.name.clone());
                    continue;
                }
            },
        };

        match resolved {
            Ok((target, kind)) => {
                let key = (caller.id.clone(), target.clone(), kind);
                if seen.insert(key) {
                    graph.push(Relationship {
                        source: caller.id.clone(),
                        target: target.clone(),
                        kind,
                        line: reference.line,
                    });
                }
            }
            Err(reason) => graph.unresolved.push(UnresolvedReference {
                source: caller.id.clone(),
                name: reference.name.clone(),
                receiver: reference.receiver.as_ref().map(|r| r.text().to_string()),
                line: reference.line,
                reason,
            }),
        }
    }

    debug!(
        file = %analysis.file_path,
        relationships = graph.relationships.len(),
        unresolved = graph.unresolved.len(),
        unresolved_bases = graph.unresolved_bases.len(),
        "resolved relationships"
    );
    graph
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::indexer::extract::extract;

    fn graph_for(source: &str) -> (FileAnalysis, CallGraph) {
        let analysis = extract(source, "books.py", &AnalysisConfig::default()).unwrap();
        let graph = resolve(&analysis);
        (analysis, graph)
    }

    fn edges(graph: &CallGraph) -> Vec<(&str, &str, RelationKind)> {
        graph
            .relationships
            .iter()
            .map(|r| (r.source.as_str(), r.target.as_str(), r.kind))
            .collect()
    }

    #[test]
    fn test_resolve_same_file_function() {
        let (_, graph) = graph_for("def load():\n    pass\n\ndef process():\n    load()\n    load()\n");
        assert_eq!(
            edges(&graph),
            vec![("books.process", "books.load", RelationKind::Calls)]
        );
        assert_eq!(graph.relationships[0].line, 5);
    }

    #[test]
    fn test_resolve_class_scoped_self_call() {
        let source = "\
class Ledger:
    def post(self):
        self.validate()
        validate()

    def validate(self):
        pass
";
        let (_, graph) = graph_for(source);
        assert_eq!(
            edges(&graph),
            vec![("books.Ledger.post", "books.Ledger.validate", RelationKind::Calls)]
        );
    }

    #[test]
    fn test_module_level_name_beats_method() {
        let source = "\
def validate():
    pass

class Ledger:
    def post(self):
        validate()
        self.validate()

    def validate(self):
        pass
";
        let (_, graph) = graph_for(source);
        assert_eq!(
            edges(&graph),
            vec![
                ("books.Ledger.post", "books.validate", RelationKind::Calls),
                ("books.Ledger.post", "books.Ledger.validate", RelationKind::Calls),
            ]
        );
    }

    #[test]
    fn test_local_receiver_left_unresolved() {
        let source = "\
def post():
    pass

def run(ledger):
    ledger.post()
";
        let (_, graph) = graph_for(source);
        assert!(graph.relationships.is_empty());
        assert_eq!(graph.unresolved.len(), 1);
        assert_eq!(graph.unresolved[0].reason, UnresolvedReason::LocalReceiver);
        assert_eq!(graph.unresolved[0].receiver.as_deref(), Some("ledger"));
    }

    #[test]
    fn test_import_usage_edges() {
        let source = "\
import numpy as np
from decimal import Decimal

def total(rows):
    np.sum(rows)
    Decimal(0)
    print(rows)
";
        let (_, graph) = graph_for(source);
        assert_eq!(
            edges(&graph),
            vec![
                ("books.total", "books.np", RelationKind::Imports),
                ("books.total", "books.Decimal", RelationKind::Imports),
            ]
        );
        assert_eq!(graph.unresolved.len(), 1);
        assert_eq!(graph.unresolved[0].name, "print");
        assert_eq!(graph.unresolved[0].reason, UnresolvedReason::NoMatch);
    }

    #[test]
    fn test_inheritance_same_file_only() {
        let source = "\
class Base:
    pass

class Outer:
    class Inner:
        pass

class Entry(Base, Outer.Inner, models.Model):
    pass
";
        let (_, graph) = graph_for(source);
        assert_eq!(
            edges(&graph),
            vec![
                ("books.Entry", "books.Base", RelationKind::Inherits),
                ("books.Entry", "books.Outer.Inner", RelationKind::Inherits),
            ]
        );
        assert_eq!(
            graph.unresolved_bases.get(&EntityId::from("books.Entry")),
            Some(&vec!["models.Model".to_string()])
        );
    }

    #[test]
    fn test_graph_navigation() {
        let source = "def a():\n    b()\n    c()\n\ndef b():\n    c()\n\ndef c():\n    pass\n";
        let (_, graph) = graph_for(source);
        let a_callees: Vec<&str> = graph.callees(&EntityId::from("books.a")).map(EntityId::as_str).collect();
        assert_eq!(a_callees, vec!["books.b", "books.c"]);
        let c_callers: Vec<&str> = graph.callers(&EntityId::from("books.c")).map(EntityId::as_str).collect();
        assert_eq!(c_callers, vec!["books.a", "books.b"]);
        assert_eq!(graph.edges_of_kind(RelationKind::Inherits).count(), 0);
    }

    #[test]
    fn test_relationships_never_dangle() {
        let source = "\
import os

class Account(Base):
    def close(self, other):
        self.flush()
        other.flush()
        os.remove('x')
        helper()

    def flush(self):
        Account()

def helper():
    missing()
";
        let (analysis, graph) = graph_for(source);
        assert!(!graph.relationships.is_empty());
        for relationship in &graph.relationships {
            assert!(analysis.contains(&relationship.source));
            assert!(analysis.contains(&relationship.target));
        }
    }
}

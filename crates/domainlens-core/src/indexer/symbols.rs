//! Pass 1: entity extraction from a parsed Python tree.
//!
//! Walks module and class bodies in document order and records functions,
//! methods, classes and imports. Function bodies are opaque here: anything
//! defined inside a function belongs to that function.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::rc::Rc;

use indexmap::IndexMap;
use tree_sitter::Node;

use crate::indexer::parser::{classify, end_line, named_children, node_text, start_line, SyntaxNode};
use crate::models::{
    ClassDetail, Entity, EntityDetail, EntityId, FunctionDetail, ImportDetail, Location,
    ParseDiagnostic, Severity, Visibility,
};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Convert a file path to a dotted module name.
///
/// Strips the extension, joins normal path components with dots, and drops a
/// trailing `__init__` so a package file is named after its package.
pub fn to_module_name(path: &str) -> String {
    let without_ext = Path::new(path).with_extension("");
    let mut parts: Vec<&str> = without_ext
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect();
    if parts.last() == Some(&"__init__") && parts.len() > 1 {
        parts.pop();
    }
    parts.join(".")
}

/// Strip string prefix and quotes from a docstring literal and clean its indentation.
pub fn clean_docstring(raw: &str) -> Option<String> {
    let unprefixed = raw.trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|quote| {
            unprefixed
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(unprefixed);

    let mut lines = inner.lines();
    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();
    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(rest.len() + 1);
    cleaned.push(first);
    for line in rest {
        let dedented = line.get(indent..).unwrap_or_else(|| line.trim_start());
        cleaned.push(dedented.trim_end().to_string());
    }
    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    let text = cleaned.join("\n");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn docstring_of(body: Option<Node<'_>>, source: &str) -> Option<String> {
    let first = *named_children(body?).first()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    clean_docstring(node_text(expr, source))
}

fn decorator_name(decorator: Node<'_>, source: &str) -> Option<String> {
    let expr = decorator.named_child(0)?;
    let target = match expr.kind() {
        "call" => expr.child_by_field_name("function").unwrap_or(expr),
        _ => expr,
    };
    Some(node_text(target, source).trim().to_string())
}

fn parameter_name(param: Node<'_>, source: &str) -> Option<String> {
    match param.kind() {
        "identifier" => Some(node_text(param, source).to_string()),
        "default_parameter" | "typed_default_parameter" => param
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string()),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => param
            .named_child(0)
            .and_then(|inner| parameter_name(inner, source)),
        _ => None,
    }
}

/// Parameter names of a function definition, in declaration order.
pub fn parameters_of(function: Node<'_>, source: &str) -> Vec<String> {
    function
        .child_by_field_name("parameters")
        .map(|params| {
            named_children(params)
                .into_iter()
                .filter_map(|p| parameter_name(p, source))
                .collect()
        })
        .unwrap_or_default()
}

fn base_names(class: Node<'_>, source: &str) -> Vec<String> {
    let Some(superclasses) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    named_children(superclasses)
        .into_iter()
        .filter(|arg| {
            !matches!(
                arg.kind(),
                "keyword_argument" | "list_splat" | "dictionary_splat"
            )
        })
        .map(|arg| node_text(arg, source).to_string())
        .collect()
}

fn is_async(function: Node<'_>) -> bool {
    function.child(0).is_some_and(|c| c.kind() == "async")
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Entities found by pass 1 plus the node-to-id map pass 2 needs.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub entities: IndexMap<EntityId, Entity>,
    /// Start byte of each function/class definition node mapped to its entity.
    pub by_node: HashMap<usize, EntityId>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

#[derive(Clone)]
struct ClassScope {
    name: String,
    id: EntityId,
}

/// A node waiting on the pass-1 work stack, with the class scope it sits in.
struct Pending<'t> {
    node: Node<'t>,
    scope: Rc<[ClassScope]>,
    decorators: Vec<String>,
}

impl<'t> Pending<'t> {
    /// Queue the named children of `node` so they pop in document order.
    fn push_children(stack: &mut Vec<Pending<'t>>, node: Node<'t>, scope: &Rc<[ClassScope]>) {
        stack.extend(named_children(node).into_iter().rev().map(|child| Pending {
            node: child,
            scope: Rc::clone(scope),
            decorators: Vec::new(),
        }));
    }
}

struct EntityCollector<'a> {
    source: &'a str,
    file_path: &'a str,
    module: &'a str,
    table: SymbolTable,
}

impl<'a> EntityCollector<'a> {
    fn qualify(&self, scope: &[ClassScope], name: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(scope.len() + 2);
        if !self.module.is_empty() {
            parts.push(self.module);
        }
        parts.extend(scope.iter().map(|s| s.name.as_str()));
        parts.push(name);
        parts.join(".")
    }

    /// Claim `qualified` as an id; a redefinition gets `qualified@line`.
    fn allocate_id(&mut self, qualified: String, line: u32) -> EntityId {
        let id = EntityId::new(qualified.as_str());
        if !self.table.entities.contains_key(&id) {
            return id;
        }
        let mut candidate = EntityId::new(format!("{qualified}@{line}"));
        let mut n = 2;
        while self.table.entities.contains_key(&candidate) {
            candidate = EntityId::new(format!("{qualified}@{line}#{n}"));
            n += 1;
        }
        self.table.diagnostics.push(ParseDiagnostic {
            message: format!(
                "Duplicate definition of `{qualified}` at line {line}; recorded as `{candidate}`"
            ),
            line,
            severity: Severity::Warning,
        });
        candidate
    }

    fn location(&self, node: Node<'_>) -> Location {
        Location {
            file_path: self.file_path.to_string(),
            line_start: start_line(node),
            line_end: end_line(node),
            column_start: u32::try_from(node.start_position().column).unwrap_or(u32::MAX),
        }
    }

    fn push(&mut self, entity: Entity, node: Option<Node<'_>>) {
        if let Some(node) = node {
            self.table.by_node.insert(node.start_byte(), entity.id.clone());
        }
        self.table.entities.insert(entity.id.clone(), entity);
    }

    fn visit<'t>(&mut self, pending: Pending<'t>, stack: &mut Vec<Pending<'t>>) {
        let Pending {
            node,
            scope,
            decorators,
        } = pending;
        match classify(node) {
            SyntaxNode::Function(function) => self.add_function(function, &scope, decorators),
            SyntaxNode::Class(class) => self.add_class(class, &scope, decorators, stack),
            SyntaxNode::Decorated(decorated) => {
                let names = named_children(decorated)
                    .into_iter()
                    .filter(|c| c.kind() == "decorator")
                    .filter_map(|d| decorator_name(d, self.source))
                    .collect();
                if let Some(definition) = decorated.child_by_field_name("definition") {
                    stack.push(Pending {
                        node: definition,
                        scope,
                        decorators: names,
                    });
                }
            }
            SyntaxNode::Import(import) => self.add_imports(import, false),
            SyntaxNode::ImportFrom(import) => self.add_imports(import, true),
            SyntaxNode::Call(other) | SyntaxNode::Other(other) => {
                Pending::push_children(stack, other, &scope);
            }
        }
    }

    fn add_function(&mut self, function: Node<'_>, scope: &[ClassScope], decorators: Vec<String>) {
        let Some(name_node) = function.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let line = start_line(function);
        let id = self.allocate_id(self.qualify(scope, &name), line);
        let entity = Entity {
            id,
            location: self.location(function),
            docstring: docstring_of(function.child_by_field_name("body"), self.source),
            detail: EntityDetail::Function(FunctionDetail {
                owner: scope.last().map(|s| s.id.clone()),
                is_async: is_async(function),
                decorators,
                parameters: parameters_of(function, self.source),
                visibility: Visibility::of(&name),
            }),
            name,
        };
        self.push(entity, Some(function));
    }

    fn add_class<'t>(
        &mut self,
        class: Node<'t>,
        scope: &[ClassScope],
        decorators: Vec<String>,
        stack: &mut Vec<Pending<'t>>,
    ) {
        let Some(name_node) = class.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        let line = start_line(class);
        let id = self.allocate_id(self.qualify(scope, &name), line);
        let body = class.child_by_field_name("body");
        let entity = Entity {
            id: id.clone(),
            location: self.location(class),
            docstring: docstring_of(body, self.source),
            detail: EntityDetail::Class(ClassDetail {
                owner: scope.last().map(|s| s.id.clone()),
                bases: base_names(class, self.source),
                decorators,
                visibility: Visibility::of(&name),
            }),
            name: name.clone(),
        };
        self.push(entity, Some(class));

        if let Some(body) = body {
            let mut inner = scope.to_vec();
            inner.push(ClassScope { name, id });
            Pending::push_children(stack, body, &Rc::from(inner));
        }
    }

    fn add_imports(&mut self, statement: Node<'_>, is_from: bool) {
        let module = if statement.kind() == "future_import_statement" {
            "__future__".to_string()
        } else if is_from {
            statement
                .child_by_field_name("module_name")
                .map(|m| node_text(m, self.source).to_string())
                .unwrap_or_default()
        } else {
            String::new()
        };

        let mut cursor = statement.walk();
        let mut targets: Vec<Node<'_>> = statement
            .children_by_field_name("name", &mut cursor)
            .collect();
        if is_from && targets.is_empty() {
            targets.extend(
                named_children(statement)
                    .into_iter()
                    .filter(|c| c.kind() == "wildcard_import"),
            );
        }

        for target in targets {
            let (path, alias) = match target.kind() {
                "aliased_import" => (
                    target
                        .child_by_field_name("name")
                        .map(|n| node_text(n, self.source).to_string())
                        .unwrap_or_default(),
                    target
                        .child_by_field_name("alias")
                        .map(|n| node_text(n, self.source).to_string()),
                ),
                _ => (node_text(target, self.source).to_string(), None),
            };
            if path.is_empty() {
                continue;
            }
            let name = alias.clone().unwrap_or_else(|| path.clone());
            let detail = if is_from {
                ImportDetail {
                    module: module.clone(),
                    imported: Some(path),
                    alias,
                    is_from: true,
                }
            } else {
                ImportDetail {
                    module: path,
                    imported: None,
                    alias,
                    is_from: false,
                }
            };
            let line = start_line(statement);
            let id = self.allocate_id(self.qualify(&[], &name), line);
            let entity = Entity {
                id,
                name,
                location: self.location(statement),
                docstring: None,
                detail: EntityDetail::Import(detail),
            };
            self.push(entity, None);
        }
    }
}

/// Run pass 1 over a parsed module.
pub fn collect_entities(root: Node<'_>, source: &str, file_path: &str, module: &str) -> SymbolTable {
    let mut collector = EntityCollector {
        source,
        file_path,
        module,
        table: SymbolTable::default(),
    };
    let mut stack = Vec::new();
    Pending::push_children(&mut stack, root, &Rc::from(Vec::<ClassScope>::new()));
    while let Some(pending) = stack.pop() {
        collector.visit(pending, &mut stack);
    }
    collector.table
}

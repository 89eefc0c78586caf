//! Pass 2: textual call and base-class references.
//!
//! Runs after pass 1 so every reference can name the entity it came from.
//! Receivers are classified lexically (self, local, bare name, expression);
//! deciding what a reference points at is left to the resolver.

use std::collections::HashSet;

use tree_sitter::Node;

use crate::indexer::parser::{classify, named_children, node_text, start_line, SyntaxNode};
use crate::indexer::symbols::{parameters_of, SymbolTable};
use crate::models::{EntityId, RawReference, Receiver, ReferenceKind};

const SELF_NAMES: [&str; 2] = ["self", "cls"];

/// Push the named children of `node` so they pop in document order.
fn push_children<'t>(stack: &mut Vec<Node<'t>>, node: Node<'t>) {
    stack.extend(named_children(node).into_iter().rev());
}

fn collect_targets(target: Node<'_>, source: &str, out: &mut HashSet<String>) {
    let mut stack = vec![target];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "identifier" => {
                out.insert(node_text(node, source).to_string());
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "list_splat_pattern" | "as_pattern_target" | "parenthesized_expression" => {
                push_children(&mut stack, node);
            }
            _ => {}
        }
    }
}

/// Names bound inside a function body: assignment, loop, `with ... as`,
/// walrus and comprehension targets, plus nested def/class names.
fn assigned_names(body: Node<'_>, source: &str, out: &mut HashSet<String>) {
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        let field = match node.kind() {
            "assignment" | "augmented_assignment" | "for_statement" | "for_in_clause" => {
                Some("left")
            }
            "as_pattern" => Some("alias"),
            "named_expression" => Some("name"),
            "function_definition" | "class_definition" => Some("name"),
            _ => None,
        };
        if let Some(target) = field.and_then(|f| node.child_by_field_name(f)) {
            collect_targets(target, source, out);
        }
        push_children(&mut stack, node);
    }
}

struct FunctionScope {
    source_id: EntityId,
    self_names: HashSet<String>,
    locals: HashSet<String>,
}

impl FunctionScope {
    fn new(function: Node<'_>, source: &str, id: EntityId, is_method: bool) -> Self {
        let mut params = parameters_of(function, source);
        let mut self_names = HashSet::new();
        if is_method && params.first().is_some_and(|p| SELF_NAMES.contains(&p.as_str())) {
            self_names.insert(params.remove(0));
        }
        let mut locals: HashSet<String> = params.into_iter().collect();
        if let Some(body) = function.child_by_field_name("body") {
            assigned_names(body, source, &mut locals);
        }
        for name in &self_names {
            locals.remove(name);
        }
        Self {
            source_id: id,
            self_names,
            locals,
        }
    }

    fn classify_receiver(&self, object: Node<'_>, source: &str) -> Receiver {
        let text = node_text(object, source).to_string();
        if object.kind() != "identifier" {
            return Receiver::Expression(text);
        }
        if self.self_names.contains(&text) {
            Receiver::SelfRef(text)
        } else if self.locals.contains(&text) {
            Receiver::Local(text)
        } else {
            Receiver::Name(text)
        }
    }
}

struct ReferenceCollector<'a> {
    source: &'a str,
    table: &'a SymbolTable,
    references: Vec<RawReference>,
}

impl<'a> ReferenceCollector<'a> {
    fn walk(&mut self, root: Node<'_>) {
        let table = self.table;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match classify(node) {
                SyntaxNode::Function(function) => {
                    if let Some(id) = table.by_node.get(&function.start_byte()) {
                        self.visit_function(function, id.clone());
                        continue;
                    }
                }
                SyntaxNode::Class(class) => {
                    if let Some(id) = table.by_node.get(&class.start_byte()) {
                        self.visit_bases(class, id.clone());
                    }
                }
                SyntaxNode::Decorated(_)
                | SyntaxNode::Import(_)
                | SyntaxNode::ImportFrom(_)
                | SyntaxNode::Call(_)
                | SyntaxNode::Other(_) => {}
            }
            push_children(&mut stack, node);
        }
    }

    fn visit_bases(&mut self, class: Node<'_>, id: EntityId) {
        let line = start_line(class);
        let bases = self
            .table
            .entities
            .get(&id)
            .map(|e| e.bases().to_vec())
            .unwrap_or_default();
        for base in bases {
            self.references.push(RawReference {
                source: id.clone(),
                name: base,
                receiver: None,
                kind: ReferenceKind::Base,
                line,
            });
        }
    }

    fn visit_function(&mut self, function: Node<'_>, id: EntityId) {
        let is_method = self
            .table
            .entities
            .get(&id)
            .is_some_and(|e| e.is_method());
        let scope = FunctionScope::new(function, self.source, id, is_method);
        if let Some(body) = function.child_by_field_name("body") {
            self.collect_calls(body, &scope);
        }
    }

    fn collect_calls(&mut self, body: Node<'_>, scope: &FunctionScope) {
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if let SyntaxNode::Call(call) = classify(node) {
                if let Some(reference) = self.call_reference(call, scope) {
                    self.references.push(reference);
                }
            }
            push_children(&mut stack, node);
        }
    }

    fn call_reference(&self, call: Node<'_>, scope: &FunctionScope) -> Option<RawReference> {
        let function = call.child_by_field_name("function")?;
        let (name, receiver) = match function.kind() {
            "identifier" => (node_text(function, self.source).to_string(), None),
            "attribute" => {
                let attribute = function.child_by_field_name("attribute")?;
                let object = function.child_by_field_name("object")?;
                (
                    node_text(attribute, self.source).to_string(),
                    Some(scope.classify_receiver(object, self.source)),
                )
            }
            _ => return None,
        };
        Some(RawReference {
            source: scope.source_id.clone(),
            name,
            receiver,
            kind: ReferenceKind::Call,
            line: start_line(call),
        })
    }
}

/// Run pass 2 over a parsed module using the entities pass 1 found.
pub fn collect_references(root: Node<'_>, source: &str, table: &SymbolTable) -> Vec<RawReference> {
    let mut collector = ReferenceCollector {
        source,
        table,
        references: Vec::new(),
    };
    collector.walk(root);
    collector.references
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parser::parse_python;
    use crate::indexer::symbols::collect_entities;

    fn references(source: &str) -> Vec<RawReference> {
        let tree = parse_python(source).unwrap();
        let table = collect_entities(tree.root_node(), source, "m.py", "m");
        collect_references(tree.root_node(), source, &table)
    }

    #[test]
    fn test_bare_and_receiver_calls() {
        let source = "\
def run(client):
    total = compute()
    client.send(total)
    os.getcwd()
    build().finish()
";
        let refs = references(source);
        let summary: Vec<(&str, Option<&Receiver>)> =
            refs.iter().map(|r| (r.name.as_str(), r.receiver.as_ref())).collect();
        assert_eq!(
            summary,
            vec![
                ("compute", None),
                ("send", Some(&Receiver::Local("client".to_string()))),
                ("getcwd", Some(&Receiver::Name("os".to_string()))),
                ("finish", Some(&Receiver::Expression("build()".to_string()))),
                ("build", None),
            ]
        );
        assert!(refs.iter().all(|r| r.source == EntityId::from("m.run")));
        assert_eq!(refs[1].line, 3);
    }

    #[test]
    fn test_self_receiver_only_in_methods() {
        let source = "\
class Ledger:
    def post(self):
        self.validate()

def free(self):
    self.validate()
";
        let refs = references(source);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].receiver, Some(Receiver::SelfRef("self".to_string())));
        assert_eq!(refs[0].source, EntityId::from("m.Ledger.post"));
        assert_eq!(refs[1].receiver, Some(Receiver::Local("self".to_string())));
    }

    #[test]
    fn test_assigned_names_are_locals() {
        let source = "\
def run():
    repo = Repo()
    for item, other in pairs():
        item.save()
    with open('f') as handle:
        handle.read()
    repo.flush()
";
        let refs = references(source);
        let locals: Vec<&str> = refs
            .iter()
            .filter_map(|r| match &r.receiver {
                Some(Receiver::Local(name)) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(locals, vec!["item", "handle", "repo"]);
    }

    #[test]
    fn test_base_references_and_module_level_calls() {
        let source = "setup()\n\nclass Entry(Base, abc.ABC):\n    register()\n";
        let refs = references(source);
        let bases: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(bases, vec!["Base", "abc.ABC"]);
        assert!(refs.iter().all(|r| r.kind == ReferenceKind::Base));
        assert!(refs.iter().all(|r| r.line == 3));
    }

    #[test]
    fn test_nested_function_calls_belong_to_outer() {
        let source = "def outer():\n    def inner():\n        helper()\n    inner()\n";
        let refs = references(source);
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "inner"]);
        assert!(refs.iter().all(|r| r.source == EntityId::from("m.outer")));
    }
}

//! Python parsing wrapper used by the extraction passes.
//!
//! Parsing goes through the native tree-sitter Python grammar. Tree-sitter
//! always produces a tree, so a file is treated as unparseable when that tree
//! contains any ERROR or MISSING node; the first such node becomes the single
//! diagnostic reported for the file.

use tree_sitter::{Node, Parser, Tree};

use crate::models::{ParseDiagnostic, Severity};

/// Closed classification of the syntax nodes the extraction passes care about.
#[derive(Debug, Clone, Copy)]
pub enum SyntaxNode<'t> {
    Function(Node<'t>),
    Class(Node<'t>),
    Decorated(Node<'t>),
    Import(Node<'t>),
    ImportFrom(Node<'t>),
    Call(Node<'t>),
    Other(Node<'t>),
}

pub fn classify(node: Node<'_>) -> SyntaxNode<'_> {
    match node.kind() {
        "function_definition" => SyntaxNode::Function(node),
        "class_definition" => SyntaxNode::Class(node),
        "decorated_definition" => SyntaxNode::Decorated(node),
        "import_statement" => SyntaxNode::Import(node),
        "import_from_statement" | "future_import_statement" => SyntaxNode::ImportFrom(node),
        "call" => SyntaxNode::Call(node),
        _ => SyntaxNode::Other(node),
    }
}

/// Source text covered by `node`, or "" if the range is not a valid slice.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// 1-based first line of `node`.
pub fn start_line(node: Node<'_>) -> u32 {
    row_to_line(node.start_position().row)
}

/// 1-based last line of `node`.
pub fn end_line(node: Node<'_>) -> u32 {
    row_to_line(node.end_position().row)
}

fn row_to_line(row: usize) -> u32 {
    u32::try_from(row).unwrap_or(u32::MAX - 1) + 1
}

/// Named children of `node`, skipping comments.
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Parse Python source. Any syntax error yields the diagnostic to report.
pub fn parse_python(source: &str) -> Result<Tree, ParseDiagnostic> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| error_diagnostic(1, format!("Failed to load Python grammar: {e}")))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| error_diagnostic(1, "Parser produced no syntax tree".to_string()))?;

    let root = tree.root_node();
    if root.has_error() {
        let diagnostic = match first_error(root) {
            Some(node) => describe_error(node, source),
            None => error_diagnostic(1, "Syntax error at line 1: invalid syntax".to_string()),
        };
        return Err(diagnostic);
    }
    Ok(tree)
}

fn error_diagnostic(line: u32, message: String) -> ParseDiagnostic {
    ParseDiagnostic {
        message,
        line,
        severity: Severity::Error,
    }
}

/// First ERROR or MISSING node in document order.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn describe_error(node: Node<'_>, source: &str) -> ParseDiagnostic {
    let line = start_line(node);
    let message = if node.is_missing() {
        format!("Syntax error at line {line}: missing `{}`", node.kind())
    } else {
        let snippet: String = node_text(node, source)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .chars()
            .take(40)
            .collect();
        if snippet.is_empty() {
            format!("Syntax error at line {line}: invalid syntax")
        } else {
            format!("Syntax error at line {line}: unexpected `{snippet}`")
        }
    };
    error_diagnostic(line, message)
}

//! Structural extraction: source text in, `FileAnalysis` out.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::errors::{SemanticError, SemanticResult};
use crate::indexer::parser::parse_python;
use crate::indexer::references::collect_references;
use crate::indexer::symbols::{collect_entities, to_module_name};
use crate::models::FileAnalysis;

/// Extract entities and raw references from one Python file.
///
/// Malformed input never fails: it yields an analysis with no entities and a
/// single error diagnostic. The only error is an input above
/// `config.max_source_bytes`, which is rejected before parsing.
pub fn extract(source: &str, file_path: &str, config: &AnalysisConfig) -> SemanticResult<FileAnalysis> {
    if source.len() > config.max_source_bytes {
        warn!(
            file = file_path,
            size = source.len(),
            limit = config.max_source_bytes,
            "skipping oversized source"
        );
        return Err(SemanticError::TooLarge {
            path: file_path.to_string(),
            size: source.len(),
            limit: config.max_source_bytes,
        });
    }

    let module = to_module_name(file_path);
    let tree = match parse_python(source) {
        Ok(tree) => tree,
        Err(diagnostic) => {
            debug!(file = file_path, line = diagnostic.line, "syntax error, no entities extracted");
            return Ok(FileAnalysis {
                file_path: file_path.to_string(),
                module,
                entities: IndexMap::new(),
                references: Vec::new(),
                diagnostics: vec![diagnostic],
            });
        }
    };

    let root = tree.root_node();
    let table = collect_entities(root, source, file_path, &module);
    let references = collect_references(root, source, &table);
    debug!(
        file = file_path,
        entities = table.entities.len(),
        references = references.len(),
        diagnostics = table.diagnostics.len(),
        "extracted file"
    );

    Ok(FileAnalysis {
        file_path: file_path.to_string(),
        module,
        entities: table.entities,
        references,
        diagnostics: table.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, Severity};

    #[test]
    fn test_extract_scenario_file() {
        let source = "def load_data(path):\n    return open(path).read()\n\ndef process_data(rows):\n    \"\"\"Post rows to the ledger.\"\"\"\n    return load_data(rows)\n";
        let analysis = extract(source, "etl.py", &AnalysisConfig::default()).unwrap();
        assert_eq!(analysis.module, "etl");
        let ids: Vec<&str> = analysis.entities.keys().map(EntityId::as_str).collect();
        assert_eq!(ids, vec!["etl.load_data", "etl.process_data"]);
        assert!(analysis.diagnostics.is_empty());
        assert!(analysis
            .references
            .iter()
            .any(|r| r.name == "load_data" && r.source == EntityId::from("etl.process_data")));
    }

    #[test]
    fn test_syntax_error_yields_single_diagnostic() {
        let analysis = extract("def broken(:\n    pass\n", "bad.py", &AnalysisConfig::default()).unwrap();
        assert!(analysis.entities.is_empty());
        assert!(analysis.references.is_empty());
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].severity, Severity::Error);
        assert!(analysis.has_errors());
    }

    #[test]
    fn test_oversized_source_rejected() {
        let config = AnalysisConfig {
            max_source_bytes: 8,
            ..AnalysisConfig::default()
        };
        let err = extract("def long_name():\n    pass\n", "big.py", &config).unwrap_err();
        assert!(matches!(err, SemanticError::TooLarge { limit: 8, .. }));
    }

    #[test]
    fn test_empty_file() {
        let analysis = extract("", "empty.py", &AnalysisConfig::default()).unwrap();
        assert!(analysis.entities.is_empty());
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn test_deeply_nested_expression_does_not_exhaust_stack() {
        let depth = 20_000;
        let source = format!(
            "def f():\n    x = {}1{}\n    g()\n",
            "[".repeat(depth),
            "]".repeat(depth)
        );
        let analysis = extract(&source, "deep.py", &AnalysisConfig::default()).unwrap();
        let ids: Vec<&str> = analysis.entities.keys().map(EntityId::as_str).collect();
        assert_eq!(ids, vec!["deep.f"]);
        assert!(analysis.diagnostics.is_empty());
        let calls: Vec<&str> = analysis.references.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(calls, vec!["g"]);
    }
}

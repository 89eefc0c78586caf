//! Analysis configuration threaded explicitly through every pipeline stage.
//!
//! Defaults cover the accounting vocabulary and workflow catalog; a full
//! config can be loaded from JSON, and a handful of numeric knobs can be
//! overridden from the environment.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{SemanticError, SemanticResult};
use crate::semantic::tagger::{default_rules, TagRule};
use crate::semantic::workflows::{default_templates, WorkflowTemplate};

pub const DEFAULT_MAX_FILE_SIZE_MB: usize = 10;
pub const DEFAULT_WORKFLOW_MAX_DEPTH: usize = 3;
pub const DEFAULT_REASONABLE_ENTITY_LINES: u32 = 30;
pub const DEFAULT_WORKERS: usize = 4;

const ENV_MAX_FILE_SIZE_MB: &str = "DOMAINLENS_MAX_FILE_SIZE_MB";
const ENV_REASONABLE_LINES: &str = "DOMAINLENS_REASONABLE_LINES";
const ENV_WORKFLOW_DEPTH: &str = "DOMAINLENS_WORKFLOW_DEPTH";
const ENV_WORKERS: &str = "DOMAINLENS_WORKERS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Entity size (in lines) at which the size signal peaks.
    pub reasonable_entity_lines: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reasonable_entity_lines: DEFAULT_REASONABLE_ENTITY_LINES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub max_source_bytes: usize,
    pub workflow_max_depth: usize,
    pub workers: usize,
    pub scoring: ScoringConfig,
    /// Path fragments marking a file as part of the accounting domain.
    pub domain_path_patterns: Vec<String>,
    pub tag_rules: Vec<TagRule>,
    pub workflow_templates: Vec<WorkflowTemplate>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            workflow_max_depth: DEFAULT_WORKFLOW_MAX_DEPTH,
            workers: DEFAULT_WORKERS,
            scoring: ScoringConfig::default(),
            domain_path_patterns: ["accounts", "accounting", "finance", "ledger", "journal"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tag_rules: default_rules(),
            workflow_templates: default_templates(),
        }
    }
}

fn env_positive(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(variable = name, value = %raw, "ignoring invalid environment override");
            None
        }
    }
}

impl AnalysisConfig {
    /// Defaults overlaid with `DOMAINLENS_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(mb) = env_positive(ENV_MAX_FILE_SIZE_MB) {
            config.max_source_bytes = mb * 1024 * 1024;
        }
        if let Some(lines) = env_positive(ENV_REASONABLE_LINES) {
            config.scoring.reasonable_entity_lines = u32::try_from(lines).unwrap_or(u32::MAX);
        }
        if let Some(depth) = env_positive(ENV_WORKFLOW_DEPTH) {
            config.workflow_max_depth = depth;
        }
        if let Some(workers) = env_positive(ENV_WORKERS) {
            config.workers = workers;
        }
        config
    }

    pub fn from_json_str(raw: &str) -> SemanticResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SemanticResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> SemanticResult<()> {
        if self.workflow_max_depth == 0 {
            return Err(SemanticError::Config(
                "workflow_max_depth must be at least 1".to_string(),
            ));
        }
        if self.scoring.reasonable_entity_lines == 0 {
            return Err(SemanticError::Config(
                "reasonable_entity_lines must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for rule in &self.tag_rules {
            if rule.id.trim().is_empty() {
                return Err(SemanticError::Config("tag rule with empty id".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(SemanticError::Config(format!(
                    "duplicate tag rule id: {}",
                    rule.id
                )));
            }
            if rule.triggers.is_empty() && rule.predicate.is_none() {
                return Err(SemanticError::Config(format!(
                    "tag rule {} has neither triggers nor predicate",
                    rule.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for template in &self.workflow_templates {
            if !seen.insert(template.id.as_str()) {
                return Err(SemanticError::Config(format!(
                    "duplicate workflow template id: {}",
                    template.id
                )));
            }
            if template.stages.len() < 2 {
                return Err(SemanticError::Config(format!(
                    "workflow template {} needs at least two stages",
                    template.id
                )));
            }
        }
        Ok(())
    }

    pub fn is_domain_path(&self, file_path: &str) -> bool {
        let lowered = file_path.to_lowercase();
        self.domain_path_patterns
            .iter()
            .any(|p| lowered.contains(&p.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_source_bytes, 10 * 1024 * 1024);
        assert_eq!(config.workflow_max_depth, 3);
        assert!(!config.tag_rules.is_empty());
        assert!(!config.workflow_templates.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AnalysisConfig::from_json_str(r#"{"workflow_max_depth": 5}"#).unwrap();
        assert_eq!(config.workflow_max_depth, 5);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.tag_rules, default_rules());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = AnalysisConfig::from_json_str(r#"{"workflow_max_depth": 0}"#).unwrap_err();
        assert!(matches!(err, SemanticError::Config(_)));
    }

    #[test]
    fn test_single_stage_template_rejected() {
        let raw = r#"{"workflow_templates": [
            {"id": "solo", "name": "Solo", "business_process": "x", "stages": ["ledger"]}
        ]}"#;
        let err = AnalysisConfig::from_json_str(raw).unwrap_err();
        assert!(err.to_string().contains("solo"));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let raw = r#"{"tag_rules": [
            {"id": "r", "label": "ledger", "triggers": ["ledger"]},
            {"id": "r", "label": "tax", "triggers": ["vat"]}
        ]}"#;
        let err = AnalysisConfig::from_json_str(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate tag rule id"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_source_bytes": 64, "domain_path_patterns": ["books"]}}"#).unwrap();
        let config = AnalysisConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_source_bytes, 64);
        assert!(config.is_domain_path("src/Books/close.py"));
        assert!(!config.is_domain_path("src/ledger/close.py"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnalysisConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SemanticError::Io(_)));
    }
}

//! Analysis pipeline orchestration with Rayon-based parallelism.
//!
//! Each file runs extract -> resolve -> tag -> score -> detect on its own;
//! files only meet again in the index builder.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::errors::{SemanticError, SemanticResult};
use crate::indexer::callgraph::resolve;
use crate::indexer::extract::extract;
use crate::semantic::index::{FileArtifacts, IndexBuilder, SemanticIndex};
use crate::semantic::scorer::score_file;
use crate::semantic::tagger::DomainTagger;
use crate::semantic::workflows::detect_workflows;

/// A file left out of the index, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_path: String,
    pub reason: String,
}

/// Project build result: the (possibly degraded) index plus skipped files.
#[derive(Debug, Clone)]
pub struct ProjectReport {
    pub index: SemanticIndex,
    pub skipped: Vec<SkippedFile>,
    pub elapsed_ms: u128,
}

fn analyze_with(
    source: &str,
    file_path: &str,
    config: &AnalysisConfig,
    tagger: &DomainTagger,
) -> SemanticResult<FileArtifacts> {
    let analysis = extract(source, file_path, config)?;
    let graph = resolve(&analysis);
    let tags = tagger.tag_file(&analysis);
    let scores = score_file(&analysis, &tags, &config.scoring);
    let workflows = detect_workflows(
        &graph,
        &analysis,
        &tags,
        &config.workflow_templates,
        config.workflow_max_depth,
    );
    Ok(FileArtifacts {
        analysis,
        graph,
        tags,
        workflows,
        scores,
    })
}

/// Run the full per-file pipeline on one source text.
pub fn analyze_file(source: &str, file_path: &str, config: &AnalysisConfig) -> SemanticResult<FileArtifacts> {
    let tagger = DomainTagger::new(&config.tag_rules);
    analyze_with(source, file_path, config, &tagger)
}

/// Analyze every file of a project and build one index.
///
/// Files that exceed the size limit are listed in `skipped`; files with
/// syntax errors stay in the index with their diagnostics.
pub fn analyze_project(
    sources: &BTreeMap<String, String>,
    config: &AnalysisConfig,
) -> SemanticResult<ProjectReport> {
    let started = Instant::now();
    config.validate()?;
    let tagger = DomainTagger::new(&config.tag_rules);

    let jobs: Vec<(&String, &String)> = sources.iter().collect();
    let run = |(path, source): &(&String, &String)| {
        (path.to_string(), analyze_with(source, path, config, &tagger))
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build();
    let results: Vec<(String, SemanticResult<FileArtifacts>)> = match pool {
        Ok(pool) => pool.install(|| jobs.par_iter().map(run).collect()),
        Err(err) => {
            warn!(error = %err, "thread pool unavailable, analyzing sequentially");
            jobs.iter().map(run).collect()
        }
    };

    let mut artifacts = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for (file_path, result) in results {
        match result {
            Ok(file) => artifacts.push(file),
            Err(err @ SemanticError::TooLarge { .. }) => {
                warn!(file = %file_path, error = %err, "skipping file");
                skipped.push(SkippedFile {
                    file_path,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    let index = IndexBuilder::new(config).build_project(&artifacts)?;
    let elapsed_ms = started.elapsed().as_millis();
    info!(
        files = sources.len(),
        indexed = artifacts.len(),
        skipped = skipped.len(),
        elapsed_ms = elapsed_ms as u64,
        "project analysis finished"
    );
    Ok(ProjectReport {
        index,
        skipped,
        elapsed_ms,
    })
}

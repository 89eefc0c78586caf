//! Context scoring: how much modernization-relevant context an entity carries.
//!
//! `value = 0.3·docstring + 0.3·size + 0.2·domain + 0.2·clean`, clamped to
//! [0, 1]. The size signal peaks at the configured reasonable entity size.

use indexmap::IndexMap;

use crate::config::ScoringConfig;
use crate::models::{ContextScore, DomainTag, Entity, EntityId, FileAnalysis, ScoreBucket, ScoreSignals};

pub const DOCSTRING_WEIGHT: f64 = 0.3;
pub const SIZE_WEIGHT: f64 = 0.3;
pub const DOMAIN_WEIGHT: f64 = 0.2;
pub const CLEAN_WEIGHT: f64 = 0.2;

/// Size signal in [0, 1]: `lines / R` below the reasonable size `R`, `R / lines` above.
pub fn size_signal(lines: u32, reasonable: u32) -> f64 {
    let lines = f64::from(lines.max(1));
    let reasonable = f64::from(reasonable.max(1));
    if lines < reasonable {
        lines / reasonable
    } else {
        reasonable / lines
    }
}

fn reason(present: bool, weight: f64, signal: f64, yes: &str, no: &str) -> String {
    if present {
        format!("{yes} (+{:.2})", weight * signal)
    } else {
        format!("{no} (+0.00 of {weight:.2})")
    }
}

/// Score one entity given its tags and the diagnostics of its file.
pub fn score(entity: &Entity, analysis: &FileAnalysis, tags: &[DomainTag], config: &ScoringConfig) -> ContextScore {
    let lines = entity.location.line_count();
    let has_doc = entity.has_docstring();
    let diagnostics = analysis.diagnostics_in(&entity.location).count();

    let signals = ScoreSignals {
        docstring: if has_doc { 1.0 } else { 0.0 },
        size: size_signal(lines, config.reasonable_entity_lines),
        domain: if tags.is_empty() { 0.0 } else { 1.0 },
        clean: if diagnostics == 0 { 1.0 } else { 0.0 },
    };
    let value = (DOCSTRING_WEIGHT * signals.docstring
        + SIZE_WEIGHT * signals.size
        + DOMAIN_WEIGHT * signals.domain
        + CLEAN_WEIGHT * signals.clean)
        .clamp(0.0, 1.0);

    let size_note = if lines > config.reasonable_entity_lines {
        format!(
            "oversized at {lines} lines (reasonable {}) (+{:.2})",
            config.reasonable_entity_lines,
            SIZE_WEIGHT * signals.size
        )
    } else {
        format!("{lines} line(s) (+{:.2})", SIZE_WEIGHT * signals.size)
    };
    let tag_note = if tags.is_empty() {
        String::new()
    } else {
        tags.iter()
            .map(|t| t.label.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let reasons = vec![
        reason(has_doc, DOCSTRING_WEIGHT, 1.0, "docstring present", "no docstring"),
        size_note,
        reason(
            !tags.is_empty(),
            DOMAIN_WEIGHT,
            1.0,
            &format!("domain tags: {tag_note}"),
            "no domain tags",
        ),
        reason(
            diagnostics == 0,
            CLEAN_WEIGHT,
            1.0,
            "no diagnostics in range",
            &format!("{diagnostics} diagnostic(s) in range"),
        ),
    ];

    ContextScore {
        value,
        bucket: ScoreBucket::for_value(value),
        signals,
        reasons,
    }
}

/// Score every entity of a file.
pub fn score_file(
    analysis: &FileAnalysis,
    tags: &IndexMap<EntityId, Vec<DomainTag>>,
    config: &ScoringConfig,
) -> IndexMap<EntityId, ContextScore> {
    analysis
        .entities
        .values()
        .map(|entity| {
            let entity_tags = tags.get(&entity.id).map(Vec::as_slice).unwrap_or(&[]);
            (entity.id.clone(), score(entity, analysis, entity_tags, config))
        })
        .collect()
}

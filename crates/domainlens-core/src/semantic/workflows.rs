//! Workflow detection over the resolved call graph.
//!
//! A template is an ordered list of domain stages. From every entity tagged
//! with the first stage, a depth-bounded DFS follows `calls` edges in
//! insertion order and accepts the first path whose entities satisfy the
//! remaining stages in order. Paths never revisit an entity.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indexer::callgraph::CallGraph;
use crate::models::{
    DomainLabel, DomainTag, EntityId, FileAnalysis, StepRole, WorkflowInstance, WorkflowStep,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub business_process: String,
    /// Required stages, in order. At least two.
    pub stages: Vec<DomainLabel>,
    /// Optional labels that raise confidence when seen anywhere on the path.
    #[serde(default)]
    pub hints: Vec<DomainLabel>,
}

impl WorkflowTemplate {
    fn new(id: &str, name: &str, business_process: &str, stages: &[DomainLabel]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            business_process: business_process.to_string(),
            stages: stages.to_vec(),
            hints: Vec::new(),
        }
    }
}

/// Accounting workflows shipped as the default catalog.
pub fn default_templates() -> Vec<WorkflowTemplate> {
    use DomainLabel::*;
    vec![
        WorkflowTemplate::new(
            "journal_to_ledger",
            "Journal Entry to Ledger Posting",
            "ledger_posting",
            &[JournalEntry, Ledger],
        ),
        WorkflowTemplate::new(
            "invoice_to_payment",
            "Invoice to Payment",
            "payment_processing",
            &[Invoice, Payment],
        ),
        WorkflowTemplate::new(
            "ledger_to_reports",
            "Ledger to Financial Reports",
            "financial_reporting",
            &[Ledger, Reports],
        ),
        WorkflowTemplate::new(
            "tax_calculation",
            "Tax Calculation",
            "tax_processing",
            &[Invoice, Tax],
        ),
        WorkflowTemplate::new(
            "reconciled_payment",
            "Payment Reconciliation",
            "bank_reconciliation",
            &[Payment, Reconciliation, Ledger],
        ),
    ]
}

fn has_label(tags: &IndexMap<EntityId, Vec<DomainTag>>, id: &EntityId, label: DomainLabel) -> bool {
    tags.get(id).is_some_and(|t| t.iter().any(|tag| tag.label == label))
}

struct PathSearch<'a> {
    graph: &'a CallGraph,
    tags: &'a IndexMap<EntityId, Vec<DomainTag>>,
    stages: &'a [DomainLabel],
    max_depth: usize,
    path: Vec<(&'a EntityId, Option<DomainLabel>)>,
    /// Entities on the current path only; cleared on backtrack.
    on_path: HashSet<&'a EntityId>,
}

impl<'a> PathSearch<'a> {
    /// `cursor` is the number of stages already satisfied by `path`.
    fn extend(&mut self, node: &'a EntityId, cursor: usize) -> bool {
        if cursor == self.stages.len() {
            return true;
        }
        if self.path.len() > self.max_depth {
            return false;
        }
        let graph = self.graph;
        for next in graph.callees(node) {
            if self.on_path.contains(next) {
                continue;
            }
            let stage = self.stages[cursor];
            let satisfied = has_label(self.tags, next, stage);
            self.path.push((next, satisfied.then_some(stage)));
            self.on_path.insert(next);
            if self.extend(next, cursor + usize::from(satisfied)) {
                return true;
            }
            self.on_path.remove(next);
            self.path.pop();
        }
        false
    }
}

fn role_at(index: usize, len: usize) -> StepRole {
    if index == 0 {
        StepRole::Initiator
    } else if index + 1 == len {
        StepRole::Finalizer
    } else {
        StepRole::Processor
    }
}

fn labels_list(labels: &[DomainLabel]) -> String {
    let names: Vec<&str> = labels.iter().map(DomainLabel::as_str).collect();
    format!("[{}]", names.join(", "))
}

fn reasoning_for(
    template: &WorkflowTemplate,
    path: &[(&EntityId, Option<DomainLabel>)],
    matched_hints: &[DomainLabel],
    hint_factor: f64,
) -> Vec<String> {
    let chain: Vec<&str> = path.iter().map(|(id, _)| id.as_str()).collect();
    let mut lines = vec![
        format!("Found call path: {}", chain.join(" -> ")),
        format!("Matches {} pattern", template.name),
    ];
    lines.extend(
        path.iter()
            .filter_map(|(id, stage)| stage.map(|label| format!("{id} satisfies stage {label}"))),
    );
    lines.push(format!("Business process: {}", template.business_process));
    lines.push(if template.hints.is_empty() {
        format!("Hint factor {hint_factor:.2} (template has no hints)")
    } else {
        format!(
            "Hint factor {hint_factor:.2} (matched {} of {})",
            labels_list(matched_hints),
            labels_list(&template.hints)
        )
    });
    lines
}

fn instance_for(
    template: &WorkflowTemplate,
    analysis: &FileAnalysis,
    tags: &IndexMap<EntityId, Vec<DomainTag>>,
    path: &[(&EntityId, Option<DomainLabel>)],
) -> WorkflowInstance {
    let matched_hints: Vec<DomainLabel> = template
        .hints
        .iter()
        .copied()
        .filter(|hint| path.iter().any(|(id, _)| has_label(tags, id, *hint)))
        .collect();
    let hint_factor = if template.hints.is_empty() {
        1.0
    } else {
        matched_hints.len() as f64 / template.hints.len() as f64
    };
    let edges = path.len().saturating_sub(1).max(1);
    let confidence = (hint_factor / edges as f64).clamp(0.0, 1.0);
    let reasoning = reasoning_for(template, path, &matched_hints, hint_factor);

    WorkflowInstance {
        template_id: template.id.clone(),
        template_name: template.name.clone(),
        business_process: template.business_process.clone(),
        file_path: analysis.file_path.clone(),
        steps: path
            .iter()
            .enumerate()
            .map(|(i, (id, stage))| WorkflowStep {
                entity: (*id).clone(),
                role: role_at(i, path.len()),
                stage: *stage,
            })
            .collect(),
        matched_hints,
        confidence,
        reasoning,
    }
}

/// Detect every workflow instance in one file.
///
/// Templates are tried in order and anchors in document order; an entity can
/// anchor one instance per template.
pub fn detect_workflows(
    graph: &CallGraph,
    analysis: &FileAnalysis,
    tags: &IndexMap<EntityId, Vec<DomainTag>>,
    templates: &[WorkflowTemplate],
    max_depth: usize,
) -> Vec<WorkflowInstance> {
    let mut instances = Vec::new();
    for template in templates {
        let Some(&first) = template.stages.first() else {
            continue;
        };
        if template.stages.len() < 2 {
            continue;
        }
        for anchor in analysis.entities.keys() {
            if !has_label(tags, anchor, first) {
                continue;
            }
            let mut search = PathSearch {
                graph,
                tags,
                stages: &template.stages,
                max_depth,
                path: vec![(anchor, Some(first))],
                on_path: HashSet::from([anchor]),
            };
            if search.extend(anchor, 1) {
                instances.push(instance_for(template, analysis, tags, &search.path));
            }
        }
    }
    debug!(
        file = %analysis.file_path,
        workflows = instances.len(),
        "detected workflows"
    );
    instances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::indexer::callgraph::resolve;
    use crate::indexer::extract::extract;
    use crate::semantic::tagger::{default_rules, DomainTagger};

    fn detect_with(source: &str, templates: &[WorkflowTemplate], depth: usize) -> Vec<WorkflowInstance> {
        let analysis = extract(source, "wf.py", &AnalysisConfig::default()).unwrap();
        let graph = resolve(&analysis);
        let tags = DomainTagger::new(&default_rules()).tag_file(&analysis);
        detect_workflows(&graph, &analysis, &tags, templates, depth)
    }

    fn detect(source: &str) -> Vec<WorkflowInstance> {
        detect_with(source, &default_templates(), 3)
    }

    fn ids(instance: &WorkflowInstance) -> Vec<&str> {
        instance.entity_ids().map(EntityId::as_str).collect()
    }

    #[test]
    fn test_direct_journal_to_ledger() {
        let source = "def record_journal():\n    post_to_ledger()\n\ndef post_to_ledger():\n    pass\n";
        let found = detect(source);
        assert_eq!(found.len(), 1);
        let instance = &found[0];
        assert_eq!(instance.template_id, "journal_to_ledger");
        assert_eq!(ids(instance), vec!["wf.record_journal", "wf.post_to_ledger"]);
        assert!((instance.confidence - 1.0).abs() < 1e-9);
        assert_eq!(instance.steps[0].role, StepRole::Initiator);
        assert_eq!(instance.steps[1].role, StepRole::Finalizer);
        assert_eq!(instance.steps[1].stage, Some(DomainLabel::Ledger));
        assert_eq!(instance.file_path, "wf.py");
    }

    #[test]
    fn test_intermediate_steps_lower_confidence() {
        let source = "\
def record_journal():
    validate()

def validate():
    post_to_ledger()

def post_to_ledger():
    pass
";
        let found = detect(source);
        assert_eq!(found.len(), 1);
        assert_eq!(
            ids(&found[0]),
            vec!["wf.record_journal", "wf.validate", "wf.post_to_ledger"]
        );
        assert_eq!(found[0].steps[1].role, StepRole::Processor);
        assert_eq!(found[0].steps[1].stage, None);
        assert!((found[0].confidence - 0.5).abs() < 1e-9);
        assert_eq!(
            found[0].reasoning,
            vec![
                "Found call path: wf.record_journal -> wf.validate -> wf.post_to_ledger",
                "Matches Journal Entry to Ledger Posting pattern",
                "wf.record_journal satisfies stage journal_entry",
                "wf.post_to_ledger satisfies stage ledger",
                "Business process: ledger_posting",
                "Hint factor 1.00 (template has no hints)",
            ]
        );
    }

    #[test]
    fn test_depth_bound() {
        let source = "\
def record_journal():
    a()

def a():
    b()

def b():
    c()

def c():
    post_to_ledger()

def post_to_ledger():
    pass
";
        assert!(detect(source).is_empty());
        let found = detect_with(source, &default_templates(), 4);
        assert_eq!(found.len(), 1);
        assert!((found[0].confidence - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_cycles_terminate_without_repeats() {
        let source = "\
def record_journal():
    a()

def a():
    record_journal()
    a()
    b()

def b():
    a()
    post_to_ledger()

def post_to_ledger():
    record_journal()
";
        let found = detect(source);
        assert_eq!(found.len(), 1);
        let path = ids(&found[0]);
        let unique: HashSet<&&str> = path.iter().collect();
        assert_eq!(unique.len(), path.len());
        assert_eq!(path, vec!["wf.record_journal", "wf.a", "wf.b", "wf.post_to_ledger"]);
    }

    #[test]
    fn test_first_path_in_insertion_order() {
        let source = "\
def record_journal():
    update_ledger()
    post_to_ledger()

def update_ledger():
    pass

def post_to_ledger():
    pass
";
        let found = detect(source);
        assert_eq!(found.len(), 1);
        assert_eq!(ids(&found[0]), vec!["wf.record_journal", "wf.update_ledger"]);
    }

    #[test]
    fn test_one_anchor_many_templates() {
        let source = "\
def create_invoice():
    take_payment()
    apply_vat()

def take_payment():
    pass

def apply_vat():
    pass
";
        let found = detect(source);
        let templates: Vec<&str> = found.iter().map(|w| w.template_id.as_str()).collect();
        assert_eq!(templates, vec!["invoice_to_payment", "tax_calculation"]);
    }

    #[test]
    fn test_three_stage_template_and_hints() {
        let source = "\
def take_payment():
    reconcile_bank()

def reconcile_bank():
    \"\"\"Reconcile and apply VAT.\"\"\"
    post_to_ledger()

def post_to_ledger():
    pass
";
        let found = detect(source);
        let reconciled: Vec<&WorkflowInstance> = found
            .iter()
            .filter(|w| w.template_id == "reconciled_payment")
            .collect();
        assert_eq!(reconciled.len(), 1);
        assert_eq!(
            ids(reconciled[0]),
            vec!["wf.take_payment", "wf.reconcile_bank", "wf.post_to_ledger"]
        );
        assert_eq!(reconciled[0].steps[1].stage, Some(DomainLabel::Reconciliation));

        let hinted = WorkflowTemplate {
            hints: vec![DomainLabel::Tax, DomainLabel::Invoice],
            ..WorkflowTemplate::new("hinted", "Hinted", "x", &[DomainLabel::Payment, DomainLabel::Ledger])
        };
        let found = detect_with(source, &[hinted], 3);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_hints, vec![DomainLabel::Tax]);
        assert!((found[0].confidence - 0.25).abs() < 1e-9);
        assert_eq!(
            found[0].reasoning.last().map(String::as_str),
            Some("Hint factor 0.50 (matched [tax] of [tax, invoice])")
        );
    }

    #[test]
    fn test_untagged_graph_has_no_workflows() {
        let source = "def load_data():\n    pass\n\ndef process_data():\n    \"\"\"Post rows to the ledger.\"\"\"\n    load_data()\n";
        assert!(detect(source).is_empty());
    }
}

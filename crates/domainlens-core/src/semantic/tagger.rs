//! Rule-based domain tagging of entities.
//!
//! Rules are ordered data: trigger terms matched as whole words against an
//! entity's name and docstring, and an optional structural predicate. Each
//! label appears at most once per entity, justified by the first rule (in
//! rule order) that fired for it.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::{DomainLabel, DomainTag, Entity, EntityId, EntityKind, FileAnalysis, TagField};
use crate::query::tokenizer::{find_phrase, phrase, words, Word};

// ---------------------------------------------------------------------------
// Rule model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuralPredicate {
    NameEndsWith {
        suffix: String,
        #[serde(default)]
        kind: Option<EntityKind>,
    },
    NameStartsWith {
        prefix: String,
        #[serde(default)]
        kind: Option<EntityKind>,
    },
    HasDecorator {
        name: String,
    },
    /// Direct or transitive (through same-file classes) base class name.
    InheritsFrom {
        base: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRule {
    pub id: String,
    pub label: DomainLabel,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub predicate: Option<StructuralPredicate>,
}

impl TagRule {
    fn terms(id: &str, label: DomainLabel, triggers: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            label,
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            predicate: None,
        }
    }

    fn structural(id: &str, label: DomainLabel, predicate: StructuralPredicate) -> Self {
        Self {
            id: id.to_string(),
            label,
            triggers: Vec::new(),
            predicate: Some(predicate),
        }
    }
}

/// Accounting vocabulary shipped as the default rule table.
pub fn default_rules() -> Vec<TagRule> {
    use DomainLabel::*;
    vec![
        TagRule::terms(
            "ledger-terms",
            Ledger,
            &[
                "ledger", "posting", "entry", "debit", "credit", "balance",
                "general_ledger", "gl_entry", "ledger_entry",
            ],
        ),
        TagRule::terms(
            "journal-terms",
            JournalEntry,
            &[
                "journal", "jv", "journal_entry", "journal_voucher", "accounting_entry", "entry",
            ],
        ),
        TagRule::terms(
            "trial-balance-terms",
            TrialBalance,
            &["trial_balance", "trial", "balance_sheet", "balances"],
        ),
        TagRule::terms(
            "pnl-terms",
            ProfitAndLoss,
            &["profit_loss", "pnl", "income_statement", "profit", "loss"],
        ),
        TagRule::terms(
            "reconciliation-terms",
            Reconciliation,
            &["reconcile", "reconciliation", "matching", "clearance"],
        ),
        TagRule::terms("tax-terms", Tax, &["tax", "gst", "vat", "taxation", "tax_entry"]),
        TagRule::terms(
            "invoice-terms",
            Invoice,
            &["invoice", "billing", "bill", "sales_invoice", "purchase_invoice"],
        ),
        TagRule::terms(
            "payment-terms",
            Payment,
            &["payment", "pay", "settlement", "payment_entry"],
        ),
        TagRule::terms(
            "deferred-revenue-terms",
            DeferredRevenue,
            &["deferred", "revenue", "accrual", "deferred_revenue"],
        ),
        TagRule::terms(
            "report-terms",
            Reports,
            &["report", "reporting", "financial_report", "statement"],
        ),
        TagRule::structural(
            "entry-class",
            JournalEntry,
            StructuralPredicate::NameEndsWith {
                suffix: "Entry".to_string(),
                kind: Some(EntityKind::Class),
            },
        ),
        TagRule::structural(
            "invoice-class",
            Invoice,
            StructuralPredicate::NameEndsWith {
                suffix: "Invoice".to_string(),
                kind: Some(EntityKind::Class),
            },
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tagger
// ---------------------------------------------------------------------------

struct CompiledRule {
    rule: TagRule,
    phrases: Vec<(String, Vec<String>)>,
}

/// A compiled, ordered rule set.
pub struct DomainTagger {
    rules: Vec<CompiledRule>,
}

struct Evidence {
    field: TagField,
    matched_text: String,
    span: (usize, usize),
}

fn kind_matches(wanted: &Option<EntityKind>, entity: &Entity) -> bool {
    wanted.map_or(true, |k| k == entity.kind())
}

fn dotted_tail_matches(candidate: &str, wanted: &str) -> bool {
    candidate == wanted || candidate.rsplit('.').next() == Some(wanted)
}

/// Does `entity` inherit from `base`, directly or through same-file classes?
fn inherits_from(entity: &Entity, base: &str, analysis: &FileAnalysis) -> Option<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = entity.bases().iter().map(String::as_str).collect();
    while let Some(name) = pending.pop() {
        if !seen.insert(name) {
            continue;
        }
        if dotted_tail_matches(name, base) {
            return Some(name.to_string());
        }
        let parent = analysis
            .classes()
            .find(|c| c.name == name && c.owner().is_none());
        if let Some(parent) = parent {
            pending.extend(parent.bases().iter().map(String::as_str));
        }
    }
    None
}

impl DomainTagger {
    pub fn new(rules: &[TagRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                phrases: rule
                    .triggers
                    .iter()
                    .map(|t| (t.clone(), phrase(t)))
                    .filter(|(_, p)| !p.is_empty())
                    .collect(),
                rule: rule.clone(),
            })
            .collect();
        Self { rules }
    }

    fn match_terms(&self, compiled: &CompiledRule, field: TagField, text: &str, found: &[Word]) -> Option<Evidence> {
        compiled.phrases.iter().find_map(|(_, p)| {
            find_phrase(found, p).map(|(start, end)| Evidence {
                field,
                matched_text: text[start..end].to_string(),
                span: (start, end),
            })
        })
    }

    fn match_predicate(
        &self,
        predicate: &StructuralPredicate,
        entity: &Entity,
        analysis: &FileAnalysis,
    ) -> Option<Evidence> {
        let name = entity.name.as_str();
        match predicate {
            StructuralPredicate::NameEndsWith { suffix, kind } => {
                if kind_matches(kind, entity) && !suffix.is_empty() && name.ends_with(suffix.as_str()) {
                    let start = name.len() - suffix.len();
                    return Some(Evidence {
                        field: TagField::Structure,
                        matched_text: suffix.clone(),
                        span: (start, name.len()),
                    });
                }
                None
            }
            StructuralPredicate::NameStartsWith { prefix, kind } => {
                if kind_matches(kind, entity) && !prefix.is_empty() && name.starts_with(prefix.as_str()) {
                    return Some(Evidence {
                        field: TagField::Structure,
                        matched_text: prefix.clone(),
                        span: (0, prefix.len()),
                    });
                }
                None
            }
            StructuralPredicate::HasDecorator { name: wanted } => entity
                .decorators()
                .iter()
                .find(|d| dotted_tail_matches(d, wanted))
                .map(|d| Evidence {
                    field: TagField::Structure,
                    matched_text: d.clone(),
                    span: (0, d.len()),
                }),
            StructuralPredicate::InheritsFrom { base } => {
                inherits_from(entity, base, analysis).map(|found| Evidence {
                    field: TagField::Structure,
                    span: (0, found.len()),
                    matched_text: found,
                })
            }
        }
    }

    /// Domain tags for one entity, one per label, in first-firing rule order.
    pub fn tag(&self, entity: &Entity, analysis: &FileAnalysis) -> Vec<DomainTag> {
        let name_words = words(&entity.name);
        let doc = entity.docstring.as_deref().unwrap_or("");
        let doc_words = words(doc);

        let mut tags: Vec<DomainTag> = Vec::new();
        for compiled in &self.rules {
            let label = compiled.rule.label;
            if tags.iter().any(|t| t.label == label) {
                continue;
            }
            let evidence = self
                .match_terms(compiled, TagField::Name, &entity.name, &name_words)
                .or_else(|| self.match_terms(compiled, TagField::Docstring, doc, &doc_words))
                .or_else(|| {
                    compiled
                        .rule
                        .predicate
                        .as_ref()
                        .and_then(|p| self.match_predicate(p, entity, analysis))
                });
            if let Some(evidence) = evidence {
                tags.push(DomainTag {
                    label,
                    rule_id: compiled.rule.id.clone(),
                    field: evidence.field,
                    matched_text: evidence.matched_text,
                    span: evidence.span,
                });
            }
        }
        tags
    }

    /// Tags for every entity of a file; untagged entities are omitted.
    pub fn tag_file(&self, analysis: &FileAnalysis) -> IndexMap<EntityId, Vec<DomainTag>> {
        analysis
            .entities
            .values()
            .filter_map(|entity| {
                let tags = self.tag(entity, analysis);
                (!tags.is_empty()).then(|| (entity.id.clone(), tags))
            })
            .collect()
    }
}

//! Shared typed models used across extraction, semantic, and query layers.
//!
//! Every type here is plain data: cloneable, comparable and serde
//! serializable with stable snake_case field names, so a built index can be
//! persisted by the caller and loaded back without loss.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// 1. Identity
// ---------------------------------------------------------------------------

/// Qualified name of an entity (`module.Class.method`), unique within one file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Project-wide entity key: `file_path::qualified_name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(file_path: &str, id: &EntityId) -> Self {
        Self(format!("{file_path}::{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// 2. Location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file_path: String,
    /// 1-based.
    pub line_start: u32,
    /// 1-based, inclusive.
    pub line_end: u32,
    /// 0-based.
    pub column_start: u32,
}

impl Location {
    pub fn line_count(&self) -> u32 {
        self.line_end.saturating_sub(self.line_start) + 1
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.line_start && line <= self.line_end
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path, self.line_start)
    }
}

// ---------------------------------------------------------------------------
// 3. Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    Class,
    Import,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::Class => "class",
            EntityKind::Import => "import",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    /// `Private` if the name starts with `_`, else `Public`.
    pub fn of(name: &str) -> Self {
        if name.starts_with('_') {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDetail {
    /// Owning class for methods.
    pub owner: Option<EntityId>,
    pub is_async: bool,
    pub decorators: Vec<String>,
    pub parameters: Vec<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDetail {
    /// Enclosing class for nested classes.
    pub owner: Option<EntityId>,
    /// Base class expressions as written (`Base`, `models.Model`).
    pub bases: Vec<String>,
    pub decorators: Vec<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDetail {
    /// Module path (`os.path`, `.models` for relative imports).
    pub module: String,
    /// The name pulled out of the module by `from m import name`.
    pub imported: Option<String>,
    pub alias: Option<String>,
    pub is_from: bool,
}

impl ImportDetail {
    /// The name this import binds in the importing module.
    pub fn bound_name(&self) -> &str {
        if let Some(alias) = &self.alias {
            return alias;
        }
        match &self.imported {
            Some(imported) => imported,
            None => self.module.split('.').next().unwrap_or(&self.module),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityDetail {
    Function(FunctionDetail),
    Class(ClassDetail),
    Import(ImportDetail),
}

/// A named code element discovered in one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Display name: the def/class name, or an import's alias or imported path.
    pub name: String,
    pub location: Location,
    pub docstring: Option<String>,
    #[serde(flatten)]
    pub detail: EntityDetail,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self.detail {
            EntityDetail::Function(_) => EntityKind::Function,
            EntityDetail::Class(_) => EntityKind::Class,
            EntityDetail::Import(_) => EntityKind::Import,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(&self.detail, EntityDetail::Function(f) if f.owner.is_some())
    }

    /// Owning class of a method or nested class.
    pub fn owner(&self) -> Option<&EntityId> {
        match &self.detail {
            EntityDetail::Function(f) => f.owner.as_ref(),
            EntityDetail::Class(c) => c.owner.as_ref(),
            EntityDetail::Import(_) => None,
        }
    }

    pub fn decorators(&self) -> &[String] {
        match &self.detail {
            EntityDetail::Function(f) => &f.decorators,
            EntityDetail::Class(c) => &c.decorators,
            EntityDetail::Import(_) => &[],
        }
    }

    pub fn bases(&self) -> &[String] {
        match &self.detail {
            EntityDetail::Class(c) => &c.bases,
            _ => &[],
        }
    }

    /// Human label used in chunk text: "Function", "Method", "Class" or "Import".
    pub fn kind_label(&self) -> &'static str {
        match self.kind() {
            EntityKind::Function if self.is_method() => "Method",
            EntityKind::Function => "Function",
            EntityKind::Class => "Class",
            EntityKind::Import => "Import",
        }
    }

    pub fn has_docstring(&self) -> bool {
        self.docstring.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// 4. Raw references (extractor output, before resolution)
// ---------------------------------------------------------------------------

/// How the receiver of `receiver.name(...)` was classified at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "binding", content = "text", rename_all = "snake_case")]
pub enum Receiver {
    /// `self` or `cls` inside a method.
    SelfRef(String),
    /// A parameter or assigned name of the enclosing function.
    Local(String),
    /// Any other bare identifier (module alias, global, builtin).
    Name(String),
    /// Anything else: chained calls, subscripts, nested attributes.
    Expression(String),
}

impl Receiver {
    pub fn text(&self) -> &str {
        match self {
            Receiver::SelfRef(t) | Receiver::Local(t) | Receiver::Name(t) | Receiver::Expression(t) => t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Base,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReference {
    pub source: EntityId,
    pub name: String,
    pub receiver: Option<Receiver>,
    pub kind: ReferenceKind,
    pub line: u32,
}

// ---------------------------------------------------------------------------
// 5. Relationships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Calls,
    Inherits,
    Imports,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Calls => "calls",
            RelationKind::Inherits => "inherits",
            RelationKind::Imports => "imports",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationKind,
    /// First line that produced the edge.
    pub line: u32,
}

// ---------------------------------------------------------------------------
// 6. Diagnostics and file analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub message: String,
    pub line: u32,
    pub severity: Severity,
}

/// Everything the extractor learned about one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file_path: String,
    pub module: String,
    pub entities: IndexMap<EntityId, Entity>,
    pub references: Vec<RawReference>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl FileAnalysis {
    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Entity> {
        self.of_kind(EntityKind::Function)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Entity> {
        self.of_kind(EntityKind::Class)
    }

    pub fn imports(&self) -> impl Iterator<Item = &Entity> {
        self.of_kind(EntityKind::Import)
    }

    fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind() == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    /// Diagnostics whose line falls inside `location`.
    pub fn diagnostics_in<'a>(
        &'a self,
        location: &'a Location,
    ) -> impl Iterator<Item = &'a ParseDiagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| location.contains_line(d.line))
    }
}

// ---------------------------------------------------------------------------
// 7. Domain tags
// ---------------------------------------------------------------------------

/// Closed accounting vocabulary. Declaration order is the vocabulary order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainLabel {
    Ledger,
    JournalEntry,
    TrialBalance,
    ProfitAndLoss,
    Reconciliation,
    Tax,
    Invoice,
    Payment,
    DeferredRevenue,
    Reports,
}

impl DomainLabel {
    pub const ALL: [DomainLabel; 10] = [
        DomainLabel::Ledger,
        DomainLabel::JournalEntry,
        DomainLabel::TrialBalance,
        DomainLabel::ProfitAndLoss,
        DomainLabel::Reconciliation,
        DomainLabel::Tax,
        DomainLabel::Invoice,
        DomainLabel::Payment,
        DomainLabel::DeferredRevenue,
        DomainLabel::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainLabel::Ledger => "ledger",
            DomainLabel::JournalEntry => "journal_entry",
            DomainLabel::TrialBalance => "trial_balance",
            DomainLabel::ProfitAndLoss => "profit_and_loss",
            DomainLabel::Reconciliation => "reconciliation",
            DomainLabel::Tax => "tax",
            DomainLabel::Invoice => "invoice",
            DomainLabel::Payment => "payment",
            DomainLabel::DeferredRevenue => "deferred_revenue",
            DomainLabel::Reports => "reports",
        }
    }

    /// Exact, case-insensitive lookup of a label by its snake_case name.
    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.to_lowercase();
        Self::ALL.into_iter().find(|l| l.as_str() == lowered)
    }
}

impl fmt::Display for DomainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of an entity a tag rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagField {
    Name,
    Docstring,
    Structure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainTag {
    pub label: DomainLabel,
    pub rule_id: String,
    pub field: TagField,
    pub matched_text: String,
    /// Byte range of the match inside the field text.
    pub span: (usize, usize),
}

// ---------------------------------------------------------------------------
// 8. Workflows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    Initiator,
    Processor,
    Finalizer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub entity: EntityId,
    pub role: StepRole,
    /// Stage label this step satisfied, if any.
    pub stage: Option<DomainLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub template_id: String,
    pub template_name: String,
    pub business_process: String,
    pub file_path: String,
    pub steps: Vec<WorkflowStep>,
    pub matched_hints: Vec<DomainLabel>,
    pub confidence: f64,
    /// How the instance was inferred, one line per fact.
    #[serde(default)]
    pub reasoning: Vec<String>,
}

impl WorkflowInstance {
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.steps.iter().map(|s| &s.entity)
    }
}

// ---------------------------------------------------------------------------
// 9. Context scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreBucket {
    Low,
    Medium,
    High,
}

impl ScoreBucket {
    pub fn for_value(value: f64) -> Self {
        if value >= 0.7 {
            ScoreBucket::High
        } else if value >= 0.4 {
            ScoreBucket::Medium
        } else {
            ScoreBucket::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBucket::High => "HIGH",
            ScoreBucket::Medium => "MEDIUM",
            ScoreBucket::Low => "LOW",
        }
    }
}

/// Raw signal values in [0, 1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreSignals {
    pub docstring: f64,
    pub size: f64,
    pub domain: f64,
    pub clean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextScore {
    pub value: f64,
    pub bucket: ScoreBucket,
    pub signals: ScoreSignals,
    pub reasons: Vec<String>,
}

impl ContextScore {
    /// Placeholder for entities the caller did not score.
    pub fn unscored() -> Self {
        Self {
            value: 0.0,
            bucket: ScoreBucket::Low,
            signals: ScoreSignals::default(),
            reasons: vec!["not scored".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entity(name: &str, detail: EntityDetail) -> Entity {
        Entity {
            id: EntityId::new(format!("m.{name}")),
            name: name.to_string(),
            location: Location {
                file_path: "m.py".to_string(),
                line_start: 3,
                line_end: 7,
                column_start: 0,
            },
            docstring: None,
            detail,
        }
    }

    #[test]
    fn test_bucket_thresholds() {
        assert_eq!(ScoreBucket::for_value(0.7), ScoreBucket::High);
        assert_eq!(ScoreBucket::for_value(0.69), ScoreBucket::Medium);
        assert_eq!(ScoreBucket::for_value(0.4), ScoreBucket::Medium);
        assert_eq!(ScoreBucket::for_value(0.39), ScoreBucket::Low);
    }

    #[test]
    fn test_location_lines() {
        let entity = make_entity(
            "post",
            EntityDetail::Function(FunctionDetail {
                owner: None,
                is_async: false,
                decorators: vec![],
                parameters: vec![],
                visibility: Visibility::Public,
            }),
        );
        assert_eq!(entity.location.line_count(), 5);
        assert!(entity.location.contains_line(7));
        assert!(!entity.location.contains_line(8));
        assert_eq!(entity.location.to_string(), "m.py:3");
    }

    #[test]
    fn test_method_label() {
        let method = make_entity(
            "post",
            EntityDetail::Function(FunctionDetail {
                owner: Some(EntityId::from("m.Ledger")),
                is_async: false,
                decorators: vec![],
                parameters: vec![],
                visibility: Visibility::Public,
            }),
        );
        assert!(method.is_method());
        assert_eq!(method.kind_label(), "Method");
        assert_eq!(method.kind(), EntityKind::Function);
    }

    #[test]
    fn test_entity_serializes_kind_inline() {
        let entity = make_entity(
            "os",
            EntityDetail::Import(ImportDetail {
                module: "os".to_string(),
                imported: None,
                alias: None,
                is_from: false,
            }),
        );
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["kind"], "import");
        assert_eq!(value["module"], "os");
        let back: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn test_label_parse() {
        assert_eq!(DomainLabel::parse("Ledger"), Some(DomainLabel::Ledger));
        assert_eq!(
            DomainLabel::parse("journal_entry"),
            Some(DomainLabel::JournalEntry)
        );
        assert_eq!(DomainLabel::parse("data"), None);
    }

    #[test]
    fn test_visibility() {
        assert_eq!(Visibility::of("_hidden"), Visibility::Private);
        assert_eq!(Visibility::of("shown"), Visibility::Public);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::AuditEntry;

/// Identifier wrapper for the workflow card under triage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One required (or optional) document category for case approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub name: String,
    pub mandatory: bool,
    pub category: String,
}

/// A file already parsed by the ingestion side; only a text excerpt travels here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedDocument {
    pub filename: String,
    #[serde(default)]
    pub content_excerpt: String,
}

/// How a checklist item got (or failed to get) its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchSource {
    Ai,
    AutoGenerated,
    Absent,
}

impl MatchSource {
    pub const fn label(self) -> &'static str {
        match self {
            MatchSource::Ai => "AI",
            MatchSource::AutoGenerated => "AUTO_GENERATED",
            MatchSource::Absent => "ABSENT",
        }
    }
}

/// Per-item outcome of a run. Produced once; a correction means a new run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub item: ChecklistItem,
    pub matched_document: Option<SubmittedDocument>,
    pub source: MatchSource,
    /// Registry trace of an auto-generated document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<GeneratedDocumentRef>,
}

impl MatchResult {
    pub fn matched(item: ChecklistItem, document: SubmittedDocument) -> Self {
        Self {
            item,
            matched_document: Some(document),
            source: MatchSource::Ai,
            generated: None,
        }
    }

    pub fn absent(item: ChecklistItem) -> Self {
        Self {
            item,
            matched_document: None,
            source: MatchSource::Absent,
            generated: None,
        }
    }

    pub fn auto_generated(
        item: ChecklistItem,
        document: SubmittedDocument,
        generated: GeneratedDocumentRef,
    ) -> Self {
        Self {
            item,
            matched_document: Some(document),
            source: MatchSource::AutoGenerated,
            generated: Some(generated),
        }
    }

    pub fn status(&self) -> ItemStatus {
        match (self.source, self.matched_document.is_some()) {
            (MatchSource::Ai, true) => ItemStatus::Conforme,
            (MatchSource::AutoGenerated, true) => ItemStatus::Pendente,
            _ => ItemStatus::Ausente,
        }
    }
}

/// Item-level status shown to reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Conforme,
    Pendente,
    Ausente,
}

impl ItemStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ItemStatus::Conforme => "Conforme",
            ItemStatus::Pendente => "Pendente",
            ItemStatus::Ausente => "Ausente",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendencyKind {
    Blocking,
    NonBlocking,
}

impl PendencyKind {
    pub const fn label(self) -> &'static str {
        match self {
            PendencyKind::Blocking => "blocking",
            PendencyKind::NonBlocking => "non_blocking",
        }
    }
}

/// Trace of a document synthesized by the remediation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocumentRef {
    pub identifier: String,
    pub reference: String,
}

/// An outstanding issue derived from a match result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pendency {
    pub kind: PendencyKind,
    pub item_name: String,
    pub category: String,
    pub description: String,
    pub required_action: String,
    pub suggested_deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<GeneratedDocumentRef>,
}

impl Pendency {
    pub fn is_blocking(&self) -> bool {
        self.kind == PendencyKind::Blocking
    }
}

/// Case-level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Approved,
    BlockingPending,
    NonBlockingPending,
}

impl CaseStatus {
    /// Blocking wins over non-blocking; no pendencies means approved.
    pub fn from_pendencies(pendencies: &[Pendency]) -> Self {
        if pendencies.iter().any(Pendency::is_blocking) {
            CaseStatus::BlockingPending
        } else if pendencies.is_empty() {
            CaseStatus::Approved
        } else {
            CaseStatus::NonBlockingPending
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Approved => "Aprovado",
            CaseStatus::BlockingPending => "Pendencia_Bloqueante",
            CaseStatus::NonBlockingPending => "Pendencia_NaoBloqueante",
        }
    }
}

/// Typed instruction for the workflow and notification dispatchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDirective {
    MoveCard {
        target_phase: String,
    },
    NotifyChannel {
        recipient: String,
        message: String,
    },
    GenerateDocument {
        document_type: String,
        identifier: String,
        reason: String,
    },
}

impl ActionDirective {
    pub fn is_move_card(&self) -> bool {
        matches!(self, ActionDirective::MoveCard { .. })
    }

    pub const fn label(&self) -> &'static str {
        match self {
            ActionDirective::MoveCard { .. } => "move_card",
            ActionDirective::NotifyChannel { .. } => "notify_channel",
            ActionDirective::GenerateDocument { .. } => "generate_document",
        }
    }
}

/// Per-item degradation surfaced to reviewers without failing the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriageWarning {
    /// The classifier named a document outside the candidate set.
    UnknownCandidate { item_name: String, named: String },
    /// The classifier never produced a usable answer.
    ClassifierUnavailable {
        item_name: String,
        attempts: u32,
        detail: String,
    },
    RemediationFailed { item_name: String, detail: String },
}

/// The sole artifact of a triage run, persisted and audited as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub case_id: CaseId,
    pub overall_status: CaseStatus,
    pub items: Vec<MatchResult>,
    pub pendencies: Vec<Pendency>,
    pub actions: Vec<ActionDirective>,
    #[serde(default)]
    pub warnings: Vec<TriageWarning>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
    pub generated_at: DateTime<Utc>,
}

impl TriageResult {
    pub fn blocking(&self) -> impl Iterator<Item = &Pendency> {
        self.pendencies.iter().filter(|pendency| pendency.is_blocking())
    }

    pub fn item(&self, name: &str) -> Option<&MatchResult> {
        self.items.iter().find(|result| result.item.name == name)
    }
}

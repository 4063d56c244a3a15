use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{CaseId, MatchSource};

/// One audit record. Matching decisions keep the full prompt and raw reply so a
/// reviewer can replay what the classifier saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    MatchDecision {
        case_id: CaseId,
        item_name: String,
        candidates_considered: Vec<String>,
        prompt: Option<String>,
        raw_response: Option<String>,
        decision: String,
        source: MatchSource,
        attempts: u32,
    },
    RemediationAttempt {
        case_id: CaseId,
        item_name: String,
        identifying_code: Option<String>,
        outcome: RemediationOutcomeKind,
        reference_or_error: Option<String>,
    },
}

impl AuditEntry {
    pub fn case_id(&self) -> &CaseId {
        match self {
            AuditEntry::MatchDecision { case_id, .. }
            | AuditEntry::RemediationAttempt { case_id, .. } => case_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcomeKind {
    Generated,
    Failed,
    NoIdentifyingCode,
}

impl RemediationOutcomeKind {
    pub const fn label(self) -> &'static str {
        match self {
            RemediationOutcomeKind::Generated => "generated",
            RemediationOutcomeKind::Failed => "failed",
            RemediationOutcomeKind::NoIdentifyingCode => "no_identifying_code",
        }
    }
}

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Keeps every entry in memory; used for a run's own trail and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry);
        }
    }
}

/// Log target carrying audit records; kept at `info` whatever the configured level.
pub const AUDIT_TARGET: &str = "triage_audit";

/// Emits entries as structured events on the `triage_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        match &entry {
            AuditEntry::MatchDecision {
                case_id,
                item_name,
                candidates_considered,
                prompt,
                raw_response,
                decision,
                source,
                attempts,
            } => info!(
                target: AUDIT_TARGET,
                case_id = %case_id,
                item = %item_name,
                candidates = ?candidates_considered,
                prompt = prompt.as_deref().unwrap_or(""),
                response = raw_response.as_deref().unwrap_or(""),
                decision = %decision,
                source = source.label(),
                attempts,
                "matching decision"
            ),
            AuditEntry::RemediationAttempt {
                case_id,
                item_name,
                identifying_code,
                outcome,
                reference_or_error,
            } => info!(
                target: AUDIT_TARGET,
                case_id = %case_id,
                item = %item_name,
                identifying_code = identifying_code.as_deref().unwrap_or(""),
                outcome = outcome.label(),
                detail = reference_or_error.as_deref().unwrap_or(""),
                "remediation attempt"
            ),
        }
    }
}

/// Per-run trail that forwards to the injected sink.
pub(crate) struct RunAudit {
    trail: MemoryAuditSink,
    downstream: Arc<dyn AuditSink>,
}

impl RunAudit {
    pub(crate) fn new(downstream: Arc<dyn AuditSink>) -> Self {
        Self {
            trail: MemoryAuditSink::default(),
            downstream,
        }
    }

    pub(crate) fn into_entries(self) -> Vec<AuditEntry> {
        self.trail.entries()
    }
}

impl AuditSink for RunAudit {
    fn record(&self, entry: AuditEntry) {
        self.downstream.record(entry.clone());
        self.trail.record(entry);
    }
}

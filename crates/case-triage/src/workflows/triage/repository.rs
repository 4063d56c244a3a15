use serde::{Deserialize, Serialize};

use super::domain::{ActionDirective, CaseId, TriageResult};

/// Storage abstraction for finished runs, keyed by case id and generation time.
pub trait TriageRepository: Send + Sync {
    /// Rejects a second result with the same `(case_id, generated_at)` key.
    fn save(&self, result: TriageResult) -> Result<(), RepositoryError>;
    fn latest(&self, case_id: &CaseId) -> Result<Option<TriageResult>, RepositoryError>;
    /// Every stored result for the case, oldest first.
    fn history(&self, case_id: &CaseId) -> Result<Vec<TriageResult>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("result already stored for this case and timestamp")]
    Conflict,
    #[error("no triage result stored for case")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Workflow and notification hooks that execute planned directives.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, case_id: &CaseId, action: &ActionDirective) -> Result<(), DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch transport unavailable: {0}")]
    Transport(String),
    #[error("directive rejected downstream: {0}")]
    Rejected(String),
}

/// How far directive delivery got for one result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailedDispatch>,
    /// Directives left unsent after the failure.
    pub skipped: usize,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDispatch {
    pub position: usize,
    pub action: String,
    pub error: String,
}

//! Business-registration case triage.
//!
//! A run takes a checklist snapshot and the submitted documents, asks the
//! semantic classifier which document satisfies each item, synthesizes a
//! missing registration certificate at most once, and folds everything into
//! pendencies, a case status, and an ordered action plan.

pub mod actions;
pub mod aggregate;
pub mod audit;
pub mod checklist;
pub mod domain;
pub mod engine;
pub mod http;
pub mod matcher;
pub mod remediation;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
mod validation;

#[cfg(test)]
mod tests;

pub use actions::ActionPlanBuilder;
pub use aggregate::{Aggregation, StatusAggregator};
pub use audit::{
    AuditEntry, AuditSink, MemoryAuditSink, RemediationOutcomeKind, TracingAuditSink, AUDIT_TARGET,
};
pub use checklist::{
    CachedChecklistProvider, Checklist, ChecklistError, ChecklistProvider, CsvChecklistProvider,
    StaticChecklistProvider,
};
pub use domain::{
    ActionDirective, CaseId, CaseStatus, ChecklistItem, GeneratedDocumentRef, ItemStatus,
    MatchResult, MatchSource, Pendency, PendencyKind, SubmittedDocument, TriageResult,
    TriageWarning,
};
pub use engine::{TriageEngine, TriageError, TriageRequest};
pub use http::{ChatCompletionsClassifier, EnrichmentApiGenerator};
pub use matcher::{
    Candidate, ClassificationRequest, Classifier, ClassifierError, DocumentMatcher, ItemMatch,
    MatcherPolicy,
};
pub use remediation::{
    locate_identifying_code, DocumentGenerator, GeneratedDocument, GenerationError,
    GenerationRequest, Remediation, RemediationAttempt, RemediationResolver, RemediationRule,
};
pub use report::{MarkdownReportRenderer, RenderedReport, ReportRenderer, TriageReport};
pub use repository::{
    ActionDispatcher, DispatchError, DispatchReport, FailedDispatch, RepositoryError,
    TriageRepository,
};
pub use router::triage_router;
pub use service::{TriageOutcome, TriageService};
pub use validation::ValidationError;

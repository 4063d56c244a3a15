use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::actions::ActionPlanBuilder;
use super::aggregate::StatusAggregator;
use super::audit::{AuditSink, RunAudit};
use super::checklist::{Checklist, ChecklistError, ChecklistProvider};
use super::domain::{
    CaseId, ChecklistItem, MatchResult, SubmittedDocument, TriageResult, TriageWarning,
};
use super::matcher::{Classifier, DocumentMatcher, ItemMatch, MatcherPolicy};
use super::remediation::{DocumentGenerator, RemediationResolver};
use super::repository::RepositoryError;
use super::validation::ValidationError;
use crate::config::TriageSettings;

/// Input for one run. An inline checklist overrides the provider's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageRequest {
    pub case_id: CaseId,
    #[serde(default)]
    pub documents: Vec<SubmittedDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Vec<ChecklistItem>>,
}

/// Run-level failures. Per-item problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("invalid triage request: {0}")]
    InvalidRequest(String),
    #[error("checklist configuration error: {0}")]
    Configuration(#[from] ChecklistError),
    #[error("triage result failed validation: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The decision pipeline: checklist snapshot, matching with inline remediation,
/// aggregation, action planning, and validation.
pub struct TriageEngine {
    checklist: Arc<dyn ChecklistProvider>,
    matcher: DocumentMatcher,
    resolver: RemediationResolver,
    aggregator: StatusAggregator,
    planner: ActionPlanBuilder,
    audit: Arc<dyn AuditSink>,
}

impl TriageEngine {
    pub fn new(
        checklist: Arc<dyn ChecklistProvider>,
        classifier: Arc<dyn Classifier>,
        generator: Arc<dyn DocumentGenerator>,
        audit: Arc<dyn AuditSink>,
        settings: &TriageSettings,
    ) -> Self {
        Self::from_parts(
            checklist,
            DocumentMatcher::new(classifier, MatcherPolicy::from(settings)),
            RemediationResolver::from_settings(generator, settings),
            StatusAggregator::from_settings(settings),
            ActionPlanBuilder::from_settings(settings),
            audit,
        )
    }

    pub fn from_parts(
        checklist: Arc<dyn ChecklistProvider>,
        matcher: DocumentMatcher,
        resolver: RemediationResolver,
        aggregator: StatusAggregator,
        planner: ActionPlanBuilder,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            checklist,
            matcher,
            resolver,
            aggregator,
            planner,
            audit,
        }
    }

    pub async fn run(&self, request: TriageRequest) -> Result<TriageResult, TriageError> {
        self.run_at(request, Utc::now()).await
    }

    #[instrument(skip_all, fields(case_id = %request.case_id))]
    pub async fn run_at(
        &self,
        request: TriageRequest,
        generated_at: DateTime<Utc>,
    ) -> Result<TriageResult, TriageError> {
        let TriageRequest {
            case_id,
            documents,
            checklist,
        } = request;

        if case_id.as_str().trim().is_empty() {
            return Err(TriageError::InvalidRequest(
                "case_id must not be blank".to_string(),
            ));
        }

        let checklist = match checklist {
            Some(items) => Arc::new(Checklist::new(items)?),
            None => self.checklist.checklist(&case_id).await?,
        };

        let audit = RunAudit::new(self.audit.clone());
        let remediated = AtomicBool::new(false);

        let evaluated = join_all(checklist.items().iter().map(|item| {
            self.evaluate_item(&case_id, item, &documents, &audit, &remediated)
        }))
        .await;

        let mut items = Vec::with_capacity(evaluated.len());
        let mut warnings = Vec::new();
        for (result, item_warnings) in evaluated {
            items.push(result);
            warnings.extend(item_warnings);
        }

        let aggregation = self.aggregator.aggregate(&items, generated_at);
        let actions = self
            .planner
            .build(aggregation.overall_status, &aggregation.pendencies);

        let result = TriageResult {
            case_id,
            overall_status: aggregation.overall_status,
            items,
            pendencies: aggregation.pendencies,
            actions,
            warnings,
            audit: audit.into_entries(),
            generated_at,
        };
        result.validate(&checklist)?;

        info!(
            status = result.overall_status.label(),
            items = result.items.len(),
            pendencies = result.pendencies.len(),
            warnings = result.warnings.len(),
            "triage run completed"
        );
        Ok(result)
    }

    /// Match one item and, if it is the registration item and still missing,
    /// run the single remediation attempt of this run before finalizing it.
    async fn evaluate_item(
        &self,
        case_id: &CaseId,
        item: &ChecklistItem,
        documents: &[SubmittedDocument],
        audit: &RunAudit,
        remediated: &AtomicBool,
    ) -> (MatchResult, Vec<TriageWarning>) {
        let ItemMatch { result, warning } = self
            .matcher
            .match_item(case_id, item, documents, audit)
            .await;
        let mut warnings: Vec<TriageWarning> = warning.into_iter().collect();

        if self.resolver.eligible(&result) && !remediated.swap(true, Ordering::SeqCst) {
            let remediation = self
                .resolver
                .remediate(case_id, &result, documents, audit)
                .await;
            warnings.extend(remediation.warning);
            return (remediation.result, warnings);
        }

        (result, warnings)
    }
}

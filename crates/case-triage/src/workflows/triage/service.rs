use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{CaseId, TriageResult};
use super::engine::{TriageEngine, TriageError, TriageRequest};
use super::report::{MarkdownReportRenderer, RenderedReport, ReportRenderer, TriageReport};
use super::repository::{
    ActionDispatcher, DispatchReport, FailedDispatch, RepositoryError, TriageRepository,
};

/// What a caller gets back for a persisted run.
#[derive(Debug, Clone, Serialize)]
pub struct TriageOutcome {
    pub result: TriageResult,
    pub report: RenderedReport,
    pub dispatch: DispatchReport,
}

/// Service composing the triage engine with persistence, rendering, and dispatch.
pub struct TriageService<R, D> {
    engine: Arc<TriageEngine>,
    repository: Arc<R>,
    dispatcher: Arc<D>,
    renderer: Arc<dyn ReportRenderer>,
}

impl<R, D> TriageService<R, D>
where
    R: TriageRepository + 'static,
    D: ActionDispatcher + 'static,
{
    pub fn new(engine: TriageEngine, repository: Arc<R>, dispatcher: Arc<D>) -> Self {
        Self {
            engine: Arc::new(engine),
            repository,
            dispatcher,
            renderer: Arc::new(MarkdownReportRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn engine(&self) -> &TriageEngine {
        &self.engine
    }

    /// Run, persist, then dispatch the planned directives.
    pub async fn triage(&self, request: TriageRequest) -> Result<TriageOutcome, TriageError> {
        self.triage_at(request, Utc::now()).await
    }

    pub async fn triage_at(
        &self,
        request: TriageRequest,
        generated_at: DateTime<Utc>,
    ) -> Result<TriageOutcome, TriageError> {
        let result = self.engine.run_at(request, generated_at).await?;

        self.repository.save(result.clone())?;
        let dispatch = self.dispatch(&result);
        let report = self.render(&result);

        Ok(TriageOutcome {
            result,
            report,
            dispatch,
        })
    }

    pub fn latest(&self, case_id: &CaseId) -> Result<TriageResult, TriageError> {
        let result = self
            .repository
            .latest(case_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(result)
    }

    pub fn history(&self, case_id: &CaseId) -> Result<Vec<TriageResult>, TriageError> {
        Ok(self.repository.history(case_id)?)
    }

    pub fn render(&self, result: &TriageResult) -> RenderedReport {
        self.renderer.render(&TriageReport::from_result(result))
    }

    /// Deliver directives in plan order, stopping at the first failure so the
    /// card never moves after a lost notification.
    fn dispatch(&self, result: &TriageResult) -> DispatchReport {
        let mut report = DispatchReport::default();
        for (position, action) in result.actions.iter().enumerate() {
            match self.dispatcher.dispatch(&result.case_id, action) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        case_id = %result.case_id,
                        action = action.label(),
                        position,
                        %error,
                        "directive dispatch failed; remaining directives held back"
                    );
                    report.failed = Some(FailedDispatch {
                        position,
                        action: action.label().to_string(),
                        error: error.to_string(),
                    });
                    report.skipped = result.actions.len() - position - 1;
                    return report;
                }
            }
        }
        info!(case_id = %result.case_id, delivered = report.delivered, "directives dispatched");
        report
    }
}

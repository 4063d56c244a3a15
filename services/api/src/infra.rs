use case_triage::config::{AppConfig, TriageSettings};
use case_triage::error::AppError;
use case_triage::workflows::triage::{
    ActionDirective, ActionDispatcher, AuditSink, CachedChecklistProvider, CaseId, Checklist,
    ChecklistError, ChecklistItem, ChecklistProvider, ChatCompletionsClassifier,
    CsvChecklistProvider, DispatchError, EnrichmentApiGenerator, RepositoryError,
    StaticChecklistProvider, TracingAuditSink, TriageEngine, TriageRepository, TriageResult,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Keeps every run per case, oldest first.
#[derive(Default, Clone)]
pub(crate) struct InMemoryTriageRepository {
    records: Arc<Mutex<HashMap<CaseId, Vec<TriageResult>>>>,
}

impl TriageRepository for InMemoryTriageRepository {
    fn save(&self, result: TriageResult) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let history = guard.entry(result.case_id.clone()).or_default();
        if history
            .iter()
            .any(|stored| stored.generated_at == result.generated_at)
        {
            return Err(RepositoryError::Conflict);
        }
        history.push(result);
        Ok(())
    }

    fn latest(&self, case_id: &CaseId) -> Result<Option<TriageResult>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(case_id).and_then(|history| history.last().cloned()))
    }

    fn history(&self, case_id: &CaseId) -> Result<Vec<TriageResult>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(case_id).cloned().unwrap_or_default())
    }
}

/// Stand-in for the workflow board and messaging hooks: logs each directive.
#[derive(Default, Clone)]
pub(crate) struct LoggingActionDispatcher {
    delivered: Arc<Mutex<Vec<(CaseId, ActionDirective)>>>,
}

impl ActionDispatcher for LoggingActionDispatcher {
    fn dispatch(&self, case_id: &CaseId, action: &ActionDirective) -> Result<(), DispatchError> {
        match action {
            ActionDirective::MoveCard { target_phase } => {
                info!(case_id = %case_id, %target_phase, "moving card");
            }
            ActionDirective::NotifyChannel { recipient, message } => {
                info!(case_id = %case_id, %recipient, %message, "notifying reviewer");
            }
            ActionDirective::GenerateDocument {
                document_type,
                identifier,
                ..
            } => {
                info!(case_id = %case_id, %document_type, %identifier, "recording generated document");
            }
        }
        let mut guard = self.delivered.lock().expect("dispatch mutex poisoned");
        guard.push((case_id.clone(), action.clone()));
        Ok(())
    }
}

#[cfg(test)]
impl LoggingActionDispatcher {
    pub(crate) fn delivered(&self) -> Vec<(CaseId, ActionDirective)> {
        self.delivered.lock().expect("dispatch mutex poisoned").clone()
    }
}

/// Checklist used when no CSV source is configured.
pub(crate) fn default_checklist() -> Result<Checklist, ChecklistError> {
    Checklist::new(vec![
        ChecklistItem {
            name: "ContratoSocial".to_string(),
            mandatory: true,
            category: "Societário".to_string(),
        },
        ChecklistItem {
            name: "CartaoCNPJ".to_string(),
            mandatory: true,
            category: "Cadastral".to_string(),
        },
        ChecklistItem {
            name: "ComprovanteEndereco".to_string(),
            mandatory: false,
            category: "Cadastral".to_string(),
        },
    ])
}

pub(crate) fn checklist_provider(
    settings: &TriageSettings,
) -> Result<Arc<dyn ChecklistProvider>, AppError> {
    match &settings.checklist_path {
        Some(path) => {
            info!(path = %path.display(), ttl_secs = settings.checklist_ttl.as_secs(), "loading checklist from CSV");
            Ok(Arc::new(CachedChecklistProvider::new(
                CsvChecklistProvider::new(path),
                settings.checklist_ttl,
            )))
        }
        None => {
            warn!("TRIAGE_CHECKLIST_PATH not set; using the built-in checklist");
            Ok(Arc::new(StaticChecklistProvider::new(default_checklist()?)))
        }
    }
}

/// Engine wired to the configured HTTP collaborators.
pub(crate) fn build_engine(config: &AppConfig) -> Result<TriageEngine, AppError> {
    let settings = &config.triage;
    if config.integrations.classifier_api_key.is_none() {
        warn!("CLASSIFIER_API_KEY not set; classifier calls will be unauthenticated");
    }

    let classifier = Arc::new(ChatCompletionsClassifier::new(&config.integrations, settings)?);
    let generator = Arc::new(EnrichmentApiGenerator::new(&config.integrations, settings)?);
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    Ok(TriageEngine::new(
        checklist_provider(settings)?,
        classifier,
        generator,
        audit,
        settings,
    ))
}

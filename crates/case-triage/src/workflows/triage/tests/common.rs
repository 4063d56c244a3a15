use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::TriageSettings;
use crate::workflows::triage::audit::MemoryAuditSink;
use crate::workflows::triage::checklist::{Checklist, StaticChecklistProvider};
use crate::workflows::triage::domain::{ActionDirective, CaseId, ChecklistItem, SubmittedDocument};
use crate::workflows::triage::engine::{TriageEngine, TriageRequest};
use crate::workflows::triage::matcher::{ClassificationRequest, Classifier, ClassifierError};
use crate::workflows::triage::remediation::{
    DocumentGenerator, GeneratedDocument, GenerationError, GenerationRequest,
};
use crate::workflows::triage::repository::{
    ActionDispatcher, DispatchError, RepositoryError, TriageRepository,
};
use crate::workflows::triage::domain::TriageResult;
use crate::workflows::triage::service::TriageService;

pub(super) const TAX_ID: &str = "12345678000199";

pub(super) fn generated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 28, 15, 30, 0).unwrap()
}

pub(super) fn settings() -> TriageSettings {
    TriageSettings {
        match_attempts: 3,
        match_timeout: Duration::from_millis(50),
        retry_backoff: Duration::from_millis(1),
        generation_timeout: Duration::from_millis(100),
        ..TriageSettings::default()
    }
}

pub(super) fn item(name: &str, mandatory: bool, category: &str) -> ChecklistItem {
    ChecklistItem {
        name: name.to_string(),
        mandatory,
        category: category.to_string(),
    }
}

pub(super) fn registration_checklist() -> Checklist {
    Checklist::new(vec![
        item("ContratoSocial", true, "Societário"),
        item("CartaoCNPJ", true, "Cadastral"),
    ])
    .expect("valid checklist")
}

pub(super) fn document(filename: &str, content: &str) -> SubmittedDocument {
    SubmittedDocument {
        filename: filename.to_string(),
        content_excerpt: content.to_string(),
    }
}

pub(super) fn contract_with_tax_id() -> SubmittedDocument {
    document(
        "contrato.pdf",
        "CONTRATO SOCIAL DA EMPRESA EXEMPLO LTDA, inscrita no CNPJ 12.345.678/0001-99",
    )
}

pub(super) fn request(case_id: &str, documents: Vec<SubmittedDocument>) -> TriageRequest {
    TriageRequest {
        case_id: CaseId(case_id.to_string()),
        documents,
        checklist: None,
    }
}

pub(super) fn json_reply(filename: Option<&str>) -> String {
    match filename {
        Some(name) => format!(r#"{{"filename": "{name}"}}"#),
        None => r#"{"filename": null}"#.to_string(),
    }
}

type Script = VecDeque<Result<String, ClassifierError>>;

/// Replies per checklist item; the last scripted reply repeats. Unscripted
/// items get a "no match" reply.
#[derive(Default)]
pub(super) struct ScriptedClassifier {
    scripts: Mutex<HashMap<String, Script>>,
    delays: HashMap<String, Duration>,
    pub(super) requests: Mutex<Vec<ClassificationRequest>>,
}

impl ScriptedClassifier {
    pub(super) fn reply(self, item: &str, raw: impl Into<String>) -> Self {
        self.script(item, Ok(raw.into()))
    }

    pub(super) fn fail(self, item: &str, error: ClassifierError) -> Self {
        self.script(item, Err(error))
    }

    pub(super) fn delay(mut self, item: &str, delay: Duration) -> Self {
        self.delays.insert(item.to_string(), delay);
        self
    }

    fn script(self, item: &str, reply: Result<String, ClassifierError>) -> Self {
        self.scripts
            .lock()
            .expect("script mutex poisoned")
            .entry(item.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(super) fn calls_for(&self, item: &str) -> usize {
        self.requests
            .lock()
            .expect("request mutex poisoned")
            .iter()
            .filter(|request| request.item.name == item)
            .count()
    }

    pub(super) fn total_calls(&self) -> usize {
        self.requests.lock().expect("request mutex poisoned").len()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifierError> {
        self.requests
            .lock()
            .expect("request mutex poisoned")
            .push(request.clone());

        if let Some(delay) = self.delays.get(&request.item.name) {
            tokio::time::sleep(*delay).await;
        }

        let mut scripts = self.scripts.lock().expect("script mutex poisoned");
        match scripts.get_mut(&request.item.name) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or_else(|| Ok(json_reply(None))),
            Some(script) => script.front().cloned().unwrap_or_else(|| Ok(json_reply(None))),
            None => Ok(json_reply(None)),
        }
    }
}

pub(super) struct MockGenerator {
    outcome: Result<GeneratedDocument, GenerationError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    pub(super) requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub(super) fn succeeding() -> Self {
        Self::with_outcome(Ok(GeneratedDocument {
            reference: format!("https://docs.example/cnpj/{TAX_ID}.pdf"),
            filename: format!("cartaocnpj_{TAX_ID}.pdf"),
        }))
    }

    pub(super) fn failing(error: GenerationError) -> Self {
        Self::with_outcome(Err(error))
    }

    pub(super) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::succeeding()
        }
    }

    fn with_outcome(outcome: Result<GeneratedDocument, GenerationError>) -> Self {
        Self {
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentGenerator for MockGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedDocument, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("request mutex poisoned")
            .push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

pub(super) struct Harness {
    pub(super) engine: TriageEngine,
    pub(super) classifier: Arc<ScriptedClassifier>,
    pub(super) generator: Arc<MockGenerator>,
    pub(super) audit: Arc<MemoryAuditSink>,
}

pub(super) fn harness(classifier: ScriptedClassifier, generator: MockGenerator) -> Harness {
    harness_with(classifier, generator, registration_checklist(), &settings())
}

pub(super) fn harness_with(
    classifier: ScriptedClassifier,
    generator: MockGenerator,
    checklist: Checklist,
    settings: &TriageSettings,
) -> Harness {
    let classifier = Arc::new(classifier);
    let generator = Arc::new(generator);
    let audit = Arc::new(MemoryAuditSink::default());
    let engine = TriageEngine::new(
        Arc::new(StaticChecklistProvider::new(checklist)),
        classifier.clone(),
        generator.clone(),
        audit.clone(),
        settings,
    );
    Harness {
        engine,
        classifier,
        generator,
        audit,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<BTreeMap<CaseId, Vec<TriageResult>>>>,
}

impl TriageRepository for MemoryRepository {
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

pub(super) struct UnavailableRepository;

impl TriageRepository for UnavailableRepository {
    fn save(&self, _result: TriageResult) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn latest(&self, _case_id: &CaseId) -> Result<Option<TriageResult>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn history(&self, _case_id: &CaseId) -> Result<Vec<TriageResult>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Records delivered directives; optionally fails on the first directive of a kind.
#[derive(Default, Clone)]
pub(super) struct MemoryDispatcher {
    delivered: Arc<Mutex<Vec<ActionDirective>>>,
    fail_on: Option<&'static str>,
}

impl MemoryDispatcher {
    pub(super) fn failing_on(label: &'static str) -> Self {
        Self {
            fail_on: Some(label),
            ..Self::default()
        }
    }

    pub(super) fn delivered(&self) -> Vec<ActionDirective> {
        self.delivered.lock().expect("dispatch mutex poisoned").clone()
    }
}

impl ActionDispatcher for MemoryDispatcher {
    fn dispatch(&self, _case_id: &CaseId, action: &ActionDirective) -> Result<(), DispatchError> {
        if self.fail_on == Some(action.label()) {
            return Err(DispatchError::Transport("channel offline".to_string()));
        }
        self.delivered
            .lock()
            .expect("dispatch mutex poisoned")
            .push(action.clone());
        Ok(())
    }
}

pub(super) fn build_service(
    classifier: ScriptedClassifier,
    generator: MockGenerator,
) -> (
    TriageService<MemoryRepository, MemoryDispatcher>,
    Arc<MemoryRepository>,
    Arc<MemoryDispatcher>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let dispatcher = Arc::new(MemoryDispatcher::default());
    let service = TriageService::new(
        harness(classifier, generator).engine,
        repository.clone(),
        dispatcher.clone(),
    );
    (service, repository, dispatcher)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

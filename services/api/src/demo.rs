use crate::infra::{
    build_engine, default_checklist, InMemoryTriageRepository, LoggingActionDispatcher,
};
use async_trait::async_trait;
use case_triage::config::{AppConfig, TriageSettings};
use case_triage::error::AppError;
use case_triage::telemetry;
use case_triage::workflows::triage::{
    CaseId, ClassificationRequest, Classifier, ClassifierError, DocumentGenerator,
    GeneratedDocument, GenerationError, GenerationRequest, MemoryAuditSink,
    StaticChecklistProvider, SubmittedDocument, TriageEngine, TriageOutcome, TriageRequest,
    TriageService,
};
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Run a single scenario (a, b, c or d). Defaults to all four.
    #[arg(long)]
    pub(crate) scenario: Option<char>,
    /// Print the detailed markdown report after each summary.
    #[arg(long)]
    pub(crate) detailed: bool,
}

#[derive(Args, Debug)]
pub(crate) struct TriageFileArgs {
    /// JSON file holding a triage request (case_id, documents, optional checklist)
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Checklist CSV overriding TRIAGE_CHECKLIST_PATH
    #[arg(long)]
    pub(crate) checklist: Option<PathBuf>,
    /// Print the stored result as JSON instead of the markdown report
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_triage_file(args: TriageFileArgs) -> Result<(), AppError> {
    let TriageFileArgs {
        input,
        checklist,
        json,
    } = args;

    let mut config = AppConfig::load()?;
    if checklist.is_some() {
        config.triage.checklist_path = checklist;
    }
    telemetry::init(&config.telemetry)?;

    let raw = std::fs::read_to_string(&input)?;
    let request: TriageRequest = serde_json::from_str(&raw)?;

    let service = TriageService::new(
        build_engine(&config)?,
        Arc::new(InMemoryTriageRepository::default()),
        Arc::new(LoggingActionDispatcher::default()),
    );
    let outcome = service.triage(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    } else {
        print!("{}", outcome.report.detailed);
    }
    Ok(())
}

/// Scripted reply for one checklist item.
#[derive(Debug, Clone)]
enum Scripted {
    Filename(&'static str),
    NoMatch,
    TimedOut,
}

/// Classifier that answers from a per-item table, standing in for the model.
#[derive(Default)]
struct ScriptedClassifier {
    replies: HashMap<&'static str, Scripted>,
}

impl ScriptedClassifier {
    fn with(mut self, item: &'static str, reply: Scripted) -> Self {
        self.replies.insert(item, reply);
        self
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifierError> {
        match self.replies.get(request.item.name.as_str()) {
            Some(Scripted::Filename(name)) => Ok(format!(r#"{{"filename": "{name}"}}"#)),
            Some(Scripted::TimedOut) => Err(ClassifierError::Timeout(Duration::from_secs(2))),
            Some(Scripted::NoMatch) | None => Ok(r#"{"filename": null}"#.to_string()),
        }
    }
}

/// Registry lookup that always succeeds with a deterministic reference.
struct RegistryGenerator;

#[async_trait]
impl DocumentGenerator for RegistryGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedDocument, GenerationError> {
        Ok(GeneratedDocument {
            reference: format!(
                "https://registry.example/{}/{}.pdf",
                request.document_type, request.identifying_code
            ),
            filename: format!("{}_{}.pdf", request.document_type, request.identifying_code),
        })
    }
}

struct Scenario {
    key: char,
    title: &'static str,
    documents: Vec<SubmittedDocument>,
    classifier: ScriptedClassifier,
}

fn document(filename: &str, excerpt: &str) -> SubmittedDocument {
    SubmittedDocument {
        filename: filename.to_string(),
        content_excerpt: excerpt.to_string(),
    }
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            key: 'a',
            title: "registration card missing, tax id in the contract",
            documents: vec![document(
                "contrato.pdf",
                "CONTRATO SOCIAL DA EMPRESA EXEMPLO LTDA, CNPJ 12.345.678/0001-99",
            )],
            classifier: ScriptedClassifier::default()
                .with("ContratoSocial", Scripted::Filename("contrato.pdf"))
                .with("CartaoCNPJ", Scripted::NoMatch)
                .with("ComprovanteEndereco", Scripted::NoMatch),
        },
        Scenario {
            key: 'b',
            title: "registration card missing, no tax id on file",
            documents: vec![document("contrato.pdf", "CONTRATO SOCIAL DA EMPRESA")],
            classifier: ScriptedClassifier::default()
                .with("ContratoSocial", Scripted::Filename("contrato.pdf"))
                .with("CartaoCNPJ", Scripted::NoMatch),
        },
        Scenario {
            key: 'c',
            title: "complete submission",
            documents: vec![
                document("contrato.pdf", "CONTRATO SOCIAL DA EMPRESA EXEMPLO LTDA"),
                document("cartao.pdf", "COMPROVANTE DE INSCRICAO E SITUACAO CADASTRAL"),
                document("conta_luz.pdf", "FATURA DE ENERGIA ELETRICA"),
            ],
            classifier: ScriptedClassifier::default()
                .with("ContratoSocial", Scripted::Filename("contrato.pdf"))
                .with("CartaoCNPJ", Scripted::Filename("cartao.pdf"))
                .with("ComprovanteEndereco", Scripted::Filename("conta_luz.pdf")),
        },
        Scenario {
            key: 'd',
            title: "classifier times out for the contract",
            documents: vec![
                document("contrato.pdf", "CONTRATO SOCIAL"),
                document("cartao.pdf", "COMPROVANTE DE INSCRICAO"),
            ],
            classifier: ScriptedClassifier::default()
                .with("ContratoSocial", Scripted::TimedOut)
                .with("CartaoCNPJ", Scripted::Filename("cartao.pdf")),
        },
    ]
}

fn demo_settings() -> TriageSettings {
    TriageSettings {
        match_attempts: 2,
        match_timeout: Duration::from_secs(2),
        retry_backoff: Duration::from_millis(10),
        generation_timeout: Duration::from_secs(2),
        ..TriageSettings::default()
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { scenario, detailed } = args;
    let selected = scenario.map(|key| key.to_ascii_lowercase());
    let settings = demo_settings();

    println!("Case triage demo (scripted classifier and registry)");
    for scenario in scenarios()
        .into_iter()
        .filter(|scenario| selected.map_or(true, |key| key == scenario.key))
    {
        println!(
            "\nScenario {}: {}",
            scenario.key.to_ascii_uppercase(),
            scenario.title
        );
        let outcome = run_scenario(scenario, &settings).await?;
        print_outcome(&outcome, detailed);
    }
    Ok(())
}

async fn run_scenario(
    scenario: Scenario,
    settings: &TriageSettings,
) -> Result<TriageOutcome, AppError> {
    let engine = TriageEngine::new(
        Arc::new(StaticChecklistProvider::new(default_checklist()?)),
        Arc::new(scenario.classifier),
        Arc::new(RegistryGenerator),
        Arc::new(MemoryAuditSink::default()),
        settings,
    );
    let service = TriageService::new(
        engine,
        Arc::new(InMemoryTriageRepository::default()),
        Arc::new(LoggingActionDispatcher::default()),
    );

    let request = TriageRequest {
        case_id: CaseId(format!("demo-{}", scenario.key)),
        documents: scenario.documents,
        checklist: None,
    };
    Ok(service.triage(request).await?)
}

fn print_outcome(outcome: &TriageOutcome, detailed: bool) {
    print!("{}", outcome.report.summary);
    println!("Actions:");
    for action in &outcome.result.actions {
        println!("  - {}", action.label());
    }
    if !outcome.result.warnings.is_empty() {
        println!("Warnings: {}", outcome.result.warnings.len());
    }
    println!(
        "Dispatched {} of {} directives",
        outcome.dispatch.delivered,
        outcome.result.actions.len()
    );
    if detailed {
        println!();
        print!("{}", outcome.report.detailed);
    }
}

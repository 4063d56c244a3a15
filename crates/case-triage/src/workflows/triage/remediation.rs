use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::audit::{AuditEntry, AuditSink, RemediationOutcomeKind};
use super::domain::{
    CaseId, ChecklistItem, GeneratedDocumentRef, MatchResult, MatchSource, SubmittedDocument,
    TriageWarning,
};
use crate::config::TriageSettings;

/// Request for a synthesized document. Generation is idempotent per identifying code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub case_id: CaseId,
    pub identifying_code: String,
    pub document_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub reference: String,
    pub filename: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("document generation unavailable: {0}")]
    Transient(String),
    #[error("document generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("document generation rejected: {0}")]
    Rejected(String),
}

/// External enrichment capability that synthesizes a missing registration document.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedDocument, GenerationError>;
}

/// Which checklist item the resolver may synthesize, matched on item name or category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationRule {
    pub item_name: String,
    pub document_type: String,
}

impl RemediationRule {
    pub fn new(item_name: impl Into<String>) -> Self {
        let item_name = item_name.into();
        let document_type = fold_name(&item_name);
        Self {
            item_name,
            document_type,
        }
    }

    pub fn applies_to(&self, item: &ChecklistItem) -> bool {
        let wanted = fold_name(&self.item_name);
        fold_name(&item.name) == wanted || fold_name(&item.category) == wanted
    }
}

/// Record of the single remediation attempt of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAttempt {
    pub item_name: String,
    pub identifying_code: Option<String>,
    pub outcome: RemediationOutcomeKind,
    pub detail: Option<String>,
}

/// Outcome of remediating one item: the replacement match result and its trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Remediation {
    pub result: MatchResult,
    pub warning: Option<TriageWarning>,
    pub attempt: RemediationAttempt,
}

/// Synthesizes the registration certificate when it is missing but its tax id
/// appears in another document. The generator is never retried.
pub struct RemediationResolver {
    generator: Arc<dyn DocumentGenerator>,
    rule: RemediationRule,
    timeout: Duration,
}

impl RemediationResolver {
    pub fn new(
        generator: Arc<dyn DocumentGenerator>,
        rule: RemediationRule,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            rule,
            timeout,
        }
    }

    pub fn from_settings(
        generator: Arc<dyn DocumentGenerator>,
        settings: &TriageSettings,
    ) -> Self {
        Self::new(
            generator,
            RemediationRule::new(settings.registration_item.clone()),
            settings.generation_timeout,
        )
    }

    pub fn rule(&self) -> &RemediationRule {
        &self.rule
    }

    /// A mandatory item covered by the rule that ended up without a document.
    pub fn eligible(&self, result: &MatchResult) -> bool {
        result.item.mandatory
            && result.source == MatchSource::Absent
            && self.rule.applies_to(&result.item)
    }

    /// Attempt remediation for `original`. Callers guarantee one call per run.
    pub async fn remediate(
        &self,
        case_id: &CaseId,
        original: &MatchResult,
        documents: &[SubmittedDocument],
        audit: &dyn AuditSink,
    ) -> Remediation {
        let item = original.item.clone();

        let Some(code) = locate_identifying_code(documents) else {
            info!(case_id = %case_id, item = %item.name, "no identifying code found; remediation skipped");
            let attempt = RemediationAttempt {
                item_name: item.name.clone(),
                identifying_code: None,
                outcome: RemediationOutcomeKind::NoIdentifyingCode,
                detail: None,
            };
            record(audit, case_id, &attempt);
            return Remediation {
                result: original.clone(),
                warning: None,
                attempt,
            };
        };

        let request = GenerationRequest {
            case_id: case_id.clone(),
            identifying_code: code.clone(),
            document_type: self.rule.document_type.clone(),
        };

        let outcome =
            match tokio::time::timeout(self.timeout, self.generator.generate(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(GenerationError::Timeout(self.timeout)),
            };

        let remediation = match outcome {
            Ok(generated) => {
                info!(
                    case_id = %case_id,
                    item = %item.name,
                    reference = %generated.reference,
                    "registration document generated"
                );
                let attempt = RemediationAttempt {
                    item_name: item.name.clone(),
                    identifying_code: Some(code.clone()),
                    outcome: RemediationOutcomeKind::Generated,
                    detail: Some(generated.reference.clone()),
                };
                let document = SubmittedDocument {
                    filename: generated.filename,
                    content_excerpt: format!("Generated from registry lookup for {code}"),
                };
                let trace = GeneratedDocumentRef {
                    identifier: code,
                    reference: generated.reference,
                };
                Remediation {
                    result: MatchResult::auto_generated(item, document, trace),
                    warning: None,
                    attempt,
                }
            }
            Err(error) => {
                warn!(case_id = %case_id, item = %item.name, %error, "document generation failed");
                let attempt = RemediationAttempt {
                    item_name: item.name.clone(),
                    identifying_code: Some(code),
                    outcome: RemediationOutcomeKind::Failed,
                    detail: Some(error.to_string()),
                };
                Remediation {
                    result: original.clone(),
                    warning: Some(TriageWarning::RemediationFailed {
                        item_name: item.name,
                        detail: error.to_string(),
                    }),
                    attempt,
                }
            }
        };

        record(audit, case_id, &remediation.attempt);
        remediation
    }
}

fn record(audit: &dyn AuditSink, case_id: &CaseId, attempt: &RemediationAttempt) {
    audit.record(AuditEntry::RemediationAttempt {
        case_id: case_id.clone(),
        item_name: attempt.item_name.clone(),
        identifying_code: attempt.identifying_code.clone(),
        outcome: attempt.outcome,
        reference_or_error: attempt.detail.clone(),
    });
}

fn cnpj_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{2})\.?([0-9]{3})\.?([0-9]{3})/?([0-9]{4})-?([0-9]{2})")
            .expect("CNPJ pattern compiles")
    })
}

/// Find the first CNPJ in the documents' text, normalized to 14 digits.
pub fn locate_identifying_code(documents: &[SubmittedDocument]) -> Option<String> {
    documents.iter().find_map(|document| {
        let text = document.content_excerpt.as_str();
        cnpj_pattern()
            .captures_iter(text)
            .filter(|captures| {
                let end = captures.get(0).map_or(text.len(), |whole| whole.end());
                !text[end..].starts_with(|c: char| c.is_ascii_digit())
            })
            .map(|captures| {
                captures
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|group| group.as_str())
                    .collect::<String>()
            })
            .find(|digits| !is_repeated_digit(digits))
    })
}

fn is_repeated_digit(digits: &str) -> bool {
    let mut chars = digits.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}

/// Compatibility-decomposes, strips combining marks, keeps letters and digits, lowercases.
fn fold_name(value: &str) -> String {
    value
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

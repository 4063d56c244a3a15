//! Document matching through a pluggable semantic classifier.
//!
//! Every decision goes through the classifier: there is no filename or keyword
//! shortcut. The composed prompt, the raw reply, and the resolved decision are
//! all written to the audit sink.

mod prompt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::audit::{AuditEntry, AuditSink};
use super::domain::{
    CaseId, ChecklistItem, MatchResult, MatchSource, SubmittedDocument, TriageWarning,
};
use crate::config::TriageSettings;

use prompt::{bound_excerpt, compose_prompt, parse_reply, Reply};

/// A submitted document as the classifier sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub filename: String,
    pub excerpt: String,
}

/// Input for one semantic decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub case_id: CaseId,
    pub item: ChecklistItem,
    pub candidates: Vec<Candidate>,
    pub prompt: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Transient(String),
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
    #[error("classifier rejected the request: {0}")]
    Rejected(String),
}

impl ClassifierError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClassifierError::Transient(_) | ClassifierError::Timeout(_)
        )
    }
}

/// The semantic decision step. Implementations return the model's raw reply;
/// the matcher owns parsing and validation.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifierError>;
}

/// Retry, timeout, and fan-out bounds for the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
    pub excerpt_chars: usize,
    pub max_concurrency: usize,
}

impl Default for MatcherPolicy {
    fn default() -> Self {
        Self::from(&TriageSettings::default())
    }
}

impl From<&TriageSettings> for MatcherPolicy {
    fn from(settings: &TriageSettings) -> Self {
        Self {
            max_attempts: settings.match_attempts.max(1),
            timeout: settings.match_timeout,
            backoff: settings.retry_backoff,
            excerpt_chars: settings.excerpt_chars,
            max_concurrency: settings.max_concurrency.max(1),
        }
    }
}

/// Result for one checklist item plus any data-quality note it raised.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMatch {
    pub result: MatchResult,
    pub warning: Option<TriageWarning>,
}

pub struct DocumentMatcher {
    classifier: Arc<dyn Classifier>,
    policy: MatcherPolicy,
    limiter: Arc<Semaphore>,
}

impl DocumentMatcher {
    /// The semaphore is shared by every run using this matcher, so the bound
    /// applies to the classifier service as a whole.
    pub fn new(classifier: Arc<dyn Classifier>, policy: MatcherPolicy) -> Self {
        let limiter = Arc::new(Semaphore::new(policy.max_concurrency.max(1)));
        Self {
            classifier,
            policy,
            limiter,
        }
    }

    pub fn policy(&self) -> &MatcherPolicy {
        &self.policy
    }

    /// Decide one item. Never fails: service trouble degrades to no match.
    pub async fn match_item(
        &self,
        case_id: &CaseId,
        item: &ChecklistItem,
        documents: &[SubmittedDocument],
        audit: &dyn AuditSink,
    ) -> ItemMatch {
        let candidates: Vec<Candidate> = documents
            .iter()
            .map(|document| Candidate {
                filename: document.filename.clone(),
                excerpt: bound_excerpt(&document.content_excerpt, self.policy.excerpt_chars),
            })
            .collect();
        let considered: Vec<String> = candidates.iter().map(|c| c.filename.clone()).collect();

        if candidates.is_empty() {
            audit.record(AuditEntry::MatchDecision {
                case_id: case_id.clone(),
                item_name: item.name.clone(),
                candidates_considered: considered,
                prompt: None,
                raw_response: None,
                decision: "no_candidates".to_string(),
                source: MatchSource::Absent,
                attempts: 0,
            });
            return ItemMatch {
                result: MatchResult::absent(item.clone()),
                warning: None,
            };
        }

        let request = ClassificationRequest {
            case_id: case_id.clone(),
            item: item.clone(),
            prompt: compose_prompt(item, &candidates),
            candidates,
        };

        let (reply, attempts) = self.classify_with_retry(&request).await;

        let (result, warning, decision, raw_response) = match reply {
            Ok(raw) => {
                let (result, warning, decision) = resolve(item, documents, &raw);
                (result, warning, decision, Some(raw))
            }
            Err(error) => {
                warn!(
                    case_id = %case_id,
                    item = %item.name,
                    attempts,
                    %error,
                    "classifier unavailable; item degraded to no match"
                );
                let warning = TriageWarning::ClassifierUnavailable {
                    item_name: item.name.clone(),
                    attempts,
                    detail: error.to_string(),
                };
                (
                    MatchResult::absent(item.clone()),
                    Some(warning),
                    format!("degraded: {error}"),
                    None,
                )
            }
        };

        audit.record(AuditEntry::MatchDecision {
            case_id: case_id.clone(),
            item_name: item.name.clone(),
            candidates_considered: considered,
            prompt: Some(request.prompt),
            raw_response,
            decision,
            source: result.source,
            attempts,
        });

        ItemMatch { result, warning }
    }

    async fn classify_with_retry(
        &self,
        request: &ClassificationRequest,
    ) -> (Result<String, ClassifierError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let outcome = {
                let _permit = match self.limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            Err(ClassifierError::Transient("rate limiter closed".to_string())),
                            attempt,
                        )
                    }
                };
                match tokio::time::timeout(self.policy.timeout, self.classifier.classify(request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ClassifierError::Timeout(self.policy.timeout)),
                }
            };

            match outcome {
                Ok(raw) => return (Ok(raw), attempt),
                Err(error) if error.is_retryable() && attempt < self.policy.max_attempts => {
                    debug!(
                        item = %request.item.name,
                        attempt,
                        %error,
                        "retrying classification"
                    );
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                }
                Err(error) => return (Err(error), attempt),
            }
        }
    }
}

fn resolve(
    item: &ChecklistItem,
    documents: &[SubmittedDocument],
    raw: &str,
) -> (MatchResult, Option<TriageWarning>, String) {
    match parse_reply(raw) {
        Reply::NoMatch => (
            MatchResult::absent(item.clone()),
            None,
            "no_match".to_string(),
        ),
        Reply::Filename(name) => match documents.iter().find(|doc| doc.filename == name) {
            Some(document) => (
                MatchResult::matched(item.clone(), document.clone()),
                None,
                format!("matched: {name}"),
            ),
            None => {
                warn!(item = %item.name, named = %name, "classifier named a document outside the candidate set");
                let decision = format!("unknown_candidate: {name}");
                (
                    MatchResult::absent(item.clone()),
                    Some(TriageWarning::UnknownCandidate {
                        item_name: item.name.clone(),
                        named: name,
                    }),
                    decision,
                )
            }
        },
        Reply::Unreadable => {
            warn!(item = %item.name, "classifier reply could not be read");
            (
                MatchResult::absent(item.clone()),
                Some(TriageWarning::UnknownCandidate {
                    item_name: item.name.clone(),
                    named: raw.trim().chars().take(120).collect(),
                }),
                "unreadable_reply".to_string(),
            )
        }
    }
}

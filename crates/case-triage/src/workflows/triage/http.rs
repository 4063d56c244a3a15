//! HTTP adapters for the classifier and document generator collaborators.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::matcher::{ClassificationRequest, Classifier, ClassifierError};
use super::remediation::{DocumentGenerator, GeneratedDocument, GenerationError, GenerationRequest};
use crate::config::{IntegrationConfig, TriageSettings};

const SYSTEM_PROMPT: &str = "You match submitted business registration documents to checklist \
items. Reply with JSON only.";

/// OpenAI-compatible chat-completions classifier.
pub struct ChatCompletionsClassifier {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsClassifier {
    pub fn new(
        integrations: &IntegrationConfig,
        settings: &TriageSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.match_timeout).build()?;
        Ok(Self {
            client,
            url: integrations.classifier_url.clone(),
            api_key: integrations.classifier_api_key.clone(),
            model: integrations.classifier_model.clone(),
            timeout: settings.match_timeout,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Classifier for ChatCompletionsClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifierError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.1,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        debug!(case_id = %request.case_id, item = %request.item.name, model = %self.model, "calling classifier");

        let mut call = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|error| {
            if error.is_timeout() {
                ClassifierError::Timeout(self.timeout)
            } else {
                ClassifierError::Transient(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(if is_retryable_status(status) {
                ClassifierError::Transient(format!("{status}: {detail}"))
            } else {
                ClassifierError::Rejected(format!("{status}: {detail}"))
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| ClassifierError::Transient(format!("unreadable response: {error}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Transient("response carried no choices".to_string()))
    }
}

/// Enrichment backend that builds the registration certificate from a tax id.
pub struct EnrichmentApiGenerator {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl EnrichmentApiGenerator {
    pub fn new(
        integrations: &IntegrationConfig,
        settings: &TriageSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(settings.generation_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/api/v1/cliente/enriquecer",
                integrations.ingestion_url.trim_end_matches('/')
            ),
            timeout: settings.generation_timeout,
        })
    }
}

#[derive(Serialize)]
struct EnrichmentRequest<'a> {
    cnpj: &'a str,
    case_id: &'a str,
}

#[derive(Deserialize)]
struct EnrichmentResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    document_url: Option<String>,
}

#[async_trait]
impl DocumentGenerator for EnrichmentApiGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedDocument, GenerationError> {
        let body = EnrichmentRequest {
            cnpj: &request.identifying_code,
            case_id: request.case_id.as_str(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Transient(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(if is_retryable_status(status) {
                GenerationError::Transient(format!("{status}: {detail}"))
            } else {
                GenerationError::Rejected(format!("{status}: {detail}"))
            });
        }

        let parsed: EnrichmentResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Transient(format!("unreadable response: {error}")))?;

        if !parsed.success {
            return Err(GenerationError::Rejected(
                parsed
                    .message
                    .unwrap_or_else(|| "enrichment reported failure".to_string()),
            ));
        }

        let reference = parsed
            .document_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| GenerationError::Rejected("no document url returned".to_string()))?;

        Ok(GeneratedDocument {
            reference,
            filename: format!("{}_{}.pdf", request.document_type, request.identifying_code),
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const MAX_DEADLINE_DAYS: i64 = 365;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub triage: TriageSettings,
    pub integrations: IntegrationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let include_targets = parse_flag("APP_LOG_TARGETS", true)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                include_targets,
            },
            triage: TriageSettings::from_env()?,
            integrations: IntegrationConfig::from_env(),
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub include_targets: bool,
}

/// Knobs for a triage run: fan-out bounds, retry policy, timeouts, and the
/// workflow vocabulary the action plan speaks.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageSettings {
    pub max_concurrency: usize,
    pub match_attempts: u32,
    pub match_timeout: Duration,
    pub retry_backoff: Duration,
    pub excerpt_chars: usize,
    pub generation_timeout: Duration,
    pub approved_phase: String,
    pub pending_review_phase: String,
    pub reviewer_channel: String,
    pub deadline_days: i64,
    pub registration_item: String,
    pub checklist_path: Option<PathBuf>,
    pub checklist_ttl: Duration,
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            match_attempts: 3,
            match_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(250),
            excerpt_chars: 500,
            generation_timeout: Duration::from_secs(60),
            approved_phase: "approved".to_string(),
            pending_review_phase: "pending_review".to_string(),
            reviewer_channel: "gestor_comercial".to_string(),
            deadline_days: 5,
            registration_item: "CartaoCNPJ".to_string(),
            checklist_path: None,
            checklist_ttl: Duration::from_secs(1800),
        }
    }
}

impl TriageSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_concurrency = parse_var("TRIAGE_MAX_CONCURRENCY", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(ConfigError::OutOfRange {
                name: "TRIAGE_MAX_CONCURRENCY",
                allowed: "at least 1",
            });
        }
        let match_attempts = parse_var("TRIAGE_MATCH_ATTEMPTS", defaults.match_attempts)?;
        if match_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                name: "TRIAGE_MATCH_ATTEMPTS",
                allowed: "at least 1",
            });
        }
        let deadline_days = parse_var("TRIAGE_DEADLINE_DAYS", defaults.deadline_days)?;
        if !(0..=MAX_DEADLINE_DAYS).contains(&deadline_days) {
            return Err(ConfigError::OutOfRange {
                name: "TRIAGE_DEADLINE_DAYS",
                allowed: "between 0 and 365",
            });
        }

        Ok(Self {
            max_concurrency,
            match_attempts,
            match_timeout: Duration::from_secs(parse_var(
                "TRIAGE_MATCH_TIMEOUT_SECS",
                defaults.match_timeout.as_secs(),
            )?),
            retry_backoff: Duration::from_millis(parse_var(
                "TRIAGE_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
            excerpt_chars: parse_var("TRIAGE_EXCERPT_CHARS", defaults.excerpt_chars)?,
            generation_timeout: Duration::from_secs(parse_var(
                "TRIAGE_GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout.as_secs(),
            )?),
            approved_phase: env::var("TRIAGE_APPROVED_PHASE").unwrap_or(defaults.approved_phase),
            pending_review_phase: env::var("TRIAGE_PENDING_REVIEW_PHASE")
                .unwrap_or(defaults.pending_review_phase),
            reviewer_channel: env::var("TRIAGE_REVIEWER_CHANNEL")
                .unwrap_or(defaults.reviewer_channel),
            deadline_days,
            registration_item: env::var("TRIAGE_REGISTRATION_ITEM")
                .unwrap_or(defaults.registration_item),
            checklist_path: env::var("TRIAGE_CHECKLIST_PATH").ok().map(PathBuf::from),
            checklist_ttl: Duration::from_secs(parse_var(
                "TRIAGE_CHECKLIST_TTL_SECS",
                defaults.checklist_ttl.as_secs(),
            )?),
        })
    }
}

/// Endpoints for the semantic classifier and the enrichment backend.
#[derive(Clone)]
pub struct IntegrationConfig {
    pub classifier_url: String,
    pub classifier_api_key: Option<String>,
    pub classifier_model: String,
    pub ingestion_url: String,
}

impl IntegrationConfig {
    fn from_env() -> Self {
        Self {
            classifier_url: env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            classifier_api_key: env::var("CLASSIFIER_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            classifier_model: env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ingestion_url: env::var("DOCUMENT_INGESTION_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
        }
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("classifier_url", &self.classifier_url)
            .field(
                "classifier_api_key",
                &self.classifier_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("classifier_model", &self.classifier_model)
            .field("ingestion_url", &self.ingestion_url)
            .finish()
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    InvalidFlag { name: &'static str },
    OutOfRange {
        name: &'static str,
        allowed: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => write!(f, "{name} must be a number"),
            ConfigError::InvalidFlag { name } => write!(f, "{name} must be true or false"),
            ConfigError::OutOfRange { name, allowed } => write!(f, "{name} must be {allowed}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

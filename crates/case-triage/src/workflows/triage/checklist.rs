use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::domain::{CaseId, ChecklistItem};

/// Reasons a checklist cannot back a triage run. All of them are fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ChecklistError {
    #[error("checklist has no items")]
    Empty,
    #[error("checklist item '{0}' is declared more than once")]
    DuplicateItem(String),
    #[error("checklist item at position {0} has a blank name")]
    BlankName(usize),
    #[error("checklist source unavailable: {0}")]
    Unavailable(String),
    #[error("invalid checklist CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to read checklist file: {0}")]
    Io(#[from] std::io::Error),
}

/// Validated, immutable snapshot of the required items in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checklist {
    items: Vec<ChecklistItem>,
}

impl Checklist {
    pub fn new(items: Vec<ChecklistItem>) -> Result<Self, ChecklistError> {
        if items.is_empty() {
            return Err(ChecklistError::Empty);
        }

        let mut seen = HashSet::new();
        for (position, item) in items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(ChecklistError::BlankName(position));
            }
            if !seen.insert(item.name.as_str()) {
                return Err(ChecklistError::DuplicateItem(item.name.clone()));
            }
        }

        Ok(Self { items })
    }

    /// Parse `name,mandatory,category` rows.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, ChecklistError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut items = Vec::new();
        for row in csv_reader.deserialize::<ChecklistRow>() {
            let row = row?;
            items.push(ChecklistItem {
                name: row.name,
                mandatory: row.mandatory,
                category: row.category,
            });
        }

        Self::new(items)
    }

    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn mandatory(&self) -> impl Iterator<Item = &ChecklistItem> {
        self.items.iter().filter(|item| item.mandatory)
    }
}

#[derive(Debug, Deserialize)]
struct ChecklistRow {
    name: String,
    #[serde(deserialize_with = "flag")]
    mandatory: bool,
    #[serde(default)]
    category: String,
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "sim" | "1" | "y" | "s" => Ok(true),
        "false" | "no" | "nao" | "não" | "0" | "n" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "unrecognized mandatory flag '{other}'"
        ))),
    }
}

/// Supplies the checklist snapshot a run is evaluated against.
#[async_trait]
pub trait ChecklistProvider: Send + Sync {
    async fn checklist(&self, case_id: &CaseId) -> Result<Arc<Checklist>, ChecklistError>;
}

/// Serves one fixed snapshot for every case.
#[derive(Debug, Clone)]
pub struct StaticChecklistProvider {
    checklist: Arc<Checklist>,
}

impl StaticChecklistProvider {
    pub fn new(checklist: Checklist) -> Self {
        Self {
            checklist: Arc::new(checklist),
        }
    }
}

#[async_trait]
impl ChecklistProvider for StaticChecklistProvider {
    async fn checklist(&self, _case_id: &CaseId) -> Result<Arc<Checklist>, ChecklistError> {
        Ok(self.checklist.clone())
    }
}

/// Reads the checklist from a CSV file on every call; wrap it in
/// [`CachedChecklistProvider`] to avoid re-reading.
#[derive(Debug, Clone)]
pub struct CsvChecklistProvider {
    path: PathBuf,
}

impl CsvChecklistProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ChecklistProvider for CsvChecklistProvider {
    async fn checklist(&self, _case_id: &CaseId) -> Result<Arc<Checklist>, ChecklistError> {
        let raw = tokio::fs::read(&self.path).await?;
        let checklist = Checklist::from_csv(raw.as_slice())?;
        debug!(path = %self.path.display(), items = checklist.len(), "checklist loaded");
        Ok(Arc::new(checklist))
    }
}

/// Caches the inner provider's snapshot for a fixed lifetime. The lock is never
/// held while the inner provider is awaited.
pub struct CachedChecklistProvider<P> {
    inner: P,
    ttl: Duration,
    cached: Mutex<Option<(Instant, Arc<Checklist>)>>,
}

impl<P> CachedChecklistProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }

    fn fresh(&self) -> Option<Arc<Checklist>> {
        let guard = self.cached.lock().ok()?;
        let fresh = guard
            .as_ref()
            .filter(|(loaded_at, _)| loaded_at.elapsed() < self.ttl)
            .map(|(_, checklist)| checklist.clone());
        fresh
    }
}

#[async_trait]
impl<P> ChecklistProvider for CachedChecklistProvider<P>
where
    P: ChecklistProvider,
{
    async fn checklist(&self, case_id: &CaseId) -> Result<Arc<Checklist>, ChecklistError> {
        if let Some(checklist) = self.fresh() {
            return Ok(checklist);
        }

        let checklist = self.inner.checklist(case_id).await?;
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some((Instant::now(), checklist.clone()));
        }
        Ok(checklist)
    }
}

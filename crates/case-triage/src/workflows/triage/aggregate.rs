use chrono::{DateTime, Days, Utc};

use super::domain::{CaseStatus, MatchResult, MatchSource, Pendency, PendencyKind};
use crate::config::TriageSettings;

/// Pendencies in checklist order together with the case verdict they imply.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub pendencies: Vec<Pendency>,
    pub overall_status: CaseStatus,
}

/// Turns per-item match results into pendencies and a case-level status.
///
/// Every result is visited; a blocking item never short-circuits the rest.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    deadline_days: i64,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::from_settings(&TriageSettings::default())
    }
}

impl StatusAggregator {
    pub fn new(deadline_days: i64) -> Self {
        Self { deadline_days }
    }

    pub fn from_settings(settings: &TriageSettings) -> Self {
        Self::new(settings.deadline_days)
    }

    pub fn aggregate(&self, results: &[MatchResult], generated_at: DateTime<Utc>) -> Aggregation {
        let pendencies = self.pendencies(results, generated_at);
        let overall_status = CaseStatus::from_pendencies(&pendencies);
        Aggregation {
            pendencies,
            overall_status,
        }
    }

    pub fn pendencies(&self, results: &[MatchResult], generated_at: DateTime<Utc>) -> Vec<Pendency> {
        let deadline = self.deadline(generated_at);
        results
            .iter()
            .filter_map(|result| pendency_for(result, deadline.as_deref()))
            .collect()
    }

    /// `None` when the offset is negative or runs past the calendar.
    fn deadline(&self, generated_at: DateTime<Utc>) -> Option<String> {
        let days = u64::try_from(self.deadline_days).ok()?;
        let due = generated_at.date_naive().checked_add_days(Days::new(days))?;
        Some(due.format("%Y-%m-%d").to_string())
    }
}

fn pendency_for(result: &MatchResult, deadline: Option<&str>) -> Option<Pendency> {
    let item = &result.item;
    match (result.source, result.matched_document.as_ref()) {
        (MatchSource::Ai, Some(_)) => None,
        (MatchSource::AutoGenerated, Some(document)) => {
            let identifier = result
                .generated
                .as_ref()
                .map(|generated| generated.identifier.as_str())
                .unwrap_or("unknown");
            Some(Pendency {
                kind: PendencyKind::NonBlocking,
                item_name: item.name.clone(),
                category: item.category.clone(),
                description: format!(
                    "{} was missing and was generated automatically from the registry (tax id {identifier}) as {}",
                    item.name, document.filename
                ),
                required_action: format!("Confirm the generated {} before approval", item.name),
                suggested_deadline: None,
                generated: result.generated.clone(),
            })
        }
        _ if item.mandatory => Some(Pendency {
            kind: PendencyKind::Blocking,
            item_name: item.name.clone(),
            category: item.category.clone(),
            description: format!(
                "Mandatory document {} was not found among the submitted documents",
                item.name
            ),
            required_action: format!("Request {} from the client", item.name),
            suggested_deadline: deadline.map(str::to_string),
            generated: None,
        }),
        _ => Some(Pendency {
            kind: PendencyKind::NonBlocking,
            item_name: item.name.clone(),
            category: item.category.clone(),
            description: format!("Optional document {} was not submitted", item.name),
            required_action: format!("Ask the client for {} if available", item.name),
            suggested_deadline: deadline.map(str::to_string),
            generated: None,
        }),
    }
}

use super::domain::{ActionDirective, CaseStatus, Pendency};
use crate::config::TriageSettings;

/// Builds the ordered directive list for a case. Pure over `(status, pendencies)`:
/// generation records first, then the reviewer notification, then at most one
/// card move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlanBuilder {
    approved_phase: String,
    pending_review_phase: String,
    reviewer_channel: String,
}

impl Default for ActionPlanBuilder {
    fn default() -> Self {
        Self::from_settings(&TriageSettings::default())
    }
}

impl ActionPlanBuilder {
    pub fn new(
        approved_phase: impl Into<String>,
        pending_review_phase: impl Into<String>,
        reviewer_channel: impl Into<String>,
    ) -> Self {
        Self {
            approved_phase: approved_phase.into(),
            pending_review_phase: pending_review_phase.into(),
            reviewer_channel: reviewer_channel.into(),
        }
    }

    pub fn from_settings(settings: &TriageSettings) -> Self {
        Self::new(
            settings.approved_phase.clone(),
            settings.pending_review_phase.clone(),
            settings.reviewer_channel.clone(),
        )
    }

    pub fn build(&self, status: CaseStatus, pendencies: &[Pendency]) -> Vec<ActionDirective> {
        let mut actions: Vec<ActionDirective> = pendencies
            .iter()
            .filter_map(|pendency| {
                let generated = pendency.generated.as_ref()?;
                Some(ActionDirective::GenerateDocument {
                    document_type: pendency.item_name.clone(),
                    identifier: generated.identifier.clone(),
                    reason: format!(
                        "{} missing; generated from registry lookup at {}",
                        pendency.item_name, generated.reference
                    ),
                })
            })
            .collect();

        match status {
            CaseStatus::Approved => {
                actions.push(ActionDirective::MoveCard {
                    target_phase: self.approved_phase.clone(),
                });
            }
            CaseStatus::BlockingPending => {
                let blocking: Vec<&Pendency> =
                    pendencies.iter().filter(|p| p.is_blocking()).collect();
                actions.push(self.notify("blocking", &blocking));
            }
            CaseStatus::NonBlockingPending => {
                let pending: Vec<&Pendency> = pendencies.iter().collect();
                actions.push(self.notify("non-blocking", &pending));
                actions.push(ActionDirective::MoveCard {
                    target_phase: self.pending_review_phase.clone(),
                });
            }
        }

        actions
    }

    fn notify(&self, severity: &str, pendencies: &[&Pendency]) -> ActionDirective {
        let names: Vec<&str> = pendencies.iter().map(|p| p.item_name.as_str()).collect();
        ActionDirective::NotifyChannel {
            recipient: self.reviewer_channel.clone(),
            message: format!(
                "{} {severity} pendenc{}: {}",
                names.len(),
                if names.len() == 1 { "y" } else { "ies" },
                names.join(", ")
            ),
        }
    }
}

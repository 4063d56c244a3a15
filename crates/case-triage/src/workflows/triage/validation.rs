use super::checklist::Checklist;
use super::domain::{CaseStatus, MatchSource, TriageResult};

/// A produced result that must not leave the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("case id is blank")]
    BlankCaseId,
    #[error("expected {expected} item results, found {found}")]
    ItemCount { expected: usize, found: usize },
    #[error("item at position {position} is '{found}', expected '{expected}'")]
    ItemOrder {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("item '{0}' has a source inconsistent with its matched document")]
    InconsistentMatch(String),
    #[error("overall status {declared:?} does not follow from pendencies ({derived:?})")]
    StatusMismatch {
        declared: CaseStatus,
        derived: CaseStatus,
    },
    #[error("{0} card moves planned; at most one is allowed")]
    MultipleMoves(usize),
    #[error("card move is not the last directive")]
    MoveNotLast,
    #[error("card move planned while blocking pendencies exist")]
    MoveWhileBlocked,
}

impl TriageResult {
    /// Check the result against the checklist snapshot it was produced from.
    pub fn validate(&self, checklist: &Checklist) -> Result<(), ValidationError> {
        if self.case_id.as_str().trim().is_empty() {
            return Err(ValidationError::BlankCaseId);
        }

        if self.items.len() != checklist.len() {
            return Err(ValidationError::ItemCount {
                expected: checklist.len(),
                found: self.items.len(),
            });
        }

        for (position, (result, expected)) in self.items.iter().zip(checklist.items()).enumerate() {
            if result.item != *expected {
                return Err(ValidationError::ItemOrder {
                    position,
                    expected: expected.name.clone(),
                    found: result.item.name.clone(),
                });
            }
            let has_document = result.matched_document.is_some();
            let consistent = match result.source {
                MatchSource::Ai => has_document && result.generated.is_none(),
                MatchSource::AutoGenerated => has_document && result.generated.is_some(),
                MatchSource::Absent => !has_document,
            };
            if !consistent {
                return Err(ValidationError::InconsistentMatch(result.item.name.clone()));
            }
        }

        let derived = CaseStatus::from_pendencies(&self.pendencies);
        if derived != self.overall_status {
            return Err(ValidationError::StatusMismatch {
                declared: self.overall_status,
                derived,
            });
        }

        let moves = self.actions.iter().filter(|action| action.is_move_card()).count();
        if moves > 1 {
            return Err(ValidationError::MultipleMoves(moves));
        }
        if moves == 1 {
            if self.blocking().next().is_some() {
                return Err(ValidationError::MoveWhileBlocked);
            }
            if !self.actions.last().is_some_and(|action| action.is_move_card()) {
                return Err(ValidationError::MoveNotLast);
            }
        }

        Ok(())
    }
}

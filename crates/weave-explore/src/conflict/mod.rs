//! Constraint-conflict analysis over a satisfiability oracle.
//!
//! Constraints are split into *background* (assumed correct) and
//! *relaxable*. [`explain::explain_conflict`] finds one minimal conflict
//! among the relaxable constraints; [`diagnose`] finds minimal sets whose
//! removal restores satisfiability.

pub mod diagnose;
pub mod explain;

use std::collections::BTreeSet;

use weave_ir::ConstraintId;

use crate::solver::{OracleError, SatisfiabilityOracle};

pub use diagnose::{first_diagnosis, minimal_diagnoses, DiagnosisLimits, DiagnosisOutcome};
pub use explain::{explain_conflict, ConflictExplanation};

#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("constraint {0} is both background and relaxable")]
    OverlappingPartition(ConstraintId),

    #[error("constraint {0} is listed twice")]
    DuplicateConstraint(ConstraintId),

    #[error("oracle answered inconsistently: {0}")]
    InconsistentOracle(String),
}

/// Reject partitions where a constraint appears twice.
pub(crate) fn check_partition(
    background: &[ConstraintId],
    relaxable: &[ConstraintId],
) -> Result<(), ConflictError> {
    let mut seen = BTreeSet::new();
    for id in background {
        if !seen.insert(*id) {
            return Err(ConflictError::DuplicateConstraint(*id));
        }
    }
    let background_len = seen.len();
    for id in relaxable {
        if !seen.insert(*id) {
            return Err(if background.contains(id) {
                ConflictError::OverlappingPartition(*id)
            } else {
                ConflictError::DuplicateConstraint(*id)
            });
        }
    }
    debug_assert_eq!(seen.len(), background_len + relaxable.len());
    Ok(())
}

/// Satisfiability of the union of several constraint groups.
pub(crate) fn consistent(
    oracle: &mut dyn SatisfiabilityOracle,
    groups: &[&[ConstraintId]],
) -> Result<bool, ConflictError> {
    let active: Vec<ConstraintId> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    Ok(oracle.is_satisfiable(&active, None)?)
}

/// `ids` sorted by their position in `order`.
pub(crate) fn in_input_order(mut ids: Vec<ConstraintId>, order: &[ConstraintId]) -> Vec<ConstraintId> {
    ids.sort_by_key(|id| order.iter().position(|o| o == id));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<ConstraintId> {
        raw.iter().copied().map(ConstraintId).collect()
    }

    #[test]
    fn test_partition_checks() {
        assert!(check_partition(&ids(&[0, 1]), &ids(&[2, 3])).is_ok());
        assert!(matches!(
            check_partition(&ids(&[0, 1]), &ids(&[1])),
            Err(ConflictError::OverlappingPartition(ConstraintId(1)))
        ));
        assert!(matches!(
            check_partition(&ids(&[0]), &ids(&[2, 2])),
            Err(ConflictError::DuplicateConstraint(ConstraintId(2)))
        ));
    }

    #[test]
    fn test_in_input_order() {
        assert_eq!(in_input_order(ids(&[3, 1]), &ids(&[1, 2, 3])), ids(&[1, 3]));
    }
}

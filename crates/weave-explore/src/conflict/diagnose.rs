//! Minimal diagnoses: relaxable constraints whose removal restores
//! satisfiability.
//!
//! [`minimal_diagnoses`] expands a breadth-first hitting-set tree whose
//! node labels are minimal conflicts from the explainer. Known conflicts
//! are reused when disjoint from the node's path, and paths containing a
//! found diagnosis are pruned. [`first_diagnosis`] runs FastDiag for a
//! single diagnosis without computing conflicts.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use weave_ir::ConstraintId;

use super::explain::{explain_conflict, ConflictExplanation};
use super::{check_partition, consistent, in_input_order, ConflictError};
use crate::solver::SatisfiabilityOracle;

/// Work budgets for the hitting-set tree. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisLimits {
    pub max_diagnoses: usize,
    /// Largest diagnosis size explored.
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "diagnoses", rename_all = "snake_case")]
pub enum DiagnosisOutcome {
    /// Nothing to repair.
    Consistent,
    /// The background alone is unsatisfiable.
    InherentConflict,
    /// Minimal diagnoses in discovery order, each in input order.
    Diagnoses(Vec<Vec<ConstraintId>>),
}

pub fn minimal_diagnoses(
    oracle: &mut dyn SatisfiabilityOracle,
    background: &[ConstraintId],
    relaxable: &[ConstraintId],
    limits: DiagnosisLimits,
) -> Result<DiagnosisOutcome, ConflictError> {
    let root = match explain_conflict(oracle, background, relaxable)? {
        ConflictExplanation::Consistent => return Ok(DiagnosisOutcome::Consistent),
        ConflictExplanation::InherentConflict => return Ok(DiagnosisOutcome::InherentConflict),
        ConflictExplanation::Conflict(conflict) => conflict,
    };

    let mut conflicts: Vec<Vec<ConstraintId>> = vec![root];
    let mut diagnoses: Vec<BTreeSet<ConstraintId>> = Vec::new();
    let mut visited: BTreeSet<BTreeSet<ConstraintId>> = BTreeSet::new();
    let mut queue: VecDeque<BTreeSet<ConstraintId>> = VecDeque::from([BTreeSet::new()]);

    while let Some(path) = queue.pop_front() {
        if diagnoses.iter().any(|d| d.is_subset(&path)) {
            continue;
        }

        let reused = conflicts
            .iter()
            .find(|c| c.iter().all(|id| !path.contains(id)))
            .cloned();
        let conflict = match reused {
            Some(conflict) => conflict,
            None => {
                let remaining: Vec<ConstraintId> = relaxable
                    .iter()
                    .copied()
                    .filter(|id| !path.contains(id))
                    .collect();
                match explain_conflict(oracle, background, &remaining)? {
                    ConflictExplanation::Consistent => {
                        debug!(size = path.len(), "diagnosis found");
                        diagnoses.push(path);
                        if limits.max_diagnoses > 0 && diagnoses.len() >= limits.max_diagnoses {
                            break;
                        }
                        continue;
                    }
                    ConflictExplanation::InherentConflict => {
                        return Err(ConflictError::InconsistentOracle(
                            "background became unsatisfiable during diagnosis".to_string(),
                        ));
                    }
                    ConflictExplanation::Conflict(conflict) => {
                        conflicts.push(conflict.clone());
                        conflict
                    }
                }
            }
        };

        if limits.max_depth > 0 && path.len() >= limits.max_depth {
            continue;
        }
        for id in conflict {
            let mut child = path.clone();
            child.insert(id);
            if visited.insert(child.clone()) {
                queue.push_back(child);
            }
        }
    }

    debug!(
        diagnoses = diagnoses.len(),
        conflicts = conflicts.len(),
        "hitting-set tree finished"
    );
    let minimal: Vec<Vec<ConstraintId>> = diagnoses
        .iter()
        .filter(|d| !diagnoses.iter().any(|o| o.len() < d.len() && o.is_subset(d)))
        .map(|d| in_input_order(d.iter().copied().collect(), relaxable))
        .collect();
    Ok(DiagnosisOutcome::Diagnoses(minimal))
}

/// One minimal diagnosis via FastDiag.
pub fn first_diagnosis(
    oracle: &mut dyn SatisfiabilityOracle,
    background: &[ConstraintId],
    relaxable: &[ConstraintId],
) -> Result<DiagnosisOutcome, ConflictError> {
    check_partition(background, relaxable)?;
    if !consistent(oracle, &[background])? {
        return Ok(DiagnosisOutcome::InherentConflict);
    }
    if consistent(oracle, &[background, relaxable])? {
        return Ok(DiagnosisOutcome::Consistent);
    }

    let mut all = background.to_vec();
    all.extend_from_slice(relaxable);
    let diagnosis = fast_diag(oracle, &[], relaxable, &all)?;
    Ok(DiagnosisOutcome::Diagnoses(vec![in_input_order(diagnosis, relaxable)]))
}

fn without(all: &[ConstraintId], removed: &[ConstraintId]) -> Vec<ConstraintId> {
    all.iter().copied().filter(|id| !removed.contains(id)).collect()
}

/// `removed` was just taken out of `all`; `candidates` are the relaxable
/// constraints still in play.
fn fast_diag(
    oracle: &mut dyn SatisfiabilityOracle,
    removed: &[ConstraintId],
    candidates: &[ConstraintId],
    all: &[ConstraintId],
) -> Result<Vec<ConstraintId>, ConflictError> {
    if !removed.is_empty() && consistent(oracle, &[all])? {
        return Ok(vec![]);
    }
    if candidates.len() == 1 {
        return Ok(candidates.to_vec());
    }

    let (first, second) = candidates.split_at(candidates.len() / 2);
    let from_second = fast_diag(oracle, first, second, &without(all, first))?;
    let mut diagnosis = fast_diag(oracle, &from_second, first, &without(all, &from_second))?;
    diagnosis.extend(from_second);
    Ok(diagnosis)
}

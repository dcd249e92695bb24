//! QuickXplain: one minimal conflict by divide and conquer.
//!
//! The result depends only on the order of the relaxable constraints and
//! the oracle's answers, and is returned in input order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use weave_ir::ConstraintId;

use super::{check_partition, consistent, in_input_order, ConflictError};
use crate::solver::SatisfiabilityOracle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "constraints", rename_all = "snake_case")]
pub enum ConflictExplanation {
    /// Background and relaxable constraints are jointly satisfiable.
    Consistent,
    /// The background alone is unsatisfiable; no relaxation can repair it.
    InherentConflict,
    /// A minimal subset of the relaxable constraints that conflicts with the background.
    Conflict(Vec<ConstraintId>),
}

pub fn explain_conflict(
    oracle: &mut dyn SatisfiabilityOracle,
    background: &[ConstraintId],
    relaxable: &[ConstraintId],
) -> Result<ConflictExplanation, ConflictError> {
    check_partition(background, relaxable)?;
    if consistent(oracle, &[background, relaxable])? {
        return Ok(ConflictExplanation::Consistent);
    }
    if !consistent(oracle, &[background])? {
        return Ok(ConflictExplanation::InherentConflict);
    }
    let conflict = quick_xplain(oracle, background.to_vec(), false, relaxable)?;
    debug!(size = conflict.len(), of = relaxable.len(), "minimal conflict found");
    Ok(ConflictExplanation::Conflict(in_input_order(conflict, relaxable)))
}

/// `background` is known consistent unless `added` is set; `candidates`
/// together with `background` is known inconsistent.
fn quick_xplain(
    oracle: &mut dyn SatisfiabilityOracle,
    background: Vec<ConstraintId>,
    added: bool,
    candidates: &[ConstraintId],
) -> Result<Vec<ConstraintId>, ConflictError> {
    if added && !consistent(oracle, &[&background])? {
        return Ok(vec![]);
    }
    if candidates.len() == 1 {
        return Ok(candidates.to_vec());
    }

    let (first, second) = candidates.split_at(candidates.len() / 2);
    let mut with_first = background.clone();
    with_first.extend_from_slice(first);
    let second_part = quick_xplain(oracle, with_first, !first.is_empty(), second)?;

    let mut with_second = background;
    with_second.extend_from_slice(&second_part);
    let mut conflict = quick_xplain(oracle, with_second, !second_part.is_empty(), first)?;

    conflict.extend(second_part);
    Ok(conflict)
}

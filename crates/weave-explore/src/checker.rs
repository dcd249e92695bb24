//! Constraint checking over full and partial combinations.
//!
//! Three checkers share one trait:
//! - [`NoConstraintChecker`]: everything is valid.
//! - [`ForbiddenTupleChecker`]: a combination is invalid iff it contains a
//!   registered hard forbidden tuple.
//! - [`SolverConstraintChecker`]: a combination is invalid iff it cannot be
//!   extended to a full combination satisfying every hard constraint. This
//!   also rejects tuples ruled out only implicitly, by several constraints
//!   together.
//!
//! Error-kind constraints are stored but never enforced.

use std::cell::RefCell;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use weave_ir::types::ModelError;
use weave_ir::{Combination, Constraint, ConstraintId, ConstraintKind, TestModel, TupleError};

use crate::solver::{OracleError, SatisfiabilityOracle, VarisatOracle};

/// Errors raised while checking or mutating constraints.
#[derive(Debug, thiserror::Error)]
pub enum CheckerError {
    #[error("malformed combination: {0}")]
    Tuple(#[from] TupleError),

    #[error("malformed constraint: {0}")]
    Model(#[from] ModelError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("this checker does not accept constraints")]
    ConstraintsUnsupported,
}

/// Which checker a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckerKind {
    /// Direct forbidden-tuple matching.
    #[default]
    ForbiddenTuples,
    /// SAT-backed extendability checking.
    Solver,
}

/// Query surface over the current constraint set.
pub trait ConstraintChecker {
    /// Name of this checker (for tracing).
    fn name(&self) -> &str;

    /// Domain sizes the checker validates combinations against.
    fn domain_sizes(&self) -> &[usize];

    /// Whether the (full or partial) combination is allowed by every hard constraint.
    fn is_valid(&self, combination: &Combination) -> Result<bool, CheckerError>;

    fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, CheckerError>;

    fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint>;

    /// Every hard forbidden tuple currently enforced.
    fn forbidden_tuples(&self) -> Vec<Combination>;

    /// Bumped on every change to the constraint set.
    fn revision(&self) -> u64;

    /// An independent checker over the same constraint set.
    fn box_clone(&self) -> Result<Box<dyn ConstraintChecker>, CheckerError>;
}

/// Build the checker of the given kind for a model's constraints.
pub fn build_checker(
    kind: CheckerKind,
    model: &TestModel,
) -> Result<Box<dyn ConstraintChecker>, CheckerError> {
    model.validate()?;
    let sizes = model.domain_sizes();
    let checker: Box<dyn ConstraintChecker> = match kind {
        CheckerKind::ForbiddenTuples => Box::new(ForbiddenTupleChecker::new(
            &sizes,
            model.constraints.iter().cloned(),
        )?),
        CheckerKind::Solver => Box::new(SolverConstraintChecker::new(
            &sizes,
            model.constraints.iter().cloned(),
        )?),
    };
    Ok(checker)
}

/// A checker for models without constraints.
#[derive(Debug, Clone)]
pub struct NoConstraintChecker {
    domain_sizes: Vec<usize>,
}

impl NoConstraintChecker {
    pub fn new(domain_sizes: &[usize]) -> Self {
        Self {
            domain_sizes: domain_sizes.to_vec(),
        }
    }
}

impl ConstraintChecker for NoConstraintChecker {
    fn name(&self) -> &str {
        "none"
    }

    fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    fn is_valid(&self, combination: &Combination) -> Result<bool, CheckerError> {
        combination.validate(&self.domain_sizes)?;
        Ok(true)
    }

    fn add_constraint(&mut self, _constraint: Constraint) -> Result<ConstraintId, CheckerError> {
        Err(CheckerError::ConstraintsUnsupported)
    }

    fn remove_constraint(&mut self, _id: ConstraintId) -> Option<Constraint> {
        None
    }

    fn forbidden_tuples(&self) -> Vec<Combination> {
        vec![]
    }

    fn revision(&self) -> u64 {
        0
    }

    fn box_clone(&self) -> Result<Box<dyn ConstraintChecker>, CheckerError> {
        Ok(Box::new(self.clone()))
    }
}

#[derive(Debug, Clone)]
struct Registered {
    constraint: Constraint,
    tuples: Vec<Combination>,
}

/// Registers forbidden tuples and rejects any combination containing one.
#[derive(Debug, Clone)]
pub struct ForbiddenTupleChecker {
    domain_sizes: Vec<usize>,
    constraints: BTreeMap<ConstraintId, Registered>,
    next_id: usize,
    revision: u64,
}

impl ForbiddenTupleChecker {
    pub fn new(
        domain_sizes: &[usize],
        constraints: impl IntoIterator<Item = Constraint>,
    ) -> Result<Self, CheckerError> {
        let mut checker = Self {
            domain_sizes: domain_sizes.to_vec(),
            constraints: BTreeMap::new(),
            next_id: 0,
            revision: 0,
        };
        for constraint in constraints {
            checker.add_constraint(constraint)?;
        }
        Ok(checker)
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id).map(|r| &r.constraint)
    }

    fn hard_tuples(&self) -> impl Iterator<Item = &Combination> {
        self.constraints
            .values()
            .filter(|r| r.constraint.kind == ConstraintKind::Hard)
            .flat_map(|r| r.tuples.iter())
    }
}

impl ConstraintChecker for ForbiddenTupleChecker {
    fn name(&self) -> &str {
        "forbidden_tuples"
    }

    fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    fn is_valid(&self, combination: &Combination) -> Result<bool, CheckerError> {
        combination.validate(&self.domain_sizes)?;
        Ok(!self.hard_tuples().any(|t| combination.matches(t)))
    }

    fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, CheckerError> {
        constraint.validate(&self.domain_sizes)?;
        let tuples = constraint.forbidden_combinations(self.domain_sizes.len())?;
        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        self.constraints.insert(id, Registered { constraint, tuples });
        self.revision += 1;
        Ok(id)
    }

    fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint> {
        let removed = self.constraints.remove(&id)?;
        self.revision += 1;
        Some(removed.constraint)
    }

    fn forbidden_tuples(&self) -> Vec<Combination> {
        self.hard_tuples().cloned().collect()
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn box_clone(&self) -> Result<Box<dyn ConstraintChecker>, CheckerError> {
        Ok(Box::new(self.clone()))
    }
}

/// Checks extendability of partial combinations with the SAT oracle.
#[derive(Debug)]
pub struct SolverConstraintChecker {
    domain_sizes: Vec<usize>,
    /// Checker id -> (constraint, oracle id).
    constraints: BTreeMap<ConstraintId, (Constraint, ConstraintId)>,
    oracle: RefCell<VarisatOracle>,
    next_id: usize,
    revision: u64,
}

impl SolverConstraintChecker {
    pub fn new(
        domain_sizes: &[usize],
        constraints: impl IntoIterator<Item = Constraint>,
    ) -> Result<Self, CheckerError> {
        let mut checker = Self {
            domain_sizes: domain_sizes.to_vec(),
            constraints: BTreeMap::new(),
            oracle: RefCell::new(VarisatOracle::new(domain_sizes, &[])?),
            next_id: 0,
            revision: 0,
        };
        for constraint in constraints {
            checker.add_constraint(constraint)?;
        }
        Ok(checker)
    }

    fn active(&self) -> Vec<ConstraintId> {
        self.constraints
            .values()
            .filter(|(c, _)| c.kind == ConstraintKind::Hard)
            .map(|(_, oracle_id)| *oracle_id)
            .collect()
    }

    /// A full valid combination extending `partial`, if one exists.
    pub fn complete(&self, partial: &Combination) -> Result<Option<Combination>, CheckerError> {
        partial.validate(&self.domain_sizes)?;
        let active = self.active();
        Ok(self
            .oracle
            .borrow_mut()
            .find_solution(&active, Some(partial))?)
    }
}

impl ConstraintChecker for SolverConstraintChecker {
    fn name(&self) -> &str {
        "solver"
    }

    fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    fn is_valid(&self, combination: &Combination) -> Result<bool, CheckerError> {
        combination.validate(&self.domain_sizes)?;
        let active = self.active();
        Ok(self
            .oracle
            .borrow_mut()
            .is_satisfiable(&active, Some(combination))?)
    }

    fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, CheckerError> {
        constraint.validate(&self.domain_sizes)?;
        let oracle_id = self.oracle.get_mut().add_constraint(&constraint)?;
        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        self.constraints.insert(id, (constraint, oracle_id));
        self.revision += 1;
        Ok(id)
    }

    fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint> {
        let (constraint, oracle_id) = self.constraints.remove(&id)?;
        if let Err(error) = self.oracle.get_mut().retire(oracle_id) {
            warn!(constraint = %constraint.name, %error, "solver kept a removed constraint");
        }
        self.revision += 1;
        Some(constraint)
    }

    fn forbidden_tuples(&self) -> Vec<Combination> {
        self.constraints
            .values()
            .filter(|(c, _)| c.kind == ConstraintKind::Hard)
            .filter_map(|(c, _)| c.forbidden_combinations(self.domain_sizes.len()).ok())
            .flatten()
            .collect()
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    /// Rebuilds the oracle from the live constraints; checker ids are kept.
    fn box_clone(&self) -> Result<Box<dyn ConstraintChecker>, CheckerError> {
        let mut oracle = VarisatOracle::new(&self.domain_sizes, &[])?;
        let mut constraints = BTreeMap::new();
        for (id, (constraint, _)) in &self.constraints {
            let oracle_id = oracle.add_constraint(constraint)?;
            constraints.insert(*id, (constraint.clone(), oracle_id));
        }
        Ok(Box::new(Self {
            domain_sizes: self.domain_sizes.clone(),
            constraints,
            oracle: RefCell::new(oracle),
            next_id: self.next_id,
            revision: self.revision,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(slots: &[Option<usize>]) -> Combination {
        Combination::from_slots(slots.to_vec())
    }

    #[test]
    fn test_no_constraint_checker_accepts_everything() {
        let checker = NoConstraintChecker::new(&[2, 2]);
        assert!(checker.is_valid(&partial(&[Some(1), None])).unwrap());
        assert!(checker.is_valid(&partial(&[Some(2), None])).is_err());
    }

    #[test]
    fn test_forbidden_tuple_checker_matches_partial() {
        let checker = ForbiddenTupleChecker::new(
            &[2, 2, 2],
            [Constraint::hard("no_00", vec![0, 1], vec![vec![0, 0]])],
        )
        .unwrap();
        assert!(!checker.is_valid(&partial(&[Some(0), Some(0), None])).unwrap());
        assert!(!checker.is_valid(&partial(&[Some(0), Some(0), Some(1)])).unwrap());
        assert!(checker.is_valid(&partial(&[Some(0), None, Some(0)])).unwrap());
        assert!(checker.is_valid(&partial(&[Some(0), Some(1), None])).unwrap());
    }

    #[test]
    fn test_error_constraints_not_enforced() {
        let checker = ForbiddenTupleChecker::new(
            &[2],
            [Constraint::error("expected_invalid", vec![0], vec![vec![0]])],
        )
        .unwrap();
        assert!(checker.is_valid(&partial(&[Some(0)])).unwrap());
        assert!(checker.forbidden_tuples().is_empty());
    }

    #[test]
    fn test_add_and_remove_bump_revision() {
        let mut checker = ForbiddenTupleChecker::new(&[2, 2], []).unwrap();
        assert_eq!(checker.revision(), 0);
        let id = checker
            .add_constraint(Constraint::hard("no_1", vec![1], vec![vec![1]]))
            .unwrap();
        assert_eq!(checker.revision(), 1);
        assert!(!checker.is_valid(&partial(&[None, Some(1)])).unwrap());

        let removed = checker.remove_constraint(id).unwrap();
        assert_eq!(removed.name, "no_1");
        assert_eq!(checker.revision(), 2);
        assert!(checker.is_valid(&partial(&[None, Some(1)])).unwrap());
        assert!(checker.remove_constraint(id).is_none());
    }

    #[test]
    fn test_add_rejects_malformed_constraint() {
        let mut checker = ForbiddenTupleChecker::new(&[2], []).unwrap();
        let result = checker.add_constraint(Constraint::hard("bad", vec![0], vec![vec![7]]));
        assert!(matches!(result, Err(CheckerError::Model(_))));
        assert_eq!(checker.revision(), 0);
    }

    #[test]
    fn test_solver_checker_sees_implicit_constraints() {
        let constraints = [
            Constraint::hard("a0_b0", vec![0, 1], vec![vec![0, 0]]),
            Constraint::hard("b1_c0", vec![1, 2], vec![vec![1, 0]]),
        ];
        let direct = ForbiddenTupleChecker::new(&[2, 2, 2], constraints.clone()).unwrap();
        let solver = SolverConstraintChecker::new(&[2, 2, 2], constraints).unwrap();

        let pair = partial(&[Some(0), None, Some(0)]);
        assert!(direct.is_valid(&pair).unwrap());
        assert!(!solver.is_valid(&pair).unwrap());
        assert!(solver.complete(&pair).unwrap().is_none());

        let ok = partial(&[Some(1), None, Some(0)]);
        let completed = solver.complete(&ok).unwrap().unwrap();
        assert!(completed.contains(&ok).unwrap());
        assert!(direct.is_valid(&completed).unwrap());
    }

    #[test]
    fn test_solver_checker_remove_constraint() {
        let mut checker =
            SolverConstraintChecker::new(&[2], [Constraint::hard("not_0", vec![0], vec![vec![0]])])
                .unwrap();
        assert!(!checker.is_valid(&partial(&[Some(0)])).unwrap());
        checker.remove_constraint(ConstraintId(0)).unwrap();
        assert!(checker.is_valid(&partial(&[Some(0)])).unwrap());
    }

    #[test]
    fn test_box_clone_is_independent() {
        let mut checker = ForbiddenTupleChecker::new(&[2], []).unwrap();
        let snapshot = checker.box_clone().unwrap();
        checker
            .add_constraint(Constraint::hard("not_0", vec![0], vec![vec![0]]))
            .unwrap();
        assert!(snapshot.is_valid(&partial(&[Some(0)])).unwrap());
        assert!(!checker.is_valid(&partial(&[Some(0)])).unwrap());
    }

    #[test]
    fn test_solver_clone_keeps_constraint_ids() {
        let mut checker = SolverConstraintChecker::new(
            &[3],
            [
                Constraint::hard("not_0", vec![0], vec![vec![0]]),
                Constraint::hard("not_1", vec![0], vec![vec![1]]),
            ],
        )
        .unwrap();
        checker.remove_constraint(ConstraintId(0)).unwrap();

        let mut snapshot = checker.box_clone().unwrap();
        assert!(!snapshot.is_valid(&partial(&[Some(1)])).unwrap());
        let removed = snapshot.remove_constraint(ConstraintId(1)).unwrap();
        assert_eq!(removed.name, "not_1");
        assert!(snapshot.is_valid(&partial(&[Some(1)])).unwrap());

        let added = snapshot
            .add_constraint(Constraint::hard("not_2", vec![0], vec![vec![2]]))
            .unwrap();
        assert_eq!(added, ConstraintId(2));
        // The original is untouched.
        assert!(!checker.is_valid(&partial(&[Some(1)])).unwrap());
    }

    #[test]
    fn test_build_checker_from_model() {
        let model = TestModel::from_sizes(&[2, 2], 2)
            .with_constraint(Constraint::hard("no_11", vec![0, 1], vec![vec![1, 1]]));
        for kind in [CheckerKind::ForbiddenTuples, CheckerKind::Solver] {
            let checker = build_checker(kind, &model).unwrap();
            assert!(!checker.is_valid(&partial(&[Some(1), Some(1)])).unwrap());
            assert_eq!(checker.forbidden_tuples().len(), 1);
        }
    }
}

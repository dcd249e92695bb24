//! SAT-backed satisfiability oracle.
//!
//! The oracle answers one question: is there a full combination that
//! violates none of a chosen subset of constraints (and optionally extends a
//! given partial combination)? Each constraint is guarded by a selector
//! variable, so a single incremental solver instance answers queries over
//! arbitrary subsets via assumptions instead of being rebuilt per query.

use std::fmt;

use varisat::{solver::Solver, ExtendFormula, Lit, Var};

use weave_ir::{Combination, Constraint, ConstraintId};

use super::constraint::{encode_constraint, ConstraintError};
use super::domain::{assignment_lits, decode_model, encode_domains, EncodedModel, EncodingError};

/// Errors raised by an oracle.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("domain encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("constraint encoding error: {0}")]
    Constraint(#[from] ConstraintError),

    #[error("unknown constraint {0}")]
    UnknownConstraint(ConstraintId),

    #[error("solver error: {0}")]
    Solver(String),
}

/// Narrow satisfiability query surface consumed by checking, conflict
/// explanation and diagnosis.
pub trait SatisfiabilityOracle {
    /// Is there a full combination extending `assignment` (if any) that
    /// violates none of the `active` constraints?
    fn is_satisfiable(
        &mut self,
        active: &[ConstraintId],
        assignment: Option<&Combination>,
    ) -> Result<bool, OracleError>;

    /// Like [`is_satisfiable`](Self::is_satisfiable) but returns a witness.
    fn find_solution(
        &mut self,
        active: &[ConstraintId],
        assignment: Option<&Combination>,
    ) -> Result<Option<Combination>, OracleError>;
}

/// Incremental [`SatisfiabilityOracle`] on top of varisat.
pub struct VarisatOracle {
    encoded: EncodedModel,
    /// Selector variable per constraint id; `None` once retired.
    selectors: Vec<Option<Var>>,
    solver: Solver<'static>,
    queries: u64,
}

impl fmt::Debug for VarisatOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarisatOracle")
            .field("parameters", &self.encoded.parameters.len())
            .field("constraints", &self.selectors.len())
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

impl VarisatOracle {
    /// Build an oracle over the given domains. Constraint `i` of
    /// `constraints` receives id `ConstraintId(i)`.
    pub fn new(domain_sizes: &[usize], constraints: &[Constraint]) -> Result<Self, OracleError> {
        let encoded = encode_domains(domain_sizes)?;
        let mut solver = Solver::new();

        // Register every domain variable even if no clause mentions it.
        for var in encoded.domain_vars() {
            solver.add_clause(&[var.positive(), var.negative()]);
        }
        for clause in &encoded.structural_clauses {
            solver.add_clause(clause);
        }

        let mut oracle = Self {
            encoded,
            selectors: Vec::with_capacity(constraints.len()),
            solver,
            queries: 0,
        };
        for constraint in constraints {
            oracle.add_constraint(constraint)?;
        }
        Ok(oracle)
    }

    /// Add a constraint; it is inactive unless named in a query.
    pub fn add_constraint(&mut self, constraint: &Constraint) -> Result<ConstraintId, OracleError> {
        let selector = self.encoded.fresh_var();
        let clauses = encode_constraint(constraint, &self.encoded, Some(selector))?;
        self.solver
            .add_clause(&[selector.positive(), selector.negative()]);
        for clause in &clauses {
            self.solver.add_clause(clause);
        }
        self.selectors.push(Some(selector));
        Ok(ConstraintId(self.selectors.len() - 1))
    }

    /// Permanently disable a constraint. Its id is never reused.
    pub fn retire(&mut self, id: ConstraintId) -> Result<(), OracleError> {
        let selector = self
            .selectors
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(OracleError::UnknownConstraint(id))?;
        self.solver.add_clause(&[selector.negative()]);
        Ok(())
    }

    /// Number of satisfiability queries answered so far.
    pub fn queries(&self) -> u64 {
        self.queries
    }

    pub fn parameter_count(&self) -> usize {
        self.encoded.parameters.len()
    }

    fn assume(
        &mut self,
        active: &[ConstraintId],
        assignment: Option<&Combination>,
    ) -> Result<(), OracleError> {
        let mut enabled = vec![false; self.selectors.len()];
        for id in active {
            match self.selectors.get(id.0) {
                Some(Some(_)) => enabled[id.0] = true,
                _ => return Err(OracleError::UnknownConstraint(*id)),
            }
        }

        let mut assumptions: Vec<Lit> = self
            .selectors
            .iter()
            .zip(&enabled)
            .filter_map(|(selector, &on)| selector.map(|s| if on { s.positive() } else { s.negative() }))
            .collect();
        if let Some(partial) = assignment {
            assumptions.extend(assignment_lits(&self.encoded, partial)?);
        }
        self.solver.assume(&assumptions);
        Ok(())
    }
}

impl SatisfiabilityOracle for VarisatOracle {
    fn is_satisfiable(
        &mut self,
        active: &[ConstraintId],
        assignment: Option<&Combination>,
    ) -> Result<bool, OracleError> {
        self.assume(active, assignment)?;
        self.queries += 1;
        self.solver
            .solve()
            .map_err(|e| OracleError::Solver(e.to_string()))
    }

    fn find_solution(
        &mut self,
        active: &[ConstraintId],
        assignment: Option<&Combination>,
    ) -> Result<Option<Combination>, OracleError> {
        if !self.is_satisfiable(active, assignment)? {
            return Ok(None);
        }
        let model = self
            .solver
            .model()
            .ok_or_else(|| OracleError::Solver("SAT but no model returned".to_string()))?;
        Ok(Some(decode_model(&self.encoded, &model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<ConstraintId> {
        raw.iter().copied().map(ConstraintId).collect()
    }

    #[test]
    fn test_unconstrained_is_sat() {
        let mut oracle = VarisatOracle::new(&[2, 3], &[]).unwrap();
        assert!(oracle.is_satisfiable(&[], None).unwrap());
        let witness = oracle.find_solution(&[], None).unwrap().unwrap();
        assert!(witness.is_full());
    }

    #[test]
    fn test_subsets_are_independent_queries() {
        let constraints = vec![
            Constraint::hard("not_0", vec![0], vec![vec![0]]),
            Constraint::hard("not_1", vec![0], vec![vec![1]]),
        ];
        let mut oracle = VarisatOracle::new(&[2], &constraints).unwrap();
        assert!(oracle.is_satisfiable(&ids(&[0]), None).unwrap());
        assert!(oracle.is_satisfiable(&ids(&[1]), None).unwrap());
        assert!(!oracle.is_satisfiable(&ids(&[0, 1]), None).unwrap());
        // Earlier queries leave no residue.
        assert!(oracle.is_satisfiable(&ids(&[1]), None).unwrap());
        assert_eq!(oracle.queries(), 4);
    }

    #[test]
    fn test_assignment_must_be_extendable() {
        let constraints = vec![Constraint::hard("no_00", vec![0, 1], vec![vec![0, 0]])];
        let mut oracle = VarisatOracle::new(&[2, 2, 2], &constraints).unwrap();
        let partial = Combination::from_slots(vec![Some(0), Some(0), None]);
        assert!(!oracle.is_satisfiable(&ids(&[0]), Some(&partial)).unwrap());
        assert!(oracle.is_satisfiable(&[], Some(&partial)).unwrap());

        let other = Combination::from_slots(vec![Some(0), None, Some(1)]);
        let witness = oracle.find_solution(&ids(&[0]), Some(&other)).unwrap().unwrap();
        assert_eq!(witness.slots(), &[Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn test_implicit_conflict_detected() {
        // a=0 forces b=1 (b=0 forbidden with a=0), and b=1 forbidden with c=0.
        let constraints = vec![
            Constraint::hard("a0_b0", vec![0, 1], vec![vec![0, 0]]),
            Constraint::hard("b1_c0", vec![1, 2], vec![vec![1, 0]]),
        ];
        let mut oracle = VarisatOracle::new(&[2, 2, 2], &constraints).unwrap();
        let pair = Combination::from_slots(vec![Some(0), None, Some(0)]);
        assert!(!oracle.is_satisfiable(&ids(&[0, 1]), Some(&pair)).unwrap());
    }

    #[test]
    fn test_retired_constraint_rejected_in_queries() {
        let constraints = vec![Constraint::hard("not_0", vec![0], vec![vec![0]])];
        let mut oracle = VarisatOracle::new(&[2], &constraints).unwrap();
        oracle.retire(ConstraintId(0)).unwrap();
        assert!(matches!(
            oracle.is_satisfiable(&ids(&[0]), None),
            Err(OracleError::UnknownConstraint(ConstraintId(0)))
        ));
        assert!(oracle.is_satisfiable(&[], Some(&Combination::from_values(vec![0]))).unwrap());
    }
}

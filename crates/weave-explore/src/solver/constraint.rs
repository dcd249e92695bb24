//! Constraint encoding: translates forbidden-tuple lists into SAT clauses.
//!
//! A forbidden tuple `(p1 = v1, ..., pk = vk)` becomes the clause
//! `(!p1=v1 OR ... OR !pk=vk)`. When a constraint is guarded by a selector
//! variable `s`, every clause gets `!s` prepended so the constraint is only
//! enforced while `s` is assumed true.

use varisat::{Lit, Var};

use weave_ir::Constraint;

use super::domain::{lit_for_value, EncodedModel};

/// Errors during constraint encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("constraint '{name}' references unknown parameter {parameter}")]
    UnknownParameter { name: String, parameter: usize },

    #[error("constraint '{name}' forbids value {value} outside the domain of parameter {parameter}")]
    InvalidValue {
        name: String,
        parameter: usize,
        value: usize,
    },

    #[error("constraint '{name}' has a tuple of length {actual}, expected {expected}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// A conjunction of disjunctive clauses.
pub type CnfClauses = Vec<Vec<Lit>>;

/// Encode one constraint, optionally guarded by a selector variable.
pub fn encode_constraint(
    constraint: &Constraint,
    encoded: &EncodedModel,
    selector: Option<Var>,
) -> Result<CnfClauses, ConstraintError> {
    let mut clauses = Vec::with_capacity(constraint.forbidden.len());

    for tuple in &constraint.forbidden {
        if tuple.len() != constraint.parameters.len() {
            return Err(ConstraintError::Arity {
                name: constraint.name.clone(),
                expected: constraint.parameters.len(),
                actual: tuple.len(),
            });
        }

        let mut clause = Vec::with_capacity(tuple.len() + 1);
        if let Some(s) = selector {
            clause.push(s.negative());
        }
        for (&parameter, &value) in constraint.parameters.iter().zip(tuple) {
            if parameter >= encoded.parameters.len() {
                return Err(ConstraintError::UnknownParameter {
                    name: constraint.name.clone(),
                    parameter,
                });
            }
            let lit = lit_for_value(encoded, parameter, value).ok_or_else(|| {
                ConstraintError::InvalidValue {
                    name: constraint.name.clone(),
                    parameter,
                    value,
                }
            })?;
            clause.push(!lit);
        }
        clauses.push(clause);
    }

    Ok(clauses)
}

/// Encode several constraints without selectors.
pub fn encode_constraints<'a>(
    constraints: impl IntoIterator<Item = &'a Constraint>,
    encoded: &EncodedModel,
) -> Result<CnfClauses, ConstraintError> {
    let mut all = Vec::new();
    for constraint in constraints {
        all.extend(encode_constraint(constraint, encoded, None)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::domain::{decode_model, encode_domains};
    use varisat::{solver::Solver, ExtendFormula};

    fn solver_with(encoded: &EncodedModel, clauses: &CnfClauses) -> Solver<'static> {
        let mut solver = Solver::new();
        for var in encoded.domain_vars() {
            solver.add_clause(&[var.positive(), var.negative()]);
        }
        for clause in encoded.structural_clauses.iter().chain(clauses) {
            solver.add_clause(clause);
        }
        solver
    }

    #[test]
    fn test_forbidden_tuple_never_in_solutions() {
        let encoded = encode_domains(&[2, 2]).unwrap();
        let constraint = Constraint::hard("no_00", vec![0, 1], vec![vec![0, 0]]);
        let clauses = encode_constraints([&constraint], &encoded).unwrap();
        let mut solver = solver_with(&encoded, &clauses);

        let mut count = 0;
        while solver.solve().unwrap() {
            let model = solver.model().unwrap();
            let decoded = decode_model(&encoded, &model);
            assert_ne!(decoded.slots(), &[Some(0), Some(0)]);
            count += 1;

            let blocking: Vec<Lit> = model
                .iter()
                .filter(|l| l.var().index() < encoded.next_var)
                .map(|l| !*l)
                .collect();
            solver.add_clause(&blocking);
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_unary_constraints_can_be_unsat() {
        let encoded = encode_domains(&[2]).unwrap();
        let c0 = Constraint::hard("not_0", vec![0], vec![vec![0]]);
        let c1 = Constraint::hard("not_1", vec![0], vec![vec![1]]);
        let clauses = encode_constraints([&c0, &c1], &encoded).unwrap();
        let mut solver = solver_with(&encoded, &clauses);
        assert!(!solver.solve().unwrap());
    }

    #[test]
    fn test_selector_guards_constraint() {
        let mut encoded = encode_domains(&[1]).unwrap();
        let selector = encoded.fresh_var();
        let c = Constraint::hard("not_0", vec![0], vec![vec![0]]);
        let clauses = encode_constraint(&c, &encoded, Some(selector)).unwrap();
        assert_eq!(clauses, vec![vec![selector.negative(), !encoded.parameters[0][0].positive()]]);

        let mut solver = solver_with(&encoded, &clauses);
        solver.add_clause(&[selector.positive(), selector.negative()]);
        solver.assume(&[selector.negative()]);
        assert!(solver.solve().unwrap());
        solver.assume(&[selector.positive()]);
        assert!(!solver.solve().unwrap());
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let encoded = encode_domains(&[2]).unwrap();
        let c = Constraint::hard("bad", vec![3], vec![vec![0]]);
        assert!(matches!(
            encode_constraint(&c, &encoded, None),
            Err(ConstraintError::UnknownParameter { parameter: 3, .. })
        ));
    }
}

//! Domain encoding: maps model parameters to SAT boolean variables.
//!
//! Every parameter is one-hot encoded: N SAT variables for a domain of N
//! values, plus an exactly-one constraint (at-least-one + pairwise
//! at-most-one). Value index `v` of parameter `p` is true iff variable
//! `parameters[p][v]` is true.

#[cfg(test)]
use varisat::ExtendFormula;
use varisat::{Lit, Var};

use weave_ir::Combination;

/// Maximum number of values allowed in a single parameter domain.
const MAX_DOMAIN_SIZE: usize = 1024;

/// All encoded parameters plus their structural (exactly-one) clauses.
#[derive(Debug, Clone)]
pub struct EncodedModel {
    /// Parameter index -> one SAT variable per value index.
    pub parameters: Vec<Vec<Var>>,
    /// Exactly-one clauses for every parameter.
    pub structural_clauses: Vec<Vec<Lit>>,
    /// Next free variable index.
    pub next_var: usize,
}

/// Errors during domain encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("parameter {parameter} has an empty domain")]
    EmptyDomain { parameter: usize },

    #[error("parameter {parameter} domain too large: {size} values (max {MAX_DOMAIN_SIZE})")]
    DomainTooLarge { parameter: usize, size: usize },

    #[error("combination has {actual} slots but the model has {expected} parameters")]
    Arity { expected: usize, actual: usize },

    #[error("parameter {parameter} has no value {value}")]
    InvalidValue { parameter: usize, value: usize },
}

/// Encode all parameter domains into SAT variables.
pub fn encode_domains(domain_sizes: &[usize]) -> Result<EncodedModel, EncodingError> {
    let mut parameters = Vec::with_capacity(domain_sizes.len());
    let mut structural_clauses = Vec::new();
    let mut next_var: usize = 0;

    for (parameter, &size) in domain_sizes.iter().enumerate() {
        if size == 0 {
            return Err(EncodingError::EmptyDomain { parameter });
        }
        if size > MAX_DOMAIN_SIZE {
            return Err(EncodingError::DomainTooLarge { parameter, size });
        }

        let vars: Vec<Var> = (0..size)
            .map(|_| {
                let var = Var::from_index(next_var);
                next_var += 1;
                var
            })
            .collect();

        // At-least-one: (v1 OR v2 OR ... OR vN)
        structural_clauses.push(vars.iter().map(|v| v.positive()).collect());

        // At-most-one: pairwise (!vi OR !vj) for all i < j
        for i in 0..vars.len() {
            for j in (i + 1)..vars.len() {
                structural_clauses.push(vec![vars[i].negative(), vars[j].negative()]);
            }
        }

        parameters.push(vars);
    }

    Ok(EncodedModel {
        parameters,
        structural_clauses,
        next_var,
    })
}

impl EncodedModel {
    /// Every variable that belongs to a parameter domain.
    pub fn domain_vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.parameters.iter().flatten().copied()
    }

    /// Allocate a fresh variable outside the parameter domains.
    pub fn fresh_var(&mut self) -> Var {
        let var = Var::from_index(self.next_var);
        self.next_var += 1;
        var
    }
}

/// The SAT literal asserting `parameter = value`.
pub fn lit_for_value(encoded: &EncodedModel, parameter: usize, value: usize) -> Option<Lit> {
    encoded
        .parameters
        .get(parameter)
        .and_then(|vars| vars.get(value))
        .map(|var| var.positive())
}

/// Unit literals forcing every assigned slot of `combination`.
pub fn assignment_lits(
    encoded: &EncodedModel,
    combination: &Combination,
) -> Result<Vec<Lit>, EncodingError> {
    if combination.len() != encoded.parameters.len() {
        return Err(EncodingError::Arity {
            expected: encoded.parameters.len(),
            actual: combination.len(),
        });
    }
    combination
        .assignments()
        .map(|(parameter, value)| {
            lit_for_value(encoded, parameter, value)
                .ok_or(EncodingError::InvalidValue { parameter, value })
        })
        .collect()
}

/// Decode a SAT model back to a full combination.
///
/// A parameter with no true variable in the model (impossible under the
/// exactly-one clauses) decodes to a wildcard.
pub fn decode_model(encoded: &EncodedModel, model: &[Lit]) -> Combination {
    let mut truth = vec![false; encoded.next_var];
    for lit in model {
        if let Some(slot) = truth.get_mut(lit.var().index()) {
            *slot = lit.is_positive();
        }
    }

    let slots = encoded
        .parameters
        .iter()
        .map(|vars| vars.iter().position(|var| truth[var.index()]))
        .collect();
    Combination::from_slots(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use varisat::solver::Solver;

    #[test]
    fn test_encode_structure() {
        let encoded = encode_domains(&[3, 2]).unwrap();
        assert_eq!(encoded.parameters.len(), 2);
        assert_eq!(encoded.parameters[0].len(), 3);
        // 1 + 3 pairwise for the first, 1 + 1 for the second.
        assert_eq!(encoded.structural_clauses.len(), 6);
        assert_eq!(encoded.next_var, 5);
    }

    #[test]
    fn test_empty_domain_rejected() {
        assert_eq!(
            encode_domains(&[2, 0]).unwrap_err(),
            EncodingError::EmptyDomain { parameter: 1 }
        );
    }

    #[test]
    fn test_roundtrip_through_solver() {
        let encoded = encode_domains(&[3, 3, 2]).unwrap();
        let mut solver = Solver::new();
        for clause in &encoded.structural_clauses {
            solver.add_clause(clause);
        }
        let forced = Combination::from_slots(vec![Some(2), None, Some(1)]);
        let lits = assignment_lits(&encoded, &forced).unwrap();
        for lit in &lits {
            solver.add_clause(&[*lit]);
        }
        assert!(solver.solve().unwrap());
        let decoded = decode_model(&encoded, &solver.model().unwrap());
        assert!(decoded.is_full());
        assert!(decoded.contains(&forced).unwrap());
    }

    #[test]
    fn test_assignment_lits_rejects_bad_value() {
        let encoded = encode_domains(&[2, 2]).unwrap();
        let bad = Combination::from_slots(vec![Some(5), None]);
        assert!(matches!(
            assignment_lits(&encoded, &bad),
            Err(EncodingError::InvalidValue { parameter: 0, value: 5 })
        ));
    }
}

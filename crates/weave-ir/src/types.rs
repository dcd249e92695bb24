use serde::{Deserialize, Serialize};

use crate::combination::{Combination, TupleError};

/// Top-level input model: parameters, interaction strength and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestModel {
    pub parameters: Vec<Parameter>,
    pub strength: usize,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

/// A parameter with a finite domain of `size` values, indexed `0..size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub size: usize,
}

/// Whether a constraint describes impossible inputs or expected-invalid ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Physically impossible; never generated.
    #[default]
    Hard,
    /// Expected to be rejected by the system under test. Only participates
    /// in conflict analysis.
    Error,
}

/// A list of forbidden value tuples over a fixed set of parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    /// Involved parameter indices.
    pub parameters: Vec<usize>,
    /// Each entry has one value index per involved parameter.
    pub forbidden: Vec<Vec<usize>>,
    #[serde(default)]
    pub kind: ConstraintKind,
}

/// Identifier of a constraint, stable for the lifetime of its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintId(pub usize);

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Structural errors in a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("model has no parameters")]
    NoParameters,

    #[error("parameter '{0}' has an empty domain")]
    EmptyDomain(String),

    #[error("strength {strength} must be between 1 and {parameters}")]
    InvalidStrength { strength: usize, parameters: usize },

    #[error("constraint '{name}' involves no parameters")]
    EmptyConstraint { name: String },

    #[error("constraint '{name}': {source}")]
    Tuple {
        name: String,
        #[source]
        source: TupleError,
    },

    #[error("constraint '{name}' has a tuple of length {actual}, expected {expected}")]
    TupleArity {
        name: String,
        expected: usize,
        actual: usize,
    },
}

impl TestModel {
    /// A model with anonymous parameters `p0, p1, ...`.
    pub fn from_sizes(domain_sizes: &[usize], strength: usize) -> Self {
        Self {
            parameters: domain_sizes
                .iter()
                .enumerate()
                .map(|(i, &size)| Parameter {
                    name: format!("p{i}"),
                    size,
                })
                .collect(),
            strength,
            constraints: vec![],
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn domain_sizes(&self) -> Vec<usize> {
        self.parameters.iter().map(|p| p.size).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Check every structural precondition of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.parameters.is_empty() {
            return Err(ModelError::NoParameters);
        }
        if let Some(p) = self.parameters.iter().find(|p| p.size == 0) {
            return Err(ModelError::EmptyDomain(p.name.clone()));
        }
        if self.strength == 0 || self.strength > self.parameters.len() {
            return Err(ModelError::InvalidStrength {
                strength: self.strength,
                parameters: self.parameters.len(),
            });
        }
        let sizes = self.domain_sizes();
        for constraint in &self.constraints {
            constraint.validate(&sizes)?;
        }
        Ok(())
    }

    pub fn hard_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Hard)
    }
}

impl Constraint {
    pub fn hard(name: impl Into<String>, parameters: Vec<usize>, forbidden: Vec<Vec<usize>>) -> Self {
        Self {
            name: name.into(),
            parameters,
            forbidden,
            kind: ConstraintKind::Hard,
        }
    }

    pub fn error(name: impl Into<String>, parameters: Vec<usize>, forbidden: Vec<Vec<usize>>) -> Self {
        Self {
            name: name.into(),
            parameters,
            forbidden,
            kind: ConstraintKind::Error,
        }
    }

    /// Validate the constraint against the model's domain sizes.
    pub fn validate(&self, domain_sizes: &[usize]) -> Result<(), ModelError> {
        if self.parameters.is_empty() {
            return Err(ModelError::EmptyConstraint {
                name: self.name.clone(),
            });
        }
        for tuple in &self.forbidden {
            if tuple.len() != self.parameters.len() {
                return Err(ModelError::TupleArity {
                    name: self.name.clone(),
                    expected: self.parameters.len(),
                    actual: tuple.len(),
                });
            }
        }
        for combination in self.forbidden_combinations(domain_sizes.len()).map_err(|source| {
            ModelError::Tuple {
                name: self.name.clone(),
                source,
            }
        })? {
            combination
                .validate(domain_sizes)
                .map_err(|source| ModelError::Tuple {
                    name: self.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// The forbidden tuples as partial combinations over `parameter_count` slots.
    pub fn forbidden_combinations(
        &self,
        parameter_count: usize,
    ) -> Result<Vec<Combination>, TupleError> {
        self.forbidden
            .iter()
            .map(|values| {
                let pairs: Vec<(usize, usize)> = self
                    .parameters
                    .iter()
                    .copied()
                    .zip(values.iter().copied())
                    .collect();
                Combination::from_assignments(parameter_count, &pairs)
            })
            .collect()
    }

    /// A hard constraint forbidding exactly one partial combination.
    pub fn forbidding(name: impl Into<String>, combination: &Combination) -> Self {
        let (parameters, values): (Vec<usize>, Vec<usize>) = combination.assignments().unzip();
        Self::hard(name, parameters, vec![values])
    }
}

//! Covering-array generation.
//!
//! A [`GenerationRun`] owns the checker and coverage map of one run.
//! Sequential generators drain it in one call; the
//! [`InterleavingGenerator`](interleaving::InterleavingGenerator) yields one
//! input at a time so results and extra inputs can be folded in between.

pub mod candidate;
pub mod greedy;
pub mod interleaving;
pub mod ipog;

use serde::{Deserialize, Serialize};

use weave_ir::types::ModelError;
use weave_ir::{Combination, Constraint, ConstraintId, TestModel, TupleError};

use crate::checker::{build_checker, CheckerError, CheckerKind, ConstraintChecker};
use crate::coverage::{CoverageError, CoverageMap, CoverageStats};

pub use candidate::{GreedyConfig, GreedySelector};
pub use greedy::GreedyGenerator;
pub use interleaving::InterleavingGenerator;
pub use ipog::IpogGenerator;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("malformed combination: {0}")]
    Tuple(#[from] TupleError),

    #[error("constraint check failed: {0}")]
    Checker(#[from] CheckerError),

    #[error("coverage error: {0}")]
    Coverage(#[from] CoverageError),
}

/// Which sequential generator a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    #[default]
    Greedy,
    Ipog,
}

/// Output of a sequential generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub test_inputs: Vec<Combination>,
    /// Required tuples no valid input could cover.
    pub uncoverable: Vec<Combination>,
    pub stats: CoverageStats,
}

impl GenerationReport {
    pub(crate) fn from_run(test_inputs: Vec<Combination>, run: &GenerationRun) -> Self {
        Self {
            test_inputs,
            uncoverable: run.coverage().uncoverable().cloned().collect(),
            stats: run.coverage().stats(),
        }
    }
}

/// A generator that runs to completion before any test executes.
pub trait SequentialGenerator {
    fn name(&self) -> &str;

    fn generate(&mut self, run: &mut GenerationRun) -> Result<GenerationReport, GenerationError>;
}

/// Build the sequential generator of the given kind.
pub fn build_generator(kind: GeneratorKind, config: GreedyConfig) -> Box<dyn SequentialGenerator> {
    match kind {
        GeneratorKind::Greedy => Box::new(GreedyGenerator::new(config)),
        GeneratorKind::Ipog => Box::new(IpogGenerator::new(config)),
    }
}

/// Checker plus coverage map of a single generation run.
pub struct GenerationRun {
    checker: Box<dyn ConstraintChecker>,
    coverage: CoverageMap,
}

impl std::fmt::Debug for GenerationRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRun")
            .field("checker", &self.checker.name())
            .field("coverage", &self.coverage.stats())
            .finish()
    }
}

impl GenerationRun {
    pub fn new(checker: Box<dyn ConstraintChecker>, strength: usize) -> Result<Self, GenerationError> {
        let coverage = CoverageMap::new(checker.domain_sizes(), strength, checker.as_ref())?;
        Ok(Self { checker, coverage })
    }

    /// A fresh run over the model's hard constraints.
    pub fn from_model(model: &TestModel, kind: CheckerKind) -> Result<Self, GenerationError> {
        model.validate()?;
        Self::new(build_checker(kind, model)?, model.strength)
    }

    pub fn checker(&self) -> &dyn ConstraintChecker {
        self.checker.as_ref()
    }

    pub fn coverage(&self) -> &CoverageMap {
        &self.coverage
    }

    pub(crate) fn coverage_mut(&mut self) -> &mut CoverageMap {
        &mut self.coverage
    }

    pub fn domain_sizes(&self) -> &[usize] {
        self.checker.domain_sizes()
    }

    /// Re-derive the coverage map if the checker changed since the last sync.
    pub fn sync(&mut self) -> Result<(), GenerationError> {
        if self.coverage.revision() != self.checker.revision() {
            self.coverage.update_constraints(self.checker.as_ref())?;
        }
        Ok(())
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, GenerationError> {
        let id = self.checker.add_constraint(constraint)?;
        self.sync()?;
        Ok(id)
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<Option<Constraint>, GenerationError> {
        let removed = self.checker.remove_constraint(id);
        self.sync()?;
        Ok(removed)
    }

    pub fn is_valid(&self, combination: &Combination) -> Result<bool, GenerationError> {
        Ok(self.checker.is_valid(combination)?)
    }

    /// Fold an executed test input into the coverage map.
    pub fn record(&mut self, test_input: &Combination) -> Result<usize, GenerationError> {
        self.sync()?;
        Ok(self.coverage.update_coverage(test_input)?)
    }
}

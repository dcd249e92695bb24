//! Pull-based generation interleaved with test execution.
//!
//! Each call recomputes the best input against the coverage map as it is
//! now, including inputs recorded from elsewhere (fault characterization)
//! and constraints added since the previous call.

use weave_ir::{Combination, Constraint, ConstraintId};

use super::candidate::{GreedyConfig, GreedySelector};
use super::{GenerationError, GenerationRun};
use crate::coverage::CoverageMap;

#[derive(Debug)]
pub struct InterleavingGenerator {
    run: GenerationRun,
    selector: GreedySelector,
    emitted: Vec<Combination>,
}

impl InterleavingGenerator {
    pub fn new(run: GenerationRun, config: GreedyConfig) -> Self {
        Self {
            run,
            selector: GreedySelector::new(config),
            emitted: Vec::new(),
        }
    }

    /// The next coverage-driven input, already folded into the coverage
    /// map, or `None` once coverage is complete.
    pub fn generate_next_test_input(&mut self) -> Result<Option<Combination>, GenerationError> {
        let Some(input) = self.selector.next_input(&mut self.run)? else {
            return Ok(None);
        };
        self.run.record(&input)?;
        self.emitted.push(input.clone());
        Ok(Some(input))
    }

    /// Fold in an input executed outside this generator.
    pub fn record_external(&mut self, input: &Combination) -> Result<usize, GenerationError> {
        self.run.record(input)
    }

    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, GenerationError> {
        self.run.add_constraint(constraint)
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<Option<Constraint>, GenerationError> {
        self.run.remove_constraint(id)
    }

    pub fn is_complete(&self) -> bool {
        self.run.coverage().is_complete()
    }

    pub fn coverage(&self) -> &CoverageMap {
        self.run.coverage()
    }

    pub fn run(&self) -> &GenerationRun {
        &self.run
    }

    /// Inputs produced by this generator, in order.
    pub fn emitted(&self) -> &[Combination] {
        &self.emitted
    }
}

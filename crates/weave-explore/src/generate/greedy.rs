//! One-test-at-a-time greedy covering-array generation.

use tracing::info;

use super::candidate::{GreedyConfig, GreedySelector};
use super::{GenerationError, GenerationReport, GenerationRun, SequentialGenerator};

/// Repeatedly emits the input covering the most uncovered tuples.
#[derive(Debug, Clone)]
pub struct GreedyGenerator {
    selector: GreedySelector,
}

impl GreedyGenerator {
    pub fn new(config: GreedyConfig) -> Self {
        Self {
            selector: GreedySelector::new(config),
        }
    }
}

impl SequentialGenerator for GreedyGenerator {
    fn name(&self) -> &str {
        "greedy"
    }

    fn generate(&mut self, run: &mut GenerationRun) -> Result<GenerationReport, GenerationError> {
        let mut test_inputs = Vec::new();
        while let Some(input) = self.selector.next_input(run)? {
            run.record(&input)?;
            test_inputs.push(input);
        }
        let report = GenerationReport::from_run(test_inputs, run);
        info!(
            generator = self.name(),
            inputs = report.test_inputs.len(),
            covered = report.stats.covered,
            uncoverable = report.stats.uncoverable,
            "generation finished"
        );
        Ok(report)
    }
}

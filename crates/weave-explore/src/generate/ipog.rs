//! In-parameter-order generation.
//!
//! Starts from every required tuple over the first `t` parameters, then
//! adds one parameter at a time: each existing row gets the value covering
//! the most pending tuples (horizontal extension), and tuples still pending
//! are merged into compatible rows or appended as new rows (vertical
//! extension). Remaining wildcards are completed depth-first, and a greedy
//! pass repairs whatever the array still misses.
//!
//! Rows are checked against the constraint checker at every step, so no
//! emitted input is ever rejected by it.

use std::collections::BTreeSet;

use tracing::{debug, info};

use weave_ir::Combination;

use super::candidate::{complete_partial, Completion, GreedyConfig, GreedySelector};
use super::{GenerationError, GenerationReport, GenerationRun, SequentialGenerator};

#[derive(Debug, Clone)]
pub struct IpogGenerator {
    config: GreedyConfig,
}

impl IpogGenerator {
    pub fn new(config: GreedyConfig) -> Self {
        Self { config }
    }

    /// Pick, per row, the value of `parameter` covering the most pending tuples.
    fn extend_horizontally(
        run: &GenerationRun,
        rows: &mut [Combination],
        parameter: usize,
        pending: &mut BTreeSet<Combination>,
    ) -> Result<(), GenerationError> {
        for row in rows.iter_mut() {
            let mut best: Option<(usize, Combination)> = None;
            for value in 0..run.domain_sizes()[parameter] {
                let candidate = row.with(parameter, Some(value));
                if !run.is_valid(&candidate)? {
                    continue;
                }
                let gain = pending.iter().filter(|t| candidate.matches(t)).count();
                if best.as_ref().map_or(true, |(g, _)| gain > *g) {
                    best = Some((gain, candidate));
                }
            }
            if let Some((_, extended)) = best {
                pending.retain(|t| !extended.matches(t));
                *row = extended;
            }
        }
        Ok(())
    }

    /// Merge each pending tuple into the first compatible row, or start a new one.
    fn extend_vertically(
        run: &GenerationRun,
        rows: &mut Vec<Combination>,
        pending: BTreeSet<Combination>,
    ) -> Result<(), GenerationError> {
        'tuples: for tuple in pending {
            for row in rows.iter_mut() {
                if let Some(merged) = row.merge(&tuple)? {
                    if run.is_valid(&merged)? {
                        *row = merged;
                        continue 'tuples;
                    }
                }
            }
            rows.push(tuple);
        }
        Ok(())
    }
}

impl SequentialGenerator for IpogGenerator {
    fn name(&self) -> &str {
        "ipog"
    }

    fn generate(&mut self, run: &mut GenerationRun) -> Result<GenerationReport, GenerationError> {
        run.sync()?;
        let strength = run.coverage().strength();
        let parameter_count = run.domain_sizes().len();

        let initial: Vec<usize> = (0..strength).collect();
        let mut rows = run.coverage().uncovered_where(|subset| subset == initial.as_slice());

        for parameter in strength..parameter_count {
            let mut pending: BTreeSet<Combination> = run
                .coverage()
                .uncovered_where(|subset| subset.last() == Some(&parameter))
                .into_iter()
                .collect();
            Self::extend_horizontally(run, &mut rows, parameter, &mut pending)?;
            Self::extend_vertically(run, &mut rows, pending)?;
            debug!(parameter, rows = rows.len(), "extended array");
        }

        let order: Vec<usize> = (0..parameter_count).collect();
        let mut test_inputs = Vec::with_capacity(rows.len());
        for row in rows {
            let input = match complete_partial(run, &row, &order, self.config.max_backtracks)? {
                Completion::Complete(input) => input,
                // Whatever the row covered is picked up by the repair pass.
                Completion::Impossible | Completion::BudgetExhausted => continue,
            };
            if run.coverage().count_newly_covered(&input) == 0 {
                continue;
            }
            run.record(&input)?;
            test_inputs.push(input);
        }
        let from_array = test_inputs.len();

        let mut repair = GreedySelector::new(self.config);
        while let Some(input) = repair.next_input(run)? {
            run.record(&input)?;
            test_inputs.push(input);
        }

        let report = GenerationReport::from_run(test_inputs, run);
        info!(
            generator = self.name(),
            inputs = report.test_inputs.len(),
            repaired = report.test_inputs.len() - from_array,
            covered = report.stats.covered,
            uncoverable = report.stats.uncoverable,
            "generation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckerKind;
    use weave_ir::{Constraint, TestModel};

    fn generate(model: &TestModel) -> (GenerationRun, GenerationReport) {
        let mut run = GenerationRun::from_model(model, CheckerKind::ForbiddenTuples).unwrap();
        let report = IpogGenerator::new(GreedyConfig::default())
            .generate(&mut run)
            .unwrap();
        (run, report)
    }

    #[test]
    fn test_ipog_covers_all_pairs() {
        let (run, report) = generate(&TestModel::from_sizes(&[3, 3, 3, 3], 2));
        assert!(run.coverage().is_complete());
        assert_eq!(report.stats.covered, 54);
        assert!(report.test_inputs.len() <= 15);
    }

    #[test]
    fn test_ipog_respects_constraints() {
        let model = TestModel::from_sizes(&[2, 3, 2, 2], 2)
            .with_constraint(Constraint::hard("x", vec![0, 1], vec![vec![1, 2]]))
            .with_constraint(Constraint::hard("y", vec![2, 3], vec![vec![0, 0]]));
        let (run, report) = generate(&model);
        assert!(run.coverage().is_complete());
        for input in &report.test_inputs {
            assert!(run.is_valid(input).unwrap(), "{input} rejected");
        }
    }

    #[test]
    fn test_ipog_full_strength() {
        let (_, report) = generate(&TestModel::from_sizes(&[2, 2], 2));
        assert_eq!(report.test_inputs.len(), 4);
    }
}

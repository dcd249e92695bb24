//! Greedy candidate selection shared by every generator.
//!
//! Small input spaces are scanned exhaustively: the valid full combination
//! covering the most uncovered tuples wins, first in lexicographic order on
//! ties. Larger spaces build AETG-style candidates around the first
//! uncovered tuple and keep the best one.
//!
//! A required tuple that no valid input can contain is marked uncoverable
//! on the coverage map and reported with `warn!`; selection never fails
//! just because coverage cannot be completed.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use weave_ir::combination::{full_combination_count, FullCombinations};
use weave_ir::Combination;

use super::{GenerationError, GenerationRun};
use crate::rng::shuffled;

/// Work budgets and seed for greedy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyConfig {
    /// Input spaces up to this many full combinations are scanned exhaustively.
    pub exhaustive_limit: usize,
    /// Candidates built per step above the exhaustive limit.
    pub candidate_count: usize,
    /// Seed for parameter orderings of constructed candidates.
    pub seed: u64,
    /// Dead ends allowed while completing one candidate.
    pub max_backtracks: usize,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            exhaustive_limit: 4_096,
            candidate_count: 50,
            seed: 0,
            max_backtracks: 10_000,
        }
    }
}

/// Outcome of completing a partial combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Completion {
    Complete(Combination),
    /// No valid full combination extends the start.
    Impossible,
    BudgetExhausted,
}

/// Depth-first completion of `start`, filling unassigned parameters in
/// `order`. Values are tried by descending coverage gain, then ascending
/// index; every intermediate combination must pass the checker.
pub(crate) fn complete_partial(
    run: &GenerationRun,
    start: &Combination,
    order: &[usize],
    max_backtracks: usize,
) -> Result<Completion, GenerationError> {
    if !run.is_valid(start)? {
        return Ok(Completion::Impossible);
    }
    let free: Vec<usize> = order
        .iter()
        .copied()
        .filter(|&p| start.get(p).is_none())
        .collect();
    let mut budget = max_backtracks;
    extend(run, start.clone(), &free, &mut budget)
}

fn extend(
    run: &GenerationRun,
    current: Combination,
    free: &[usize],
    budget: &mut usize,
) -> Result<Completion, GenerationError> {
    let Some((&parameter, rest)) = free.split_first() else {
        return Ok(Completion::Complete(current));
    };

    let mut values: Vec<(usize, Combination)> = (0..run.domain_sizes()[parameter])
        .map(|v| {
            let next = current.with(parameter, Some(v));
            (run.coverage().count_newly_covered(&next), next)
        })
        .collect();
    // Stable sort keeps ascending value order among equal gains.
    values.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, next) in values {
        if !run.is_valid(&next)? {
            continue;
        }
        match extend(run, next, rest, budget)? {
            Completion::Impossible => {}
            done => return Ok(done),
        }
        if *budget == 0 {
            return Ok(Completion::BudgetExhausted);
        }
        *budget -= 1;
    }
    Ok(Completion::Impossible)
}

/// Picks the next test input against the current coverage state.
#[derive(Debug, Clone)]
pub struct GreedySelector {
    config: GreedyConfig,
    /// Valid full combinations, keyed by the checker revision they were built for.
    valid_inputs: Option<(u64, Vec<Combination>)>,
    step: u64,
}

impl GreedySelector {
    pub fn new(config: GreedyConfig) -> Self {
        Self {
            config,
            valid_inputs: None,
            step: 0,
        }
    }

    pub fn config(&self) -> &GreedyConfig {
        &self.config
    }

    /// The best next input, or `None` once coverage is complete.
    ///
    /// The input is not recorded; callers fold it in with
    /// [`GenerationRun::record`].
    pub fn next_input(&mut self, run: &mut GenerationRun) -> Result<Option<Combination>, GenerationError> {
        run.sync()?;
        let exhaustive = full_combination_count(run.domain_sizes())
            .is_some_and(|n| n <= self.config.exhaustive_limit);

        loop {
            if run.coverage().is_complete() {
                return Ok(None);
            }
            let picked = if exhaustive {
                self.best_exhaustive(run)?
            } else {
                self.best_constructed(run)?
            };
            if let Some((gain, input)) = picked {
                self.step += 1;
                debug!(step = self.step, gain, input = %input, "selected test input");
                return Ok(Some(input));
            }
        }
    }

    fn best_exhaustive(
        &mut self,
        run: &mut GenerationRun,
    ) -> Result<Option<(usize, Combination)>, GenerationError> {
        let revision = run.checker().revision();
        if self.valid_inputs.as_ref().map(|(r, _)| *r) != Some(revision) {
            let mut valid = Vec::new();
            for input in FullCombinations::new(run.domain_sizes()) {
                if run.is_valid(&input)? {
                    valid.push(input);
                }
            }
            self.valid_inputs = Some((revision, valid));
        }

        let mut best: Option<(usize, &Combination)> = None;
        if let Some((_, valid)) = &self.valid_inputs {
            for input in valid {
                let gain = run.coverage().count_newly_covered(input);
                if gain > best.map_or(0, |(g, _)| g) {
                    best = Some((gain, input));
                }
            }
        }
        if let Some((gain, input)) = best {
            return Ok(Some((gain, input.clone())));
        }

        // No valid input covers anything still uncovered.
        for tuple in run.coverage().uncovered_tuples() {
            mark_uncoverable(run, &tuple, "no valid test input contains it")?;
        }
        Ok(None)
    }

    fn best_constructed(
        &mut self,
        run: &mut GenerationRun,
    ) -> Result<Option<(usize, Combination)>, GenerationError> {
        let Some(seed_tuple) = run.coverage().first_uncovered() else {
            return Ok(None);
        };
        let fixed = seed_tuple.assigned_parameters();
        let rest = seed_tuple.unassigned_parameters();
        let count = self.config.candidate_count.max(1);

        let mut best: Option<(usize, Combination)> = None;
        let mut reason = "its completion search ran out of backtracks";
        for k in 0..count {
            let mut order = fixed.clone();
            if k == 0 {
                order.extend(&rest);
            } else {
                let step = self.step.wrapping_mul(count as u64).wrapping_add(k as u64);
                order.extend(shuffled(&rest, self.config.seed, step));
            }

            match complete_partial(run, &seed_tuple, &order, self.config.max_backtracks)? {
                Completion::Complete(input) => {
                    let gain = run.coverage().count_newly_covered(&input);
                    let better = match &best {
                        None => true,
                        Some((g, b)) => gain > *g || (gain == *g && input < *b),
                    };
                    if better {
                        best = Some((gain, input));
                    }
                }
                Completion::Impossible => {
                    reason = "no valid test input contains it";
                    break;
                }
                Completion::BudgetExhausted => {}
            }
        }

        if best.is_none() {
            mark_uncoverable(run, &seed_tuple, reason)?;
        }
        Ok(best)
    }
}

fn mark_uncoverable(
    run: &mut GenerationRun,
    tuple: &Combination,
    reason: &str,
) -> Result<(), GenerationError> {
    if run.coverage_mut().mark_uncoverable(tuple)? {
        warn!(tuple = %tuple, reason, "required tuple is uncoverable");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckerKind;
    use weave_ir::{Constraint, TestModel};

    fn run_for(model: &TestModel) -> GenerationRun {
        GenerationRun::from_model(model, CheckerKind::ForbiddenTuples).unwrap()
    }

    #[test]
    fn test_exhaustive_first_maximum_wins() {
        let model = TestModel::from_sizes(&[2, 2, 2], 2);
        let mut run = run_for(&model);
        let mut selector = GreedySelector::new(GreedyConfig::default());
        let first = selector.next_input(&mut run).unwrap().unwrap();
        assert_eq!(first, Combination::from_values(vec![0, 0, 0]));
        run.record(&first).unwrap();
        // [0,1,1] is the first input covering three fresh pairs.
        let second = selector.next_input(&mut run).unwrap().unwrap();
        assert_eq!(second, Combination::from_values(vec![0, 1, 1]));
    }

    #[test]
    fn test_constructed_candidate_contains_seed_tuple() {
        let model = TestModel::from_sizes(&[3, 3, 3], 2);
        let mut run = run_for(&model);
        let config = GreedyConfig {
            exhaustive_limit: 0,
            ..GreedyConfig::default()
        };
        let mut selector = GreedySelector::new(config);
        let seed = run.coverage().first_uncovered().unwrap();
        let input = selector.next_input(&mut run).unwrap().unwrap();
        assert!(input.is_full());
        assert!(input.contains(&seed).unwrap());
        assert_eq!(run.coverage().count_newly_covered(&input), 3);
    }

    #[test]
    fn test_implicitly_forbidden_tuple_marked_uncoverable() {
        // p0=0 forces p1=1, and p1=1 is forbidden with p2=0; so (p0=0, p2=0)
        // passes the direct checker but has no valid completion.
        let model = TestModel::from_sizes(&[2, 2, 2], 2)
            .with_constraint(Constraint::hard("a0_b0", vec![0, 1], vec![vec![0, 0]]))
            .with_constraint(Constraint::hard("b1_c0", vec![1, 2], vec![vec![1, 0]]));
        for limit in [4_096, 0] {
            let mut run = run_for(&model);
            let mut selector = GreedySelector::new(GreedyConfig {
                exhaustive_limit: limit,
                ..GreedyConfig::default()
            });
            while let Some(input) = selector.next_input(&mut run).unwrap() {
                assert!(run.is_valid(&input).unwrap());
                run.record(&input).unwrap();
            }
            let uncoverable: Vec<_> = run.coverage().uncoverable().cloned().collect();
            assert_eq!(
                uncoverable,
                vec![Combination::from_slots(vec![Some(0), None, Some(0)])]
            );
            assert!(run.coverage().is_complete());
        }
    }

    #[test]
    fn test_complete_partial_reports_impossible() {
        let model = TestModel::from_sizes(&[2, 2], 1)
            .with_constraint(Constraint::hard("no_1", vec![1], vec![vec![1]]))
            .with_constraint(Constraint::hard("no_0", vec![1], vec![vec![0]]));
        let run = run_for(&model);
        let start = Combination::from_slots(vec![Some(0), None]);
        assert_eq!(
            complete_partial(&run, &start, &[0, 1], 10).unwrap(),
            Completion::Impossible
        );
    }

    #[test]
    fn test_same_seed_same_suite() {
        let model = TestModel::from_sizes(&[3, 3, 3, 3], 2);
        let config = GreedyConfig {
            exhaustive_limit: 0,
            seed: 11,
            ..GreedyConfig::default()
        };
        let suite = |config: GreedyConfig| {
            let mut run = run_for(&model);
            let mut selector = GreedySelector::new(config);
            let mut out = vec![];
            while let Some(input) = selector.next_input(&mut run).unwrap() {
                run.record(&input).unwrap();
                out.push(input);
            }
            out
        };
        assert_eq!(suite(config), suite(config));
    }
}

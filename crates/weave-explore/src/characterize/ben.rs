//! Suspicious-tuple ranking.
//!
//! Candidate FICs are the sub-tuples of the failing input, up to
//! `max_fic_size` assignments, that no passing input contains. The smallest
//! and most suspicious candidate is tested in an input where every other
//! parameter moves to a low-suspicion value:
//! - a pass clears every candidate the input contains,
//! - the same failure identifies the candidate and clears its supertuples,
//! - another failure retries with different filler values.
//!
//! When constraints force some other parameter to keep its failing value,
//! the same failure proves nothing about the candidate and is retried like
//! another failure.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use tracing::{debug, warn};

use weave_ir::combination::sub_combinations;
use weave_ir::Combination;

use super::{CharacterizationError, FailureCause, Ledger, Outcome, SearchStrategy};

#[derive(Debug, Clone, Default)]
pub struct Ben {
    failing: Option<(Combination, FailureCause)>,
    suspicious: BTreeSet<Combination>,
    /// Candidate under test and its attempt number.
    current: Option<(Combination, usize)>,
    /// The input for `current` reuses a failing value outside the candidate.
    reuses_failing: bool,
    found: Vec<Combination>,
}

impl Ben {
    /// Smallest size first, then most suspicious, then by parameter and value.
    fn select(&self, ledger: &Ledger, cause: &FailureCause) -> Option<Combination> {
        self.suspicious
            .iter()
            .min_by_key(|t| {
                let assignments: Vec<(usize, usize)> = t.assignments().collect();
                (t.size(), Reverse(ledger.failures_with(t, cause)), assignments)
            })
            .cloned()
    }

    fn retry(&mut self, ledger: &Ledger, tuple: Combination, attempt: usize) {
        if attempt + 1 < ledger.config().max_attempts {
            self.current = Some((tuple, attempt + 1));
        } else {
            debug!(tuple = %tuple, "no conclusive verdict for tuple");
            self.suspicious.remove(&tuple);
        }
    }

    fn finish(&mut self, ledger: &mut Ledger) {
        let Some((failing, cause)) = self.failing.take() else {
            return;
        };
        if self.found.is_empty() {
            warn!(failing = %failing, "no small sub-tuple reproduces the failure; reporting the whole input");
            ledger.identify(failing, &cause);
        }
        for tuple in self.found.drain(..) {
            ledger.identify(tuple, &cause);
        }
    }
}

impl SearchStrategy for Ben {
    fn name(&self) -> &'static str {
        "ben"
    }

    fn begin(&mut self, ledger: &Ledger, failing: &Combination, cause: &FailureCause) {
        let variable = failing.restrict(&ledger.variable_parameters());
        let max_size = ledger.config().max_fic_size.min(variable.size());
        let suspicious = (1..=max_size)
            .flat_map(|size| sub_combinations(&variable, size))
            .filter(|t| !ledger.passes_with(t))
            .collect();
        *self = Self {
            failing: Some((failing.clone(), cause.clone())),
            suspicious,
            ..Self::default()
        };
    }

    fn propose(&mut self, ledger: &mut Ledger) -> Result<Option<Combination>, CharacterizationError> {
        let Some((failing, cause)) = self.failing.clone() else {
            return Ok(None);
        };
        loop {
            let (tuple, attempt) = match self.current.take() {
                Some(current) => current,
                None => match self.select(ledger, &cause) {
                    Some(tuple) => (tuple, 0),
                    None => {
                        self.finish(ledger);
                        return Ok(None);
                    }
                },
            };
            match ledger.isolating_input(&tuple, &failing, attempt)? {
                Some(isolation) => {
                    self.current = Some((tuple, attempt));
                    self.reuses_failing = isolation.reuses_failing;
                    return Ok(Some(isolation.input));
                }
                None => {
                    debug!(tuple = %tuple, "no valid input isolates tuple");
                    self.suspicious.remove(&tuple);
                }
            }
        }
    }

    fn absorb(&mut self, ledger: &Ledger, tested: &Combination, outcome: Outcome) {
        let Some((tuple, attempt)) = self.current.take() else {
            return;
        };
        match outcome {
            Outcome::Passed => {
                self.suspicious.retain(|t| !tested.matches(t));
            }
            Outcome::SameFailure if self.reuses_failing => self.retry(ledger, tuple, attempt),
            Outcome::SameFailure => {
                self.suspicious.retain(|t| !t.matches(&tuple));
                self.found.push(tuple);
            }
            Outcome::OtherFailure(_) => self.retry(ledger, tuple, attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::characterize::{CharacterizationConfig, TestResult};
    use crate::checker::{ForbiddenTupleChecker, NoConstraintChecker};
    use weave_ir::Constraint;

    #[test]
    fn test_passing_inputs_prune_initial_candidates() {
        let mut ledger = Ledger::new(
            Box::new(NoConstraintChecker::new(&[2, 2, 2])),
            CharacterizationConfig {
                max_fic_size: 2,
                ..CharacterizationConfig::default()
            },
        );
        ledger.observe(&Combination::from_values(vec![0, 0, 1]), &TestResult::Passed);
        let failing = Combination::from_values(vec![0, 0, 0]);
        let mut ben = Ben::default();
        ben.begin(&ledger, &failing, &FailureCause::Assertion);
        // (p0=0), (p1=0) and (p0=0, p1=0) already passed.
        assert_eq!(ben.suspicious.len(), 3);
        assert!(ben.suspicious.iter().all(|t| t.get(2) == Some(0)));
    }

    #[test]
    fn test_smallest_candidate_tested_first() {
        let mut ledger = Ledger::new(
            Box::new(NoConstraintChecker::new(&[3, 3])),
            CharacterizationConfig::default(),
        );
        let failing = Combination::from_values(vec![1, 2]);
        let mut ben = Ben::default();
        ben.begin(&ledger, &failing, &FailureCause::Assertion);
        let input = ben.propose(&mut ledger).unwrap().unwrap();
        // (p0=1) comes first; p1 moves away from 2.
        assert_eq!(input.get(0), Some(1));
        assert_ne!(input.get(1), Some(2));
    }

    #[test]
    fn test_failure_with_forced_failing_filler_is_inconclusive() {
        let checker = ForbiddenTupleChecker::new(
            &[2, 2, 2],
            [Constraint::hard("no_11", vec![1, 2], vec![vec![1, 1]])],
        )
        .unwrap();
        let mut ledger = Ledger::new(Box::new(checker), CharacterizationConfig::default());
        let failing = Combination::from_values(vec![0, 0, 0]);
        let mut ben = Ben::default();
        ben.begin(&ledger, &failing, &FailureCause::Assertion);

        // (p0=0) can only be tested next to a failing value.
        let input = ben.propose(&mut ledger).unwrap().unwrap();
        assert_eq!(input, Combination::from_values(vec![0, 1, 0]));
        ben.absorb(&ledger, &input, Outcome::SameFailure);
        assert!(ben.found.is_empty());
        assert_eq!(
            ben.current,
            Some((Combination::from_slots(vec![Some(0), None, None]), 1))
        );
    }
}

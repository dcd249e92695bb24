//! Shared bookkeeping for characterization strategies: observed results,
//! queued failures, identified combinations and construction of isolating
//! test inputs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::info;

use weave_ir::Combination;

use super::{
    CharacterizationConfig, CharacterizationError, Classification, FailureCause, Outcome, TestResult,
};
use crate::checker::ConstraintChecker;

/// Upper bound on partial combinations visited while building one input.
const FILL_BUDGET: usize = 10_000;

/// A test input built to check one candidate combination on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isolation {
    pub input: Combination,
    /// Some parameter outside the candidate kept its failing value, so a
    /// failure of `input` does not implicate the candidate.
    pub reuses_failing: bool,
}

struct Fill<'a> {
    keep: &'a Combination,
    failing: &'a Combination,
    attempt: usize,
    avoid_identified: bool,
    reuse_failing: bool,
}

pub struct Ledger {
    checker: Box<dyn ConstraintChecker>,
    config: CharacterizationConfig,
    passed: BTreeSet<Combination>,
    failed: BTreeMap<Combination, FailureCause>,
    pending: VecDeque<(Combination, FailureCause)>,
    identified: BTreeMap<Combination, Classification>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("passed", &self.passed.len())
            .field("failed", &self.failed.len())
            .field("pending", &self.pending.len())
            .field("identified", &self.identified)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    pub fn new(checker: Box<dyn ConstraintChecker>, config: CharacterizationConfig) -> Self {
        Self {
            checker,
            config,
            passed: BTreeSet::new(),
            failed: BTreeMap::new(),
            pending: VecDeque::new(),
            identified: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &CharacterizationConfig {
        &self.config
    }

    pub fn domain_sizes(&self) -> &[usize] {
        self.checker.domain_sizes()
    }

    /// Parameters that can take more than one value.
    pub fn variable_parameters(&self) -> Vec<usize> {
        (0..self.domain_sizes().len())
            .filter(|&p| self.domain_sizes()[p] > 1)
            .collect()
    }

    pub fn observe(&mut self, input: &Combination, result: &TestResult) {
        match result {
            TestResult::Passed => {
                self.passed.insert(input.clone());
            }
            TestResult::Failed(cause) => {
                self.failed.insert(input.clone(), cause.clone());
            }
        }
    }

    pub fn known_outcome(&self, input: &Combination, cause: &FailureCause) -> Option<Outcome> {
        if self.passed.contains(input) {
            return Some(Outcome::Passed);
        }
        self.failed.get(input).map(|c| {
            if c == cause {
                Outcome::SameFailure
            } else {
                Outcome::OtherFailure(c.clone())
            }
        })
    }

    pub fn passed(&self) -> impl Iterator<Item = &Combination> {
        self.passed.iter()
    }

    /// Whether some passing input contains `tuple`.
    pub fn passes_with(&self, tuple: &Combination) -> bool {
        self.passed.iter().any(|input| input.matches(tuple))
    }

    /// Number of inputs failing with `cause` that contain `tuple`.
    pub fn failures_with(&self, tuple: &Combination, cause: &FailureCause) -> usize {
        self.failed
            .iter()
            .filter(|(input, c)| *c == cause && input.matches(tuple))
            .count()
    }

    /// Whether an identified combination of the same classification is
    /// contained in `input`.
    pub fn is_explained(&self, input: &Combination, cause: &FailureCause) -> bool {
        let class = Classification::from(cause);
        self.identified
            .iter()
            .any(|(tuple, c)| *c == class && input.matches(tuple))
    }

    pub fn queue_failure(&mut self, input: &Combination, cause: &FailureCause) {
        if self.is_explained(input, cause) || self.pending.iter().any(|(i, _)| i == input) {
            return;
        }
        self.pending.push_back((input.clone(), cause.clone()));
    }

    /// Pop the next queued failure that no identified combination explains.
    pub fn next_pending(&mut self) -> Option<(Combination, FailureCause)> {
        while let Some((input, cause)) = self.pending.pop_front() {
            if !self.is_explained(&input, &cause) {
                return Some((input, cause));
            }
        }
        None
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn identify(&mut self, tuple: Combination, cause: &FailureCause) {
        let class = Classification::from(cause);
        info!(combination = %tuple, ?class, "identified failure-inducing combination");
        self.identified.insert(tuple, class);
    }

    pub fn identified(&self) -> &BTreeMap<Combination, Classification> {
        &self.identified
    }

    pub fn is_valid(&self, combination: &Combination) -> Result<bool, CharacterizationError> {
        Ok(self.checker.is_valid(combination)?)
    }

    /// `failing` with `parameter` switched to its `attempt`-th alternative
    /// value for which the input stays valid. Values of passing inputs come
    /// first, then the least suspicious.
    pub fn switched(
        &self,
        failing: &Combination,
        parameter: usize,
        attempt: usize,
    ) -> Result<Option<Combination>, CharacterizationError> {
        let original = failing.get(parameter);
        let mut alternatives: Vec<usize> = (0..self.domain_sizes()[parameter])
            .filter(|&v| Some(v) != original)
            .collect();
        alternatives.sort_by_key(|&v| {
            let with = Combination::empty(failing.len()).with(parameter, Some(v));
            (!self.passes_with(&with), self.suspicion(&with))
        });

        let mut valid = 0;
        for v in alternatives {
            let candidate = failing.with(parameter, Some(v));
            if self.is_valid(&candidate)? {
                if valid == attempt {
                    return Ok(Some(candidate));
                }
                valid += 1;
            }
        }
        Ok(None)
    }

    /// A valid full input keeping `keep` and moving every other parameter
    /// away from its value in `failing`. Filler values are ordered by
    /// ascending suspicion and rotated by `attempt`; inputs containing an
    /// identified combination are avoided when possible. Failing values are
    /// only reused when no completion without them exists.
    pub fn isolating_input(
        &self,
        keep: &Combination,
        failing: &Combination,
        attempt: usize,
    ) -> Result<Option<Isolation>, CharacterizationError> {
        if !self.is_valid(keep)? {
            return Ok(None);
        }
        for reuse_failing in [false, true] {
            for avoid_identified in [true, false] {
                let fill = Fill {
                    keep,
                    failing,
                    attempt,
                    avoid_identified,
                    reuse_failing,
                };
                let mut budget = FILL_BUDGET;
                if let Some(input) = self.fill(keep.clone(), &fill, 0, &mut budget)? {
                    let reuses_failing = keep
                        .unassigned_parameters()
                        .into_iter()
                        .any(|p| self.domain_sizes()[p] > 1 && input.get(p) == failing.get(p));
                    return Ok(Some(Isolation {
                        input,
                        reuses_failing,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn fill(
        &self,
        current: Combination,
        fill: &Fill<'_>,
        from: usize,
        budget: &mut usize,
    ) -> Result<Option<Combination>, CharacterizationError> {
        let Some(parameter) = (from..current.len()).find(|&p| current.get(p).is_none()) else {
            return Ok(Some(current));
        };
        let failing_value = fill.failing.get(parameter);
        for value in self.filler_values(parameter, failing_value, fill.attempt, fill.reuse_failing) {
            if *budget == 0 {
                return Ok(None);
            }
            *budget -= 1;

            let next = current.with(parameter, Some(value));
            if !self.is_valid(&next)? {
                continue;
            }
            if fill.avoid_identified
                && self
                    .identified
                    .keys()
                    .any(|t| !fill.keep.matches(t) && next.matches(t))
            {
                continue;
            }
            if let Some(done) = self.fill(next, fill, parameter + 1, budget)? {
                return Ok(Some(done));
            }
        }
        Ok(None)
    }

    /// Values other than the failing one, least suspicious first and
    /// rotated by `attempt`; the failing value comes last if allowed or if
    /// it is the only value.
    fn filler_values(
        &self,
        parameter: usize,
        failing_value: Option<usize>,
        attempt: usize,
        reuse_failing: bool,
    ) -> Vec<usize> {
        let n = self.domain_sizes().len();
        let mut others: Vec<usize> = (0..self.domain_sizes()[parameter])
            .filter(|&v| Some(v) != failing_value)
            .collect();
        others.sort_by_key(|&v| self.suspicion(&Combination::empty(n).with(parameter, Some(v))));
        if !others.is_empty() {
            let shift = attempt % others.len();
            others.rotate_left(shift);
        }
        if reuse_failing || others.is_empty() {
            others.extend(failing_value);
        }
        others
    }

    /// Failing inputs containing `tuple` minus passing ones.
    pub fn suspicion(&self, tuple: &Combination) -> i64 {
        let failing = self.failed.keys().filter(|i| i.matches(tuple)).count() as i64;
        let passing = self.passed.iter().filter(|i| i.matches(tuple)).count() as i64;
        failing - passing
    }
}

//! Adaptive fault characterization.
//!
//! Given a failing test input, a [`FaultCharacterization`] proposes further
//! inputs one at a time and narrows the failure down to minimal
//! failure-inducing combinations (FICs). The caller executes each proposed
//! input and feeds the result back.
//!
//! Three search strategies plug into one driver, [`Characterizer`]:
//! - [`ofot::Ofot`]: switch one parameter at a time.
//! - [`ben::Ben`]: test the most suspicious small sub-tuples in isolation.
//! - [`mixtgte::Mixtgte`]: resolve a lattice of sub-tuples with status
//!   propagation.
//!
//! Failures with a different cause than the one under search are never
//! folded into the current FIC; they are queued and searched on restart.

pub mod ben;
pub mod ledger;
pub mod mixtgte;
pub mod ofot;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use weave_ir::{Combination, TupleError};

use crate::checker::{CheckerError, ConstraintChecker};

pub use ledger::{Isolation, Ledger};

/// Why a test failed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    /// An assertion-style failure without a distinguishing error type.
    Assertion,
    /// A thrown error, identified by its type name.
    Exception { error_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum TestResult {
    Passed,
    Failed(FailureCause),
}

impl TestResult {
    pub fn exception(error_type: impl Into<String>) -> Self {
        Self::Failed(FailureCause::Exception {
            error_type: error_type.into(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What an identified combination induces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    FailureInducing,
    ExceptionInducing { error_type: String },
}

impl From<&FailureCause> for Classification {
    fn from(cause: &FailureCause) -> Self {
        match cause {
            FailureCause::Assertion => Self::FailureInducing,
            FailureCause::Exception { error_type } => Self::ExceptionInducing {
                error_type: error_type.clone(),
            },
        }
    }
}

/// A test result relative to the failure currently being characterized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    SameFailure,
    OtherFailure(FailureCause),
}

impl Outcome {
    pub fn relative_to(result: &TestResult, cause: &FailureCause) -> Self {
        match result {
            TestResult::Passed => Self::Passed,
            TestResult::Failed(c) if c == cause => Self::SameFailure,
            TestResult::Failed(c) => Self::OtherFailure(c.clone()),
        }
    }
}

/// Search budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterizationConfig {
    /// Largest FIC size searched for by Ben and Mixtgte.
    pub max_fic_size: usize,
    /// Tries per candidate when tests keep failing for another cause.
    pub max_attempts: usize,
}

impl Default for CharacterizationConfig {
    fn default() -> Self {
        Self {
            max_fic_size: 3,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterizationKind {
    Ofot,
    #[default]
    Ben,
    Mixtgte,
}

#[derive(Debug, thiserror::Error)]
pub enum CharacterizationError {
    #[error("malformed combination: {0}")]
    Tuple(#[from] TupleError),

    #[error("constraint check failed: {0}")]
    Checker(#[from] CheckerError),

    #[error("identification needs a failing result")]
    NotFailing,

    #[error("no identification in progress")]
    NotStarted,

    #[error("result reported for {actual}, but the pending candidate is {expected}")]
    UnexpectedCandidate {
        expected: Combination,
        actual: Combination,
    },
}

/// Interactive FIC search protocol.
pub trait FaultCharacterization {
    fn name(&self) -> &str;

    /// Start searching sub-combinations of `failing`; returns the first
    /// input to execute.
    fn start_identification(
        &mut self,
        failing: &Combination,
        result: &TestResult,
    ) -> Result<Option<Combination>, CharacterizationError>;

    /// Consume the result of the last proposed input and propose the next,
    /// or `None` once the current search is exhausted.
    fn generate_next_test_input_for_identification(
        &mut self,
        tested: &Combination,
        result: &TestResult,
    ) -> Result<Option<Combination>, CharacterizationError>;

    /// Start on the next queued failure not explained by an identified
    /// combination.
    fn restart_identification(&mut self) -> Result<Option<Combination>, CharacterizationError>;

    /// Queue a failure observed elsewhere for a later restart.
    fn register_failure(
        &mut self,
        combination: &Combination,
        result: &TestResult,
    ) -> Result<(), CharacterizationError>;

    fn identified_combinations(&self) -> BTreeMap<Combination, Classification>;
}

/// One FIC search over a single failing input.
pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    /// Reset for a new failing input.
    fn begin(&mut self, ledger: &Ledger, failing: &Combination, cause: &FailureCause);

    /// The next input to test, or `None` after recording the FICs found.
    fn propose(&mut self, ledger: &mut Ledger) -> Result<Option<Combination>, CharacterizationError>;

    /// Fold in the outcome of the last proposed input.
    fn absorb(&mut self, ledger: &Ledger, tested: &Combination, outcome: Outcome);
}

#[derive(Debug, Clone)]
struct ActiveSearch {
    cause: FailureCause,
    awaiting: Option<Combination>,
}

/// Drives a [`SearchStrategy`] through the [`FaultCharacterization`] protocol.
pub struct Characterizer {
    ledger: Ledger,
    strategy: Box<dyn SearchStrategy>,
    active: Option<ActiveSearch>,
}

impl std::fmt::Debug for Characterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Characterizer")
            .field("strategy", &self.strategy.name())
            .field("ledger", &self.ledger)
            .field("active", &self.active)
            .finish()
    }
}

impl Characterizer {
    pub fn new(
        checker: &dyn ConstraintChecker,
        strategy: Box<dyn SearchStrategy>,
        config: CharacterizationConfig,
    ) -> Result<Self, CharacterizationError> {
        Ok(Self {
            ledger: Ledger::new(checker.box_clone()?, config),
            strategy,
            active: None,
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Advance the strategy until it proposes an input with no known result.
    fn drive(&mut self) -> Result<Option<Combination>, CharacterizationError> {
        let Some(active) = self.active.as_mut() else {
            return Err(CharacterizationError::NotStarted);
        };
        loop {
            let Some(candidate) = self.strategy.propose(&mut self.ledger)? else {
                self.active = None;
                return Ok(None);
            };
            match self.ledger.known_outcome(&candidate, &active.cause) {
                Some(outcome) => {
                    debug!(candidate = %candidate, ?outcome, "reusing known result");
                    self.strategy.absorb(&self.ledger, &candidate, outcome);
                }
                None => {
                    active.awaiting = Some(candidate.clone());
                    return Ok(Some(candidate));
                }
            }
        }
    }
}

impl FaultCharacterization for Characterizer {
    fn name(&self) -> &str {
        self.strategy.name()
    }

    fn start_identification(
        &mut self,
        failing: &Combination,
        result: &TestResult,
    ) -> Result<Option<Combination>, CharacterizationError> {
        let TestResult::Failed(cause) = result else {
            return Err(CharacterizationError::NotFailing);
        };
        failing.validate_full(self.ledger.domain_sizes())?;
        self.ledger.observe(failing, result);
        debug!(strategy = self.strategy.name(), failing = %failing, ?cause, "starting identification");

        self.strategy.begin(&self.ledger, failing, cause);
        self.active = Some(ActiveSearch {
            cause: cause.clone(),
            awaiting: None,
        });
        self.drive()
    }

    fn generate_next_test_input_for_identification(
        &mut self,
        tested: &Combination,
        result: &TestResult,
    ) -> Result<Option<Combination>, CharacterizationError> {
        let active = self.active.as_mut().ok_or(CharacterizationError::NotStarted)?;
        match active.awaiting.take() {
            Some(expected) if expected == *tested => {}
            Some(expected) => {
                active.awaiting = Some(expected.clone());
                return Err(CharacterizationError::UnexpectedCandidate {
                    expected,
                    actual: tested.clone(),
                });
            }
            None => return Err(CharacterizationError::NotStarted),
        }

        let outcome = Outcome::relative_to(result, &active.cause);
        self.ledger.observe(tested, result);
        if let Outcome::OtherFailure(cause) = &outcome {
            self.ledger.queue_failure(tested, cause);
        }
        self.strategy.absorb(&self.ledger, tested, outcome);
        self.drive()
    }

    fn restart_identification(&mut self) -> Result<Option<Combination>, CharacterizationError> {
        self.active = None;
        while let Some((failing, cause)) = self.ledger.next_pending() {
            let first = self.start_identification(&failing, &TestResult::Failed(cause))?;
            if first.is_some() {
                return Ok(first);
            }
        }
        Ok(None)
    }

    fn register_failure(
        &mut self,
        combination: &Combination,
        result: &TestResult,
    ) -> Result<(), CharacterizationError> {
        let TestResult::Failed(cause) = result else {
            return Err(CharacterizationError::NotFailing);
        };
        combination.validate_full(self.ledger.domain_sizes())?;
        self.ledger.observe(combination, result);
        self.ledger.queue_failure(combination, cause);
        Ok(())
    }

    fn identified_combinations(&self) -> BTreeMap<Combination, Classification> {
        self.ledger.identified().clone()
    }
}

/// Build a characterizer of the given kind over a snapshot of `checker`.
pub fn build_characterizer(
    kind: CharacterizationKind,
    checker: &dyn ConstraintChecker,
    config: CharacterizationConfig,
) -> Result<Box<dyn FaultCharacterization>, CharacterizationError> {
    let strategy: Box<dyn SearchStrategy> = match kind {
        CharacterizationKind::Ofot => Box::new(ofot::Ofot::default()),
        CharacterizationKind::Ben => Box::new(ben::Ben::default()),
        CharacterizationKind::Mixtgte => Box::new(mixtgte::Mixtgte::default()),
    };
    Ok(Box::new(Characterizer::new(checker, strategy, config)?))
}

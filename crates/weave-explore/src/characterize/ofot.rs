//! One factor at a time.
//!
//! Each variable parameter of the failing input is switched to another
//! value while everything else stays put. If the switched input passes, the
//! parameter takes part in the failure; if it still fails the same way, it
//! does not. A failure with another cause is retried with a different value
//! and counts as relevant once the attempts run out.

use tracing::{debug, warn};

use weave_ir::Combination;

use super::{CharacterizationError, FailureCause, Ledger, Outcome, SearchStrategy};

#[derive(Debug, Clone, Default)]
pub struct Ofot {
    failing: Option<(Combination, FailureCause)>,
    parameters: Vec<usize>,
    index: usize,
    attempt: usize,
    relevant: Vec<usize>,
}

impl Ofot {
    fn next_parameter(&mut self) {
        self.index += 1;
        self.attempt = 0;
    }

    fn finish(&mut self, ledger: &mut Ledger) {
        let Some((failing, cause)) = self.failing.take() else {
            return;
        };
        if self.relevant.is_empty() {
            warn!(failing = %failing, "no single parameter isolates the failure; reporting the whole input");
            ledger.identify(failing, &cause);
        } else {
            ledger.identify(failing.restrict(&self.relevant), &cause);
        }
    }
}

impl SearchStrategy for Ofot {
    fn name(&self) -> &'static str {
        "ofot"
    }

    fn begin(&mut self, ledger: &Ledger, failing: &Combination, cause: &FailureCause) {
        *self = Self {
            failing: Some((failing.clone(), cause.clone())),
            parameters: ledger.variable_parameters(),
            ..Self::default()
        };
    }

    fn propose(&mut self, ledger: &mut Ledger) -> Result<Option<Combination>, CharacterizationError> {
        let Some((failing, _)) = self.failing.clone() else {
            return Ok(None);
        };
        while let Some(&parameter) = self.parameters.get(self.index) {
            if let Some(candidate) = ledger.switched(&failing, parameter, self.attempt)? {
                return Ok(Some(candidate));
            }
            // No valid value left to compare against.
            debug!(parameter, "parameter cannot be switched; treating as relevant");
            self.relevant.push(parameter);
            self.next_parameter();
        }
        self.finish(ledger);
        Ok(None)
    }

    fn absorb(&mut self, ledger: &Ledger, _tested: &Combination, outcome: Outcome) {
        let Some(&parameter) = self.parameters.get(self.index) else {
            return;
        };
        match outcome {
            Outcome::Passed => {
                self.relevant.push(parameter);
                self.next_parameter();
            }
            Outcome::SameFailure => self.next_parameter(),
            Outcome::OtherFailure(_) => {
                self.attempt += 1;
                if self.attempt >= ledger.config().max_attempts {
                    self.relevant.push(parameter);
                    self.next_parameter();
                }
            }
        }
    }
}

//! Tuple-relationship lattice search.
//!
//! Nodes are the sub-tuples of the failing input up to `max_fic_size`
//! assignments. Statuses propagate along containment: a healthy node makes
//! every sub-tuple healthy, a faulty node makes every supertuple faulty.
//! Each round tests the unknown node whose verdict settles the most other
//! nodes in the worst case. When nothing is unknown, the minimal faulty
//! nodes are the FICs.
//!
//! A failure only marks a node faulty if every parameter outside it moved
//! away from its failing value. Otherwise the node is retried and ends up
//! untestable.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use weave_ir::combination::sub_combinations;
use weave_ir::Combination;

use super::{CharacterizationError, FailureCause, Ledger, Outcome, SearchStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unknown,
    Healthy,
    Faulty,
    /// No usable verdict could be obtained.
    Untestable,
}

/// `sub` is a strict sub-tuple of `sup`.
fn is_strict_sub(sub: &Combination, sup: &Combination) -> bool {
    sub.size() < sup.size() && sup.matches(sub)
}

#[derive(Debug, Clone, Default)]
pub struct Mixtgte {
    failing: Option<(Combination, FailureCause)>,
    nodes: BTreeMap<Combination, Status>,
    current: Option<(Combination, usize)>,
    reuses_failing: bool,
}

impl Mixtgte {
    fn mark_healthy(&mut self, node: &Combination) {
        for (other, status) in self.nodes.iter_mut() {
            if *status == Status::Unknown && (other == node || is_strict_sub(other, node)) {
                *status = Status::Healthy;
            }
        }
    }

    fn mark_faulty(&mut self, node: &Combination) {
        for (other, status) in self.nodes.iter_mut() {
            if *status == Status::Unknown && (other == node || is_strict_sub(node, other)) {
                *status = Status::Faulty;
            }
        }
    }

    fn retry(&mut self, ledger: &Ledger, node: Combination, attempt: usize) {
        if attempt + 1 < ledger.config().max_attempts {
            self.current = Some((node, attempt + 1));
        } else {
            debug!(node = %node, "no conclusive verdict for node");
            self.nodes.insert(node, Status::Untestable);
        }
    }

    /// Unknown node maximizing the statuses settled by either verdict.
    fn select(&self) -> Option<Combination> {
        let unknown: Vec<&Combination> = self
            .nodes
            .iter()
            .filter(|(_, s)| **s == Status::Unknown)
            .map(|(n, _)| n)
            .collect();
        unknown
            .iter()
            .map(|&node| {
                let subs = unknown.iter().filter(|o| is_strict_sub(o, node)).count();
                let sups = unknown.iter().filter(|o| is_strict_sub(node, o)).count();
                let assignments: Vec<(usize, usize)> = node.assignments().collect();
                (subs.min(sups), node.size(), assignments, node)
            })
            .min_by(|a, b| {
                b.0.cmp(&a.0)
                    .then_with(|| a.1.cmp(&b.1))
                    .then_with(|| a.2.cmp(&b.2))
            })
            .map(|(_, _, _, node)| node.clone())
    }

    fn finish(&mut self, ledger: &mut Ledger) {
        let Some((failing, cause)) = self.failing.take() else {
            return;
        };
        let faulty: Vec<&Combination> = self
            .nodes
            .iter()
            .filter(|(_, s)| **s == Status::Faulty)
            .map(|(n, _)| n)
            .collect();
        let minimal: Vec<Combination> = faulty
            .iter()
            .filter(|&&node| !faulty.iter().any(|other| is_strict_sub(other, node)))
            .map(|&node| node.clone())
            .collect();

        if minimal.is_empty() {
            warn!(failing = %failing, "no faulty sub-tuple found; reporting the whole input");
            ledger.identify(failing, &cause);
        }
        for node in minimal {
            ledger.identify(node, &cause);
        }
    }
}

impl SearchStrategy for Mixtgte {
    fn name(&self) -> &'static str {
        "mixtgte"
    }

    fn begin(&mut self, ledger: &Ledger, failing: &Combination, cause: &FailureCause) {
        let variable = failing.restrict(&ledger.variable_parameters());
        let max_size = ledger.config().max_fic_size.min(variable.size());
        let mut nodes = BTreeMap::new();
        for size in 1..=max_size {
            for node in sub_combinations(&variable, size) {
                let status = if ledger.passes_with(&node) {
                    Status::Healthy
                } else {
                    Status::Unknown
                };
                nodes.insert(node, status);
            }
        }
        *self = Self {
            failing: Some((failing.clone(), cause.clone())),
            nodes,
            ..Self::default()
        };
    }

    fn propose(&mut self, ledger: &mut Ledger) -> Result<Option<Combination>, CharacterizationError> {
        let Some((failing, _)) = self.failing.clone() else {
            return Ok(None);
        };
        loop {
            let (node, attempt) = match self.current.take() {
                Some(current) => current,
                None => match self.select() {
                    Some(node) => (node, 0),
                    None => {
                        self.finish(ledger);
                        return Ok(None);
                    }
                },
            };
            match ledger.isolating_input(&node, &failing, attempt)? {
                Some(isolation) => {
                    self.current = Some((node, attempt));
                    self.reuses_failing = isolation.reuses_failing;
                    return Ok(Some(isolation.input));
                }
                None => {
                    debug!(node = %node, "no valid input isolates node");
                    self.nodes.insert(node, Status::Untestable);
                }
            }
        }
    }

    fn absorb(&mut self, ledger: &Ledger, tested: &Combination, outcome: Outcome) {
        let Some((node, attempt)) = self.current.take() else {
            return;
        };
        match outcome {
            Outcome::Passed => {
                // Every node the input contains passed along with it.
                let contained: Vec<Combination> = self
                    .nodes
                    .keys()
                    .filter(|n| tested.matches(n))
                    .cloned()
                    .collect();
                for n in &contained {
                    self.mark_healthy(n);
                }
            }
            Outcome::SameFailure if self.reuses_failing => self.retry(ledger, node, attempt),
            Outcome::SameFailure => self.mark_faulty(&node),
            Outcome::OtherFailure(_) => self.retry(ledger, node, attempt),
        }
    }
}

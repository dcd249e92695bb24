//! Coverage map for strength-t covering arrays.
//!
//! Every valid t-way tuple is tracked as covered or uncovered, grouped by its
//! parameter subset. Recording a test input projects it onto each subset, so
//! the cost per input is one lookup per subset rather than a scan over all
//! tuples.
//!
//! The map always mirrors the constraint set it was last synced with:
//! [`CoverageMap::update_constraints`] drops tuples that became invalid and
//! restores tuples that became valid again.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use weave_ir::combination::{parameter_subsets, value_product};
use weave_ir::{Combination, TupleError};

use crate::checker::{CheckerError, ConstraintChecker};

#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("malformed combination: {0}")]
    Tuple(#[from] TupleError),

    #[error("constraint check failed: {0}")]
    Checker(#[from] CheckerError),

    #[error("tuple assigns {actual} parameters but strength is {expected}")]
    NotATWayTuple { expected: usize, actual: usize },
}

/// Summary counts for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageStats {
    /// Tuples that must be covered (covered + uncovered).
    pub required: usize,
    pub covered: usize,
    /// Tuples removed because no valid test input can contain them.
    pub uncoverable: usize,
}

impl CoverageStats {
    pub fn ratio(&self) -> f64 {
        if self.required == 0 {
            1.0
        } else {
            self.covered as f64 / self.required as f64
        }
    }
}

#[derive(Debug, Clone)]
struct SubsetCoverage {
    parameters: Vec<usize>,
    uncovered: BTreeSet<Vec<usize>>,
    covered: BTreeSet<Vec<usize>>,
}

impl SubsetCoverage {
    /// The input's values on this subset, if it assigns all of them.
    fn project(&self, combination: &Combination) -> Option<Vec<usize>> {
        self.parameters
            .iter()
            .map(|&p| combination.get(p))
            .collect()
    }

    fn tuple(&self, parameter_count: usize, values: &[usize]) -> Combination {
        let mut tuple = Combination::empty(parameter_count);
        for (&p, &v) in self.parameters.iter().zip(values) {
            tuple.set(p, Some(v));
        }
        tuple
    }
}

/// Covered/uncovered state of every required t-way tuple.
#[derive(Debug, Clone)]
pub struct CoverageMap {
    domain_sizes: Vec<usize>,
    strength: usize,
    subsets: Vec<SubsetCoverage>,
    index: BTreeMap<Vec<usize>, usize>,
    /// Every input recorded so far, in order.
    history: Vec<Combination>,
    uncoverable: BTreeSet<Combination>,
    forbidden: BTreeSet<Combination>,
    revision: u64,
}

impl CoverageMap {
    /// Enumerate every t-way tuple the checker accepts; all start uncovered.
    pub fn new(
        domain_sizes: &[usize],
        strength: usize,
        checker: &dyn ConstraintChecker,
    ) -> Result<Self, CoverageError> {
        let parameters = domain_sizes.len();
        if strength == 0 || strength > parameters {
            return Err(TupleError::InvalidStrength {
                strength,
                parameters,
            }
            .into());
        }
        if checker.domain_sizes().len() != parameters {
            return Err(TupleError::LengthMismatch {
                expected: checker.domain_sizes().len(),
                actual: parameters,
            }
            .into());
        }

        let subsets: Vec<SubsetCoverage> = parameter_subsets(parameters, strength)
            .into_iter()
            .map(|parameters| SubsetCoverage {
                parameters,
                uncovered: BTreeSet::new(),
                covered: BTreeSet::new(),
            })
            .collect();
        let index = subsets
            .iter()
            .enumerate()
            .map(|(i, s)| (s.parameters.clone(), i))
            .collect();

        let mut map = Self {
            domain_sizes: domain_sizes.to_vec(),
            strength,
            subsets,
            index,
            history: Vec::new(),
            uncoverable: BTreeSet::new(),
            forbidden: BTreeSet::new(),
            revision: 0,
        };
        map.update_constraints(checker)?;
        Ok(map)
    }

    pub fn strength(&self) -> usize {
        self.strength
    }

    pub fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    /// Checker revision this map was last synced with.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every input recorded so far.
    pub fn history(&self) -> &[Combination] {
        &self.history
    }

    /// Mark every required tuple contained in `test_input` covered.
    /// Returns the number of newly covered tuples.
    pub fn update_coverage(&mut self, test_input: &Combination) -> Result<usize, CoverageError> {
        test_input.validate_full(&self.domain_sizes)?;
        let mut newly = 0;
        for subset in &mut self.subsets {
            if let Some(values) = subset.project(test_input) {
                if subset.uncovered.remove(&values) {
                    subset.covered.insert(values);
                    newly += 1;
                }
            }
        }
        self.history.push(test_input.clone());
        Ok(newly)
    }

    /// Re-derive the required set from the checker's current constraints.
    ///
    /// Tuples the checker now rejects are dropped whatever their state.
    /// Tuples it accepts again are restored, covered iff some recorded input
    /// contains them. Uncoverable verdicts survive only while the forbidden
    /// set has not shrunk, and a tuple the checker rejects is never counted
    /// as uncoverable.
    pub fn update_constraints(&mut self, checker: &dyn ConstraintChecker) -> Result<(), CoverageError> {
        let forbidden: BTreeSet<Combination> = checker.forbidden_tuples().into_iter().collect();
        if !forbidden.is_superset(&self.forbidden) {
            self.uncoverable.clear();
        }
        let mut rejected = Vec::new();
        for tuple in &self.uncoverable {
            if !checker.is_valid(tuple)? {
                rejected.push(tuple.clone());
            }
        }
        for tuple in &rejected {
            self.uncoverable.remove(tuple);
        }

        let parameter_count = self.domain_sizes.len();
        for subset in &mut self.subsets {
            let mut uncovered = BTreeSet::new();
            let mut covered = BTreeSet::new();
            for values in value_product(&self.domain_sizes, &subset.parameters) {
                let tuple = subset.tuple(parameter_count, &values);
                if self.uncoverable.contains(&tuple) || !checker.is_valid(&tuple)? {
                    continue;
                }
                if self.history.iter().any(|input| input.matches(&tuple)) {
                    covered.insert(values);
                } else {
                    uncovered.insert(values);
                }
            }
            subset.uncovered = uncovered;
            subset.covered = covered;
        }

        self.forbidden = forbidden;
        self.revision = checker.revision();
        Ok(())
    }

    fn locate(&self, tuple: &Combination) -> Result<Option<(usize, Vec<usize>)>, CoverageError> {
        tuple.validate(&self.domain_sizes)?;
        let parameters = tuple.assigned_parameters();
        if parameters.len() != self.strength {
            return Err(CoverageError::NotATWayTuple {
                expected: self.strength,
                actual: parameters.len(),
            });
        }
        let values = tuple.assignments().map(|(_, v)| v).collect();
        Ok(self.index.get(&parameters).map(|&i| (i, values)))
    }

    pub fn is_covered(&self, tuple: &Combination) -> Result<bool, CoverageError> {
        Ok(self
            .locate(tuple)?
            .is_some_and(|(i, values)| self.subsets[i].covered.contains(&values)))
    }

    /// Whether the tuple still counts towards completeness.
    pub fn is_required(&self, tuple: &Combination) -> Result<bool, CoverageError> {
        Ok(self.locate(tuple)?.is_some_and(|(i, values)| {
            self.subsets[i].covered.contains(&values) || self.subsets[i].uncovered.contains(&values)
        }))
    }

    pub fn is_complete(&self) -> bool {
        self.subsets.iter().all(|s| s.uncovered.is_empty())
    }

    /// The lexicographically first uncovered tuple over `parameters`.
    pub fn uncovered_for_parameters(&self, parameters: &[usize]) -> Option<Combination> {
        let subset = &self.subsets[*self.index.get(parameters)?];
        subset
            .uncovered
            .first()
            .map(|values| subset.tuple(self.domain_sizes.len(), values))
    }

    /// The first uncovered tuple in subset order.
    pub fn first_uncovered(&self) -> Option<Combination> {
        self.subsets.iter().find_map(|subset| {
            subset
                .uncovered
                .first()
                .map(|values| subset.tuple(self.domain_sizes.len(), values))
        })
    }

    pub fn uncovered_tuples(&self) -> Vec<Combination> {
        self.uncovered_where(|_| true)
    }

    /// Uncovered tuples of every subset whose parameter list passes `filter`.
    pub fn uncovered_where(&self, filter: impl Fn(&[usize]) -> bool) -> Vec<Combination> {
        let parameter_count = self.domain_sizes.len();
        self.subsets
            .iter()
            .filter(|s| filter(&s.parameters))
            .flat_map(|s| s.uncovered.iter().map(move |v| s.tuple(parameter_count, v)))
            .collect()
    }

    /// Uncovered tuples a (possibly partial) candidate would cover.
    pub fn count_newly_covered(&self, candidate: &Combination) -> usize {
        self.subsets
            .iter()
            .filter(|subset| {
                subset
                    .project(candidate)
                    .is_some_and(|values| subset.uncovered.contains(&values))
            })
            .count()
    }

    /// Remove an uncovered tuple from the required set for good.
    /// Returns false if the tuple was not uncovered.
    pub fn mark_uncoverable(&mut self, tuple: &Combination) -> Result<bool, CoverageError> {
        let Some((i, values)) = self.locate(tuple)? else {
            return Ok(false);
        };
        if !self.subsets[i].uncovered.remove(&values) {
            return Ok(false);
        }
        self.uncoverable.insert(tuple.clone());
        Ok(true)
    }

    pub fn uncoverable(&self) -> impl Iterator<Item = &Combination> {
        self.uncoverable.iter()
    }

    pub fn stats(&self) -> CoverageStats {
        let (covered, uncovered) = self
            .subsets
            .iter()
            .fold((0, 0), |(c, u), s| (c + s.covered.len(), u + s.uncovered.len()));
        CoverageStats {
            required: covered + uncovered,
            covered,
            uncoverable: self.uncoverable.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{ForbiddenTupleChecker, NoConstraintChecker};
    use weave_ir::Constraint;

    fn pair(n: usize, a: (usize, usize), b: (usize, usize)) -> Combination {
        Combination::from_assignments(n, &[a, b]).unwrap()
    }

    #[test]
    fn test_new_map_requires_every_valid_tuple() {
        let checker = NoConstraintChecker::new(&[2, 3, 2]);
        let map = CoverageMap::new(&[2, 3, 2], 2, &checker).unwrap();
        // 2*3 + 2*2 + 3*2
        assert_eq!(map.stats().required, 16);
        assert_eq!(map.stats().covered, 0);
        assert!(!map.is_complete());
    }

    #[test]
    fn test_forbidden_tuples_never_required() {
        let checker = ForbiddenTupleChecker::new(
            &[2, 2],
            [Constraint::hard("no_11", vec![0, 1], vec![vec![1, 1]])],
        )
        .unwrap();
        let map = CoverageMap::new(&[2, 2], 2, &checker).unwrap();
        assert_eq!(map.stats().required, 3);
        assert!(!map.is_required(&pair(2, (0, 1), (1, 1))).unwrap());
    }

    #[test]
    fn test_update_coverage_counts_new_tuples() {
        let checker = NoConstraintChecker::new(&[2, 2, 2]);
        let mut map = CoverageMap::new(&[2, 2, 2], 2, &checker).unwrap();
        let input = Combination::from_values(vec![0, 0, 0]);
        assert_eq!(map.update_coverage(&input).unwrap(), 3);
        assert_eq!(map.update_coverage(&input).unwrap(), 0);
        assert!(map.is_covered(&pair(3, (0, 0), (2, 0))).unwrap());
        assert!(!map.is_covered(&pair(3, (0, 1), (2, 0))).unwrap());
    }

    #[test]
    fn test_update_coverage_rejects_partial_input() {
        let checker = NoConstraintChecker::new(&[2, 2]);
        let mut map = CoverageMap::new(&[2, 2], 1, &checker).unwrap();
        let partial = Combination::from_slots(vec![Some(0), None]);
        assert!(matches!(
            map.update_coverage(&partial),
            Err(CoverageError::Tuple(TupleError::NotFull(1)))
        ));
        assert!(map.history().is_empty());
    }

    #[test]
    fn test_is_covered_rejects_wrong_size() {
        let checker = NoConstraintChecker::new(&[2, 2, 2]);
        let map = CoverageMap::new(&[2, 2, 2], 2, &checker).unwrap();
        let single = Combination::from_slots(vec![Some(0), None, None]);
        assert!(matches!(
            map.is_covered(&single),
            Err(CoverageError::NotATWayTuple { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_uncovered_for_parameters_is_lexicographic() {
        let checker = NoConstraintChecker::new(&[2, 2, 2]);
        let mut map = CoverageMap::new(&[2, 2, 2], 2, &checker).unwrap();
        map.update_coverage(&Combination::from_values(vec![0, 0, 0])).unwrap();
        assert_eq!(map.uncovered_for_parameters(&[0, 2]), Some(pair(3, (0, 0), (2, 1))));
        assert_eq!(map.uncovered_for_parameters(&[1, 0]), None);
    }

    #[test]
    fn test_count_newly_covered_on_partial_candidate() {
        let checker = NoConstraintChecker::new(&[2, 2, 2]);
        let map = CoverageMap::new(&[2, 2, 2], 2, &checker).unwrap();
        let partial = Combination::from_slots(vec![Some(0), Some(1), None]);
        assert_eq!(map.count_newly_covered(&partial), 1);
        assert_eq!(map.count_newly_covered(&Combination::from_values(vec![0, 1, 1])), 3);
    }

    #[test]
    fn test_constraint_change_drops_and_restores() {
        let mut checker = ForbiddenTupleChecker::new(&[2, 2], []).unwrap();
        let mut map = CoverageMap::new(&[2, 2], 2, &checker).unwrap();
        map.update_coverage(&Combination::from_values(vec![1, 1])).unwrap();
        assert_eq!(map.stats().covered, 1);

        let id = checker
            .add_constraint(Constraint::hard("no_11", vec![0, 1], vec![vec![1, 1]]))
            .unwrap();
        map.update_constraints(&checker).unwrap();
        assert_eq!(map.stats(), CoverageStats { required: 3, covered: 0, uncoverable: 0 });
        assert_eq!(map.revision(), checker.revision());

        checker.remove_constraint(id);
        map.update_constraints(&checker).unwrap();
        // Restored tuple was already hit by a recorded input.
        assert_eq!(map.stats().covered, 1);
        assert!(map.is_covered(&pair(2, (0, 1), (1, 1))).unwrap());
    }

    #[test]
    fn test_uncoverable_tuples_leave_required_set() {
        let checker = NoConstraintChecker::new(&[2, 2]);
        let mut map = CoverageMap::new(&[2, 2], 2, &checker).unwrap();
        let tuple = pair(2, (0, 0), (1, 0));
        assert!(map.mark_uncoverable(&tuple).unwrap());
        assert!(!map.mark_uncoverable(&tuple).unwrap());
        assert!(!map.is_required(&tuple).unwrap());
        assert_eq!(map.stats(), CoverageStats { required: 3, covered: 0, uncoverable: 1 });
        assert_eq!(map.uncoverable().count(), 1);
    }

    #[test]
    fn test_forbidding_an_uncoverable_tuple_counts_it_once() {
        let mut checker = ForbiddenTupleChecker::new(&[2, 2], []).unwrap();
        let mut map = CoverageMap::new(&[2, 2], 2, &checker).unwrap();
        let tuple = pair(2, (0, 0), (1, 0));
        assert!(map.mark_uncoverable(&tuple).unwrap());

        checker
            .add_constraint(Constraint::hard("no_00", vec![0, 1], vec![vec![0, 0]]))
            .unwrap();
        map.update_constraints(&checker).unwrap();
        assert_eq!(map.stats(), CoverageStats { required: 3, covered: 0, uncoverable: 0 });
        assert_eq!(map.uncoverable().count(), 0);
        assert!(!map.is_required(&tuple).unwrap());
    }

    #[test]
    fn test_invalid_strength() {
        let checker = NoConstraintChecker::new(&[2, 2]);
        assert!(matches!(
            CoverageMap::new(&[2, 2], 3, &checker),
            Err(CoverageError::Tuple(TupleError::InvalidStrength { .. }))
        ));
    }
}

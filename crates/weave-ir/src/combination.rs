//! Combinations and the tuple algebra over them.
//!
//! A [`Combination`] has one slot per model parameter. A slot either holds a
//! value index (`Some(v)`, with `v` below that parameter's domain size) or is
//! a wildcard (`None`). A *full* combination is a concrete test input; a
//! *partial* combination is a tuple over the assigned parameters only.
//!
//! Enumeration helpers produce parameter subsets and value products in
//! lexicographic order so everything built on top stays reproducible.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural precondition violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TupleError {
    #[error("combination has {actual} slots, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("parameter {parameter} has value {value} outside its domain of size {size}")]
    ValueOutOfDomain {
        parameter: usize,
        value: usize,
        size: usize,
    },

    #[error("parameter index {parameter} out of range for {parameters} parameters")]
    ParameterOutOfRange { parameter: usize, parameters: usize },

    #[error("parameter {0} is assigned twice")]
    DuplicateParameter(usize),

    #[error("strength {strength} is invalid for {parameters} parameters")]
    InvalidStrength { strength: usize, parameters: usize },

    #[error("expected a full combination but parameter {0} is unassigned")]
    NotFull(usize),
}

/// A (possibly partial) assignment of value indices to parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Combination {
    slots: Vec<Option<usize>>,
}

impl Combination {
    /// A combination with every slot unassigned.
    pub fn empty(parameters: usize) -> Self {
        Self {
            slots: vec![None; parameters],
        }
    }

    /// A full combination from concrete value indices.
    pub fn from_values(values: Vec<usize>) -> Self {
        Self {
            slots: values.into_iter().map(Some).collect(),
        }
    }

    pub fn from_slots(slots: Vec<Option<usize>>) -> Self {
        Self { slots }
    }

    /// Build a partial combination from `(parameter, value)` pairs.
    pub fn from_assignments(
        parameters: usize,
        assignments: &[(usize, usize)],
    ) -> Result<Self, TupleError> {
        let mut combination = Self::empty(parameters);
        for &(parameter, value) in assignments {
            if parameter >= parameters {
                return Err(TupleError::ParameterOutOfRange {
                    parameter,
                    parameters,
                });
            }
            if combination.slots[parameter].is_some() {
                return Err(TupleError::DuplicateParameter(parameter));
            }
            combination.slots[parameter] = Some(value);
        }
        Ok(combination)
    }

    /// Number of slots (the parameter count of the model).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Option<usize>] {
        &self.slots
    }

    pub fn get(&self, parameter: usize) -> Option<usize> {
        self.slots.get(parameter).copied().flatten()
    }

    /// Assign or clear a slot. Out-of-range parameters are ignored.
    pub fn set(&mut self, parameter: usize, value: Option<usize>) {
        if let Some(slot) = self.slots.get_mut(parameter) {
            *slot = value;
        }
    }

    /// Copy of this combination with one slot replaced.
    pub fn with(&self, parameter: usize, value: Option<usize>) -> Self {
        let mut next = self.clone();
        next.set(parameter, value);
        next
    }

    /// Number of assigned slots.
    pub fn size(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn assigned_parameters(&self) -> Vec<usize> {
        self.assignments().map(|(p, _)| p).collect()
    }

    pub fn unassigned_parameters(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(p, _)| p)
            .collect()
    }

    /// Iterate `(parameter, value)` over assigned slots in parameter order.
    pub fn assignments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(p, s)| s.map(|v| (p, v)))
    }

    /// Concrete values of a full combination.
    pub fn values(&self) -> Result<Vec<usize>, TupleError> {
        self.slots
            .iter()
            .enumerate()
            .map(|(p, s)| s.ok_or(TupleError::NotFull(p)))
            .collect()
    }

    /// Check slot count and value ranges against the model's domain sizes.
    pub fn validate(&self, domain_sizes: &[usize]) -> Result<(), TupleError> {
        if self.slots.len() != domain_sizes.len() {
            return Err(TupleError::LengthMismatch {
                expected: domain_sizes.len(),
                actual: self.slots.len(),
            });
        }
        for (parameter, value) in self.assignments() {
            let size = domain_sizes[parameter];
            if value >= size {
                return Err(TupleError::ValueOutOfDomain {
                    parameter,
                    value,
                    size,
                });
            }
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate) but additionally requires every slot assigned.
    pub fn validate_full(&self, domain_sizes: &[usize]) -> Result<(), TupleError> {
        self.validate(domain_sizes)?;
        match self.slots.iter().position(Option::is_none) {
            Some(p) => Err(TupleError::NotFull(p)),
            None => Ok(()),
        }
    }

    /// True iff every assigned slot of `partial` equals the slot here.
    pub fn contains(&self, partial: &Combination) -> Result<bool, TupleError> {
        if self.slots.len() != partial.slots.len() {
            return Err(TupleError::LengthMismatch {
                expected: self.slots.len(),
                actual: partial.slots.len(),
            });
        }
        Ok(self.matches(partial))
    }

    /// Unchecked [`contains`](Self::contains) for hot loops over combinations
    /// already validated against the same model.
    pub fn matches(&self, partial: &Combination) -> bool {
        debug_assert_eq!(self.slots.len(), partial.slots.len());
        partial
            .slots
            .iter()
            .zip(&self.slots)
            .all(|(p, s)| p.is_none() || p == s)
    }

    /// Keep only the given parameters; every other slot becomes a wildcard.
    pub fn restrict(&self, parameters: &[usize]) -> Self {
        let mut restricted = Self::empty(self.slots.len());
        for &p in parameters {
            restricted.set(p, self.get(p));
        }
        restricted
    }

    /// Union of two partial combinations, or `None` when they assign
    /// different values to the same parameter.
    pub fn merge(&self, other: &Combination) -> Result<Option<Self>, TupleError> {
        if self.slots.len() != other.slots.len() {
            return Err(TupleError::LengthMismatch {
                expected: self.slots.len(),
                actual: other.slots.len(),
            });
        }
        let mut merged = self.clone();
        for (p, value) in other.assignments() {
            match merged.slots[p] {
                Some(existing) if existing != value => return Ok(None),
                _ => merged.slots[p] = Some(value),
            }
        }
        Ok(Some(merged))
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match slot {
                Some(v) => write!(f, "{v}")?,
                None => write!(f, "*")?,
            }
        }
        write!(f, "]")
    }
}

/// `contains(full, partial)` as a free function.
pub fn contains(full: &Combination, partial: &Combination) -> Result<bool, TupleError> {
    full.contains(partial)
}

/// Multiset difference: every element of `elements` not matched by a
/// distinct element of `excluded`, in original order.
pub fn exclude<T: PartialEq + Clone>(elements: &[T], excluded: &[T]) -> Vec<T> {
    let mut used = vec![false; excluded.len()];
    let mut kept = Vec::with_capacity(elements.len());
    for element in elements {
        let matched = excluded
            .iter()
            .enumerate()
            .position(|(i, e)| !used[i] && e == element);
        match matched {
            Some(i) => used[i] = true,
            None => kept.push(element.clone()),
        }
    }
    kept
}

/// All `size`-element subsets of `0..parameters`, lexicographically.
pub fn parameter_subsets(parameters: usize, size: usize) -> Vec<Vec<usize>> {
    let pool: Vec<usize> = (0..parameters).collect();
    subsets_of(&pool, size)
}

/// All `size`-element subsets of `pool`, preserving pool order.
pub fn subsets_of(pool: &[usize], size: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if size > pool.len() {
        return result;
    }
    let mut indices: Vec<usize> = (0..size).collect();
    loop {
        result.push(indices.iter().map(|&i| pool[i]).collect());

        // Advance the rightmost index that still has room.
        let mut i = size;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if indices[i] < pool.len() - size + i {
                break;
            }
            if i == 0 {
                return result;
            }
        }
        indices[i] += 1;
        for j in (i + 1)..size {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

/// Cartesian product of the domains of `parameters`, lexicographically.
pub fn value_product(domain_sizes: &[usize], parameters: &[usize]) -> Vec<Vec<usize>> {
    let mut product = vec![Vec::with_capacity(parameters.len())];
    for &p in parameters {
        let size = domain_sizes[p];
        let mut next = Vec::with_capacity(product.len() * size);
        for prefix in &product {
            for v in 0..size {
                let mut row = prefix.clone();
                row.push(v);
                next.push(row);
            }
        }
        product = next;
    }
    product
}

/// Every t-way tuple over the given domains, grouped by parameter subset.
pub fn t_way_tuples(domain_sizes: &[usize], strength: usize) -> Result<Vec<Combination>, TupleError> {
    let parameters = domain_sizes.len();
    if strength == 0 || strength > parameters {
        return Err(TupleError::InvalidStrength {
            strength,
            parameters,
        });
    }
    let mut tuples = Vec::new();
    for subset in parameter_subsets(parameters, strength) {
        for values in value_product(domain_sizes, &subset) {
            let mut tuple = Combination::empty(parameters);
            for (&p, &v) in subset.iter().zip(&values) {
                tuple.set(p, Some(v));
            }
            tuples.push(tuple);
        }
    }
    Ok(tuples)
}

/// All sub-combinations of `combination` with exactly `size` assigned slots.
pub fn sub_combinations(combination: &Combination, size: usize) -> Vec<Combination> {
    subsets_of(&combination.assigned_parameters(), size)
        .into_iter()
        .map(|subset| combination.restrict(&subset))
        .collect()
}

/// Number of full combinations, `None` on overflow.
pub fn full_combination_count(domain_sizes: &[usize]) -> Option<usize> {
    domain_sizes
        .iter()
        .try_fold(1usize, |acc, &size| acc.checked_mul(size))
}

/// Odometer over every full combination in lexicographic order.
#[derive(Debug, Clone)]
pub struct FullCombinations {
    domain_sizes: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl FullCombinations {
    pub fn new(domain_sizes: &[usize]) -> Self {
        let next = if domain_sizes.iter().any(|&s| s == 0) {
            None
        } else {
            Some(vec![0; domain_sizes.len()])
        };
        Self {
            domain_sizes: domain_sizes.to_vec(),
            next,
        }
    }
}

impl Iterator for FullCombinations {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let current = self.next.take()?;
        let mut advanced = current.clone();
        let mut carried = true;
        for p in (0..advanced.len()).rev() {
            advanced[p] += 1;
            if advanced[p] < self.domain_sizes[p] {
                carried = false;
                break;
            }
            advanced[p] = 0;
        }
        if !carried {
            self.next = Some(advanced);
        }
        Some(Combination::from_values(current))
    }
}

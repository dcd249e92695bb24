//! Combinatorial exploration engine: constraint checking, coverage
//! bookkeeping, covering-array generation, fault characterization and
//! constraint-conflict analysis.

pub mod characterize;
pub mod checker;
pub mod conflict;
pub mod coverage;
pub mod generate;
pub mod rng;
pub mod solver;

pub use checker::{build_checker, CheckerError, CheckerKind, ConstraintChecker};
pub use coverage::{CoverageError, CoverageMap, CoverageStats};

//! Input model for combinatorial test generation: parameters with finite
//! domains, forbidden-tuple constraints, and the combination algebra the
//! engine is built on.

pub mod combination;
pub mod parse;
pub mod types;

pub use combination::{Combination, TupleError};
pub use types::{Constraint, ConstraintId, ConstraintKind, Parameter, TestModel};

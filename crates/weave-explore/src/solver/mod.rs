pub mod constraint;
pub mod domain;
pub mod search;

pub use search::{OracleError, SatisfiabilityOracle, VarisatOracle};

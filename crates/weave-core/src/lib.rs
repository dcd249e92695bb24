//! Session layer over the weave engine: configuration, sequential and
//! interleaved test campaigns, constraint diagnosis and JSON reports.

pub mod campaign;
pub mod config;
pub mod logging;
pub mod report;

pub use campaign::{
    diagnose_constraints, generate_suite, generate_suite_json, CampaignError, InterleavingSession,
};
pub use config::{ConfigError, SessionConfig};
pub use report::{DiagnosisReport, SessionReport, SuiteReport};

//! Sessions over a test model: sequential suites, interleaved generation
//! with fault characterization, and constraint diagnosis.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use weave_explore::characterize::{
    build_characterizer, CharacterizationError, Classification, FaultCharacterization, TestResult,
};
use weave_explore::conflict::{explain_conflict, minimal_diagnoses, ConflictError};
use weave_explore::generate::{
    build_generator, GenerationError, GenerationRun, InterleavingGenerator,
};
use weave_explore::solver::{OracleError, VarisatOracle};
use weave_ir::parse::{parse_model, ParseError};
use weave_ir::types::ModelError;
use weave_ir::{Combination, Constraint, ConstraintId, TestModel};

use crate::config::{ConfigError, SessionConfig};
use crate::report::{
    render_combination, DiagnosisReport, IdentifiedCombination, SessionReport, SuiteReport,
};

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("model parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("characterization error: {0}")]
    Characterization(#[from] CharacterizationError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("conflict analysis error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("the result for {0} has not been submitted")]
    ResultPending(Combination),

    #[error("no result was expected for {0}")]
    UnexpectedResult(Combination),
}

/// Generate a complete suite up front.
pub fn generate_suite(model: &TestModel, config: &SessionConfig) -> Result<SuiteReport, CampaignError> {
    config.validate()?;
    let mut run = GenerationRun::from_model(model, config.checker)?;
    let mut generator = build_generator(config.generator, config.greedy);
    let report = generator.generate(&mut run)?;

    info!(
        generator = generator.name(),
        inputs = report.test_inputs.len(),
        covered = report.stats.covered,
        uncoverable = report.stats.uncoverable,
        "suite generated"
    );
    Ok(SuiteReport {
        generator: config.generator,
        checker: config.checker,
        strength: model.strength,
        test_inputs: report.test_inputs,
        uncoverable: report.uncoverable,
        stats: report.stats,
    })
}

/// [`generate_suite`] over a model in its JSON form.
pub fn generate_suite_json(model_json: &str, config: &SessionConfig) -> Result<SuiteReport, CampaignError> {
    let model = parse_model(model_json)?;
    generate_suite(&model, config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Coverage,
    Identification,
}

/// Pull-based session: the host asks for an input, runs it, and submits
/// the result before asking again.
///
/// A failure not explained by an identified combination starts fault
/// characterization; its inputs are served ahead of coverage inputs until
/// the search ends. Identified combinations are then forbidden for the rest
/// of the session unless `exclude_identified` is off.
pub struct InterleavingSession {
    model: TestModel,
    exclude_identified: bool,
    generator: InterleavingGenerator,
    characterizer: Option<Box<dyn FaultCharacterization>>,
    pending: Option<(Combination, Source)>,
    next_identification: Option<Combination>,
    excluded: BTreeSet<Combination>,
    executed: usize,
    identification_inputs: usize,
    failures: usize,
}

impl std::fmt::Debug for InterleavingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterleavingSession")
            .field("generator", &self.generator)
            .field(
                "characterizer",
                &self.characterizer.as_ref().map(|c| c.name().to_string()),
            )
            .field("pending", &self.pending)
            .field("executed", &self.executed)
            .finish()
    }
}

impl InterleavingSession {
    pub fn new(model: &TestModel, config: &SessionConfig) -> Result<Self, CampaignError> {
        config.validate()?;
        let run = GenerationRun::from_model(model, config.checker)?;
        let characterizer = match config.characterization {
            Some(kind) => Some(build_characterizer(kind, run.checker(), config.identification)?),
            None => None,
        };
        Ok(Self {
            model: model.clone(),
            exclude_identified: config.exclude_identified,
            generator: InterleavingGenerator::new(run, config.greedy),
            characterizer,
            pending: None,
            next_identification: None,
            excluded: BTreeSet::new(),
            executed: 0,
            identification_inputs: 0,
            failures: 0,
        })
    }

    /// The next input to execute, or `None` once coverage is complete and
    /// no identification work remains.
    pub fn next_test_input(&mut self) -> Result<Option<Combination>, CampaignError> {
        if let Some((input, _)) = &self.pending {
            return Err(CampaignError::ResultPending(input.clone()));
        }
        if self.next_identification.is_none() {
            if let Some(characterizer) = self.characterizer.as_mut() {
                self.next_identification = characterizer.restart_identification()?;
            }
            // Queued failures may have been settled without a test.
            self.absorb_identified()?;
        }
        let (input, source) = match self.next_identification.take() {
            Some(input) => (input, Source::Identification),
            None => match self.generator.generate_next_test_input()? {
                Some(input) => (input, Source::Coverage),
                None => return Ok(None),
            },
        };
        debug!(input = %input, ?source, "serving test input");
        self.pending = Some((input.clone(), source));
        Ok(Some(input))
    }

    /// Report the result of the input last returned by
    /// [`next_test_input`](Self::next_test_input).
    pub fn submit_result(&mut self, input: &Combination, result: &TestResult) -> Result<(), CampaignError> {
        let source = match self.pending.take() {
            Some((expected, source)) if expected == *input => source,
            other => {
                self.pending = other;
                return Err(CampaignError::UnexpectedResult(input.clone()));
            }
        };
        self.executed += 1;
        if result.is_failure() {
            self.failures += 1;
        }

        match source {
            Source::Identification => {
                self.identification_inputs += 1;
                self.generator.record_external(input)?;
                if let Some(characterizer) = self.characterizer.as_mut() {
                    self.next_identification =
                        characterizer.generate_next_test_input_for_identification(input, result)?;
                }
                if self.next_identification.is_none() {
                    self.absorb_identified()?;
                }
            }
            Source::Coverage if result.is_failure() => {
                let Some(characterizer) = self.characterizer.as_mut() else {
                    return Ok(());
                };
                if is_explained(&characterizer.identified_combinations(), input, result) {
                    debug!(input = %input, "failure explained by an identified combination");
                    return Ok(());
                }
                self.next_identification = characterizer.start_identification(input, result)?;
                if self.next_identification.is_none() {
                    self.absorb_identified()?;
                }
            }
            Source::Coverage => {}
        }
        Ok(())
    }

    /// Forbid newly identified combinations for the rest of the session.
    fn absorb_identified(&mut self) -> Result<(), CampaignError> {
        for (combination, classification) in self.identified() {
            if !self.excluded.insert(combination.clone()) {
                continue;
            }
            info!(
                combination = %render_combination(&self.model, &combination),
                ?classification,
                excluded = self.exclude_identified,
                "failure-inducing combination identified"
            );
            if self.exclude_identified {
                let name = format!("identified_{}", self.excluded.len() - 1);
                self.generator
                    .add_constraint(Constraint::forbidding(name, &combination))?;
            }
        }
        Ok(())
    }

    pub fn identified(&self) -> BTreeMap<Combination, Classification> {
        self.characterizer
            .as_ref()
            .map(|c| c.identified_combinations())
            .unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_none() && self.next_identification.is_none() && self.generator.is_complete()
    }

    pub fn report(&self) -> SessionReport {
        let coverage = self.generator.coverage();
        SessionReport {
            executed: self.executed,
            coverage_inputs: self.generator.emitted().len(),
            identification_inputs: self.identification_inputs,
            failures: self.failures,
            identified: self
                .identified()
                .into_iter()
                .map(|(combination, classification)| IdentifiedCombination {
                    rendered: render_combination(&self.model, &combination),
                    combination,
                    classification,
                })
                .collect(),
            uncoverable: coverage.uncoverable().cloned().collect(),
            stats: coverage.stats(),
            complete: self.is_complete(),
        }
    }

    /// Drive the session to the end with `execute` as the system under test.
    pub fn run_with(
        &mut self,
        mut execute: impl FnMut(&Combination) -> TestResult,
    ) -> Result<SessionReport, CampaignError> {
        while let Some(input) = self.next_test_input()? {
            let result = execute(&input);
            self.submit_result(&input, &result)?;
        }
        let report = self.report();
        info!(
            executed = report.executed,
            failures = report.failures,
            identified = report.identified.len(),
            "session finished"
        );
        Ok(report)
    }
}

fn is_explained(
    identified: &BTreeMap<Combination, Classification>,
    input: &Combination,
    result: &TestResult,
) -> bool {
    let TestResult::Failed(cause) = result else {
        return false;
    };
    let class = Classification::from(cause);
    identified
        .iter()
        .any(|(combination, c)| *c == class && input.matches(combination))
}

/// Explain and diagnose the conflict between `background` and `relaxable`
/// constraints of `model`. Constraint kinds are ignored here: every listed
/// constraint takes part.
pub fn diagnose_constraints(
    model: &TestModel,
    background: &[ConstraintId],
    relaxable: &[ConstraintId],
    config: &SessionConfig,
) -> Result<DiagnosisReport, CampaignError> {
    model.validate()?;
    let mut oracle = VarisatOracle::new(&model.domain_sizes(), &model.constraints)?;
    let explanation = explain_conflict(&mut oracle, background, relaxable)?;
    let outcome = minimal_diagnoses(&mut oracle, background, relaxable, config.diagnosis)?;
    debug!(queries = oracle.queries(), "diagnosis finished");
    Ok(DiagnosisReport::new(model, explanation, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_explore::characterize::FailureCause;

    /// Inputs with p1 = 0 and p2 = 0 fail.
    fn planted(input: &Combination) -> TestResult {
        if input.get(1) == Some(0) && input.get(2) == Some(0) {
            TestResult::Failed(FailureCause::Assertion)
        } else {
            TestResult::Passed
        }
    }

    fn fic() -> Combination {
        Combination::from_slots(vec![None, Some(0), Some(0), None])
    }

    #[test]
    fn test_results_must_follow_inputs() {
        let model = TestModel::from_sizes(&[2, 2], 2);
        let mut session = InterleavingSession::new(&model, &SessionConfig::default()).unwrap();
        let stray = Combination::from_values(vec![1, 1]);
        assert!(matches!(
            session.submit_result(&stray, &TestResult::Passed),
            Err(CampaignError::UnexpectedResult(_))
        ));

        let first = session.next_test_input().unwrap().unwrap();
        assert!(matches!(
            session.next_test_input(),
            Err(CampaignError::ResultPending(_))
        ));
        session.submit_result(&first, &TestResult::Passed).unwrap();
        assert!(session.next_test_input().unwrap().is_some());
    }

    #[test]
    fn test_identified_combination_is_excluded() {
        let model = TestModel::from_sizes(&[3, 3, 3, 3], 2);
        let mut session = InterleavingSession::new(&model, &SessionConfig::default()).unwrap();
        let report = session.run_with(planted).unwrap();

        assert!(report.failures >= 1);
        assert!(report.complete);
        // Only the first coverage input contains the combination.
        let emitted = session.generator.emitted();
        assert!(emitted[0].contains(&fic()).unwrap());
        assert!(emitted.iter().skip(1).all(|i| !i.contains(&fic()).unwrap()));
        assert_eq!(report.identified.len(), 1);
        assert_eq!(report.identified[0].combination, fic());
        assert_eq!(report.identified[0].rendered, "p1=0, p2=0");
        assert_eq!(report.executed, report.coverage_inputs + report.identification_inputs);
    }

    #[test]
    fn test_explained_failures_are_not_reinvestigated() {
        let model = TestModel::from_sizes(&[3, 3, 3, 3], 2);
        let config = SessionConfig {
            exclude_identified: false,
            ..SessionConfig::default()
        };
        let mut session = InterleavingSession::new(&model, &config).unwrap();
        let report = session.run_with(planted).unwrap();

        assert_eq!(session.identified().keys().cloned().collect::<Vec<_>>(), vec![fic()]);
        // The pair stays required, so later inputs fail again without a new search.
        assert!(report.failures >= 1);
        assert!(report.complete);
    }

    #[test]
    fn test_without_characterization_failures_are_only_counted() {
        let model = TestModel::from_sizes(&[3, 3, 3, 3], 2);
        let config = SessionConfig {
            characterization: None,
            ..SessionConfig::default()
        };
        let mut session = InterleavingSession::new(&model, &config).unwrap();
        let report = session.run_with(planted).unwrap();
        assert!(report.identified.is_empty());
        assert_eq!(report.identification_inputs, 0);
        assert!(report.failures >= 1);
        assert_eq!(report.stats.covered, report.stats.required);
    }

    #[test]
    fn test_suite_and_diagnosis() {
        let model = TestModel::from_sizes(&[2, 2, 2], 2)
            .with_constraint(Constraint::hard("a_not_0", vec![0], vec![vec![0]]))
            .with_constraint(Constraint::hard("a_not_1", vec![0], vec![vec![1]]));
        let config = SessionConfig::default();

        let diagnosis =
            diagnose_constraints(&model, &[], &[ConstraintId(0), ConstraintId(1)], &config).unwrap();
        assert_eq!(diagnosis.conflict_names, vec!["a_not_0", "a_not_1"]);
        assert_eq!(diagnosis.diagnosis_names, vec![vec!["a_not_0"], vec!["a_not_1"]]);

        let relaxed = TestModel::from_sizes(&[2, 2, 2], 2)
            .with_constraint(Constraint::hard("a_not_0", vec![0], vec![vec![0]]));
        let suite = generate_suite(&relaxed, &config).unwrap();
        assert!(suite.test_inputs.iter().all(|i| i.get(0) == Some(1)));
        assert_eq!(suite.stats.covered, suite.stats.required);
    }
}

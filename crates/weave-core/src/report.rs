//! Serializable session summaries.

use serde::{Deserialize, Serialize};

use weave_explore::characterize::Classification;
use weave_explore::checker::CheckerKind;
use weave_explore::conflict::{ConflictExplanation, DiagnosisOutcome};
use weave_explore::generate::GeneratorKind;
use weave_explore::CoverageStats;
use weave_ir::{Combination, ConstraintId, TestModel};

/// Result of a sequential generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub generator: GeneratorKind,
    pub checker: CheckerKind,
    pub strength: usize,
    pub test_inputs: Vec<Combination>,
    /// Required tuples that no valid input can contain.
    pub uncoverable: Vec<Combination>,
    pub stats: CoverageStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiedCombination {
    pub combination: Combination,
    /// The combination with parameter names, e.g. `os=1, browser=2`.
    pub rendered: String,
    pub classification: Classification,
}

/// State of an interleaving session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Results submitted so far.
    pub executed: usize,
    pub coverage_inputs: usize,
    pub identification_inputs: usize,
    pub failures: usize,
    pub identified: Vec<IdentifiedCombination>,
    pub uncoverable: Vec<Combination>,
    pub stats: CoverageStats,
    pub complete: bool,
}

/// Conflict and diagnoses for one background/relaxable split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub explanation: ConflictExplanation,
    pub outcome: DiagnosisOutcome,
    /// Constraint names of the conflict, if one was found.
    pub conflict_names: Vec<String>,
    /// Constraint names of each diagnosis.
    pub diagnosis_names: Vec<Vec<String>>,
}

impl DiagnosisReport {
    pub fn new(model: &TestModel, explanation: ConflictExplanation, outcome: DiagnosisOutcome) -> Self {
        let conflict_names = match &explanation {
            ConflictExplanation::Conflict(ids) => constraint_names(model, ids),
            _ => Vec::new(),
        };
        let diagnosis_names = match &outcome {
            DiagnosisOutcome::Diagnoses(diagnoses) => {
                diagnoses.iter().map(|d| constraint_names(model, d)).collect()
            }
            _ => Vec::new(),
        };
        Self {
            explanation,
            outcome,
            conflict_names,
            diagnosis_names,
        }
    }
}

/// Assigned parameters as `name=value`, in parameter order.
pub fn render_combination(model: &TestModel, combination: &Combination) -> String {
    combination
        .assignments()
        .map(|(p, v)| match model.parameters.get(p) {
            Some(param) => format!("{}={}", param.name, v),
            None => format!("p{p}={v}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn constraint_names(model: &TestModel, ids: &[ConstraintId]) -> Vec<String> {
    ids.iter()
        .map(|id| match model.constraints.get(id.0) {
            Some(constraint) => constraint.name.clone(),
            None => id.to_string(),
        })
        .collect()
}

/// Pretty-printed JSON of any report.
pub fn to_json<T: Serialize>(report: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_ir::Constraint;

    fn model() -> TestModel {
        let mut model = TestModel::from_sizes(&[3, 3, 2], 2);
        model.parameters[0].name = "os".to_string();
        model.parameters[1].name = "browser".to_string();
        model
            .with_constraint(Constraint::hard("no_safari", vec![1], vec![vec![2]]))
            .with_constraint(Constraint::hard("need_safari", vec![1], vec![vec![0], vec![1]]))
    }

    #[test]
    fn test_render_uses_parameter_names() {
        let combination = Combination::from_slots(vec![Some(1), None, Some(0)]);
        assert_eq!(render_combination(&model(), &combination), "os=1, p2=0");
    }

    #[test]
    fn test_diagnosis_report_names_constraints() {
        let ids = vec![ConstraintId(0), ConstraintId(1)];
        let report = DiagnosisReport::new(
            &model(),
            ConflictExplanation::Conflict(ids.clone()),
            DiagnosisOutcome::Diagnoses(vec![vec![ConstraintId(0)], vec![ConstraintId(1)]]),
        );
        assert_eq!(report.conflict_names, vec!["no_safari", "need_safari"]);
        assert_eq!(report.diagnosis_names, vec![vec!["no_safari"], vec!["need_safari"]]);

        let json = to_json(&report).unwrap();
        let back: DiagnosisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_consistent_report_has_no_names() {
        let report = DiagnosisReport::new(
            &model(),
            ConflictExplanation::Consistent,
            DiagnosisOutcome::Consistent,
        );
        assert!(report.conflict_names.is_empty());
        assert!(report.diagnosis_names.is_empty());
    }
}

use weave_ir::combination::{t_way_tuples, Combination};
use weave_ir::parse::{parse_model, ParseError};
use weave_ir::types::ConstraintKind;

#[test]
fn test_parse_fixture() {
    let json = include_str!("fixtures/browser_matrix.json");
    let model = parse_model(json).unwrap();
    assert_eq!(model.parameter_count(), 4);
    assert_eq!(model.domain_sizes(), vec![3, 3, 2, 2]);
    assert_eq!(model.strength, 2);
    assert_eq!(model.constraints.len(), 2);
    assert_eq!(model.constraints[1].kind, ConstraintKind::Error);
    assert_eq!(model.hard_constraints().count(), 1);
}

#[test]
fn test_parse_defaults_constraint_kind_to_hard() {
    let json = r#"{
        "parameters": [{ "name": "a", "size": 2 }, { "name": "b", "size": 2 }],
        "strength": 1,
        "constraints": [{ "name": "c", "parameters": [0], "forbidden": [[1]] }]
    }"#;
    let model = parse_model(json).unwrap();
    assert_eq!(model.constraints[0].kind, ConstraintKind::Hard);
}

#[test]
fn test_parse_rejects_invalid_json() {
    assert!(matches!(parse_model("not json"), Err(ParseError::Json(_))));
}

#[test]
fn test_parse_rejects_structurally_invalid_model() {
    let json = r#"{ "parameters": [{ "name": "a", "size": 0 }], "strength": 1 }"#;
    assert!(matches!(parse_model(json), Err(ParseError::Model(_))));
}

#[test]
fn test_combination_serializes_wildcards_as_null() {
    let c = Combination::from_slots(vec![Some(1), None]);
    assert_eq!(serde_json::to_string(&c).unwrap(), "[1,null]");
    let back: Combination = serde_json::from_str("[1,null]").unwrap();
    assert_eq!(back, c);
}

#[test]
fn test_fixture_pair_count() {
    let model = parse_model(include_str!("fixtures/browser_matrix.json")).unwrap();
    let tuples = t_way_tuples(&model.domain_sizes(), model.strength).unwrap();
    // os x browser, four 3x2 pairs, locale x screen
    assert_eq!(tuples.len(), 37);
}

use crate::types::{ModelError, TestModel};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Model(#[from] ModelError),
}

/// Parse and validate a model from its JSON form.
pub fn parse_model(json: &str) -> Result<TestModel, ParseError> {
    let model: TestModel = serde_json::from_str(json)?;
    model.validate()?;
    Ok(model)
}

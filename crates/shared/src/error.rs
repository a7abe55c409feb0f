use thiserror::Error;

/// Validation failures for an inbound transfer request. Every variant
/// is detected before any network call is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("field `{field}` must be a positive number, got `{value}`")]
    NonPositiveNumber { field: &'static str, value: String },
    #[error("field `{field}` must not be empty")]
    EmptyField { field: &'static str },
    #[error("no spreadsheet key found in `{input}`")]
    NoSpreadsheetKey { input: String },
    #[error("no tracker project id found in `{input}`")]
    NoProjectId { input: String },
}

impl RequestError {
    pub fn non_positive(field: &'static str, value: impl Into<String>) -> Self {
        Self::NonPositiveNumber {
            field,
            value: value.into(),
        }
    }

    pub fn empty(field: &'static str) -> Self {
        Self::EmptyField { field }
    }
}

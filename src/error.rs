use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate that cannot be scored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected {expected} digits, got {actual}")]
    WrongArity { expected: usize, actual: usize },
    #[error("non-digit character in {0:?}")]
    NonDigit(String),
    #[error("{field} number {value} outside 1..={max}")]
    OutOfRange {
        field: &'static str,
        value: u8,
        max: u8,
    },
    #[error("duplicate main number {0}")]
    Duplicate(u8),
    #[error("expected {expected} {field} numbers, got {actual}")]
    WrongCount {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("candidate kind does not match {0}")]
    KindMismatch(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Deployment defect; aborts the batch before any unit runs.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Issues absorbed inside one unit of work and reported on its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum UnitIssue {
    MissingContext(String),
    UnknownGame(String),
    MissingProfile(String),
    Validation(String),
    NotInKit(String),
}

impl UnitIssue {
    pub fn short(&self) -> String {
        match self {
            UnitIssue::MissingContext(d) => format!("missingContext:{d}"),
            UnitIssue::UnknownGame(d) => format!("unknownGame:{d}"),
            UnitIssue::MissingProfile(d) => format!("missingProfile:{d}"),
            UnitIssue::Validation(d) => format!("validation:{d}"),
            UnitIssue::NotInKit(d) => format!("notInKit:{d}"),
        }
    }
}

use crate::variables::parser::ParseError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A write conflicts with a value the variable already holds for this digest.
    #[error("Contradiction on '{variable}': holds {held}, attempted {attempted}")]
    Contradiction {
        variable: String,
        held: f64,
        attempted: f64,
    },
    /// A derivation would divide a non-zero numerator by zero.
    #[error("Division by zero while solving `{relationship}`")]
    DivisionByZero { relationship: String },
    #[error("Syntax error: {message} (near '{fragment}')")]
    Syntax { message: String, fragment: String },
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Function already registered: {0}")]
    DuplicateFunction(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub(crate) fn syntax(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            fragment: fragment.into(),
        }
    }

    /// True for the value-conflict family: plain contradictions and zero divisions.
    pub fn is_contradiction(&self) -> bool {
        matches!(self, Self::Contradiction { .. } | Self::DivisionByZero { .. })
    }
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        Self::Syntax {
            message: err.message,
            fragment: err.fragment,
        }
    }
}

pub mod error;
pub mod variables;
pub mod relations;
pub mod system;

pub use error::EngineError;
pub use system::{Operand, SolveReport, System, SystemConfig, Value};
pub use variables::{Node, VariableId, VariableState};

pub fn version() -> &'static str {
    "0.1.0"
}

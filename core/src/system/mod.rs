//! The system that owns the propagation graph.
//!
//! Provides:
//! - A lazily populated name → variable registry
//! - Graph construction (equals/add/subtract/multiply/divide/call)
//! - Expression lowering from text or a host-supplied AST
//! - Digest passes with contradiction detection
//! - Cascading teardown with orphan collection

pub mod config;
pub mod graph;
pub mod evaluator;
pub mod snapshot;


pub use config::{SystemConfig, DEFAULT_TOLERANCE};
pub use graph::{Operand, System};
pub use evaluator::Value;
pub use snapshot::{SolveReport, SystemSnapshot, VariableSnapshot};

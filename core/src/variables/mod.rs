//! Variable nodes and the expression parser that feeds them.
//!
//! A variable holds an optional value plus its provenance:
//! - Explicit and environment values are pinned by callers
//! - Solved values belong to the digest that derived them
//! - Back-references to relationships exist only for cascade teardown

pub mod types;
pub mod parser;


pub use types::{ChangeCallback, Variable, VariableId, VariableKind, VariableState};
pub use parser::{infix_to_rpn, parse_expression, rpn_to_node, tokenize, Node, Operator, ParseError, Token};

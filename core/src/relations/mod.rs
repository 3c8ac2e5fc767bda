//! The relationship family.
//!
//! Each variant is a constraint over a fixed set of variables that can be
//! solved for whichever operand is missing:
//! - Equality, Addition, Subtraction, Multiplication, Division solve in every direction
//! - Custom n-ary functions solve forward only

pub mod types;


pub use types::{CustomFn, DeriveError, Derivation, Relation, Relationship, RelationshipId, ZERO_EPSILON};

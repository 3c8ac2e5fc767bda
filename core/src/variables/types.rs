//! Core types for the variable node.

use crate::error::EngineError;
use crate::relations::RelationshipId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle into the system's variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a variable's current value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariableState {
    #[default]
    Unset,
    /// Pinned by a caller
    Explicit,
    /// Derived by a relationship during one digest
    Solved,
    /// Pinned by the host environment (measured rather than chosen)
    Environment,
}

impl VariableState {
    /// Explicit and environment values survive digests and orphan collection.
    pub fn is_pinned(&self) -> bool {
        matches!(self, Self::Explicit | Self::Environment)
    }
}

/// How the variable entered the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Referenced by name from outside
    Named,
    /// Result of a sub-expression, owned by the lowered tree
    Intermediate,
    /// Literal operand; never changes after construction
    Constant,
}

/// Called with the new value whenever propagation changes a variable.
pub type ChangeCallback = Box<dyn FnMut(f64) + Send>;

/// A node in the propagation graph
pub struct Variable {
    name: String,
    kind: VariableKind,
    value: Option<f64>,
    state: VariableState,
    /// Digest that produced the current solved value
    solved_digest: Option<u64>,
    relationships: Vec<RelationshipId>,
    callbacks: Vec<ChangeCallback>,
}

impl Variable {
    pub fn named(name: &str) -> Self {
        Self::with_kind(name, VariableKind::Named)
    }

    pub fn intermediate(name: &str) -> Self {
        Self::with_kind(name, VariableKind::Intermediate)
    }

    /// A permanently explicit literal.
    pub fn constant(value: f64) -> Self {
        let mut var = Self::with_kind(&value.to_string(), VariableKind::Constant);
        var.value = Some(value);
        var.state = VariableState::Explicit;
        var
    }

    fn with_kind(name: &str, kind: VariableKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value: None,
            state: VariableState::Unset,
            solved_digest: None,
            relationships: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn is_constant(&self) -> bool {
        self.kind == VariableKind::Constant
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn state(&self) -> VariableState {
        self.state
    }

    pub fn solved_digest(&self) -> Option<u64> {
        self.solved_digest
    }

    pub fn relationships(&self) -> &[RelationshipId] {
        &self.relationships
    }

    /// Overwrite value and state without notifying anyone.
    ///
    /// Constants ignore the call.
    pub fn assign_value(&mut self, value: f64, state: VariableState) {
        if self.is_constant() {
            return;
        }
        if state == VariableState::Unset {
            self.clear_value();
            return;
        }
        self.value = Some(value);
        self.state = state;
        self.solved_digest = None;
    }

    /// Whether the variable holds a value that is current for `digest`.
    pub fn has_value(&self, digest: u64) -> bool {
        match self.state {
            VariableState::Explicit | VariableState::Environment => true,
            VariableState::Solved => self.solved_digest == Some(digest),
            VariableState::Unset => false,
        }
    }

    /// The value as seen from inside `digest`; stale solved values read as unknown.
    pub fn value_for(&self, digest: u64) -> Option<f64> {
        if self.has_value(digest) {
            self.value
        } else {
            None
        }
    }

    /// Propagation write.
    ///
    /// Returns `Ok(false)` when the variable already holds a value within
    /// `tolerance` of `value`; nothing changes and no callback fires. A
    /// value outside tolerance of one held for this digest is a
    /// contradiction and leaves the variable untouched. Otherwise the value
    /// is stored as solved for `digest` and `Ok(true)` tells the caller to
    /// notify attached relationships.
    pub fn set_value(&mut self, value: f64, digest: u64, tolerance: f64) -> Result<bool, EngineError> {
        if let Some(held) = self.value_for(digest) {
            if (held - value).abs() <= tolerance {
                return Ok(false);
            }
            return Err(EngineError::Contradiction {
                variable: self.name.clone(),
                held,
                attempted: value,
            });
        }

        self.value = Some(value);
        self.state = VariableState::Solved;
        self.solved_digest = Some(digest);
        for callback in &mut self.callbacks {
            callback(value);
        }
        Ok(true)
    }

    pub fn clear_value(&mut self) {
        if self.is_constant() {
            return;
        }
        self.value = None;
        self.state = VariableState::Unset;
        self.solved_digest = None;
    }

    pub fn attach(&mut self, relationship: RelationshipId) {
        if !self.relationships.contains(&relationship) {
            self.relationships.push(relationship);
        }
    }

    pub fn detach(&mut self, relationship: RelationshipId) {
        self.relationships.retain(|&r| r != relationship);
    }

    pub fn on_change(&mut self, callback: ChangeCallback) {
        self.callbacks.push(callback);
    }

    /// Orphan test used by cascade teardown: nothing attached and nothing pinned.
    ///
    /// The system additionally collects an intermediate whose only remaining
    /// relationship is the one producing it.
    pub fn can_destroy(&self) -> bool {
        match self.kind {
            VariableKind::Constant => self.relationships.is_empty(),
            VariableKind::Named | VariableKind::Intermediate => {
                self.relationships.is_empty() && !self.state.is_pinned()
            }
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("state", &self.state)
            .field("solved_digest", &self.solved_digest)
            .field("relationships", &self.relationships)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

//! Reports and diagnostic dumps of a system.

use super::graph::System;
use crate::relations::{Relation, RelationshipId};
use crate::variables::{VariableId, VariableKind, VariableState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub digest: u64,
    /// Relationship passes run (more than one only with fixpoint iteration)
    pub passes: usize,
    /// Relationships that derived a value in this digest
    pub solved: usize,
    /// Relationships still waiting on inputs
    pub pending: usize,
}

impl SolveReport {
    /// True when every relationship derived a value
    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSnapshot {
    pub name: String,
    pub kind: VariableKind,
    pub value: Option<f64>,
    pub state: VariableState,
}

/// Point-in-time view of every non-constant variable and every relationship
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub variables: Vec<VariableSnapshot>,
    pub relationships: Vec<String>,
}

impl SystemSnapshot {
    pub fn get(&self, name: &str) -> Option<&VariableSnapshot> {
        self.variables.iter().find(|v| v.name == name)
    }
}

impl System {
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            variables: self
                .live_variables()
                .filter(|var| !var.is_constant())
                .map(|var| VariableSnapshot {
                    name: var.name().to_string(),
                    kind: var.kind(),
                    value: var.value(),
                    state: var.state(),
                })
                .collect(),
            relationships: self
                .ordered_relationships()
                .map(|id| self.render(id))
                .collect(),
        }
    }

    /// Dump every relationship as `lhs = rhs`, one per line.
    ///
    /// With a filter, only relationships touching a variable whose name
    /// contains it are listed. For humans only.
    pub fn describe(&self, filter: Option<&str>) -> String {
        self.ordered_relationships()
            .filter(|&id| match filter {
                Some(needle) => self.mentions(id, needle),
                None => true,
            })
            .map(|id| self.render(id))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn mentions(&self, id: RelationshipId, needle: &str) -> bool {
        self.rel(id).is_some_and(|rel| {
            rel.relation
                .operands()
                .into_iter()
                .any(|v| self.label(v).contains(needle))
        })
    }

    fn label(&self, id: VariableId) -> String {
        match self.var(id) {
            Some(var) => var.name().to_string(),
            None => format!("<{}>", id),
        }
    }

    pub(crate) fn render(&self, id: RelationshipId) -> String {
        let Some(rel) = self.rel(id) else {
            return format!("<{}>", id);
        };
        match &rel.relation {
            Relation::Equality { left, right } => {
                format!("{} = {}", self.label(*left), self.label(*right))
            }
            Relation::Custom {
                name,
                inputs,
                output,
                ..
            } => {
                let args: Vec<String> = inputs.iter().map(|v| self.label(*v)).collect();
                format!("{} = {}({})", self.label(*output), name, args.join(", "))
            }
            arithmetic => {
                let ops = arithmetic.operands();
                format!(
                    "{} = {} {} {}",
                    self.label(ops[0]),
                    self.label(ops[1]),
                    arithmetic.symbol().unwrap_or_default(),
                    self.label(ops[2])
                )
            }
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(None))
    }
}

//! The propagation graph: variable registry, relationship list, digests and teardown.

use super::config::SystemConfig;
use super::snapshot::SolveReport;
use crate::error::EngineError;
use crate::relations::{CustomFn, DeriveError, Derivation, Relation, Relationship, RelationshipId};
use crate::variables::{Variable, VariableId, VariableKind, VariableState};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// One operand of a graph-construction call
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Variable looked up (or created) by name
    Name(String),
    /// Literal, wrapped in a fresh constant
    Number(f64),
    /// Existing variable
    Handle(VariableId),
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Operand {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<VariableId> for Operand {
    fn from(id: VariableId) -> Self {
        Self::Handle(id)
    }
}

/// A registered custom relationship factory
#[derive(Clone)]
pub(crate) struct FunctionEntry {
    pub function: CustomFn,
    pub arity: Option<usize>,
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Owns every variable and relationship and drives propagation.
///
/// Variables and relationships live in arenas addressed by handles; a
/// destroyed slot is never reused, so a stale handle simply stops resolving.
#[derive(Debug, Default)]
pub struct System {
    pub(crate) config: SystemConfig,
    variables: Vec<Option<Variable>>,
    by_name: HashMap<String, VariableId>,
    relationships: Vec<Option<Relationship>>,
    /// Insertion order = evaluation order within a digest
    order: Vec<RelationshipId>,
    /// Equality created by `set` for a variable, removed again by `clear`
    pub(crate) definitions: HashMap<VariableId, RelationshipId>,
    functions: HashMap<String, FunctionEntry>,
    next_intermediate: u64,
    last_digest: u64,
}

impl System {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SystemConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Highest digest id seen by `solve` or `write`.
    pub fn last_digest(&self) -> u64 {
        self.last_digest
    }

    // --- registry -------------------------------------------------------

    /// Get or create the named variable.
    pub fn variable(&mut self, name: &str) -> VariableId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.insert_variable(Variable::named(name));
        self.by_name.insert(name.to_string(), id);
        debug!(variable = name, handle = %id, "created variable");
        id
    }

    pub fn lookup(&self, name: &str) -> Option<VariableId> {
        self.by_name.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.lookup(name).and_then(|id| self.value_of(id))
    }

    pub fn value_of(&self, id: VariableId) -> Option<f64> {
        self.var(id).and_then(Variable::value)
    }

    pub fn state(&self, name: &str) -> Option<VariableState> {
        self.lookup(name).and_then(|id| self.var(id)).map(Variable::state)
    }

    /// Live variables, constants included.
    pub fn variable_count(&self) -> usize {
        self.variables.iter().flatten().count()
    }

    pub fn relationship_count(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn var(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn var_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.variables.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub(crate) fn rel(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn rel_mut(&mut self, id: RelationshipId) -> Option<&mut Relationship> {
        self.relationships.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub(crate) fn live_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.iter().flatten()
    }

    pub(crate) fn ordered_relationships(&self) -> impl Iterator<Item = RelationshipId> + '_ {
        self.order.iter().copied()
    }

    fn insert_variable(&mut self, var: Variable) -> VariableId {
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(Some(var));
        id
    }

    /// Allocate the next anonymous sub-expression variable.
    pub(crate) fn intermediate(&mut self) -> VariableId {
        let mut name = format!("{}{}", self.config.intermediate_prefix, self.next_intermediate);
        while self.by_name.contains_key(&name) {
            self.next_intermediate += 1;
            name = format!("{}{}", self.config.intermediate_prefix, self.next_intermediate);
        }
        self.next_intermediate += 1;
        let id = self.insert_variable(Variable::intermediate(&name));
        self.by_name.insert(name, id);
        id
    }

    pub(crate) fn constant(&mut self, value: f64) -> Result<VariableId, EngineError> {
        if !value.is_finite() {
            return Err(EngineError::InvalidValue(format!(
                "constant {} is not a finite number",
                value
            )));
        }
        Ok(self.insert_variable(Variable::constant(value)))
    }

    fn resolve(&mut self, operand: Operand) -> Result<VariableId, EngineError> {
        match operand {
            Operand::Name(name) if name.is_empty() => {
                Err(EngineError::InvalidValue("empty variable name".to_string()))
            }
            Operand::Name(name) => Ok(self.variable(&name)),
            Operand::Number(value) => self.constant(value),
            Operand::Handle(id) if self.var(id).is_some() => Ok(id),
            Operand::Handle(id) => Err(EngineError::UnknownVariable(id.to_string())),
        }
    }

    // --- graph construction --------------------------------------------

    pub(crate) fn relate(&mut self, relation: Relation) -> RelationshipId {
        let id = RelationshipId(self.relationships.len() as u32);
        for operand in relation.operands() {
            if let Some(var) = self.var_mut(operand) {
                var.attach(id);
            }
        }
        debug!(relationship = %id, kind = relation.kind_name(), "registered relationship");
        self.relationships.push(Some(Relationship::new(relation)));
        self.order.push(id);
        id
    }

    /// `result = value`
    pub fn equals(
        &mut self,
        result: impl Into<Operand>,
        value: impl Into<Operand>,
    ) -> Result<RelationshipId, EngineError> {
        let left = self.resolve(result.into())?;
        let right = self.resolve(value.into())?;
        Ok(self.relate(Relation::Equality { left, right }))
    }

    /// `result = augend + addend`
    pub fn add(
        &mut self,
        result: impl Into<Operand>,
        augend: impl Into<Operand>,
        addend: impl Into<Operand>,
    ) -> Result<RelationshipId, EngineError> {
        let sum = self.resolve(result.into())?;
        let augend = self.resolve(augend.into())?;
        let addend = self.resolve(addend.into())?;
        Ok(self.relate(Relation::Addition { sum, augend, addend }))
    }

    /// `result = minuend - subtrahend`
    pub fn subtract(
        &mut self,
        result: impl Into<Operand>,
        minuend: impl Into<Operand>,
        subtrahend: impl Into<Operand>,
    ) -> Result<RelationshipId, EngineError> {
        let difference = self.resolve(result.into())?;
        let minuend = self.resolve(minuend.into())?;
        let subtrahend = self.resolve(subtrahend.into())?;
        Ok(self.relate(Relation::Subtraction {
            difference,
            minuend,
            subtrahend,
        }))
    }

    /// `result = multiplicand * multiplier`
    pub fn multiply(
        &mut self,
        result: impl Into<Operand>,
        multiplicand: impl Into<Operand>,
        multiplier: impl Into<Operand>,
    ) -> Result<RelationshipId, EngineError> {
        let product = self.resolve(result.into())?;
        let multiplicand = self.resolve(multiplicand.into())?;
        let multiplier = self.resolve(multiplier.into())?;
        Ok(self.relate(Relation::Multiplication {
            product,
            multiplicand,
            multiplier,
        }))
    }

    /// `result = dividend / divisor`
    pub fn divide(
        &mut self,
        result: impl Into<Operand>,
        dividend: impl Into<Operand>,
        divisor: impl Into<Operand>,
    ) -> Result<RelationshipId, EngineError> {
        let quotient = self.resolve(result.into())?;
        let dividend = self.resolve(dividend.into())?;
        let divisor = self.resolve(divisor.into())?;
        Ok(self.relate(Relation::Division {
            quotient,
            dividend,
            divisor,
        }))
    }

    // --- custom functions ------------------------------------------------

    /// Register a pure function for later `call`s. `arity: None` accepts any argument count.
    pub fn func<F>(&mut self, name: &str, function: F, arity: Option<usize>) -> Result<(), EngineError>
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        if self.functions.contains_key(name) {
            return Err(EngineError::DuplicateFunction(name.to_string()));
        }
        self.functions.insert(
            name.to_string(),
            FunctionEntry {
                function: Arc::new(function),
                arity,
            },
        );
        debug!(function = name, ?arity, "registered function");
        Ok(())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// `output = name(params...)`, solved forward once every param is known.
    pub fn call(
        &mut self,
        name: &str,
        output: impl Into<Operand>,
        params: impl IntoIterator<Item = Operand>,
    ) -> Result<RelationshipId, EngineError> {
        let params: Vec<Operand> = params.into_iter().collect();
        let function = self.checked_function(name, params.len())?;
        let output = self.resolve(output.into())?;
        let inputs = params
            .into_iter()
            .map(|param| self.resolve(param))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.relate(Relation::Custom {
            name: name.to_string(),
            function,
            inputs,
            output,
        }))
    }

    /// Look up a function and check the argument count against its arity.
    pub(crate) fn checked_function(&self, name: &str, count: usize) -> Result<CustomFn, EngineError> {
        let entry = self
            .functions
            .get(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
        match entry.arity {
            Some(arity) if arity != count => Err(EngineError::syntax(
                format!("{} expects {} argument(s), got {}", name, arity, count),
                name,
            )),
            _ => Ok(Arc::clone(&entry.function)),
        }
    }

    // --- values ------------------------------------------------------------

    /// Pin a caller-chosen value. Does not propagate; the next `solve` picks it up.
    pub fn assign(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        self.pin(name, value, VariableState::Explicit)
    }

    /// Pin a value measured by the host environment.
    pub fn assign_environment(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        self.pin(name, value, VariableState::Environment)
    }

    fn pin(&mut self, name: &str, value: f64, state: VariableState) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidValue("empty variable name".to_string()));
        }
        if !value.is_finite() {
            return Err(EngineError::InvalidValue(format!(
                "'{}' cannot hold {}",
                name, value
            )));
        }
        let id = self.variable(name);
        if let Some(var) = self.var_mut(id) {
            var.assign_value(value, state);
        }
        Ok(())
    }

    /// Propagation write into the named variable for `digest`.
    ///
    /// Returns whether the value changed; a change cascades through every
    /// attached relationship before this returns.
    pub fn write(&mut self, name: &str, value: f64, digest: u64) -> Result<bool, EngineError> {
        if !value.is_finite() {
            return Err(EngineError::InvalidValue(format!(
                "'{}' cannot hold {}",
                name, value
            )));
        }
        let id = self.variable(name);
        self.last_digest = self.last_digest.max(digest);
        self.propagate(id, value, digest)
    }

    /// Run `callback` with the new value whenever propagation changes `name`.
    pub fn watch<F>(&mut self, name: &str, callback: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        let id = self.variable(name);
        if let Some(var) = self.var_mut(id) {
            var.on_change(Box::new(callback));
        }
    }

    // --- propagation -------------------------------------------------------

    fn propagate(&mut self, id: VariableId, value: f64, digest: u64) -> Result<bool, EngineError> {
        let tolerance = self.config.tolerance;
        let var = self
            .var_mut(id)
            .ok_or_else(|| EngineError::UnknownVariable(id.to_string()))?;
        if !var.set_value(value, digest, tolerance)? {
            return Ok(false);
        }
        trace!(variable = var.name(), value, digest, "value propagated");

        let dependents = var.relationships().to_vec();
        for rel in dependents {
            self.notify(rel, digest)?;
        }
        Ok(true)
    }

    /// Cycle-guarded entry used by the cascade.
    fn notify(&mut self, id: RelationshipId, digest: u64) -> Result<bool, EngineError> {
        let solved = match self.rel(id) {
            Some(rel) => rel.is_solved_for(digest),
            None => return Ok(false),
        };
        if solved {
            return Ok(true);
        }
        self.solve_relationship(id, digest)
    }

    /// Solve one relationship for `digest`, cascading whatever it writes.
    fn solve_relationship(&mut self, id: RelationshipId, digest: u64) -> Result<bool, EngineError> {
        let Some(rel) = self.rel(id) else {
            return Ok(false);
        };
        let derivation = rel
            .relation
            .derive(|v| self.var(v).and_then(|var| var.value_for(digest)));

        let (target, value) = match derivation {
            Ok(Derivation::Derived { target, value }) => (target, value),
            Ok(Derivation::Pending) => return Ok(false),
            Err(DeriveError::DivisionByZero) => {
                return Err(EngineError::DivisionByZero {
                    relationship: self.render(id),
                })
            }
            Err(DeriveError::NonFinite) => {
                return Err(EngineError::InvalidValue(format!(
                    "`{}` produced a non-finite value",
                    self.render(id)
                )))
            }
        };

        // Mark before writing so a cascade looping back here stops.
        let Some(previous) = self.rel_mut(id).map(|rel| rel.mark_solved(digest)) else {
            return Ok(false);
        };
        trace!(relationship = %id, target = %target, value, digest, "derived");
        if let Err(err) = self.propagate(target, value, digest) {
            if let Some(rel) = self.rel_mut(id) {
                rel.restore(previous);
            }
            return Err(err);
        }
        Ok(true)
    }

    fn solved_count(&self, digest: u64) -> usize {
        self.order
            .iter()
            .filter(|&&id| self.rel(id).is_some_and(|rel| rel.is_solved_for(digest)))
            .count()
    }

    /// Run one digest: solve every relationship in insertion order.
    ///
    /// With `fixpoint` enabled the pass repeats until it solves nothing new,
    /// at most once per relationship plus one.
    pub fn solve(&mut self, digest: u64) -> Result<SolveReport, EngineError> {
        self.last_digest = self.last_digest.max(digest);
        let max_passes = if self.config.fixpoint {
            self.order.len() + 1
        } else {
            1
        };

        let mut passes = 0;
        loop {
            passes += 1;
            let before = self.solved_count(digest);
            let order = self.order.clone();
            for id in order {
                self.solve_relationship(id, digest)?;
            }
            if self.solved_count(digest) == before || passes >= max_passes {
                break;
            }
        }

        let solved = self.solved_count(digest);
        let report = SolveReport {
            digest,
            passes,
            solved,
            pending: self.order.len() - solved,
        };
        debug!(digest, passes, solved, pending = report.pending, "digest complete");
        Ok(report)
    }

    /// Solve under the digest after the last one seen.
    pub fn next_digest(&mut self) -> Result<SolveReport, EngineError> {
        let digest = self.last_digest + 1;
        self.solve(digest)
    }

    // --- teardown ------------------------------------------------------------

    /// Destroy the named variable and everything left orphaned behind it.
    pub fn destroy(&mut self, name: &str) -> bool {
        match self.lookup(name) {
            Some(id) => self.destroy_variable(id),
            None => false,
        }
    }

    pub fn destroy_variable(&mut self, id: VariableId) -> bool {
        if self.var(id).is_none() {
            return false;
        }
        let mut doomed = HashSet::new();
        self.cascade(id, &mut doomed);
        true
    }

    /// Remove every relationship on `id`, collect orphaned endpoints, then drop `id`.
    fn cascade(&mut self, id: VariableId, doomed: &mut HashSet<VariableId>) {
        if !doomed.insert(id) {
            return;
        }
        let attached = match self.var(id) {
            Some(var) => var.relationships().to_vec(),
            None => return,
        };

        for rel_id in attached {
            let Some(rel) = self.remove_relationship(rel_id) else {
                continue;
            };
            self.collect_orphans(&rel.relation, doomed);
        }

        if let Some(var) = self.variables.get_mut(id.0 as usize).and_then(Option::take) {
            if self.by_name.get(var.name()) == Some(&id) {
                self.by_name.remove(var.name());
            }
            self.definitions.remove(&id);
            debug!(variable = var.name(), handle = %id, "destroyed variable");
        }
    }

    fn collect_orphans(&mut self, relation: &Relation, doomed: &mut HashSet<VariableId>) {
        for other in relation.operands() {
            if doomed.contains(&other) {
                continue;
            }
            if self.is_orphan(other) {
                self.cascade(other, doomed);
            }
        }
    }

    /// `can_destroy`, or an intermediate left holding only the relationship that produces it.
    fn is_orphan(&self, id: VariableId) -> bool {
        let Some(var) = self.var(id) else {
            return false;
        };
        if var.can_destroy() {
            return true;
        }
        match (var.kind(), var.relationships()) {
            (VariableKind::Intermediate, [only]) if !var.state().is_pinned() => self
                .rel(*only)
                .is_some_and(|rel| rel.relation.result() == id),
            _ => false,
        }
    }

    fn remove_relationship(&mut self, id: RelationshipId) -> Option<Relationship> {
        let rel = self.relationships.get_mut(id.0 as usize).and_then(Option::take)?;
        for operand in rel.relation.operands() {
            if let Some(var) = self.var_mut(operand) {
                var.detach(id);
            }
        }
        self.order.retain(|&r| r != id);
        self.definitions.retain(|_, r| *r != id);
        trace!(relationship = %id, "removed relationship");
        Some(rel)
    }

    /// Drop the definition `set` gave this variable and reset its value.
    ///
    /// Other relationships that use the variable stay in place.
    pub fn clear(&mut self, name: &str) {
        let Some(id) = self.lookup(name) else {
            return;
        };
        if let Some(rel_id) = self.definitions.remove(&id) {
            if let Some(rel) = self.remove_relationship(rel_id) {
                let mut doomed = HashSet::from([id]);
                self.collect_orphans(&rel.relation, &mut doomed);
            }
        }
        if let Some(var) = self.var_mut(id) {
            var.clear_value();
        }
    }

    /// Forget every value and digest marker; the graph itself stays.
    pub fn reset(&mut self) {
        for var in self.variables.iter_mut().flatten() {
            var.clear_value();
        }
        for rel in self.relationships.iter_mut().flatten() {
            rel.reset();
        }
        debug!("system reset");
    }
}

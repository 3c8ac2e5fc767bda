//! Lowering of expression trees into relationship chains.

use super::graph::{Operand, System};
use crate::error::EngineError;
use crate::relations::Relation;
use crate::variables::parser::{parse_expression, Node, Operator};
use crate::variables::VariableId;
use tracing::debug;

/// Right-hand side accepted by [`System::set`]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    /// Expression text such as `"R - L"`
    Expression(String),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Expression(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Expression(text)
    }
}

impl System {
    /// Redefine `name`: a number pins it, text links it to the parsed expression.
    ///
    /// Text is parsed before anything is cleared, so a syntax error leaves
    /// the previous definition in place.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidValue("empty variable name".to_string()));
        }
        match value.into() {
            Value::Number(n) => {
                if !n.is_finite() {
                    return Err(EngineError::InvalidValue(format!(
                        "'{}' cannot hold {}",
                        name, n
                    )));
                }
                self.clear(name);
                self.assign(name, n)
            }
            Value::Expression(text) => {
                if text.trim().is_empty() {
                    return Err(EngineError::InvalidValue(format!(
                        "empty expression for '{}'",
                        name
                    )));
                }
                let node = parse_expression(&text)?;
                self.check(&node)?;
                self.clear(name);
                let target = self.variable(name);
                let root = self.lower(&node)?;
                let rel = self.relate(Relation::Equality {
                    left: target,
                    right: root,
                });
                self.definitions.insert(target, rel);
                debug!(variable = name, expression = %text, "defined variable");
                Ok(())
            }
        }
    }

    /// Parse `text` and lower it, returning the variable holding its result.
    pub fn evaluate_expression(&mut self, text: &str) -> Result<VariableId, EngineError> {
        let node = parse_expression(text)?;
        self.evaluate(&node)
    }

    /// Lower an expression tree into relationships.
    ///
    /// Identifiers resolve to named variables and numbers to constants;
    /// every operator or call node gets its own intermediate result
    /// variable, created after its operands so the relationship list stays
    /// in dependency order. The whole tree is checked first, so an error
    /// anywhere in it leaves the graph untouched.
    pub fn evaluate(&mut self, node: &Node) -> Result<VariableId, EngineError> {
        self.check(node)?;
        self.lower(node)
    }

    fn check(&self, node: &Node) -> Result<(), EngineError> {
        match node {
            Node::Ident { value } if value.is_empty() => {
                Err(EngineError::syntax("Empty identifier", ""))
            }
            Node::Number { value } if !value.is_finite() => {
                Err(EngineError::syntax("Non-finite number", value.to_string()))
            }
            Node::Ident { .. } | Node::Number { .. } => Ok(()),
            Node::Op {
                operator,
                left,
                right,
            } => {
                parse_operator(operator)?;
                self.check(left)?;
                self.check(right)
            }
            Node::FuncCall { name, params } => {
                self.checked_function(name, params.len())?;
                params.iter().try_for_each(|param| self.check(param))
            }
        }
    }

    fn lower(&mut self, node: &Node) -> Result<VariableId, EngineError> {
        match node {
            Node::Ident { value } => Ok(self.variable(value)),

            Node::Number { value } => self.constant(*value),

            Node::Op {
                operator,
                left,
                right,
            } => {
                let op = parse_operator(operator)?;
                let left = self.lower(left)?;
                let right = self.lower(right)?;
                let out = self.intermediate();
                match op {
                    Operator::Add => self.add(out, left, right)?,
                    Operator::Sub => self.subtract(out, left, right)?,
                    Operator::Mul => self.multiply(out, left, right)?,
                    Operator::Div => self.divide(out, left, right)?,
                };
                Ok(out)
            }

            Node::FuncCall { name, params } => {
                let inputs = params
                    .iter()
                    .map(|param| self.lower(param).map(Operand::from))
                    .collect::<Result<Vec<_>, _>>()?;
                let out = self.intermediate();
                self.call(name, out, inputs)?;
                Ok(out)
            }
        }
    }
}

fn parse_operator(symbol: &str) -> Result<Operator, EngineError> {
    Operator::from_symbol(symbol)
        .ok_or_else(|| EngineError::syntax(format!("Unknown operator '{}'", symbol), symbol))
}

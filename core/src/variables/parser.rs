//! Expression parser for relationship definitions.
//!
//! Supports:
//! - Numbers (anything that parses as a finite float)
//! - Variable names (any other run of non-operator characters, e.g. `#box.width`)
//! - Arithmetic operators (+, -, *, /)
//! - Parentheses for grouping
//!
//! Text is scanned into tokens, reordered into postfix (RPN) with the
//! shunting-yard algorithm, then folded back into a [`Node`] tree on an
//! operand stack. The tree is the same shape a host layer hands to
//! `System::evaluate`, so both paths build identical relationship chains.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Parse error carrying the offending fragment
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Parse error near '{fragment}': {message}")]
pub struct ParseError {
    pub message: String,
    pub fragment: String,
}

impl ParseError {
    fn new(message: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            _ => None,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Add),
            '-' => Some(Self::Sub),
            '*' => Some(Self::Mul),
            '/' => Some(Self::Div),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Variable(String),
    Operator(Operator),
    LeftParen,
    RightParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Variable(name) => f.write_str(name),
            Self::Operator(op) => write!(f, "{}", op),
            Self::LeftParen => f.write_str("("),
            Self::RightParen => f.write_str(")"),
        }
    }
}

/// Expression AST node.
///
/// Deserializes from the host layer's tagged form, e.g.
/// `{"type": "op", "operator": "+", "left": {...}, "right": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Ident {
        value: String,
    },
    Number {
        value: f64,
    },
    /// Binary operation; the operator stays textual until lowering so an
    /// unknown symbol surfaces as a syntax error there.
    Op {
        operator: String,
        left: Box<Node>,
        right: Box<Node>,
    },
    FuncCall {
        name: String,
        params: Vec<Node>,
    },
}

impl Node {
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident { value: name.into() }
    }

    pub fn number(value: f64) -> Self {
        Self::Number { value }
    }

    pub fn op(operator: impl Into<String>, left: Node, right: Node) -> Self {
        Self::Op {
            operator: operator.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, params: Vec<Node>) -> Self {
        Self::FuncCall {
            name: name.into(),
            params,
        }
    }

    /// Read a tree in the host layer's JSON form.
    pub fn from_json(json: &str) -> Result<Self, ParseError> {
        serde_json::from_str(json).map_err(|e| ParseError::new(e.to_string(), json))
    }
}

/// Tokenizer. Operators, parentheses and whitespace end the current word.
struct Lexer {
    tokens: Vec<Token>,
    buffer: String,
}

impl Lexer {
    fn new() -> Self {
        Self {
            tokens: Vec::new(),
            buffer: String::new(),
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let word = std::mem::take(&mut self.buffer);
        match word.parse::<f64>() {
            Ok(n) if n.is_finite() => self.tokens.push(Token::Number(n)),
            _ => self.tokens.push(Token::Variable(word)),
        }
    }

    fn scan(mut self, input: &str) -> Vec<Token> {
        for c in input.chars() {
            if c.is_whitespace() {
                self.flush();
            } else if c == '(' {
                self.flush();
                self.tokens.push(Token::LeftParen);
            } else if c == ')' {
                self.flush();
                self.tokens.push(Token::RightParen);
            } else if let Some(op) = Operator::from_char(c) {
                self.flush();
                self.tokens.push(Token::Operator(op));
            } else {
                self.buffer.push(c);
            }
        }
        self.flush();
        self.tokens
    }
}

/// Split an expression into tokens in a single left-to-right scan.
pub fn tokenize(input: &str) -> Vec<Token> {
    Lexer::new().scan(input)
}

/// Reorder infix tokens into postfix order (shunting-yard, left-associative).
pub fn infix_to_rpn(tokens: &[Token]) -> Result<Vec<Token>, ParseError> {
    let mut output = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(_) | Token::Variable(_) => output.push(token.clone()),
            Token::Operator(op) => {
                while let Some(Token::Operator(top)) = stack.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    if let Some(top) = stack.pop() {
                        output.push(top);
                    }
                }
                stack.push(token.clone());
            }
            Token::LeftParen => stack.push(Token::LeftParen),
            Token::RightParen => loop {
                match stack.pop() {
                    Some(Token::LeftParen) => break,
                    Some(top) => output.push(top),
                    None => return Err(ParseError::new("Unmatched ')'", render(tokens))),
                }
            },
        }
    }

    while let Some(top) = stack.pop() {
        if top == Token::LeftParen {
            return Err(ParseError::new("Unmatched '('", render(tokens)));
        }
        output.push(top);
    }

    Ok(output)
}

/// Fold postfix tokens into an expression tree on an operand stack.
pub fn rpn_to_node(rpn: &[Token]) -> Result<Node, ParseError> {
    let mut operands: Vec<Node> = Vec::new();

    for token in rpn {
        match token {
            Token::Number(n) => operands.push(Node::number(*n)),
            Token::Variable(name) => operands.push(Node::ident(name.clone())),
            Token::Operator(op) => {
                let (Some(right), Some(left)) = (operands.pop(), operands.pop()) else {
                    return Err(ParseError::new(
                        format!("Missing operand for '{}'", op),
                        render(rpn),
                    ));
                };
                operands.push(Node::op(op.symbol(), left, right));
            }
            Token::LeftParen | Token::RightParen => {
                return Err(ParseError::new("Parenthesis in postfix input", render(rpn)));
            }
        }
    }

    let root = operands.pop();
    match (root, operands.is_empty()) {
        (Some(root), true) => Ok(root),
        (None, _) => Err(ParseError::new("Empty expression", "")),
        (Some(_), false) => Err(ParseError::new("Missing operator between operands", render(rpn))),
    }
}

/// Parse an expression string into an AST
pub fn parse_expression(input: &str) -> Result<Node, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::new("Empty expression", input));
    }
    let tokens = tokenize(input);
    let rpn = infix_to_rpn(&tokens)?;
    rpn_to_node(&rpn)
}

fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::expression_part::ExpressionPart;
use crate::expression_token::{Lexer, TokenKind};

/// A formula that failed to parse.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty formula")]
    Empty,
    #[error("unexpected character '{character}' at {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("invalid number '{text}' at {position}")]
    InvalidNumber { text: String, position: usize },
    #[error("unexpected {found} at {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("parenthesis opened at {position} is never closed")]
    UnclosedParenthesis { position: usize },
    #[error("unmatched ')' at {position}")]
    UnmatchedParenthesis { position: usize },
    #[error("'{function}' expects {expected} argument(s), got {found}")]
    WrongArity { function: &'static str, expected: &'static str, found: usize },
    #[error("expected a stat name after '%' at {position}")]
    ExpectedIdentifier { position: usize },
    #[error("function '{function}' at {position} must be called with parentheses")]
    BareFunction { function: &'static str, position: usize },
    #[error("formula nests too deeply at {position}")]
    TooDeep { position: usize },
}

/// A formula that parsed but could not produce a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

/// A compiled formula.
///
/// Formulas are small arithmetic expressions over stat names, e.g.
/// `"CON * 12 + LVL * 15"` or `"max(10, 25% Strength) / 2"`. Compiling once
/// and evaluating many times avoids re-tokenizing on every recompute.
#[derive(Debug, Clone)]
pub struct Expression {
    pub(crate) definition: String,
    pub(crate) compiled: ExpressionPart,
    pub(crate) references: BTreeSet<String>,
}

impl Expression {
    /// Parses and compiles a formula.
    ///
    /// # Arguments
    ///
    /// * `expression`: The formula source (e.g. `"Life + Vitality * 10"`).
    ///
    /// # Returns
    ///
    /// The compiled expression, or the [`ParseError`] describing where it went wrong.
    pub fn new(expression: &str) -> Result<Self, ParseError> {
        let compiled = ExpressionPart::parse(expression)?;
        let mut references = BTreeSet::new();
        compiled.collect_references(&mut references);
        Ok(Self { definition: expression.to_string(), compiled, references })
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// The distinct stat names this formula reads, lower-cased.
    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }

    pub fn root(&self) -> &ExpressionPart {
        &self.compiled
    }

    /// Evaluates the formula, asking `resolve` for the value of every stat reference.
    ///
    /// `resolve` receives identifiers as written in the formula.
    pub fn evaluate(&self, mut resolve: impl FnMut(&str) -> f64) -> Result<f64, EvalError> {
        let value = self.compiled.evaluate(&mut resolve)?;
        if !value.is_finite() {
            return Err(EvalError::NonFinite);
        }
        Ok(value)
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition)
    }
}

impl std::str::FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::new(s)
    }
}

/// Parses and evaluates `formula` in one step.
pub fn evaluate(formula: &str, resolve: impl FnMut(&str) -> f64) -> Result<f64, EvalError> {
    Expression::new(formula)?.evaluate(resolve)
}

/// Checks that a formula parses and evaluates with every stat bound to `1.0`.
///
/// Meant for authoring tools that have no live scope to evaluate against.
pub fn validate(formula: &str) -> bool {
    evaluate(formula, |_| 1.0).is_ok()
}

/// Returns every distinct stat name a formula references, lower-cased.
///
/// Function names and numbers are never references. If the formula does not
/// parse, the identifiers lexed before the error are returned so that a graph
/// can still be wired for a formula that is being fixed.
pub fn extract_references(formula: &str) -> BTreeSet<String> {
    if let Ok(expression) = Expression::new(formula) {
        return expression.references;
    }

    let mut references = BTreeSet::new();
    for token in Lexer::new(formula) {
        let Ok(token) = token else { break };
        if let TokenKind::Identifier(name) = token.kind {
            if crate::expression_part::Function::from_name(&name).is_none() {
                references.insert(name.to_ascii_lowercase());
            }
        }
    }
    references
}

use std::collections::BTreeSet;

use crate::expression_token::{Lexer, Token, TokenKind};
use crate::expressions::{EvalError, ParseError};

/// Nesting limit for the compiled tree: parentheses, unary operators, calls
/// and chained binary operators all count. Evaluation and drop recurse once
/// per level, so this bounds their stack use.
const MAX_DEPTH: usize = 256;

/// One node of a compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionPart {
    Literal(f64),
    /// A stat reference, as written in the formula.
    Reference(String),
    /// `N% name`, i.e. `name * N / 100`.
    PercentOf { percent: f64, reference: String },
    Negate(Box<ExpressionPart>),
    Binary { op: BinaryOp, lhs: Box<ExpressionPart>, rhs: Box<ExpressionPart> },
    Call { function: Function, args: Vec<ExpressionPart> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// The fixed set of functions a formula may call. Trigonometry works in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Min,
    Max,
    Abs,
    Floor,
    Ceil,
    Round,
    Sqrt,
    Sin,
    Cos,
    Tan,
}

impl Function {
    pub const ALL: [Function; 10] = [
        Function::Min,
        Function::Max,
        Function::Abs,
        Function::Floor,
        Function::Ceil,
        Function::Round,
        Function::Sqrt,
        Function::Sin,
        Function::Cos,
        Function::Tan,
    ];

    /// Case-insensitive lookup. Any identifier that matches is never a stat reference.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Min => "min",
            Function::Max => "max",
            Function::Abs => "abs",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
        }
    }

    fn is_variadic(&self) -> bool {
        matches!(self, Function::Min | Function::Max)
    }

    fn accepts(&self, arg_count: usize) -> bool {
        if self.is_variadic() { arg_count >= 1 } else { arg_count == 1 }
    }

    fn arity_error(&self, found: usize) -> ParseError {
        ParseError::WrongArity {
            function: self.name(),
            expected: if self.is_variadic() { "at least 1" } else { "exactly 1" },
            found,
        }
    }

    /// Callers check [`accepts`](Self::accepts) first.
    fn apply(&self, args: &[f64]) -> f64 {
        match self {
            Function::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Function::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Abs => args[0].abs(),
            Function::Floor => args[0].floor(),
            Function::Ceil => args[0].ceil(),
            Function::Round => args[0].round(),
            Function::Sqrt => args[0].sqrt(),
            Function::Sin => args[0].to_radians().sin(),
            Function::Cos => args[0].to_radians().cos(),
            Function::Tan => args[0].to_radians().tan(),
        }
    }
}

impl ExpressionPart {
    /// Parses a complete formula.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::tokenize(source)?;
        if tokens.is_empty() {
            return Err(ParseError::Empty);
        }
        let mut parser = Parser { tokens, cursor: 0, depth: 0 };
        let root = parser.expression()?;
        match parser.peek() {
            None => Ok(root),
            Some(Token { kind: TokenKind::RightParen, position }) => {
                Err(ParseError::UnmatchedParenthesis { position: *position })
            }
            Some(token) => Err(unexpected(token)),
        }
    }

    pub fn evaluate(&self, resolve: &mut dyn FnMut(&str) -> f64) -> Result<f64, EvalError> {
        match self {
            ExpressionPart::Literal(value) => Ok(*value),
            ExpressionPart::Reference(name) => Ok(resolve(name)),
            ExpressionPart::PercentOf { percent, reference } => Ok(resolve(reference) * (percent / 100.0)),
            ExpressionPart::Negate(inner) => Ok(-inner.evaluate(resolve)?),
            ExpressionPart::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(resolve)?;
                let rhs = rhs.evaluate(resolve)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        Ok(lhs / rhs)
                    }
                }
            }
            ExpressionPart::Call { function, args } => {
                if !function.accepts(args.len()) {
                    return Err(EvalError::Parse(function.arity_error(args.len())));
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(resolve)?);
                }
                Ok(function.apply(&values))
            }
        }
    }

    /// Collects every referenced identifier, lower-cased.
    pub fn collect_references(&self, into: &mut BTreeSet<String>) {
        match self {
            ExpressionPart::Literal(_) => {}
            ExpressionPart::Reference(name) | ExpressionPart::PercentOf { reference: name, .. } => {
                into.insert(name.to_ascii_lowercase());
            }
            ExpressionPart::Negate(inner) => inner.collect_references(into),
            ExpressionPart::Binary { lhs, rhs, .. } => {
                lhs.collect_references(into);
                rhs.collect_references(into);
            }
            ExpressionPart::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(into);
                }
            }
        }
    }
}

fn unexpected(token: &Token) -> ParseError {
    ParseError::UnexpectedToken { found: token.kind.to_string(), position: token.position }
}

/// Recursive-descent parser over the token stream.
///
/// ```text
/// expr    := term (('+' | '-') term)*
/// term    := unary (('*' | '/') unary)*
/// unary   := ('-' | '+') unary | primary
/// primary := NUMBER '%' IDENT | NUMBER | IDENT | FUNC '(' expr (',' expr)* ')' | '(' expr ')'
/// ```
struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn descend(&mut self, position: usize) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep { position });
        }
        Ok(())
    }

    /// Each operator of a left-associative chain nests the tree one level
    /// deeper, so it counts against the depth limit like a parenthesis.
    fn expression(&mut self) -> Result<ExpressionPart, ParseError> {
        let mut lhs = self.term()?;
        let mut chained = 0;
        while let Some(token) = self.peek().cloned() {
            let op = match token.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.cursor += 1;
            self.descend(token.position)?;
            chained += 1;
            let rhs = self.term()?;
            lhs = ExpressionPart::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        self.depth -= chained;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<ExpressionPart, ParseError> {
        let mut lhs = self.unary()?;
        let mut chained = 0;
        while let Some(token) = self.peek().cloned() {
            let op = match token.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.cursor += 1;
            self.descend(token.position)?;
            chained += 1;
            let rhs = self.unary()?;
            lhs = ExpressionPart::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        self.depth -= chained;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<ExpressionPart, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::UnexpectedEnd);
        };
        match token.kind {
            TokenKind::Minus => {
                self.cursor += 1;
                self.descend(token.position)?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(ExpressionPart::Negate(Box::new(inner)))
            }
            TokenKind::Plus => {
                self.cursor += 1;
                self.descend(token.position)?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<ExpressionPart, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::UnexpectedEnd);
        };
        match token.kind {
            TokenKind::Number(value) => {
                if self.peek_kind() != Some(&TokenKind::Percent) {
                    return Ok(ExpressionPart::Literal(value));
                }
                let percent_position = self.advance().map(|t| t.position).unwrap_or(token.position);
                match self.advance() {
                    Some(Token { kind: TokenKind::Identifier(name), .. }) if Function::from_name(&name).is_none() => {
                        Ok(ExpressionPart::PercentOf { percent: value, reference: name })
                    }
                    _ => Err(ParseError::ExpectedIdentifier { position: percent_position }),
                }
            }
            TokenKind::Identifier(name) => match Function::from_name(&name) {
                Some(function) => self.call(function, token.position),
                None => Ok(ExpressionPart::Reference(name)),
            },
            TokenKind::LeftParen => {
                self.descend(token.position)?;
                let inner = self.expression()?;
                self.close_paren(token.position)?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => Err(unexpected(&token)),
        }
    }

    fn call(&mut self, function: Function, position: usize) -> Result<ExpressionPart, ParseError> {
        let open = match self.advance() {
            Some(Token { kind: TokenKind::LeftParen, position }) => position,
            _ => {
                return Err(ParseError::BareFunction { function: function.name(), position });
            }
        };
        self.descend(open)?;

        let mut args = Vec::new();
        if self.peek_kind() != Some(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if self.peek_kind() == Some(&TokenKind::Comma) {
                    self.cursor += 1;
                    continue;
                }
                break;
            }
        }
        self.close_paren(open)?;
        self.depth -= 1;

        if !function.accepts(args.len()) {
            return Err(function.arity_error(args.len()));
        }
        Ok(ExpressionPart::Call { function, args })
    }

    fn close_paren(&mut self, open: usize) -> Result<(), ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::RightParen, .. }) => Ok(()),
            Some(token) => Err(unexpected(&token)),
            None => Err(ParseError::UnclosedParenthesis { position: open }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> f64 {
        ExpressionPart::parse(source).unwrap().evaluate(&mut |_| 0.0).unwrap()
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("24 / 4 / 2"), 3.0);
        assert_eq!(eval("-2 * -3"), 6.0);
        assert_eq!(eval("+5 - -5"), 10.0);
    }

    #[test]
    fn test_function_names_are_case_insensitive() {
        assert_eq!(eval("MAX(1, 7, 3)"), 7.0);
        assert_eq!(eval("Min(4, 2)"), 2.0);
        assert_eq!(eval("floor(2.7) + ceil(2.1) + round(2.5)"), 8.0);
    }

    #[test]
    fn test_trig_uses_degrees() {
        assert!((eval("sin(90)") - 1.0).abs() < 1e-12);
        assert!((eval("cos(180)") + 1.0).abs() < 1e-12);
        assert!((eval("tan(45)") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_arity_is_checked_at_parse_time() {
        assert!(matches!(
            ExpressionPart::parse("abs(1, 2)"),
            Err(ParseError::WrongArity { function: "abs", found: 2, .. })
        ));
        assert!(matches!(ExpressionPart::parse("max()"), Err(ParseError::WrongArity { found: 0, .. })));
    }

    #[test]
    fn test_bare_function_name_is_not_a_reference() {
        assert!(matches!(ExpressionPart::parse("sqrt + 1"), Err(ParseError::BareFunction { .. })));
        assert!(matches!(ExpressionPart::parse("10% max"), Err(ParseError::ExpectedIdentifier { .. })));
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(ExpressionPart::parse(&source), Err(ParseError::TooDeep { .. })));

        let source = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(eval(&source), 1.0);
    }

    #[test]
    fn test_long_operator_chains_hit_the_limit() {
        for op in ["+", "*", "-", "/"] {
            let source = vec!["1"; 200_000].join(op);
            assert!(matches!(ExpressionPart::parse(&source), Err(ParseError::TooDeep { .. })), "{}", op);
        }

        let source = vec!["1"; MAX_DEPTH].join("+");
        assert_eq!(eval(&source), MAX_DEPTH as f64);
    }

    #[test]
    fn test_hand_built_call_with_wrong_arity() {
        let call = ExpressionPart::Call { function: Function::Abs, args: Vec::new() };
        assert!(matches!(
            call.evaluate(&mut |_| 0.0),
            Err(EvalError::Parse(ParseError::WrongArity { function: "abs", found: 0, .. }))
        ));

        let call = ExpressionPart::Call { function: Function::Max, args: Vec::new() };
        assert!(call.evaluate(&mut |_| 0.0).is_err());
    }
}

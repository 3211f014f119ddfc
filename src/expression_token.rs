use std::fmt;

use crate::expressions::ParseError;

/// A lexical token of the formula language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Comma,
    LeftParen,
    RightParen,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the token.
    pub position: usize,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Identifier(name) => write!(f, "identifier '{}'", name),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
        }
    }
}

/// Splits a formula into tokens.
///
/// This is the only tokenizer in the crate. Both the evaluator and
/// [`extract_references`](crate::expressions::extract_references) go through
/// it, so the dependency graph always sees the same identifiers the evaluator reads.
pub(crate) struct Lexer<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }

    /// Tokenizes the whole input, failing on the first character the language doesn't know.
    pub fn tokenize(source: &'a str) -> Result<Vec<Token>, ParseError> {
        Lexer::new(source).collect()
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.offset..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.offset += c.len_utf8();
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset;
        while let Some(c) = self.peek_char() {
            if !predicate(c) {
                break;
            }
            self.offset += c.len_utf8();
        }
        &self.source[start..self.offset]
    }

    fn lex_number(&mut self, position: usize) -> Result<Token, ParseError> {
        let integer = self.take_while(|c| c.is_ascii_digit());
        let mut len = integer.len();
        if self.peek_char() == Some('.') {
            self.offset += 1;
            let fraction = self.take_while(|c| c.is_ascii_digit());
            len += 1 + fraction.len();
            if integer.is_empty() && fraction.is_empty() {
                return Err(ParseError::InvalidNumber { text: ".".to_string(), position });
            }
        }
        let text = &self.source[position..position + len];
        let value = text
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber { text: text.to_string(), position })?;
        Ok(Token { kind: TokenKind::Number(value), position })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let position = self.offset;
        let c = self.peek_char()?;

        if c.is_ascii_digit() || c == '.' {
            return Some(self.lex_number(position));
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return Some(Ok(Token { kind: TokenKind::Identifier(name.to_string()), position }));
        }

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            other => {
                // Stop here; an error token ends the stream.
                self.offset = self.source.len();
                return Some(Err(ParseError::UnexpectedCharacter { character: other, position }));
            }
        };
        self.offset += c.len_utf8();
        Some(Ok(Token { kind, position }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lexes_arithmetic() {
        assert_eq!(
            kinds("CON * 12 + lvl_2/.5"),
            vec![
                TokenKind::Identifier("CON".to_string()),
                TokenKind::Star,
                TokenKind::Number(12.0),
                TokenKind::Plus,
                TokenKind::Identifier("lvl_2".to_string()),
                TokenKind::Slash,
                TokenKind::Number(0.5),
            ]
        );
    }

    #[test]
    fn test_lexes_percentage_shorthand() {
        assert_eq!(
            kinds("15% Str"),
            vec![
                TokenKind::Number(15.0),
                TokenKind::Percent,
                TokenKind::Identifier("Str".to_string()),
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = Lexer::tokenize("  a +b").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![2, 4, 5]);
    }

    #[test]
    fn test_rejects_unknown_character() {
        assert_eq!(
            Lexer::tokenize("a ^ b"),
            Err(ParseError::UnexpectedCharacter { character: '^', position: 2 })
        );
    }

    #[test]
    fn test_lone_dot_is_not_a_number() {
        assert!(matches!(Lexer::tokenize("1 + ."), Err(ParseError::InvalidNumber { .. })));
    }
}

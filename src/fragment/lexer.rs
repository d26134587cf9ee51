//! Tokenizer for fragment source text.
use std::fmt;

use super::node::Position;
use crate::error::{ParseError, ParseErrorKind};

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword (`class`, `true`, ...).
    Ident(String),
    /// Numeric literal, verbatim.
    Number(String),
    /// String literal with `""` escapes resolved.
    Str(String),
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `=`
    Assign,
    /// `+=`
    PlusAssign,
    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "identifier '{s}'"),
            Self::Number(s) => write!(f, "number '{s}'"),
            Self::Str(_) => f.write_str("string literal"),
            Self::LBrace => f.write_str("'{'"),
            Self::RBrace => f.write_str("'}'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::Colon => f.write_str("':'"),
            Self::Semicolon => f.write_str("';'"),
            Self::Comma => f.write_str("','"),
            Self::Assign => f.write_str("'='"),
            Self::PlusAssign => f.write_str("'+='"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with the position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What was read.
    pub kind: TokenKind,
    /// Line and column of the first character.
    pub position: Position,
}

/// Split fragment text into tokens, skipping whitespace and comments.
///
/// The returned vector always ends with a [`TokenKind::Eof`] token.
///
/// # Errors
///
/// Returns a [`ParseError`] for unterminated strings or block comments,
/// malformed numbers and characters that cannot start a token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    pos: Position,
}

impl<'a> Lexer<'a> {
    const fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: Position::start(),
        }
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.pos.offset..).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos.offset += c.len_utf8();
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(ParseError::new(
                                    start,
                                    ParseErrorKind::UnterminatedComment,
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let position = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };

        let kind = match c {
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ':' => self.single(TokenKind::Colon),
            ';' => self.single(TokenKind::Semicolon),
            ',' => self.single(TokenKind::Comma),
            '=' => self.single(TokenKind::Assign),
            '+' if self.peek_second() == Some('=') => {
                self.bump();
                self.bump();
                TokenKind::PlusAssign
            }
            '"' => self.string(position)?,
            c if c.is_ascii_digit() => self.number(position)?,
            '-' | '+' | '.'
                if self
                    .peek_second()
                    .is_some_and(|n| n.is_ascii_digit() || n == '.') =>
            {
                self.number(position)?
            }
            c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
            other => {
                return Err(ParseError::new(
                    position,
                    ParseErrorKind::UnexpectedCharacter(other),
                ));
            }
        };
        Ok(Token { kind, position })
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos.offset;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        TokenKind::Ident(self.slice_from(start).to_string())
    }

    /// Strings end at the next unpaired `"`; `""` inside a string is a literal quote.
    fn string(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') if self.peek() == Some('"') => {
                    self.bump();
                    value.push('"');
                }
                Some('"') => return Ok(TokenKind::Str(value)),
                Some('\n') | None => {
                    return Err(ParseError::new(start, ParseErrorKind::UnterminatedString));
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn number(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.pos.offset;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }

        let is_hex = self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X'));
        let mut digits = 0usize;
        if is_hex {
            self.bump();
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
                digits += 1;
            }
        } else {
            digits += self.digits();
            if self.peek() == Some('.') {
                self.bump();
                digits += self.digits();
            }
            if digits > 0 && matches!(self.peek(), Some('e' | 'E')) {
                self.bump();
                if matches!(self.peek(), Some('-' | '+')) {
                    self.bump();
                }
                if self.digits() == 0 {
                    return Err(self.invalid_number(begin, start));
                }
            }
        }

        if digits == 0
            || self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(self.invalid_number(begin, start));
        }
        Ok(TokenKind::Number(self.slice_from(begin).to_string()))
    }

    fn digits(&mut self) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            count += 1;
        }
        count
    }

    fn invalid_number(&mut self, begin: usize, start: Position) -> ParseError {
        // Swallow the rest of the word so the message shows the whole literal.
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            self.bump();
        }
        ParseError::new(
            start,
            ParseErrorKind::InvalidNumber(self.slice_from(begin).to_string()),
        )
    }

    fn slice_from(&self, begin: usize) -> &'a str {
        self.source.get(begin..self.pos.offset).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("source should tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_array_append() {
        assert_eq!(
            kinds("files[] += {\"a\"};"),
            vec![
                TokenKind::Ident("files".to_string()),
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::PlusAssign,
                TokenKind::LBrace,
                TokenKind::Str("a".to_string()),
                TokenKind::RBrace,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers_are_verbatim() {
        assert_eq!(
            kinds("0.1 -2 1e-3 0x1F .5"),
            vec![
                TokenKind::Number("0.1".to_string()),
                TokenKind::Number("-2".to_string()),
                TokenKind::Number("1e-3".to_string()),
                TokenKind::Number("0x1F".to_string()),
                TokenKind::Number(".5".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn doubled_quote_is_escaped_quote() {
        assert_eq!(
            kinds(r#""say ""hi""""#),
            vec![TokenKind::Str("say \"hi\"".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("// line\nclass /* block\n comment */ A"),
            vec![
                TokenKind::Ident("class".to_string()),
                TokenKind::Ident("A".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = tokenize("class A\n{\n  x = 1;\n};").expect("should tokenize");
        let x = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Ident("x".to_string()))
            .expect("x token");
        assert_eq!(x.position.line, 3);
        assert_eq!(x.position.column, 3);
    }

    #[test]
    fn unterminated_string_reports_opening_quote() {
        let err = tokenize("a = \"oops;\n").expect_err("should fail");
        assert_eq!(err.kind, ParseErrorKind::UnterminatedString);
        assert_eq!(err.position.column, 5);
    }

    #[test]
    fn unterminated_block_comment() {
        let err = tokenize("/* never closed").expect_err("should fail");
        assert_eq!(err.kind, ParseErrorKind::UnterminatedComment);
    }

    #[test]
    fn malformed_number() {
        let err = tokenize("x = 12abc;").expect_err("should fail");
        assert_eq!(err.kind, ParseErrorKind::InvalidNumber("12abc".to_string()));
    }

    #[test]
    fn preprocessor_directives_are_rejected() {
        let err = tokenize("#include \"x.hpp\"").expect_err("should fail");
        assert_eq!(err.kind, ParseErrorKind::UnexpectedCharacter('#'));
    }
}

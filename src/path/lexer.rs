//! Path expression lexer
//!
//! Tokenizes path expressions into tokens. Works on bytes; multibyte
//! characters only ever appear inside names and literals, so byte offsets
//! stay on character boundaries.

use memchr::memchr;

use crate::error::PathError;
use crate::store::name::{is_name_char, is_name_start_char, is_whitespace};

/// Path token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Operators
    Slash,       // /
    DoubleSlash, // //
    Dot,         // .
    DotDot,      // ..
    At,          // @
    Pipe,        // |
    Star,        // *
    Eq,          // =
    Semi,        // ;

    // Brackets
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]

    // Literals
    Number(usize),
    Literal(String),

    // Names
    Name(String),             // NCName
    Prefixed(String, String), // prefix:local
    PrefixStar(String),       // prefix:*
    NodeType(String),         // node(), text(), comment()

    // End of input
    Eof,
}

/// Path lexer
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer
    pub fn new(input: &'a str) -> Self {
        Lexer { input, pos: 0 }
    }

    /// Get the remaining input
    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Peek at the current byte
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    /// Peek at the byte at offset
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    /// Advance by n bytes
    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Skip whitespace
    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_whitespace) {
            self.advance(1);
        }
    }

    /// Get the next token together with its byte offset
    pub fn next_token(&mut self) -> Result<(Token, usize), PathError> {
        self.skip_whitespace();
        let start = self.pos;

        let b = match self.peek() {
            Some(b) => b,
            None => return Ok((Token::Eof, start)),
        };

        let token = match b {
            b'/' => {
                self.advance(1);
                if self.peek() == Some(b'/') {
                    self.advance(1);
                    Token::DoubleSlash
                } else {
                    Token::Slash
                }
            }
            b'.' => {
                self.advance(1);
                if self.peek() == Some(b'.') {
                    self.advance(1);
                    Token::DotDot
                } else {
                    Token::Dot
                }
            }
            b'@' => {
                self.advance(1);
                Token::At
            }
            b'|' => {
                self.advance(1);
                Token::Pipe
            }
            b'*' => {
                self.advance(1);
                Token::Star
            }
            b'=' => {
                self.advance(1);
                Token::Eq
            }
            b';' => {
                self.advance(1);
                Token::Semi
            }
            b'(' => {
                self.advance(1);
                Token::LParen
            }
            b')' => {
                self.advance(1);
                Token::RParen
            }
            b'[' => {
                self.advance(1);
                Token::LBracket
            }
            b']' => {
                self.advance(1);
                Token::RBracket
            }
            b'"' | b'\'' => self.read_literal()?,
            b'0'..=b'9' => self.read_number()?,
            _ if is_name_start_char(b) => self.read_name()?,
            _ => {
                let c = self.remaining().chars().next().unwrap_or('?');
                return Err(PathError::syntax(
                    format!("unexpected character {c:?}"),
                    start,
                ));
            }
        };
        Ok((token, start))
    }

    /// Read an unsigned integer literal
    fn read_number(&mut self) -> Result<Token, PathError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance(1);
        }
        let digits = &self.input[start..self.pos];
        let value = digits
            .parse()
            .map_err(|_| PathError::syntax("number out of range", start))?;
        Ok(Token::Number(value))
    }

    /// Read a quoted string literal
    fn read_literal(&mut self) -> Result<Token, PathError> {
        let start = self.pos;
        let quote = self.input.as_bytes()[self.pos];
        self.advance(1);

        match memchr(quote, self.remaining().as_bytes()) {
            Some(i) => {
                let value = self.input[self.pos..self.pos + i].to_string();
                self.advance(i + 1);
                Ok(Token::Literal(value))
            }
            None => Err(PathError::syntax("unterminated string literal", start)),
        }
    }

    /// Read a name, name test, or node-type keyword
    fn read_name(&mut self) -> Result<Token, PathError> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.advance(1);
        }
        let name = &self.input[start..self.pos];

        // A contiguous prefix:local or prefix:* name test. Double colons
        // would be an axis, which the language does not have.
        if self.peek() == Some(b':') && self.peek_at(1) != Some(b':') {
            self.advance(1);
            if self.peek() == Some(b'*') {
                self.advance(1);
                return Ok(Token::PrefixStar(name.to_string()));
            }
            if !self.peek().is_some_and(is_name_start_char) {
                return Err(PathError::syntax(
                    format!("expected a local name after {name:?}"),
                    self.pos,
                ));
            }
            let local_start = self.pos;
            while self.peek().is_some_and(is_name_char) {
                self.advance(1);
            }
            let local = &self.input[local_start..self.pos];
            return Ok(Token::Prefixed(name.to_string(), local.to_string()));
        }

        // node()/text()/comment() only become kind tests when parentheses
        // follow; otherwise they are ordinary element names.
        self.skip_whitespace();
        if self.peek() == Some(b'(') {
            if let "node" | "text" | "comment" = name {
                return Ok(Token::NodeType(name.to_string()));
            }
        }
        Ok(Token::Name(name.to_string()))
    }

    /// Tokenize entire input
    #[cfg(test)]
    pub fn tokenize(&mut self) -> Result<Vec<Token>, PathError> {
        let mut tokens = Vec::new();
        loop {
            let (token, _) = self.next_token()?;
            if matches!(token, Token::Eof) {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }
}

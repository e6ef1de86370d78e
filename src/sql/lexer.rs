//! SQL Lexer (Tokenizer)
//!
//! This module converts SQL strings into a stream of tokens. It never fails:
//! characters it does not understand become [`Token::Other`] and unterminated
//! literals run to the end of the input.

use super::token::Token;
use crate::dialect::{Dialect, QuoteStyle};

/// Remove `--` line comments and `/* */` block comments.
///
/// This runs before any literal-aware scanning, so comment markers inside
/// string literals are stripped as well. Block comments do not nest.
pub fn strip_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        if ch == '-' && next == Some('-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if ch == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            // Keep adjacent tokens apart
            out.push(' ');
        } else {
            out.push(ch);
            i += 1;
        }
    }

    out
}

/// SQL Lexer
pub struct Lexer<'a> {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
    dialect: &'a dyn Dialect,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input
    pub fn new(input: &str, dialect: &'a dyn Dialect) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            dialect,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }

        tokens
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        if self.is_at_end() {
            return Token::Eof;
        }

        let ch = self.current_char();

        match ch {
            '(' => {
                self.advance();
                return Token::LParen;
            }
            ')' => {
                self.advance();
                return Token::RParen;
            }
            ',' => {
                self.advance();
                return Token::Comma;
            }
            ';' => {
                self.advance();
                return Token::Semicolon;
            }
            '.' => {
                self.advance();
                return Token::Dot;
            }
            '\'' => return self.read_string(),
            '"' if self.accepts(QuoteStyle::DoubleQuote) => {
                return self.read_quoted_identifier(QuoteStyle::DoubleQuote)
            }
            '[' if self.accepts(QuoteStyle::Bracket) => {
                return self.read_quoted_identifier(QuoteStyle::Bracket)
            }
            '$' if self.dialect.dollar_quoting() => {
                if let Some(token) = self.read_dollar_string() {
                    return token;
                }
            }
            _ => {}
        }

        if ch.is_ascii_digit() {
            return self.read_number();
        }

        if is_word_start(ch) {
            return self.read_identifier();
        }

        self.advance();
        Token::Other(ch)
    }

    fn accepts(&self, style: QuoteStyle) -> bool {
        self.dialect.identifier_quotes().contains(&style)
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get the current character
    fn current_char(&self) -> char {
        self.input[self.position]
    }

    /// Peek at the next character
    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    /// Read a string literal (single-quoted)
    fn read_string(&mut self) -> Token {
        self.advance(); // skip opening quote

        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch == '\'' {
                // Check for escaped quote ''
                if self.peek_char() == Some('\'') {
                    value.push('\'');
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    return Token::StringLiteral(value);
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Token::StringLiteral(value)
    }

    /// Read a delimited identifier; an unterminated one swallows the rest
    fn read_quoted_identifier(&mut self, style: QuoteStyle) -> Token {
        let (open, close) = style.delimiters();
        self.advance(); // skip opening delimiter

        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch == close {
                if self.peek_char() == Some(close) {
                    value.push(close);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing delimiter
                    return Token::QuotedIdentifier { value, style };
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Token::Other(open)
    }

    /// Read `$tag$ ... $tag$`. Returns None when `$` does not open a tag.
    fn read_dollar_string(&mut self) -> Option<Token> {
        let start = self.position;
        let mut end = start + 1;
        while end < self.input.len() && (self.input[end].is_alphanumeric() || self.input[end] == '_')
        {
            end += 1;
        }
        if end >= self.input.len() || self.input[end] != '$' {
            return None;
        }

        let tag: Vec<char> = self.input[start..=end].to_vec();
        let body_start = end + 1;
        let mut i = body_start;
        while i + tag.len() <= self.input.len() {
            if self.input[i..i + tag.len()] == tag[..] {
                let value: String = self.input[body_start..i].iter().collect();
                self.position = i + tag.len();
                return Some(Token::StringLiteral(value));
            }
            i += 1;
        }

        let value: String = self.input[body_start.min(self.input.len())..].iter().collect();
        self.position = self.input.len();
        Some(Token::StringLiteral(value))
    }

    /// Read a number, keeping its text
    fn read_number(&mut self) -> Token {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                value.push(ch);
                self.advance();
            } else if ch == '.' && self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::Number(value)
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_alphanumeric() || matches!(ch, '_' | '#' | '@' | '$') {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if let Some(keyword) = Token::from_keyword(&value) {
            keyword
        } else {
            Token::Identifier(value)
        }
    }
}

fn is_word_start(ch: char) -> bool {
    ch.is_alphabetic() || matches!(ch, '_' | '#' | '@')
}

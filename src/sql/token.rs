//! SQL Token definitions
//!
//! Only the keywords that decide a statement's shape get their own variant.
//! Everything else is a word, a literal or punctuation.

use std::fmt;

use crate::dialect::QuoteStyle;

/// SQL Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // ========== Structural Keywords ==========
    Create,
    Drop,
    Table,
    Select,
    Insert,
    Into,
    From,
    As,
    With,
    Or,
    If,
    Not,
    Exists,

    // ========== Soft Keywords ==========
    // These may also appear as plain names.
    Replace,
    Temporary,
    Temp,
    Global,
    Local,
    Unlogged,
    View,
    Materialized,
    Function,
    Procedure,
    Proc,
    Trigger,
    Index,
    Cascade,
    Restrict,

    // ========== Names & Literals ==========
    /// Bare word
    Identifier(String),
    /// Delimited identifier, delimiters removed and escapes resolved
    QuotedIdentifier { value: String, style: QuoteStyle },
    /// String literal (single or dollar quoted)
    StringLiteral(String),
    /// Numeric literal, kept as written
    Number(String),

    // ========== Delimiters ==========
    /// (
    LParen,
    /// )
    RParen,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// .
    Dot,
    /// Any other character
    Other(char),

    // ========== Special ==========
    /// End of input
    Eof,
}

impl Token {
    /// Check if this token is a keyword that can never be a name
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Token::Create
                | Token::Drop
                | Token::Table
                | Token::Select
                | Token::Insert
                | Token::Into
                | Token::From
                | Token::As
                | Token::With
                | Token::Or
                | Token::If
                | Token::Not
                | Token::Exists
        )
    }

    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        self.is_reserved()
            || matches!(
                self,
                Token::Replace
                    | Token::Temporary
                    | Token::Temp
                    | Token::Global
                    | Token::Local
                    | Token::Unlogged
                    | Token::View
                    | Token::Materialized
                    | Token::Function
                    | Token::Procedure
                    | Token::Proc
                    | Token::Trigger
                    | Token::Index
                    | Token::Cascade
                    | Token::Restrict
            )
    }

    /// Text of a token usable as a bare name: plain words and soft keywords
    pub fn as_bare_name(&self) -> Option<String> {
        match self {
            Token::Identifier(name) => Some(name.clone()),
            t if t.is_keyword() && !t.is_reserved() => Some(t.to_string()),
            _ => None,
        }
    }

    /// Try to parse a keyword from a string
    pub fn from_keyword(s: &str) -> Option<Token> {
        match s.to_uppercase().as_str() {
            "CREATE" => Some(Token::Create),
            "DROP" => Some(Token::Drop),
            "TABLE" => Some(Token::Table),
            "SELECT" => Some(Token::Select),
            "INSERT" => Some(Token::Insert),
            "INTO" => Some(Token::Into),
            "FROM" => Some(Token::From),
            "AS" => Some(Token::As),
            "WITH" => Some(Token::With),
            "OR" => Some(Token::Or),
            "IF" => Some(Token::If),
            "NOT" => Some(Token::Not),
            "EXISTS" => Some(Token::Exists),

            "REPLACE" => Some(Token::Replace),
            "TEMPORARY" => Some(Token::Temporary),
            "TEMP" => Some(Token::Temp),
            "GLOBAL" => Some(Token::Global),
            "LOCAL" => Some(Token::Local),
            "UNLOGGED" => Some(Token::Unlogged),
            "VIEW" => Some(Token::View),
            "MATERIALIZED" => Some(Token::Materialized),
            "FUNCTION" => Some(Token::Function),
            "PROCEDURE" => Some(Token::Procedure),
            "PROC" => Some(Token::Proc),
            "TRIGGER" => Some(Token::Trigger),
            "INDEX" => Some(Token::Index),
            "CASCADE" => Some(Token::Cascade),
            "RESTRICT" => Some(Token::Restrict),

            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Create => write!(f, "CREATE"),
            Token::Drop => write!(f, "DROP"),
            Token::Table => write!(f, "TABLE"),
            Token::Select => write!(f, "SELECT"),
            Token::Insert => write!(f, "INSERT"),
            Token::Into => write!(f, "INTO"),
            Token::From => write!(f, "FROM"),
            Token::As => write!(f, "AS"),
            Token::With => write!(f, "WITH"),
            Token::Or => write!(f, "OR"),
            Token::If => write!(f, "IF"),
            Token::Not => write!(f, "NOT"),
            Token::Exists => write!(f, "EXISTS"),
            Token::Replace => write!(f, "REPLACE"),
            Token::Temporary => write!(f, "TEMPORARY"),
            Token::Temp => write!(f, "TEMP"),
            Token::Global => write!(f, "GLOBAL"),
            Token::Local => write!(f, "LOCAL"),
            Token::Unlogged => write!(f, "UNLOGGED"),
            Token::View => write!(f, "VIEW"),
            Token::Materialized => write!(f, "MATERIALIZED"),
            Token::Function => write!(f, "FUNCTION"),
            Token::Procedure => write!(f, "PROCEDURE"),
            Token::Proc => write!(f, "PROC"),
            Token::Trigger => write!(f, "TRIGGER"),
            Token::Index => write!(f, "INDEX"),
            Token::Cascade => write!(f, "CASCADE"),
            Token::Restrict => write!(f, "RESTRICT"),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::QuotedIdentifier { value, style } => write!(f, "{}", style.quote(value)),
            Token::StringLiteral(s) => write!(f, "'{}'", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Other(ch) => write!(f, "{}", ch),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

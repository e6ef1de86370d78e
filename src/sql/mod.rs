//! SQL analysis
//!
//! Tokenizing, table identifiers and the statement classifier.

pub mod classifier;
pub mod identifier;
pub mod lexer;
pub mod token;

pub use classifier::{classify, Classification, TableAction, TableEvent};
pub use identifier::{LedgerKey, Segment, TableIdentifier};
pub use lexer::{strip_comments, Lexer};
pub use token::Token;

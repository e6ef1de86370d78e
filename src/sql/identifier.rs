//! Table identifiers
//!
//! A table reference is one to four dot-separated segments,
//! `[server.][database.]schema.table`, each either bare or delimited. Bare
//! segments are folded to the dialect's default case; delimited segments
//! keep their case and delimiter.

use std::fmt;

use serde::Serialize;

use super::lexer::Lexer;
use super::token::Token;
use crate::dialect::{Dialect, QuoteStyle};

/// One segment of a dotted identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Segment {
    /// Name with delimiters removed; folded when bare
    pub value: String,
    /// Delimiter the segment was written with
    pub quote: Option<QuoteStyle>,
}

impl Segment {
    /// A bare segment, folded per dialect
    pub fn bare(name: &str, dialect: &dyn Dialect) -> Self {
        Self {
            value: dialect.fold_case(name),
            quote: None,
        }
    }

    pub fn quoted(name: impl Into<String>, style: QuoteStyle) -> Self {
        Self {
            value: name.into(),
            quote: Some(style),
        }
    }

    fn render(&self, bare_style: Option<QuoteStyle>) -> String {
        match self.quote.or(bare_style) {
            Some(style) => style.quote(&self.value),
            None => self.value.clone(),
        }
    }
}

/// Comparison key for ledger rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub schema: String,
    pub table: String,
}

impl LedgerKey {
    /// Build a key from stored ledger values
    pub fn new(schema: &str, table: &str, dialect: &dyn Dialect) -> Self {
        if dialect.quoted_identifiers_case_sensitive() {
            Self {
                schema: schema.to_string(),
                table: table.to_string(),
            }
        } else {
            Self {
                schema: schema.to_lowercase(),
                table: table.to_lowercase(),
            }
        }
    }
}

/// A structured table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableIdentifier {
    pub server: Option<Segment>,
    pub database: Option<Segment>,
    pub schema: Option<Segment>,
    pub name: Segment,
    /// How bare segments are rendered
    #[serde(skip)]
    bare_style: Option<QuoteStyle>,
}

/// Outcome of scanning tokens for a table reference
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Scanned {
    /// A table reference and the number of tokens it spans
    Table(TableIdentifier, usize),
    /// A temp table reference; never reported
    Temporary(usize),
    /// Not a recognizable reference
    Invalid,
}

impl TableIdentifier {
    /// Parse raw reference text such as `[S].[T]` or `public.trips`.
    ///
    /// Returns None for anything that is not exactly one table reference,
    /// including temp tables.
    pub fn parse(text: &str, dialect: &dyn Dialect) -> Option<Self> {
        let tokens = Lexer::new(text, dialect).tokenize();
        match scan(&tokens, dialect) {
            Scanned::Table(id, consumed) if tokens.get(consumed) == Some(&Token::Eof) => Some(id),
            _ => None,
        }
    }

    /// An identifier for names read back from a ledger. Stored names are
    /// exact, so any name that folding would change is kept delimited.
    pub fn from_stored(schema: &str, table: &str, dialect: &dyn Dialect) -> Self {
        let style = dialect.quote_style().unwrap_or(QuoteStyle::DoubleQuote);
        let segment = |value: &str| {
            if is_bare_identifier(value, dialect)
                && value.chars().all(|ch| ch.is_alphanumeric() || ch == '_')
                && dialect.fold_case(value) == value
            {
                Segment::bare(value, dialect)
            } else {
                Segment::quoted(value, style)
            }
        };
        Self {
            server: None,
            database: None,
            schema: Some(segment(schema)),
            name: segment(table),
            bare_style: dialect.quote_style(),
        }
    }

    /// Fill in a missing schema segment
    pub fn with_default_schema(mut self, schema: &str, dialect: &dyn Dialect) -> Self {
        if self.schema.is_none() {
            self.schema = Some(Segment::bare(schema, dialect));
        }
        self
    }

    /// Whether the reference names another server or database
    pub fn is_remote(&self) -> bool {
        self.server.is_some() || self.database.is_some()
    }

    /// Schema name, if present
    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_ref().map(|s| s.value.as_str())
    }

    pub fn table_name(&self) -> &str {
        &self.name.value
    }

    /// Ledger key, resolving a missing schema to `default_schema`
    pub fn ledger_key(&self, default_schema: &str, dialect: &dyn Dialect) -> LedgerKey {
        let schema = match &self.schema {
            Some(segment) => segment.value.clone(),
            None => dialect.fold_case(default_schema),
        };
        LedgerKey::new(&schema, &self.name.value, dialect)
    }

    fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.server
            .iter()
            .chain(self.database.iter())
            .chain(self.schema.iter())
            .chain(std::iter::once(&self.name))
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.segments().map(|s| s.render(self.bare_style)).collect();
        write!(f, "{}", rendered.join("."))
    }
}

/// Scan a table reference starting at `tokens[0]`
pub(crate) fn scan(tokens: &[Token], dialect: &dyn Dialect) -> Scanned {
    let mut segments = Vec::new();
    let mut pos = 0;

    loop {
        let segment = match tokens.get(pos) {
            Some(Token::QuotedIdentifier { value, style }) if !value.is_empty() => {
                Segment::quoted(value.clone(), *style)
            }
            Some(token) => match token.as_bare_name() {
                Some(name) => {
                    if !is_bare_identifier(&name, dialect) {
                        return Scanned::Invalid;
                    }
                    Segment::bare(&name, dialect)
                }
                None => return Scanned::Invalid,
            },
            None => return Scanned::Invalid,
        };
        segments.push(segment);
        pos += 1;

        if tokens.get(pos) == Some(&Token::Dot) {
            pos += 1;
        } else {
            break;
        }
    }

    if segments.len() > dialect.identifier_max_segments() {
        return Scanned::Invalid;
    }

    let is_temporary = segments.last().is_some_and(|name| {
        dialect
            .temp_table_sigils()
            .iter()
            .any(|sigil| name.value.starts_with(sigil))
    });
    if is_temporary {
        return Scanned::Temporary(pos);
    }

    // Segments are assigned right to left
    let name = match segments.pop() {
        Some(name) => name,
        None => return Scanned::Invalid,
    };
    let schema = segments.pop();
    let database = segments.pop();
    let server = segments.pop();

    Scanned::Table(
        TableIdentifier {
            server,
            database,
            schema,
            name,
            bare_style: dialect.quote_style(),
        },
        pos,
    )
}

/// A bare name must start like an identifier; sigil names pass only where the
/// dialect knows the sigil
fn is_bare_identifier(name: &str, dialect: &dyn Dialect) -> bool {
    match name.chars().next() {
        Some(ch) if ch.is_alphabetic() || ch == '_' => true,
        Some(_) => dialect
            .temp_table_sigils()
            .iter()
            .any(|sigil| name.starts_with(sigil)),
        None => false,
    }
}

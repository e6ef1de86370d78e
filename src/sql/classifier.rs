//! Statement classifier
//!
//! Finds the tables a batch creates or drops without executing it. This is a
//! heuristic over tokens, not a grammar: each statement is matched against a
//! small table of shapes, and anything that does not match with confidence
//! is left out of both lists.

use indexmap::IndexMap;
use serde::Serialize;

use super::identifier::{scan, Scanned, TableIdentifier};
use super::lexer::{strip_comments, Lexer};
use super::token::Token;
use crate::dialect::Dialect;

/// What a statement does to a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAction {
    Created,
    Dropped,
}

/// One table effect, in batch order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableEvent {
    pub action: TableAction,
    pub table: TableIdentifier,
}

/// Result of classifying a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    /// Created tables, schema-qualified, deduplicated, first occurrence order
    pub created: Vec<TableIdentifier>,
    /// Dropped tables as written, deduplicated, first occurrence order
    pub dropped: Vec<TableIdentifier>,
    /// Every effect in statement order
    pub events: Vec<TableEvent>,
}

impl Classification {
    /// Canonical renderings of the created tables
    pub fn created_names(&self) -> Vec<String> {
        self.created.iter().map(|t| t.to_string()).collect()
    }

    /// Canonical renderings of the dropped tables
    pub fn dropped_names(&self) -> Vec<String> {
        self.dropped.iter().map(|t| t.to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Classify a batch
pub fn classify(batch: &str, default_schema: &str, dialect: &dyn Dialect) -> Classification {
    let text = strip_comments(batch);
    let tokens = Lexer::new(&text, dialect).tokenize();

    let mut events = Vec::new();
    for statement in split_statements(&tokens, dialect) {
        events.extend(match_statement(statement, default_schema, dialect));
    }

    let mut created = IndexMap::new();
    let mut dropped = IndexMap::new();
    for event in &events {
        let target = match event.action {
            TableAction::Created => &mut created,
            TableAction::Dropped => &mut dropped,
        };
        target
            .entry(event.table.to_string())
            .or_insert_with(|| event.table.clone());
    }

    Classification {
        created: created.into_values().collect(),
        dropped: dropped.into_values().collect(),
        events,
    }
}

/// Split tokens into statements on `;` and before any top-level CREATE or
/// DROP, since T-SQL batches often omit semicolons.
///
/// A procedure, function or trigger definition is never split: its body is
/// stored, not run. Without dollar quoting the body can hold `;`, so the
/// definition runs to the end of the batch.
fn split_statements<'t>(tokens: &'t [Token], dialect: &dyn Dialect) -> Vec<&'t [Token]> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut depth: usize = 0;
    let mut in_routine = starts_routine(tokens);

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Semicolon if in_routine && !dialect.dollar_quoting() => {}
            Token::Semicolon | Token::Eof => {
                if i > start {
                    statements.push(&tokens[start..i]);
                }
                start = i + 1;
                depth = 0;
                in_routine = starts_routine(&tokens[start.min(tokens.len())..]);
            }
            Token::Create | Token::Drop if depth == 0 && i > start && !in_routine => {
                statements.push(&tokens[start..i]);
                start = i;
                in_routine = starts_routine(&tokens[i..]);
            }
            _ => {}
        }
    }

    statements
}

/// `CREATE [OR REPLACE | OR ALTER] | ALTER` followed by PROCEDURE, PROC,
/// FUNCTION or TRIGGER
fn starts_routine(stmt: &[Token]) -> bool {
    let mut cursor = Cursor::new(stmt);
    if cursor.eat(&Token::Create) {
        if cursor.eat(&Token::Or) && !(cursor.eat(&Token::Replace) || cursor.eat_word("ALTER")) {
            return false;
        }
    } else if !cursor.eat_word("ALTER") {
        return false;
    }
    matches!(
        cursor.current(),
        Token::Procedure | Token::Proc | Token::Function | Token::Trigger
    )
}

/// Shape matchers, tried in order
const MATCHERS: &[fn(&[Token], &str, &dyn Dialect) -> Vec<TableEvent>] =
    &[match_create_table, match_drop_table, match_select_into];

fn match_statement(statement: &[Token], default_schema: &str, dialect: &dyn Dialect) -> Vec<TableEvent> {
    for matcher in MATCHERS {
        let events = matcher(statement, default_schema, dialect);
        if !events.is_empty() {
            return events;
        }
    }
    Vec::new()
}

/// `CREATE [OR REPLACE] [UNLOGGED] TABLE [IF NOT EXISTS] <id> ( ...`
/// `CREATE ... TABLE <id> [WITH (...)] AS ...`
fn match_create_table(stmt: &[Token], default_schema: &str, dialect: &dyn Dialect) -> Vec<TableEvent> {
    let mut cursor = Cursor::new(stmt);
    if !cursor.eat(&Token::Create) {
        return Vec::new();
    }
    if cursor.eat(&Token::Or) && !cursor.eat(&Token::Replace) {
        return Vec::new();
    }

    // Modifiers between CREATE and TABLE
    loop {
        match cursor.current() {
            Token::Temporary | Token::Temp | Token::Global | Token::Local => return Vec::new(),
            Token::Unlogged => cursor.advance(),
            _ => break,
        }
    }
    // VIEW, FUNCTION, PROCEDURE, INDEX, ... all fail here
    if !cursor.eat(&Token::Table) {
        return Vec::new();
    }
    if cursor.eat(&Token::If) && !(cursor.eat(&Token::Not) && cursor.eat(&Token::Exists)) {
        return Vec::new();
    }

    let table = match scan(cursor.rest(), dialect) {
        Scanned::Table(table, consumed) => {
            cursor.skip(consumed);
            table
        }
        Scanned::Temporary(_) | Scanned::Invalid => return Vec::new(),
    };

    match cursor.current() {
        Token::LParen | Token::As | Token::With => vec![TableEvent {
            action: TableAction::Created,
            table: table.with_default_schema(default_schema, dialect),
        }],
        _ => Vec::new(),
    }
}

/// `DROP TABLE [IF EXISTS] <id>[, <id> ...] [CASCADE | RESTRICT]`
fn match_drop_table(stmt: &[Token], _default_schema: &str, dialect: &dyn Dialect) -> Vec<TableEvent> {
    let mut cursor = Cursor::new(stmt);
    if !(cursor.eat(&Token::Drop) && cursor.eat(&Token::Table)) {
        return Vec::new();
    }
    if cursor.eat(&Token::If) && !cursor.eat(&Token::Exists) {
        return Vec::new();
    }

    let mut events = Vec::new();
    loop {
        match scan(cursor.rest(), dialect) {
            Scanned::Table(table, consumed) => {
                cursor.skip(consumed);
                events.push(TableEvent {
                    action: TableAction::Dropped,
                    table,
                });
            }
            Scanned::Temporary(consumed) => cursor.skip(consumed),
            // The rest of the list is unreadable
            Scanned::Invalid => break,
        }
        if !cursor.eat(&Token::Comma) {
            break;
        }
    }

    events
}

/// `SELECT ... INTO [UNLOGGED] [TABLE] <id> [FROM ...]`
fn match_select_into(stmt: &[Token], default_schema: &str, dialect: &dyn Dialect) -> Vec<TableEvent> {
    if !matches!(stmt.first(), Some(Token::Select) | Some(Token::With)) {
        return Vec::new();
    }

    // INTO must sit at depth zero before the first top-level FROM
    let mut depth: usize = 0;
    let mut into_at = None;
    for (i, token) in stmt.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::From if depth == 0 => break,
            Token::Into if depth == 0 => {
                into_at = Some(i);
                break;
            }
            _ => {}
        }
    }
    let Some(into_at) = into_at else {
        return Vec::new();
    };

    let mut cursor = Cursor::new(&stmt[into_at + 1..]);
    // A modifier only when a name follows; otherwise it is the name
    let is_modifier = dialect.select_into_modifiers()
        && !matches!(cursor.peek(), Token::Dot | Token::From | Token::Eof);
    match cursor.current() {
        Token::Temporary | Token::Temp if is_modifier => return Vec::new(),
        Token::Unlogged if is_modifier => cursor.advance(),
        _ => {}
    }
    cursor.eat(&Token::Table);

    let table = match scan(cursor.rest(), dialect) {
        Scanned::Table(table, consumed) => {
            cursor.skip(consumed);
            table
        }
        Scanned::Temporary(_) | Scanned::Invalid => return Vec::new(),
    };

    match cursor.current() {
        Token::From | Token::Eof => vec![TableEvent {
            action: TableAction::Created,
            table: table.with_default_schema(default_schema, dialect),
        }],
        _ => Vec::new(),
    }
}

/// Read position over one statement
struct Cursor<'t> {
    tokens: &'t [Token],
    position: usize,
}

impl<'t> Cursor<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    /// Token after the current one
    fn peek(&self) -> &Token {
        self.tokens.get(self.position + 1).unwrap_or(&Token::Eof)
    }

    fn rest(&self) -> &'t [Token] {
        &self.tokens[self.position.min(self.tokens.len())..]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn skip(&mut self, n: usize) {
        self.position = (self.position + n).min(self.tokens.len());
    }

    /// Consume the current token if it matches
    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume an unreserved word such as `ALTER`
    fn eat_word(&mut self, word: &str) -> bool {
        match self.current() {
            Token::Identifier(name) if name.eq_ignore_ascii_case(word) => {
                self.advance();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, SqlServer};

    fn pg(batch: &str) -> Classification {
        classify(batch, "public", &Postgres)
    }

    fn ms(batch: &str) -> Classification {
        classify(batch, "dbo", &SqlServer)
    }

    #[test]
    fn test_create_table() {
        let c = pg("CREATE TABLE s.t (id int)");
        assert_eq!(c.created_names(), vec!["s.t"]);
        assert!(c.dropped.is_empty());
    }

    #[test]
    fn test_create_variants() {
        assert_eq!(pg("create or replace table T (a int)").created_names(), vec!["public.t"]);
        assert_eq!(
            pg("CREATE TABLE IF NOT EXISTS s.t (a int)").created_names(),
            vec!["s.t"]
        );
        assert_eq!(
            pg("CREATE UNLOGGED TABLE s.t AS SELECT 1").created_names(),
            vec!["s.t"]
        );
    }

    #[test]
    fn test_drop_if_exists() {
        let c = pg("DROP TABLE IF EXISTS s.t;");
        assert_eq!(c.dropped_names(), vec!["s.t"]);
        assert!(c.created.is_empty());
    }

    #[test]
    fn test_drop_keeps_identifier_as_written() {
        let c = ms("DROP TABLE trips, [Stage].[Raw], #tmp, dbo.other CASCADE");
        assert_eq!(
            c.dropped_names(),
            vec!["[trips]", "[Stage].[Raw]", "[dbo].[other]"]
        );
    }

    #[test]
    fn test_temp_tables_are_skipped() {
        assert!(ms("CREATE TABLE #t (a int)").created.is_empty());
        assert!(ms("CREATE TABLE ##t (a int)").created.is_empty());
        assert!(ms("SELECT * INTO #t FROM dbo.src").created.is_empty());
        assert!(pg("CREATE TEMP TABLE t (a int)").created.is_empty());
        assert!(pg("CREATE TEMPORARY TABLE t (a int)").created.is_empty());
        assert!(pg("CREATE GLOBAL TEMPORARY TABLE t (a int)").created.is_empty());
        assert!(pg("SELECT * INTO TEMP t FROM src").created.is_empty());
    }

    #[test]
    fn test_non_table_objects_are_skipped() {
        let c = pg("CREATE VIEW s.v AS SELECT * FROM s.t");
        assert!(c.created.is_empty() && c.dropped.is_empty());
        assert!(pg("CREATE MATERIALIZED VIEW s.v AS SELECT 1").is_empty());
        assert!(pg("CREATE OR REPLACE FUNCTION s.f() RETURNS int AS $$ SELECT 1 $$ LANGUAGE sql").is_empty());
        assert!(ms("CREATE PROCEDURE dbo.p AS SELECT a INTO dbo.t FROM dbo.s").is_empty());
        assert!(ms("DROP VIEW dbo.v").is_empty());
    }

    #[test]
    fn test_routine_bodies_are_not_statements() {
        assert!(ms("CREATE PROCEDURE dbo.p AS BEGIN CREATE TABLE dbo.x (a int) END").is_empty());
        assert!(ms("CREATE PROCEDURE dbo.cleanup AS DROP TABLE dbo.keep").is_empty());
        assert!(ms("CREATE OR ALTER PROC dbo.p AS BEGIN SELECT 1; DROP TABLE dbo.keep; END").is_empty());
        assert!(ms("ALTER PROCEDURE dbo.p AS DROP TABLE dbo.keep").is_empty());
        assert!(ms("CREATE TRIGGER dbo.tr ON dbo.t AFTER INSERT AS CREATE TABLE dbo.y (a int)").is_empty());

        // A dollar-quoted body ends at the next semicolon
        let c = pg("CREATE FUNCTION f() RETURNS void AS $$ DROP TABLE keep; $$ LANGUAGE sql;\n\
                    CREATE TABLE after_fn (a int)");
        assert_eq!(c.created_names(), vec!["public.after_fn"]);
        assert!(c.dropped.is_empty());
    }

    #[test]
    fn test_select_into() {
        let c = ms("SELECT a, b INTO staging.trips FROM dbo.src WHERE a > 1");
        assert_eq!(c.created_names(), vec!["[staging].[trips]"]);

        let c = pg("SELECT 1 AS x INTO TABLE scratch");
        assert_eq!(c.created_names(), vec!["public.scratch"]);

        assert!(pg("INSERT INTO s.t SELECT * FROM s.u").is_empty());
        assert!(ms("SELECT * FROM (SELECT a INTO x FROM y) q").is_empty());
    }

    #[test]
    fn test_select_into_temp_named_tables() {
        let c = ms("SELECT * INTO temp.results FROM dbo.src");
        assert_eq!(c.created_names(), vec!["[temp].[results]"]);
        let c = ms("SELECT * INTO temp FROM dbo.src");
        assert_eq!(c.created_names(), vec!["[dbo].[temp]"]);
        let c = ms("SELECT * INTO unlogged FROM dbo.src");
        assert_eq!(c.created_names(), vec!["[dbo].[unlogged]"]);

        let c = pg("SELECT * INTO temp.results FROM src");
        assert_eq!(c.created_names(), vec!["temp.results"]);
        let c = pg("SELECT * INTO UNLOGGED TABLE big FROM src");
        assert_eq!(c.created_names(), vec!["public.big"]);
    }

    #[test]
    fn test_cross_database_create() {
        let c = ms("CREATE TABLE dotdevgissql01.RISCRASHDATA.dbo.test AS SELECT TOP 10 * FROM RISCRASHDATA.dbo.node");
        assert_eq!(
            c.created_names(),
            vec!["[dotdevgissql01].[riscrashdata].[dbo].[test]"]
        );
    }

    #[test]
    fn test_multi_statement_batch() {
        let c = pg("CREATE TABLE a (id int);\n\
                    CREATE TEMP TABLE b (id int);\n\
                    CREATE TABLE reports.c AS SELECT * FROM a;");
        assert_eq!(c.created_names(), vec!["public.a", "reports.c"]);
    }

    #[test]
    fn test_batches_without_semicolons() {
        let c = ms("CREATE TABLE a (id int) CREATE TABLE b (id int) DROP TABLE c");
        assert_eq!(c.created_names(), vec!["[dbo].[a]", "[dbo].[b]"]);
        assert_eq!(c.dropped_names(), vec!["[c]"]);
    }

    #[test]
    fn test_comments_are_ignored() {
        let c = pg("-- CREATE TABLE x (a int)\n/* DROP TABLE y; */ CREATE TABLE z (a int)");
        assert_eq!(c.created_names(), vec!["public.z"]);
        assert!(c.dropped.is_empty());
    }

    #[test]
    fn test_string_literals_are_not_statements() {
        let c = pg("INSERT INTO log VALUES ('CREATE TABLE nope (a int); DROP TABLE nope2')");
        assert!(c.is_empty());
    }

    #[test]
    fn test_duplicates_and_event_order() {
        let c = pg("CREATE TABLE t (a int); DROP TABLE t; CREATE TABLE public.t (a int)");
        assert_eq!(c.created_names(), vec!["public.t"]);
        assert_eq!(c.dropped_names(), vec!["t"]);
        let actions: Vec<TableAction> = c.events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![TableAction::Created, TableAction::Dropped, TableAction::Created]
        );
    }

    #[test]
    fn test_rendering_preserves_delimiters() {
        let bracketed = ms("CREATE TABLE [S].[T] (a int)");
        let bare = ms("CREATE TABLE s.t (a int)");
        assert_eq!(bracketed.created_names(), vec!["[S].[T]"]);
        assert_eq!(bare.created_names(), vec!["[s].[t]"]);
        assert_eq!(
            bracketed.created[0].ledger_key("dbo", &SqlServer),
            bare.created[0].ledger_key("dbo", &SqlServer)
        );
    }

    #[test]
    fn test_malformed_input_is_omitted() {
        assert!(pg("CREATE TABLE").is_empty());
        assert!(pg("CREATE TABLE (a int)").is_empty());
        assert!(pg("DROP TABLE IF s.t").is_empty());
        assert!(pg("CREATE TABLE a.b.c (x int)").is_empty());
        assert!(ms("CREATE TABLE \"unterminated (a int)").is_empty());
        assert!(pg(";;;").is_empty());
        assert!(pg("").is_empty());
    }
}

//! PostgreSQL family

use chrono::{NaiveDate, NaiveDateTime};

use super::{quote_literal, Dialect, DialectKind, LedgerTable, QuoteStyle};

/// Shared ledger table name, one per schema
pub const LEDGER_TABLE: &str = "__temp_log_table__";

const LOCK_GRAPH_QUERY: &str = "\
SELECT blocked_locks.pid::text AS blocked_session,
       blocked_activity.usename::text AS blocked_user,
       blocking_locks.pid::text AS blocking_session,
       blocking_activity.usename::text AS blocking_user,
       blocked_activity.query AS blocked_statement,
       blocking_activity.query AS blocking_statement
FROM pg_catalog.pg_locks AS blocked_locks
JOIN pg_catalog.pg_stat_activity AS blocked_activity
    ON blocked_activity.pid = blocked_locks.pid
JOIN pg_catalog.pg_locks AS blocking_locks
    ON blocking_locks.locktype = blocked_locks.locktype
    AND blocking_locks.database IS NOT DISTINCT FROM blocked_locks.database
    AND blocking_locks.relation IS NOT DISTINCT FROM blocked_locks.relation
    AND blocking_locks.page IS NOT DISTINCT FROM blocked_locks.page
    AND blocking_locks.tuple IS NOT DISTINCT FROM blocked_locks.tuple
    AND blocking_locks.virtualxid IS NOT DISTINCT FROM blocked_locks.virtualxid
    AND blocking_locks.transactionid IS NOT DISTINCT FROM blocked_locks.transactionid
    AND blocking_locks.classid IS NOT DISTINCT FROM blocked_locks.classid
    AND blocking_locks.objid IS NOT DISTINCT FROM blocked_locks.objid
    AND blocking_locks.objsubid IS NOT DISTINCT FROM blocked_locks.objsubid
    AND blocking_locks.pid != blocked_locks.pid
JOIN pg_catalog.pg_stat_activity AS blocking_activity
    ON blocking_activity.pid = blocking_locks.pid
WHERE NOT blocked_locks.granted
    AND blocking_locks.granted
    AND blocked_activity.usename = current_user";

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_style(&self) -> Option<QuoteStyle> {
        None
    }

    fn identifier_quotes(&self) -> &'static [QuoteStyle] {
        &[QuoteStyle::DoubleQuote]
    }

    fn identifier_max_segments(&self) -> usize {
        2
    }

    fn temp_table_sigils(&self) -> &'static [&'static str] {
        &[]
    }

    fn default_schema(&self) -> &'static str {
        "public"
    }

    fn quoted_identifiers_case_sensitive(&self) -> bool {
        true
    }

    fn dollar_quoting(&self) -> bool {
        true
    }

    fn select_into_modifiers(&self) -> bool {
        true
    }

    fn ledger_table(&self, schema: &str, _user: &str) -> LedgerTable {
        LedgerTable {
            schema: schema.to_string(),
            name: LEDGER_TABLE.to_string(),
            qualified: format!("{}.{}", self.quote_identifier(schema), LEDGER_TABLE),
        }
    }

    fn ledger_ddl(&self, ledger: &LedgerTable) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {0} (\
                tbl_id serial, \
                table_owner varchar, \
                table_schema varchar, \
                table_name varchar, \
                created_on timestamp, \
                expires date, \
                PRIMARY KEY (table_schema, table_name)\
            ); \
            GRANT SELECT ON {0} TO PUBLIC;",
            ledger.qualified
        )
    }

    fn upsert_statement(
        &self,
        ledger: &LedgerTable,
        owner: &str,
        table: &str,
        created_on: NaiveDateTime,
        expires: NaiveDate,
    ) -> String {
        format!(
            "INSERT INTO {} (table_owner, table_schema, table_name, created_on, expires) \
             VALUES ({}, {}, {}, {}, {}) \
             ON CONFLICT (table_schema, table_name) DO UPDATE SET \
             table_owner = EXCLUDED.table_owner, \
             created_on = EXCLUDED.created_on, \
             expires = EXCLUDED.expires",
            ledger.qualified,
            quote_literal(owner),
            quote_literal(&ledger.schema),
            quote_literal(table),
            quote_literal(&created_on.format("%Y-%m-%dT%H:%M:%S").to_string()),
            quote_literal(&expires.format("%Y-%m-%d").to_string()),
        )
    }

    fn delete_statement(&self, ledger: &LedgerTable, table: &str) -> String {
        format!(
            "DELETE FROM {} WHERE table_schema = {} AND table_name = {}",
            ledger.qualified,
            quote_literal(&ledger.schema),
            quote_literal(table)
        )
    }

    fn expired_query(&self, ledger: &LedgerTable, today: NaiveDate) -> String {
        format!(
            "SELECT table_schema, table_name FROM {} \
             WHERE table_schema = {} AND expires < {}::date \
             ORDER BY table_name",
            ledger.qualified,
            quote_literal(&ledger.schema),
            quote_literal(&today.format("%Y-%m-%d").to_string())
        )
    }

    fn entries_query(&self, ledger: &LedgerTable) -> String {
        format!(
            "SELECT table_owner, table_schema, table_name, created_on::text, expires::text \
             FROM {} WHERE table_schema = {} ORDER BY table_name",
            ledger.qualified,
            quote_literal(&ledger.schema)
        )
    }

    fn current_user_query(&self) -> &'static str {
        "SELECT current_user::text"
    }

    fn session_id_query(&self) -> &'static str {
        "SELECT pg_backend_pid()::text"
    }

    fn lock_graph_query(&self) -> &'static str {
        LOCK_GRAPH_QUERY
    }

    fn terminate_statement(&self, session_id: i64) -> String {
        format!("SELECT pg_terminate_backend({})", session_id)
    }

    fn is_session_gone(&self, message: &str) -> bool {
        // pg_terminate_backend only warns for unknown pids
        message.contains("is not a PostgreSQL server process")
            || message.contains("is not a PostgreSQL backend process")
    }
}

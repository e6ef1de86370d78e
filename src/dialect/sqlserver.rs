//! SQL Server (T-SQL) family

use chrono::{NaiveDate, NaiveDateTime};

use super::{quote_literal, Dialect, DialectKind, LedgerTable, QuoteStyle};

const LOCK_GRAPH_QUERY: &str = "\
SELECT CAST(waiting.request_session_id AS nvarchar(20)) AS blocked_session,
       CAST(waiting_session.login_name AS nvarchar(128)) AS blocked_user,
       CAST(holding.request_session_id AS nvarchar(20)) AS blocking_session,
       CAST(holding_session.login_name AS nvarchar(128)) AS blocking_user,
       CAST(waiting_text.text AS nvarchar(max)) AS blocked_statement,
       CAST(holding_text.text AS nvarchar(max)) AS blocking_statement
FROM sys.dm_tran_locks AS waiting
JOIN sys.dm_tran_locks AS holding
    ON holding.resource_type = waiting.resource_type
    AND holding.resource_database_id = waiting.resource_database_id
    AND holding.resource_associated_entity_id = waiting.resource_associated_entity_id
    AND holding.resource_description = waiting.resource_description
    AND holding.request_session_id <> waiting.request_session_id
    AND holding.request_status = 'GRANT'
JOIN sys.dm_exec_sessions AS waiting_session
    ON waiting_session.session_id = waiting.request_session_id
JOIN sys.dm_exec_sessions AS holding_session
    ON holding_session.session_id = holding.request_session_id
LEFT JOIN sys.dm_exec_connections AS waiting_conn
    ON waiting_conn.session_id = waiting.request_session_id
LEFT JOIN sys.dm_exec_connections AS holding_conn
    ON holding_conn.session_id = holding.request_session_id
OUTER APPLY sys.dm_exec_sql_text(waiting_conn.most_recent_sql_handle) AS waiting_text
OUTER APPLY sys.dm_exec_sql_text(holding_conn.most_recent_sql_handle) AS holding_text
WHERE waiting.request_status = 'WAIT'
    AND waiting_session.login_name = SYSTEM_USER";

/// SQL Server dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl SqlServer {
    /// Ledger table name for a login: `DOMAIN\jdoe` -> `__temp_log_table_jdoe__`
    pub fn ledger_table_name(user: &str) -> String {
        let login = user.rsplit('\\').next().unwrap_or(user);
        let sanitized: String = login
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        format!("__temp_log_table_{}__", sanitized)
    }
}

impl Dialect for SqlServer {
    fn kind(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    fn quote_style(&self) -> Option<QuoteStyle> {
        Some(QuoteStyle::Bracket)
    }

    fn identifier_quotes(&self) -> &'static [QuoteStyle] {
        &[QuoteStyle::Bracket, QuoteStyle::DoubleQuote]
    }

    fn identifier_max_segments(&self) -> usize {
        4
    }

    fn temp_table_sigils(&self) -> &'static [&'static str] {
        &["##", "#"]
    }

    fn default_schema(&self) -> &'static str {
        "dbo"
    }

    fn quoted_identifiers_case_sensitive(&self) -> bool {
        false
    }

    fn ledger_table(&self, schema: &str, user: &str) -> LedgerTable {
        let name = Self::ledger_table_name(user);
        LedgerTable {
            schema: schema.to_string(),
            qualified: format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&name)
            ),
            name,
        }
    }

    fn ledger_ddl(&self, ledger: &LedgerTable) -> String {
        format!(
            "IF OBJECT_ID({1}, N'U') IS NULL\n\
             BEGIN\n\
                 CREATE TABLE {0} (\
                     tbl_id int IDENTITY(1,1) PRIMARY KEY, \
                     table_owner varchar(255), \
                     table_schema varchar(255), \
                     table_name varchar(255), \
                     created_on datetime, \
                     expires date\
                 );\n\
                 GRANT SELECT ON {0} TO PUBLIC;\n\
             END",
            ledger.qualified,
            quote_literal(&ledger.qualified)
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
            "MERGE {} WITH (HOLDLOCK) AS target \
             USING (VALUES ({}, {}, {}, {}, {})) \
             AS source (table_owner, table_schema, table_name, created_on, expires) \
             ON target.table_schema = source.table_schema AND target.table_name = source.table_name \
             WHEN MATCHED THEN UPDATE SET \
             target.table_owner = source.table_owner, \
             target.created_on = source.created_on, \
             target.expires = source.expires \
             WHEN NOT MATCHED THEN \
             INSERT (table_owner, table_schema, table_name, created_on, expires) \
             VALUES (source.table_owner, source.table_schema, source.table_name, source.created_on, source.expires);",
            ledger.qualified,
            quote_literal(owner),
            quote_literal(&ledger.schema),
            quote_literal(table),
            quote_literal(&created_on.format("%Y-%m-%dT%H:%M:%S").to_string()),
            quote_literal(&expires.format("%Y%m%d").to_string()),
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
            "SELECT CAST(table_schema AS nvarchar(255)), CAST(table_name AS nvarchar(255)) FROM {} \
             WHERE table_schema = {} AND expires < CAST({} AS date) \
             ORDER BY table_name",
            ledger.qualified,
            quote_literal(&ledger.schema),
            quote_literal(&today.format("%Y%m%d").to_string())
        )
    }

    fn entries_query(&self, ledger: &LedgerTable) -> String {
        format!(
            "SELECT CAST(table_owner AS nvarchar(255)), CAST(table_schema AS nvarchar(255)), \
             CAST(table_name AS nvarchar(255)), CONVERT(nvarchar(30), created_on, 126), \
             CONVERT(nvarchar(10), expires, 23) \
             FROM {} WHERE table_schema = {} ORDER BY table_name",
            ledger.qualified,
            quote_literal(&ledger.schema)
        )
    }

    fn current_user_query(&self) -> &'static str {
        "SELECT CAST(SYSTEM_USER AS nvarchar(128))"
    }

    fn session_id_query(&self) -> &'static str {
        "SELECT CAST(@@SPID AS nvarchar(20))"
    }

    fn lock_graph_query(&self) -> &'static str {
        LOCK_GRAPH_QUERY
    }

    fn terminate_statement(&self, session_id: i64) -> String {
        format!("KILL {}", session_id)
    }

    fn is_session_gone(&self, message: &str) -> bool {
        message.contains("is not an active process ID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_table_per_user() {
        let ledger = SqlServer.ledger_table("dbo", "CORP\\j.doe");
        assert_eq!(ledger.name, "__temp_log_table_j_doe__");
        assert_eq!(ledger.qualified, "[dbo].[__temp_log_table_j_doe__]");
        assert_ne!(ledger, SqlServer.ledger_table("dbo", "someone_else"));
    }

    #[test]
    fn test_upsert_uses_merge() {
        let ledger = SqlServer.ledger_table("dbo", "jdoe");
        let created = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let expires = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        let sql = SqlServer.upsert_statement(&ledger, "jdoe", "trips", created, expires);

        assert!(sql.starts_with("MERGE [dbo].[__temp_log_table_jdoe__]"));
        assert!(sql.contains("'jdoe', 'dbo', 'trips', '2026-10-18T09:30:00', '20261025'"));
        assert!(sql.contains("WHEN MATCHED THEN UPDATE"));
        assert!(sql.contains("WHEN NOT MATCHED THEN"));
    }

    #[test]
    fn test_ddl_checks_object_id() {
        let ledger = SqlServer.ledger_table("dbo", "jdoe");
        let ddl = SqlServer.ledger_ddl(&ledger);
        assert!(ddl.starts_with("IF OBJECT_ID('[dbo].[__temp_log_table_jdoe__]', N'U') IS NULL"));
        assert!(ddl.contains("GRANT SELECT ON [dbo].[__temp_log_table_jdoe__] TO PUBLIC"));
    }

    #[test]
    fn test_terminate_and_gone_detection() {
        assert_eq!(SqlServer.terminate_statement(57), "KILL 57");
        assert!(SqlServer.is_session_gone("Process ID 57 is not an active process ID."));
        assert!(!SqlServer.is_session_gone("Only user processes can be killed."));
    }
}

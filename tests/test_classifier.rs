use tablekeeper::dialect::{DialectKind, Postgres, SqlServer};
use tablekeeper::sql::{classify, TableAction};

#[test]
fn test_cross_server_create_as_select() {
    let c = classify(
        "CREATE TABLE dotdevgissql01.RISCRASHDATA.dbo.test AS SELECT TOP 10 * FROM RISCRASHDATA.dbo.node",
        "dbo",
        &SqlServer,
    );
    assert_eq!(
        c.created_names(),
        vec!["[dotdevgissql01].[riscrashdata].[dbo].[test]"]
    );
    assert!(c.created[0].is_remote());
    assert!(c.dropped.is_empty());
}

#[test]
fn test_postgres_batch_with_temp_table() {
    let batch = "\
        CREATE TABLE crashes_2026 (id int, geom geometry);\n\
        CREATE TEMPORARY TABLE work AS SELECT * FROM crashes_2026;\n\
        CREATE UNLOGGED TABLE IF NOT EXISTS Reports.Summary AS SELECT count(*) FROM work;";
    let c = classify(batch, "public", &Postgres);
    assert_eq!(c.created_names(), vec!["public.crashes_2026", "reports.summary"]);
}

#[test]
fn test_sqlserver_script() {
    let batch = "\
        -- nightly rebuild\n\
        IF OBJECT_ID('dbo.Staging') IS NOT NULL DROP TABLE dbo.Staging;\n\
        SELECT * INTO dbo.Staging FROM dbo.Source\n\
        CREATE TABLE ##shared (id int)\n\
        DROP TABLE #work";
    let c = classify(batch, "dbo", &SqlServer);
    assert_eq!(c.created_names(), vec!["[dbo].[staging]"]);
    assert_eq!(c.dropped_names(), vec!["[dbo].[staging]"]);
    let actions: Vec<TableAction> = c.events.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![TableAction::Dropped, TableAction::Created]);
}

#[test]
fn test_default_dialect_schema() {
    for kind in [DialectKind::Postgres, DialectKind::SqlServer] {
        let dialect = kind.dialect();
        let c = classify("CREATE TABLE t (a int)", dialect.default_schema(), dialect);
        assert_eq!(c.created[0].schema_name(), Some(dialect.default_schema()));
    }
}

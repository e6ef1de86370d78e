//! tablekeeper - command line client

use std::env;

use anyhow::Context;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tablekeeper::dialect::DialectKind;
use tablekeeper::session::{ExecutionResult, Session, SessionConfig};
use tablekeeper::sql::classify;

/// Print help message
fn print_help() {
    println!(
        r#"
Usage: tablekeeper [options] <command>

Options:
  --config FILE         Load settings from a JSON file
  --url URL             postgres://... or sqlserver://...
  --dialect NAME        postgres | sqlserver (for offline classify)
  --schema NAME         Schema for unqualified table names
  --ttl DAYS            Days until registered tables expire
  --json                Print results as JSON

Commands:
  classify <sql>        Show tables a batch would create and drop
  exec <sql|@file>      Run a batch and register its tables
  register <table> [schema]
                        Register an existing table
  purge [schema]        Drop expired tables
  ledger [schema]       List registered tables
  blocking              Show sessions blocking you
  kill-blocks           Terminate sessions blocking you
  repl                  Interactive session; batches end with ';'

Environment:
  TABLEKEEPER_URL, TABLEKEEPER_SCHEMA, TABLEKEEPER_TTL_DAYS
  RUST_LOG              Log filter, e.g. tablekeeper=debug
"#
    );
}

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    config_file: Option<String>,
    url: Option<String>,
    dialect: Option<DialectKind>,
    schema: Option<String>,
    ttl_days: Option<u32>,
    json: bool,
    command: Vec<String>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .with_context(|| format!("missing value for {}", name))
            };
            match arg.as_str() {
                "--config" | "-c" => parsed.config_file = Some(value(arg.as_str())?),
                "--url" | "-u" => parsed.url = Some(value(arg.as_str())?),
                "--dialect" | "-d" => parsed.dialect = Some(DialectKind::from_name(&value(arg.as_str())?)?),
                "--schema" | "-s" => parsed.schema = Some(value(arg.as_str())?),
                "--ttl" => {
                    let ttl = value(arg.as_str())?;
                    parsed.ttl_days = Some(ttl.parse().with_context(|| format!("invalid --ttl '{}'", ttl))?);
                }
                "--json" => parsed.json = true,
                "--help" | "-h" => parsed.command = vec!["help".to_string()],
                _ => {
                    parsed.command.push(arg);
                    parsed.command.extend(args.by_ref());
                }
            }
        }

        Ok(parsed)
    }

    /// File, then environment, then flags
    fn config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.config_file {
            Some(path) => SessionConfig::from_json_file(path)
                .with_context(|| format!("failed to load config '{}'", path))?,
            None => SessionConfig::new(),
        };
        config = config.apply_env()?;

        if let Some(url) = &self.url {
            config = config.url(url.as_str())?;
        }
        if let Some(dialect) = self.dialect {
            config = config.dialect(dialect);
        }
        if let Some(schema) = &self.schema {
            config = config.default_schema(schema.as_str());
        }
        if let Some(ttl) = self.ttl_days {
            config = config.ttl_days(ttl);
        }
        Ok(config)
    }
}

/// Print a value as JSON or with its text renderer
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn print_execution(result: &ExecutionResult) {
    for table in &result.created {
        println!("created    {}", table);
    }
    for table in &result.dropped {
        println!("dropped    {}", table);
    }
    for table in &result.untracked {
        println!("untracked  {}", table);
    }
    println!(
        "{} registered, {} unregistered",
        result.registered, result.removed
    );
}

/// Batch text from an argument; `@path` reads a file
fn read_batch(arg: &str) -> anyhow::Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path)),
        None => Ok(arg.to_string()),
    }
}

async fn run_command(args: &Args, config: SessionConfig) -> anyhow::Result<()> {
    let (command, rest) = match args.command.split_first() {
        Some((command, rest)) => (command.as_str(), rest),
        None => {
            print_help();
            return Ok(());
        }
    };

    // Commands that need no connection
    match command {
        "help" => {
            print_help();
            return Ok(());
        }
        "classify" => {
            let batch = read_batch(&rest.join(" "))?;
            let classification = classify(&batch, &config.effective_schema(), config.dialect.dialect());
            return emit(args.json, &classification, |c| {
                for name in c.created_names() {
                    println!("created  {}", name);
                }
                for name in c.dropped_names() {
                    println!("dropped  {}", name);
                }
            });
        }
        _ => {}
    }

    if !SESSION_COMMANDS.contains(&command) {
        anyhow::bail!("unknown command '{}'; try --help", command);
    }
    let session = Session::open(config)
        .await
        .context("failed to open session")?;
    run_in_session(session, command, rest, args).await
}

/// Commands that run against a live session
const SESSION_COMMANDS: &[&str] = &["exec", "register", "purge", "ledger", "blocking", "kill-blocks", "repl"];

/// Run one command, then close the session whether or not the command
/// succeeded. A command error takes precedence over a close error.
async fn run_in_session(mut session: Session, command: &str, rest: &[String], args: &Args) -> anyhow::Result<()> {
    let outcome = run_session_command(&mut session, command, rest, args).await;
    let closed = session.close().await.context("failed to close session");
    outcome.and(closed)
}

async fn run_session_command(session: &mut Session, command: &str, rest: &[String], args: &Args) -> anyhow::Result<()> {
    let default_schema = session.config().effective_schema();
    let schema_arg = |idx: usize| rest.get(idx).cloned().unwrap_or_else(|| default_schema.clone());

    match command {
        "exec" => {
            let batch = read_batch(&rest.join(" "))?;
            let result = session.execute(&batch, None, args.ttl_days).await?;
            emit(args.json, &result, print_execution)
        }
        "register" => {
            let table = rest.first().context("usage: register <table> [schema]")?;
            let entry = session.register_table(&schema_arg(1), table, args.ttl_days).await?;
            emit(args.json, &entry, |e| {
                println!("registered {}.{} until {}", e.schema, e.table, e.expires)
            })
        }
        "purge" => {
            let report = session.purge_expired(&schema_arg(0)).await?;
            emit(args.json, &report, |r| {
                for table in &r.purged {
                    println!("dropped  {}", table);
                }
                for (table, reason) in &r.skipped {
                    println!("skipped  {}: {}", table, reason);
                }
            })
        }
        "ledger" => {
            let entries = session.ledger_entries(&schema_arg(0)).await?;
            emit(args.json, &entries, |entries| {
                if entries.is_empty() {
                    println!("No tables registered.");
                }
                for e in entries {
                    println!("{:<20} {}.{:<40} expires {}", e.owner, e.schema, e.table, e.expires);
                }
            })
        }
        "blocking" => {
            let edges = session.blocking_me().await?;
            emit(args.json, &edges, |edges| {
                if edges.is_empty() {
                    println!("Nothing is blocking you.");
                }
                for edge in edges {
                    println!(
                        "session {} ({}) blocked by {} ({})\n  waiting: {}\n  holding: {}",
                        edge.blocked_session,
                        edge.blocked_user,
                        edge.blocking_session,
                        edge.blocking_user,
                        edge.blocked_statement_text,
                        edge.blocking_statement_text
                    );
                }
            })
        }
        "kill-blocks" => {
            let killed = session.kill_blocks().await?;
            emit(args.json, &killed, |killed| {
                println!("terminated {} session(s)", killed.len());
                for id in killed {
                    println!("  {}", id);
                }
            })
        }
        "repl" => run_repl(session, args).await,
        other => Err(anyhow::anyhow!("unknown command '{}'; try --help", other)),
    }
}

/// Interactive loop; input is buffered until a line ends with ';'
async fn run_repl(session: &mut Session, args: &Args) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let mut buffer = String::new();

    println!(
        "Connected as {} ({}). Batches end with ';', '.quit' to exit.",
        session.user(),
        session.dialect().kind()
    );

    loop {
        let prompt = if buffer.is_empty() { "tablekeeper> " } else { "...> " };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if buffer.is_empty() {
            match trimmed {
                "" => continue,
                ".quit" | ".exit" => break,
                ".help" => {
                    print_help();
                    continue;
                }
                _ => {}
            }
        }

        buffer.push_str(&line);
        buffer.push('\n');
        if !trimmed.ends_with(';') {
            continue;
        }

        let batch = std::mem::take(&mut buffer);
        let _ = editor.add_history_entry(batch.trim());
        match session.execute(&batch, None, args.ttl_days).await {
            Ok(result) => emit(args.json, &result, print_execution)?,
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let result = async {
        let args = Args::parse(env::args().skip(1))?;
        let config = args.config()?;
        run_command(&args, config).await
    }
    .await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

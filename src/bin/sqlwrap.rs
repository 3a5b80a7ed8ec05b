//! Runs SQL statements through an instrumented connection.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use sqlwrap::interceptors::{QueryLogger, QueryRecord, TracingInterceptor};
use sqlwrap::logging::init_logging;
use sqlwrap::{Correlation, Cursor, QueryOutput, Registry, RegistryConfig, Value};

#[derive(Parser, Debug)]
#[command(
    name = "sqlwrap",
    version,
    about = "Run SQL through an instrumented connection and report every query"
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "Registry config file (TOML)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        short = 'c',
        value_name = "NAME",
        help = "Connection to use instead of the configured default"
    )]
    connection: Option<String>,

    #[arg(
        long,
        env = "SQLWRAP_LOG",
        default_value = "warn",
        help = "Log filter directive (e.g. info, sqlwrap=debug)"
    )]
    log_level: String,

    #[arg(
        long = "param",
        short = 'p',
        value_name = "VALUE",
        help = "Parameter for the last statement; with --batch, one comma-separated row per flag"
    )]
    params: Vec<String>,

    #[arg(long, help = "Run the last statement once per --param row")]
    batch: bool,

    #[arg(long, value_name = "MS", help = "Warn about statements slower than this")]
    slow_ms: Option<u64>,

    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Json,
        help = "Output format"
    )]
    format: OutputFormat,

    #[arg(required = true, value_name = "SQL", help = "Statements, executed in order")]
    statements: Vec<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a QueryOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    queries: &'a [QueryRecord],
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let mut config = RegistryConfig::load(cli.config.clone())?;
    if config.is_empty() {
        config = RegistryConfig::in_memory();
    }
    let registry = Registry::from_config(&config)?;
    let conn = registry.resolve(cli.connection.as_deref())?;

    let logger = QueryLogger::new();
    let mut tracer = TracingInterceptor::new();
    if let Some(ms) = cli.slow_ms {
        tracer = tracer.with_slow_threshold(Duration::from_millis(ms));
    }
    let _logging = conn.execute_wrapper(logger.clone());
    let _tracing = conn.execute_wrapper(tracer);

    let outcome = run_statements(conn.cursor(), &cli);
    let queries = logger.queries();
    let (result, error) = match &outcome {
        Ok(output) => (Some(output), None),
        Err(err) => (None, Some(err.to_string())),
    };
    match cli.format {
        OutputFormat::Json => {
            let report = Report {
                result,
                error,
                queries: &queries,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(result, &queries),
    }
    outcome.map(drop)
}

fn run_statements(cursor: Cursor<'_>, cli: &Cli) -> Result<QueryOutput, Box<dyn Error>> {
    let (last, leading) = cli
        .statements
        .split_last()
        .ok_or("no statement given")?;
    for sql in leading {
        cursor.execute_plain(sql.as_str())?;
    }
    let output = if cli.batch {
        let rows: Vec<Vec<Value>> = cli
            .params
            .iter()
            .map(|row| row.split(',').map(|raw| Value::parse_literal(raw.trim())).collect())
            .collect();
        cursor.executemany(last.as_str(), rows, Correlation::none())?
    } else {
        let values: Vec<Value> = cli.params.iter().map(|raw| Value::parse_literal(raw)).collect();
        cursor.execute(last.as_str(), values, Correlation::none())?
    };
    Ok(output)
}

fn print_text(output: Option<&QueryOutput>, queries: &[QueryRecord]) {
    if let Some(output) = output {
        if !output.columns.is_empty() {
            println!("{}", output.columns.join("\t"));
            for row in &output.rows {
                let cells: Vec<String> = row.iter().map(Value::to_string).collect();
                println!("{}", cells.join("\t"));
            }
        } else {
            println!("rows affected: {}", output.rows_affected);
        }
        println!();
    }
    for record in queries {
        println!(
            "[{:?}] {}us {}",
            record.status,
            record.duration.as_micros(),
            record.sql
        );
    }
}

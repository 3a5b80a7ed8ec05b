use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use sqlwrap::interceptors::{QueryLogger, QueryStatus, StatementBlocker};
use sqlwrap::{
    Connection, ConnectionSettings, Correlation, Error, Params, QueryBlocked, Registry,
    RegistryConfig, Result, SqliteExecutor, Value,
};
use tempfile::tempdir;

fn two_memory_connections() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.insert(Connection::new(
        "default",
        Arc::new(SqliteExecutor::open_in_memory()?),
    ));
    registry.insert(Connection::new(
        "analytics",
        Arc::new(SqliteExecutor::open_in_memory()?),
    ));
    registry.set_default(Some("default"))?;
    Ok(registry)
}

#[test]
fn resolve_unknown_name_fails() -> Result<()> {
    let mut registry = Registry::new();
    registry.insert(Connection::new(
        "default",
        Arc::new(SqliteExecutor::open_in_memory()?),
    ));
    registry.set_default(Some("default"))?;
    match registry.resolve(Some("replica")) {
        Err(Error::UnknownConnection(name)) => assert_eq!(name, "replica"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("replica should not resolve"),
    }
    Ok(())
}

#[test]
fn connections_do_not_share_interceptors() -> Result<()> {
    let registry = two_memory_connections()?;
    let main = registry.resolve(None)?;
    let analytics = registry.resolve(Some("analytics"))?;

    let logger = QueryLogger::new();
    let _scope = main.execute_wrapper(logger.clone());
    assert_eq!(main.interceptor_count(), 1);
    assert_eq!(analytics.interceptor_count(), 0);
    assert!(analytics.chain().is_empty());

    analytics.cursor().execute_plain("SELECT 1")?;
    assert!(logger.is_empty());
    main.cursor().execute_plain("SELECT 1")?;
    assert_eq!(logger.len(), 1);
    Ok(())
}

#[test]
fn logger_captures_a_real_workload() -> Result<()> {
    let registry = two_memory_connections()?;
    let conn = registry.resolve(None)?;
    let logger = QueryLogger::new();
    {
        let _scope = conn.execute_wrapper(logger.clone());
        let cursor = conn.cursor();
        cursor.execute_plain("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")?;
        let inserted = cursor.executemany(
            "INSERT INTO users (name) VALUES (?1)",
            vec![vec![Value::from("ada")], vec![Value::from("grace")]],
            Correlation::none(),
        )?;
        assert_eq!(inserted.rows_affected, 2);
        let rows = cursor.execute(
            "SELECT name FROM users WHERE id = ?1",
            vec![Value::from(2)],
            Correlation::none(),
        )?;
        assert_eq!(rows.columns, vec!["name"]);
        assert_eq!(rows.first_value(), Some(&Value::from("grace")));
        let failed = cursor.execute(
            "INSERT INTO users (name) VALUES (?1)",
            vec![Value::Null],
            Correlation::none(),
        );
        let failure = failed.unwrap_err();
        assert!(failure.downcast_ref::<rusqlite::Error>().is_some());
    }

    let records = logger.queries();
    assert_eq!(records.len(), 4);
    assert!(records[1].many);
    assert_eq!(
        records[1].params,
        Params::Batch(vec![vec![Value::from("ada")], vec![Value::from("grace")]])
    );
    assert_eq!(records[3].status, QueryStatus::Error);
    assert!(records[..3].iter().all(|r| r.status == QueryStatus::Ok));
    Ok(())
}

#[test]
fn blocker_keeps_database_untouched() -> Result<()> {
    let registry = two_memory_connections()?;
    let conn = registry.resolve(None)?;
    conn.cursor().execute_plain("CREATE TABLE t (v INTEGER)")?;
    {
        let _scope = conn.execute_wrapper(StatementBlocker::new());
        let err = conn.cursor().execute_plain("INSERT INTO t VALUES (1)").unwrap_err();
        assert!(err.is::<QueryBlocked>());
    }
    let count = conn.cursor().execute_plain("SELECT COUNT(*) FROM t")?;
    assert_eq!(count.first_value(), Some(&Value::Integer(0)));
    Ok(())
}

#[test]
fn registry_from_config_file() -> Result<()> {
    let dir = tempdir().map_err(|e| Error::InvalidArgument(e.to_string()))?;
    let db_path = dir.path().join("primary.db");
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "default = \"primary\"\n\n[connections.primary]\npath = {:?}\nbusy_timeout_ms = 100\n\n[connections.scratch]\npath = \":memory:\"\n",
            db_path.display().to_string()
        ),
    )
    .map_err(|e| Error::InvalidArgument(e.to_string()))?;

    let config = RegistryConfig::load(Some(config_path))?;
    let registry = Registry::from_config(&config)?;
    assert_eq!(registry.names(), vec!["primary", "scratch"]);

    let primary = registry.resolve(None)?;
    assert_eq!(primary.name(), "primary");
    primary.cursor().execute_plain("CREATE TABLE t (v INTEGER)")?;
    assert!(db_path.exists());
    Ok(())
}

#[test]
fn read_only_connection_rejects_writes() -> Result<()> {
    let dir = tempdir().map_err(|e| Error::InvalidArgument(e.to_string()))?;
    let path = dir.path().join("ro.db");
    {
        let writer = Connection::open_sqlite("writer", &ConnectionSettings::file(&path))?;
        writer.cursor().execute_plain("CREATE TABLE t (v INTEGER)")?;
    }
    let mut settings = ConnectionSettings::file(&path);
    settings.read_only = true;
    let reader = Connection::open_sqlite("reader", &settings)?;
    reader.cursor().execute_plain("SELECT * FROM t")?;
    let err = reader.cursor().execute_plain("INSERT INTO t VALUES (1)").unwrap_err();
    assert!(err.is::<rusqlite::Error>());
    Ok(())
}

#[test]
fn one_connection_per_thread_keeps_scopes_independent() -> Result<()> {
    const THREADS: usize = 4;
    let mut registry = Registry::new();
    for idx in 0..THREADS {
        registry.insert(Connection::new(
            format!("worker-{idx}"),
            Arc::new(SqliteExecutor::open_in_memory()?),
        ));
    }
    let registry = Arc::new(registry);
    let barrier = Arc::new(Barrier::new(THREADS));
    let mut handles = Vec::new();
    for idx in 0..THREADS {
        let registry = Arc::clone(&registry);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<usize> {
            let conn = registry.resolve(Some(format!("worker-{idx}").as_str()))?;
            let logger = QueryLogger::new();
            barrier.wait();
            let _scope = conn.execute_wrapper(logger.clone());
            for _ in 0..=idx {
                conn.cursor().execute_plain("SELECT 1")?;
            }
            Ok(logger.len())
        }));
    }
    for (idx, handle) in handles.into_iter().enumerate() {
        let seen = handle.join().expect("worker panicked")?;
        assert_eq!(seen, idx + 1);
    }
    Ok(())
}

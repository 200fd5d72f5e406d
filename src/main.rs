//! mariadb-pool - command line entry point.
//!
//! Opens the pools described by a configuration file and runs statements,
//! escapes strings or reports pool health. All database calls block, so
//! `main` is a plain function; the driver runtime lives inside the service.

use clap::Parser;
use mariadb_pool::{DbError, DbService};
use mariadb_pool::config::{Command, Config};
use mariadb_pool::db::ProfileEntry;
use mariadb_pool::models::QueryOutcome;
use mariadb_pool::tools::{OutputFormat, format_outcome};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries command output.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    info!(
        config = %config.config.display(),
        "Starting mariadb-pool v{}",
        env!("CARGO_PKG_VERSION")
    );

    let plugin_config = config.plugin_config()?;
    let service = DbService::start(&plugin_config, config.runtime_threads)?;

    let result = match &config.command {
        Command::Query {
            profile,
            format,
            sql,
        } => run_query(&service, profile.as_deref(), *format, sql),
        Command::Escape { profile, input } => run_escape(&service, profile.as_deref(), input),
        Command::Run {
            profile,
            threads,
            format,
            file,
        } => run_file(&service, profile.as_deref(), *threads, *format, file),
        Command::Check => run_check(&service),
    };

    service.shutdown();

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}

type CommandResult = Result<bool, Box<dyn std::error::Error>>;

/// Run one statement. Returns whether it succeeded.
fn run_query(
    service: &DbService,
    profile: Option<&str>,
    format: OutputFormat,
    sql: &str,
) -> CommandResult {
    let start = Instant::now();
    let outcome = service
        .query_handler()
        .query_profile(profile, sql.as_bytes())?;
    print!("{}", format_outcome(&outcome, format, start.elapsed()));
    Ok(outcome.is_success())
}

fn run_escape(service: &DbService, profile: Option<&str>, input: &str) -> CommandResult {
    let escaped = service
        .escape_handler()
        .escape_profile(profile, input.as_bytes())?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&escaped)?;
    stdout.write_all(b"\n")?;
    Ok(true)
}

/// Statements of a file: one per line, blank lines and `--`/`#` comments skipped.
fn read_statements(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Join every worker and flatten their results in worker order. A panicked
/// worker fails the whole run; the statements it had taken are lost.
fn join_workers<T>(
    workers: Vec<std::thread::ScopedJoinHandle<'_, Vec<Result<T, DbError>>>>,
) -> Result<Vec<T>, DbError> {
    let mut done = Vec::new();
    let mut panicked = None;
    // Join all of them even after a panic; the scope re-panics otherwise.
    for (worker_id, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(results) => done.extend(results),
            Err(_) => {
                error!(worker = worker_id, "Worker thread panicked");
                panicked = panicked.or(Some(worker_id));
            }
        }
    }
    if let Some(worker_id) = panicked {
        return Err(DbError::runtime(format!(
            "worker {} panicked, its statements were lost",
            worker_id
        )));
    }
    done.into_iter().collect()
}

/// Run every statement of a file on `threads` worker threads.
fn run_file(
    service: &DbService,
    profile: Option<&str>,
    threads: usize,
    format: OutputFormat,
    file: &Path,
) -> CommandResult {
    let statements = read_statements(file)?;
    let entry = service.registry().resolve(profile)?;
    let handler = service.query_handler();
    let next = AtomicUsize::new(0);
    let threads = threads.clamp(1, statements.len().max(1));

    info!(
        profile = %entry.name(),
        statements = statements.len(),
        threads = threads,
        "Running statements"
    );

    let start = Instant::now();
    let mut results: Vec<(usize, Duration, QueryOutcome)> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(sql) = statements.get(index) else {
                            break;
                        };
                        let began = Instant::now();
                        match handler.query_entry(entry, sql.as_bytes()) {
                            Ok(outcome) => done.push(Ok((index, began.elapsed(), outcome))),
                            Err(e) => done.push(Err(e)),
                        }
                    }
                    done
                })
            })
            .collect();

        join_workers(workers)
    })?;
    let elapsed = start.elapsed();

    results.sort_by_key(|(index, _, _)| *index);
    let failures = results.iter().filter(|(_, _, o)| !o.is_success()).count();
    for (_, took, outcome) in &results {
        print!("{}", format_outcome(outcome, format, *took));
    }

    let report = PoolReport::from_entry(entry);
    eprintln!(
        "{} statements, {} failed, {:.2} sec",
        results.len(),
        failures,
        elapsed.as_secs_f64()
    );
    eprintln!("{}", serde_json::to_string(&report)?);
    Ok(failures == 0)
}

#[derive(Debug, Serialize)]
struct PoolReport<'a> {
    profile: &'a str,
    size: usize,
    idle: usize,
    checked_out: usize,
    stats: mariadb_pool::db::PoolStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    alive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> PoolReport<'a> {
    fn from_entry(entry: &'a ProfileEntry) -> Self {
        let pool = entry.pool();
        let (idle, checked_out) = pool.counts();
        Self {
            profile: entry.name(),
            size: pool.size(),
            idle,
            checked_out,
            stats: pool.stats(),
            alive: None,
            server_version: None,
            error: None,
        }
    }
}

/// Borrow one connection from every pool and report its state.
fn run_check(service: &DbService) -> CommandResult {
    let mut healthy = true;
    for entry in service.registry().entries() {
        let (alive, server_version, error) = {
            let conn = entry.pool().checkout()?;
            let alive = conn.is_alive();
            let error = conn.error_state().is_error().then(|| conn.error_state().to_string());
            (alive, conn.server_version(), error)
        };
        healthy &= alive;

        let mut report = PoolReport::from_entry(entry);
        report.alive = Some(alive);
        report.server_version = server_version;
        report.error = error;
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_workers_keeps_order() {
        let joined = std::thread::scope(|scope| {
            let workers = vec![
                scope.spawn(|| vec![Ok(1), Ok(2)]),
                scope.spawn(|| vec![Ok(3)]),
            ];
            join_workers(workers)
        });
        assert_eq!(joined.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_join_workers_fails_on_panic() {
        let joined = std::thread::scope(|scope| {
            let workers = vec![
                scope.spawn(|| -> Vec<Result<i32, DbError>> { panic!("worker died") }),
                scope.spawn(|| vec![Ok(1)]),
            ];
            join_workers(workers)
        });
        let err = joined.unwrap_err();
        assert!(err.to_string().contains("worker 0 panicked"));
    }
}

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use serde_json::Value;

use crate::errors::BenchError;
use crate::types::{Sample, Staleness, TransactionMode};

/// Everything a client needs to run one trial.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub statements: &'a [String],
    pub optimizer: &'a str,
    pub mode: TransactionMode,
    pub staleness: Option<Staleness>,
}

impl Query<'_> {
    /// Staleness in milliseconds, only meaningful for read-only
    /// transactions.
    pub fn staleness_ms(&self) -> Option<u128> {
        match self.mode {
            TransactionMode::ReadOnly => self.staleness.map(|s| s.duration().as_millis()),
            TransactionMode::ReadWrite => None,
        }
    }
}

/// Database client boundary. One call is one trial.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: &Query<'_>) -> Result<Sample>;
}

/// Runs an external client program once per statement.
///
/// Arguments may contain `{sql}`, `{optimizer}`, `{mode}` and
/// `{staleness_ms}`; the same values are exported as `QUERYBENCH_*`
/// environment variables. A JSON object printed on stdout is read as
/// query statistics.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandExecutor {
            program: program.into(),
            args,
        }
    }

    fn run_statement(&self, statement: &str, query: &Query<'_>) -> Result<QueryStats> {
        let staleness = query
            .staleness_ms()
            .map(|ms| ms.to_string())
            .unwrap_or_default();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                arg.replace("{sql}", statement)
                    .replace("{optimizer}", query.optimizer)
                    .replace("{mode}", query.mode.as_str())
                    .replace("{staleness_ms}", &staleness)
            })
            .collect();

        let output = Command::new(&self.program)
            .args(&args)
            .env("QUERYBENCH_SQL", statement)
            .env("QUERYBENCH_OPTIMIZER", query.optimizer)
            .env("QUERYBENCH_MODE", query.mode.as_str())
            .env("QUERYBENCH_STALENESS_MS", &staleness)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BenchError::ExecutorSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("client exited with {}: {}", output.status, stderr.trim());
        }

        Ok(serde_json::from_slice::<Value>(&output.stdout)
            .map(|v| QueryStats::from_json(&v))
            .unwrap_or_default())
    }
}

impl QueryExecutor for CommandExecutor {
    fn execute(&self, query: &Query<'_>) -> Result<Sample> {
        let start = Instant::now();
        let mut stats = QueryStats::default();
        for statement in query.statements {
            stats.add(self.run_statement(statement, query)?);
        }
        Ok(stats.into_sample(start.elapsed()))
    }
}

/// Server-reported statistics for one or more statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub cpu_time: Option<Duration>,
    pub plan_time: Option<Duration>,
    pub rows_scanned: Option<u64>,
    pub rows_returned: Option<u64>,
}

impl QueryStats {
    /// Reads the known keys of a stats object. Anything else, including
    /// non-object values, is ignored.
    pub fn from_json(value: &Value) -> Self {
        let get = |key: &str| value.as_object().and_then(|o| o.get(key));
        QueryStats {
            cpu_time: get("cpu_time").and_then(parse_millis),
            plan_time: get("query_plan_creation_time").and_then(parse_millis),
            rows_scanned: get("rows_scanned").and_then(parse_count),
            rows_returned: get("rows_returned").and_then(parse_count),
        }
    }

    /// Sums per-statement stats into a per-trial total.
    pub fn add(&mut self, other: QueryStats) {
        self.cpu_time = add_opt(self.cpu_time, other.cpu_time);
        self.plan_time = add_opt(self.plan_time, other.plan_time);
        self.rows_scanned = add_opt(self.rows_scanned, other.rows_scanned);
        self.rows_returned = add_opt(self.rows_returned, other.rows_returned);
    }

    pub fn into_sample(self, elapsed: Duration) -> Sample {
        Sample {
            elapsed,
            cpu_time: self.cpu_time,
            plan_time: self.plan_time,
            rows_scanned: self.rows_scanned,
            rows_returned: self.rows_returned,
        }
    }
}

fn add_opt<T: std::ops::Add<Output = T>>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Parses `"1.52 msecs"` style values; the leading number is milliseconds.
pub fn parse_millis(value: &Value) -> Option<Duration> {
    let ms = match value {
        Value::String(s) => s.split_whitespace().next()?.parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

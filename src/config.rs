use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::BenchError;
use crate::types::{
    BenchmarkDefinition, DEFAULT_TRIALS, ReportMode, Staleness, TransactionMode, split_statements,
};

pub const DEFAULT_CONFIG_FILE: &str = "benchmark.toml";

/// On-disk layout of the config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    database: String,
    trials: Option<usize>,
    report: Option<ReportMode>,
    workers: Option<usize>,
    executor: ExecutorConfig,
    #[serde(default)]
    benchmarks: Vec<BenchmarkEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BenchmarkEntry {
    name: String,
    sql: String,
    trials: Option<usize>,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    optimizers: Vec<String>,
    max_staleness_ms: Option<u64>,
    exact_staleness_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub trials: Option<usize>,
    pub report: Option<ReportMode>,
    pub workers: Option<usize>,
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database identifier, shown in reports only.
    pub database: String,
    pub report: ReportMode,
    pub workers: usize,
    pub executor: ExecutorConfig,
    pub benchmarks: Vec<BenchmarkDefinition>,
}

impl Config {
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self, BenchError> {
        let text = std::fs::read_to_string(path).map_err(|source| BenchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path, overrides)
    }

    pub fn from_toml_str(text: &str, overrides: &Overrides) -> Result<Self, BenchError> {
        Self::parse(text, Path::new("<string>"), overrides)
    }

    fn parse(text: &str, path: &Path, overrides: &Overrides) -> Result<Self, BenchError> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| BenchError::ConfigParse {
            path: PathBuf::from(path),
            detail: e.message().to_string(),
        })?;

        if file.executor.program.trim().is_empty() {
            return Err(invalid("executor.program must not be empty"));
        }
        if file.benchmarks.is_empty() {
            return Err(invalid("no benchmarks defined"));
        }

        let workers = overrides.workers.or(file.workers).unwrap_or(1);
        if workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }

        let default_trials = file.trials.unwrap_or(DEFAULT_TRIALS);
        let benchmarks = file
            .benchmarks
            .into_iter()
            .map(|entry| resolve_benchmark(entry, overrides.trials, default_trials))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            database: file.database,
            report: overrides.report.or(file.report).unwrap_or_default(),
            workers,
            executor: file.executor,
            benchmarks,
        })
    }
}

fn resolve_benchmark(
    entry: BenchmarkEntry,
    trials_override: Option<usize>,
    default_trials: usize,
) -> Result<BenchmarkDefinition, BenchError> {
    let name = entry.name.trim().to_string();
    if name.is_empty() {
        return Err(invalid("benchmark name must not be empty"));
    }

    let trials = trials_override.or(entry.trials).unwrap_or(default_trials);
    if trials == 0 {
        return Err(invalid(format!("benchmark '{}': trials must be at least 1", name)));
    }

    if split_statements(&entry.sql).is_empty() {
        return Err(invalid(format!("benchmark '{}': sql has no statements", name)));
    }

    let staleness = match (entry.max_staleness_ms, entry.exact_staleness_ms) {
        (Some(_), Some(_)) => {
            return Err(invalid(format!(
                "benchmark '{}': max_staleness_ms and exact_staleness_ms are mutually exclusive",
                name
            )));
        }
        (Some(ms), None) => Some(Staleness::Max(Duration::from_millis(ms))),
        (None, Some(ms)) => Some(Staleness::Exact(Duration::from_millis(ms))),
        (None, None) => None,
    };

    let optimizers = if entry.optimizers.is_empty() {
        vec![String::new()]
    } else {
        entry.optimizers
    };

    Ok(BenchmarkDefinition {
        name,
        sql: entry.sql,
        trials,
        mode: TransactionMode::from_read_only(entry.read_only),
        optimizers,
        staleness,
    })
}

fn invalid(detail: impl Into<String>) -> BenchError {
    BenchError::InvalidConfig {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
database = "projects/p/instances/i/databases/d"
trials = 30
report = "histogram"
workers = 2

[executor]
program = "client"
args = ["-e", "{sql}"]

[[benchmarks]]
name = "likes"
sql = "SELECT * FROM likes LIMIT 10"
read_only = true
optimizers = ["1", "2"]
max_staleness_ms = 500

[[benchmarks]]
name = "update"
sql = "UPDATE t SET a = 1 WHERE id = 1; SELECT a FROM t"
trials = 5
"#;

    fn parse(text: &str) -> Result<Config, BenchError> {
        Config::from_toml_str(text, &Overrides::default())
    }

    #[test]
    fn parses_full_config() {
        let config = parse(FULL).unwrap();
        assert_eq!(config.database, "projects/p/instances/i/databases/d");
        assert_eq!(config.report, ReportMode::Histogram);
        assert_eq!(config.workers, 2);
        assert_eq!(config.executor.program, "client");
        assert_eq!(config.benchmarks.len(), 2);

        let likes = &config.benchmarks[0];
        assert_eq!(likes.trials, 30);
        assert_eq!(likes.mode, TransactionMode::ReadOnly);
        assert_eq!(likes.optimizers, vec!["1", "2"]);
        assert_eq!(likes.staleness, Some(Staleness::Max(Duration::from_millis(500))));

        let update = &config.benchmarks[1];
        assert_eq!(update.trials, 5);
        assert_eq!(update.mode, TransactionMode::ReadWrite);
        assert_eq!(update.optimizers, vec![""]);
        assert_eq!(update.statements().len(), 2);
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = parse(
            r#"
[executor]
program = "client"

[[benchmarks]]
name = "q"
sql = "SELECT 1"
"#,
        )
        .unwrap();
        assert_eq!(config.report, ReportMode::Median);
        assert_eq!(config.workers, 1);
        assert_eq!(config.benchmarks[0].trials, DEFAULT_TRIALS);
        assert!(config.executor.args.is_empty());
    }

    #[test]
    fn overrides_take_precedence() {
        let overrides = Overrides {
            trials: Some(3),
            report: Some(ReportMode::Median),
            workers: Some(4),
        };
        let config = Config::from_toml_str(FULL, &overrides).unwrap();
        assert_eq!(config.report, ReportMode::Median);
        assert_eq!(config.workers, 4);
        assert!(config.benchmarks.iter().all(|b| b.trials == 3));
    }

    #[test]
    fn zero_trials_rejected() {
        let err = Config::from_toml_str(
            FULL,
            &Overrides {
                trials: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("trials must be at least 1"));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = Config::from_toml_str(
            FULL,
            &Overrides {
                workers: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::InvalidConfig { .. }));
    }

    #[test]
    fn conflicting_staleness_rejected() {
        let err = parse(
            r#"
[executor]
program = "client"

[[benchmarks]]
name = "q"
sql = "SELECT 1"
max_staleness_ms = 1
exact_staleness_ms = 2
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn exact_staleness() {
        let config = parse(
            r#"
[executor]
program = "client"

[[benchmarks]]
name = "q"
sql = "SELECT 1"
read_only = true
exact_staleness_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(
            config.benchmarks[0].staleness,
            Some(Staleness::Exact(Duration::from_millis(250)))
        );
    }

    #[test]
    fn missing_benchmarks_rejected() {
        let err = parse("[executor]\nprogram = \"client\"\n").unwrap_err();
        assert!(err.to_string().contains("no benchmarks defined"));
    }

    #[test]
    fn blank_name_and_sql_rejected() {
        let blank_name = parse(
            "[executor]\nprogram = \"c\"\n[[benchmarks]]\nname = \" \"\nsql = \"SELECT 1\"\n",
        )
        .unwrap_err();
        assert!(blank_name.to_string().contains("name must not be empty"));

        let blank_sql =
            parse("[executor]\nprogram = \"c\"\n[[benchmarks]]\nname = \"q\"\nsql = \" ; \"\n")
                .unwrap_err();
        assert!(blank_sql.to_string().contains("no statements"));
    }

    #[test]
    fn empty_program_rejected() {
        let err = parse("[executor]\nprogram = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("executor.program"));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = parse(
            "[executor]\nprogram = \"c\"\n[[benchmarks]]\nname = \"q\"\nsql = \"SELECT 1\"\nquery = \"x\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, BenchError::ConfigParse { .. }));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = Config::load(file.path(), &Overrides::default()).unwrap();
        assert_eq!(config.benchmarks[0].name, "likes");
    }

    #[test]
    fn load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/benchmark.toml"), &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, BenchError::ConfigRead { .. }));
    }
}

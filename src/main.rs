use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use querybench::config::{Config, DEFAULT_CONFIG_FILE, Overrides};
use querybench::errors::BenchError;
use querybench::executor::CommandExecutor;
use querybench::orchestrator::Orchestrator;
use querybench::report;
use querybench::types::ReportMode;

#[derive(Parser)]
#[command(name = "querybench", version, about = "Measure query latency against a transactional database")]
struct Cli {
    /// Config file to read benchmarks from
    #[arg(short = 'f', long = "file", default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// Successful trials per benchmark (overrides the config file)
    #[arg(short = 'n', long)]
    trials: Option<usize>,

    /// Summary to print for each benchmark
    #[arg(long)]
    report: Option<ReportMode>,

    /// Worker threads per benchmark, each reporting independently
    #[arg(short = 'c', long)]
    workers: Option<usize>,

    #[arg(long)]
    json: bool,

    /// Log failed trials and runner progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let overrides = Overrides {
        trials: cli.trials,
        report: cli.report,
        workers: cli.workers,
    };
    let config = Config::load(&cli.file, &overrides)?;
    let executor = CommandExecutor::new(&config.executor.program, config.executor.args.clone());
    let orchestrator = Orchestrator::new(&config, &executor);

    if cli.json {
        let started_at = Utc::now();
        let reports = orchestrator.run(&mut io::sink())?;
        println!(
            "{}",
            report::format_json(&config.database, config.report, &reports, started_at)
        );
    } else {
        orchestrator.run(&mut io::stdout().lock())?;
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(&cli) {
        eprintln!("{}", err);
        let code = match err.downcast_ref::<BenchError>() {
            Some(e) if e.is_budget_exceeded() => 2,
            _ => 1,
        };
        process::exit(code);
    }
}

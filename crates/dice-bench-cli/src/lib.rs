//! `dbench`: run Dice over a benchmark directory, accumulate results, and
//! render LaTeX tables and cactus plots from them.

#![forbid(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use dice_bench_core::{
    ExperimentPlan, ExperimentRunner, HarnessConfig, MetricKind, Mode, ProcessInvoker, ResultsStore,
    TimingSource, UnparsablePolicy, discover_benchmarks,
};
use dice_bench_report::{ReportError, render_cactus, render_tables};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] dice_bench_core::Error),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    RuntimeError = 1,
    UsageError = 2,
}

impl ExitCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dbench",
    version,
    about = "Benchmark the Dice compiler across optimization modes"
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .multiple(true)
        .args(["dir", "table", "plot"])
))]
pub struct Cli {
    /// Directory of `.dice` benchmarks to run
    #[arg(short = 'i', long = "dir", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Path of the Dice executable [env: DICE_BENCH_TOOL] [default: ./dice]
    #[arg(short = 'd', long = "dice", value_name = "PATH")]
    pub dice: Option<PathBuf>,

    /// Results file [env: DICE_BENCH_RESULTS] [default: results.json]
    #[arg(short = 'o', long = "out", value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Per-invocation timeout in seconds [env: DICE_BENCH_TIMEOUT]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Measure elapsed time
    #[arg(short = 't', long)]
    pub time: bool,

    /// Measure final compiled BDD size
    #[arg(short = 's', long)]
    pub size: bool,

    /// Count recursive calls
    #[arg(short = 'c', long)]
    pub calls: bool,

    /// Count flips
    #[arg(short = 'f', long)]
    pub flips: bool,

    /// Count parameters
    #[arg(short = 'p', long)]
    pub params: bool,

    /// Count distinct parameters
    #[arg(short = 'q', long = "distinct-params")]
    pub distinct_params: bool,

    /// Metrics to measure by name, alongside the flags above (time size
    /// calls flips params distinct-params)
    #[arg(long, num_args = 1.., value_name = "METRIC", value_parser = parse_metric)]
    pub metrics: Vec<MetricKind>,

    /// Modes to run (NOOPT DET FH SBK SBKFH EA EAFH EASBK EASBKFH); tables
    /// and plots default to all
    #[arg(long, num_args = 1.., value_name = "MODE", value_parser = parse_mode)]
    pub modes: Vec<Mode>,

    /// Print LaTeX tables of the accumulated results
    #[arg(long)]
    pub table: bool,

    /// Write a cactus plot of the accumulated times
    #[arg(long)]
    pub plot: bool,

    /// Cactus plot file [env: DICE_BENCH_PLOT_OUT] [default: cactus_plot.svg]
    #[arg(long = "plot-out", value_name = "PATH")]
    pub plot_out: Option<PathBuf>,

    /// Take times from a `time -f %e`-style utility [env: DICE_BENCH_TIME_UTILITY]
    #[arg(long = "time-utility", value_name = "PATH")]
    pub time_utility: Option<PathBuf>,

    /// Treatment of unparsable metric values: failure or absent [env: DICE_BENCH_UNPARSABLE]
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub unparsable: Option<UnparsablePolicy>,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Metrics selected by flag or by `--metrics`, deduplicated, in metric
    /// order.
    #[must_use]
    pub fn selected_metrics(&self) -> Vec<MetricKind> {
        let mut selected: Vec<MetricKind> = [
            (self.time, MetricKind::Time),
            (self.size, MetricKind::Size),
            (self.calls, MetricKind::Calls),
            (self.flips, MetricKind::Flips),
            (self.params, MetricKind::Params),
            (self.distinct_params, MetricKind::DistinctParams),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .chain(self.metrics.iter().copied())
        .collect();
        selected.sort();
        selected.dedup();
        selected
    }

    /// Applies command-line overrides on top of `config`.
    #[must_use]
    pub fn apply(&self, mut config: HarnessConfig) -> HarnessConfig {
        if let Some(dice) = &self.dice {
            config.tool.clone_from(dice);
        }
        if let Some(out) = &self.out {
            config.results_path.clone_from(out);
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = Some(timeout);
        }
        if let Some(plot_out) = &self.plot_out {
            config.plot_path.clone_from(plot_out);
        }
        if let Some(path) = &self.time_utility {
            config.timing = TimingSource::TimeUtility { path: path.clone() };
        }
        if let Some(policy) = self.unparsable {
            config.unparsable = policy;
        }
        config
    }
}

fn parse_mode(value: &str) -> Result<Mode, String> {
    value.parse().map_err(|e: dice_bench_core::Error| e.to_string())
}

fn parse_metric(value: &str) -> Result<MetricKind, String> {
    value.parse().map_err(|e: dice_bench_core::Error| e.to_string())
}

fn parse_policy(value: &str) -> Result<UnparsablePolicy, String> {
    value.parse().map_err(|e: dice_bench_core::Error| e.to_string())
}

pub fn run() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match execute(&cli) {
        Ok(()) => ExitCode::Success.code(),
        Err(err) => {
            tracing::error!("{err}");
            err_exit_code(&err).code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // stdout carries LaTeX output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Configuration and missing-data errors are usage errors; everything else
/// is a runtime error.
#[must_use]
pub const fn err_exit_code(err: &CliError) -> ExitCode {
    match err {
        CliError::Core(e) if e.is_configuration() => ExitCode::UsageError,
        CliError::Report(e) if e.is_precondition() => ExitCode::UsageError,
        _ => ExitCode::RuntimeError,
    }
}

pub fn execute(cli: &Cli) -> CliResult<()> {
    let config = cli.apply(HarnessConfig::from_env());
    let mut store = ResultsStore::load(&config.results_path)?;

    if let Some(dir) = &cli.dir {
        store = run_experiments(cli, &config, dir, store)?;
    }

    if cli.table {
        let tex = render_tables(&store, &cli.modes)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{tex}")?;
        stdout.flush()?;
    }

    if cli.plot {
        render_cactus(&store, &cli.modes, &config.plot_path)?;
    }

    Ok(())
}

/// Validates the selection, runs every benchmark in `dir`, and persists the
/// merged store. Nothing is spawned unless validation passes.
fn run_experiments(
    cli: &Cli,
    config: &HarnessConfig,
    dir: &std::path::Path,
    store: ResultsStore,
) -> CliResult<ResultsStore> {
    let files = discover_benchmarks(dir)?;
    let plan = ExperimentPlan::from_config(config, &cli.modes, &cli.selected_metrics())?;
    if !plan.tool.is_file() {
        return Err(dice_bench_core::Error::ToolNotFound(plan.tool).into());
    }
    if let TimingSource::TimeUtility { path } = &plan.timing
        && !path.is_file()
    {
        return Err(dice_bench_core::Error::ToolNotFound(path.clone()).into());
    }

    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), "no .dice benchmarks found");
    }
    tracing::info!(
        benchmarks = files.len(),
        modes = ?plan.modes,
        metrics = ?plan.metrics,
        timeout_secs = ?plan.timeout_secs,
        "starting experiments"
    );

    let runner = ExperimentRunner::new(plan, ProcessInvoker::new(config.poll_interval));
    let (fragment, summary) = runner.run_all(&files);
    let store = store.merge(fragment);
    store.save(&config.results_path)?;
    eprint!("{}", summary.format_summary());
    Ok(store)
}

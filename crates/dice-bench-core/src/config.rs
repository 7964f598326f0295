//! Configuration for benchmark sessions.
//!
//! Defaults are overridden by `DICE_BENCH_*` environment variables; the CLI
//! applies its own flags on top. Unparsable values fall back to the default.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::parse::UnparsablePolicy;

/// Default results file, relative to the working directory.
pub const DEFAULT_RESULTS_PATH: &str = "results.json";
/// Default cactus plot output file.
pub const DEFAULT_PLOT_PATH: &str = "cactus_plot.svg";
/// Default path of the Dice executable.
pub const DEFAULT_TOOL_PATH: &str = "./dice";
/// Flag passed on every invocation: table construction is irrelevant to the
/// measured metrics and dominates runtime on large programs.
pub const DEFAULT_BASE_FLAGS: &[&str] = &["-skip-table"];
/// Default interval between child-status polls.
pub const DEFAULT_POLL_MS: u64 = 5;

/// Where elapsed time comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimingSource {
    /// Wall-clock time measured around the invocation.
    #[default]
    WallClock,
    /// An external utility run as `<path> -f %e <tool> <args...>` that
    /// reports elapsed seconds on stderr.
    TimeUtility { path: PathBuf },
}

/// Settings for one harness session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Path of the Dice executable.
    pub tool: PathBuf,
    /// Persisted results file.
    pub results_path: PathBuf,
    /// Per-invocation timeout in whole seconds.
    pub timeout_secs: Option<u64>,
    /// Flags passed before metric and mode flags on every invocation.
    pub base_flags: Vec<String>,
    pub timing: TimingSource,
    pub unparsable: UnparsablePolicy,
    /// How often the invoker checks whether the child exited.
    pub poll_interval: Duration,
    /// Cactus plot output file.
    pub plot_path: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from(DEFAULT_TOOL_PATH),
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            timeout_secs: None,
            base_flags: DEFAULT_BASE_FLAGS.iter().map(ToString::to_string).collect(),
            timing: TimingSource::WallClock,
            unparsable: UnparsablePolicy::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            plot_path: PathBuf::from(DEFAULT_PLOT_PATH),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = value("DICE_BENCH_TOOL") {
            config.tool = PathBuf::from(v);
        }
        if let Some(v) = value("DICE_BENCH_RESULTS") {
            config.results_path = PathBuf::from(v);
        }
        if let Some(v) = value("DICE_BENCH_PLOT_OUT") {
            config.plot_path = PathBuf::from(v);
        }
        config.timeout_secs = value("DICE_BENCH_TIMEOUT").and_then(|v| parse_u64(&v));
        if let Some(v) = value("DICE_BENCH_BASE_FLAGS") {
            config.base_flags = parse_csv(&v);
        }
        if let Some(v) = value("DICE_BENCH_TIME_UTILITY") {
            config.timing = TimingSource::TimeUtility {
                path: PathBuf::from(v),
            };
        }
        if let Some(v) = value("DICE_BENCH_UNPARSABLE") {
            match v.parse() {
                Ok(policy) => config.unparsable = policy,
                Err(err) => tracing::warn!("ignoring DICE_BENCH_UNPARSABLE: {err}"),
            }
        }
        if let Some(ms) = value("DICE_BENCH_POLL_MS").and_then(|v| parse_u64(&v)) {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }

        config
    }

    /// Per-invocation timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

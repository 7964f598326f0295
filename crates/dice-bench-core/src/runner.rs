//! Experiment orchestration.
//!
//! For every benchmark file the runner performs up to two independent
//! phases per selected mode:
//!
//! - **time**: one invocation measured in isolation
//! - **structural**: one invocation carrying every requested marker flag,
//!   parsed with [`MetricParser`]
//!
//! The runner only produces a [`Fragment`]; merging into the persisted store
//! is the caller's job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{HarnessConfig, TimingSource};
use crate::error::{Error, Result};
use crate::invoke::{Invocation, InvokeOutcome, Invoker, ToolOutput};
use crate::metric::{MetricKind, request_flags};
use crate::mode::Mode;
use crate::parse::{MetricParser, UnparsablePolicy, parse_time_utility};
use crate::store::{Fragment, Sample};

/// Arguments `/usr/bin/time`-style utilities need to print elapsed seconds.
pub const TIME_UTILITY_ARGS: &[&str] = &["-f", "%e"];

const EXCERPT_BYTES: usize = 400;

// ──────────────────────────────────────────────────────────────────────────────
// Plan
// ──────────────────────────────────────────────────────────────────────────────

/// What to run: tool, modes, metrics and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentPlan {
    pub tool: PathBuf,
    pub base_flags: Vec<String>,
    /// Selected modes, deduplicated, in catalog order.
    pub modes: Vec<Mode>,
    /// Selected metrics, deduplicated, in metric order.
    pub metrics: Vec<MetricKind>,
    pub timeout_secs: Option<u64>,
    pub timing: TimingSource,
    pub unparsable: UnparsablePolicy,
}

impl ExperimentPlan {
    /// Builds a plan from session configuration and a selection.
    ///
    /// Fails when no mode or no metric is selected.
    pub fn from_config(
        config: &HarnessConfig,
        modes: &[Mode],
        metrics: &[MetricKind],
    ) -> Result<Self> {
        let mut modes = modes.to_vec();
        modes.sort();
        modes.dedup();
        let mut metrics = metrics.to_vec();
        metrics.sort();
        metrics.dedup();

        let plan = Self {
            tool: config.tool.clone(),
            base_flags: config.base_flags.clone(),
            modes,
            metrics,
            timeout_secs: config.timeout_secs,
            timing: config.timing.clone(),
            unparsable: config.unparsable,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(Error::NoMetricsSelected);
        }
        if self.modes.is_empty() {
            return Err(Error::NoModesSelected);
        }
        Ok(())
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn wants_time(&self) -> bool {
        self.metrics.contains(&MetricKind::Time)
    }

    /// Requested metrics read from marker blocks.
    #[must_use]
    pub fn structural(&self) -> Vec<MetricKind> {
        self.metrics
            .iter()
            .copied()
            .filter(|k| k.is_structural())
            .collect()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Summary
// ──────────────────────────────────────────────────────────────────────────────

/// Which invocation an incident belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Time,
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentKind {
    TimedOut,
    ToolFailure,
}

/// A run that produced no usable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    pub benchmark: String,
    pub mode: Mode,
    pub phase: Phase,
    pub kind: IncidentKind,
}

/// Counters and timestamps for one batch.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub benchmarks: usize,
    pub invocations: usize,
    pub incidents: Vec<Incident>,
}

impl RunSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            ended_at: now,
            benchmarks: 0,
            invocations: 0,
            incidents: Vec::new(),
        }
    }

    fn note(&mut self, benchmark: &str, mode: Mode, phase: Phase, kind: IncidentKind) {
        self.incidents.push(Incident {
            benchmark: benchmark.to_string(),
            mode,
            phase,
            kind,
        });
    }

    #[must_use]
    pub fn timeouts(&self) -> usize {
        self.count(IncidentKind::TimedOut)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.count(IncidentKind::ToolFailure)
    }

    fn count(&self, kind: IncidentKind) -> usize {
        self.incidents.iter().filter(|i| i.kind == kind).count()
    }

    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Formats a human-readable summary.
    #[must_use]
    pub fn format_summary(&self) -> String {
        let rule = "═".repeat(60);
        let mut s = format!("\n{rule}\n");
        s.push_str(&format!(
            "  Benchmarks: {}  |  Invocations: {}  |  {}ms\n",
            self.benchmarks,
            self.invocations,
            self.duration_ms()
        ));
        s.push_str(&format!(
            "  Timeouts: {}  |  Tool failures: {}\n",
            self.timeouts(),
            self.failures()
        ));
        s.push_str(&format!("{rule}\n"));

        if !self.incidents.is_empty() {
            s.push_str("\nIncidents:\n");
            for incident in &self.incidents {
                let what = match incident.kind {
                    IncidentKind::TimedOut => "timed out",
                    IncidentKind::ToolFailure => "tool failure",
                };
                let phase = match incident.phase {
                    Phase::Time => "time",
                    Phase::Structural => "structural",
                };
                s.push_str(&format!(
                    "  - {} [{} / {}]: {}\n",
                    incident.benchmark, incident.mode, phase, what
                ));
            }
        }
        s
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Runner
// ──────────────────────────────────────────────────────────────────────────────

/// Drives a plan through an [`Invoker`].
#[derive(Debug)]
pub struct ExperimentRunner<I> {
    plan: ExperimentPlan,
    invoker: I,
    parser: MetricParser,
}

impl<I: Invoker> ExperimentRunner<I> {
    #[must_use]
    pub fn new(plan: ExperimentPlan, invoker: I) -> Self {
        let parser = MetricParser::new(plan.unparsable);
        Self {
            plan,
            invoker,
            parser,
        }
    }

    /// Runs every benchmark in `files`, in order.
    pub fn run_all(&self, files: &[PathBuf]) -> (Fragment, RunSummary) {
        let mut fragment = Fragment::new();
        let mut summary = RunSummary::start();
        for &mode in &self.plan.modes {
            fragment.timeouts.insert(mode, self.plan.timeout_secs);
        }

        for (idx, file) in files.iter().enumerate() {
            tracing::info!(
                benchmark = %file.display(),
                "[{}/{}] running benchmark",
                idx + 1,
                files.len()
            );
            self.run_benchmark(file, &mut fragment, &mut summary);
            summary.benchmarks += 1;
        }

        summary.ended_at = Utc::now();
        (fragment, summary)
    }

    /// Runs one benchmark across all selected modes, recording into
    /// `fragment`. Every requested `(metric, mode)` pair is present
    /// afterwards, `None` where a run timed out.
    pub fn run_benchmark(&self, file: &Path, fragment: &mut Fragment, summary: &mut RunSummary) {
        let name = benchmark_key(file);
        for &metric in &self.plan.metrics {
            for &mode in &self.plan.modes {
                fragment.record(&name, metric, mode, None);
            }
        }

        if self.plan.wants_time() {
            for &mode in &self.plan.modes {
                let value = self.measure_time(file, &name, mode, summary);
                fragment.record(&name, MetricKind::Time, mode, value);
            }
        }

        let structural = self.plan.structural();
        if !structural.is_empty() {
            for &mode in &self.plan.modes {
                self.measure_structure(file, &name, mode, &structural, fragment, summary);
            }
        }
    }

    /// Invocation of the tool on `file` in `mode`, bounded by the plan's
    /// timeout.
    fn invocation(&self, file: &Path, metric_flags: &[&str], mode: Mode) -> Invocation {
        Invocation::for_benchmark(
            &self.plan.tool,
            file,
            &self.plan.base_flags,
            metric_flags,
            mode,
        )
        .timeout(self.plan.timeout())
    }

    fn measure_time(
        &self,
        file: &Path,
        name: &str,
        mode: Mode,
        summary: &mut RunSummary,
    ) -> Option<Sample> {
        let invocation = self.invocation(file, &[], mode);
        let invocation = match &self.plan.timing {
            TimingSource::WallClock => invocation,
            TimingSource::TimeUtility { path } => invocation.wrapped(path, TIME_UTILITY_ARGS),
        };

        summary.invocations += 1;
        let value = match self.invoker.invoke(&invocation) {
            InvokeOutcome::TimedOut { elapsed } => {
                tracing::warn!(
                    benchmark = name,
                    %mode,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "time run timed out"
                );
                summary.note(name, mode, Phase::Time, IncidentKind::TimedOut);
                return None;
            }
            InvokeOutcome::SpawnFailed { reason } => {
                tracing::warn!(benchmark = name, %mode, "{reason}");
                Sample::Failed
            }
            InvokeOutcome::Completed(output) => self.elapsed_seconds(&output),
        };

        if value.is_failed() {
            summary.note(name, mode, Phase::Time, IncidentKind::ToolFailure);
        } else {
            tracing::info!(benchmark = name, %mode, value = ?value, "time recorded");
        }
        Some(value)
    }

    fn elapsed_seconds(&self, output: &ToolOutput) -> Sample {
        let seconds = match self.plan.timing {
            TimingSource::WallClock if output.success() => {
                Some(round_to(output.elapsed.as_secs_f64(), 3))
            }
            TimingSource::WallClock => None,
            TimingSource::TimeUtility { .. } => parse_time_utility(&output.stderr),
        };
        seconds.map_or_else(
            || {
                tracing::warn!(
                    exit_code = ?output.exit_code,
                    stderr = %excerpt(&output.stderr),
                    "no elapsed time for run"
                );
                Sample::Failed
            },
            Sample::Seconds,
        )
    }

    fn measure_structure(
        &self,
        file: &Path,
        name: &str,
        mode: Mode,
        structural: &[MetricKind],
        fragment: &mut Fragment,
        summary: &mut RunSummary,
    ) {
        let flags = request_flags(structural);
        let invocation = self.invocation(file, &flags, mode);

        summary.invocations += 1;
        let values = match self.invoker.invoke(&invocation) {
            InvokeOutcome::TimedOut { elapsed } => {
                tracing::warn!(
                    benchmark = name,
                    %mode,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "structural run timed out"
                );
                summary.note(name, mode, Phase::Structural, IncidentKind::TimedOut);
                return;
            }
            InvokeOutcome::SpawnFailed { reason } => {
                tracing::warn!(benchmark = name, %mode, "{reason}");
                structural.iter().map(|&k| (k, Sample::Failed)).collect()
            }
            InvokeOutcome::Completed(output) => {
                let values = self.parser.parse(&output.stdout, &output.stderr, structural);
                if values.values().any(|v| v.is_failed()) {
                    tracing::warn!(
                        benchmark = name,
                        %mode,
                        exit_code = ?output.exit_code,
                        stdout = %excerpt(&output.stdout),
                        stderr = %excerpt(&output.stderr),
                        "no metric markers in tool output"
                    );
                }
                values
            }
        };

        if values.values().any(|v| v.is_failed()) {
            summary.note(name, mode, Phase::Structural, IncidentKind::ToolFailure);
        } else {
            tracing::info!(
                benchmark = name,
                %mode,
                recorded = values.len(),
                "structural metrics recorded"
            );
        }
        for (metric, value) in values {
            fragment.record(name, metric, mode, Some(value));
        }
    }
}

/// Key a benchmark file is stored under: its file name.
#[must_use]
pub fn benchmark_key(file: &Path) -> String {
    file.file_name()
        .map_or_else(|| file.to_string_lossy(), |n| n.to_string_lossy())
        .into_owned()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= EXCERPT_BYTES {
        return trimmed.to_string();
    }
    let mut end = EXCERPT_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &trimmed[..end])
}

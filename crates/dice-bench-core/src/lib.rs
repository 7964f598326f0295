//! Core engine for benchmarking the Dice compiler across optimization modes.
//!
//! This crate provides:
//! - The mode catalog (`Mode`) and metric kinds (`MetricKind`)
//! - Subprocess invocation with timeouts (`Invoker`, `ProcessInvoker`)
//! - Marker-based metric extraction (`MetricParser`)
//! - The persistent results store and its incremental merge (`ResultsStore`)
//! - Experiment orchestration (`ExperimentRunner`)
//! - Configuration loaded from the environment (`HarnessConfig`)

#![forbid(unsafe_code)]

pub mod benchmarks;
pub mod config;
pub mod error;
pub mod invoke;
pub mod metric;
pub mod mode;
pub mod parse;
pub mod runner;
pub mod store;

pub use benchmarks::{BENCHMARK_EXTENSION, discover_benchmarks, display_name};
pub use config::{HarnessConfig, TimingSource};
pub use error::{Error, Result};
pub use invoke::{Invocation, InvokeOutcome, Invoker, ProcessInvoker, ToolOutput};
pub use metric::{MetricKind, Stream};
pub use mode::Mode;
pub use parse::{MarkerScan, MetricParser, UnparsablePolicy, parse_time_utility, scan_markers};
pub use runner::{
    ExperimentPlan, ExperimentRunner, Incident, IncidentKind, Phase, RunSummary, benchmark_key,
};
pub use store::{BenchmarkResults, Fragment, ModeValues, ResultsStore, Sample};

//! LaTeX result tables.
//!
//! One booktabs table per metric kind that every benchmark entry carries.
//! Rows are benchmarks, columns are modes. Cells read `-` when there is no
//! value and `*` for the sentinel; the smallest value in a row is set in
//! bold, ties included.

use dice_bench_core::{BenchmarkResults, MetricKind, Mode, ResultsStore, Sample, display_name};
use serde::Serialize;

use crate::error::{ReportError, Result};
use crate::templates::render_template;

const TABLE_TEMPLATE: &str = "table.tex";

#[derive(Debug, Serialize)]
struct TableContext<'a> {
    caption: String,
    colspec: String,
    header: Vec<&'a str>,
    rows: Vec<Vec<String>>,
}

/// Renders every fully covered metric, in metric order, separated by blank
/// lines. `modes` empty means all modes.
pub fn render_tables(store: &ResultsStore, modes: &[Mode]) -> Result<String> {
    if store.is_empty() {
        return Err(ReportError::NoResults);
    }
    let metrics = store.common_metrics();
    if metrics.is_empty() {
        tracing::warn!("no metric is recorded for every benchmark; no tables rendered");
    }
    let tables = metrics
        .into_iter()
        .map(|metric| render_table(store, metric, modes))
        .collect::<Result<Vec<_>>>()?;
    Ok(tables.join("\n\n"))
}

/// Renders the table for one metric.
pub fn render_table(store: &ResultsStore, metric: MetricKind, modes: &[Mode]) -> Result<String> {
    if store.is_empty() {
        return Err(ReportError::NoResults);
    }
    let modes = column_modes(modes);

    let mut header = Vec::with_capacity(modes.len() + 1);
    header.push("Benchmarks");
    header.extend(modes.iter().map(|m| m.label()));

    let rows = store
        .results
        .iter()
        .map(|(file, entry)| format_row(file, entry, metric, &modes))
        .collect();

    let ctx = TableContext {
        caption: format!("{metric} results"),
        colspec: format!("l{}", "r".repeat(modes.len())),
        header,
        rows,
    };
    Ok(render_template(TABLE_TEMPLATE, ctx)?)
}

/// Cells of one table row: the `\textsc` benchmark name, then one cell per
/// mode.
#[must_use]
pub fn format_row(
    file: &str,
    entry: &BenchmarkResults,
    metric: MetricKind,
    modes: &[Mode],
) -> Vec<String> {
    let values: Vec<Option<Sample>> = modes
        .iter()
        .map(|mode| entry.get(&metric).and_then(|m| m.get(mode)).copied().flatten())
        .collect();

    let best = values
        .iter()
        .filter_map(|v| v.and_then(|s| comparable(metric, s)))
        .min_by(f64::total_cmp);

    let mut row = Vec::with_capacity(modes.len() + 1);
    row.push(format!("\\textsc{{{}}}", display_name(file)));
    for value in values {
        let cell = match value {
            None => "-".to_string(),
            Some(Sample::Failed) => "*".to_string(),
            Some(sample) => {
                let text = format_value(metric, sample);
                let is_best = comparable(metric, sample)
                    .zip(best)
                    .is_some_and(|(v, b)| v.total_cmp(&b).is_eq());
                if is_best { format!("\\textbf{{{text}}}") } else { text }
            }
        };
        row.push(cell);
    }
    row
}

fn column_modes(modes: &[Mode]) -> Vec<Mode> {
    if modes.is_empty() {
        return Mode::ALL.to_vec();
    }
    let mut modes = modes.to_vec();
    modes.sort();
    modes.dedup();
    modes
}

fn format_value(metric: MetricKind, sample: Sample) -> String {
    match (metric.is_count(), sample) {
        (_, Sample::Failed) => "*".to_string(),
        (true, Sample::Count(n)) => n.to_string(),
        (true, Sample::Seconds(s)) => format!("{:.0}", s.trunc()),
        (false, _) => format!("{:.2}", sample.value().unwrap_or_default()),
    }
}

/// Value used to pick the row minimum. Times compare at the printed
/// precision so cells that read the same are emphasized together.
fn comparable(metric: MetricKind, sample: Sample) -> Option<f64> {
    let value = sample.value()?;
    if metric.is_count() {
        Some(value.trunc())
    } else {
        Some((value * 100.0).round() / 100.0)
    }
}

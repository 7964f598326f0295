//! Cactus plots.
//!
//! For each mode the completed times are sorted ascending and drawn at
//! x = 0, 1, ..., n-1. Benchmarks without a usable time (never run, timed
//! out or failed) form a second "did not finish" series drawn in the same
//! color: it starts at the last completed point and continues at the mode's
//! registered timeout.

use std::path::Path;

use dice_bench_core::{MetricKind, Mode, ResultsStore};
use plotters::prelude::*;

use crate::error::{ReportError, Result};

const PLOT_SIZE: (u32, u32) = (1024, 640);

/// Matplotlib's `tab10` palette.
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// Points for one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct CactusSeries {
    pub mode: Mode,
    /// `(rank, seconds)`, ascending by seconds.
    pub completed: Vec<(usize, f64)>,
    /// Starts with the anchor when there are completed points, then one
    /// point per unfinished benchmark at the timeout.
    pub did_not_finish: Vec<(usize, f64)>,
}

impl CactusSeries {
    /// Whether the first did-not-finish point repeats the last completed one.
    #[must_use]
    pub fn has_anchor(&self) -> bool {
        !self.did_not_finish.is_empty() && !self.completed.is_empty()
    }
}

/// Computes the cactus series for `mode` over every benchmark in `store`.
#[must_use]
pub fn cactus_series(store: &ResultsStore, mode: Mode) -> CactusSeries {
    let mut times: Vec<f64> = store
        .results
        .keys()
        .filter_map(|file| store.value(file, MetricKind::Time, mode))
        .filter_map(|sample| sample.value())
        .collect();
    times.sort_by(f64::total_cmp);

    let unfinished = store.results.len() - times.len();
    let completed: Vec<(usize, f64)> = times.into_iter().enumerate().collect();

    let mut did_not_finish = Vec::new();
    if unfinished > 0 {
        match store.timeout_for(mode) {
            Some(timeout) => {
                let timeout = timeout as f64;
                if let Some(&last) = completed.last() {
                    did_not_finish.push(last);
                }
                let start = completed.len();
                did_not_finish.extend((start..start + unfinished).map(|x| (x, timeout)));
            }
            None => {
                tracing::warn!(
                    %mode,
                    unfinished,
                    "no timeout registered; did-not-finish points omitted"
                );
            }
        }
    }

    CactusSeries {
        mode,
        completed,
        did_not_finish,
    }
}

/// Draws the cactus plot for `modes` (empty means all) as SVG at `path`.
pub fn render_cactus(store: &ResultsStore, modes: &[Mode], path: &Path) -> Result<()> {
    if store.is_empty() {
        return Err(ReportError::NoResults);
    }
    let modes: Vec<Mode> = if modes.is_empty() {
        Mode::ALL.to_vec()
    } else {
        let mut modes = modes.to_vec();
        modes.sort();
        modes.dedup();
        modes
    };
    let series: Vec<CactusSeries> = modes.iter().map(|&m| cactus_series(store, m)).collect();

    let x_max = store.results.len().max(1) as f64;
    let y_max = series
        .iter()
        .flat_map(|s| s.completed.iter().chain(&s.did_not_finish))
        .map(|&(_, y)| y)
        .fold(0.0_f64, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..x_max, 0.0..y_max)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Benchmarks")
        .y_desc("Time (s)")
        .light_line_style(RGBColor(235, 235, 235))
        .draw()
        .map_err(plot_err)?;

    for s in &series {
        let color = mode_color(s.mode);
        let completed: Vec<(f64, f64)> = s.completed.iter().map(|&(x, y)| (x as f64, y)).collect();
        let unfinished: Vec<(f64, f64)> = s
            .did_not_finish
            .iter()
            .map(|&(x, y)| (x as f64, y))
            .collect();

        chart
            .draw_series(LineSeries::new(completed.iter().copied(), color.stroke_width(2)))
            .map_err(plot_err)?
            .label(s.mode.label())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
        chart
            .draw_series(completed.iter().map(|&p| Circle::new(p, 3, color.filled())))
            .map_err(plot_err)?;

        if unfinished.is_empty() {
            continue;
        }
        chart
            .draw_series(LineSeries::new(unfinished.iter().copied(), color.stroke_width(1)))
            .map_err(plot_err)?;
        let skip = usize::from(s.has_anchor());
        chart
            .draw_series(
                unfinished
                    .iter()
                    .skip(skip)
                    .map(|&p| Cross::new(p, 4, color.stroke_width(2))),
            )
            .map_err(plot_err)?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    tracing::info!(path = %path.display(), series = series.len(), "cactus plot written");
    Ok(())
}

/// Color of `mode`, by its position in the catalog.
fn mode_color(mode: Mode) -> RGBColor {
    let idx = Mode::ALL.iter().position(|&m| m == mode).unwrap_or_default();
    PALETTE[idx % PALETTE.len()]
}

fn plot_err<E: std::fmt::Display>(err: E) -> ReportError {
    ReportError::Plot(err.to_string())
}

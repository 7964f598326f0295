//! Reporting for accumulated Dice benchmark results.
//!
//! - [`table`]: one LaTeX table per fully covered metric, best value per row
//!   in bold
//! - [`plot`]: cactus plot of completed times per mode, with did-not-finish
//!   runs pinned at the mode's timeout

#![forbid(unsafe_code)]

pub mod error;
pub mod plot;
pub mod table;
mod templates;

pub use error::{ReportError, Result};
pub use plot::{CactusSeries, cactus_series, render_cactus};
pub use table::{format_row, render_table, render_tables};

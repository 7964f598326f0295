//! Metric kinds and the marker protocol Dice uses to report them.
//!
//! Dice prints each requested diagnostic as a block:
//!
//! ```text
//! ================[ Final compiled BDD size ]================
//! 1234
//! ```
//!
//! The label inside the brackets is the marker; the flag returned by
//! [`MetricKind::request_flag`] asks Dice to print it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which captured stream a metric is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// A category of measurement.
///
/// Variant order is the order tables are rendered in and the order request
/// flags are passed to Dice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Time,
    Size,
    Calls,
    Flips,
    Params,
    DistinctParams,
}

impl MetricKind {
    /// Every metric kind, in rendering order.
    pub const ALL: [Self; 6] = [
        Self::Time,
        Self::Size,
        Self::Calls,
        Self::Flips,
        Self::Params,
        Self::DistinctParams,
    ];

    /// Metric kinds extracted from marker blocks in Dice's output.
    pub const STRUCTURAL: [Self; 5] = [
        Self::Size,
        Self::Calls,
        Self::Flips,
        Self::Params,
        Self::DistinctParams,
    ];

    /// Persisted key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Size => "size",
            Self::Calls => "calls",
            Self::Flips => "flips",
            Self::Params => "params",
            Self::DistinctParams => "distinct_params",
        }
    }

    /// Marker label inside `=[ ... ]=` blocks. `None` for elapsed time,
    /// which is measured around the invocation instead.
    #[must_use]
    pub const fn marker(self) -> Option<&'static str> {
        match self {
            Self::Time => None,
            Self::Size => Some("Final compiled BDD size"),
            Self::Calls => Some("Number of recursive calls"),
            Self::Flips => Some("Number of flips"),
            Self::Params => Some("Number of parameters"),
            Self::DistinctParams => Some("Number of distinct parameters"),
        }
    }

    /// Dice flag that makes it print this metric's marker block.
    #[must_use]
    pub const fn request_flag(self) -> Option<&'static str> {
        match self {
            Self::Time => None,
            Self::Size => Some("-show-size"),
            Self::Calls => Some("-num-recursive-calls"),
            Self::Flips => Some("-num-flips"),
            Self::Params | Self::DistinctParams => Some("-num-params"),
        }
    }

    /// Stream the metric is read from.
    #[must_use]
    pub const fn stream(self) -> Stream {
        match self {
            // Timing utilities such as `/usr/bin/time` report on stderr.
            Self::Time => Stream::Stderr,
            Self::Size | Self::Calls | Self::Flips | Self::Params | Self::DistinctParams => {
                Stream::Stdout
            }
        }
    }

    /// Count-like metrics are integers; time keeps fractional seconds.
    #[must_use]
    pub const fn is_count(self) -> bool {
        !matches!(self, Self::Time)
    }

    #[must_use]
    pub const fn is_structural(self) -> bool {
        self.marker().is_some()
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| Error::UnknownMetric(s.to_string()))
    }
}

/// Deduplicated request flags for `kinds`, in metric order.
#[must_use]
pub fn request_flags(kinds: &[MetricKind]) -> Vec<&'static str> {
    let mut sorted: Vec<MetricKind> = kinds.to_vec();
    sorted.sort();
    sorted.dedup();
    let mut flags: Vec<&'static str> = Vec::with_capacity(sorted.len());
    for flag in sorted.into_iter().filter_map(MetricKind::request_flag) {
        if !flags.contains(&flag) {
            flags.push(flag);
        }
    }
    flags
}

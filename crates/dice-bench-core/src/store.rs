//! Persistent results store.
//!
//! Shape on disk:
//!
//! ```json
//! {
//!     "timeouts": { "<mode label>": 60 },
//!     "results": { "<file>": { "<metric>": { "<mode label>": 1.25 } } }
//! }
//! ```
//!
//! A mode value is either a number, the sentinel `-1` (run completed but no
//! metric could be extracted), or `null`/missing (never run or timed out).

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::metric::MetricKind;
use crate::mode::Mode;

/// Value persisted for the sentinel.
pub const SENTINEL: i64 = -1;

/// One recorded measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Count(u64),
    Seconds(f64),
    /// The run completed but the metric could not be extracted.
    Failed,
}

impl Sample {
    /// Converts a parsed reading for `kind`; count kinds are truncated.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_reading(kind: MetricKind, value: f64) -> Self {
        if kind.is_count() {
            Self::Count(value.trunc() as u64)
        } else {
            Self::Seconds(value)
        }
    }

    /// Numeric value, `None` for the sentinel.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Count(n) => Some(n as f64),
            Self::Seconds(s) => Some(s),
            Self::Failed => None,
        }
    }

    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match *self {
            Self::Count(n) => serializer.serialize_u64(n),
            Self::Seconds(s) => serializer.serialize_f64(s),
            Self::Failed => serializer.serialize_i64(SENTINEL),
        }
    }
}

struct SampleVisitor;

impl Visitor<'_> for SampleVisitor {
    type Value = Sample;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative number or -1")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Sample, E> {
        Ok(Sample::Count(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Sample, E> {
        match u64::try_from(v) {
            Ok(n) => Ok(Sample::Count(n)),
            Err(_) if v == SENTINEL => Ok(Sample::Failed),
            Err(_) => Err(E::custom(format!("negative value {v} is not the sentinel -1"))),
        }
    }

    #[allow(clippy::float_cmp)]
    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Sample, E> {
        if v == -1.0 {
            Ok(Sample::Failed)
        } else if v.is_finite() && v >= 0.0 {
            Ok(Sample::Seconds(v))
        } else {
            Err(E::custom(format!("value {v} is not a non-negative number")))
        }
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(SampleVisitor)
    }
}

/// Mode to value; `None` is an explicit `null`.
pub type ModeValues = BTreeMap<Mode, Option<Sample>>;

/// Metric to per-mode values for one benchmark.
pub type BenchmarkResults = BTreeMap<MetricKind, ModeValues>;

/// Partial results produced by one experiment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub timeouts: BTreeMap<Mode, Option<u64>>,
    #[serde(default)]
    pub results: BTreeMap<String, BenchmarkResults>,
}

impl Fragment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets one `(benchmark, metric, mode)` triple, `None` meaning no value.
    pub fn record(
        &mut self,
        benchmark: &str,
        metric: MetricKind,
        mode: Mode,
        value: Option<Sample>,
    ) {
        self.results
            .entry(benchmark.to_string())
            .or_default()
            .entry(metric)
            .or_default()
            .insert(mode, value);
    }

    #[must_use]
    pub fn get(&self, benchmark: &str, metric: MetricKind, mode: Mode) -> Option<Option<Sample>> {
        self.results
            .get(benchmark)
            .and_then(|metrics| metrics.get(&metric))
            .and_then(|modes| modes.get(&mode))
            .copied()
    }
}

/// Accumulated results across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsStore {
    #[serde(default)]
    pub timeouts: BTreeMap<Mode, Option<u64>>,
    #[serde(default)]
    pub results: BTreeMap<String, BenchmarkResults>,
}

impl Default for ResultsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsStore {
    /// Empty store with every catalog mode's timeout set to `null`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeouts: Mode::ALL.into_iter().map(|m| (m, None)).collect(),
            results: BTreeMap::new(),
        }
    }

    /// Reads the store at `path`; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no results file yet, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };
        let mut store: Self =
            serde_json::from_str(&text).map_err(|source| Error::MalformedResults {
                path: path.to_path_buf(),
                source,
            })?;
        for mode in Mode::ALL {
            store.timeouts.entry(mode).or_insert(None);
        }
        Ok(store)
    }

    /// Writes the full store to `path` with 4-space indentation, replacing
    /// the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let formatter = PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut tmp, formatter);
            self.serialize(&mut serializer)?;
        }
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::debug!(path = %path.display(), benchmarks = self.results.len(), "results saved");
        Ok(())
    }

    /// Folds `fragment` into the store. Fragment entries win on every
    /// `(benchmark, metric, mode)` they carry, including `null`s; everything
    /// else is kept.
    #[must_use]
    pub fn merge(mut self, fragment: Fragment) -> Self {
        self.timeouts.extend(fragment.timeouts);
        for (benchmark, metrics) in fragment.results {
            let stored = self.results.entry(benchmark).or_default();
            for (metric, modes) in metrics {
                stored.entry(metric).or_default().extend(modes);
            }
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Timeout registered for `mode`, in seconds.
    #[must_use]
    pub fn timeout_for(&self, mode: Mode) -> Option<u64> {
        self.timeouts.get(&mode).copied().flatten()
    }

    /// Stored value for a triple; `None` when missing or `null`.
    #[must_use]
    pub fn value(&self, benchmark: &str, metric: MetricKind, mode: Mode) -> Option<Sample> {
        self.results
            .get(benchmark)
            .and_then(|metrics| metrics.get(&metric))
            .and_then(|modes| modes.get(&mode))
            .copied()
            .flatten()
    }

    /// Metric kinds that every benchmark entry carries, in metric order.
    #[must_use]
    pub fn common_metrics(&self) -> Vec<MetricKind> {
        if self.results.is_empty() {
            return Vec::new();
        }
        MetricKind::ALL
            .into_iter()
            .filter(|kind| self.results.values().all(|entry| entry.contains_key(kind)))
            .collect()
    }
}

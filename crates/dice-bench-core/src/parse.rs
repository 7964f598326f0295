//! Metric extraction from Dice's marker blocks.
//!
//! A marker block is a bracketed label between runs of `=` followed by a
//! whitespace-separated numeric token:
//!
//! ```text
//! ================[ Number of recursive calls ]================
//! 5012
//! ```
//!
//! Three situations are told apart per metric: the marker is missing, the
//! marker is present with a usable number, or the marker is present but its
//! token is not a finite non-negative number. When none of the requested
//! markers appears at all, the call is a tool failure and every requested
//! metric becomes [`Sample::Failed`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::metric::{MetricKind, Stream};
use crate::store::Sample;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=+\[[ \t]*([^\]\r\n]*?)[ \t]*\]=+").expect("valid regex")
});

// `/usr/bin/time -f %e` prints elapsed seconds alone on stderr. Anything else
// there (e.g. "Command exited with non-zero status 2") means the run failed.
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A\s*(\d+(?:\.\d*)?)\s*\z").expect("valid regex"));

/// How a marker whose token is not a usable number is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnparsablePolicy {
    /// The whole call counts as a tool failure: every requested metric is
    /// recorded as the sentinel.
    #[default]
    Failure,
    /// Only that metric is left unset. The marker still counts as found,
    /// so it alone never triggers the tool-failure rule.
    Absent,
}

impl UnparsablePolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for UnparsablePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnparsablePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "failure" | "fail" | "sentinel" => Ok(Self::Failure),
            "absent" | "skip" => Ok(Self::Absent),
            _ => Err(Error::UnknownPolicy(s.to_string())),
        }
    }
}

/// What a scan found for one marker.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerScan {
    Missing,
    /// Marker present; the raw token (empty when nothing followed it).
    Unparsable(String),
    Found(f64),
}

impl MarkerScan {
    fn classify(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Self::Unparsable(String::new());
        };
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => Self::Found(value),
            _ => Self::Unparsable(token.to_string()),
        }
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Every marker block in `output`, label to the token that follows it.
///
/// The token is the first whitespace-delimited word between the marker and
/// the next marker (or end of output). The first block for a label wins.
#[must_use]
pub fn scan_markers(output: &str) -> BTreeMap<&str, Option<&str>> {
    let spans: Vec<_> = MARKER_RE.captures_iter(output).collect();
    let mut markers = BTreeMap::new();
    for (idx, caps) in spans.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let next_start = spans
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(output.len(), |m| m.start());
        let token = output[whole.end()..next_start].split_whitespace().next();
        markers.entry(label.as_str()).or_insert(token);
    }
    markers
}

/// Elapsed seconds from a timing utility's stderr, which must hold a single
/// number and nothing else.
#[must_use]
pub fn parse_time_utility(stderr: &str) -> Option<f64> {
    TIME_RE
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extracts structural metrics from captured tool output.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricParser {
    policy: UnparsablePolicy,
}

impl MetricParser {
    #[must_use]
    pub const fn new(policy: UnparsablePolicy) -> Self {
        Self { policy }
    }

    /// Values for the requested structural metrics.
    ///
    /// Metrics whose marker is missing are left out of the result. If no
    /// requested marker is present at all, or a present marker is
    /// unparsable under [`UnparsablePolicy::Failure`], every requested
    /// metric maps to [`Sample::Failed`]. Time is never extracted here.
    #[must_use]
    pub fn parse(
        &self,
        stdout: &str,
        stderr: &str,
        requested: &[MetricKind],
    ) -> BTreeMap<MetricKind, Sample> {
        let mut kinds: Vec<MetricKind> = requested
            .iter()
            .copied()
            .filter(|k| k.is_structural())
            .collect();
        kinds.sort();
        kinds.dedup();

        let stdout_markers = scan_markers(stdout);
        let stderr_markers = scan_markers(stderr);

        let mut values = BTreeMap::new();
        let mut found_any = false;
        let mut unparsable = Vec::new();

        for &kind in &kinds {
            let Some(label) = kind.marker() else {
                continue;
            };
            let markers = match kind.stream() {
                Stream::Stdout => &stdout_markers,
                Stream::Stderr => &stderr_markers,
            };
            let scan = markers
                .get(label)
                .map_or(MarkerScan::Missing, |token| MarkerScan::classify(*token));
            found_any |= scan.is_present();
            match scan {
                MarkerScan::Missing => {}
                MarkerScan::Found(value) => {
                    values.insert(kind, Sample::from_reading(kind, value));
                }
                MarkerScan::Unparsable(token) => {
                    tracing::warn!(metric = %kind, token = %token, "unparsable metric value");
                    unparsable.push(kind);
                }
            }
        }

        let failed = !kinds.is_empty()
            && (!found_any
                || (!unparsable.is_empty() && self.policy == UnparsablePolicy::Failure));
        if failed {
            return kinds.into_iter().map(|k| (k, Sample::Failed)).collect();
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE_AND_CALLS: &str = "\
================[ Final compiled BDD size ]================
1234
================[ Number of recursive calls ]================
5012.0
";

    const SIZE_THEN_OVERFLOW: &str =
        "==[ Final compiled BDD size ]==\n1234\n==[ Number of recursive calls ]==\noverflow\n";

    fn structural() -> Vec<MetricKind> {
        vec![MetricKind::Size, MetricKind::Calls, MetricKind::Flips]
    }

    #[test]
    fn scan_markers_pairs_labels_with_tokens() {
        let markers = scan_markers(SIZE_AND_CALLS);
        assert_eq!(markers.get("Final compiled BDD size"), Some(&Some("1234")));
        assert_eq!(
            markers.get("Number of recursive calls"),
            Some(&Some("5012.0"))
        );
    }

    #[test]
    fn scan_markers_does_not_swallow_adjacent_marker() {
        let output = "===[ Number of flips ]===\n===[ Number of parameters ]===\n7\n";
        let markers = scan_markers(output);
        assert_eq!(markers.get("Number of flips"), Some(&None));
        assert_eq!(markers.get("Number of parameters"), Some(&Some("7")));
    }

    #[test]
    fn parse_reads_present_markers_and_skips_missing() {
        let parser = MetricParser::default();
        let values = parser.parse(SIZE_AND_CALLS, "", &structural());
        assert_eq!(values.get(&MetricKind::Size), Some(&Sample::Count(1234)));
        assert_eq!(values.get(&MetricKind::Calls), Some(&Sample::Count(5012)));
        assert_eq!(values.get(&MetricKind::Flips), None);
    }

    #[test]
    fn count_values_are_truncated() {
        let output = "==[ Number of flips ]==\n41.9\n";
        let values = MetricParser::default().parse(output, "", &[MetricKind::Flips]);
        assert_eq!(values.get(&MetricKind::Flips), Some(&Sample::Count(41)));
    }

    #[test]
    fn no_markers_at_all_is_a_tool_failure() {
        let values = MetricParser::default().parse(
            "Fatal error: exception Not_found\n",
            "usage: dice [options]",
            &structural(),
        );
        assert_eq!(values.len(), 3);
        assert!(values.values().all(|v| *v == Sample::Failed));
    }

    #[test]
    fn markers_for_unrequested_metrics_do_not_count_as_found() {
        let values = MetricParser::default().parse(SIZE_AND_CALLS, "", &[MetricKind::Flips]);
        assert_eq!(values.get(&MetricKind::Flips), Some(&Sample::Failed));
    }

    #[test]
    fn unparsable_marker_under_failure_policy_fails_whole_call() {
        let values = MetricParser::new(UnparsablePolicy::Failure).parse(
            SIZE_THEN_OVERFLOW,
            "",
            &structural(),
        );
        assert_eq!(values.len(), 3);
        assert!(values.values().all(|v| *v == Sample::Failed));
    }

    #[test]
    fn unparsable_marker_under_absent_policy_only_drops_that_metric() {
        let values = MetricParser::new(UnparsablePolicy::Absent).parse(
            SIZE_THEN_OVERFLOW,
            "",
            &structural(),
        );
        assert_eq!(values.get(&MetricKind::Size), Some(&Sample::Count(1234)));
        assert_eq!(values.get(&MetricKind::Calls), None);
        assert_eq!(values.get(&MetricKind::Flips), None);
    }

    #[test]
    fn lone_unparsable_marker_under_absent_policy_is_not_a_tool_failure() {
        let output = "==[ Number of flips ]==\n-4\n";
        let values = MetricParser::new(UnparsablePolicy::Absent).parse(
            output,
            "",
            &[MetricKind::Flips, MetricKind::Size],
        );
        assert!(values.is_empty());
    }

    #[test]
    fn time_is_ignored_by_marker_parsing() {
        let values = MetricParser::default().parse(SIZE_AND_CALLS, "", &[MetricKind::Time]);
        assert!(values.is_empty());
    }

    #[test]
    fn classify_reports_each_state() {
        assert_eq!(MarkerScan::classify(Some("1234")), MarkerScan::Found(1234.0));
        assert_eq!(
            MarkerScan::classify(Some("NaN")),
            MarkerScan::Unparsable("NaN".to_string())
        );
        assert_eq!(
            MarkerScan::classify(Some("-3")),
            MarkerScan::Unparsable("-3".to_string())
        );
        assert_eq!(
            MarkerScan::classify(None),
            MarkerScan::Unparsable(String::new())
        );
        assert!(!MarkerScan::Missing.is_present());
    }

    #[test]
    fn time_utility_output_must_be_a_single_number() {
        assert_eq!(parse_time_utility("3.25\n"), Some(3.25));
        assert_eq!(parse_time_utility("12"), Some(12.0));
        assert_eq!(
            parse_time_utility("Command exited with non-zero status 2\n0.01\n"),
            None
        );
        assert_eq!(parse_time_utility(""), None);
    }

    #[test]
    fn policy_parses_from_text() {
        assert_eq!(
            "Failure".parse::<UnparsablePolicy>().ok(),
            Some(UnparsablePolicy::Failure)
        );
        assert_eq!(
            "absent".parse::<UnparsablePolicy>().ok(),
            Some(UnparsablePolicy::Absent)
        );
        assert!("maybe".parse::<UnparsablePolicy>().is_err());
        assert_eq!(UnparsablePolicy::default(), UnparsablePolicy::Failure);
    }
}

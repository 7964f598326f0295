//! Optimization mode catalog.
//!
//! Each [`Mode`] names a combination of Dice optimization switches and maps
//! to the exact flag list passed on the command line. Flag order is part of
//! the catalog: Dice resolves some switches by precedence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const FLAG_DETERMINISM: &str = "-determinism";
const FLAG_FLIP_LIFTING: &str = "-flip-lifting";
const FLAG_BRANCH_ELIMINATION: &str = "-branch-elimination";
const FLAG_SBK_ENCODING: &str = "-sbk-encoding";
const FLAG_EAGER_EVAL: &str = "-eager-eval";

const FLAGS_NOOPT: &[&str] = &[];
const FLAGS_DET: &[&str] = &[FLAG_DETERMINISM];
const FLAGS_FH: &[&str] = &[FLAG_DETERMINISM, FLAG_FLIP_LIFTING, FLAG_BRANCH_ELIMINATION];
const FLAGS_SBK: &[&str] = &[FLAG_DETERMINISM, FLAG_SBK_ENCODING, FLAG_BRANCH_ELIMINATION];
const FLAGS_SBKFH: &[&str] = &[
    FLAG_DETERMINISM,
    FLAG_FLIP_LIFTING,
    FLAG_SBK_ENCODING,
    FLAG_BRANCH_ELIMINATION,
];
const FLAGS_EA: &[&str] = &[FLAG_EAGER_EVAL, FLAG_DETERMINISM, FLAG_BRANCH_ELIMINATION];
const FLAGS_EAFH: &[&str] = &[
    FLAG_EAGER_EVAL,
    FLAG_FLIP_LIFTING,
    FLAG_DETERMINISM,
    FLAG_BRANCH_ELIMINATION,
];
const FLAGS_EASBK: &[&str] = &[
    FLAG_EAGER_EVAL,
    FLAG_SBK_ENCODING,
    FLAG_DETERMINISM,
    FLAG_BRANCH_ELIMINATION,
];
const FLAGS_EASBKFH: &[&str] = &[
    FLAG_EAGER_EVAL,
    FLAG_SBK_ENCODING,
    FLAG_FLIP_LIFTING,
    FLAG_DETERMINISM,
    FLAG_BRANCH_ELIMINATION,
];

/// A named combination of optimization switches.
///
/// Variant order is catalog order; `Ord` follows it, so maps keyed by mode
/// iterate in the order tables and plots present them. Persisted results
/// use [`Mode::label`] as the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "no opts")]
    NoOpt,
    #[serde(rename = "det")]
    Det,
    #[serde(rename = "fh + det + be")]
    Fh,
    #[serde(rename = "sbk + det + be")]
    Sbk,
    #[serde(rename = "sbk + fh + det + be")]
    SbkFh,
    #[serde(rename = "ea + det + be")]
    Ea,
    #[serde(rename = "ea + fh + det + be")]
    EaFh,
    #[serde(rename = "ea + sbk + det + be")]
    EaSbk,
    #[serde(rename = "ea + sbk + fh + det + be", alias = "eg + sbk + fh + det + be")]
    EaSbkFh,
}

impl Mode {
    /// Every mode, in catalog order.
    pub const ALL: [Self; 9] = [
        Self::NoOpt,
        Self::Det,
        Self::Fh,
        Self::Sbk,
        Self::SbkFh,
        Self::Ea,
        Self::EaFh,
        Self::EaSbk,
        Self::EaSbkFh,
    ];

    /// Flags passed to Dice for this mode, in authoritative order.
    #[must_use]
    pub const fn flags(self) -> &'static [&'static str] {
        match self {
            Self::NoOpt => FLAGS_NOOPT,
            Self::Det => FLAGS_DET,
            Self::Fh => FLAGS_FH,
            Self::Sbk => FLAGS_SBK,
            Self::SbkFh => FLAGS_SBKFH,
            Self::Ea => FLAGS_EA,
            Self::EaFh => FLAGS_EAFH,
            Self::EaSbk => FLAGS_EASBK,
            Self::EaSbkFh => FLAGS_EASBKFH,
        }
    }

    /// Identifier accepted on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoOpt => "NOOPT",
            Self::Det => "DET",
            Self::Fh => "FH",
            Self::Sbk => "SBK",
            Self::SbkFh => "SBKFH",
            Self::Ea => "EA",
            Self::EaFh => "EAFH",
            Self::EaSbk => "EASBK",
            Self::EaSbkFh => "EASBKFH",
        }
    }

    /// Human-readable label, used as table header and persisted key.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoOpt => "no opts",
            Self::Det => "det",
            Self::Fh => "fh + det + be",
            Self::Sbk => "sbk + det + be",
            Self::SbkFh => "sbk + fh + det + be",
            Self::Ea => "ea + det + be",
            Self::EaFh => "ea + fh + det + be",
            Self::EaSbk => "ea + sbk + det + be",
            Self::EaSbkFh => "ea + sbk + fh + det + be",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_ordered_and_complete() {
        let mut sorted = Mode::ALL;
        sorted.sort();
        assert_eq!(sorted, Mode::ALL);
        assert_eq!(Mode::ALL.first(), Some(&Mode::NoOpt));
        assert_eq!(Mode::ALL.last(), Some(&Mode::EaSbkFh));
    }

    #[test]
    fn flag_order_is_reproduced_exactly() {
        assert!(Mode::NoOpt.flags().is_empty());
        assert_eq!(Mode::Det.flags(), &["-determinism"]);
        assert_eq!(
            Mode::SbkFh.flags(),
            &[
                "-determinism",
                "-flip-lifting",
                "-sbk-encoding",
                "-branch-elimination"
            ]
        );
        assert_eq!(
            Mode::EaSbkFh.flags(),
            &[
                "-eager-eval",
                "-sbk-encoding",
                "-flip-lifting",
                "-determinism",
                "-branch-elimination"
            ]
        );
    }

    #[test]
    fn every_optimizing_mode_enforces_determinism() {
        for mode in Mode::ALL.into_iter().skip(1) {
            assert!(
                mode.flags().contains(&"-determinism"),
                "{mode} lacks -determinism"
            );
        }
    }

    #[test]
    fn from_str_accepts_names_case_insensitively() {
        assert_eq!("EASBK".parse::<Mode>().ok(), Some(Mode::EaSbk));
        assert_eq!("sbkfh".parse::<Mode>().ok(), Some(Mode::SbkFh));
        assert!(matches!(
            "TURBO".parse::<Mode>(),
            Err(Error::UnknownMode(name)) if name == "TURBO"
        ));
    }

    #[test]
    fn serde_uses_labels_and_accepts_legacy_alias() {
        let json = serde_json::to_string(&Mode::Fh).expect("serialize");
        assert_eq!(json, "\"fh + det + be\"");
        let legacy: Mode = serde_json::from_str("\"eg + sbk + fh + det + be\"").expect("alias");
        assert_eq!(legacy, Mode::EaSbkFh);
        for mode in Mode::ALL {
            let encoded = serde_json::to_string(&mode).expect("serialize");
            assert_eq!(encoded, format!("\"{}\"", mode.label()));
        }
    }
}

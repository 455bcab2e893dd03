//! Feed descriptors
//!
//! The historical (training) feed and the in-funding (live) feed carry
//! different raw columns. Each feed gets a fixed profile describing which
//! columns to drop, which to rename onto the shared schema, and which must be
//! present for a row to be loaded at all. One normalizer parameterised by a
//! profile replaces a per-feed copy of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column present only in the live feed; its presence forces the `TEST` label
pub const LIVE_MARKER: &str = "Number of Lenders";

const TRAINING_DENYLIST: [&str; 17] = [
    "Application Date",
    "Screen Name",
    "Code",
    "APR",
    "Loan Description",
    "Loan Title",
    "City",
    "State",
    "Location",
    "Education",
    "Amount Funded By Investors",
    "Total Amount Funded",
    "Issued Date",
    "Remaining Principal Funded by Investors",
    "Payments To Date (Funded by investors)",
    // trailing and leading spaces are part of the header names
    "Remaining Principal ",
    " Payments To Date",
];

const LIVE_DENYLIST: [&str; 16] = [
    "Application Date",
    "Screen Name",
    "Code",
    "APR",
    "Loan Description",
    "Loan Title",
    "City",
    "State",
    "Location",
    "Education",
    "Amount Funded By Investors",
    "Total Amount Funded",
    "Application Expiration Date",
    "Expiration Date",
    LIVE_MARKER,
    "Amount Funded",
];

/// Fields known under different names, mapped onto the canonical name
const RENAMES: [(&str, &str); 1] = [("CREDIT Grade", "CREDIT Rating")];

const LIVE_REQUIRED: [&str; 2] = ["Employment Length", "Loan Length"];

/// Which source a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Historical loans with known outcomes
    Training,
    /// Loans still in funding, no outcome yet
    Live,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Training => f.write_str("training"),
            Self::Live => f.write_str("live"),
        }
    }
}

/// Fixed per-feed normalization parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedProfile {
    pub kind: FeedKind,
    pub denylist: &'static [&'static str],
    pub renames: &'static [(&'static str, &'static str)],
    pub live_marker: &'static str,
    /// Columns a row must carry to be loaded
    pub required_presence: &'static [&'static str],
}

impl FeedProfile {
    pub const fn training() -> Self {
        Self {
            kind: FeedKind::Training,
            denylist: &TRAINING_DENYLIST,
            renames: &RENAMES,
            live_marker: LIVE_MARKER,
            required_presence: &[],
        }
    }

    pub const fn live() -> Self {
        Self {
            kind: FeedKind::Live,
            denylist: &LIVE_DENYLIST,
            renames: &RENAMES,
            live_marker: LIVE_MARKER,
            required_presence: &LIVE_REQUIRED,
        }
    }

    pub const fn for_kind(kind: FeedKind) -> Self {
        match kind {
            FeedKind::Training => Self::training(),
            FeedKind::Live => Self::live(),
        }
    }

    pub fn is_denied(&self, column: &str) -> bool {
        self.denylist.contains(&column)
    }

    /// Canonical name for `column`
    pub fn canonical_name<'a>(&self, column: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| *from == column)
            .map(|(_, to)| *to)
            .unwrap_or(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHARED_DENYLIST: [&str; 12] = [
        "Application Date",
        "Screen Name",
        "Code",
        "APR",
        "Loan Description",
        "Loan Title",
        "City",
        "State",
        "Location",
        "Education",
        "Amount Funded By Investors",
        "Total Amount Funded",
    ];

    #[test]
    fn test_denylists_are_explicit_and_differ() {
        let training = FeedProfile::training();
        let live = FeedProfile::live();

        assert!(training.is_denied("Issued Date"));
        assert!(!live.is_denied("Issued Date"));
        assert!(live.is_denied(LIVE_MARKER));
        assert!(!training.is_denied(LIVE_MARKER));
        for shared in SHARED_DENYLIST {
            assert!(training.is_denied(shared), "{shared}");
            assert!(live.is_denied(shared), "{shared}");
        }
    }

    #[test]
    fn test_canonical_name() {
        let profile = FeedProfile::training();
        assert_eq!(profile.canonical_name("CREDIT Grade"), "CREDIT Rating");
        assert_eq!(profile.canonical_name("Loan Length"), "Loan Length");
    }

    #[test]
    fn test_required_presence() {
        assert!(FeedProfile::training().required_presence.is_empty());
        assert_eq!(FeedProfile::for_kind(FeedKind::Live).required_presence, &LIVE_REQUIRED);
    }
}

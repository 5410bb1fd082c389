//! Structured query results.
//!
//! Nothing here is formatted for display; every report serializes as-is.

use crate::analysis::{Extremum, ItemFailure, ModeWinner, ScanSummary};
use crate::models::{Direction, SpeciesFilter};
use serde::Serialize;

/// How many items a scan looked at, and which ones it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Accounting {
    pub scanned: usize,
    pub excluded: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
}

impl<T> From<&ScanSummary<T>> for Accounting {
    fn from(summary: &ScanSummary<T>) -> Self {
        Self {
            scanned: summary.scanned,
            excluded: summary.excluded,
            skipped: summary.skipped,
            failures: summary.failures.clone(),
        }
    }
}

/// Members of a type that passed a criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipReport {
    pub type_name: String,
    /// Short machine-readable criterion, e.g. `region=kanto`.
    pub criterion: String,
    pub count: usize,
    pub members: Vec<String>,
    #[serde(flatten)]
    pub accounting: Accounting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub species: String,
    pub chain: Vec<String>,
    pub stages: usize,
    pub branching: bool,
    pub has_no_evolutions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtremumReport {
    pub field: String,
    pub direction: Direction,
    pub filter: SpeciesFilter,
    pub start: i64,
    pub end: i64,
    pub best: Option<Extremum>,
    #[serde(flatten)]
    pub accounting: Accounting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeReport {
    pub type_name: String,
    pub attribute: String,
    pub winner: Option<ModeWinner>,
    #[serde(flatten)]
    pub accounting: Accounting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Membership(MembershipReport),
    Chain(ChainReport),
    Extremum(ExtremumReport),
    Mode(ModeReport),
}

impl QueryOutcome {
    /// Items dropped because they failed, where the query scanned any.
    pub fn excluded(&self) -> usize {
        match self {
            QueryOutcome::Membership(r) => r.accounting.excluded,
            QueryOutcome::Chain(_) => 0,
            QueryOutcome::Extremum(r) => r.accounting.excluded,
            QueryOutcome::Mode(r) => r.accounting.excluded,
        }
    }
}

//! Error types for fetching and querying.
//!
//! `FetchFailure` is the per-resource failure that gets cached and absorbed
//! by scans. `QueryError` is what a caller sees when a whole query is
//! rejected or cannot produce a meaningful answer.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Why a single resource could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    /// Connection, DNS, TLS or timeout error.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP status {code}")]
    Status { code: u16 },

    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    /// The body was not the document shape we expected.
    #[error("malformed payload: {reason}")]
    Malformed { reason: String },

    /// A field required by the current query is absent.
    #[error("missing field `{field}`")]
    MissingField { field: String },

    #[error("chain too deep (limit {limit})")]
    ChainTooDeep { limit: usize },
}

impl FetchFailure {
    /// Whether another attempt could plausibly succeed.
    ///
    /// 5xx and 429 are retried; any other status is final.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchFailure::Transport { .. } => true,
            FetchFailure::Status { code } => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        FetchFailure::Malformed {
            reason: reason.to_string(),
        }
    }
}

/// A query that was rejected or could not be answered at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unknown region `{0}`")]
    UnknownRegion(String),

    #[error("unknown numeric field `{0}`")]
    UnknownField(String),

    #[error("unknown classification attribute `{0}`")]
    UnknownAttribute(String),

    /// The one resource the whole query hangs off (a type listing or a
    /// species chain) could not be fetched.
    #[error("source {locator} unavailable: {reason}")]
    SourceUnavailable {
        locator: String,
        reason: FetchFailure,
    },

    #[error("query exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("query cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

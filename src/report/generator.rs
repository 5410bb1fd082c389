//! JSON run report.
//!
//! A run report pairs every query that was asked with either its outcome or
//! the error that rejected it, plus fetch counters for the whole run.

use crate::error::QueryError;
use crate::fetch::FetchStats;
use crate::query::{Query, QueryOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// One query and what became of it. Exactly one of `outcome` and `error` is
/// set.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub query: Query,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<QueryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryRecord {
    pub fn new(query: Query, result: Result<QueryOutcome, QueryError>) -> Self {
        match result {
            Ok(outcome) => Self {
                query,
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => Self {
                query,
                outcome: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub generated_at: DateTime<Utc>,
    pub base_url: String,
    pub queries_run: usize,
    pub queries_failed: usize,
    pub duration_seconds: f64,
    pub fetch: FetchStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub results: Vec<QueryRecord>,
}

impl RunReport {
    /// Pair queries with their results, in order.
    pub fn build(
        base_url: impl Into<String>,
        queries: &[Query],
        results: Vec<Result<QueryOutcome, QueryError>>,
        fetch: FetchStats,
        duration_seconds: f64,
    ) -> Self {
        let results: Vec<QueryRecord> = queries
            .iter()
            .cloned()
            .zip(results)
            .map(|(query, result)| QueryRecord::new(query, result))
            .collect();

        let metadata = RunMetadata {
            generated_at: Utc::now(),
            base_url: base_url.into(),
            queries_run: results.len(),
            queries_failed: results.iter().filter(|r| r.failed()).count(),
            duration_seconds,
            fetch,
        };

        Self { metadata, results }
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a JSON report to a file.
pub fn write_json_report(report: &RunReport, path: &Path) -> Result<()> {
    let content = generate_json_report(report)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    file.write_all(content.as_bytes())?;
    file.write_all(b"\n")?;

    Ok(())
}

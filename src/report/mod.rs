//! Run report generation.

pub mod generator;

pub use generator::{generate_json_report, write_json_report, QueryRecord, RunMetadata, RunReport};

//! dexquery - query and aggregation engine over the PokeAPI dataset.
//!
//! The [`query::QueryEngine`] answers a fixed set of question shapes
//! (membership, evolution chains, range extremums, collection modes) on top
//! of a caching, retrying and rate-limited [`fetch::Fetcher`].

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod query;
pub mod report;

pub use error::{FetchFailure, QueryError};
pub use query::{Query, QueryEngine, QueryOutcome};

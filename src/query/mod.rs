//! Query catalog, execution and result types.

pub mod catalog;
pub mod engine;
pub mod outcome;

pub use catalog::{default_catalog, Query, QueryPlan};
pub use engine::{EngineSettings, QueryEngine};
pub use outcome::{
    Accounting, ChainReport, ExtremumReport, MembershipReport, ModeReport, QueryOutcome,
};

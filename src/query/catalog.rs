//! Named queries and their validation.
//!
//! A [`Query`] is the loosely typed form that comes from config files and
//! the command line. [`Query::validate`] turns it into a [`QueryPlan`] with
//! every parameter resolved, so bad input is rejected before any request is
//! made.

use crate::error::QueryError;
use crate::models::{Direction, NumericField, Region, SpeciesAttribute, SpeciesFilter};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Widest ID range a single extremum query may scan.
pub const MAX_RANGE_LEN: i64 = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    /// Members of a type whose dex id falls inside a region.
    RegionMembership { type_name: String, region: String },

    /// Members of a type whose numeric field is strictly above a threshold.
    ThresholdFilter {
        type_name: String,
        field: String,
        threshold: i64,
    },

    /// First-branch evolution line of a species.
    EvolutionChain { species: String },

    /// Members of a type that neither evolve from nor into anything.
    NoEvolutionMembers { type_name: String },

    /// Best value of a numeric field over an inclusive id range.
    RangeExtremum {
        field: String,
        start: i64,
        end: i64,
        #[serde(default)]
        direction: Direction,
        #[serde(default)]
        filter: SpeciesFilter,
    },

    /// Most common species attribute among the members of a type.
    CollectionMode { type_name: String, attribute: String },
}

/// A validated query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    RegionMembership {
        type_name: String,
        region: Region,
    },
    ThresholdFilter {
        type_name: String,
        field: NumericField,
        threshold: i64,
    },
    EvolutionChain {
        species: String,
    },
    NoEvolutionMembers {
        type_name: String,
    },
    RangeExtremum {
        field: NumericField,
        ids: RangeInclusive<i64>,
        direction: Direction,
        filter: SpeciesFilter,
    },
    CollectionMode {
        type_name: String,
        attribute: SpeciesAttribute,
    },
}

impl Query {
    pub fn name(&self) -> &'static str {
        match self {
            Query::RegionMembership { .. } => "region_membership",
            Query::ThresholdFilter { .. } => "threshold_filter",
            Query::EvolutionChain { .. } => "evolution_chain",
            Query::NoEvolutionMembers { .. } => "no_evolution_members",
            Query::RangeExtremum { .. } => "range_extremum",
            Query::CollectionMode { .. } => "collection_mode",
        }
    }

    pub fn validate(&self) -> Result<QueryPlan, QueryError> {
        let plan = match self {
            Query::RegionMembership { type_name, region } => QueryPlan::RegionMembership {
                type_name: resource_name("type_name", type_name)?,
                region: region.parse()?,
            },
            Query::ThresholdFilter {
                type_name,
                field,
                threshold,
            } => QueryPlan::ThresholdFilter {
                type_name: resource_name("type_name", type_name)?,
                field: field.parse()?,
                threshold: *threshold,
            },
            Query::EvolutionChain { species } => QueryPlan::EvolutionChain {
                species: resource_name("species", species)?,
            },
            Query::NoEvolutionMembers { type_name } => QueryPlan::NoEvolutionMembers {
                type_name: resource_name("type_name", type_name)?,
            },
            Query::RangeExtremum {
                field,
                start,
                end,
                direction,
                filter,
            } => QueryPlan::RangeExtremum {
                field: field.parse()?,
                ids: id_range(*start, *end)?,
                direction: *direction,
                filter: *filter,
            },
            Query::CollectionMode {
                type_name,
                attribute,
            } => QueryPlan::CollectionMode {
                type_name: resource_name("type_name", type_name)?,
                attribute: attribute.parse()?,
            },
        };
        Ok(plan)
    }
}

fn resource_name(param: &str, value: &str) -> Result<String, QueryError> {
    let name = value.trim().to_lowercase();
    if name.is_empty() {
        return Err(QueryError::invalid(param, "must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(QueryError::invalid(
            param,
            format!("`{}` is not a resource name", value),
        ));
    }
    Ok(name)
}

fn id_range(start: i64, end: i64) -> Result<RangeInclusive<i64>, QueryError> {
    if start < 1 {
        return Err(QueryError::invalid("start", "ids start at 1"));
    }
    if end < start {
        return Err(QueryError::invalid(
            "end",
            format!("{} is before start {}", end, start),
        ));
    }
    if end - start + 1 > MAX_RANGE_LEN {
        return Err(QueryError::invalid(
            "end",
            format!("range wider than {} ids", MAX_RANGE_LEN),
        ));
    }
    Ok(start..=end)
}

/// Catalog run when no `[[catalog]]` is configured.
pub fn default_catalog() -> Vec<Query> {
    vec![
        Query::RegionMembership {
            type_name: "fire".to_string(),
            region: "kanto".to_string(),
        },
        Query::ThresholdFilter {
            type_name: "water".to_string(),
            field: "height".to_string(),
            threshold: 10,
        },
        Query::EvolutionChain {
            species: "charmander".to_string(),
        },
        Query::NoEvolutionMembers {
            type_name: "electric".to_string(),
        },
        Query::RangeExtremum {
            field: "attack".to_string(),
            start: 152,
            end: 251,
            direction: Direction::Max,
            filter: SpeciesFilter::Any,
        },
        Query::RangeExtremum {
            field: "speed".to_string(),
            start: 1,
            end: 499,
            direction: Direction::Max,
            filter: SpeciesFilter::NotLegendary,
        },
        Query::CollectionMode {
            type_name: "grass".to_string(),
            attribute: "habitat".to_string(),
        },
        Query::RangeExtremum {
            field: "weight".to_string(),
            start: 1,
            end: 899,
            direction: Direction::Min,
            filter: SpeciesFilter::Any,
        },
    ]
}

//! Command-line interface argument parsing.
//!
//! Global flags override `.dexquery.toml`; the subcommand picks which
//! queries to run.

use crate::config::{Config, GeneralConfig};
use crate::fetch::MAX_ATTEMPTS;
use crate::models::{Direction, SpeciesFilter};
use crate::query::Query;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// dexquery - query and aggregate the PokeAPI dataset
///
/// Answers membership, evolution, extremum and mode questions over the
/// public PokeAPI, with caching, retries and request pacing. Results are
/// written as a JSON run report.
///
/// Examples:
///   dexquery catalog
///   dexquery region --type fire --region kanto
///   dexquery extremum --field speed --start 1 --end 151 --filter not-legendary
///   dexquery --rate-interval-ms 250 chain --species eevee
///   dexquery --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Versioned API root
    #[arg(long, value_name = "URL", env = "DEXQUERY_BASE_URL")]
    pub base_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .dexquery.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Items probed at once within one scan
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Milliseconds between outbound requests (0 disables pacing)
    #[arg(long, value_name = "MS")]
    pub rate_interval_ms: Option<u64>,

    /// Attempts per resource, including the first
    #[arg(long, value_name = "COUNT")]
    pub max_attempts: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Per-query deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no spinner)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .dexquery.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run every query in the configured catalog (the default)
    Catalog,

    /// Members of a type whose dex id lies in a region
    Region {
        #[arg(long = "type", value_name = "TYPE")]
        type_name: String,
        #[arg(long)]
        region: String,
    },

    /// Members of a type whose field is strictly above a threshold
    Threshold {
        #[arg(long = "type", value_name = "TYPE")]
        type_name: String,
        #[arg(long, default_value = "height")]
        field: String,
        #[arg(long, allow_negative_numbers = true)]
        threshold: i64,
    },

    /// First-branch evolution line of a species
    Chain {
        #[arg(long)]
        species: String,
    },

    /// Members of a type that neither evolve nor evolve from anything
    NoEvolutions {
        #[arg(long = "type", value_name = "TYPE")]
        type_name: String,
    },

    /// Largest or smallest field value over an inclusive id range
    Extremum {
        #[arg(long)]
        field: String,
        #[arg(long)]
        start: i64,
        #[arg(long)]
        end: i64,
        #[arg(long, value_enum, default_value_t = Direction::Max)]
        direction: Direction,
        #[arg(long, value_enum, default_value_t = SpeciesFilter::Any)]
        filter: SpeciesFilter,
    },

    /// Most common species attribute among a type's members
    Mode {
        #[arg(long = "type", value_name = "TYPE")]
        type_name: String,
        #[arg(long, default_value = "habitat")]
        attribute: String,
    },
}

impl Command {
    /// Queries this command asks for.
    pub fn queries(&self, config: &Config) -> Vec<Query> {
        let query = match self.clone() {
            Command::Catalog => return config.catalog.clone(),
            Command::Region { type_name, region } => Query::RegionMembership { type_name, region },
            Command::Threshold {
                type_name,
                field,
                threshold,
            } => Query::ThresholdFilter {
                type_name,
                field,
                threshold,
            },
            Command::Chain { species } => Query::EvolutionChain { species },
            Command::NoEvolutions { type_name } => Query::NoEvolutionMembers { type_name },
            Command::Extremum {
                field,
                start,
                end,
                direction,
                filter,
            } => Query::RangeExtremum {
                field,
                start,
                end,
                direction,
                filter,
            },
            Command::Mode {
                type_name,
                attribute,
            } => Query::CollectionMode {
                type_name,
                attribute,
            },
        };
        vec![query]
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The chosen command, `catalog` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Catalog)
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref base_url) = self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if let Some(attempts) = self.max_attempts {
            if !(1..=MAX_ATTEMPTS).contains(&attempts) {
                return Err(format!("Max attempts must be between 1 and {}", MAX_ATTEMPTS));
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.deadline == Some(0) {
            return Err("Deadline must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings. `--quiet` wins
    /// over `verbose = true` in the config file.
    pub fn log_level(&self, general: &GeneralConfig) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

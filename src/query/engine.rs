//! Query orchestration.
//!
//! [`QueryEngine`] owns one [`Fetcher`] (and through it the cache and the
//! rate governor) and answers catalog queries by composing the chain walker
//! and the ordered scans. Dropping a query future abandons its in-flight
//! fetches; partial aggregates never escape.

use super::catalog::{Query, QueryPlan};
use super::outcome::{
    Accounting, ChainReport, ExtremumReport, MembershipReport, ModeReport, QueryOutcome,
};
use crate::analysis::{
    attributed, extremum_over_range, filter_collection, mode_over_collection, ChainWalker,
    Extremum, ScanSummary,
};
use crate::config::{Config, ScanConfig};
use crate::error::{FetchFailure, QueryError};
use crate::fetch::{Fetcher, HttpTransport, RateGovernor, RetryPolicy, Transport};
use crate::models::{
    Direction, NumericField, Region, ResourceRef, SpeciesAttribute, SpeciesFilter,
    SpeciesRecord, TypeGroup, POKEMON, SPECIES, TYPE,
};
use anyhow::{Context, Result};
use std::future::Future;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Per-item answer before the item is labelled for the scan.
type Probe<T> = Result<Option<T>, FetchFailure>;

/// Scan knobs for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub concurrency: usize,
    pub max_chain_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for EngineSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            max_chain_depth: config.max_chain_depth.max(1),
        }
    }
}

pub struct QueryEngine<T> {
    fetcher: Fetcher<T>,
    settings: EngineSettings,
}

impl QueryEngine<HttpTransport> {
    /// Engine talking to the configured API over HTTP.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.api)?;
        let base = Url::parse(&config.api.base_url)
            .with_context(|| format!("Invalid base URL: {}", config.api.base_url))?;
        let governor = RateGovernor::new(
            Duration::from_millis(config.rate.interval_ms),
            config.rate.burst,
        );
        let fetcher = Fetcher::new(transport, base, governor, RetryPolicy::from(&config.fetch));

        Ok(Self::new(fetcher, EngineSettings::from(&config.scan)))
    }
}

impl<T: Transport> QueryEngine<T> {
    pub fn new(fetcher: Fetcher<T>, settings: EngineSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    /// Validate and answer one query.
    pub async fn run(&self, query: &Query) -> Result<QueryOutcome, QueryError> {
        let plan = query.validate()?;
        info!("Running {}", query.name());

        let outcome = match plan {
            QueryPlan::RegionMembership { type_name, region } => {
                QueryOutcome::Membership(self.region_membership(&type_name, region).await?)
            }
            QueryPlan::ThresholdFilter {
                type_name,
                field,
                threshold,
            } => QueryOutcome::Membership(
                self.threshold_filter(&type_name, &field, threshold).await?,
            ),
            QueryPlan::EvolutionChain { species } => {
                QueryOutcome::Chain(self.evolution_chain(&species).await?)
            }
            QueryPlan::NoEvolutionMembers { type_name } => {
                QueryOutcome::Membership(self.no_evolution_members(&type_name).await?)
            }
            QueryPlan::RangeExtremum {
                field,
                ids,
                direction,
                filter,
            } => QueryOutcome::Extremum(self.range_extremum(&field, ids, direction, filter).await),
            QueryPlan::CollectionMode {
                type_name,
                attribute,
            } => QueryOutcome::Mode(self.collection_mode(&type_name, attribute).await?),
        };

        let excluded = outcome.excluded();
        if excluded > 0 {
            warn!("{}: {} items excluded after fetch failures", query.name(), excluded);
        }
        Ok(outcome)
    }

    /// Like [`run`](Self::run), abandoned once `deadline` passes.
    pub async fn run_with_deadline(
        &self,
        query: &Query,
        deadline: Duration,
    ) -> Result<QueryOutcome, QueryError> {
        tokio::time::timeout(deadline, self.run(query))
            .await
            .map_err(|_| {
                warn!("{} exceeded its deadline of {:?}", query.name(), deadline);
                QueryError::DeadlineExceeded(deadline)
            })?
    }

    /// Like [`run`](Self::run), abandoned as soon as `cancel` resolves.
    pub async fn run_until<C>(&self, query: &Query, cancel: C) -> Result<QueryOutcome, QueryError>
    where
        C: Future<Output = ()>,
    {
        // Cancellation is checked first on every poll.
        tokio::select! {
            biased;
            _ = cancel => {
                warn!("{} cancelled", query.name());
                Err(QueryError::Cancelled)
            }
            outcome = self.run(query) => outcome,
        }
    }

    /// Run queries one after another, each with an optional deadline.
    pub async fn run_catalog(
        &self,
        queries: &[Query],
        deadline: Option<Duration>,
    ) -> Vec<Result<QueryOutcome, QueryError>> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let result = match deadline {
                Some(deadline) => self.run_with_deadline(query, deadline).await,
                None => self.run(query).await,
            };
            if let Err(ref e) = result {
                warn!("{} rejected: {}", query.name(), e);
            }
            results.push(result);
        }
        results
    }

    async fn type_group(&self, type_name: &str) -> Result<TypeGroup, QueryError> {
        self.fetcher
            .type_group(type_name)
            .await
            .map_err(|reason| QueryError::SourceUnavailable {
                locator: self.describe(TYPE, type_name),
                reason,
            })
    }

    fn describe(&self, collection: &str, key: &str) -> String {
        self.fetcher
            .locate(collection, key)
            .map(|l| l.to_string())
            .unwrap_or_else(|_| format!("{}/{}", collection, key))
    }

    /// Species of a type member, found by the member's key.
    async fn member_species(&self, member: &ResourceRef) -> Result<SpeciesRecord, FetchFailure> {
        let key = member
            .locator
            .key()
            .ok_or_else(|| FetchFailure::malformed(format!("no key in {}", member.locator)))?;
        self.fetcher.species(key).await
    }

    async fn member_in_range(
        &self,
        member: &ResourceRef,
        ids: &RangeInclusive<i64>,
    ) -> Probe<String> {
        let pokemon = self.fetcher.pokemon_at(&member.locator).await?;
        Ok(ids.contains(&pokemon.id).then_some(pokemon.name))
    }

    async fn member_above(
        &self,
        member: &ResourceRef,
        field: &NumericField,
        threshold: i64,
    ) -> Probe<String> {
        let pokemon = self.fetcher.pokemon_at(&member.locator).await?;
        let value = field.extract(&pokemon)?;
        Ok((value > threshold).then_some(pokemon.name))
    }

    async fn member_without_evolutions(
        &self,
        member: &ResourceRef,
        walker: &ChainWalker<'_, T>,
    ) -> Probe<String> {
        let species = self.member_species(member).await?;
        if species.evolves_from.is_some() {
            return Ok(None);
        }
        let tree = walker.build_chain_for(&species).await?;
        Ok(tree.has_no_evolutions().then_some(species.name))
    }

    async fn member_category(
        &self,
        member: &ResourceRef,
        attribute: SpeciesAttribute,
    ) -> Probe<String> {
        let species = self.member_species(member).await?;
        Ok(attribute.classify(&species))
    }

    /// Value of `field` for dex id `id`, or `None` when the species filter
    /// rejects it. The species is only fetched when a filter is set.
    async fn id_value(
        &self,
        id: i64,
        field: &NumericField,
        filter: SpeciesFilter,
    ) -> Probe<Extremum> {
        let pokemon = self.fetcher.pokemon(&id.to_string()).await?;
        if filter != SpeciesFilter::Any {
            let species_ref = pokemon
                .species
                .as_ref()
                .ok_or_else(|| FetchFailure::MissingField {
                    field: "species".to_string(),
                })?;
            let species = self.fetcher.species_at(&species_ref.locator).await?;
            if !filter.admits(&species) {
                return Ok(None);
            }
        }
        let value = field.extract(&pokemon)?;
        Ok(Some(Extremum::new(pokemon.name, value)))
    }

    pub async fn region_membership(
        &self,
        type_name: &str,
        region: Region,
    ) -> Result<MembershipReport, QueryError> {
        let group = self.type_group(type_name).await?;
        let ids = region.ids();
        let ids = &ids;

        let summary = filter_collection(&group.members, self.settings.concurrency, |member| {
            attributed(member.locator.to_string(), self.member_in_range(member, ids))
        })
        .await;

        Ok(membership(
            group.name,
            format!("region={}", region.as_str()),
            summary,
        ))
    }

    pub async fn threshold_filter(
        &self,
        type_name: &str,
        field: &NumericField,
        threshold: i64,
    ) -> Result<MembershipReport, QueryError> {
        let group = self.type_group(type_name).await?;

        let summary = filter_collection(&group.members, self.settings.concurrency, |member| {
            attributed(
                member.locator.to_string(),
                self.member_above(member, field, threshold),
            )
        })
        .await;

        Ok(membership(
            group.name,
            format!("{}>{}", field.as_str(), threshold),
            summary,
        ))
    }

    pub async fn evolution_chain(&self, species: &str) -> Result<ChainReport, QueryError> {
        let walker = ChainWalker::new(&self.fetcher, self.settings.max_chain_depth);
        let tree = walker
            .build_chain(species)
            .await
            .map_err(|reason| QueryError::SourceUnavailable {
                locator: self.describe(SPECIES, species),
                reason,
            })?;

        Ok(ChainReport {
            species: species.to_string(),
            chain: tree.linearize().map(String::from).collect(),
            stages: tree.depth(),
            branching: tree.is_branching(),
            has_no_evolutions: tree.has_no_evolutions(),
        })
    }

    /// Members whose species has no predecessor and whose chain root has no
    /// children. Both conditions are checked, in that order.
    pub async fn no_evolution_members(
        &self,
        type_name: &str,
    ) -> Result<MembershipReport, QueryError> {
        let group = self.type_group(type_name).await?;
        let walker = ChainWalker::new(&self.fetcher, self.settings.max_chain_depth);
        let walker = &walker;

        let summary = filter_collection(&group.members, self.settings.concurrency, |member| {
            attributed(
                member.locator.to_string(),
                self.member_without_evolutions(member, walker),
            )
        })
        .await;

        Ok(membership(group.name, "no-evolutions".to_string(), summary))
    }

    pub async fn range_extremum(
        &self,
        field: &NumericField,
        ids: RangeInclusive<i64>,
        direction: Direction,
        filter: SpeciesFilter,
    ) -> ExtremumReport {
        let (start, end) = (*ids.start(), *ids.end());
        debug!("Scanning ids {}..={} for {}", start, end, field.as_str());

        let summary = extremum_over_range(ids, direction, self.settings.concurrency, |id| {
            attributed(
                self.describe(POKEMON, &id.to_string()),
                self.id_value(id, field, filter),
            )
        })
        .await;

        ExtremumReport {
            field: field.as_str().to_string(),
            direction,
            filter,
            start,
            end,
            accounting: Accounting::from(&summary),
            best: summary.result,
        }
    }

    pub async fn collection_mode(
        &self,
        type_name: &str,
        attribute: SpeciesAttribute,
    ) -> Result<ModeReport, QueryError> {
        let group = self.type_group(type_name).await?;

        let summary = mode_over_collection(&group.members, self.settings.concurrency, |member| {
            attributed(
                member.locator.to_string(),
                self.member_category(member, attribute),
            )
        })
        .await;

        Ok(ModeReport {
            type_name: group.name,
            attribute: attribute.as_str().to_string(),
            accounting: Accounting::from(&summary),
            winner: summary.result,
        })
    }
}

fn membership(
    type_name: String,
    criterion: String,
    summary: ScanSummary<Vec<String>>,
) -> MembershipReport {
    let accounting = Accounting::from(&summary);
    let members = summary.result.unwrap_or_default();
    MembershipReport {
        type_name,
        criterion,
        count: members.len(),
        members,
        accounting,
    }
}

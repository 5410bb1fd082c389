//! Data models for remote resources and query parameters.
//!
//! Wire shapes mirror the PokeAPI documents closely enough to deserialize
//! them; unknown fields are ignored. Each fetched document is turned into a
//! record through [`Resource::from_payload`], so a missing or ill-typed
//! field surfaces as a [`FetchFailure`] for that item only.

use crate::error::{FetchFailure, QueryError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use url::Url;

pub const POKEMON: &str = "pokemon";
pub const SPECIES: &str = "pokemon-species";
pub const TYPE: &str = "type";

/// Normalized absolute address of one remote resource.
///
/// Scheme and host are lowercased by the URL parser, the fragment is
/// dropped and the path always ends in `/`, so `.../pokemon/25` and
/// `.../pokemon/25/` share a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(raw.trim())?;
        Ok(Self::from_url(url))
    }

    /// Address of `<collection>/<key>/` under `base`.
    pub fn resource(base: &Url, collection: &str, key: &str) -> Result<Self, url::ParseError> {
        let key = key.trim().to_lowercase();
        let url = base.join(&format!("{}/{}/", collection, key))?;
        Ok(Self::from_url(url))
    }

    fn from_url(mut url: Url) -> Self {
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last non-empty path segment (an id or a name).
    pub fn key(&self) -> Option<&str> {
        self.0.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Locator {
    type Error = url::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locator::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(value: Locator) -> Self {
        value.0
    }
}

/// Lightweight pointer to a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    #[serde(rename = "url")]
    pub locator: Locator,
}

/// A document type that can be parsed from a fetched payload.
pub trait Resource: Sized {
    fn from_payload(payload: &Value) -> Result<Self, FetchFailure>;
}

fn decode<'a, T: Deserialize<'a>>(payload: &'a Value) -> Result<T, FetchFailure> {
    T::deserialize(payload).map_err(FetchFailure::malformed)
}

#[derive(Debug, Deserialize)]
struct PokemonWire {
    id: i64,
    name: String,
    height: i64,
    weight: i64,
    types: Vec<TypeSlotWire>,
    stats: Vec<StatWire>,
    #[serde(default)]
    species: Option<ResourceRef>,
}

#[derive(Debug, Deserialize)]
struct TypeSlotWire {
    slot: u32,
    #[serde(rename = "type")]
    kind: ResourceRef,
}

#[derive(Debug, Deserialize)]
struct StatWire {
    base_stat: i64,
    stat: ResourceRef,
}

/// Parsed pokemon detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PokemonRecord {
    pub id: i64,
    pub name: String,
    pub height: i64,
    pub weight: i64,
    /// Type names ordered by slot.
    pub types: Vec<String>,
    /// Stat name to base value, in document order.
    pub stats: IndexMap<String, i64>,
    pub species: Option<ResourceRef>,
}

impl PokemonRecord {
    pub fn stat(&self, name: &str) -> Result<i64, FetchFailure> {
        self.stats
            .get(name)
            .copied()
            .ok_or_else(|| FetchFailure::MissingField {
                field: format!("stats.{}", name),
            })
    }
}

impl Resource for PokemonRecord {
    fn from_payload(payload: &Value) -> Result<Self, FetchFailure> {
        let wire: PokemonWire = decode(payload)?;
        if wire.id < 1 {
            return Err(FetchFailure::malformed(format!("invalid id {}", wire.id)));
        }

        let mut slots = wire.types;
        slots.sort_by_key(|t| t.slot);

        let mut stats = IndexMap::with_capacity(wire.stats.len());
        for entry in wire.stats {
            if stats.insert(entry.stat.name.clone(), entry.base_stat).is_some() {
                return Err(FetchFailure::malformed(format!(
                    "duplicate stat `{}`",
                    entry.stat.name
                )));
            }
        }

        Ok(Self {
            id: wire.id,
            name: wire.name,
            height: wire.height,
            weight: wire.weight,
            types: slots.into_iter().map(|t| t.kind.name).collect(),
            stats,
            species: wire.species,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LinkWire {
    url: Locator,
}

#[derive(Debug, Deserialize)]
struct SpeciesWire {
    name: String,
    is_legendary: bool,
    #[serde(default)]
    habitat: Option<ResourceRef>,
    #[serde(default)]
    evolves_from_species: Option<ResourceRef>,
    evolution_chain: LinkWire,
}

/// Parsed species detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesRecord {
    pub name: String,
    pub is_legendary: bool,
    pub habitat: Option<String>,
    pub evolves_from: Option<String>,
    pub evolution_chain: Locator,
}

impl Resource for SpeciesRecord {
    fn from_payload(payload: &Value) -> Result<Self, FetchFailure> {
        let wire: SpeciesWire = decode(payload)?;
        Ok(Self {
            name: wire.name,
            is_legendary: wire.is_legendary,
            habitat: wire.habitat.map(|h| h.name),
            evolves_from: wire.evolves_from_species.map(|s| s.name),
            evolution_chain: wire.evolution_chain.url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TypeMemberWire {
    pokemon: ResourceRef,
}

#[derive(Debug, Deserialize)]
struct TypeWire {
    name: String,
    pokemon: Vec<TypeMemberWire>,
}

/// Membership listing of one type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeGroup {
    pub name: String,
    pub members: Vec<ResourceRef>,
}

impl Resource for TypeGroup {
    fn from_payload(payload: &Value) -> Result<Self, FetchFailure> {
        let wire: TypeWire = decode(payload)?;
        Ok(Self {
            name: wire.name,
            members: wire.pokemon.into_iter().map(|m| m.pokemon).collect(),
        })
    }
}

/// One link of an evolution-chain document, as served.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainLink {
    pub species: ResourceRef,
    pub evolves_to: Vec<ChainLink>,
}

/// Evolution-chain document.
#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionChainDoc {
    pub chain: ChainLink,
}

impl Resource for EvolutionChainDoc {
    fn from_payload(payload: &Value) -> Result<Self, FetchFailure> {
        decode(payload)
    }
}

/// A named national-dex ID window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Kanto,
    Johto,
    Hoenn,
    Sinnoh,
    Unova,
    Kalos,
    Alola,
    Galar,
    Paldea,
}

impl Region {
    pub fn ids(&self) -> RangeInclusive<i64> {
        match self {
            Region::Kanto => 1..=151,
            Region::Johto => 152..=251,
            Region::Hoenn => 252..=386,
            Region::Sinnoh => 387..=493,
            Region::Unova => 494..=649,
            Region::Kalos => 650..=721,
            Region::Alola => 722..=809,
            Region::Galar => 810..=905,
            Region::Paldea => 906..=1025,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Kanto => "kanto",
            Region::Johto => "johto",
            Region::Hoenn => "hoenn",
            Region::Sinnoh => "sinnoh",
            Region::Unova => "unova",
            Region::Kalos => "kalos",
            Region::Alola => "alola",
            Region::Galar => "galar",
            Region::Paldea => "paldea",
        }
    }
}

impl FromStr for Region {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kanto" => Ok(Region::Kanto),
            "johto" => Ok(Region::Johto),
            "hoenn" => Ok(Region::Hoenn),
            "sinnoh" => Ok(Region::Sinnoh),
            "unova" => Ok(Region::Unova),
            "kalos" => Ok(Region::Kalos),
            "alola" => Ok(Region::Alola),
            "galar" => Ok(Region::Galar),
            "paldea" => Ok(Region::Paldea),
            other => Err(QueryError::UnknownRegion(other.to_string())),
        }
    }
}

const STAT_NAMES: [&str; 6] = [
    "hp",
    "attack",
    "defense",
    "special-attack",
    "special-defense",
    "speed",
];

/// A numeric field that can be read off a [`PokemonRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericField {
    Height,
    Weight,
    Stat(&'static str),
}

impl NumericField {
    pub fn extract(&self, pokemon: &PokemonRecord) -> Result<i64, FetchFailure> {
        match self {
            NumericField::Height => Ok(pokemon.height),
            NumericField::Weight => Ok(pokemon.weight),
            NumericField::Stat(name) => pokemon.stat(name),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NumericField::Height => "height",
            NumericField::Weight => "weight",
            NumericField::Stat(name) => name,
        }
    }
}

impl FromStr for NumericField {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "height" => Ok(NumericField::Height),
            "weight" => Ok(NumericField::Weight),
            other => STAT_NAMES
                .iter()
                .find(|stat| **stat == other)
                .map(|stat| NumericField::Stat(*stat))
                .ok_or(QueryError::UnknownField(name)),
        }
    }
}

/// A categorical attribute of a [`SpeciesRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesAttribute {
    Habitat,
}

impl SpeciesAttribute {
    pub fn classify(&self, species: &SpeciesRecord) -> Option<String> {
        match self {
            SpeciesAttribute::Habitat => species.habitat.clone(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeciesAttribute::Habitat => "habitat",
        }
    }
}

impl FromStr for SpeciesAttribute {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "habitat" => Ok(SpeciesAttribute::Habitat),
            other => Err(QueryError::UnknownAttribute(other.to_string())),
        }
    }
}

/// Species-level predicate for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SpeciesFilter {
    #[default]
    Any,
    NotLegendary,
    LegendaryOnly,
}

impl SpeciesFilter {
    pub fn admits(&self, species: &SpeciesRecord) -> bool {
        match self {
            SpeciesFilter::Any => true,
            SpeciesFilter::NotLegendary => !species.is_legendary,
            SpeciesFilter::LegendaryOnly => species.is_legendary,
        }
    }
}

/// Which end of the scale an extremum query looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Max,
    Min,
}

impl Direction {
    /// Strict comparison: equal values never replace the incumbent.
    pub fn improves(&self, candidate: i64, best: i64) -> bool {
        match self {
            Direction::Max => candidate > best,
            Direction::Min => candidate < best,
        }
    }
}

//! Evolution chain walking.
//!
//! A chain document is converted into an owned [`EvolutionNode`] tree with
//! an explicit depth bound, then read through [`EvolutionNode::linearize`].

use crate::error::FetchFailure;
use crate::fetch::{Fetcher, Transport};
use crate::models::{ChainLink, SpeciesRecord};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One species in an evolution tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionNode {
    pub species_name: String,
    pub children: Vec<EvolutionNode>,
}

impl EvolutionNode {
    pub fn leaf(species_name: impl Into<String>) -> Self {
        Self {
            species_name: species_name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(species_name: impl Into<String>, children: Vec<EvolutionNode>) -> Self {
        Self {
            species_name: species_name.into(),
            children,
        }
    }

    /// Convert a served chain link, failing once nesting exceeds `max_depth`
    /// levels.
    pub fn from_link(link: &ChainLink, max_depth: usize) -> Result<Self, FetchFailure> {
        Self::convert(link, 1, max_depth)
    }

    fn convert(link: &ChainLink, depth: usize, max_depth: usize) -> Result<Self, FetchFailure> {
        if depth > max_depth {
            return Err(FetchFailure::ChainTooDeep { limit: max_depth });
        }
        let children = link
            .evolves_to
            .iter()
            .map(|child| Self::convert(child, depth + 1, max_depth))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_children(link.species.name.clone(), children))
    }

    /// Species names from the root, always following the first branch.
    pub fn linearize(&self) -> Linearize<'_> {
        Linearize { next: Some(self) }
    }

    pub fn has_no_evolutions(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether any stage has more than one evolution.
    pub fn is_branching(&self) -> bool {
        self.children.len() > 1 || self.children.iter().any(EvolutionNode::is_branching)
    }

    /// Number of stages on the longest path.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(EvolutionNode::depth).max().unwrap_or(0)
    }

    pub fn species_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(EvolutionNode::species_count)
            .sum::<usize>()
    }
}

/// First-child walk over an [`EvolutionNode`] tree.
#[derive(Debug, Clone)]
pub struct Linearize<'a> {
    next: Option<&'a EvolutionNode>,
}

impl<'a> Iterator for Linearize<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.children.first();
        Some(node.species_name.as_str())
    }
}

/// Builds evolution trees through a fetcher.
pub struct ChainWalker<'a, T> {
    fetcher: &'a Fetcher<T>,
    max_depth: usize,
}

impl<'a, T: Transport> ChainWalker<'a, T> {
    pub fn new(fetcher: &'a Fetcher<T>, max_depth: usize) -> Self {
        Self {
            fetcher,
            max_depth: max_depth.max(1),
        }
    }

    /// Species, then its chain, then the tree.
    pub async fn build_chain(&self, species_name: &str) -> Result<EvolutionNode, FetchFailure> {
        let species = self.fetcher.species(species_name).await?;
        self.build_chain_for(&species).await
    }

    /// Tree for an already-fetched species.
    pub async fn build_chain_for(
        &self,
        species: &SpeciesRecord,
    ) -> Result<EvolutionNode, FetchFailure> {
        let doc = self.fetcher.evolution_chain(&species.evolution_chain).await?;
        let tree = EvolutionNode::from_link(&doc.chain, self.max_depth)?;
        debug!(
            "chain for {}: {} species, depth {}",
            species.name,
            tree.species_count(),
            tree.depth()
        );
        Ok(tree)
    }
}

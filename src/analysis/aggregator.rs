//! Ordered scans with per-item failure accounting.
//!
//! Each scan takes a sequence of items and an async probe for one item. The
//! probe answers `Ok(Some(_))` for a usable item, `Ok(None)` for an item that
//! fetched fine but does not participate (filtered out, unclassified), and
//! `Err(_)` for a failed item, naming the item and the reason. Probes run with bounded concurrency but their
//! outcomes are folded strictly in input order, so "first encountered" means
//! the same thing at any concurrency.

use crate::error::FetchFailure;
use crate::models::Direction;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::Serialize;
use std::future::Future;
use std::fmt;
use tracing::{debug, warn};

/// Result of probing one item.
pub type ItemOutcome<T> = Result<Option<T>, ItemFailure>;

/// An item dropped from a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Locator (or other label) of the failed item.
    pub item: String,
    pub reason: FetchFailure,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, reason: FetchFailure) -> Self {
        Self {
            item: item.into(),
            reason,
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

/// Label the failure of `work` with `item`.
pub async fn attributed<T, Fut>(item: String, work: Fut) -> ItemOutcome<T>
where
    Fut: Future<Output = Result<Option<T>, FetchFailure>>,
{
    work.await.map_err(|reason| ItemFailure::new(item, reason))
}

/// Aggregate plus accounting for one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary<T> {
    /// `None` when no item contributed.
    pub result: Option<T>,
    /// Items looked at.
    pub scanned: usize,
    /// Items dropped because they failed.
    pub excluded: usize,
    /// Items that fetched fine but did not contribute.
    pub skipped: usize,
    /// The dropped items, in input order.
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extremum {
    pub name: String,
    pub value: i64,
}

impl Extremum {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Running best for an extremum scan.
#[derive(Debug, Clone, Default)]
pub struct ExtremumState {
    best: Option<Extremum>,
    seen_count: usize,
}

impl ExtremumState {
    /// Strictly better replaces; an equal value keeps the incumbent.
    pub fn offer(&mut self, candidate: Extremum, direction: Direction) {
        self.seen_count += 1;
        let replace = match &self.best {
            None => true,
            Some(best) => direction.improves(candidate.value, best.value),
        };
        if replace {
            self.best = Some(candidate);
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen_count
    }

    pub fn into_best(self) -> Option<Extremum> {
        self.best
    }
}

/// Winning category of a mode scan, with the full tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeWinner {
    pub category: String,
    pub count: usize,
    /// Every category in order of first appearance.
    pub distribution: IndexMap<String, usize>,
}

/// Category counts in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct ModeState {
    counts: IndexMap<String, usize>,
}

impl ModeState {
    pub fn offer(&mut self, category: String) {
        *self.counts.entry(category).or_insert(0) += 1;
    }

    /// Highest count; ties go to the category that appeared first.
    pub fn into_winner(self) -> Option<ModeWinner> {
        let mut winner: Option<(&String, usize)> = None;
        for (category, &count) in &self.counts {
            if winner.map_or(true, |(_, best)| count > best) {
                winner = Some((category, count));
            }
        }
        let (category, count) = winner.map(|(c, n)| (c.clone(), n))?;
        Some(ModeWinner {
            category,
            count,
            distribution: self.counts,
        })
    }
}

/// Item counts from one fold.
struct Tally {
    scanned: usize,
    skipped: usize,
    failures: Vec<ItemFailure>,
}

impl Tally {
    fn into_summary<T>(self, result: Option<T>) -> ScanSummary<T> {
        ScanSummary {
            result,
            scanned: self.scanned,
            excluded: self.failures.len(),
            skipped: self.skipped,
            failures: self.failures,
        }
    }
}

/// Fold outcomes in order, feeding usable values to `absorb`.
fn tally<T, F>(outcomes: Vec<ItemOutcome<T>>, mut absorb: F) -> Tally
where
    F: FnMut(T),
{
    let scanned = outcomes.len();
    let mut skipped = 0;
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome {
            Ok(Some(value)) => absorb(value),
            Ok(None) => skipped += 1,
            Err(failure) => {
                warn!("excluding {}", failure);
                failures.push(failure);
            }
        }
    }

    Tally {
        scanned,
        skipped,
        failures,
    }
}

/// Run `probe` over `items` with at most `concurrency` in flight; outcomes
/// come back in input order.
async fn probe_all<I, F, Fut, T>(items: I, concurrency: usize, probe: F) -> Vec<ItemOutcome<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = ItemOutcome<T>>,
{
    stream::iter(items)
        .map(probe)
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Find the item with the largest (or smallest) value.
pub async fn extremum_over_range<I, F, Fut>(
    items: I,
    direction: Direction,
    concurrency: usize,
    probe: F,
) -> ScanSummary<Extremum>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = ItemOutcome<Extremum>>,
{
    let outcomes = probe_all(items, concurrency, probe).await;
    let mut state = ExtremumState::default();
    let counts = tally(outcomes, |candidate| state.offer(candidate, direction));
    debug!("extremum compared {} candidates", state.seen_count());

    counts.into_summary(state.into_best())
}

/// Find the most frequent category.
pub async fn mode_over_collection<I, F, Fut>(
    items: I,
    concurrency: usize,
    classify: F,
) -> ScanSummary<ModeWinner>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = ItemOutcome<String>>,
{
    let outcomes = probe_all(items, concurrency, classify).await;
    let mut state = ModeState::default();
    let counts = tally(outcomes, |category| state.offer(category));

    counts.into_summary(state.into_winner())
}

/// Keep every item the probe accepts, in input order. The result is always
/// `Some`, possibly empty.
pub async fn filter_collection<I, F, Fut, T>(
    items: I,
    concurrency: usize,
    probe: F,
) -> ScanSummary<Vec<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = ItemOutcome<T>>,
{
    let outcomes = probe_all(items, concurrency, probe).await;
    let mut kept = Vec::new();
    let counts = tally(outcomes, |value| kept.push(value));

    counts.into_summary(Some(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn named(values: &[i64]) -> Vec<(String, i64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("item-{}", i + 1), *v))
            .collect()
    }

    fn missing() -> ItemFailure {
        ItemFailure::new("item", FetchFailure::Status { code: 404 })
    }

    fn found(name: String, value: i64) -> ItemOutcome<Extremum> {
        Ok(Some(Extremum::new(name, value)))
    }

    #[tokio::test]
    async fn test_tie_keeps_first_maximum() {
        let items = named(&[10, 20, 20, 5]);
        let summary = extremum_over_range(items, Direction::Max, 1, |(name, value)| async move {
            found(name, value)
        })
        .await;

        assert_eq!(summary.result, Some(Extremum::new("item-2", 20)));
        assert_eq!(summary.scanned, 4);
        assert_eq!(summary.excluded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tie_break_survives_concurrency() {
        // Later items finish first; order of folding must not change.
        let items = named(&[10, 20, 20, 5]);
        let summary = extremum_over_range(items, Direction::Max, 4, |(name, value)| async move {
            let delay = if name == "item-2" { 50 } else { 1 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            found(name, value)
        })
        .await;

        assert_eq!(summary.result, Some(Extremum::new("item-2", 20)));
    }

    #[tokio::test]
    async fn test_minimum_direction() {
        let items = named(&[7, 1, 3, 1]);
        let summary = extremum_over_range(items, Direction::Min, 2, |(name, value)| async move {
            found(name, value)
        })
        .await;
        assert_eq!(summary.result, Some(Extremum::new("item-2", 1)));
    }

    #[tokio::test]
    async fn test_empty_inputs_yield_none() {
        let items: Vec<(String, i64)> = Vec::new();
        let extremum = extremum_over_range(items, Direction::Max, 4, |(name, value)| async move {
            found(name, value)
        })
        .await;
        assert_eq!(extremum.result, None);
        assert_eq!(extremum.scanned, 0);

        let categories: Vec<String> = Vec::new();
        let mode = mode_over_collection(categories, 4, |c| async move {
            let outcome: ItemOutcome<String> = Ok(Some(c));
            outcome
        })
        .await;
        assert_eq!(mode.result, None);
    }

    #[tokio::test]
    async fn test_partial_failures_are_excluded() {
        let items = named(&[3, 99, 8, 99, 4]);
        let summary = extremum_over_range(items, Direction::Max, 2, |(name, value)| async move {
            if name == "item-2" || name == "item-4" {
                Err(missing())
            } else {
                found(name, value)
            }
        })
        .await;

        assert_eq!(summary.result, Some(Extremum::new("item-3", 8)));
        assert_eq!(summary.scanned, 5);
        assert_eq!(summary.excluded, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_all_failed_yields_none() {
        let summary = extremum_over_range(named(&[1, 2]), Direction::Max, 2, |_| async move {
            let outcome: ItemOutcome<Extremum> = Err(missing());
            outcome
        })
        .await;
        assert_eq!(summary.result, None);
        assert_eq!(summary.excluded, 2);
    }

    #[tokio::test]
    async fn test_mode_partial_failures_and_unclassified() {
        let items = vec![
            Some("forest"),
            None,
            Some("cave"),
            Some("forest"),
            Some("grassland"),
        ];
        let summary = mode_over_collection(items.into_iter().enumerate(), 3, |(i, habitat)| async move {
            let outcome: ItemOutcome<String> = match (i, habitat) {
                (1, _) | (3, _) => Err(missing()),
                (_, h) => Ok(h.map(String::from)),
            };
            outcome
        })
        .await;

        let winner = summary.result.unwrap();
        // forest=1, cave=1, grassland=1 after exclusions: first seen wins.
        assert_eq!(winner.category, "forest");
        assert_eq!(winner.count, 1);
        assert_eq!(winner.distribution.len(), 3);
        assert_eq!(summary.excluded, 2);
    }

    #[test]
    fn test_mode_tie_goes_to_first_appearance() {
        let mut state = ModeState::default();
        for category in ["sea", "cave", "cave", "sea", "rare"] {
            state.offer(category.to_string());
        }
        let winner = state.into_winner().unwrap();
        assert_eq!(winner.category, "sea");
        assert_eq!(winner.count, 2);

        let mut state = ModeState::default();
        for category in ["sea", "cave", "cave"] {
            state.offer(category.to_string());
        }
        assert_eq!(state.into_winner().unwrap().category, "cave");
    }

    #[tokio::test]
    async fn test_mode_none_when_nothing_classified() {
        let summary = mode_over_collection(0..3, 2, |_| async move {
            let outcome: ItemOutcome<String> = Ok(None);
            outcome
        })
        .await;
        assert_eq!(summary.result, None);
        assert_eq!(summary.skipped, 3);
    }

    #[tokio::test]
    async fn test_filter_keeps_order_and_counts() {
        let summary = filter_collection(1..=6, 3, |n: i32| async move {
            let outcome: ItemOutcome<i32> = match n {
                4 => Err(missing()),
                n if n % 2 == 0 => Ok(Some(n)),
                _ => Ok(None),
            };
            outcome
        })
        .await;

        assert_eq!(summary.result, Some(vec![2, 6]));
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.skipped, 3);
    }

    #[tokio::test]
    async fn test_failures_keep_item_labels_in_order() {
        let summary = filter_collection(1..=4, 4, |n: i32| {
            attributed(format!("pokemon/{}/", n), async move {
                match n {
                    2 => Err(FetchFailure::MissingField {
                        field: "stats.attack".to_string(),
                    }),
                    3 => Err(FetchFailure::Status { code: 404 }),
                    n => Ok(Some(n)),
                }
            })
        })
        .await;

        assert_eq!(summary.result, Some(vec![1, 4]));
        assert_eq!(summary.excluded, 2);
        assert_eq!(
            summary.failures,
            vec![
                ItemFailure::new(
                    "pokemon/2/",
                    FetchFailure::MissingField {
                        field: "stats.attack".to_string()
                    }
                ),
                ItemFailure::new("pokemon/3/", FetchFailure::Status { code: 404 }),
            ]
        );
        assert_eq!(
            summary.failures[0].to_string(),
            "pokemon/2/: missing field `stats.attack`"
        );
    }

    #[test]
    fn test_extremum_state_counts_offers() {
        let mut state = ExtremumState::default();
        state.offer(Extremum::new("a", 1), Direction::Max);
        state.offer(Extremum::new("b", 1), Direction::Max);
        assert_eq!(state.seen_count(), 2);
        assert_eq!(state.into_best(), Some(Extremum::new("a", 1)));
    }
}

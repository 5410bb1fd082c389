//! Cached, retrying, rate-governed resource fetcher.

use super::governor::RateGovernor;
use super::transport::Transport;
use crate::config::FetchConfig;
use crate::error::FetchFailure;
use crate::models::{EvolutionChainDoc, Locator, PokemonRecord, Resource, SpeciesRecord, TypeGroup, POKEMON, SPECIES, TYPE};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

/// Outcome of one logical fetch. Cloning is cheap; failures are cached
/// just like payloads.
pub type FetchResult = Result<Arc<Value>, FetchFailure>;

/// One cache entry; empty while its first fetch is in flight.
type Slot = Arc<OnceCell<FetchResult>>;

/// Most attempts any policy will make for one locator.
pub const MAX_ATTEMPTS: u32 = 10;

/// Longest single wait between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base, 2*base, 4*base...
    /// capped at [`MAX_BACKOFF`].
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff_base
            .checked_mul(2u32.saturating_pow(retry))
            .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
    }

    /// Attempts actually made, between 1 and [`MAX_ATTEMPTS`].
    pub fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_ATTEMPTS)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.clamp(1, MAX_ATTEMPTS),
            backoff_base: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Counters for one fetcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub network_attempts: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub cached_entries: usize,
}

pub struct Fetcher<T> {
    transport: T,
    base: Url,
    governor: RateGovernor,
    retry: RetryPolicy,
    cache: DashMap<Locator, Slot>,
    network_attempts: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, mut base: Url, governor: RateGovernor, retry: RetryPolicy) -> Self {
        // Url::join drops the last segment of a base without a trailing slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Self {
            transport,
            base,
            governor,
            retry,
            cache: DashMap::new(),
            network_attempts: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve `(collection, key)` against the base URL.
    pub fn locate(&self, collection: &str, key: &str) -> Result<Locator, FetchFailure> {
        Locator::resource(&self.base, collection, key)
            .map_err(|e| FetchFailure::malformed(format!("bad locator {}/{}: {}", collection, key, e)))
    }

    /// Fetch through the cache. A cached entry, failed or not, is returned
    /// without touching the network or the rate governor. Concurrent misses
    /// on one locator share a single attempt sequence.
    pub async fn fetch(&self, locator: &Locator) -> FetchResult {
        let slot = self.slot(locator);
        if let Some(hit) = slot.get() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit: {}", locator);
            return hit.clone();
        }

        let mut fetched = false;
        let result = {
            let fetched = &mut fetched;
            slot.get_or_init(|| async move {
                *fetched = true;
                self.fetch_remote(locator).await
            })
            .await
            .clone()
        };

        if !fetched {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("joined in-flight fetch: {}", locator);
        }
        result
    }

    /// Bypass the cache for an explicit retry; the fresh result replaces
    /// whatever was cached.
    pub async fn fetch_fresh(&self, locator: &Locator) -> FetchResult {
        let result = self.fetch_remote(locator).await;
        self.cache
            .insert(locator.clone(), Arc::new(OnceCell::from(result.clone())));
        result
    }

    /// The cache cell for `locator`, created empty on first use.
    fn slot(&self, locator: &Locator) -> Slot {
        if let Some(slot) = self.cache.get(locator) {
            return slot.value().clone();
        }
        self.cache.entry(locator.clone()).or_default().value().clone()
    }

    async fn fetch_remote(&self, locator: &Locator) -> FetchResult {
        let attempts = self.retry.attempts();
        let mut last = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay(attempt - 1)).await;
            }

            self.governor.acquire().await;
            self.network_attempts.fetch_add(1, Ordering::Relaxed);

            let failure = match self.transport.get(locator.as_str()).await {
                Ok(response) if response.is_success() => {
                    return serde_json::from_str::<Value>(&response.body)
                        .map(Arc::new)
                        .map_err(|e| self.record_failure(locator, FetchFailure::malformed(e)));
                }
                Ok(response) => FetchFailure::Status {
                    code: response.status,
                },
                Err(failure) => failure,
            };

            if !failure.is_transient() {
                return Err(self.record_failure(locator, failure));
            }

            debug!(
                "attempt {}/{} for {} failed: {}",
                attempt + 1,
                attempts,
                locator,
                failure
            );
            last = Some(failure);
        }

        let exhausted = FetchFailure::Exhausted {
            attempts,
            last: last.map(|f| f.to_string()).unwrap_or_default(),
        };
        Err(self.record_failure(locator, exhausted))
    }

    fn record_failure(&self, locator: &Locator, failure: FetchFailure) -> FetchFailure {
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!("fetch failed for {}: {}", locator, failure);
        failure
    }

    /// Fetch and parse into a typed record.
    pub async fn resource<R: Resource>(&self, locator: &Locator) -> Result<R, FetchFailure> {
        let payload = self.fetch(locator).await?;
        R::from_payload(&payload).map_err(|failure| {
            warn!("unusable document at {}: {}", locator, failure);
            failure
        })
    }

    pub async fn pokemon(&self, key: &str) -> Result<PokemonRecord, FetchFailure> {
        let locator = self.locate(POKEMON, key)?;
        self.pokemon_at(&locator).await
    }

    pub async fn pokemon_at(&self, locator: &Locator) -> Result<PokemonRecord, FetchFailure> {
        self.resource(locator).await
    }

    pub async fn species(&self, key: &str) -> Result<SpeciesRecord, FetchFailure> {
        let locator = self.locate(SPECIES, key)?;
        self.species_at(&locator).await
    }

    pub async fn species_at(&self, locator: &Locator) -> Result<SpeciesRecord, FetchFailure> {
        self.resource(locator).await
    }

    pub async fn evolution_chain(&self, locator: &Locator) -> Result<EvolutionChainDoc, FetchFailure> {
        self.resource(locator).await
    }

    pub async fn type_group(&self, name: &str) -> Result<TypeGroup, FetchFailure> {
        let locator = self.locate(TYPE, name)?;
        self.resource(&locator).await
    }

    pub fn stats(&self) -> FetchStats {
        FetchStats {
            network_attempts: self.network_attempts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cached_entries: self.cache.iter().filter(|slot| slot.value().initialized()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::transport::fake::FakeTransport;
    use serde_json::json;
    use tokio::time::Instant;

    const BASE: &str = "https://pokeapi.test/api/v2/";

    fn fetcher(fake: FakeTransport, governor: RateGovernor) -> Fetcher<FakeTransport> {
        Fetcher::new(fake, Url::parse(BASE).unwrap(), governor, RetryPolicy::default())
    }

    fn loc(path: &str) -> Locator {
        Locator::parse(&format!("{}{}", BASE, path)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_is_idempotent() {
        let fake = FakeTransport::new();
        fake.json(loc("pokemon/1/").as_str(), json!({"name": "bulbasaur"}));
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        let first = fetcher.fetch(&loc("pokemon/1")).await;
        let second = fetcher.fetch(&loc("pokemon/1/")).await;

        assert_eq!(first, second);
        assert_eq!(fetcher.transport().total_calls(), 1);
        let stats = fetcher.stats();
        assert_eq!(stats.network_attempts, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cached_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_fetch() {
        let url = loc("pokemon/25/");
        let fake = FakeTransport::new().with_latency(Duration::from_millis(50));
        fake.json(url.as_str(), json!({"name": "pikachu"}));
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        let results = futures::future::join_all((0..4).map(|_| fetcher.fetch(&url))).await;

        assert!(results.iter().all(|r| *r == results[0]));
        tokio_test::assert_ok!(&results[0]);
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 1);
        let stats = fetcher.stats();
        assert_eq!(stats.network_attempts, 1);
        assert_eq!(stats.cache_hits, 3);
        assert_eq!(stats.cached_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_failure() {
        let url = loc("pokemon/26/");
        let fake = FakeTransport::new().with_latency(Duration::from_millis(20));
        fake.status(url.as_str(), 500);
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        let results = futures::future::join_all((0..3).map(|_| fetcher.fetch(&url))).await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(FetchFailure::Exhausted { attempts: 3, .. }))));
        // One retry sequence, not one per caller.
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 3);
        assert_eq!(fetcher.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_with_backoff() {
        let url = loc("pokemon/2/");
        let fake = FakeTransport::new();
        fake.status(url.as_str(), 503)
            .broken(url.as_str())
            .json(url.as_str(), json!({"name": "ivysaur"}));
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        let start = Instant::now();
        let result = fetcher.fetch(&url).await;
        tokio_test::assert_ok!(&result);
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 3);
        // 100ms + 200ms of backoff.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_bounded_and_failure_cached() {
        let url = loc("pokemon/3/");
        let fake = FakeTransport::new();
        fake.status(url.as_str(), 500);
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        let result = fetcher.fetch(&url).await;
        assert!(matches!(
            result,
            Err(FetchFailure::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 3);

        // Known-bad endpoint is not hammered again within the run.
        let again = fetcher.fetch(&url).await;
        assert_eq!(again, result);
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 3);
        assert_eq!(fetcher.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_permanent() {
        let fetcher = fetcher(FakeTransport::new(), RateGovernor::unlimited());
        let url = loc("pokemon/99999/");

        let result = fetcher.fetch(&url).await;
        assert_eq!(result, Err(FetchFailure::Status { code: 404 }));
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_body_is_malformed() {
        let url = loc("pokemon/4/");
        let fake = FakeTransport::new();
        fake.raw(url.as_str(), "<html>oops</html>");
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        let result = fetcher.fetch(&url).await;
        assert!(matches!(result, Err(FetchFailure::Malformed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_fetch_bypasses_cached_failure() {
        let url = loc("pokemon/5/");
        let fake = FakeTransport::new();
        fake.status(url.as_str(), 404)
            .json(url.as_str(), json!({"name": "charmeleon"}));
        let fetcher = fetcher(fake, RateGovernor::unlimited());

        tokio_test::assert_err!(fetcher.fetch(&url).await);
        tokio_test::assert_err!(fetcher.fetch(&url).await);
        tokio_test::assert_ok!(fetcher.fetch_fresh(&url).await);
        tokio_test::assert_ok!(fetcher.fetch(&url).await);
        assert_eq!(fetcher.transport().calls_to(url.as_str()), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_cache_skips_the_governor() {
        let url = loc("pokemon/6/");
        let fake = FakeTransport::new();
        fake.json(url.as_str(), json!({"name": "charizard"}));
        let fetcher = fetcher(fake, RateGovernor::new(Duration::from_millis(100), 1));

        tokio_test::assert_ok!(fetcher.fetch(&url).await);

        let start = Instant::now();
        for _ in 0..10 {
            tokio_test::assert_ok!(fetcher.fetch(&url).await);
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(fetcher.governor.granted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_fetches_are_paced() {
        let fake = FakeTransport::new();
        for id in 1..=3 {
            fake.json(loc(&format!("pokemon/{}/", id)).as_str(), json!({"id": id}));
        }
        let fetcher = fetcher(fake, RateGovernor::new(Duration::from_millis(100), 1));

        let start = Instant::now();
        for id in 1..=3 {
            tokio_test::assert_ok!(fetcher.fetch(&loc(&format!("pokemon/{}/", id))).await);
        }
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_helpers_resolve_against_base() {
        let fake = FakeTransport::new();
        fake.json(
            loc("type/fire/").as_str(),
            json!({
                "name": "fire",
                "pokemon": [
                    {"slot": 1, "pokemon": {"name": "charmander", "url": format!("{}pokemon/4/", BASE)}}
                ]
            }),
        );
        let fetcher = Fetcher::new(
            fake,
            Url::parse("https://pokeapi.test/api/v2").unwrap(),
            RateGovernor::unlimited(),
            RetryPolicy::default(),
        );

        let group = fetcher.type_group("Fire").await.unwrap();
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].locator.key(), Some("4"));

        // Parsed fine as JSON, but not a species document.
        fetcher
            .transport()
            .json(loc("pokemon-species/fire/").as_str(), json!({"name": "fire"}));
        assert!(matches!(
            fetcher.species("fire").await,
            Err(FetchFailure::Malformed { .. })
        ));
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_budget_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 30,
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(policy.attempts(), MAX_ATTEMPTS);
        assert_eq!(policy.delay(6), MAX_BACKOFF);
        assert_eq!(policy.delay(29), MAX_BACKOFF);
        assert_eq!(policy.delay(u32::MAX), MAX_BACKOFF);

        let config = FetchConfig {
            max_attempts: 1_000,
            backoff_ms: 100,
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worst_case_item_stall_is_bounded() {
        let url = loc("pokemon/7/");
        let fake = FakeTransport::new();
        fake.status(url.as_str(), 503);
        let fetcher = Fetcher::new(
            fake,
            Url::parse(BASE).unwrap(),
            RateGovernor::unlimited(),
            RetryPolicy {
                max_attempts: u32::MAX,
                backoff_base: Duration::from_secs(1),
            },
        );

        let start = Instant::now();
        tokio_test::assert_err!(fetcher.fetch(&url).await);
        assert_eq!(fetcher.transport().calls_to(url.as_str()), MAX_ATTEMPTS as usize);
        // 1s + 2s + 4s, then 5s for each of the remaining six retries.
        assert!(start.elapsed() <= Duration::from_secs(37) + Duration::from_millis(100));
    }
}

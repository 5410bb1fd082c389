//! Remote resource access.
//!
//! Everything that touches the network goes through [`Fetcher`], which
//! owns the per-run cache and the shared [`RateGovernor`].

pub mod fetcher;
pub mod governor;
pub mod transport;

pub use fetcher::{FetchResult, FetchStats, Fetcher, RetryPolicy, MAX_ATTEMPTS, MAX_BACKOFF};
pub use governor::RateGovernor;
pub use transport::{HttpResponse, HttpTransport, Transport};

//! HTTP transport seam.
//!
//! The fetcher only needs "GET this URL, give me status and body". Keeping
//! that behind a trait lets the engine run against reqwest in production
//! and against an in-memory fake in tests.

use crate::config::ApiConfig;
use crate::error::FetchFailure;
use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Raw response of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One GET request. Errors are connection-level only; a 404 is an `Ok`
/// response with that status.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<HttpResponse, FetchFailure>> + Send;
}

/// Production transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout_seconds: u64,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            timeout_seconds: config.timeout_seconds,
        })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchFailure> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timed out after {}s", self.timeout_seconds)
            } else if e.is_connect() {
                format!("cannot connect: {}", e)
            } else {
                e.to_string()
            };
            FetchFailure::Transport { reason }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchFailure::Transport {
            reason: format!("failed to read body: {}", e),
        })?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub mod fake {
    //! Scripted in-memory transport.

    use super::*;
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    type Scripted = Result<HttpResponse, FetchFailure>;

    /// Answers from a per-URL script. The last scripted answer for a URL
    /// repeats; unscripted URLs answer 404.
    #[derive(Default)]
    pub struct FakeTransport {
        routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: Mutex<Vec<String>>,
        latency: Option<Duration>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        pub fn json(&self, url: &str, body: Value) -> &Self {
            self.push(
                url,
                Ok(HttpResponse {
                    status: 200,
                    body: body.to_string(),
                }),
            )
        }

        pub fn status(&self, url: &str, status: u16) -> &Self {
            self.push(
                url,
                Ok(HttpResponse {
                    status,
                    body: String::new(),
                }),
            )
        }

        pub fn raw(&self, url: &str, body: &str) -> &Self {
            self.push(
                url,
                Ok(HttpResponse {
                    status: 200,
                    body: body.to_string(),
                }),
            )
        }

        pub fn broken(&self, url: &str) -> &Self {
            self.push(
                url,
                Err(FetchFailure::Transport {
                    reason: "connection reset".to_string(),
                }),
            )
        }

        fn push(&self, url: &str, answer: Scripted) -> &Self {
            self.routes
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(answer);
            self
        }

        pub fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn answer(&self, url: &str) -> Scripted {
            self.calls.lock().unwrap().push(url.to_string());
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(url) {
                Some(script) if script.len() > 1 => script.pop_front().unwrap(),
                Some(script) => script.front().cloned().unwrap(),
                None => Ok(HttpResponse {
                    status: 404,
                    body: "Not Found".to_string(),
                }),
            }
        }
    }

    impl Transport for FakeTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse, FetchFailure> {
            let answer = self.answer(url);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            answer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fake_replays_script_then_repeats_last() {
        let fake = FakeTransport::new();
        fake.status("https://x.test/a/", 503)
            .json("https://x.test/a/", json!({"ok": true}));

        assert_eq!(fake.get("https://x.test/a/").await.unwrap().status, 503);
        assert_eq!(fake.get("https://x.test/a/").await.unwrap().status, 200);
        assert_eq!(fake.get("https://x.test/a/").await.unwrap().status, 200);
        assert_eq!(fake.get("https://x.test/missing/").await.unwrap().status, 404);
        assert_eq!(fake.calls_to("https://x.test/a/"), 3);
    }

    #[test]
    fn test_success_range() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());
        let not_found = HttpResponse {
            status: 404,
            body: String::new(),
        };
        assert!(!not_found.is_success());
    }
}

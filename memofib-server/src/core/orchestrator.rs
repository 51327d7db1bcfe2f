use super::error::{FibError, Result};
use super::fibonacci::{fibonacci, fibonacci_until};
use crate::cache::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, warn};

/// What happens to a computation whose request went away
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    /// Let the computation and the cache write finish in the background
    #[default]
    Detach,
    /// Stop the computation and skip the cache write
    Propagate,
}

/// Terminal state of a request that passed input validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(i64),
    Cancelled,
}

/// Cache-aside Fibonacci computation, shared by every request
#[derive(Clone)]
pub struct FibService {
    cache: Arc<dyn Cache>,
    expiration: Duration,
    policy: CancelPolicy,
    deadline: Option<Duration>,
}

impl FibService {
    pub fn new(cache: Arc<dyn Cache>, expiration: Duration) -> Self {
        Self {
            cache,
            expiration,
            policy: CancelPolicy::default(),
            deadline: None,
        }
    }

    pub fn with_policy(mut self, policy: CancelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Give up on requests that take longer than `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Parse the raw path parameter as a base-10 `i64`
    pub fn parse_input(raw: &str) -> Result<i64> {
        raw.parse::<i64>().map_err(|e| {
            error!(param = %raw, error = %e, "cannot parse path value");
            FibError::InvalidInput(raw.to_string())
        })
    }

    /// Resolve `F(n)` for the raw parameter.
    ///
    /// The lookup, the computation and the cache write run on one blocking
    /// task; this future waits for whichever comes first of that task,
    /// `cancel`, and the deadline. On cancellation nothing is returned for the
    /// client and the task is left to the configured [`CancelPolicy`].
    pub async fn resolve(&self, raw: &str, cancel: CancellationToken) -> Result<Outcome> {
        let n = Self::parse_input(raw)?;

        let cache = self.cache.clone();
        let expiration = self.expiration;
        let policy = self.policy;
        // A detached task must outlive the request, cache write included
        let ctx = match policy {
            CancelPolicy::Detach => CancellationToken::new(),
            CancelPolicy::Propagate => cancel.clone(),
        };
        let span = Span::current();

        let mut task = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            lookup_or_compute(cache.as_ref(), &ctx, n, expiration, policy)
        });

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!(n, "request cancelled");
                Ok(Outcome::Cancelled)
            }

            _ = deadline(self.deadline) => {
                cancel.cancel();
                info!(n, "request deadline exceeded");
                Ok(Outcome::Cancelled)
            }

            joined = &mut task => match joined {
                Ok(Some(value)) => Ok(Outcome::Completed(value)),
                // Only reachable when the computation observed the token
                Ok(None) => Ok(Outcome::Cancelled),
                Err(e) => {
                    error!(n, error = %e, "fib task failed");
                    Err(FibError::Internal(e.to_string()))
                }
            },
        }
    }
}

async fn deadline(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// Body of the per-request task: cache lookup, then compute and store on miss.
///
/// Returns `None` if the computation was abandoned under
/// [`CancelPolicy::Propagate`].
fn lookup_or_compute(
    cache: &dyn Cache,
    ctx: &CancellationToken,
    n: i64,
    expiration: Duration,
    policy: CancelPolicy,
) -> Option<i64> {
    let key = n.to_string();

    match cache.get(ctx, &key) {
        Ok(cached) => match cached.parse::<i64>() {
            Ok(value) => {
                debug!(n, value = %cached, "cache hit; returning the cached value");
                return Some(value);
            }
            Err(e) => {
                warn!(n, value = %cached, error = %e, "cached value is not a number; recalculating")
            }
        },
        Err(e) => {
            debug!(n, cache_error = %e, kind = e.kind(), "cache miss; calculating fib(n)")
        }
    }

    let value = match policy {
        CancelPolicy::Detach => fibonacci(n),
        CancelPolicy::Propagate => match fibonacci_until(n, ctx) {
            Some(value) => value,
            None => {
                debug!(n, "calculation abandoned");
                return None;
            }
        },
    };
    debug!(n, result = value, "fib(n) calculated");

    if let Err(e) = cache.set(ctx, &key, &value.to_string(), expiration) {
        error!(n, error = %e, "cannot set cache");
    }

    Some(value)
}

use crate::engine::{Action, Output, Request};
use crate::error::OrmResult;
use crate::middleware::{Middleware, Next};
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Middleware collecting request statistics.
#[derive(Default)]
pub struct StatsMiddleware {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_duration_nanos: AtomicU64,
    max_duration_nanos: AtomicU64,
    by_action: Mutex<BTreeMap<Action, u64>>,
    slowest: Mutex<Option<(Option<String>, Action)>>,
}

/// Collected request statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestStats {
    /// Total number of requests.
    pub total_requests: u64,
    /// Requests that returned an error.
    pub failed_requests: u64,
    /// Total time spent in the rest of the chain.
    pub total_duration: Duration,
    /// Slowest request duration.
    pub max_duration: Duration,
    /// Requests per action.
    pub by_action: BTreeMap<Action, u64>,
    /// Model and action of the slowest request.
    pub slowest: Option<(Option<String>, Action)>,
}

impl RequestStats {
    /// Number of requests for `action`.
    pub fn count(&self, action: Action) -> u64 {
        self.by_action.get(&action).copied().unwrap_or(0)
    }

    /// Number of data-mutating requests.
    pub fn mutations(&self) -> u64 {
        self.by_action
            .iter()
            .filter(|(action, _)| action.is_mutation())
            .map(|(_, n)| n)
            .sum()
    }
}

impl StatsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn stats(&self) -> RequestStats {
        RequestStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed)),
            max_duration: Duration::from_nanos(self.max_duration_nanos.load(Ordering::Relaxed)),
            by_action: self.by_action.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            slowest: self.slowest.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.total_duration_nanos.store(0, Ordering::Relaxed);
        self.max_duration_nanos.store(0, Ordering::Relaxed);
        self.by_action.lock().unwrap_or_else(|e| e.into_inner()).clear();
        *self.slowest.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn record(&self, model: Option<String>, action: Action, duration: Duration, failed: bool) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_nanos.fetch_add(nanos, Ordering::Relaxed);
        *self
            .by_action
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(action)
            .or_default() += 1;

        // Only touch the slowest slot when this request becomes the new max.
        let previous = self.max_duration_nanos.fetch_max(nanos, Ordering::Relaxed);
        if nanos > previous {
            *self.slowest.lock().unwrap_or_else(|e| e.into_inner()) = Some((model, action));
        }
    }
}

impl Middleware for StatsMiddleware {
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, OrmResult<Output>> {
        Box::pin(async move {
            let model = request.model.clone();
            let action = request.action;
            let start = Instant::now();
            let result = next.run(request).await;
            self.record(model, action, start.elapsed(), result.is_err());
            result
        })
    }
}

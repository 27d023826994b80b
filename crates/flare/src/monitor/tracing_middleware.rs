use crate::engine::{Output, Request};
use crate::error::OrmResult;
use crate::middleware::{Middleware, Next};
use futures_util::future::BoxFuture;
use std::time::{Duration, Instant};
use tracing::Level;

/// A `tracing`-based middleware that emits one event per request.
///
/// Events carry the model, action, elapsed time and either the number of
/// affected records or the error. Requests slower than the slow threshold are
/// additionally reported at `WARN`.
#[derive(Debug, Clone)]
pub struct TracingMiddleware {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Report requests slower than this at `WARN`. `None` disables it.
    pub slow_threshold: Option<Duration>,
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            slow_threshold: None,
        }
    }
}

impl TracingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    fn emit(&self, model: &str, action: &str, elapsed: Duration, result: &OrmResult<Output>) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        match result {
            Ok(output) => emit_at_level!(
                self.level,
                target: "flare.query",
                model,
                action,
                elapsed_ms,
                affected = output.affected(),
                "request completed"
            ),
            Err(error) => emit_at_level!(
                self.level,
                target: "flare.query",
                model,
                action,
                elapsed_ms,
                %error,
                "request failed"
            ),
        }

        if self.slow_threshold.is_some_and(|threshold| elapsed > threshold) {
            tracing::warn!(target: "flare.query", model, action, elapsed_ms, "slow request");
        }
    }
}

impl Middleware for TracingMiddleware {
    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> BoxFuture<'a, OrmResult<Output>> {
        Box::pin(async move {
            let model = request.model.clone().unwrap_or_else(|| "-".to_string());
            let action = request.action;
            let start = Instant::now();
            let result = next.run(request).await;
            self.emit(&model, action.as_str(), start.elapsed(), &result);
            result
        })
    }
}

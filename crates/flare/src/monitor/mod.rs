//! Request monitoring middleware.
//!
//! - [`TracingMiddleware`]: one `tracing` event per request (target `flare.query`)
//! - [`StatsMiddleware`]: in-process counters and timings
//!
//! # Example
//!
//! ```rust,ignore
//! use flare::monitor::{StatsMiddleware, TracingMiddleware};
//! use std::time::Duration;
//!
//! let stats = Arc::new(StatsMiddleware::new());
//! let client = Client::new(engine)
//!     .with_middleware(TracingMiddleware::new().slow_threshold(Duration::from_millis(200)))
//!     .with_middleware_arc(stats.clone());
//!
//! // ...
//! println!("{} requests, {} failed", stats.stats().total_requests, stats.stats().failed_requests);
//! ```

mod stats;
mod tracing_middleware;


pub use stats::{RequestStats, StatsMiddleware};
pub use tracing_middleware::TracingMiddleware;

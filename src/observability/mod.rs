//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, per-request log stage)
//!     → metrics.rs (counters, histograms)
//!     → alert.rs (webhook alerts for security findings)
//!
//! Consumers:
//!     → stdout (JSON in production)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Chat webhook
//! ```

pub mod alert;
pub mod logging;
pub mod metrics;

pub use alert::AlertSink;
pub use logging::{init_tracing, log_requests};

//! Traffic capture and publishing.
//!
//! # Data Flow
//! ```text
//! Request
//!     → logger.rs (buffer body up to the cap, remember a bounded copy)
//!     → downstream pipeline
//!     → tee.rs (record response bytes while streaming them unchanged)
//!     → on completion: sanitizer.rs (skip on sensitive headers, redact fields)
//!     → store publish, detached
//! ```

pub mod logger;
pub mod sanitizer;
pub mod tee;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use logger::{traffic_middleware, TrafficLogger};
pub use sanitizer::Sanitizer;
pub use tee::{on_body_sent, TeeBody};

/// One sanitized request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLogEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub request_body: String,
    pub status: u16,
    pub response_body: String,
    /// Human-readable elapsed time, e.g. `12.5ms`.
    pub duration: String,
}

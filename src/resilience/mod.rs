//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to primary upstream:
//!     → transport failure? retries.rs (jittered backoff, bounded attempts)
//!     → still failing? proxy::ghost (serve cached response or 502)
//! ```

pub mod retries;

pub use retries::RetryPolicy;

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → fuzzer.rs (observes only; replays after the response is produced)
//!     → ip_filter.rs (blocklist lookup, fail open on store errors)
//!     → rate_limit.rs (per-client sliding window)
//!     → Pass to canary / proxy
//! ```
//!
//! Client identity for both checks comes from client.rs.

pub mod client;
pub mod fuzzer;
pub mod ip_filter;
pub mod rate_limit;

pub use fuzzer::{fuzz_middleware, SecurityFuzzer};
pub use ip_filter::{ip_filter_middleware, FilterDecision, IpFilter};
pub use rate_limit::{rate_limit_middleware, SlidingWindowLimiter};

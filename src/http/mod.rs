//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (pipeline composition, serve with connect info)
//!     → request.rs (correlation id, bounded body buffering)
//!     → [security, chaos, traffic and proxy stages]
//!     → handlers.rs (/healthz, /api/blocked-ips)
//!     → response.rs (JSON errors, X-Powered-By, panic response)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;

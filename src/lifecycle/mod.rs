//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Open store → Probe store → Start listener
//!
//! Runtime (background.rs):
//!     Detached work (traffic publish, fuzzing) → bounded pool or dropped
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → broadcast → stop accepting, stop sweeps → exit
//! ```

pub mod background;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use background::BackgroundTasks;
pub use shutdown::Shutdown;

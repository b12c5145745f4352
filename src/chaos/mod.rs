//! Chaos injection subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → settings.rs (snapshot, refreshed from store at most once per TTL)
//!     → regions.rs (static region latency, if configured)
//!     → injector.rs (sleep region + dynamic delay, maybe fail with 500)
//!     → next stage
//! ```

pub mod injector;
pub mod regions;
pub mod settings;

pub use injector::{chaos_middleware, ChaosInjector, ChaosPlan};
pub use regions::RegionProfile;
pub use settings::{ChaosSettings, SettingsCache};

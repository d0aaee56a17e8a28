//! Fragment render cache.
//!
//! Derives content-addressed keys for fragments, records which data items a
//! render consumed and which artifacts it produced, and indexes those
//! records so a content change can invalidate exactly the affected entries.
//!
//! ```toml
//! [cache]
//! enabled = true
//! single_flight = true
//! single_flight_wait_ms = 2000
//! ```

mod config;
pub mod deps;
mod error;
mod inflight;
pub mod keys;
mod lock;
pub mod marker;
pub mod metrics;
mod registry;

pub use config::FragmentCacheConfig;
pub use deps::DependencyTracker;
pub use error::CacheError;
pub use inflight::{Flight, InFlightRenders, RenderGuard, RenderWaiter};
pub use keys::{derive_cache_key, filter_requirements, fragment_path, rendition_path};
pub use marker::{Eviction, RenditionError, RenditionLedger, RenditionMarker};
pub use registry::{RenditionKey, RenditionRegistry};

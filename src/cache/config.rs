//! Fragment cache configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_SINGLE_FLIGHT_WAIT_MS: u64 = 2_000;

/// Runtime switches for the fragment render cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FragmentCacheConfig {
    /// Serve and populate fragments through the content store.
    pub enabled: bool,
    /// Collapse concurrent renders of one uncached key into a single render.
    pub single_flight: bool,
    /// How long a follower waits for the leader before rendering itself (ms).
    pub single_flight_wait_ms: u64,
}

impl Default for FragmentCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            single_flight: true,
            single_flight_wait_ms: DEFAULT_SINGLE_FLIGHT_WAIT_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for FragmentCacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            single_flight: settings.single_flight,
            single_flight_wait_ms: u64::try_from(settings.single_flight_wait.as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

impl FragmentCacheConfig {
    pub fn single_flight_wait(&self) -> Duration {
        Duration::from_millis(self.single_flight_wait_ms)
    }

    /// Configuration that renders every fragment without touching the store.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

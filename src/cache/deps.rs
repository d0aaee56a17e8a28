//! Dependency tracking for fragment renders.
//!
//! A tracker accumulates the data items a render consumed (`requires`) and
//! the cache artifacts it produced (`produces`). Clones share one
//! accumulator, so a tracker can travel inside the render context and be
//! read back by whoever created it. Each cache-populating fragment renders
//! with its own tracker which is merged into the enclosing one afterwards.

use std::sync::{Arc, Mutex};

use crate::domain::fragments::FragmentDependencies;

use super::lock;

#[derive(Debug, Clone, Default)]
pub struct DependencyTracker {
    inner: Arc<Mutex<FragmentDependencies>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an upstream data item the current render consumed.
    pub fn add_requires(&self, item: impl Into<String>) {
        lock::mutex(&self.inner, "deps::add_requires")
            .requires
            .insert(item.into());
    }

    /// Record a cache artifact the current render produced.
    pub fn add_produces(&self, item: impl Into<String>) {
        lock::mutex(&self.inner, "deps::add_produces")
            .produces
            .insert(item.into());
    }

    pub fn snapshot(&self) -> FragmentDependencies {
        lock::mutex(&self.inner, "deps::snapshot").clone()
    }

    /// Fold another set of dependencies into this tracker.
    pub fn merge(&self, other: &FragmentDependencies) {
        lock::mutex(&self.inner, "deps::merge").extend(other);
    }

    /// Whether two handles share the same accumulator.
    pub fn same_as(&self, other: &DependencyTracker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

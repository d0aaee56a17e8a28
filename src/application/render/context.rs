//! Request-scoped render context.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::{DependencyTracker, FragmentCacheConfig, InFlightRenders, RenditionMarker};
use crate::domain::fragments::{PageDescriptor, TenantScope};
use crate::infra::store::ContentStore;

use super::evaluator::ExpressionEvaluator;

/// Everything a fragment render needs, passed explicitly down the render tree.
///
/// Cloning is cheap. Clones share the dependency tracker; use
/// [`RenderContext::for_fragment`] to start an isolated one.
#[derive(Clone)]
pub struct RenderContext {
    scope: TenantScope,
    store: Arc<dyn ContentStore>,
    marker: Arc<dyn RenditionMarker>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    page: Option<PageDescriptor>,
    tracker: DependencyTracker,
    data: Arc<Value>,
    inflight: Option<InFlightRenders>,
    config: FragmentCacheConfig,
}

impl RenderContext {
    pub fn builder(
        scope: TenantScope,
        store: Arc<dyn ContentStore>,
        marker: Arc<dyn RenditionMarker>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> RenderContextBuilder {
        RenderContextBuilder {
            context: Self {
                scope,
                store,
                marker,
                evaluator,
                page: None,
                tracker: DependencyTracker::new(),
                data: Arc::new(Value::Null),
                inflight: None,
                config: FragmentCacheConfig::default(),
            },
        }
    }

    /// Context for a cache-populating fragment: same collaborators, fresh tracker.
    pub fn for_fragment(&self) -> Self {
        Self {
            tracker: DependencyTracker::new(),
            ..self.clone()
        }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn marker(&self) -> &Arc<dyn RenditionMarker> {
        &self.marker
    }

    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.evaluator
    }

    pub fn page(&self) -> Option<&PageDescriptor> {
        self.page.as_ref()
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn inflight(&self) -> Option<&InFlightRenders> {
        self.inflight.as_ref()
    }

    pub fn config(&self) -> &FragmentCacheConfig {
        &self.config
    }
}

pub struct RenderContextBuilder {
    context: RenderContext,
}

impl RenderContextBuilder {
    pub fn page(mut self, page: PageDescriptor) -> Self {
        self.context.page = Some(page);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.context.data = Arc::new(data);
        self
    }

    pub fn tracker(mut self, tracker: DependencyTracker) -> Self {
        self.context.tracker = tracker;
        self
    }

    pub fn inflight(mut self, inflight: InFlightRenders) -> Self {
        self.context.inflight = Some(inflight);
        self
    }

    pub fn config(mut self, config: FragmentCacheConfig) -> Self {
        self.context.config = config;
        self
    }

    pub fn build(self) -> RenderContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::application::render::evaluator::InterpolatingEvaluator;
    use crate::application::render::testing::context_with;

    #[test]
    fn fragment_context_gets_its_own_tracker() {
        let ctx = context_with(Arc::new(InterpolatingEvaluator::new()), json!({}));
        let shared = ctx.clone();
        let fragment = ctx.for_fragment();

        assert!(shared.tracker().same_as(ctx.tracker()));
        assert!(!fragment.tracker().same_as(ctx.tracker()));

        fragment.tracker().add_requires("asset:logo");
        assert!(ctx.tracker().snapshot().requires.is_empty());
        assert_eq!(fragment.scope(), ctx.scope());
    }
}

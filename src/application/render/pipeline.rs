//! Application-owned fragment cache service.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{FragmentCacheConfig, InFlightRenders, RenditionLedger, RenditionRegistry};
use crate::domain::fragments::{FragmentDependencies, PageDescriptor, TenantScope};
use crate::infra::store::ContentStores;

use super::chunk::{Chunk, ClientStream};
use super::context::RenderContext;
use super::evaluator::{ExpressionEvaluator, FragmentBody};
use super::types::RenderError;

/// Long-lived collaborators shared by every render: store bindings, the
/// rendition index, in-flight renders and the expression evaluator.
pub struct FragmentCache {
    config: FragmentCacheConfig,
    stores: Arc<ContentStores>,
    registry: Arc<RenditionRegistry>,
    inflight: InFlightRenders,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl FragmentCache {
    pub fn new(
        config: FragmentCacheConfig,
        stores: Arc<ContentStores>,
        evaluator: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        Self {
            config,
            stores,
            registry: Arc::new(RenditionRegistry::new()),
            inflight: InFlightRenders::new(),
            evaluator,
        }
    }

    pub fn config(&self) -> &FragmentCacheConfig {
        &self.config
    }

    pub fn stores(&self) -> &Arc<ContentStores> {
        &self.stores
    }

    pub fn registry(&self) -> &Arc<RenditionRegistry> {
        &self.registry
    }

    pub fn inflight(&self) -> &InFlightRenders {
        &self.inflight
    }

    /// Rendition ledger for one tenant scope.
    pub fn ledger(&self, scope: &TenantScope) -> RenditionLedger {
        RenditionLedger::new(
            scope.clone(),
            self.stores.bind(scope),
            Arc::clone(&self.registry),
        )
    }

    /// Build the render context for one page request.
    pub fn context(
        &self,
        scope: &TenantScope,
        page: Option<PageDescriptor>,
        data: Value,
    ) -> RenderContext {
        let mut builder = RenderContext::builder(
            scope.clone(),
            self.stores.bind(scope),
            Arc::new(self.ledger(scope)),
            Arc::clone(&self.evaluator),
        )
        .data(data)
        .inflight(self.inflight.clone())
        .config(self.config.clone());
        if let Some(page) = page {
            builder = builder.page(page);
        }
        builder.build()
    }

    /// Render a page body to a client and return what the page depended on.
    pub async fn render_page(
        &self,
        scope: &TenantScope,
        page: PageDescriptor,
        data: Value,
        body: &dyn FragmentBody,
        client: ClientStream,
    ) -> Result<FragmentDependencies, RenderError> {
        let ctx = self.context(scope, Some(page), data);
        let mut chunk = Chunk::streaming(client);
        body.render(&mut chunk, &ctx).await?;
        chunk.finish();

        let dependencies = ctx.tracker().snapshot();
        debug!(
            op = "fragment_cache::render_page",
            scope = %scope,
            requires = dependencies.requires.len(),
            produces = dependencies.produces.len(),
            "Page rendered"
        );
        Ok(dependencies)
    }

    /// Drop store bindings and the in-process rendition index.
    pub fn reset(&self) {
        self.stores.reset();
        self.registry.clear();
    }
}

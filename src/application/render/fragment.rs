//! Fragment cache read path and render-and-populate path.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::cache::metrics::{
    METRIC_FRAGMENT_HIT, METRIC_FRAGMENT_MARK_ERROR, METRIC_FRAGMENT_MISS,
    METRIC_FRAGMENT_READ_ERROR, METRIC_FRAGMENT_RENDER_MS, METRIC_FRAGMENT_WRITE_ERROR,
    METRIC_SINGLE_FLIGHT_WAIT,
};
use crate::cache::{
    CacheError, Flight, RenditionMarker, derive_cache_key, filter_requirements, fragment_path,
};
use crate::domain::error::DomainError;
use crate::domain::fragments::{
    CacheKey, FragmentDependencies, FragmentDescriptor, FragmentId, RequirementSet,
};
use crate::infra::store::{ContentStore, StoreError};

use super::chunk::Chunk;
use super::context::RenderContext;
use super::evaluator::FragmentBody;
use super::requirements::resolve_requirement_map;
use super::types::{CacheLookup, DirectiveOutcome, RenderError, RenderOutcome, ServeOutcome};

/// A fragment reference as it appears in a template: an identity expression
/// plus named requirement expressions.
#[derive(Debug, Clone, Default)]
pub struct FragmentDirective {
    id_expr: String,
    requirements: Vec<(String, String)>,
}

impl FragmentDirective {
    pub fn new(id_expr: impl Into<String>) -> Self {
        Self {
            id_expr: id_expr.into(),
            requirements: Vec::new(),
        }
    }

    pub fn require(
        mut self,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if self.requirements.iter().any(|(existing, _)| *existing == name) {
            return Err(DomainError::duplicate_requirement(name));
        }
        self.requirements.push((name, expression.into()));
        Ok(self)
    }

    pub fn id_expr(&self) -> &str {
        &self.id_expr
    }

    pub fn requirements(&self) -> &[(String, String)] {
        &self.requirements
    }
}

/// Read a stored fragment artifact.
pub async fn lookup(store: &dyn ContentStore, fragment: &FragmentId, key: &CacheKey) -> CacheLookup {
    match store.read(&fragment_path(fragment, key)).await {
        Ok(Some(bytes)) => CacheLookup::Hit(bytes),
        Ok(None) => CacheLookup::Miss,
        Err(err) => CacheLookup::Error(err),
    }
}

/// Serve a fragment from the store if a rendered artifact exists.
///
/// Without an identity nothing is looked up. A read failure is logged and
/// reported as a miss so the caller renders instead.
pub async fn serve_fragment(
    fragment: Option<&FragmentId>,
    requirements: &RequirementSet,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<ServeOutcome, RenderError> {
    let Some(fragment) = fragment else {
        return Ok(ServeOutcome::Bypass);
    };
    let key = derive_cache_key(fragment, &filter_requirements(requirements.clone()));
    serve_key(fragment, key, chunk, ctx).await
}

async fn serve_key(
    fragment: &FragmentId,
    key: CacheKey,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<ServeOutcome, RenderError> {
    let bytes = match lookup(ctx.store().as_ref(), fragment, &key).await {
        CacheLookup::Hit(bytes) => bytes,
        CacheLookup::Miss => {
            counter!(METRIC_FRAGMENT_MISS).increment(1);
            debug!(
                op = "fragment::serve",
                fragment = %fragment,
                cache_key = %key,
                result = "miss",
                "Fragment not cached"
            );
            return Ok(ServeOutcome::Missed { key, error: None });
        }
        CacheLookup::Error(err) => return Ok(read_failed(fragment, key, err)),
    };

    let text = match String::from_utf8(bytes.to_vec()) {
        Ok(text) => text,
        Err(err) => {
            let corrupt = StoreError::Corrupt {
                path: fragment_path(fragment, &key),
                reason: err.to_string(),
            };
            return Ok(read_failed(fragment, key, corrupt));
        }
    };

    let mut boundary = chunk.boundary();
    boundary.write(&text)?;
    let emitted = boundary.commit()?;
    drop(boundary);

    record_hit_dependencies(fragment, &key, ctx).await;
    counter!(METRIC_FRAGMENT_HIT).increment(1);
    debug!(
        op = "fragment::serve",
        fragment = %fragment,
        cache_key = %key,
        result = "hit",
        bytes = text.len(),
        "Fragment served from store"
    );
    Ok(ServeOutcome::Served {
        key,
        bytes: emitted,
    })
}

fn read_failed(fragment: &FragmentId, key: CacheKey, err: StoreError) -> ServeOutcome {
    counter!(METRIC_FRAGMENT_READ_ERROR).increment(1);
    warn!(
        op = "fragment::serve",
        fragment = %fragment,
        cache_key = %key,
        result = "read_error",
        error = %err,
        "Fragment read failed, rendering instead"
    );
    ServeOutcome::Missed {
        key,
        error: Some(err),
    }
}

/// Fold the stored dependencies of a served fragment into the enclosing tracker.
async fn record_hit_dependencies(fragment: &FragmentId, key: &CacheKey, ctx: &RenderContext) {
    match ctx.marker().lookup(fragment, key).await {
        Ok(Some(record)) => ctx.tracker().merge(&record.dependencies),
        Ok(None) => {}
        Err(err) => debug!(
            op = "fragment::serve",
            fragment = %fragment,
            cache_key = %key,
            error = %err,
            "Rendition record unavailable for served fragment"
        ),
    }
    ctx.tracker().add_produces(key.as_str());
}

/// Render a fragment and populate the cache with the result.
///
/// Without an identity the body renders straight into `chunk`. Otherwise the
/// body renders in isolation, the enclosing prefix and the fragment text are
/// committed to the client, and the fragment text is stored and marked.
/// Population failures are reported in the outcome and never fail the render.
pub async fn render_fragment(
    fragment: Option<&FragmentId>,
    requirements: &RequirementSet,
    body: &dyn FragmentBody,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<RenderOutcome, RenderError> {
    let Some(fragment) = fragment else {
        return render_uncached(body, chunk, ctx).await;
    };
    let key = derive_cache_key(fragment, &filter_requirements(requirements.clone()));
    populate(fragment, key, body, chunk, ctx).await
}

async fn render_uncached(
    body: &dyn FragmentBody,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<RenderOutcome, RenderError> {
    body.render(chunk, ctx).await?;
    chunk.flush();
    Ok(RenderOutcome::Uncached)
}

async fn populate(
    fragment: &FragmentId,
    key: CacheKey,
    body: &dyn FragmentBody,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<RenderOutcome, RenderError> {
    let started = Instant::now();
    let fragment_ctx = ctx.for_fragment();

    let mut boundary = chunk.boundary();
    let mut body_chunk = Chunk::capture();
    body.render(&mut body_chunk, &fragment_ctx).await?;
    let rendered = body_chunk.finish();
    boundary.write(&rendered)?;
    boundary.commit()?;
    drop(boundary);

    fragment_ctx.tracker().add_produces(key.as_str());
    let dependencies = fragment_ctx.tracker().snapshot();
    ctx.tracker().merge(&dependencies);

    let descriptor = FragmentDescriptor::fragment(fragment.clone(), key.clone(), ctx.page());
    let persisted = tokio::spawn(persist(
        Arc::clone(ctx.store()),
        Arc::clone(ctx.marker()),
        Bytes::from(rendered),
        descriptor,
        dependencies,
    ))
    .await
    .unwrap_or_else(|err| Err(CacheError::Aborted(err.to_string())));

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_FRAGMENT_RENDER_MS).record(elapsed_ms);

    match persisted {
        Ok(()) => {
            debug!(
                op = "fragment::render",
                fragment = %fragment,
                cache_key = %key,
                result = "populated",
                elapsed_ms,
                "Fragment rendered and cached"
            );
            Ok(RenderOutcome::Populated { key })
        }
        Err(error) => {
            match &error {
                CacheError::Write { .. } => counter!(METRIC_FRAGMENT_WRITE_ERROR).increment(1),
                CacheError::Mark { .. } => counter!(METRIC_FRAGMENT_MARK_ERROR).increment(1),
                CacheError::Aborted(_) => {}
            }
            warn!(
                op = "fragment::render",
                fragment = %fragment,
                cache_key = %key,
                result = "population_failed",
                elapsed_ms,
                error = %error,
                "Fragment rendered but cache population failed"
            );
            Ok(RenderOutcome::PopulationFailed { key, error })
        }
    }
}

// Runs detached from the request so a client disconnect cannot cancel it halfway.
async fn persist(
    store: Arc<dyn ContentStore>,
    marker: Arc<dyn RenditionMarker>,
    rendered: Bytes,
    descriptor: FragmentDescriptor,
    dependencies: FragmentDependencies,
) -> Result<(), CacheError> {
    let path = fragment_path(&descriptor.fragment_id, &descriptor.cache_key);
    store
        .write(&path, rendered)
        .await
        .map_err(|source| CacheError::Write { path, source })?;
    marker
        .mark(&descriptor, &dependencies)
        .await
        .map_err(|source| CacheError::Mark {
            fragment: descriptor.fragment_id.to_string(),
            source,
        })
}

/// Full directive pipeline: resolve, serve, coordinate, render.
pub async fn render_cached(
    directive: &FragmentDirective,
    body: &dyn FragmentBody,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<DirectiveOutcome, RenderError> {
    let resolved_id = ctx
        .evaluator()
        .render_expression(directive.id_expr(), ctx)
        .await?;
    let fragment = match FragmentId::from_resolved(&resolved_id) {
        Ok(fragment) => fragment,
        Err(err) => {
            warn!(
                op = "fragment::render_cached",
                identity = %resolved_id,
                error = %err,
                "Unusable fragment identity, rendering uncached"
            );
            None
        }
    };
    let requirements = resolve_requirement_map(directive.requirements(), ctx).await?;

    let fragment = match fragment {
        Some(fragment) if ctx.config().enabled => fragment,
        _ => {
            return render_uncached(body, chunk, ctx)
                .await
                .map(DirectiveOutcome::Rendered);
        }
    };

    let key = derive_cache_key(&fragment, &filter_requirements(requirements));
    if let Some(outcome) = try_serve(&fragment, &key, chunk, ctx).await? {
        return Ok(outcome);
    }

    let flight = match ctx.inflight() {
        Some(inflight) if ctx.config().single_flight => {
            let flight_key = format!("{}/{}", ctx.scope(), fragment_path(&fragment, &key));
            Some(inflight.acquire(&flight_key))
        }
        _ => None,
    };

    match flight {
        Some(Flight::Leader(guard)) => {
            let outcome = populate(&fragment, key, body, chunk, ctx).await;
            drop(guard);
            outcome.map(DirectiveOutcome::Rendered)
        }
        Some(Flight::Follower(waiter)) => {
            counter!(METRIC_SINGLE_FLIGHT_WAIT).increment(1);
            let finished = waiter.wait(ctx.config().single_flight_wait()).await;
            debug!(
                op = "fragment::render_cached",
                fragment = %fragment,
                cache_key = %key,
                leader_finished = finished,
                "Waited on concurrent render"
            );
            if let Some(outcome) = try_serve(&fragment, &key, chunk, ctx).await? {
                return Ok(outcome);
            }
            populate(&fragment, key, body, chunk, ctx)
                .await
                .map(DirectiveOutcome::Rendered)
        }
        None => populate(&fragment, key, body, chunk, ctx)
            .await
            .map(DirectiveOutcome::Rendered),
    }
}

async fn try_serve(
    fragment: &FragmentId,
    key: &CacheKey,
    chunk: &mut Chunk,
    ctx: &RenderContext,
) -> Result<Option<DirectiveOutcome>, RenderError> {
    match serve_key(fragment, key.clone(), chunk, ctx).await? {
        ServeOutcome::Served { key, .. } => Ok(Some(DirectiveOutcome::Served { key })),
        ServeOutcome::Missed { .. } | ServeOutcome::Bypass => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::application::render::evaluator::{InterpolatingEvaluator, TemplateBody};
    use crate::application::render::testing::context_with;

    #[test]
    fn directive_rejects_duplicate_requirement_names() {
        let directive = FragmentDirective::new("hero")
            .require("locale", "{locale}")
            .expect("first requirement");
        assert!(directive.require("locale", "{other}").is_err());
    }

    #[tokio::test]
    async fn absent_identity_bypasses_the_store() {
        let ctx = context_with(Arc::new(InterpolatingEvaluator::new()), json!({}));
        let mut chunk = Chunk::capture();

        let served = serve_fragment(None, &RequirementSet::new(), &mut chunk, &ctx)
            .await
            .expect("serve");
        assert!(matches!(served, ServeOutcome::Bypass));

        let body = TemplateBody::new("<p>plain</p>");
        let rendered = render_fragment(None, &RequirementSet::new(), &body, &mut chunk, &ctx)
            .await
            .expect("render");
        assert!(matches!(rendered, RenderOutcome::Uncached));
        assert_eq!(chunk.finish(), "<p>plain</p>");
        assert!(ctx.store().list("").await.expect("list").is_empty());
        assert!(ctx.tracker().snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_body_keeps_enclosing_prefix() {
        let ctx = context_with(Arc::new(InterpolatingEvaluator::new()), json!({}));
        let fragment = FragmentId::new("broken").expect("valid id");
        let mut chunk = Chunk::capture();
        chunk.write("<main>");

        let body = TemplateBody::new("{unterminated");
        let err = render_fragment(Some(&fragment), &RequirementSet::new(), &body, &mut chunk, &ctx)
            .await
            .expect_err("expression fails");
        assert!(matches!(err, RenderError::Expression(_)));
        assert_eq!(chunk.buffered(), "<main>");
        assert!(ctx.store().list("").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn blank_identity_expression_renders_uncached() {
        let ctx = context_with(
            Arc::new(InterpolatingEvaluator::new()),
            json!({ "name": "  " }),
        );
        let directive = FragmentDirective::new("{name}");
        let mut chunk = Chunk::capture();

        let outcome = render_cached(&directive, &TemplateBody::new("x"), &mut chunk, &ctx)
            .await
            .expect("render");
        assert!(outcome.key().is_none());
        assert_eq!(chunk.finish(), "x");
    }
}

//! Page and fragment bodies composed from template text and nested directives.

use std::sync::Arc;

use async_trait::async_trait;

use super::chunk::Chunk;
use super::context::RenderContext;
use super::evaluator::{FragmentBody, TemplateBody};
use super::fragment::{FragmentDirective, render_cached};
use super::types::RenderError;

/// One piece of a layout.
#[derive(Clone)]
pub enum LayoutPart {
    Template(TemplateBody),
    Fragment {
        directive: FragmentDirective,
        body: Arc<dyn FragmentBody>,
    },
}

/// A body composed of template text and nested fragment directives,
/// rendered in order into the same chunk.
#[derive(Clone, Default)]
pub struct Layout {
    parts: Vec<LayoutPart>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, body: TemplateBody) -> Self {
        self.parts.push(LayoutPart::Template(body));
        self
    }

    pub fn text(self, source: impl Into<String>) -> Self {
        self.template(TemplateBody::new(source))
    }

    pub fn fragment(mut self, directive: FragmentDirective, body: Arc<dyn FragmentBody>) -> Self {
        self.parts.push(LayoutPart::Fragment { directive, body });
        self
    }
}

#[async_trait]
impl FragmentBody for Layout {
    async fn render(&self, chunk: &mut Chunk, ctx: &RenderContext) -> Result<(), RenderError> {
        for part in &self.parts {
            match part {
                LayoutPart::Template(template) => template.render(chunk, ctx).await?,
                LayoutPart::Fragment { directive, body } => {
                    render_cached(directive, body.as_ref(), chunk, ctx).await?;
                }
            }
        }
        Ok(())
    }
}

//! Fragment rendering with cache read and populate paths.
//!
//! A page renders into a [`Chunk`] that streams to the client. Each fragment
//! directive resolves its identity and requirements, tries the content store
//! and otherwise renders its body in isolation, commits the output through a
//! [`FragmentBoundary`] and persists the artifact with its dependencies.

mod chunk;
mod context;
mod evaluator;
mod fragment;
mod layout;
mod pipeline;
mod requirements;
mod types;

pub use chunk::{BoundaryState, Chunk, ChunkError, ClientStream, FragmentBoundary};
pub use context::{RenderContext, RenderContextBuilder};
pub use evaluator::{
    EvalError, ExpressionEvaluator, FragmentBody, InterpolatingEvaluator, TemplateBody,
};
pub use fragment::{FragmentDirective, lookup, render_cached, render_fragment, serve_fragment};
pub use layout::{Layout, LayoutPart};
pub use pipeline::FragmentCache;
pub use requirements::{resolve_requirement_map, resolve_requirements};
pub use types::{CacheLookup, DirectiveOutcome, RenderError, RenderOutcome, ServeOutcome};

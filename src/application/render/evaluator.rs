//! Template expression evaluation and fragment bodies.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::chunk::Chunk;
use super::context::RenderContext;
use super::types::RenderError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("syntax error in expression `{expression}` at byte {position}: {reason}")]
    Syntax {
        expression: String,
        position: usize,
        reason: &'static str,
    },
    #[error("expression `{expression}` failed: {message}")]
    Failed { expression: String, message: String },
}

impl EvalError {
    pub fn failed(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            expression: expression.into(),
            message: message.into(),
        }
    }
}

/// Renders a template expression against the current render context.
#[async_trait]
pub trait ExpressionEvaluator: Send + Sync {
    async fn render_expression(&self, text: &str, ctx: &RenderContext)
    -> Result<String, EvalError>;
}

/// Renders the body of a fragment into a chunk.
#[async_trait]
pub trait FragmentBody: Send + Sync {
    async fn render(&self, chunk: &mut Chunk, ctx: &RenderContext) -> Result<(), RenderError>;
}

/// Substitutes `{dotted.path}` references with values from the template data.
///
/// Strings are inserted verbatim, other scalars use their JSON text, and
/// missing or null values render as nothing. `{{` and `}}` produce literal
/// braces.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolatingEvaluator;

impl InterpolatingEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn interpolate(&self, text: &str, data: &Value) -> Result<String, EvalError> {
        let mut output = String::with_capacity(text.len());
        let mut rest = text;
        let mut offset = 0;

        while let Some(index) = rest.find(['{', '}']) {
            output.push_str(&rest[..index]);
            let tail = &rest[index..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                output.push_str(&tail[..1]);
                rest = &tail[2..];
                offset += index + 2;
                continue;
            }

            if tail.starts_with('}') {
                return Err(syntax(text, offset + index, "unmatched `}`"));
            }

            let Some(close) = tail.find('}') else {
                return Err(syntax(text, offset + index, "unterminated reference"));
            };
            let path = tail[1..close].trim();
            if path.is_empty() || path.contains('{') {
                return Err(syntax(text, offset + index, "invalid reference"));
            }

            append_value(&mut output, lookup(data, path));
            rest = &tail[close + 1..];
            offset += index + close + 1;
        }

        output.push_str(rest);
        Ok(output)
    }
}

#[async_trait]
impl ExpressionEvaluator for InterpolatingEvaluator {
    async fn render_expression(
        &self,
        text: &str,
        ctx: &RenderContext,
    ) -> Result<String, EvalError> {
        self.interpolate(text, ctx.data())
    }
}

/// A body made of one template string plus the data items it reads.
#[derive(Debug, Clone)]
pub struct TemplateBody {
    source: String,
    requires: Vec<String>,
}

impl TemplateBody {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            requires: Vec::new(),
        }
    }

    /// Declare upstream data items this template consumes.
    pub fn requiring<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[async_trait]
impl FragmentBody for TemplateBody {
    async fn render(&self, chunk: &mut Chunk, ctx: &RenderContext) -> Result<(), RenderError> {
        let text = ctx
            .evaluator()
            .render_expression(&self.source, ctx)
            .await?;
        for item in &self.requires {
            ctx.tracker().add_requires(item.as_str());
        }
        chunk.write(&text);
        Ok(())
    }
}

fn syntax(expression: &str, position: usize, reason: &'static str) -> EvalError {
    EvalError::Syntax {
        expression: expression.to_string(),
        position,
        reason,
    }
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn append_value(output: &mut String, value: Option<&Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) => output.push_str(text),
        Some(other) => output.push_str(&other.to_string()),
    }
}

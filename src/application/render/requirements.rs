//! Resolution of requirement expressions into concrete values.

use futures::future::try_join_all;
use serde_json::Value;

use crate::domain::fragments::RequirementSet;

use super::context::RenderContext;
use super::evaluator::EvalError;

/// Render each requirement expression and trim the result.
///
/// `None` stays `None` and an empty list stays empty. Evaluations run
/// concurrently but the output keeps the input order; the first failure
/// fails the whole resolution.
pub async fn resolve_requirements(
    expressions: Option<&[String]>,
    ctx: &RenderContext,
) -> Result<Option<Vec<String>>, EvalError> {
    let Some(expressions) = expressions else {
        return Ok(None);
    };

    let evaluator = ctx.evaluator();
    let rendered = try_join_all(
        expressions
            .iter()
            .map(|expression| evaluator.render_expression(expression, ctx)),
    )
    .await?;

    Ok(Some(
        rendered
            .into_iter()
            .map(|value| value.trim().to_string())
            .collect(),
    ))
}

/// Resolve named requirement expressions into a requirement set.
///
/// Values are kept as strings; blank results become empty strings and are
/// dropped later by the requirement filter.
pub async fn resolve_requirement_map(
    named: &[(String, String)],
    ctx: &RenderContext,
) -> Result<RequirementSet, EvalError> {
    let expressions: Vec<String> = named.iter().map(|(_, expr)| expr.clone()).collect();
    let values = resolve_requirements(Some(&expressions), ctx)
        .await?
        .unwrap_or_default();

    Ok(named
        .iter()
        .zip(values)
        .map(|((name, _), value)| (name.clone(), Value::String(value)))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::render::evaluator::{ExpressionEvaluator, InterpolatingEvaluator};
    use crate::application::render::testing::context_with;

    /// Finishes expressions in reverse order of their position.
    struct SlowFirst;

    #[async_trait]
    impl ExpressionEvaluator for SlowFirst {
        async fn render_expression(
            &self,
            text: &str,
            _ctx: &RenderContext,
        ) -> Result<String, EvalError> {
            let delay: u64 = text.trim().parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!(" v{delay} "))
        }
    }

    struct Failing;

    #[async_trait]
    impl ExpressionEvaluator for Failing {
        async fn render_expression(
            &self,
            text: &str,
            _ctx: &RenderContext,
        ) -> Result<String, EvalError> {
            if text == "bad" {
                Err(EvalError::failed(text, "boom"))
            } else {
                Ok(text.to_string())
            }
        }
    }

    #[tokio::test]
    async fn absent_and_empty_inputs_are_preserved() {
        let ctx = context_with(Arc::new(InterpolatingEvaluator::new()), json!({}));
        assert_eq!(resolve_requirements(None, &ctx).await.expect("ok"), None);
        assert_eq!(
            resolve_requirements(Some(&[]), &ctx).await.expect("ok"),
            Some(vec![])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn output_order_matches_input_order() {
        let ctx = context_with(Arc::new(SlowFirst), json!({}));
        let expressions = vec!["30".to_string(), "10".to_string(), "0".to_string()];
        let resolved = resolve_requirements(Some(&expressions), &ctx)
            .await
            .expect("resolves");
        assert_eq!(
            resolved,
            Some(vec!["v30".to_string(), "v10".to_string(), "v0".to_string()])
        );
    }

    #[tokio::test]
    async fn any_failure_fails_the_whole_resolution() {
        let ctx = context_with(Arc::new(Failing), json!({}));
        let expressions = vec!["ok".to_string(), "bad".to_string()];
        assert!(resolve_requirements(Some(&expressions), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn named_requirements_render_against_data() {
        let ctx = context_with(
            Arc::new(InterpolatingEvaluator::new()),
            json!({ "locale": "en_us", "theme": "" }),
        );
        let named = vec![
            ("locale".to_string(), "{locale}".to_string()),
            ("theme".to_string(), " {theme} ".to_string()),
        ];
        let set = resolve_requirement_map(&named, &ctx).await.expect("resolves");
        assert_eq!(set.get("locale"), Some(&json!("en_us")));
        assert_eq!(set.get("theme"), Some(&json!("")));
    }
}

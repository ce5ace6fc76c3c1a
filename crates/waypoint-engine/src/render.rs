//! Display rendering of evaluation results.
//!
//! The progression middleware publishes every evaluation as a
//! `DisplayedValueProduced` event. A [`Render`] implementation decides what
//! that value looks like; [`RenderFormat`] selects one from configuration.

use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use waypoint_kernel::FormattedValue;

use crate::evaluation::{EvaluationResult, Outcome};

/// Turns an evaluation result into a displayable value.
pub trait Render: Send + Sync {
    /// Renders `result`.
    fn render(&self, result: &EvaluationResult) -> FormattedValue;
}

/// Output format for rendered evaluations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    /// `text/markdown`.
    #[default]
    Markdown,
    /// `text/html`.
    Html,
    /// `application/json`.
    Json,
}

impl RenderFormat {
    /// Returns the renderer for this format.
    #[must_use]
    pub fn renderer(self) -> Arc<dyn Render> {
        match self {
            Self::Markdown => Arc::new(MarkdownRender),
            Self::Html => Arc::new(HtmlRender),
            Self::Json => Arc::new(JsonRender),
        }
    }
}

const fn headline(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "Challenge complete",
        Outcome::PartialSuccess => "Almost there",
        Outcome::Failure => "Not yet",
    }
}

/// Renders results as a short Markdown block.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRender;

impl Render for MarkdownRender {
    fn render(&self, result: &EvaluationResult) -> FormattedValue {
        let mut output = format!("**{}**", headline(result.outcome));
        if let Some(reason) = &result.reason {
            let _ = write!(output, "\n\n{reason}");
        }
        if let Some(hint) = &result.hint {
            let _ = write!(output, "\n\n> Hint: {hint}");
        }
        FormattedValue::new("text/markdown", output)
    }
}

/// Renders results as an HTML fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRender;

impl Render for HtmlRender {
    fn render(&self, result: &EvaluationResult) -> FormattedValue {
        let mut output = format!(
            r#"<div class="evaluation {}"><strong>{}</strong>"#,
            result.outcome,
            headline(result.outcome)
        );
        if let Some(reason) = &result.reason {
            let _ = write!(output, "<p>{}</p>", escape_html(reason));
        }
        if let Some(hint) = &result.hint {
            let _ = write!(output, r#"<p class="hint">Hint: {}</p>"#, escape_html(hint));
        }
        output.push_str("</div>");
        FormattedValue::new("text/html", output)
    }
}

/// Renders results as their JSON serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRender;

impl Render for JsonRender {
    fn render(&self, result: &EvaluationResult) -> FormattedValue {
        let value = serde_json::to_string(result).unwrap_or_else(|e| {
            serde_json::json!({ "error": e.to_string() }).to_string()
        });
        FormattedValue::new("application/json", value)
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_success() {
        let value = MarkdownRender.render(&EvaluationResult::success());
        assert_eq!(value.mime_type, "text/markdown");
        insta::assert_snapshot!(value.value, @"**Challenge complete**");
    }

    #[test]
    fn test_markdown_failure_with_hint() {
        let result = EvaluationResult::failure("Expected a loop.").with_hint("try `for`");
        let value = MarkdownRender.render(&result);
        insta::assert_snapshot!(value.value, @r"
        **Not yet**

        Expected a loop.

        > Hint: try `for`
        ");
    }

    #[test]
    fn test_html_escapes_text() {
        let result = EvaluationResult::partial("a < b & c");
        let value = HtmlRender.render(&result);
        assert_eq!(value.mime_type, "text/html");
        insta::assert_snapshot!(
            value.value,
            @r#"<div class="evaluation partial_success"><strong>Almost there</strong><p>a &lt; b &amp; c</p></div>"#
        );
    }

    #[test]
    fn test_json_render() {
        let result = EvaluationResult::failure("nope");
        let value = JsonRender.render(&result);
        assert_eq!(value.mime_type, "application/json");

        let parsed: EvaluationResult = serde_json::from_str(&value.value).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_format_selects_renderer() {
        let result = EvaluationResult::success();
        assert_eq!(
            RenderFormat::Markdown.renderer().render(&result).mime_type,
            "text/markdown"
        );
        assert_eq!(RenderFormat::Html.renderer().render(&result).mime_type, "text/html");
        assert_eq!(
            RenderFormat::Json.renderer().render(&result).mime_type,
            "application/json"
        );
    }

    #[test]
    fn test_format_serde() {
        let format: RenderFormat = serde_json::from_str(r#""html""#).unwrap();
        assert_eq!(format, RenderFormat::Html);
        assert!(serde_json::from_str::<RenderFormat>(r#""pdf""#).is_err());
    }
}

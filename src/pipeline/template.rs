//! Template evaluation for inline documents.
//!
//! The service treats the template language as a collaborator: it hands over
//! the template source and the JSON data and gets HTML back. [`TemplateEngine`]
//! is that seam; [`JinjaTemplates`] is the default implementation, backed by
//! minijinja (Jinja2 syntax, no auto-escaping, like `jinja2.Template`).

use crate::error::ServiceError;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;
use tracing::debug;

/// Renders a template source string against request data.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, source: &str, data: &Value) -> Result<String, ServiceError>;
}

/// Jinja2-compatible templates evaluated with minijinja.
#[derive(Debug)]
pub struct JinjaTemplates {
    env: Environment<'static>,
}

impl JinjaTemplates {
    pub fn new() -> Self {
        Self::with_undefined(UndefinedBehavior::Lenient)
    }

    /// Reject templates that reference variables missing from the data.
    pub fn strict() -> Self {
        Self::with_undefined(UndefinedBehavior::Strict)
    }

    fn with_undefined(behavior: UndefinedBehavior) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(behavior);
        Self { env }
    }
}

impl Default for JinjaTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaTemplates {
    fn render(&self, source: &str, data: &Value) -> Result<String, ServiceError> {
        let html = self
            .env
            .render_str(source, data)
            .map_err(|e| ServiceError::Template(e.to_string()))?;
        debug!("Rendered template → {} bytes of HTML", html.len());
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_variables() {
        let html = JinjaTemplates::new()
            .render("<b>{{name}}</b>", &json!({"name": "Jo"}))
            .unwrap();
        assert_eq!(html, "<b>Jo</b>");
    }

    #[test]
    fn loops_and_filters_work() {
        let html = JinjaTemplates::new()
            .render(
                "{% for l in lines %}<td>{{ l.amount | round(2) }}</td>{% endfor %}",
                &json!({"lines": [{"amount": 1.005}, {"amount": 2}]}),
            )
            .unwrap();
        assert!(html.starts_with("<td>"));
        assert_eq!(html.matches("<td>").count(), 2);
    }

    #[test]
    fn html_in_data_is_not_escaped() {
        let html = JinjaTemplates::new()
            .render("{{ body }}", &json!({"body": "<i>x</i>"}))
            .unwrap();
        assert_eq!(html, "<i>x</i>");
    }

    #[test]
    fn syntax_errors_are_template_errors() {
        let err = JinjaTemplates::new()
            .render("{% if %}", &json!({}))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Template(_)));
    }

    #[test]
    fn strict_mode_rejects_missing_variables() {
        assert_eq!(JinjaTemplates::new().render("[{{ who }}]", &json!({})).unwrap(), "[]");
        assert!(JinjaTemplates::strict().render("[{{ who }}]", &json!({})).is_err());
    }
}

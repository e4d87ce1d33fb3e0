//! Template rendering for record bodies.
//!
//! A record names a template (e.g. `users/welcome`) and a layout
//! (e.g. `default`). The renderer turns those plus the render variables into
//! a text body, an HTML body, or both.
//!
//! # Tera
//!
//! With the `templates` feature, [`TeraRenderer`] resolves names as:
//!
//! | Part | Text | HTML |
//! |------|------|------|
//! | Template | `{template}.txt` | `{template}.html` |
//! | Layout | `layouts/{layout}.txt` | `layouts/{layout}.html` |
//!
//! The rendered template is passed to the layout as `content`. A missing
//! layout renders the template alone; a missing template is an error.
//!
//! ```rust,ignore
//! use outbox::TeraRenderer;
//!
//! let renderer = TeraRenderer::from_glob("templates/emails/**/*")?;
//! ```

use serde::Serialize;

use crate::error::OutboxError;
use crate::record::SendAs;

/// Variables available to every email template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderVars {
    /// The record payload, including its `id`.
    pub data: serde_json::Value,
    /// The full record.
    pub email_data: serde_json::Value,
    /// Always true when rendering an email, so shared templates can tell.
    pub is_email: bool,
}

/// What to render.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub template: &'a str,
    pub layout: Option<&'a str>,
    pub format: SendAs,
    pub vars: &'a RenderVars,
}

/// Rendered bodies. Only the parts the format asked for are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub text: Option<String>,
    pub html: Option<String>,
}

/// Trait for template engines.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, OutboxError>;
}

/// Blanket implementation for closures.
impl<F> TemplateRenderer for F
where
    F: Fn(&RenderRequest<'_>) -> Result<Rendered, OutboxError> + Send + Sync,
{
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, OutboxError> {
        (self)(request)
    }
}

#[cfg(feature = "templates")]
pub use self::tera_renderer::TeraRenderer;

#[cfg(feature = "templates")]
mod tera_renderer {
    use tera::{Context, Tera};

    use super::{RenderRequest, Rendered, TemplateRenderer};
    use crate::error::OutboxError;

    /// Tera-backed renderer.
    pub struct TeraRenderer {
        tera: Tera,
    }

    impl TeraRenderer {
        /// Wrap an existing Tera instance.
        pub fn new(tera: Tera) -> Self {
            Self { tera }
        }

        /// Load every template matching `glob`, e.g. `templates/**/*`.
        pub fn from_glob(glob: &str) -> Result<Self, OutboxError> {
            Ok(Self::new(Tera::new(glob)?))
        }

        /// Build from in-memory `(name, source)` pairs.
        pub fn from_raw<'a, I>(templates: I) -> Result<Self, OutboxError>
        where
            I: IntoIterator<Item = (&'a str, &'a str)>,
        {
            let mut tera = Tera::default();
            tera.add_raw_templates(templates)?;
            Ok(Self::new(tera))
        }

        fn has_template(&self, name: &str) -> bool {
            self.tera.get_template_names().any(|n| n == name)
        }

        fn render_part(
            &self,
            request: &RenderRequest<'_>,
            context: &Context,
            ext: &str,
        ) -> Result<String, OutboxError> {
            let name = format!("{}.{}", request.template, ext);
            let content = self.tera.render(&name, context)?;

            let layout = request
                .layout
                .map(|layout| format!("layouts/{}.{}", layout, ext))
                .filter(|name| self.has_template(name));

            match layout {
                Some(layout) => {
                    let mut context = context.clone();
                    context.insert("content", &content);
                    Ok(self.tera.render(&layout, &context)?)
                }
                None => Ok(content),
            }
        }
    }

    impl TemplateRenderer for TeraRenderer {
        fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered, OutboxError> {
            let context = Context::from_serialize(request.vars)?;

            let mut rendered = Rendered::default();
            if request.format.wants_text() {
                rendered.text = Some(self.render_part(request, &context, "txt")?);
            }
            if request.format.wants_html() {
                rendered.html = Some(self.render_part(request, &context, "html")?);
            }
            Ok(rendered)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::record::SendAs;
        use crate::template::RenderVars;
        use serde_json::json;

        fn renderer() -> TeraRenderer {
            TeraRenderer::from_raw([
                ("users/welcome.txt", "Hi {{ data.name }} (#{{ data.id }})"),
                ("users/welcome.html", "<p>Hi {{ data.name }}</p>"),
                ("layouts/default.html", "<html>{{ content | safe }}</html>"),
            ])
            .unwrap()
        }

        fn vars() -> RenderVars {
            RenderVars {
                data: json!({"name": "Alice", "id": 3}),
                email_data: json!({}),
                is_email: true,
            }
        }

        #[test]
        fn test_renders_both_parts_with_layout() {
            let vars = vars();
            let rendered = renderer()
                .render(&RenderRequest {
                    template: "users/welcome",
                    layout: Some("default"),
                    format: SendAs::Both,
                    vars: &vars,
                })
                .unwrap();

            // No text layout registered: template alone.
            assert_eq!(rendered.text.as_deref(), Some("Hi Alice (#3)"));
            assert_eq!(rendered.html.as_deref(), Some("<html><p>Hi Alice</p></html>"));
        }

        #[test]
        fn test_renders_only_requested_format() {
            let vars = vars();
            let rendered = renderer()
                .render(&RenderRequest {
                    template: "users/welcome",
                    layout: None,
                    format: SendAs::Text,
                    vars: &vars,
                })
                .unwrap();

            assert!(rendered.html.is_none());
            assert!(rendered.text.is_some());
        }

        #[test]
        fn test_missing_template_is_an_error() {
            let vars = vars();
            let result = renderer().render(&RenderRequest {
                template: "users/missing",
                layout: None,
                format: SendAs::Html,
                vars: &vars,
            });

            assert!(matches!(result, Err(OutboxError::Template(_))));
        }
    }
}

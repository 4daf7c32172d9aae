//! `{{token}}` substitution for email templates.
//!
//! A token holds one or more `||`-separated candidate keys. The first candidate
//! with a non-blank value wins; a token with no match renders as nothing.
//! Substituted values are never scanned again.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::pipeline::types::RenderContext;
use crate::settings::EmailTemplate;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());

/// Substitute every token in `template`.
pub fn render(template: &str, context: &RenderContext) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            resolve(&caps[1], context).unwrap_or_default().to_string()
        })
        .into_owned()
}

fn resolve<'a>(expr: &str, context: &'a RenderContext) -> Option<&'a str> {
    expr.split("||")
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .find_map(|key| context.get(key).filter(|v| !v.trim().is_empty()))
}

/// Subject and body after substitution, both trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub body: String,
}

/// Render the subject and body of a template independently.
pub fn render_template(template: &EmailTemplate, context: &RenderContext) -> RenderedTemplate {
    RenderedTemplate {
        subject: render(&template.subject, context).trim().to_string(),
        body: render(&template.body, context).trim().to_string(),
    }
}

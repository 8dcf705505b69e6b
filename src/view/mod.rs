//! # Views
//!
//! A view turns the request's [`ViewContext`](crate::controller::ViewContext)
//! into a response body. Three views exist:
//!
//! - [`ViewKind::Template`] renders a minijinja template chosen by
//!   [`template_names`]
//! - [`ViewKind::Json`] serializes the most specific context variable
//! - [`ViewKind::Message`] serializes `context["data"]`, set by the message
//!   response handler
//!
//! [`render`] fires `before_render` and `after_render` around the body and
//! clears any pending redirect before writing it.

mod engine;

pub use engine::{MiniJinjaEngine, TemplateEngine};

use serde_json::{json, Value};

use crate::components::Json;
use crate::controller::RequestContext;
use crate::error::DispatchError;
use crate::events::{Payload, AFTER_RENDER, BEFORE_RENDER, TEMPLATE_NAMES};
use crate::server::response::{APPLICATION_JSON, TEXT_HTML};
use crate::server::Response;

/// Template view settings; unset fields fall back to `templates.*` config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateOptions {
    /// Skip name resolution and render exactly this template.
    pub template_name: Option<String>,
    pub extension: Option<String>,
    pub theme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewKind {
    Template(TemplateOptions),
    Json,
    Message,
}

impl Default for ViewKind {
    fn default() -> Self {
        ViewKind::Template(TemplateOptions::default())
    }
}

impl ViewKind {
    /// Select a view by name: `template`, `json` or `message`, with or
    /// without a `view` suffix.
    pub fn factory(name: &str) -> Option<ViewKind> {
        let name = name.to_ascii_lowercase();
        match name.strip_suffix("view").unwrap_or(&name) {
            "template" => Some(ViewKind::default()),
            "json" => Some(ViewKind::Json),
            "message" => Some(ViewKind::Message),
            _ => None,
        }
    }

    pub fn template(name: impl Into<String>) -> Self {
        ViewKind::Template(TemplateOptions {
            template_name: Some(name.into()),
            ..TemplateOptions::default()
        })
    }

    /// JSON-producing views; errors render as JSON objects under these.
    pub fn is_structured(&self) -> bool {
        matches!(self, ViewKind::Json | ViewKind::Message)
    }
}

fn template_options(ctx: &RequestContext) -> TemplateOptions {
    match &ctx.view {
        ViewKind::Template(options) => options.clone(),
        _ => TemplateOptions::default(),
    }
}

/// Template file extension for the current request.
pub fn template_extension(ctx: &RequestContext) -> String {
    template_options(ctx)
        .extension
        .unwrap_or_else(|| ctx.config().templates.extension.clone())
}

/// Candidate template names, most specific first.
///
/// `themes/{theme}/{name}/{prefix}_{action}.{ext}` and
/// `themes/{theme}/{name}/{action}.{ext}` when a theme is set, then
/// `{name}/{prefix}_{action}.{ext}` for prefixed routes, then
/// `{name}/{action}.{ext}`. Listeners of `template_names` may append more.
pub fn template_names(ctx: &mut RequestContext) -> Result<Vec<String>, DispatchError> {
    let options = template_options(ctx);
    if let Some(name) = options.template_name {
        return Ok(vec![name]);
    }
    let ext = template_extension(ctx);
    let theme = options
        .theme
        .or_else(|| ctx.config().templates.theme.clone());
    let name = ctx.name().to_string();
    let action = ctx.route.action.clone();
    let prefixed = ctx
        .route
        .prefix
        .as_ref()
        .map(|prefix| format!("{prefix}_{action}"));

    let mut names = Vec::new();
    if let Some(theme) = &theme {
        if let Some(prefixed) = &prefixed {
            names.push(format!("themes/{theme}/{name}/{prefixed}.{ext}"));
        }
        names.push(format!("themes/{theme}/{name}/{action}.{ext}"));
    }
    if let Some(prefixed) = &prefixed {
        names.push(format!("{name}/{prefixed}.{ext}"));
    }
    names.push(format!("{name}/{action}.{ext}"));

    ctx.fire(TEMPLATE_NAMES, &mut Payload::Templates(&mut names))?;
    Ok(names)
}

fn to_json(ctx: &RequestContext, value: &Value) -> Result<String, DispatchError> {
    let text = if ctx.config().json.indent {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

fn template_vars(ctx: &RequestContext) -> Value {
    let mut vars = ctx.context.as_value();
    if let Value::Object(map) = &mut vars {
        map.entry("route").or_insert_with(|| {
            json!({
                "name": ctx.route.name,
                "controller": ctx.route.controller,
                "prefix": ctx.route.prefix,
                "action": ctx.route.action,
            })
        });
        map.entry("user")
            .or_insert_with(|| json!(ctx.user.as_ref().map(|u| u.email.clone())));
    }
    vars
}

/// Render the current view into the working response and return it.
pub fn render(ctx: &mut RequestContext) -> Result<Response, DispatchError> {
    ctx.fire(BEFORE_RENDER, &mut Payload::None)?;

    let (content_type, body) = match ctx.view.clone() {
        ViewKind::Template(_) => {
            let names = template_names(ctx)?;
            let vars = template_vars(ctx);
            let body = ctx.services().templates.render(&names, &vars)?;
            (TEXT_HTML, body)
        }
        ViewKind::Json => {
            let payload = Json::payload(ctx);
            (APPLICATION_JSON, to_json(ctx, &payload)?)
        }
        ViewKind::Message => {
            let data = ctx.context.get("data").cloned().unwrap_or(Value::Null);
            (APPLICATION_JSON, to_json(ctx, &data)?)
        }
    };

    ctx.fire(AFTER_RENDER, &mut Payload::Rendered(&body))?;

    let mut response = std::mem::take(&mut ctx.response);
    response.clear_redirect();
    response.set_body(content_type, body.into_bytes());
    Ok(response)
}

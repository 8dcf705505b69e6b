use http::Method;
use tracing::debug;

use super::core::{template_params, Route};
use crate::controller::{ActionSpec, ControllerDescriptor};
use crate::error::ConfigurationError;

/// One row of the conventional CRUD table.
struct Conventional {
    action: &'static str,
    /// Route name suffix (`add-rest`).
    suffix: &'static str,
    /// Path after `/{name}`.
    tail: &'static str,
    methods: Vec<Method>,
}

/// The CRUD table in route order.
fn conventional_table() -> Vec<Conventional> {
    let row = |action, suffix, tail, methods: &[Method]| Conventional {
        action,
        suffix,
        tail,
        methods: methods.to_vec(),
    };
    vec![
        row("list", "list", "", &[Method::GET, Method::HEAD]),
        row("view", "view", "/{id}", &[Method::GET, Method::HEAD]),
        row("add", "add", "/add", &[Method::GET, Method::POST]),
        row("add", "add-rest", "", &[Method::POST]),
        row("edit", "edit", "/{id}/edit", &[Method::GET, Method::POST]),
        row("edit", "edit-rest", "/{id}", &[Method::PUT, Method::POST]),
        row("delete", "delete", "/{id}/delete", &[Method::GET]),
        row("delete", "delete-rest", "/{id}", &[Method::DELETE]),
    ]
}

fn route_name(prefix: Option<&str>, controller: &str, suffix: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}-{controller}-{suffix}"),
        None => format!("{controller}-{suffix}"),
    }
}

fn base_path(prefix: Option<&str>, controller: &str) -> String {
    match prefix {
        Some(prefix) => format!("/{prefix}/{controller}"),
        None => format!("/{controller}"),
    }
}

/// Derives routes from controller descriptors.
pub struct RouteBuilder;

impl RouteBuilder {
    /// Conventional CRUD routes for `list`, `view`, `add`, `edit` and `delete`.
    ///
    /// The unprefixed set comes first, then one set per declared prefix. A row
    /// is only generated when the controller defines the method it targets
    /// (`admin_edit` for the `admin` set).
    ///
    /// # Errors
    ///
    /// `MissingModel` when a generated route targets a scaffold action and the
    /// controller has no store.
    pub fn build_conventional_routes(
        desc: &ControllerDescriptor,
    ) -> Result<Vec<Route>, ConfigurationError> {
        let table = conventional_table();
        let prefixes = std::iter::once(None).chain(desc.prefixes.iter().map(|p| Some(p.as_str())));

        let mut routes = Vec::new();
        for prefix in prefixes {
            for row in &table {
                let handler_method = match prefix {
                    Some(prefix) => format!("{prefix}_{}", row.action),
                    None => row.action.to_string(),
                };
                let Some(spec) = desc.action(&handler_method) else {
                    continue;
                };
                if spec.is_scaffold() && desc.model.is_none() {
                    return Err(ConfigurationError::MissingModel {
                        controller: desc.type_name.clone(),
                    });
                }
                let template = format!("{}{}", base_path(prefix, &desc.name), row.tail);
                routes.push(Route {
                    name: route_name(prefix, &desc.name, row.suffix),
                    params: template_params(&template),
                    templates: vec![template],
                    methods: row.methods.clone(),
                    controller: desc.name.clone(),
                    handler_method,
                    prefix: prefix.map(str::to_string),
                    action: row.action.to_string(),
                    defaults: Vec::new(),
                });
            }
        }
        Ok(routes)
    }

    /// Routes for actions marked with `.route()` / `.route_with(..)`, in
    /// declaration order.
    ///
    /// A derived template is `/{prefix/}{name}/{action}/{param}...`. Each
    /// trailing run of defaulted parameters adds a shorter variant, longest
    /// first.
    pub fn build_explicit_routes(
        desc: &ControllerDescriptor,
    ) -> Result<Vec<Route>, ConfigurationError> {
        let mut routes = Vec::new();
        for spec in desc.actions() {
            let Some(options) = &spec.routing else {
                continue;
            };
            let (prefix, action) = desc.split_prefix(&spec.method_name);
            let templates = match &options.template {
                Some(template) => vec![template.clone()],
                None => derived_templates(prefix, &desc.name, action, spec),
            };
            let params = templates
                .first()
                .map(|t| template_params(t))
                .unwrap_or_default();
            let defaults = spec
                .params
                .iter()
                .filter_map(|p| p.default.as_ref().map(|d| (p.name.clone(), d.clone())))
                .collect();
            routes.push(Route {
                name: route_name(prefix, &desc.name, action),
                templates,
                methods: options.methods.clone(),
                controller: desc.name.clone(),
                handler_method: spec.method_name.clone(),
                prefix: prefix.map(str::to_string),
                action: action.to_string(),
                params,
                defaults,
            });
        }
        Ok(routes)
    }

    /// Conventional routes followed by explicit routes.
    pub fn build_routes(desc: &ControllerDescriptor) -> Result<Vec<Route>, ConfigurationError> {
        let mut routes = Self::build_conventional_routes(desc)?;
        routes.extend(Self::build_explicit_routes(desc)?);
        debug!(
            controller = %desc.name,
            routes = routes.len(),
            "Routes built for controller"
        );
        Ok(routes)
    }
}

fn derived_templates(
    prefix: Option<&str>,
    controller: &str,
    action: &str,
    spec: &ActionSpec,
) -> Vec<String> {
    let base = format!("{}/{action}", base_path(prefix, controller));
    let trailing_defaults = spec
        .params
        .iter()
        .rev()
        .take_while(|p| p.default.is_some())
        .count();
    let required = spec.params.len() - trailing_defaults;

    (required..=spec.params.len())
        .rev()
        .map(|count| {
            let mut template = base.clone();
            for param in &spec.params[..count] {
                template.push_str("/{");
                template.push_str(&param.name);
                template.push('}');
            }
            template
        })
        .collect()
}

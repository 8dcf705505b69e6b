use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::radix::RadixTree;
use crate::error::{ConfigurationError, RouteError};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Path or query parameters as `(name, value)` pairs.
///
/// Names are `Arc<str>` taken from the route tree, so matching a request only
/// allocates the values.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// One named route.
///
/// A route owns one or more path templates: the full template first, then the
/// shorter variants produced for trailing parameters with defaults. All
/// variants resolve to the same action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub templates: Vec<String>,
    /// Empty means the route answers every method.
    pub methods: Vec<Method>,
    pub controller: String,
    /// Method name on the controller, prefix included (`admin_list`).
    pub handler_method: String,
    pub prefix: Option<String>,
    /// Handler method with the prefix stripped (`list`).
    pub action: String,
    /// Parameter names of the full template, in order.
    pub params: Vec<String>,
    /// Values used when a shorter variant omits a parameter.
    pub defaults: Vec<(String, String)>,
}

impl Route {
    /// The full (longest) path template.
    pub fn template(&self) -> &str {
        self.templates.first().map(String::as_str).unwrap_or("/")
    }

    pub fn answers(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn default_for(&self, param: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, value)| value.as_str())
    }

    /// Methods as text for logs and the route table (`GET|HEAD`, `*`).
    pub fn methods_label(&self) -> String {
        if self.methods.is_empty() {
            "*".to_string()
        } else {
            self.methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join("|")
        }
    }
}

/// Parameter names of a `{param}` template, in order.
pub fn template_params(template: &str) -> Vec<String> {
    template
        .split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(str::to_string)
        })
        .collect()
}

/// Check that a template is absolute and that every `{` / `}` wraps a whole segment.
pub fn validate_template(template: &str) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    };
    if !template.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    for segment in template.split('/') {
        let is_param = segment.starts_with('{') && segment.ends_with('}');
        if is_param && segment.len() < 3 {
            return Err(invalid("empty parameter name"));
        }
        if !is_param && (segment.contains('{') || segment.contains('}')) {
            return Err(invalid("parameters must span a whole segment"));
        }
    }
    Ok(())
}

/// `/widgets/{id}/edit` -> `/widgets/{}/edit`; equal shapes match the same paths.
fn template_shape(template: &str) -> String {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| if s.starts_with('{') { "{}" } else { s })
        .collect::<Vec<_>>()
        .join("/")
}

/// Result of matching a request to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Last write wins when a name repeats at different depths.
    #[inline]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Name-indexed route table with radix-tree path matching.
///
/// Built once by `AppBuilder` and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Router {
    tree: RadixTree,
    ordered: Vec<Arc<Route>>,
    by_name: HashMap<String, Arc<Route>>,
    /// Template shape -> (methods, route name) for overlap detection.
    shapes: HashMap<String, Vec<(Vec<Method>, String)>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from routes in order; the first collision aborts.
    pub fn from_routes(routes: Vec<Route>) -> Result<Self, ConfigurationError> {
        let mut router = Self::new();
        for route in routes {
            router.add(route)?;
        }
        Ok(router)
    }

    /// Insert a route.
    ///
    /// # Errors
    ///
    /// - `DuplicateRouteName` if the name is taken; routes are never merged.
    /// - `ConflictingRoute` if a template of the same shape already answers
    ///   one of the route's methods.
    /// - `InvalidTemplate` for malformed templates.
    pub fn add(&mut self, route: Route) -> Result<(), ConfigurationError> {
        if self.by_name.contains_key(&route.name) {
            warn!(route_name = %route.name, "Duplicate route name");
            return Err(ConfigurationError::DuplicateRouteName {
                name: route.name.clone(),
            });
        }

        for template in &route.templates {
            validate_template(template)?;
            let shape = template_shape(template);
            if let Some(existing) = self.shapes.get(&shape) {
                for (methods, name) in existing {
                    if let Some(method) = overlapping_method(methods, &route.methods) {
                        warn!(
                            route_name = %route.name,
                            existing = %name,
                            template = %template,
                            method = %method,
                            "Conflicting route template"
                        );
                        return Err(ConfigurationError::ConflictingRoute {
                            template: template.clone(),
                            method,
                            existing: name.clone(),
                        });
                    }
                }
            }
        }

        let route = Arc::new(route);
        for template in &route.templates {
            self.shapes
                .entry(template_shape(template))
                .or_default()
                .push((route.methods.clone(), route.name.clone()));
            self.tree.insert(template, Arc::clone(&route));
        }
        debug!(
            route_name = %route.name,
            templates = ?route.templates,
            methods = %route.methods_label(),
            "Route registered"
        );
        self.by_name.insert(route.name.clone(), Arc::clone(&route));
        self.ordered.push(route);
        Ok(())
    }

    /// Match a request path. Static segments are preferred over parameters.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let path = path.split('?').next().unwrap_or(path);
        let result = self.tree.search(method, path);
        match &result {
            Some(m) => debug!(
                method = %method,
                path = %path,
                route_name = %m.route.name,
                path_params = ?m.path_params,
                "Route matched"
            ),
            None => debug!(method = %method, path = %path, "No route matched"),
        }
        result
    }

    pub fn route(&self, name: &str) -> Option<&Arc<Route>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Routes in insertion order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Build a URI for a named route.
    ///
    /// Picks the shortest template variant that contains every supplied route
    /// parameter, fills the rest from defaults, and appends parameters the
    /// route does not know about as a query string.
    pub fn build(&self, name: &str, params: &[(&str, &str)]) -> Result<String, RouteError> {
        let route = self
            .by_name
            .get(name)
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))?;

        let supplied = |param: &str| {
            params
                .iter()
                .rfind(|(k, _)| *k == param)
                .map(|(_, v)| *v)
        };

        let mut variants: Vec<(&String, Vec<String>)> = route
            .templates
            .iter()
            .map(|t| (t, template_params(t)))
            .collect();
        variants.sort_by_key(|(_, names)| names.len());

        let (template, names) = variants
            .iter()
            .find(|(_, names)| {
                params
                    .iter()
                    .filter(|(k, _)| route.params.iter().any(|p| p == *k))
                    .all(|(k, _)| names.iter().any(|n| n == *k))
            })
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))?;

        let mut uri = String::with_capacity(template.len() + 16);
        for segment in template.split('/').filter(|s| !s.is_empty()) {
            uri.push('/');
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(param) => {
                    let value = supplied(param)
                        .or_else(|| route.default_for(param))
                        .ok_or_else(|| RouteError::MissingParam {
                            route: name.to_string(),
                            param: param.to_string(),
                        })?;
                    uri.push_str(&encode_segment(value));
                }
                None => uri.push_str(segment),
            }
        }
        if uri.is_empty() {
            uri.push('/');
        }

        let extra: Vec<(&str, &str)> = params
            .iter()
            .filter(|(k, _)| {
                !names.iter().any(|n| n == *k) && !route.params.iter().any(|p| p == *k)
            })
            .copied()
            .collect();
        if !extra.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(extra)
                .finish();
            uri.push('?');
            uri.push_str(&query);
        }
        Ok(uri)
    }
}

fn overlapping_method(a: &[Method], b: &[Method]) -> Option<String> {
    if a.is_empty() || b.is_empty() {
        return Some(
            a.first()
                .or_else(|| b.first())
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "*".to_string()),
        );
    }
    a.iter()
        .find(|m| b.contains(m))
        .map(|m| m.as_str().to_string())
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

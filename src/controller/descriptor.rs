use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use http::Method;

use super::context::RequestContext;
use crate::auth::{self, AuthCheck};
use crate::components::{Component, ComponentFactory, Scaffolding};
use crate::error::{ConfigurationError, DispatchError};
use crate::inflector;
use crate::responses::Reply;
use crate::router::{ParamVec, Route};
use crate::scaffold::{self, ScaffoldOptions, Store};
use crate::view::ViewKind;

/// Signature of every action: the request context plus path-derived arguments.
pub type ActionFn =
    Arc<dyn Fn(&mut RequestContext, &Args) -> Result<Reply, DispatchError> + Send + Sync>;

/// Hook run between `before_startup` and `after_startup`.
pub type StartupHook = Arc<dyn Fn(&mut RequestContext) -> Result<(), DispatchError> + Send + Sync>;

/// Arguments extracted from the matched path, with declared defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: Vec<(String, String)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Arguments for `route`: every route parameter from the path, or its default.
    pub fn from_route(route: &Route, path_params: &ParamVec) -> Self {
        let values = route
            .params
            .iter()
            .filter_map(|name| {
                path_params
                    .iter()
                    .rfind(|(k, _)| k.as_ref() == name.as_str())
                    .map(|(_, v)| v.clone())
                    .or_else(|| route.default_for(name).map(str::to_string))
                    .map(|value| (name.clone(), value))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Parse an argument; a missing or malformed value is a 400.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, DispatchError> {
        let raw = self
            .get(name)
            .ok_or_else(|| DispatchError::BadRequest(format!("missing argument '{name}'")))?;
        raw.parse::<T>()
            .map_err(|_| DispatchError::BadRequest(format!("invalid value '{raw}' for '{name}'")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A declared action parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub default: Option<String>,
}

/// Extra route-construction arguments for an explicitly routed action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOptions {
    /// Replaces the derived path template.
    pub template: Option<String>,
    /// Restricts the methods; empty answers every method.
    pub methods: Vec<Method>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn methods(mut self, methods: &[Method]) -> Self {
        self.methods = methods.to_vec();
        self
    }
}

/// One action on a controller.
#[derive(Clone)]
pub struct ActionSpec {
    pub method_name: String,
    pub params: Vec<ParamSpec>,
    /// `Some` when the action is explicitly routable.
    pub routing: Option<RouteOptions>,
    pub authorizations: Vec<AuthCheck>,
    scaffold: bool,
    handler: ActionFn,
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("method_name", &self.method_name)
            .field("params", &self.params)
            .field("routing", &self.routing)
            .field("authorizations", &self.authorizations.len())
            .field("scaffold", &self.scaffold)
            .finish()
    }
}

impl ActionSpec {
    pub fn new<F>(method_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &Args) -> Result<Reply, DispatchError> + Send + Sync + 'static,
    {
        Self::from_shared(method_name, Arc::new(handler))
    }

    pub fn from_shared(method_name: impl Into<String>, handler: ActionFn) -> Self {
        Self {
            method_name: method_name.into(),
            params: Vec::new(),
            routing: None,
            authorizations: Vec::new(),
            scaffold: false,
            handler,
        }
    }

    /// Declare a required path parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declare a parameter with a default. Trailing defaulted parameters
    /// produce shorter route variants.
    pub fn param_default(mut self, name: impl Into<String>, default: impl ToString) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            default: Some(default.to_string()),
        });
        self
    }

    /// Mark as explicitly routable with a derived template.
    pub fn route(mut self) -> Self {
        self.routing = Some(RouteOptions::default());
        self
    }

    pub fn route_with(mut self, options: RouteOptions) -> Self {
        self.routing = Some(options);
        self
    }

    /// Append a check that runs after the controller's chain.
    pub fn authorize(mut self, check: AuthCheck) -> Self {
        self.authorizations.push(check);
        self
    }

    pub fn is_routed(&self) -> bool {
        self.routing.is_some()
    }

    /// Generated CRUD action bound to the controller's store.
    pub fn is_scaffold(&self) -> bool {
        self.scaffold
    }

    pub fn invoke(&self, ctx: &mut RequestContext, args: &Args) -> Result<Reply, DispatchError> {
        (self.handler)(ctx, args)
    }
}

/// Class-level description of a controller, shared by every request to it.
///
/// Built once with [`ControllerDescriptor::builder`] and immutable afterwards.
pub struct ControllerDescriptor {
    /// Type name the descriptor was declared for (`Widgets`).
    pub type_name: String,
    /// Route and template namespace (`widgets`).
    pub name: String,
    pub prefixes: Vec<String>,
    pub components: Vec<ComponentFactory>,
    pub authorizations: Vec<AuthCheck>,
    pub model: Option<Arc<dyn Store>>,
    pub startup: Option<StartupHook>,
    pub view: ViewKind,
    pub auto_render: bool,
    /// Request parser used by `RequestContext::parse_request`.
    pub parser: String,
    pub paginate_limit: Option<usize>,
    pub scaffold: ScaffoldOptions,
    actions: Vec<ActionSpec>,
}

impl fmt::Debug for ControllerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerDescriptor")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("prefixes", &self.prefixes)
            .field(
                "components",
                &self.components.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("authorizations", &self.authorizations.len())
            .field("model", &self.model.as_ref().map(|m| m.kind().to_string()))
            .field("view", &self.view)
            .field("actions", &self.actions)
            .finish()
    }
}

impl ControllerDescriptor {
    pub fn builder(type_name: impl Into<String>) -> ControllerBuilder {
        ControllerBuilder::new(type_name)
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    pub fn action(&self, method_name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.method_name == method_name)
    }

    /// Split `admin_list` into `(Some("admin"), "list")` for a declared prefix.
    pub fn split_prefix<'a>(&self, method_name: &'a str) -> (Option<&'a str>, &'a str) {
        for prefix in &self.prefixes {
            if let Some(rest) = method_name
                .strip_prefix(prefix.as_str())
                .and_then(|r| r.strip_prefix('_'))
            {
                if !rest.is_empty() {
                    return (Some(&method_name[..prefix.len()]), rest);
                }
            }
        }
        (None, method_name)
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.prefixes.iter().any(|p| p == prefix)
    }

    pub fn is_scaffolded(&self) -> bool {
        self.actions.iter().any(ActionSpec::is_scaffold)
    }

    /// Template variable for collections (`widgets`).
    pub fn plural(&self) -> String {
        inflector::pluralize(&self.name)
    }

    /// Template variable for single items (`widget`).
    pub fn singular(&self) -> String {
        inflector::singularize(&self.name)
    }

    /// Human title (`Widgets`), or the scaffold title when set.
    pub fn title(&self) -> String {
        self.scaffold
            .title
            .clone()
            .unwrap_or_else(|| inflector::titleize(&self.plural()))
    }
}

/// Builder for [`ControllerDescriptor`].
pub struct ControllerBuilder {
    type_name: String,
    name: Option<String>,
    prefixes: Vec<String>,
    components: Vec<ComponentFactory>,
    authorizations: Vec<AuthCheck>,
    actions: Vec<ActionSpec>,
    scaffold_actions: Vec<String>,
    model: Option<Arc<dyn Store>>,
    startup: Option<StartupHook>,
    view: ViewKind,
    auto_render: bool,
    parser: String,
    paginate_limit: Option<usize>,
    scaffold: ScaffoldOptions,
}

impl ControllerBuilder {
    fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
            prefixes: Vec::new(),
            components: Vec::new(),
            authorizations: vec![auth::require_admin_for_prefix(&["admin"])],
            actions: Vec::new(),
            scaffold_actions: Vec::new(),
            model: None,
            startup: None,
            view: ViewKind::default(),
            auto_render: true,
            parser: "Form".to_string(),
            paginate_limit: None,
            scaffold: ScaffoldOptions::default(),
        }
    }

    /// Override the name derived from the type name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
        self
    }

    /// Declare a component; components are built per request in declaration order.
    pub fn component<T: Component>(mut self) -> Self {
        self.components.push(ComponentFactory::of::<T>());
        self
    }

    pub fn component_factory(mut self, factory: ComponentFactory) -> Self {
        self.components.push(factory);
        self
    }

    /// Append to the controller's authorization chain.
    pub fn authorize(mut self, check: AuthCheck) -> Self {
        self.authorizations.push(check);
        self
    }

    /// Replace the whole authorization chain, including the default admin check.
    pub fn authorizations(mut self, checks: Vec<AuthCheck>) -> Self {
        self.authorizations = checks;
        self
    }

    pub fn action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    /// Shorthand for an unrouted (conventional-only) action.
    pub fn handler<F>(self, method_name: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &Args) -> Result<Reply, DispatchError> + Send + Sync + 'static,
    {
        self.action(ActionSpec::new(method_name, handler))
    }

    pub fn model(mut self, store: Arc<dyn Store>) -> Self {
        self.model = Some(store);
        self
    }

    /// Generate CRUD actions. Names may carry a prefix (`admin_edit`).
    pub fn scaffold(mut self, method_names: &[&str]) -> Self {
        self.scaffold_actions
            .extend(method_names.iter().map(|m| m.to_string()));
        self
    }

    pub fn scaffold_options(mut self, options: ScaffoldOptions) -> Self {
        self.scaffold = options;
        self
    }

    pub fn startup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.startup = Some(Arc::new(hook));
        self
    }

    pub fn view(mut self, view: ViewKind) -> Self {
        self.view = view;
        self
    }

    pub fn auto_render(mut self, enabled: bool) -> Self {
        self.auto_render = enabled;
        self
    }

    pub fn parser(mut self, name: impl Into<String>) -> Self {
        self.parser = name.into();
        self
    }

    pub fn paginate_limit(mut self, limit: usize) -> Self {
        self.paginate_limit = Some(limit);
        self
    }

    /// Freeze the descriptor.
    ///
    /// # Errors
    ///
    /// `UnknownAction` when a scaffold name does not map to list, view, add,
    /// edit or delete.
    pub fn build(self) -> Result<ControllerDescriptor, ConfigurationError> {
        let type_short = inflector::short_type_name(&self.type_name).to_string();
        let name = self
            .name
            .unwrap_or_else(|| inflector::underscore(&type_short));

        let mut descriptor = ControllerDescriptor {
            type_name: type_short,
            name,
            prefixes: self.prefixes,
            components: self.components,
            authorizations: self.authorizations,
            model: self.model,
            startup: self.startup,
            view: self.view,
            auto_render: self.auto_render,
            parser: self.parser,
            paginate_limit: self.paginate_limit,
            scaffold: self.scaffold,
            actions: self.actions,
        };

        for method_name in self.scaffold_actions {
            let (_, action) = descriptor.split_prefix(&method_name);
            let handler =
                scaffold::scaffold_action(action).ok_or_else(|| ConfigurationError::UnknownAction {
                    controller: descriptor.name.clone(),
                    action: method_name.clone(),
                })?;
            let mut spec = ActionSpec::from_shared(method_name.as_str(), handler);
            spec.scaffold = true;
            descriptor.actions.retain(|a| a.method_name != method_name);
            descriptor.actions.push(spec);
        }

        let scaffolding = ComponentFactory::of::<Scaffolding>();
        if descriptor.is_scaffolded()
            && !descriptor
                .components
                .iter()
                .any(|c| c.name() == scaffolding.name())
        {
            descriptor.components.push(scaffolding);
        }

        Ok(descriptor)
    }
}

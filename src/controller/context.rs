use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::descriptor::{Args, ControllerDescriptor};
use super::view_context::ViewContext;
use crate::auth::CurrentUser;
use crate::components::Components;
use crate::config::AppConfig;
use crate::dispatcher::Services;
use crate::error::{DispatchError, RouteError};
use crate::events::{EventBus, EventError, Payload};
use crate::parsers::{Parsed, ParsedValue};
use crate::responses::{self, Reply};
use crate::router::{Route, Router};
use crate::server::{Request, Response};
use crate::session::Session;
use crate::view::ViewKind;

/// Where the current request was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub name: String,
    pub controller: String,
    pub prefix: Option<String>,
    pub action: String,
    pub handler_method: String,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            name: route.name.clone(),
            controller: route.controller.clone(),
            prefix: route.prefix.clone(),
            action: route.action.clone(),
            handler_method: route.handler_method.clone(),
        }
    }
}

/// State of one in-flight request.
///
/// Owned by the dispatcher for the duration of a single request and never
/// shared. Components, the per-request event bus, the view variables and the
/// working response all live here.
pub struct RequestContext {
    pub request: Request,
    /// Working response; handlers and views write into it.
    pub response: Response,
    pub route: RouteInfo,
    pub args: Args,
    pub user: Option<CurrentUser>,
    pub session: Session,
    pub components: Components,
    /// Variables passed to rendering.
    pub context: ViewContext,
    pub view: ViewKind,
    events: Arc<EventBus<RequestContext>>,
    global_events: Arc<EventBus<RequestContext>>,
    descriptor: Arc<ControllerDescriptor>,
    services: Arc<Services>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request.request_id)
            .field("route", &self.route)
            .field("args", &self.args)
            .field("user", &self.user)
            .field("components", &self.components)
            .field("view", &self.view)
            .finish()
    }
}

impl RequestContext {
    pub fn new(
        request: Request,
        route: RouteInfo,
        args: Args,
        descriptor: Arc<ControllerDescriptor>,
        services: Arc<Services>,
        global_events: Arc<EventBus<RequestContext>>,
    ) -> Self {
        Self {
            request,
            response: Response::default(),
            route,
            args,
            user: None,
            session: Session::default(),
            components: Components::default(),
            context: ViewContext::new(),
            view: descriptor.view.clone(),
            events: Arc::new(EventBus::new()),
            global_events,
            descriptor,
            services,
        }
    }

    /// Replace the per-request bus once components have registered on it.
    pub(crate) fn install_events(&mut self, bus: EventBus<RequestContext>) {
        self.events = Arc::new(bus);
    }

    pub fn descriptor(&self) -> &ControllerDescriptor {
        &self.descriptor
    }

    pub(crate) fn descriptor_arc(&self) -> Arc<ControllerDescriptor> {
        Arc::clone(&self.descriptor)
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &AppConfig {
        &self.services.config
    }

    pub fn router(&self) -> &Router {
        &self.services.router
    }

    /// Controller name (`widgets`).
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Fire `name` on the request bus, then on the global bus.
    pub fn fire(&mut self, name: &str, payload: &mut Payload<'_>) -> Result<Vec<Value>, EventError> {
        let local = Arc::clone(&self.events);
        let global = Arc::clone(&self.global_events);
        let mut results = local.fire(name, self, payload)?;
        results.extend(global.fire(name, self, payload)?);
        Ok(results)
    }

    pub fn uri(&self, name: &str, params: &[(&str, &str)]) -> Result<String, RouteError> {
        self.services.router.build(name, params)
    }

    /// URI of another action on this controller: `{prefix-}{name}-{action}`.
    pub fn uri_for_action(
        &self,
        prefix: Option<&str>,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RouteError> {
        let name = match prefix {
            Some(prefix) => format!("{prefix}-{}-{action}", self.descriptor.name),
            None => format!("{}-{action}", self.descriptor.name),
        };
        self.uri(&name, params)
    }

    /// Set a 302 on the working response and hand it back for pass-through.
    pub fn redirect(&mut self, location: &str) -> Reply {
        self.response.status = 302;
        self.response.set_header("location", location);
        Reply::Response(std::mem::take(&mut self.response))
    }

    /// Render an error through the active view and return it as the reply.
    pub fn abort(&mut self, status: u16, message: Option<&str>) -> Reply {
        Reply::Response(responses::abort(self, status, message))
    }

    pub fn change_view(&mut self, view: ViewKind) {
        self.view = view;
    }

    /// Whether errors and data render as JSON.
    pub fn is_structured_view(&self) -> bool {
        self.view.is_structured()
    }

    /// Parse the request into `T` with the controller's parser.
    pub fn parse_request<T>(&self, fallback: Option<&T>) -> Result<Parsed<T>, DispatchError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let parser = self.descriptor.parser.clone();
        self.parse_request_with(&parser, fallback)
    }

    /// Parse the request into `T` with a named parser (`Form`, `MessageParser`, ...).
    pub fn parse_request_with<T>(
        &self,
        parser: &str,
        fallback: Option<&T>,
    ) -> Result<Parsed<T>, DispatchError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let template = serde_json::to_value(T::default())?;
        let fallback = fallback.map(serde_json::to_value).transpose()?;
        let parser = self.services.parsers.factory(parser)?;
        let value = parser.process(&self.request, &template, fallback.as_ref());
        Ok(Parsed::from_value(value))
    }

    /// Untyped parse against a JSON template, with the controller's parser.
    pub fn parse_request_value(
        &self,
        template: &Value,
        fallback: Option<&Value>,
    ) -> Result<ParsedValue, DispatchError> {
        let parser = self.services.parsers.factory(&self.descriptor.parser)?;
        Ok(parser.process(&self.request, template, fallback))
    }
}

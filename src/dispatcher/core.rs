use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::auth::{self, Authorization, UserProvider, DEFAULT_DENY_MESSAGE};
use crate::config::AppConfig;
use crate::controller::{Args, ControllerDescriptor, RequestContext, RouteInfo};
use crate::error::{ConfigurationError, DispatchError};
use crate::events::{
    EventBus, Payload, AFTER_BUILD_COMPONENTS, AFTER_DISPATCH, AFTER_STARTUP,
    BEFORE_BUILD_COMPONENTS, BEFORE_DISPATCH, BEFORE_STARTUP, DISPATCH_COMPLETE, IS_AUTHORIZED,
};
use crate::parsers::ParserRegistry;
use crate::responses::{self, Reply, ResponseHandlerRegistry};
use crate::router::{RouteMatch, Router};
use crate::server::response::status_reason;
use crate::server::{Request, Response};
use crate::session::SessionStore;
use crate::view::{self, TemplateEngine};

/// Application-wide collaborators shared by every request.
pub struct Services {
    pub router: Router,
    pub parsers: ParserRegistry,
    pub templates: Arc<dyn TemplateEngine>,
    pub config: Arc<AppConfig>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("routes", &self.router.len())
            .field("parsers", &self.parsers)
            .finish()
    }
}

/// Frozen application: routes, controllers, global listeners and response
/// handlers. Shared read-only across coroutines.
pub struct Dispatcher {
    pub(super) services: Arc<Services>,
    pub(super) controllers: Vec<Arc<ControllerDescriptor>>,
    pub(super) global_events: Arc<EventBus<RequestContext>>,
    pub(super) responders: ResponseHandlerRegistry,
    pub(super) sessions: Arc<dyn SessionStore>,
    pub(super) users: Arc<dyn UserProvider>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("services", &self.services)
            .field(
                "controllers",
                &self.controllers.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("global_events", &self.global_events)
            .field("responders", &self.responders)
            .finish()
    }
}

/// 404 for requests no route answers. There is no controller, hence no view:
/// JSON is chosen from the `Accept` header.
fn not_found(request: &Request) -> Response {
    if request.accepts_json() || request.is_json() {
        Response::json(404, &json!({ "error": status_reason(404), "status": 404 }))
    } else {
        Response::text(404, status_reason(404))
    }
}

impl Dispatcher {
    pub fn router(&self) -> &Router {
        &self.services.router
    }

    /// Registered controllers in registration order.
    pub fn controllers(&self) -> &[Arc<ControllerDescriptor>] {
        &self.controllers
    }

    pub fn controller(&self, name: &str) -> Option<&Arc<ControllerDescriptor>> {
        self.controllers.iter().find(|c| c.name == name)
    }

    pub fn config(&self) -> &AppConfig {
        &self.services.config
    }

    /// Run one request through every stage. Never fails: errors become
    /// responses rendered through the active view.
    pub fn dispatch(&self, request: Request) -> Response {
        let start = Instant::now();
        let request_id = request.request_id;
        let method = request.method.clone();
        let path = request.path.clone();

        let response = match self.services.router.match_route(&request.method, &request.path) {
            Some(route_match) => self.dispatch_route(request, route_match),
            None => {
                debug!(request_id = %request_id, method = %method, path = %path, "No route matched");
                not_found(&request)
            }
        };

        debug!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = response.status,
            latency_us = start.elapsed().as_micros() as u64,
            "Request complete"
        );
        response
    }

    fn dispatch_route(&self, request: Request, route_match: RouteMatch) -> Response {
        let route = route_match.route;
        let Some(descriptor) = self.controller(&route.controller) else {
            // build() validates every route target
            error!(route_name = %route.name, controller = %route.controller, "Route targets unknown controller");
            return Response::text(500, status_reason(500));
        };
        debug!(
            request_id = %request.request_id,
            route_name = %route.name,
            controller = %route.controller,
            handler_method = %route.handler_method,
            "Route resolved"
        );

        let args = Args::from_route(&route, &route_match.path_params);
        let mut ctx = RequestContext::new(
            request,
            RouteInfo::from(route.as_ref()),
            args,
            Arc::clone(descriptor),
            Arc::clone(&self.services),
            Arc::clone(&self.global_events),
        );
        ctx.user = self.users.current_user(&ctx.request);
        ctx.session = self.sessions.load(&ctx.request);

        ctx.response = match self.run(&mut ctx) {
            Ok(response) => response,
            Err(err) => self.fail(&mut ctx, err),
        };

        let mut response = match ctx.fire(DISPATCH_COMPLETE, &mut Payload::None) {
            Ok(_) => std::mem::take(&mut ctx.response),
            Err(err) => self.fail(&mut ctx, err.into()),
        };
        self.sessions.save(&mut ctx.session, &mut response);
        response
    }

    /// Stages 2 to 6.
    fn run(&self, ctx: &mut RequestContext) -> Result<Response, DispatchError> {
        self.construct(ctx)?;
        self.startup(ctx)?;
        if let Some(rejection) = self.authorize(ctx) {
            return Ok(rejection);
        }
        let reply = self.act(ctx)?;
        self.resolve(ctx, reply)
    }

    fn construct(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        ctx.fire(BEFORE_BUILD_COMPONENTS, &mut Payload::None)?;
        let descriptor = ctx.descriptor_arc();
        let mut events = EventBus::new();
        for factory in &descriptor.components {
            if let Err(err) = factory.build(ctx, &mut events) {
                error!(
                    request_id = %ctx.request.request_id,
                    controller = %descriptor.name,
                    component = %factory.name(),
                    error = %err,
                    "Component construction failed"
                );
                return Err(match err {
                    DispatchError::ComponentConstruction { .. } => err,
                    other => DispatchError::ComponentConstruction {
                        component: factory.name().to_string(),
                        reason: other.to_string(),
                    },
                });
            }
        }
        ctx.install_events(events);
        ctx.fire(AFTER_BUILD_COMPONENTS, &mut Payload::None)?;
        Ok(())
    }

    fn startup(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        ctx.fire(BEFORE_STARTUP, &mut Payload::None)?;
        let descriptor = ctx.descriptor_arc();
        if let Some(hook) = &descriptor.startup {
            hook(ctx)?;
        }
        ctx.fire(AFTER_STARTUP, &mut Payload::None)?;
        Ok(())
    }

    /// `Some(response)` when the request was rejected.
    fn authorize(&self, ctx: &mut RequestContext) -> Option<Response> {
        let descriptor = ctx.descriptor_arc();
        let mut outcome = auth::evaluate(ctx, &descriptor.authorizations);
        if outcome.is_allowed() {
            if let Some(action) = descriptor.action(&ctx.route.handler_method) {
                outcome = auth::evaluate(ctx, &action.authorizations);
            }
        }
        if outcome.is_allowed() {
            outcome = match ctx.fire(IS_AUTHORIZED, &mut Payload::None) {
                Ok(values) if values.contains(&Value::Bool(false)) => Authorization::Deny(None),
                Ok(_) => Authorization::Allow,
                Err(err) => Authorization::deny(err.message()),
            };
        }

        match outcome {
            Authorization::Allow => None,
            Authorization::Deny(message) => {
                let message = message.as_deref().unwrap_or(DEFAULT_DENY_MESSAGE);
                warn!(
                    request_id = %ctx.request.request_id,
                    route_name = %ctx.route.name,
                    user = ?ctx.user.as_ref().map(|u| u.email.as_str()),
                    reason = %message,
                    "Authorization rejected request"
                );
                Some(responses::abort(ctx, 403, Some(message)))
            }
            Authorization::Redirect(location) => {
                warn!(
                    request_id = %ctx.request.request_id,
                    route_name = %ctx.route.name,
                    location = %location,
                    "Authorization redirected request"
                );
                let mut response = std::mem::take(&mut ctx.response);
                response.status = 302;
                response.set_header("location", &location);
                Some(response)
            }
        }
    }

    fn act(&self, ctx: &mut RequestContext) -> Result<Reply, DispatchError> {
        ctx.fire(BEFORE_DISPATCH, &mut Payload::None)?;
        let descriptor = ctx.descriptor_arc();
        let action = descriptor.action(&ctx.route.handler_method).ok_or_else(|| {
            ConfigurationError::UnknownAction {
                controller: descriptor.name.clone(),
                action: ctx.route.handler_method.clone(),
            }
        })?;
        let args = ctx.args.clone();
        let reply = match action.invoke(ctx, &args) {
            Ok(reply) => reply,
            Err(err) => Reply::Response(self.fail(ctx, err)),
        };
        ctx.fire(AFTER_DISPATCH, &mut Payload::Reply(&reply))?;
        Ok(reply)
    }

    fn resolve(&self, ctx: &mut RequestContext, reply: Reply) -> Result<Response, DispatchError> {
        if let Some(handler) = self.responders.factory(reply.kind()) {
            return handler.process(ctx, reply);
        }
        if matches!(reply, Reply::None) {
            if ctx.response.has_body() {
                return Ok(std::mem::take(&mut ctx.response));
            }
            if ctx.descriptor().auto_render {
                ctx.response.clear_redirect();
                return view::render(ctx);
            }
        }
        error!(
            request_id = %ctx.request.request_id,
            route_name = %ctx.route.name,
            reply = %reply.describe(),
            "No response handler for action result"
        );
        Err(DispatchError::UnhandledResult {
            value: reply.describe(),
            type_name: reply.type_name().to_string(),
        })
    }

    fn fail(&self, ctx: &mut RequestContext, err: DispatchError) -> Response {
        let status = err.status();
        if status >= 500 {
            error!(
                request_id = %ctx.request.request_id,
                route_name = %ctx.route.name,
                status,
                error = %err,
                "Request failed"
            );
        } else {
            debug!(
                request_id = %ctx.request.request_id,
                route_name = %ctx.route.name,
                status,
                error = %err,
                "Request aborted"
            );
        }
        responses::abort(ctx, status, err.public_message().as_deref())
    }
}

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::core::{Dispatcher, Services};
use crate::auth::{HeaderUserProvider, UserProvider};
use crate::config::{self, AppConfig};
use crate::controller::{ControllerDescriptor, RequestContext};
use crate::error::ConfigurationError;
use crate::events::{EventBus, EventError, Payload, BEFORE_RENDER};
use crate::parsers::{ParserRegistry, RequestParser};
use crate::responses::{ReplyKind, ResponseHandler, ResponseHandlerRegistry};
use crate::router::{RouteBuilder, Router};
use crate::session::{MemorySessionStore, SessionStore};
use crate::view::{MiniJinjaEngine, TemplateEngine};

/// Prefix whose `list` actions appear in the admin navigation.
const ADMIN_PREFIX: &str = "admin";

/// Collects the parts of an application and freezes them into a [`Dispatcher`].
pub struct AppBuilder {
    config: Option<Arc<AppConfig>>,
    controllers: Vec<ControllerDescriptor>,
    events: EventBus<RequestContext>,
    parsers: ParserRegistry,
    responders: ResponseHandlerRegistry,
    templates: Option<Arc<dyn TemplateEngine>>,
    sessions: Option<Arc<dyn SessionStore>>,
    users: Option<Arc<dyn UserProvider>>,
    autoadmin: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            controllers: Vec::new(),
            events: EventBus::new(),
            parsers: ParserRegistry::with_defaults(),
            responders: ResponseHandlerRegistry::with_defaults(),
            templates: None,
            sessions: None,
            users: None,
            autoadmin: false,
        }
    }

    /// Use `config` instead of the process-wide configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    pub fn controller(mut self, descriptor: ControllerDescriptor) -> Self {
        self.controllers.push(descriptor);
        self
    }

    /// Register a global listener. Global listeners run after the request's
    /// own listeners for the same event.
    pub fn on<F>(mut self, event: &str, listener: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut Payload<'_>) -> Result<Option<Value>, EventError>
            + Send
            + Sync
            + 'static,
    {
        self.events.on(event, listener);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn RequestParser>) -> Self {
        self.parsers.register(parser);
        self
    }

    pub fn responder(mut self, kind: ReplyKind, handler: Arc<dyn ResponseHandler>) -> Self {
        self.responders.register(kind, handler);
        self
    }

    pub fn templates(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.templates = Some(engine);
        self
    }

    pub fn sessions(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn users(mut self, provider: Arc<dyn UserProvider>) -> Self {
        self.users = Some(provider);
        self
    }

    /// Expose `autoadmin.links` to admin templates.
    pub fn autoadmin(mut self, enabled: bool) -> Self {
        self.autoadmin = enabled;
        self
    }

    /// Derive every route, validate the application and freeze it.
    ///
    /// # Errors
    ///
    /// Any [`ConfigurationError`]: a scaffold without a store, a route name
    /// or template collision, a route target that does not exist or a
    /// controller naming an unregistered parser.
    pub fn build(self) -> Result<Dispatcher, ConfigurationError> {
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(config::get().clone()));

        let mut routes = Vec::new();
        for descriptor in &self.controllers {
            routes.extend(RouteBuilder::build_routes(descriptor)?);
        }
        let router = Router::from_routes(routes)?;

        for descriptor in &self.controllers {
            self.parsers.factory(&descriptor.parser)?;
        }
        for route in router.routes() {
            let target = self
                .controllers
                .iter()
                .find(|d| d.name == route.controller)
                .and_then(|d| d.action(&route.handler_method));
            if target.is_none() {
                return Err(ConfigurationError::UnknownAction {
                    controller: route.controller.clone(),
                    action: route.handler_method.clone(),
                });
            }
        }

        let mut events = self.events;
        if self.autoadmin {
            let links = admin_links(&self.controllers, &router);
            debug!(links = links.len(), "Admin navigation registered");
            let links = Value::Array(links);
            events.on(BEFORE_RENDER, move |ctx: &mut RequestContext, _: &mut Payload<'_>| {
                if ctx.route.prefix.as_deref() == Some(ADMIN_PREFIX) {
                    ctx.context.set_dotted("autoadmin.links", links.clone());
                }
                Ok(None)
            });
        }

        let templates = self
            .templates
            .unwrap_or_else(|| Arc::new(MiniJinjaEngine::from_config(&config.templates)));
        let sessions = self.sessions.unwrap_or_else(|| {
            Arc::new(MemorySessionStore::new(config.session.cookie_name.clone()))
        });
        let users = self
            .users
            .unwrap_or_else(|| Arc::new(HeaderUserProvider::from_config(&config.auth)));

        info!(
            controllers = self.controllers.len(),
            routes = router.len(),
            global_listeners = events.len(),
            "Application built"
        );

        Ok(Dispatcher {
            services: Arc::new(Services {
                router,
                parsers: self.parsers,
                templates,
                config,
            }),
            controllers: self.controllers.into_iter().map(Arc::new).collect(),
            global_events: Arc::new(events),
            responders: self.responders,
            sessions,
            users,
        })
    }
}

/// `{title, uri}` for each controller with an `admin_list` action.
fn admin_links(controllers: &[ControllerDescriptor], router: &Router) -> Vec<Value> {
    controllers
        .iter()
        .filter(|d| d.has_prefix(ADMIN_PREFIX) && d.action("admin_list").is_some())
        .filter_map(|d| {
            let name = format!("{ADMIN_PREFIX}-{}-list", d.name);
            router
                .build(&name, &[])
                .ok()
                .map(|uri| json!({ "title": d.title(), "uri": uri }))
        })
        .collect()
}

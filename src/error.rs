//! Error types shared by route building, dispatch and the storage contract.
//!
//! Two failure classes exist:
//!
//! - [`ConfigurationError`] is raised while an application is being assembled
//!   (`AppBuilder::build`). It is fatal and surfaces at process startup.
//! - [`DispatchError`] is raised while a single request is in flight. The
//!   dispatcher never lets it escape: every variant is mapped to an HTTP status
//!   via [`DispatchError::status`] and rendered through the active view.

use std::fmt;

use crate::events::EventError;

/// A controller or application was assembled incorrectly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A scaffolded action was routed but the controller has no store.
    MissingModel {
        /// Controller name
        controller: String,
    },
    /// Two routes computed the same name.
    DuplicateRouteName {
        /// The colliding route name
        name: String,
    },
    /// Two routes share a template and overlap in HTTP methods.
    ConflictingRoute {
        /// Path template shared by both routes
        template: String,
        /// Method present in both routes (`*` for any)
        method: String,
        /// Name of the route registered first
        existing: String,
    },
    /// A route or conventional declaration targets an action that does not exist.
    UnknownAction {
        /// Controller name
        controller: String,
        /// Handler method name
        action: String,
    },
    /// A custom path template could not be parsed.
    InvalidTemplate {
        /// The offending template
        template: String,
        /// Why it was rejected
        reason: String,
    },
    /// No request parser is registered under this name.
    UnknownParser {
        /// Requested parser name
        name: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingModel { controller } => write!(
                f,
                "couldn't determine a model for controller '{controller}': scaffolded actions need a store"
            ),
            ConfigurationError::DuplicateRouteName { name } => {
                write!(f, "route name '{name}' is already registered")
            }
            ConfigurationError::ConflictingRoute {
                template,
                method,
                existing,
            } => write!(
                f,
                "route template '{template}' already answers {method} via route '{existing}'"
            ),
            ConfigurationError::UnknownAction { controller, action } => {
                write!(f, "controller '{controller}' has no action '{action}'")
            }
            ConfigurationError::InvalidTemplate { template, reason } => {
                write!(f, "invalid route template '{template}': {reason}")
            }
            ConfigurationError::UnknownParser { name } => {
                write!(f, "no request parser registered as '{name}'")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// URI building failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No route carries this name.
    UnknownRoute(String),
    /// A required template parameter was not supplied and has no default.
    MissingParam {
        /// Route name
        route: String,
        /// Missing parameter
        param: String,
    },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::UnknownRoute(name) => write!(f, "no route named '{name}'"),
            RouteError::MissingParam { route, param } => {
                write!(f, "route '{route}' requires parameter '{param}'")
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// Failure reported by a [`crate::scaffold::Store`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The cursor passed to `query` was not produced by this store.
    InvalidCursor(String),
    /// The entity could not be stored.
    Rejected(String),
    /// Backend failure (lock poisoning, I/O, remote error).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidCursor(c) => write!(f, "invalid cursor '{c}'"),
            StoreError::Rejected(msg) => write!(f, "entity rejected: {msg}"),
            StoreError::Backend(msg) => write!(f, "store failure: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Everything a dispatch stage or an action can fail with.
#[derive(Debug)]
pub enum DispatchError {
    /// 404: an identified entity or route does not exist.
    NotFound(Option<String>),
    /// 400: arguments or payload could not be interpreted.
    BadRequest(String),
    /// 403: the caller may not perform this action.
    Forbidden(String),
    /// 500: a declared component failed to build.
    ComponentConstruction {
        /// Component lookup name
        component: String,
        /// Underlying failure
        reason: String,
    },
    /// 500: a lifecycle listener failed.
    Event(EventError),
    /// 500: no response strategy applies to the value an action returned.
    UnhandledResult {
        /// Debug rendering of the value
        value: String,
        /// Type name of the value
        type_name: String,
    },
    /// 500: template lookup or rendering failed.
    Template(String),
    /// 500: the store failed.
    Store(StoreError),
    /// 500: a value could not be converted to or from JSON.
    Serialization(String),
    /// 500: the application was misconfigured in a way only visible per request.
    Configuration(ConfigurationError),
    /// 500: anything else.
    Internal(String),
}

impl DispatchError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::NotFound(_) => 404,
            DispatchError::BadRequest(_) => 400,
            DispatchError::Forbidden(_) => 403,
            DispatchError::Store(StoreError::InvalidCursor(_)) => 400,
            _ => 500,
        }
    }

    /// Message shown to the client, if the error carries one.
    pub fn public_message(&self) -> Option<String> {
        match self {
            DispatchError::NotFound(msg) => msg.clone(),
            DispatchError::BadRequest(msg) | DispatchError::Forbidden(msg) => Some(msg.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotFound(Some(msg)) => write!(f, "not found: {msg}"),
            DispatchError::NotFound(None) => write!(f, "not found"),
            DispatchError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            DispatchError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            DispatchError::ComponentConstruction { component, reason } => {
                write!(f, "component '{component}' failed to build: {reason}")
            }
            DispatchError::Event(err) => write!(f, "event listener failed: {err}"),
            DispatchError::UnhandledResult { value, type_name } => write!(
                f,
                "Nothing was able to handle the response {value} ({type_name})"
            ),
            DispatchError::Template(msg) => write!(f, "template error: {msg}"),
            DispatchError::Store(err) => write!(f, "{err}"),
            DispatchError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            DispatchError::Configuration(err) => write!(f, "configuration error: {err}"),
            DispatchError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Event(err) => Some(err),
            DispatchError::Store(err) => Some(err),
            DispatchError::Configuration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EventError> for DispatchError {
    fn from(err: EventError) -> Self {
        DispatchError::Event(err)
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        DispatchError::Store(err)
    }
}

impl From<ConfigurationError> for DispatchError {
    fn from(err: ConfigurationError) -> Self {
        DispatchError::Configuration(err)
    }
}

impl From<RouteError> for DispatchError {
    fn from(err: RouteError) -> Self {
        DispatchError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DispatchError::NotFound(None).status(), 404);
        assert_eq!(DispatchError::BadRequest("x".into()).status(), 400);
        assert_eq!(DispatchError::Forbidden("x".into()).status(), 403);
        assert_eq!(DispatchError::Internal("x".into()).status(), 500);
        assert_eq!(
            DispatchError::Store(StoreError::InvalidCursor("zz".into())).status(),
            400
        );
    }

    #[test]
    fn test_unhandled_result_names_value_and_type() {
        let err = DispatchError::UnhandledResult {
            value: "Gadget".into(),
            type_name: "demo::Gadget".into(),
        };
        assert_eq!(
            err.to_string(),
            "Nothing was able to handle the response Gadget (demo::Gadget)"
        );
    }

    #[test]
    fn test_missing_model_names_controller() {
        let err = ConfigurationError::MissingModel {
            controller: "widgets".into(),
        };
        assert!(err.to_string().contains("'widgets'"));
    }
}

//! # Authorization
//!
//! Every controller carries an ordered chain of [`AuthCheck`]s. The dispatcher
//! evaluates the controller chain, then the checks declared on the action,
//! then the `is_authorized` event. The first result that is not
//! [`Authorization::Allow`] ends evaluation; later checks never run.
//!
//! Checks are plain closures over the request context:
//!
//! ```rust
//! use waypost::auth::{self, Authorization};
//!
//! let only_owner = auth::check(|ctx| {
//!     let owner = ctx.request.header("x-owner");
//!     (owner.is_some(), "owner header required")
//! });
//! let always = auth::check(|_ctx| true);
//! # let _ = (only_owner, always);
//! ```
//!
//! Identity comes from a [`UserProvider`]. The stock [`HeaderUserProvider`]
//! trusts headers set by an authenticating proxy.

use std::fmt;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::controller::RequestContext;
use crate::server::Request;

/// Body of a 403 when the rejecting check gave no message.
pub const DEFAULT_DENY_MESSAGE: &str = "Authorization chain rejected request";

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allow,
    /// Reject with 403 and an optional message.
    Deny(Option<String>),
    /// Send the client elsewhere (for example a login flow) with a 302.
    Redirect(String),
}

impl Authorization {
    pub fn deny(message: impl Into<String>) -> Self {
        Authorization::Deny(Some(message.into()))
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Authorization::Allow)
    }
}

impl From<bool> for Authorization {
    fn from(allowed: bool) -> Self {
        if allowed {
            Authorization::Allow
        } else {
            Authorization::Deny(None)
        }
    }
}

impl From<(bool, &str)> for Authorization {
    fn from((allowed, message): (bool, &str)) -> Self {
        if allowed {
            Authorization::Allow
        } else {
            Authorization::deny(message)
        }
    }
}

impl From<(bool, String)> for Authorization {
    fn from((allowed, message): (bool, String)) -> Self {
        if allowed {
            Authorization::Allow
        } else {
            Authorization::Deny(Some(message))
        }
    }
}

/// One entry of an authorization chain.
pub type AuthCheck = Arc<dyn Fn(&RequestContext) -> Authorization + Send + Sync>;

/// Condition deciding whether a group of checks applies.
pub type Predicate = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Wrap a closure returning `bool`, `(bool, &str)` or [`Authorization`].
pub fn check<F, R>(f: F) -> AuthCheck
where
    F: Fn(&RequestContext) -> R + Send + Sync + 'static,
    R: Into<Authorization>,
{
    Arc::new(move |ctx: &RequestContext| -> Authorization { f(ctx).into() })
}

/// Run `checks` in order and return the first non-`Allow` outcome.
pub fn evaluate<'a, I>(ctx: &RequestContext, checks: I) -> Authorization
where
    I: IntoIterator<Item = &'a AuthCheck>,
{
    for check in checks {
        let outcome = check(ctx);
        if !outcome.is_allowed() {
            return outcome;
        }
    }
    Authorization::Allow
}

pub fn require_user() -> AuthCheck {
    check(|ctx| (ctx.user.is_some(), "Login required"))
}

pub fn require_admin() -> AuthCheck {
    check(|ctx| match &ctx.user {
        None => Authorization::deny("Login required"),
        Some(user) if user.is_admin => Authorization::Allow,
        Some(_) => Authorization::deny("Administrator access required"),
    })
}

/// `require_user` applied only to routes under one of `prefixes`.
pub fn require_user_for_prefix(prefixes: &[&str]) -> AuthCheck {
    predicate_chain(prefix_predicate(prefixes), vec![require_user()])
}

/// `require_admin` applied only to routes under one of `prefixes`.
pub fn require_admin_for_prefix(prefixes: &[&str]) -> AuthCheck {
    predicate_chain(prefix_predicate(prefixes), vec![require_admin()])
}

/// Allow only users whose email domain is listed. An empty list falls back
/// to `auth.allowed_domains`; when that is empty too every user passes.
pub fn require_domain(domains: &[&str]) -> AuthCheck {
    let domains: Vec<String> = domains.iter().map(|d| d.to_ascii_lowercase()).collect();
    check(move |ctx| {
        let configured;
        let allowed = if domains.is_empty() {
            configured = ctx
                .config()
                .auth
                .allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect::<Vec<_>>();
            &configured
        } else {
            &domains
        };
        let Some(user) = &ctx.user else {
            return Authorization::deny("Login required");
        };
        if allowed.is_empty() {
            return Authorization::Allow;
        }
        let domain = user.domain().map(str::to_ascii_lowercase);
        match domain {
            Some(domain) if allowed.contains(&domain) => Authorization::Allow,
            _ => Authorization::deny("Your domain is not allowed"),
        }
    })
}

/// Holds when the route was reached under one of `prefixes`.
pub fn prefix_predicate(prefixes: &[&str]) -> Predicate {
    let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
    Arc::new(move |ctx: &RequestContext| {
        ctx.route
            .prefix
            .as_ref()
            .is_some_and(|p| prefixes.contains(p))
    })
}

/// Holds for the named actions (prefix stripped: `edit`, not `admin_edit`).
pub fn action_predicate(actions: &[&str]) -> Predicate {
    let actions: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
    Arc::new(move |ctx: &RequestContext| actions.contains(&ctx.route.action))
}

/// Holds for the named routes.
pub fn route_predicate(routes: &[&str]) -> Predicate {
    let routes: Vec<String> = routes.iter().map(|r| r.to_string()).collect();
    Arc::new(move |ctx: &RequestContext| routes.contains(&ctx.route.name))
}

/// Run `checks` only when `predicate` holds; otherwise allow.
pub fn predicate_chain(predicate: Predicate, checks: Vec<AuthCheck>) -> AuthCheck {
    Arc::new(move |ctx: &RequestContext| {
        if predicate(ctx) {
            evaluate(ctx, &checks)
        } else {
            Authorization::Allow
        }
    })
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub is_admin: bool,
}

impl CurrentUser {
    pub fn new(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            id: email.clone(),
            email,
            is_admin: false,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Part of the email after `@`.
    pub fn domain(&self) -> Option<&str> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|d| !d.is_empty())
    }
}

impl fmt::Display for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.email)
    }
}

/// Resolves the caller for a request.
pub trait UserProvider: Send + Sync {
    fn current_user(&self, request: &Request) -> Option<CurrentUser>;
}

/// Reads identity from headers injected by an authenticating proxy.
#[derive(Debug, Clone)]
pub struct HeaderUserProvider {
    user_header: String,
    user_id_header: String,
    admin_header: String,
}

impl HeaderUserProvider {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            user_header: config.user_header.clone(),
            user_id_header: config.user_id_header.clone(),
            admin_header: config.admin_header.clone(),
        }
    }
}

impl UserProvider for HeaderUserProvider {
    fn current_user(&self, request: &Request) -> Option<CurrentUser> {
        let email = request
            .header(&self.user_header)
            .map(str::trim)
            .filter(|e| !e.is_empty())?;
        let id = request
            .header(&self.user_id_header)
            .map(str::to_string)
            .unwrap_or_else(|| email.to_string());
        let is_admin = request.header(&self.admin_header).is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });
        Some(CurrentUser {
            id,
            email: email.to_string(),
            is_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(Authorization::from(true), Authorization::Allow);
        assert_eq!(Authorization::from(false), Authorization::Deny(None));
        assert_eq!(
            Authorization::from((false, "nope")),
            Authorization::Deny(Some("nope".into()))
        );
        assert_eq!(
            Authorization::from((true, "ignored".to_string())),
            Authorization::Allow
        );
    }

    #[test]
    fn test_user_domain() {
        assert_eq!(CurrentUser::new("ann@example.com").domain(), Some("example.com"));
        assert_eq!(CurrentUser::new("ann").domain(), None);
        assert_eq!(CurrentUser::new("ann@").domain(), None);
    }

    #[test]
    fn test_header_provider() {
        let provider = HeaderUserProvider::from_config(&AuthConfig::default());
        assert!(provider.current_user(&Request::get("/")).is_none());

        let req = Request::get("/")
            .with_header("X-User-Email", "ann@example.com")
            .with_header("X-User-Admin", "True");
        let user = provider.current_user(&req).unwrap();
        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.id, "ann@example.com");
        assert!(user.is_admin);

        let req = Request::get("/")
            .with_header("x-user-email", "bob@example.com")
            .with_header("x-user-id", "42");
        let user = provider.current_user(&req).unwrap();
        assert_eq!(user.id, "42");
        assert!(!user.is_admin);
    }
}

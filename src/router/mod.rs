//! # Router Module
//!
//! Route derivation, path matching and URI building.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Deriving routes from controller descriptors ([`RouteBuilder`])
//! - Matching incoming requests to a named route ([`Router::match_route`])
//! - Extracting path parameters from matched routes
//! - Building URIs back from a route name ([`Router::build`])
//!
//! ## Route naming
//!
//! Every route is named `{prefix-}{controller}-{action}` and its path is
//! `/{prefix/}{controller}/...`. Conventional CRUD actions get fixed shapes:
//!
//! | Name | Methods | Template |
//! |---|---|---|
//! | `widgets-list` | GET, HEAD | `/widgets` |
//! | `widgets-view` | GET, HEAD | `/widgets/{id}` |
//! | `widgets-add` | GET, POST | `/widgets/add` |
//! | `widgets-add-rest` | POST | `/widgets` |
//! | `widgets-edit` | GET, POST | `/widgets/{id}/edit` |
//! | `widgets-edit-rest` | PUT, POST | `/widgets/{id}` |
//! | `widgets-delete` | GET | `/widgets/{id}/delete` |
//! | `widgets-delete-rest` | DELETE | `/widgets/{id}` |
//!
//! Explicitly routed actions get `/{controller}/{action}/{param}...`, plus one
//! shorter variant per trailing parameter that has a default.
//!
//! ## Matching
//!
//! Templates are stored in a radix tree keyed by path segment. Static
//! segments are tried before `{param}` segments, so `/widgets/add` beats
//! `/widgets/{id}` regardless of registration order. Matching allocates only
//! the extracted parameter values.
//!
//! ## Example
//!
//! ```rust
//! use waypost::controller::ControllerDescriptor;
//! use waypost::responses::Reply;
//! use waypost::router::{RouteBuilder, Router};
//! use http::Method;
//!
//! let desc = ControllerDescriptor::builder("Widgets")
//!     .handler("view", |_ctx, _args| Ok(Reply::None))
//!     .build()
//!     .unwrap();
//! let router = Router::from_routes(RouteBuilder::build_routes(&desc).unwrap()).unwrap();
//!
//! let m = router.match_route(&Method::GET, "/widgets/42").unwrap();
//! assert_eq!(m.route.name, "widgets-view");
//! assert_eq!(m.get_path_param("id"), Some("42"));
//! assert_eq!(router.build("widgets-view", &[("id", "42")]).unwrap(), "/widgets/42");
//! ```

mod builder;
mod core;
mod radix;

pub use builder::RouteBuilder;
pub use core::{
    template_params, validate_template, ParamVec, Route, RouteMatch, Router, MAX_INLINE_PARAMS,
};
